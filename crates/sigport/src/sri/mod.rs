// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 sigport developers

//! Stream metadata (SRI) with field-level change detection.
//!
//! An [`Sri`] record describes a stream's framing: sample spacing along the
//! primary axis (`xdelta`), optional frame size for 2-D data (`subsize`),
//! real/complex mode, and free-form keyword attributes. Receivers detect
//! metadata changes per field via [`Sri::compare_fields`], which returns an
//! [`SriChanges`] bitmask.
//!
//! SRI has value semantics throughout the crate: it is cloned at the point
//! of push and never aliased between a sender-held and a queue-held copy.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Axis unit codes for `xunits`/`yunits`.
pub mod units {
    /// Dimensionless axis.
    pub const NONE: i16 = 0;
    /// Seconds.
    pub const TIME: i16 = 1;
    /// Hertz.
    pub const FREQUENCY: i16 = 3;
}

/// Value of a keyword attribute: a small closed variant.
#[derive(Debug, Clone, PartialEq)]
pub enum KeywordValue {
    /// UTF-8 string.
    Str(String),
    /// Signed integer.
    Long(i64),
    /// Double-precision float.
    Double(f64),
    /// Boolean flag.
    Bool(bool),
}

impl From<&str> for KeywordValue {
    fn from(value: &str) -> Self {
        KeywordValue::Str(value.to_string())
    }
}

impl From<i64> for KeywordValue {
    fn from(value: i64) -> Self {
        KeywordValue::Long(value)
    }
}

impl From<f64> for KeywordValue {
    fn from(value: f64) -> Self {
        KeywordValue::Double(value)
    }
}

impl From<bool> for KeywordValue {
    fn from(value: bool) -> Self {
        KeywordValue::Bool(value)
    }
}

/// Named keyword attribute. Names are unique within one [`Sri`].
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    /// Attribute name.
    pub name: String,
    /// Attribute value.
    pub value: KeywordValue,
}

/// Bitmask of SRI fields that differ between two records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct SriChanges(pub u32);

impl SriChanges {
    /// No field differs.
    pub const NONE: Self = Self(0);
    /// `stream_id` differs.
    pub const STREAM_ID: Self = Self(0x0001);
    /// `xstart` differs.
    pub const XSTART: Self = Self(0x0002);
    /// `xdelta` differs.
    pub const XDELTA: Self = Self(0x0004);
    /// `xunits` differs.
    pub const XUNITS: Self = Self(0x0008);
    /// `subsize` differs.
    pub const SUBSIZE: Self = Self(0x0010);
    /// `ystart` differs.
    pub const YSTART: Self = Self(0x0020);
    /// `ydelta` differs.
    pub const YDELTA: Self = Self(0x0040);
    /// `yunits` differs.
    pub const YUNITS: Self = Self(0x0080);
    /// `mode` differs.
    pub const MODE: Self = Self(0x0100);
    /// `blocking` differs.
    pub const BLOCKING: Self = Self(0x0200);
    /// Keyword set differs.
    pub const KEYWORDS: Self = Self(0x0400);

    /// Empty mask.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// True when no field differs.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when all bits in `flag` are set.
    #[must_use]
    pub const fn contains(self, flag: Self) -> bool {
        (self.0 & flag.0) == flag.0
    }

    /// Set all bits in `flag`.
    pub fn insert(&mut self, flag: Self) {
        self.0 |= flag.0;
    }
}

impl BitOr for SriChanges {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SriChanges {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for SriChanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(SriChanges, &str); 11] = [
            (SriChanges::STREAM_ID, "STREAM_ID"),
            (SriChanges::XSTART, "XSTART"),
            (SriChanges::XDELTA, "XDELTA"),
            (SriChanges::XUNITS, "XUNITS"),
            (SriChanges::SUBSIZE, "SUBSIZE"),
            (SriChanges::YSTART, "YSTART"),
            (SriChanges::YDELTA, "YDELTA"),
            (SriChanges::YUNITS, "YUNITS"),
            (SriChanges::MODE, "MODE"),
            (SriChanges::BLOCKING, "BLOCKING"),
            (SriChanges::KEYWORDS, "KEYWORDS"),
        ];
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Stream metadata record.
///
/// Replacing a stream's SRI is a value assignment of a whole record; fields
/// are public because the record itself is passed by value at every seam.
#[derive(Debug, Clone, PartialEq)]
pub struct Sri {
    /// Stream identifier this record describes.
    pub stream_id: String,
    /// Header revision counter.
    pub hversion: i32,
    /// Start of the primary axis (e.g. time of first sample).
    pub xstart: f64,
    /// Spacing between consecutive samples along the primary axis.
    pub xdelta: f64,
    /// Unit code for the primary axis (see [`units`]).
    pub xunits: i16,
    /// Frame length for 2-D data; 0 for 1-D streams.
    pub subsize: u32,
    /// Start of the secondary (frame) axis.
    pub ystart: f64,
    /// Spacing along the secondary axis.
    pub ydelta: f64,
    /// Unit code for the secondary axis.
    pub yunits: i16,
    /// 0 = real samples, 1 = complex (interleaved pairs).
    pub mode: i16,
    /// Producer requests backpressure instead of overflow flush.
    pub blocking: bool,
    /// Free-form attributes; names unique, order not significant.
    pub keywords: Vec<Keyword>,
}

impl Default for Sri {
    fn default() -> Self {
        Sri {
            stream_id: "defaultSRI".to_string(),
            hversion: 1,
            xstart: 0.0,
            xdelta: 1.0,
            xunits: units::TIME,
            subsize: 0,
            ystart: 0.0,
            ydelta: 0.0,
            yunits: units::NONE,
            mode: 0,
            blocking: false,
            keywords: Vec::new(),
        }
    }
}

impl Sri {
    /// Default SRI stamped with a stream ID.
    #[must_use]
    pub fn for_stream(stream_id: &str) -> Self {
        Sri {
            stream_id: stream_id.to_string(),
            ..Sri::default()
        }
    }

    /// True when samples are complex (interleaved real/imaginary pairs).
    #[must_use]
    pub fn complex(&self) -> bool {
        self.mode != 0
    }

    /// Look up a keyword value by name.
    #[must_use]
    pub fn keyword(&self, name: &str) -> Option<&KeywordValue> {
        self.keywords
            .iter()
            .find(|kw| kw.name == name)
            .map(|kw| &kw.value)
    }

    /// Insert or replace a keyword, keeping names unique.
    pub fn set_keyword<V: Into<KeywordValue>>(&mut self, name: &str, value: V) {
        let value = value.into();
        if let Some(kw) = self.keywords.iter_mut().find(|kw| kw.name == name) {
            kw.value = value;
        } else {
            self.keywords.push(Keyword {
                name: name.to_string(),
                value,
            });
        }
    }

    /// Remove a keyword; returns true when it existed.
    pub fn erase_keyword(&mut self, name: &str) -> bool {
        let before = self.keywords.len();
        self.keywords.retain(|kw| kw.name != name);
        self.keywords.len() != before
    }

    /// Diff two records field by field.
    ///
    /// Scalar fields compare by exact value (no floating-point epsilon;
    /// callers needing tolerance supply their own [`SriComparator`]).
    /// Keyword collections compare as unordered sets of (name, value)
    /// pairs, so a pure reordering is not a change.
    #[must_use]
    pub fn compare_fields(a: &Sri, b: &Sri) -> SriChanges {
        let mut changes = SriChanges::empty();
        if a.stream_id != b.stream_id {
            changes.insert(SriChanges::STREAM_ID);
        }
        if a.xstart != b.xstart {
            changes.insert(SriChanges::XSTART);
        }
        if a.xdelta != b.xdelta {
            changes.insert(SriChanges::XDELTA);
        }
        if a.xunits != b.xunits {
            changes.insert(SriChanges::XUNITS);
        }
        if a.subsize != b.subsize {
            changes.insert(SriChanges::SUBSIZE);
        }
        if a.ystart != b.ystart {
            changes.insert(SriChanges::YSTART);
        }
        if a.ydelta != b.ydelta {
            changes.insert(SriChanges::YDELTA);
        }
        if a.yunits != b.yunits {
            changes.insert(SriChanges::YUNITS);
        }
        if a.mode != b.mode {
            changes.insert(SriChanges::MODE);
        }
        if a.blocking != b.blocking {
            changes.insert(SriChanges::BLOCKING);
        }
        if !keywords_match(&a.keywords, &b.keywords) {
            changes.insert(SriChanges::KEYWORDS);
        }
        changes
    }

    /// Full equality shortcut: no field differs.
    #[must_use]
    pub fn matches(a: &Sri, b: &Sri) -> bool {
        Sri::compare_fields(a, b).is_empty()
    }
}

/// Unordered (name, value) set equality; names are unique per record.
fn keywords_match(a: &[Keyword], b: &[Keyword]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|kw| {
        b.iter()
            .any(|other| other.name == kw.name && other.value == kw.value)
    })
}

/// Equality policy used by input ports to decide whether a pushed SRI
/// replaces the held one.
///
/// The port never requires more than this single method, so alternate
/// policies (e.g. tolerance-based float comparison, ignoring keywords) can
/// be substituted without touching call sites.
pub trait SriComparator: Send + Sync {
    /// True when the two records should be treated as identical.
    fn matches(&self, a: &Sri, b: &Sri) -> bool;
}

/// Field-exact equality, the stock policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultComparator;

impl SriComparator for DefaultComparator {
    fn matches(&self, a: &Sri, b: &Sri) -> bool {
        Sri::matches(a, b)
    }
}
