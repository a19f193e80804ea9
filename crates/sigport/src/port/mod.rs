// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 sigport developers

//! Port-level plumbing shared by the input and output sides.
//!
//! The transport that physically moves packets between processes is not
//! this crate's concern; it is abstracted as [`PacketSink`], the one
//! interface both directions agree on. An [`InPort`](crate::InPort)
//! implements it directly, so in-process pipelines wire an output port
//! straight to an input port.
//!
//! One generic implementation covers every payload family. The original
//! system stamped out a near-identical port per element type (char, octet,
//! short, long, float, double, bit, file, XML); here that is a single
//! [`Element`] bound.

pub(crate) mod in_port;
pub(crate) mod out_port;

pub use in_port::InPort;
pub use out_port::{FilterEntry, OutPort};

use crate::sri::Sri;
use crate::time::UtcTime;

/// Payload element carried by a port.
///
/// `BITS` is the per-element wire size used for rate statistics.
pub trait Element: Clone + Send + Sync + 'static {
    /// Bits per element on the wire.
    const BITS: usize;
}

macro_rules! impl_element {
    ($($ty:ty => $bits:expr),* $(,)?) => {
        $(impl Element for $ty {
            const BITS: usize = $bits;
        })*
    };
}

impl_element! {
    i8 => 8,
    u8 => 8,
    i16 => 16,
    u16 => 16,
    i32 => 32,
    u32 => 32,
    i64 => 64,
    u64 => 64,
    f32 => 32,
    f64 => 64,
}

/// Single bit element for bit-packed streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bit(pub bool);

impl Element for Bit {
    const BITS: usize = 1;
}

/// File URI payload; one element per transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUri(pub String);

impl Element for FileUri {
    const BITS: usize = 8;
}

/// XML document payload; one element per transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument(pub String);

impl Element for XmlDocument {
    const BITS: usize = 8;
}

/// One queued transfer: payload plus its delivery metadata.
///
/// `sri` is the value in effect for this payload (cloned at push, never
/// aliased with the sender's copy). `queue_flushed` is set by the receiver
/// when an overflow flush dropped earlier packets of this stream.
#[derive(Debug, Clone)]
pub struct Packet<T> {
    /// Stream this payload belongs to.
    pub stream_id: String,
    /// Sample data; empty for a pure end-of-stream marker.
    pub buffer: Vec<T>,
    /// Timestamp of the first sample in `buffer`.
    pub time: UtcTime,
    /// End-of-stream marker.
    pub eos: bool,
    /// Metadata in effect for this payload.
    pub sri: Sri,
    /// Metadata differs from the last delivered record for this stream.
    pub sri_changed: bool,
    /// Earlier packets of this stream were dropped by an overflow flush.
    pub queue_flushed: bool,
}

/// Abstract delivery boundary between a producer and a consumer.
///
/// The output side calls this for every SRI update and data packet routed
/// to a connection; the real RPC transport lives behind it.
pub trait PacketSink<T: Element>: Send + Sync {
    /// Deliver a stream metadata update.
    fn push_sri(&self, sri: &Sri);

    /// Deliver a block of samples (possibly empty, for end-of-stream).
    fn push_packet(&self, data: &[T], time: UtcTime, eos: bool, stream_id: &str);
}

/// Coarse load state of a port, for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    /// Queue empty.
    Idle,
    /// Packets queued, below the bound.
    Active,
    /// Queue at its configured bound.
    Busy,
}

/// Char (signed 8-bit) input port.
pub type InCharPort = InPort<i8>;
/// Octet (unsigned 8-bit) input port.
pub type InOctetPort = InPort<u8>;
/// Short input port.
pub type InShortPort = InPort<i16>;
/// Unsigned short input port.
pub type InUShortPort = InPort<u16>;
/// Long input port.
pub type InLongPort = InPort<i32>;
/// Unsigned long input port.
pub type InULongPort = InPort<u32>;
/// Long long input port.
pub type InLongLongPort = InPort<i64>;
/// Unsigned long long input port.
pub type InULongLongPort = InPort<u64>;
/// Float input port.
pub type InFloatPort = InPort<f32>;
/// Double input port.
pub type InDoublePort = InPort<f64>;
/// Bit input port.
pub type InBitPort = InPort<Bit>;
/// File-URI input port.
pub type InFilePort = InPort<FileUri>;
/// XML-document input port.
pub type InXmlPort = InPort<XmlDocument>;

/// Char (signed 8-bit) output port.
pub type OutCharPort = OutPort<i8>;
/// Octet (unsigned 8-bit) output port.
pub type OutOctetPort = OutPort<u8>;
/// Short output port.
pub type OutShortPort = OutPort<i16>;
/// Unsigned short output port.
pub type OutUShortPort = OutPort<u16>;
/// Long output port.
pub type OutLongPort = OutPort<i32>;
/// Unsigned long output port.
pub type OutULongPort = OutPort<u32>;
/// Long long output port.
pub type OutLongLongPort = OutPort<i64>;
/// Unsigned long long output port.
pub type OutULongLongPort = OutPort<u64>;
/// Float output port.
pub type OutFloatPort = OutPort<f32>;
/// Double output port.
pub type OutDoublePort = OutPort<f64>;
/// Bit output port.
pub type OutBitPort = OutPort<Bit>;
/// File-URI output port.
pub type OutFilePort = OutPort<FileUri>;
/// XML-document output port.
pub type OutXmlPort = OutPort<XmlDocument>;
