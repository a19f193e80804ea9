// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 sigport developers

//! Contiguous block of samples handed to a reader.
//!
//! A block aggregates one or more consumed packets into a single buffer.
//! Each packet boundary crossed during assembly contributes a
//! [`SampleTimestamp`]; when the block starts mid-packet its first
//! timestamp is extrapolated from the packet's base time (`synthetic`).

use crate::port::Element;
use crate::sri::{Sri, SriChanges};
use crate::time::UtcTime;

/// Timestamp attached to one sample offset inside a block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleTimestamp {
    /// Time of the sample at `offset`.
    pub time: UtcTime,
    /// Sample index within the block.
    pub offset: usize,
    /// Extrapolated (`base + consumed * xdelta`) rather than received.
    pub synthetic: bool,
}

impl SampleTimestamp {
    /// Create a timestamp entry.
    #[must_use]
    pub fn new(time: UtcTime, offset: usize, synthetic: bool) -> Self {
        SampleTimestamp {
            time,
            offset,
            synthetic,
        }
    }
}

/// Samples plus the metadata in effect when they were read.
///
/// The SRI diff (`sri_changed`/`sri_changes`) is computed once at assembly
/// time against the stream's previously delivered SRI, not per sample.
#[derive(Debug, Clone)]
pub struct SampleBlock<T: Element> {
    sri: Sri,
    buffer: Vec<T>,
    timestamps: Vec<SampleTimestamp>,
    sri_changed: bool,
    sri_changes: SriChanges,
    queue_flushed: bool,
}

impl<T: Element> SampleBlock<T> {
    pub(crate) fn new(sri: Sri, capacity: usize) -> Self {
        SampleBlock {
            sri,
            buffer: Vec::with_capacity(capacity),
            timestamps: Vec::new(),
            sri_changed: false,
            sri_changes: SriChanges::NONE,
            queue_flushed: false,
        }
    }

    pub(crate) fn set_flags(&mut self, sri_changed: bool, changes: SriChanges, flushed: bool) {
        self.sri_changed = sri_changed;
        self.sri_changes = changes;
        self.queue_flushed = flushed;
    }

    pub(crate) fn extend(&mut self, data: &[T]) {
        self.buffer.extend_from_slice(data);
    }

    /// Insert a timestamp, keeping entries ordered by offset.
    pub(crate) fn add_timestamp(&mut self, timestamp: SampleTimestamp) {
        let pos = self
            .timestamps
            .iter()
            .position(|ts| timestamp.offset < ts.offset)
            .unwrap_or(self.timestamps.len());
        self.timestamps.insert(pos, timestamp);
    }

    /// Metadata in effect for this block.
    #[must_use]
    pub fn sri(&self) -> &Sri {
        &self.sri
    }

    /// Sample spacing along the primary axis.
    #[must_use]
    pub fn xdelta(&self) -> f64 {
        self.sri.xdelta
    }

    /// True when the block carries complex samples (interleaved pairs).
    #[must_use]
    pub fn complex(&self) -> bool {
        self.sri.complex()
    }

    /// Raw scalar buffer (for complex data, interleaved pairs).
    #[must_use]
    pub fn buffer(&self) -> &[T] {
        &self.buffer
    }

    /// Consume the block, yielding its buffer.
    #[must_use]
    pub fn into_buffer(self) -> Vec<T> {
        self.buffer
    }

    /// Number of samples (complex pairs count once).
    #[must_use]
    pub fn len(&self) -> usize {
        if self.complex() {
            self.buffer.len() / 2
        } else {
            self.buffer.len()
        }
    }

    /// True when the block holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Timestamps recorded at packet boundaries, ordered by offset.
    #[must_use]
    pub fn timestamps(&self) -> &[SampleTimestamp] {
        &self.timestamps
    }

    /// Time of the first sample.
    ///
    /// # Panics
    ///
    /// Panics when the block carries no timestamps; callers are expected
    /// to have checked for an empty block first.
    #[must_use]
    pub fn start_time(&self) -> UtcTime {
        match self.timestamps.first() {
            Some(ts) => ts.time,
            None => panic!("block contains no timestamps"),
        }
    }

    /// Metadata changed relative to the previously delivered block.
    ///
    /// May be true with an empty [`sri_changes`](SampleBlock::sri_changes)
    /// mask when a change notification was carried forward through a queue
    /// flush but the effective fields ended up identical.
    #[must_use]
    pub fn sri_changed(&self) -> bool {
        self.sri_changed
    }

    /// Field-level diff against the previously delivered SRI.
    #[must_use]
    pub fn sri_changes(&self) -> SriChanges {
        self.sri_changes
    }

    /// Earlier packets of this stream were lost to an overflow flush.
    #[must_use]
    pub fn queue_flushed(&self) -> bool {
        self.queue_flushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_with(times: &[(f64, usize, bool)]) -> SampleBlock<f32> {
        let mut block = SampleBlock::new(Sri::for_stream("s"), 0);
        for &(wsec, offset, synthetic) in times {
            block.add_timestamp(SampleTimestamp::new(UtcTime::new(wsec, 0.0), offset, synthetic));
        }
        block
    }

    #[test]
    fn test_timestamps_kept_ordered() {
        let block = block_with(&[(2.0, 64, false), (0.0, 0, false), (1.0, 32, true)]);
        let offsets: Vec<usize> = block.timestamps().iter().map(|ts| ts.offset).collect();
        assert_eq!(offsets, vec![0, 32, 64]);
    }

    #[test]
    fn test_start_time_is_first_offset() {
        let block = block_with(&[(5.0, 0, false), (7.0, 32, false)]);
        assert_eq!(block.start_time(), UtcTime::new(5.0, 0.0));
    }

    #[test]
    #[should_panic(expected = "no timestamps")]
    fn test_start_time_panics_on_empty_block() {
        let block: SampleBlock<f32> = SampleBlock::new(Sri::for_stream("s"), 0);
        let _ = block.start_time();
    }

    #[test]
    fn test_len_counts_complex_pairs_once() {
        let mut sri = Sri::for_stream("s");
        sri.mode = 1;
        let mut block: SampleBlock<f32> = SampleBlock::new(sri, 8);
        block.extend(&[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(block.len(), 2);
        assert_eq!(block.buffer().len(), 4);
        assert!(block.complex());
    }

    #[test]
    fn test_flags_default_clear() {
        let block: SampleBlock<f32> = SampleBlock::new(Sri::for_stream("s"), 0);
        assert!(!block.sri_changed());
        assert!(block.sri_changes().is_empty());
        assert!(!block.queue_flushed());
        assert!(block.is_empty());
    }
}
