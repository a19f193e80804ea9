// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 sigport developers

//! Per-stream sample-accurate reader.
//!
//! An [`InputStream`] presents one stream's packets as a continuous sample
//! sequence, independent of how the sender chunked them. Reads may span,
//! split, or accumulate several packets; every packet boundary crossed
//! while assembling a block records a timestamp, and a block that starts
//! mid-packet gets a synthesized one (base time + consumed × `xdelta`).
//!
//! A packet carrying a metadata change or a queue-flush marker never
//! bridges into an in-progress block: it parks as *pending* until the
//! locally buffered segment is fully consumed, so one block never mixes
//! two metadata regimes.
//!
//! # End-of-stream lifecycle
//!
//! ```text
//! None -> Received (EOS packet fetched from the port)
//!      -> Reached  (EOS packet consumed by a read)
//!      -> Reported (caller observed it; stream retires from the port)
//! ```
//!
//! After `Reported`, the stream ID may be reused: a later packet with the
//! same ID starts a fresh logical stream with its own handle.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::port::in_port::PortInner;
use crate::port::{Element, Packet};
use crate::sri::{Sri, SriChanges};
use crate::stream::block::{SampleBlock, SampleTimestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum EosState {
    None = 0,
    Received = 1,
    Reached = 2,
    Reported = 3,
}

/// Outcome of one attempt to pull a packet from the port.
enum Fetch {
    /// A packet joined the local queue (or resolved end-of-stream).
    Got,
    /// Nothing fetched: would block, segment break pending, or stream over.
    NoData,
    /// A blocking wait was cancelled; nothing was consumed.
    Interrupted,
}

/// Probe result for the metadata governing the next block.
enum SriProbe {
    Available(bool),
    NoData,
    Interrupted,
}

struct ReaderState<T> {
    /// Metadata of the last delivered block (or the creation SRI).
    sri: Sri,
    eos_state: EosState,
    /// Locally buffered packets of the current segment.
    queue: VecDeque<Packet<T>>,
    /// Packet that could not bridge into the current segment.
    pending: Option<Packet<T>>,
    /// Unconsumed scalars across `queue`.
    scalars_queued: usize,
    /// Consumed scalars of the front packet.
    sample_offset: usize,
}

pub(crate) struct StreamImpl<T: Element> {
    stream_id: String,
    port: Weak<PortInner<T>>,
    enabled: AtomicBool,
    // Mirrors of the mutex-guarded state, so port-wide scans
    // (ready-stream polls, enable checks) never contend with a reader
    // blocked mid-wait.
    buffered_scalars: AtomicUsize,
    has_pending: AtomicBool,
    eos_mirror: AtomicU8,
    front_complex: AtomicBool,
    state: Mutex<ReaderState<T>>,
}

impl<T: Element> StreamImpl<T> {
    fn sync_mirrors(&self, st: &ReaderState<T>) {
        self.buffered_scalars
            .store(st.scalars_queued, Ordering::Relaxed);
        self.has_pending.store(st.pending.is_some(), Ordering::Relaxed);
        self.eos_mirror.store(st.eos_state as u8, Ordering::Relaxed);
        let complex = st
            .queue
            .front()
            .map_or(st.sri.complex(), |p| p.sri.complex());
        self.front_complex.store(complex, Ordering::Relaxed);
    }

    /// Pull one packet for this stream from the port.
    fn fetch_packet(&self, st: &mut ReaderState<T>, blocking: bool) -> Fetch {
        if st.pending.is_some() || st.eos_state != EosState::None {
            return Fetch::NoData;
        }
        let Some(port) = self.port.upgrade() else {
            return Fetch::NoData;
        };
        match port.next_packet(Some(&self.stream_id), blocking) {
            Some(pkt) => {
                if pkt.eos {
                    st.eos_state = EosState::Received;
                }
                if st.queue.is_empty() || !(pkt.sri_changed || pkt.queue_flushed) {
                    Self::queue_packet(st, pkt);
                    Fetch::Got
                } else {
                    // Segment break: hold until the local queue drains
                    st.pending = Some(pkt);
                    Fetch::NoData
                }
            }
            // A blocking pop only returns empty on interruption
            None if blocking => Fetch::Interrupted,
            None => Fetch::NoData,
        }
    }

    fn queue_packet(st: &mut ReaderState<T>, pkt: Packet<T>) {
        if pkt.eos && pkt.buffer.is_empty() {
            if st.queue.is_empty() {
                // Read pointer is already at end-of-stream
                st.eos_state = EosState::Reached;
            } else if let Some(back) = st.queue.back_mut() {
                // Fold the marker onto the last queued packet so it is
                // handled when that packet is consumed
                back.eos = true;
            }
        } else {
            st.scalars_queued += pkt.buffer.len();
            st.queue.push_back(pkt);
        }
    }

    /// Metadata (complex or real) governing the next block, fetching the
    /// first packet of the segment if necessary.
    fn next_sri_probe(&self, st: &mut ReaderState<T>, blocking: bool) -> SriProbe {
        if st.queue.is_empty() {
            match self.fetch_packet(st, blocking) {
                Fetch::Got => {}
                Fetch::Interrupted => return SriProbe::Interrupted,
                Fetch::NoData => {}
            }
        }
        match st.queue.front() {
            Some(pkt) => SriProbe::Available(pkt.sri.complex()),
            None => SriProbe::NoData,
        }
    }

    /// Assemble a block of `scalars` from the front of the local queue
    /// without consuming anything.
    fn assemble(&self, st: &ReaderState<T>, scalars: usize) -> SampleBlock<T> {
        let Some(front) = st.queue.front() else {
            return SampleBlock::new(st.sri.clone(), 0);
        };

        let mut block = SampleBlock::new(front.sri.clone(), scalars);
        let changes = if front.sri_changed {
            Sri::compare_fields(&st.sri, &front.sri)
        } else {
            SriChanges::NONE
        };
        block.set_flags(front.sri_changed, changes, front.queue_flushed);

        let mut remaining = scalars;
        let mut out_offset = 0usize;
        let mut pkt_index = 0usize;
        let mut pkt_offset = st.sample_offset;
        while remaining > 0 {
            let pkt = &st.queue[pkt_index];
            Self::add_timestamp(&mut block, pkt_offset, out_offset, pkt);

            let available = pkt.buffer.len() - pkt_offset;
            let pass = available.min(remaining);
            block.extend(&pkt.buffer[pkt_offset..pkt_offset + pass]);
            out_offset += pass;
            pkt_offset += pass;
            remaining -= pass;

            if pkt_offset >= pkt.buffer.len() {
                pkt_offset = 0;
                pkt_index += 1;
            }
        }
        block
    }

    /// Record the timestamp for a chunk starting `input_offset` scalars
    /// into `pkt`. A non-zero offset means the packet's base time must be
    /// advanced by the consumed duration, marking the result synthetic.
    fn add_timestamp(
        block: &mut SampleBlock<T>,
        input_offset: usize,
        output_offset: usize,
        pkt: &Packet<T>,
    ) {
        let mut time_offset = input_offset as f64 * block.xdelta();
        let mut offset = output_offset;
        if block.complex() {
            time_offset /= 2.0;
            offset /= 2;
        }
        let synthetic = time_offset > 0.0;
        let time = if synthetic {
            pkt.time + time_offset
        } else {
            pkt.time
        };
        block.add_timestamp(SampleTimestamp::new(time, offset, synthetic));
    }

    /// Acknowledge the front packet's flags, record its SRI as delivered,
    /// and advance the read cursor.
    fn commit(st: &mut ReaderState<T>, scalars: usize) {
        if let Some(front) = st.queue.front_mut() {
            front.sri_changed = false;
            front.queue_flushed = false;
            st.sri = front.sri.clone();
        }
        Self::consume(st, scalars);
    }

    fn consume(st: &mut ReaderState<T>, mut count: usize) {
        while count > 0 {
            let front_len = match st.queue.front() {
                Some(pkt) => pkt.buffer.len(),
                None => break,
            };
            let available = front_len - st.sample_offset;
            let pass = available.min(count);
            st.sample_offset += pass;
            st.scalars_queued -= pass;
            count -= pass;

            if st.sample_offset >= front_len {
                Self::consume_packet(st);
                st.sample_offset = 0;
            }
        }
    }

    fn consume_packet(st: &mut ReaderState<T>) {
        if let Some(front) = st.queue.pop_front() {
            if front.eos {
                st.eos_state = EosState::Reached;
            }
        }
        if st.queue.is_empty() {
            if let Some(pending) = st.pending.take() {
                Self::queue_packet(st, pending);
            }
        }
    }

    fn report_eos(&self, st: &mut ReaderState<T>) {
        if let Some(port) = self.port.upgrade() {
            port.remove_stream(&self.stream_id);
        }
        st.eos_state = EosState::Reported;
    }

    fn read_between(&self, min: usize, max: usize, blocking: bool) -> Option<SampleBlock<T>> {
        debug_assert!(min <= max, "read_between requires min <= max");
        let mut st = self.state.lock();

        let complex = match self.next_sri_probe(&mut st, blocking) {
            SriProbe::Available(complex) => complex,
            SriProbe::Interrupted => {
                self.sync_mirrors(&st);
                return None;
            }
            SriProbe::NoData => {
                if st.eos_state == EosState::Reached {
                    self.report_eos(&mut st);
                }
                self.sync_mirrors(&st);
                return None;
            }
        };

        // Sample counts become scalar counts for complex data
        let item_size = if complex { 2 } else { 1 };
        let want_min = min * item_size;
        let want_max = max * item_size;

        while st.scalars_queued < want_min {
            match self.fetch_packet(&mut st, blocking) {
                Fetch::Got => {}
                Fetch::Interrupted => {
                    self.sync_mirrors(&st);
                    return None;
                }
                Fetch::NoData => break,
            }
        }

        if st.scalars_queued == 0 {
            if st.eos_state == EosState::Reached {
                self.report_eos(&mut st);
            }
            self.sync_mirrors(&st);
            return None;
        }

        let scalars = want_max.min(st.scalars_queued);
        if scalars < want_min
            && !blocking
            && st.pending.is_none()
            && st.eos_state == EosState::None
        {
            // No break in the data: a later read may return the full amount
            self.sync_mirrors(&st);
            return None;
        }

        let block = self.assemble(&st, scalars);
        Self::commit(&mut st, scalars);
        self.sync_mirrors(&st);
        Some(block)
    }

    fn read_packet(&self, blocking: bool) -> Option<SampleBlock<T>> {
        let mut st = self.state.lock();
        if st.scalars_queued == 0 {
            if let Fetch::Interrupted = self.fetch_packet(&mut st, blocking) {
                self.sync_mirrors(&st);
                return None;
            }
        }
        if st.scalars_queued == 0 {
            if st.eos_state == EosState::Reached {
                self.report_eos(&mut st);
            }
            self.sync_mirrors(&st);
            return None;
        }
        let front_len = st.queue.front().map_or(0, |pkt| pkt.buffer.len());
        let scalars = front_len - st.sample_offset;
        let block = self.assemble(&st, scalars);
        Self::commit(&mut st, scalars);
        self.sync_mirrors(&st);
        Some(block)
    }

    fn peek(&self, count: usize) -> Option<SampleBlock<T>> {
        let mut st = self.state.lock();
        let complex = match self.next_sri_probe(&mut st, false) {
            SriProbe::Available(complex) => complex,
            _ => {
                self.sync_mirrors(&st);
                return None;
            }
        };
        let item_size = if complex { 2 } else { 1 };
        let want = count * item_size;
        while st.scalars_queued < want {
            match self.fetch_packet(&mut st, false) {
                Fetch::Got => {}
                _ => break,
            }
        }
        if st.scalars_queued == 0 {
            self.sync_mirrors(&st);
            return None;
        }
        let scalars = want.min(st.scalars_queued);
        let block = self.assemble(&st, scalars);
        // Packets moved from the port stay buffered; the cursor does not
        // advance and no flags are acknowledged
        self.sync_mirrors(&st);
        Some(block)
    }

    fn skip(&self, count: usize) -> usize {
        let mut st = self.state.lock();
        let complex = match self.next_sri_probe(&mut st, true) {
            SriProbe::Available(complex) => complex,
            _ => {
                self.sync_mirrors(&st);
                return 0;
            }
        };
        let item_size = if complex { 2 } else { 1 };
        let want = count * item_size;
        while st.scalars_queued < want {
            match self.fetch_packet(&mut st, true) {
                Fetch::Got => {}
                Fetch::Interrupted => {
                    self.sync_mirrors(&st);
                    return 0;
                }
                Fetch::NoData => break,
            }
        }
        let scalars = want.min(st.scalars_queued);
        Self::consume(&mut st, scalars);
        self.sync_mirrors(&st);
        scalars / item_size
    }

    fn eos(&self) -> bool {
        let mut st = self.state.lock();
        if st.queue.is_empty() {
            // A bare end-of-stream packet may be waiting at the port; a
            // non-blocking fetch resolves the case where the previous read
            // consumed exactly the remaining data
            let _ = self.fetch_packet(&mut st, false);
        }
        if st.eos_state == EosState::Reached {
            self.report_eos(&mut st);
        }
        let reported = st.eos_state == EosState::Reported;
        self.sync_mirrors(&st);
        reported
    }

    fn samples_available(&self) -> usize {
        let local_scalars = self.buffered_scalars.load(Ordering::Relaxed);
        let local = if self.front_complex.load(Ordering::Relaxed) {
            local_scalars / 2
        } else {
            local_scalars
        };
        // Packets behind a pending segment break are not yet available
        if self.has_pending.load(Ordering::Relaxed) {
            return local;
        }
        match self.port.upgrade() {
            Some(port) => local + port.samples_available(&self.stream_id, local_scalars == 0),
            None => local,
        }
    }

    fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
        let mut st = self.state.lock();
        st.queue.clear();
        st.pending = None;
        st.scalars_queued = 0;
        st.sample_offset = 0;
        // Unless end-of-stream was already received (any further packets
        // with this ID belong to another instance), purge the port queue
        if st.eos_state == EosState::None {
            if let Some(port) = self.port.upgrade() {
                port.discard_packets_for_stream(&self.stream_id);
            }
        }
        self.sync_mirrors(&st);
    }
}

/// Handle for one logical input stream.
///
/// Handles are cheap to clone and compare by logical identity: every
/// `get_stream` call for a live stream returns an equal handle, so callers
/// can cache one across reads.
pub struct InputStream<T: Element> {
    inner: Arc<StreamImpl<T>>,
}

impl<T: Element> Clone for InputStream<T> {
    fn clone(&self) -> Self {
        InputStream {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Element> PartialEq for InputStream<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Element> std::fmt::Debug for InputStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputStream")
            .field("stream_id", &self.inner.stream_id)
            .field("enabled", &self.is_enabled())
            .field(
                "buffered_scalars",
                &self.inner.buffered_scalars.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl<T: Element> InputStream<T> {
    pub(crate) fn create(sri: Sri, port: Weak<PortInner<T>>) -> Self {
        let stream_id = sri.stream_id.clone();
        let complex = sri.complex();
        InputStream {
            inner: Arc::new(StreamImpl {
                stream_id,
                port,
                enabled: AtomicBool::new(true),
                buffered_scalars: AtomicUsize::new(0),
                has_pending: AtomicBool::new(false),
                eos_mirror: AtomicU8::new(EosState::None as u8),
                front_complex: AtomicBool::new(complex),
                state: Mutex::new(ReaderState {
                    sri,
                    eos_state: EosState::None,
                    queue: VecDeque::new(),
                    pending: None,
                    scalars_queued: 0,
                    sample_offset: 0,
                }),
            }),
        }
    }

    /// Stream identifier.
    #[must_use]
    pub fn stream_id(&self) -> &str {
        &self.inner.stream_id
    }

    /// Current metadata (last delivered, or the SRI the stream was
    /// created with).
    #[must_use]
    pub fn sri(&self) -> Sri {
        self.inner.state.lock().sri.clone()
    }

    /// Read exactly `count` samples, waiting for data; returns fewer only
    /// when end-of-stream or a segment break arrives first, and `None`
    /// when the stream is over or the wait is interrupted.
    pub fn read(&self, count: usize) -> Option<SampleBlock<T>> {
        self.inner.read_between(count, count, true)
    }

    /// Read between `min` and `max` samples: returns as soon as `min` are
    /// buffered, capping the block at `max`.
    pub fn read_between(&self, min: usize, max: usize) -> Option<SampleBlock<T>> {
        self.inner.read_between(min, max, true)
    }

    /// Non-waiting [`read`](InputStream::read); consumes nothing when the
    /// full amount is not available and no segment break is pending.
    pub fn try_read(&self, count: usize) -> Option<SampleBlock<T>> {
        self.inner.read_between(count, count, false)
    }

    /// Non-waiting [`read_between`](InputStream::read_between).
    pub fn try_read_between(&self, min: usize, max: usize) -> Option<SampleBlock<T>> {
        self.inner.read_between(min, max, false)
    }

    /// Read the remainder of the current packet, waiting for one.
    pub fn read_packet(&self) -> Option<SampleBlock<T>> {
        self.inner.read_packet(true)
    }

    /// Non-waiting [`read_packet`](InputStream::read_packet).
    pub fn try_read_packet(&self) -> Option<SampleBlock<T>> {
        self.inner.read_packet(false)
    }

    /// Up to `count` samples without advancing the read cursor; the same
    /// data is returned by the next read.
    pub fn peek(&self, count: usize) -> Option<SampleBlock<T>> {
        self.inner.peek(count)
    }

    /// Discard up to `count` samples, waiting as [`read`](InputStream::read)
    /// does; returns the number discarded.
    pub fn skip(&self, count: usize) -> usize {
        self.inner.skip(count)
    }

    /// Samples buffered for this stream (locally and at the port, up to
    /// the next segment break). Reflects [`disable`](InputStream::disable)
    /// immediately.
    #[must_use]
    pub fn samples_available(&self) -> usize {
        self.inner.samples_available()
    }

    /// True when enabled and at least one sample or a pending
    /// end-of-stream is available.
    #[must_use]
    pub fn ready(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.samples_available() > 0
            || self.inner.eos_mirror.load(Ordering::Relaxed) == EosState::Reached as u8
    }

    /// True once end-of-stream has been reached and observed.
    pub fn eos(&self) -> bool {
        self.inner.eos()
    }

    /// True unless [`disable`](InputStream::disable) was called.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Relaxed)
    }

    /// Resume buffering. Data discarded while disabled is not recovered.
    pub fn enable(&self) {
        self.inner.enabled.store(true, Ordering::Relaxed);
    }

    /// Stop buffering and discard everything queued for this stream, both
    /// locally and at the port. Packets arriving while disabled are
    /// dropped at the port.
    pub fn disable(&self) {
        self.inner.disable();
    }

    /// True when data, a pending segment break, or an unobserved
    /// end-of-stream is buffered locally.
    pub(crate) fn has_buffered_data(&self) -> bool {
        self.inner.buffered_scalars.load(Ordering::Relaxed) > 0
            || self.inner.has_pending.load(Ordering::Relaxed)
            || self.inner.eos_mirror.load(Ordering::Relaxed) == EosState::Reached as u8
    }
}
