// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 sigport developers

//! Receiver-side port: bounded multi-stream packet queue.
//!
//! All streams multiplexed onto one port share a single FIFO of packets.
//! The queue is bounded; when a push would exceed the bound in
//! non-blocking mode the port *flushes*: the oldest packets that are not
//! their stream's newest entry are discarded, and the surviving packet of
//! each affected stream carries the loss forward (`queue_flushed`, merged
//! `sri_changed`/EOS flags).
//!
//! # Architecture
//!
//! ```text
//! transport -> push_packet -+-> [P0][P1][P2][P3] -> get_packet -> consumer
//!                           |    (one FIFO, all streams)
//!                           +-> stream table -> InputStream (per stream,
//!                                               sample-accurate reads)
//! ```
//!
//! Queue contents, per-stream SRI state and the depth bound live under one
//! mutex: a concurrent reader observes the queue either before or after a
//! flush, never mid-flush.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};

use crate::port::{Element, Packet, PacketSink, PortState};
use crate::sri::{DefaultComparator, Sri, SriComparator};
use crate::stats::{LinkStatistics, PortStatistics};
use crate::stream::in_stream::InputStream;
use crate::time::UtcTime;

/// Default bound on undelivered packets per port.
const DEFAULT_QUEUE_DEPTH: usize = 100;

/// SRI held for a live stream, with its undelivered-change flag.
struct SriState {
    sri: Sri,
    changed: bool,
}

struct QueueState<T> {
    packets: VecDeque<Packet<T>>,
    /// 0 disables the bound.
    max_depth: usize,
    /// Any live SRI requested backpressure pushes.
    blocking: bool,
    /// Blocked waits return `None` until `resume()`.
    interrupted: bool,
    /// Live streams in arrival order; entries retire when their EOS packet
    /// is popped.
    sris: Vec<(String, SriState)>,
}

struct StreamTable<T: Element> {
    active: Vec<InputStream<T>>,
    pending: Vec<InputStream<T>>,
}

/// Shared state behind an [`InPort`] and its [`InputStream`] handles.
pub(crate) struct PortInner<T: Element> {
    name: String,
    /// Handed to stream handles so they can fetch from this port.
    weak_self: Weak<PortInner<T>>,
    comparator: Box<dyn SriComparator>,
    state: Mutex<QueueState<T>>,
    data_available: Condvar,
    space_available: Condvar,
    poll_gate: Mutex<()>,
    poll_ready: Condvar,
    streams: Mutex<StreamTable<T>>,
    stats: Mutex<LinkStatistics>,
}

/// Flags lost with a stream's dropped packets during a flush.
#[derive(Default)]
struct LostFlags {
    sri_changed: bool,
    eos: bool,
}

impl<T: Element> PortInner<T> {
    fn new(name: &str, comparator: Box<dyn SriComparator>) -> Arc<Self> {
        log::debug!(
            "InPort '{}' created, max queue depth {}",
            name,
            DEFAULT_QUEUE_DEPTH
        );
        Arc::new_cyclic(|weak| PortInner {
            name: name.to_string(),
            weak_self: weak.clone(),
            comparator,
            state: Mutex::new(QueueState {
                packets: VecDeque::new(),
                max_depth: DEFAULT_QUEUE_DEPTH,
                blocking: false,
                interrupted: false,
                sris: Vec::new(),
            }),
            data_available: Condvar::new(),
            space_available: Condvar::new(),
            poll_gate: Mutex::new(()),
            poll_ready: Condvar::new(),
            streams: Mutex::new(StreamTable {
                active: Vec::new(),
                pending: Vec::new(),
            }),
            stats: Mutex::new(LinkStatistics::new(name, T::BITS)),
        })
    }

    fn push_sri(&self, sri: &Sri) {
        let mut created = None;
        {
            let mut state = self.state.lock();
            if sri.blocking {
                state.blocking = true;
            }
            match state
                .sris
                .iter_mut()
                .find(|(id, _)| id == &sri.stream_id)
            {
                Some((_, held)) => {
                    if !self.comparator.matches(sri, &held.sri) {
                        log::debug!(
                            "port '{}': SRI change for stream '{}'",
                            self.name,
                            sri.stream_id
                        );
                        held.sri = sri.clone();
                        held.changed = true;
                    }
                }
                None => {
                    log::debug!(
                        "port '{}': new SRI for stream '{}'",
                        self.name,
                        sri.stream_id
                    );
                    state.sris.push((
                        sri.stream_id.clone(),
                        SriState {
                            sri: sri.clone(),
                            changed: true,
                        },
                    ));
                    created = Some(sri.clone());
                }
            }
        }
        if let Some(sri) = created {
            self.create_stream(&sri);
        }
    }

    fn push_packet(&self, data: &[T], time: UtcTime, eos: bool, stream_id: &str) {
        // An empty packet without EOS carries neither data nor usable
        // metadata (the timestamp applies to a first sample that does not
        // exist).
        if data.is_empty() && !eos {
            return;
        }

        if !self.is_stream_enabled(stream_id) {
            if eos {
                // Acknowledge the end-of-stream before discarding
                self.remove_stream(stream_id);
            }
            return;
        }

        let mut created = None;
        let (sri, sri_changed) = {
            let mut state = self.state.lock();
            match state.sris.iter_mut().find(|(id, _)| id == stream_id) {
                Some((_, held)) => {
                    let changed = held.changed;
                    held.changed = false;
                    (held.sri.clone(), changed)
                }
                None => {
                    log::warn!(
                        "port '{}': received data for stream '{}' with no SRI",
                        self.name,
                        stream_id
                    );
                    let sri = Sri::for_stream(stream_id);
                    state.sris.push((
                        stream_id.to_string(),
                        SriState {
                            sri: sri.clone(),
                            changed: false,
                        },
                    ));
                    created = Some(sri.clone());
                    (sri, true)
                }
            }
        };
        if let Some(sri) = &created {
            self.create_stream(sri);
        }

        let mut flushed = false;
        {
            let mut state = self.state.lock();
            if state.blocking && state.max_depth > 0 {
                while state.packets.len() >= state.max_depth && !state.interrupted {
                    self.space_available.wait(&mut state);
                }
                if state.interrupted {
                    return;
                }
            }

            state.packets.push_back(Packet {
                stream_id: stream_id.to_string(),
                buffer: data.to_vec(),
                time,
                eos,
                sri,
                sri_changed,
                queue_flushed: false,
            });

            if !state.blocking && state.max_depth > 0 && state.packets.len() > state.max_depth {
                log::debug!(
                    "port '{}': input queue flush (depth {})",
                    self.name,
                    state.packets.len()
                );
                flushed = true;
                Self::flush_queue(&mut state);
            }

            let fill = if state.max_depth > 0 {
                state.packets.len() as f64 / state.max_depth as f64
            } else {
                0.0
            };
            self.stats
                .lock()
                .update(data.len(), fill, eos, stream_id, flushed);
            self.data_available.notify_all();
        }

        let _gate = self.poll_gate.lock();
        self.poll_ready.notify_all();
    }

    /// Drop the oldest packets that are not their stream's newest entry
    /// until the bound is satisfied or only one packet per stream remains.
    /// The just-pushed packet is always its stream's newest, so it is
    /// never dropped.
    ///
    /// Flags carried by dropped packets fold into each stream's surviving
    /// newest packet (`queue_flushed` set, `sri_changed`/EOS OR-merged).
    fn flush_queue(state: &mut QueueState<T>) {
        let target = state.max_depth;

        let mut newest: HashMap<String, usize> = HashMap::new();
        for (idx, pkt) in state.packets.iter().enumerate() {
            newest.insert(pkt.stream_id.clone(), idx);
        }

        let mut lost: HashMap<String, LostFlags> = HashMap::new();
        let mut excess = state.packets.len().saturating_sub(target);
        let mut kept: VecDeque<Packet<T>> = VecDeque::new();
        for (idx, pkt) in state.packets.drain(..).enumerate() {
            let is_newest = newest.get(&pkt.stream_id) == Some(&idx);
            if excess > 0 && !is_newest {
                let entry = lost.entry(pkt.stream_id.clone()).or_default();
                entry.sri_changed |= pkt.sri_changed;
                entry.eos |= pkt.eos;
                excess -= 1;
            } else {
                kept.push_back(pkt);
            }
        }

        // Newest surviving packet per stream inherits the lost flags
        for pkt in kept.iter_mut().rev() {
            if let Some(entry) = lost.remove(&pkt.stream_id) {
                pkt.queue_flushed = true;
                pkt.sri_changed |= entry.sri_changed;
                pkt.eos |= entry.eos;
            }
        }
        state.packets = kept;
    }

    /// Pop the oldest packet, optionally restricted to one stream.
    ///
    /// Blocking waits suspend on the data condvar and return `None` on
    /// interruption without consuming anything.
    pub(crate) fn next_packet(&self, filter: Option<&str>, blocking: bool) -> Option<Packet<T>> {
        let mut state = self.state.lock();
        loop {
            if state.interrupted {
                return None;
            }
            let taken = match filter {
                None => state.packets.pop_front(),
                Some(id) => {
                    let pos = state.packets.iter().position(|p| p.stream_id == id);
                    pos.and_then(|idx| state.packets.remove(idx))
                }
            };
            if let Some(pkt) = taken {
                if pkt.eos {
                    Self::retire_sri(&mut state, &pkt.stream_id);
                }
                self.space_available.notify_all();
                return Some(pkt);
            }
            if !blocking {
                return None;
            }
            self.data_available.wait(&mut state);
        }
    }

    /// Remove a stream's SRI entry after its EOS is delivered, clearing
    /// port-level blocking mode when no blocking SRI remains.
    fn retire_sri(state: &mut QueueState<T>, stream_id: &str) {
        let Some(pos) = state.sris.iter().position(|(id, _)| id == stream_id) else {
            return;
        };
        let (_, retired) = state.sris.remove(pos);
        if retired.sri.blocking && !state.sris.iter().any(|(_, s)| s.sri.blocking) {
            state.blocking = false;
        }
    }

    /// Stream ID owning the queue head, waiting for a packet if requested.
    fn peek_stream_id(&self, blocking: bool) -> Option<String> {
        let mut state = self.state.lock();
        loop {
            if state.interrupted {
                return None;
            }
            if let Some(pkt) = state.packets.front() {
                return Some(pkt.stream_id.clone());
            }
            if !blocking {
                return None;
            }
            self.data_available.wait(&mut state);
        }
    }

    pub(crate) fn interrupted(&self) -> bool {
        self.state.lock().interrupted
    }

    /// Samples queued for one stream up to the next segment break.
    ///
    /// `first_packet` allows the scan to start on a packet that itself
    /// carries a break flag (the reader's first fetch of a segment).
    pub(crate) fn samples_available(&self, stream_id: &str, mut first_packet: bool) -> usize {
        let state = self.state.lock();
        let mut scalars = 0usize;
        let mut item_size = 1usize;
        for pkt in state.packets.iter().filter(|p| p.stream_id == stream_id) {
            if (pkt.sri_changed || pkt.queue_flushed) && !first_packet {
                break;
            }
            first_packet = false;
            if pkt.sri.complex() {
                item_size = 2;
            }
            scalars += pkt.buffer.len();
        }
        scalars / item_size
    }

    /// Drop queued packets for one stream, up to and including its EOS.
    /// Packets after an EOS belong to the next stream instance and stay.
    pub(crate) fn discard_packets_for_stream(&self, stream_id: &str) {
        let mut state = self.state.lock();
        let mut kept = VecDeque::with_capacity(state.packets.len());
        let mut dropped = false;
        let mut past_eos = false;
        for pkt in state.packets.drain(..) {
            if !past_eos && pkt.stream_id == stream_id {
                dropped = true;
                if pkt.eos {
                    past_eos = true;
                }
            } else {
                kept.push_back(pkt);
            }
        }
        state.packets = kept;
        if dropped {
            self.space_available.notify_all();
        }
    }

    fn create_stream(&self, sri: &Sri) {
        let stream = InputStream::create(sri.clone(), self.weak_self.clone());
        let mut streams = self.streams.lock();
        if streams
            .active
            .iter()
            .any(|s| s.stream_id() == sri.stream_id)
        {
            // An active stream holds this ID; the new instance waits until
            // the current one retires
            log::debug!("port '{}': pending stream '{}'", self.name, sri.stream_id);
            streams.pending.push(stream);
        } else {
            log::debug!("port '{}': new stream '{}'", self.name, sri.stream_id);
            streams.active.push(stream);
        }
    }

    /// Retire a stream handle; a pending instance with the same ID is
    /// promoted to active.
    pub(crate) fn remove_stream(&self, stream_id: &str) {
        log::debug!("port '{}': removing stream '{}'", self.name, stream_id);
        let mut streams = self.streams.lock();
        streams.active.retain(|s| s.stream_id() != stream_id);
        if let Some(pos) = streams
            .pending
            .iter()
            .position(|s| s.stream_id() == stream_id)
        {
            log::debug!(
                "port '{}': promoting pending stream '{}'",
                self.name,
                stream_id
            );
            let stream = streams.pending.remove(pos);
            streams.active.push(stream);
        }
    }

    fn is_stream_enabled(&self, stream_id: &str) -> bool {
        let streams = self.streams.lock();
        if streams.pending.iter().any(|s| s.stream_id() == stream_id) {
            // Packets now belong to the pending instance, which cannot have
            // been disabled yet
            return true;
        }
        match streams.active.iter().find(|s| s.stream_id() == stream_id) {
            Some(stream) => stream.is_enabled(),
            None => true,
        }
    }

    fn get_stream(&self, stream_id: &str) -> Option<InputStream<T>> {
        let streams = self.streams.lock();
        streams
            .active
            .iter()
            .find(|s| s.stream_id() == stream_id)
            .cloned()
    }

    fn current_stream(&self, blocking: bool) -> Option<InputStream<T>> {
        // Prefer a stream that already has buffered data
        {
            let streams = self.streams.lock();
            if let Some(stream) = streams.active.iter().find(|s| s.has_buffered_data()) {
                return Some(stream.clone());
            }
        }
        // Otherwise the stream owning the next queued packet
        let id = self.peek_stream_id(blocking)?;
        self.get_stream(&id)
    }

    fn ready_streams(&self, min_samples: usize) -> Vec<InputStream<T>> {
        let streams = self.streams.lock();
        streams
            .active
            .iter()
            .filter(|s| {
                if min_samples == 0 {
                    s.ready()
                } else {
                    s.samples_available() >= min_samples
                }
            })
            .cloned()
            .collect()
    }

    fn poll_streams(&self, min_samples: usize, blocking: bool) -> Vec<InputStream<T>> {
        let mut gate = self.poll_gate.lock();
        loop {
            let ready = self.ready_streams(min_samples);
            if !ready.is_empty() || !blocking {
                return ready;
            }
            if self.interrupted() {
                return Vec::new();
            }
            self.poll_ready.wait(&mut gate);
        }
    }

    fn interrupt(&self) {
        {
            let mut state = self.state.lock();
            state.interrupted = true;
            self.data_available.notify_all();
            self.space_available.notify_all();
        }
        let _gate = self.poll_gate.lock();
        self.poll_ready.notify_all();
    }

    fn resume(&self) {
        self.state.lock().interrupted = false;
    }
}

/// Receiver-side streaming port, generic over the payload element.
///
/// Clones share the same underlying port. Packets from all streams funnel
/// through one bounded FIFO; per-stream sample-accurate access goes
/// through [`InputStream`] handles.
///
/// # Example
/// ```
/// use sigport::{InPort, Sri, UtcTime};
///
/// let port: InPort<f32> = InPort::new("in_float");
/// port.push_sri(&Sri::for_stream("tuner_1"));
/// port.push_packet(&[0.0, 1.0, 2.0, 3.0], UtcTime::now(), false, "tuner_1");
///
/// let packet = port.try_get_packet().expect("packet queued");
/// assert_eq!(packet.buffer.len(), 4);
/// assert!(packet.sri_changed);
/// ```
pub struct InPort<T: Element> {
    inner: Arc<PortInner<T>>,
}

impl<T: Element> Clone for InPort<T> {
    fn clone(&self) -> Self {
        InPort {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Element> InPort<T> {
    /// Create a port with the stock field-exact SRI comparator.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self::with_comparator(name, Box::new(DefaultComparator))
    }

    /// Create a port with a substitute SRI equality policy.
    #[must_use]
    pub fn with_comparator(name: &str, comparator: Box<dyn SriComparator>) -> Self {
        InPort {
            inner: PortInner::new(name, comparator),
        }
    }

    /// Port name, for logs and statistics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Register or update a stream's metadata.
    pub fn push_sri(&self, sri: &Sri) {
        self.inner.push_sri(sri);
    }

    /// Queue a block of samples for a stream.
    ///
    /// Never fails: overflow is resolved by the flush policy and reported
    /// via the surviving packet's `queue_flushed` flag.
    pub fn push_packet(&self, data: &[T], time: UtcTime, eos: bool, stream_id: &str) {
        self.inner.push_packet(data, time, eos, stream_id);
    }

    /// Pop the oldest packet, waiting until one arrives.
    ///
    /// Returns `None` when the wait is interrupted via [`interrupt`].
    ///
    /// [`interrupt`]: InPort::interrupt
    pub fn get_packet(&self) -> Option<Packet<T>> {
        self.inner.next_packet(None, true)
    }

    /// Pop the oldest packet without waiting.
    pub fn try_get_packet(&self) -> Option<Packet<T>> {
        self.inner.next_packet(None, false)
    }

    /// Handle for a live stream; repeated calls before the stream's EOS is
    /// consumed return the same logical handle.
    #[must_use]
    pub fn get_stream(&self, stream_id: &str) -> Option<InputStream<T>> {
        self.inner.get_stream(stream_id)
    }

    /// Stream with ready data, earliest in arrival order; waits for a
    /// packet when none is buffered.
    pub fn current_stream(&self) -> Option<InputStream<T>> {
        self.inner.current_stream(true)
    }

    /// Non-waiting variant of [`current_stream`](InPort::current_stream).
    #[must_use]
    pub fn try_current_stream(&self) -> Option<InputStream<T>> {
        self.inner.current_stream(false)
    }

    /// All live stream handles.
    #[must_use]
    pub fn streams(&self) -> Vec<InputStream<T>> {
        self.inner.streams.lock().active.clone()
    }

    /// Wait until at least one stream has `min_samples` buffered
    /// (`min_samples == 0` means "ready"); returns the ready set.
    pub fn poll_streams(&self, min_samples: usize) -> Vec<InputStream<T>> {
        self.inner.poll_streams(min_samples, true)
    }

    /// Non-waiting variant of [`poll_streams`](InPort::poll_streams).
    #[must_use]
    pub fn try_poll_streams(&self, min_samples: usize) -> Vec<InputStream<T>> {
        self.inner.poll_streams(min_samples, false)
    }

    /// SRIs of all live (non-EOS-consumed) streams.
    #[must_use]
    pub fn active_sris(&self) -> Vec<Sri> {
        let state = self.inner.state.lock();
        state.sris.iter().map(|(_, s)| s.sri.clone()).collect()
    }

    /// IDs of all live streams, in arrival order.
    #[must_use]
    pub fn active_stream_ids(&self) -> Vec<String> {
        let state = self.inner.state.lock();
        state.sris.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Undelivered packets across all streams.
    #[must_use]
    pub fn current_queue_depth(&self) -> usize {
        self.inner.state.lock().packets.len()
    }

    /// Configured queue bound; 0 means unbounded.
    #[must_use]
    pub fn max_queue_depth(&self) -> usize {
        self.inner.state.lock().max_depth
    }

    /// Change the queue bound. Shrinking does not retroactively flush;
    /// the new bound applies at the next push.
    pub fn set_max_queue_depth(&self, depth: usize) {
        self.inner.state.lock().max_depth = depth;
    }

    /// Coarse load state for monitoring.
    #[must_use]
    pub fn state(&self) -> PortState {
        let state = self.inner.state.lock();
        if state.max_depth > 0 && state.packets.len() >= state.max_depth {
            PortState::Busy
        } else if state.packets.is_empty() {
            PortState::Idle
        } else {
            PortState::Active
        }
    }

    /// Wake every blocked wait on this port; they return "no data".
    /// Waits stay disarmed until [`resume`](InPort::resume).
    pub fn interrupt(&self) {
        self.inner.interrupt();
    }

    /// Re-arm blocking waits after an [`interrupt`](InPort::interrupt).
    pub fn resume(&self) {
        self.inner.resume();
    }

    /// Toggle rate collection.
    pub fn enable_stats(&self, enabled: bool) {
        self.inner.stats.lock().set_enabled(enabled);
    }

    /// Snapshot of the port's transfer rates.
    #[must_use]
    pub fn statistics(&self) -> PortStatistics {
        self.inner.stats.lock().retrieve()
    }
}

impl<T: Element> PacketSink<T> for InPort<T> {
    fn push_sri(&self, sri: &Sri) {
        InPort::push_sri(self, sri);
    }

    fn push_packet(&self, data: &[T], time: UtcTime, eos: bool, stream_id: &str) {
        InPort::push_packet(self, data, time, eos, stream_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn push(port: &InPort<i16>, stream: &str, len: usize) {
        let data = vec![0i16; len];
        port.push_packet(&data, UtcTime::now(), false, stream);
    }

    #[test]
    fn test_push_pop_fifo_across_streams() {
        let port: InPort<i16> = InPort::new("in_short");
        port.push_sri(&Sri::for_stream("a"));
        port.push_sri(&Sri::for_stream("b"));
        push(&port, "a", 8);
        push(&port, "b", 8);
        push(&port, "a", 8);

        assert_eq!(port.try_get_packet().map(|p| p.stream_id), Some("a".into()));
        assert_eq!(port.try_get_packet().map(|p| p.stream_id), Some("b".into()));
        assert_eq!(port.try_get_packet().map(|p| p.stream_id), Some("a".into()));
        assert!(port.try_get_packet().is_none());
    }

    #[test]
    fn test_first_packet_reports_sri_change() {
        let port: InPort<i16> = InPort::new("in_short");
        port.push_sri(&Sri::for_stream("a"));
        push(&port, "a", 4);
        push(&port, "a", 4);

        let first = port.try_get_packet().expect("first packet");
        assert!(first.sri_changed);
        let second = port.try_get_packet().expect("second packet");
        assert!(!second.sri_changed);
    }

    #[test]
    fn test_unknown_stream_gets_default_sri() {
        let port: InPort<i16> = InPort::new("in_short");
        push(&port, "mystery", 16);

        let pkt = port.try_get_packet().expect("packet for unknown stream");
        assert!(pkt.sri_changed);
        assert_eq!(pkt.sri.stream_id, "mystery");
        assert_eq!(pkt.sri.xdelta, 1.0);
        assert!(port.get_stream("mystery").is_some());
    }

    #[test]
    fn test_queue_bound_holds_single_stream() {
        let port: InPort<i16> = InPort::new("in_short");
        port.set_max_queue_depth(5);
        port.push_sri(&Sri::for_stream("a"));
        for _ in 0..50 {
            push(&port, "a", 4);
            assert!(port.current_queue_depth() <= 5);
        }
    }

    #[test]
    fn test_flush_keeps_newest_per_stream() {
        let port: InPort<i16> = InPort::new("in_short");
        port.push_sri(&Sri::for_stream("a"));
        port.push_sri(&Sri::for_stream("b"));
        // Fill below the bound, then shrink it so the next push flushes
        for value in 0..4i16 {
            port.push_packet(&[value; 4], UtcTime::now(), false, "a");
        }
        port.push_packet(&[9i16; 4], UtcTime::now(), false, "b");
        port.set_max_queue_depth(2);
        port.push_packet(&[7i16; 4], UtcTime::now(), false, "a");

        // Survivors: b's only packet and a's just-pushed packet
        let pkts: Vec<_> = std::iter::from_fn(|| port.try_get_packet()).collect();
        assert_eq!(pkts.len(), 2);
        let b = pkts.iter().find(|p| p.stream_id == "b").expect("b survives");
        assert_eq!(b.buffer, vec![9i16; 4]);
        assert!(!b.queue_flushed, "b lost no packets");
        let a = pkts.iter().find(|p| p.stream_id == "a").expect("a survives");
        assert_eq!(a.buffer, vec![7i16; 4], "newest payload wins");
        assert!(a.queue_flushed);
    }

    #[test]
    fn test_flush_carries_sri_change_forward() {
        let port: InPort<i16> = InPort::new("in_short");
        port.set_max_queue_depth(2);
        port.push_sri(&Sri::for_stream("a"));
        push(&port, "a", 4); // sri_changed=true (new stream), will be dropped
        push(&port, "a", 4);
        push(&port, "a", 4); // triggers flush of both older packets

        let pkt = port.try_get_packet().expect("survivor");
        assert!(pkt.queue_flushed);
        assert!(pkt.sri_changed, "dropped SRI-change flag must carry forward");
        assert!(port.try_get_packet().is_none());
    }

    #[test]
    fn test_flush_carries_eos_forward() {
        let port: InPort<i16> = InPort::new("in_short");
        port.set_max_queue_depth(2);
        port.push_sri(&Sri::for_stream("a"));
        port.push_sri(&Sri::for_stream("b"));
        push(&port, "a", 4);
        port.push_packet(&[], UtcTime::now(), true, "a"); // EOS for a
        // b's push overflows the queue; a's data packet is dropped while
        // its EOS survives as a's newest packet
        push(&port, "b", 4);

        let survivors: Vec<_> = std::iter::from_fn(|| port.try_get_packet()).collect();
        let a = survivors
            .iter()
            .find(|p| p.stream_id == "a")
            .expect("a's packet survives");
        assert!(a.eos);
        assert!(a.queue_flushed);
    }

    #[test]
    fn test_eos_retires_sri_on_delivery() {
        let port: InPort<i16> = InPort::new("in_short");
        port.push_sri(&Sri::for_stream("a"));
        push(&port, "a", 4);
        assert_eq!(port.active_stream_ids(), vec!["a"]);

        port.push_packet(&[], UtcTime::now(), true, "a");
        // Still live until the EOS packet is consumed
        assert_eq!(port.active_stream_ids(), vec!["a"]);
        let _ = port.try_get_packet();
        assert_eq!(port.active_stream_ids(), vec!["a"]);
        let eos = port.try_get_packet().expect("EOS packet");
        assert!(eos.eos);
        assert!(port.active_stream_ids().is_empty());
    }

    #[test]
    fn test_interrupt_wakes_blocked_getter() {
        let port: InPort<i16> = InPort::new("in_short");
        let waiter = port.clone();
        let handle = thread::spawn(move || waiter.get_packet());

        thread::sleep(Duration::from_millis(20));
        port.interrupt();
        let result = handle.join().expect("getter thread");
        assert!(result.is_none(), "interrupted wait returns no data");

        // Data pushed before resume is retained, not consumed
        port.resume();
        push(&port, "a", 4);
        assert!(port.try_get_packet().is_some());
    }

    #[test]
    fn test_blocking_sri_applies_backpressure() {
        let port: InPort<i16> = InPort::new("in_short");
        port.set_max_queue_depth(2);
        let mut sri = Sri::for_stream("a");
        sri.blocking = true;
        port.push_sri(&sri);
        push(&port, "a", 4);
        push(&port, "a", 4);

        let producer = port.clone();
        let handle = thread::spawn(move || {
            // Queue full: this push must wait for a pop instead of flushing
            producer.push_packet(&[1i16; 4], UtcTime::now(), false, "a");
        });
        thread::sleep(Duration::from_millis(20));
        assert_eq!(port.current_queue_depth(), 2, "push must be waiting");

        let popped = port.try_get_packet().expect("first packet");
        assert!(!popped.queue_flushed);
        handle.join().expect("producer thread");
        assert_eq!(port.current_queue_depth(), 2);
    }

    #[test]
    fn test_unbounded_queue_never_flushes() {
        let port: InPort<i16> = InPort::new("in_short");
        port.set_max_queue_depth(0);
        port.push_sri(&Sri::for_stream("a"));
        for _ in 0..500 {
            push(&port, "a", 1);
        }
        assert_eq!(port.current_queue_depth(), 500);
        assert_eq!(port.statistics().flushes, 0);
    }

    #[test]
    fn test_port_state_tracks_fill() {
        let port: InPort<i16> = InPort::new("in_short");
        port.set_max_queue_depth(2);
        assert_eq!(port.state(), PortState::Idle);
        push(&port, "a", 4);
        assert_eq!(port.state(), PortState::Active);
        push(&port, "a", 4);
        assert_eq!(port.state(), PortState::Busy);
    }

    #[test]
    fn test_empty_packet_without_eos_discarded() {
        let port: InPort<i16> = InPort::new("in_short");
        port.push_sri(&Sri::for_stream("a"));
        port.push_packet(&[], UtcTime::now(), false, "a");
        assert_eq!(port.current_queue_depth(), 0);
    }

    #[test]
    fn test_shrinking_bound_applies_at_next_push() {
        let port: InPort<i16> = InPort::new("in_short");
        port.push_sri(&Sri::for_stream("a"));
        for _ in 0..6 {
            push(&port, "a", 4);
        }
        port.set_max_queue_depth(2);
        // No retroactive flush
        assert_eq!(port.current_queue_depth(), 6);
        push(&port, "a", 4);
        assert_eq!(port.current_queue_depth(), 2);
    }
}
