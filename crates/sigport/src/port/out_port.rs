// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 sigport developers

//! Sender-side port: connection fan-out with per-stream routing.
//!
//! An [`OutPort`] forwards SRI updates and data packets to every connected
//! [`PacketSink`], subject to the connection filter table. With an empty
//! table every connection receives every stream; a non-empty table
//! restricts each *listed* connection to its named streams, while
//! connections the table never mentions stay unrestricted.
//!
//! Per-stream write state lives in [`OutputStream`] handles; writers to
//! different streams on the same port do not contend on SRI bookkeeping.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::port::{Element, PacketSink, PortState};
use crate::sri::Sri;
use crate::stats::{LinkStatistics, PortStatistics};
use crate::stream::out_stream::OutputStream;
use crate::time::UtcTime;
use crate::{Error, Result};

/// One row of the connection filter table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterEntry {
    /// Connection the rule applies to.
    pub connection_id: String,
    /// Stream routed to that connection.
    pub stream_id: String,
}

impl FilterEntry {
    /// Convenience constructor.
    #[must_use]
    pub fn new(connection_id: &str, stream_id: &str) -> Self {
        FilterEntry {
            connection_id: connection_id.to_string(),
            stream_id: stream_id.to_string(),
        }
    }
}

struct Connection<T: Element> {
    id: String,
    sink: Arc<dyn PacketSink<T>>,
}

/// Shared state behind an [`OutPort`] and its [`OutputStream`] handles.
pub(crate) struct OutInner<T: Element> {
    name: String,
    connections: Mutex<Vec<Connection<T>>>,
    filter: Mutex<Vec<FilterEntry>>,
    /// Last pushed SRI per open stream, for late-joining connections.
    sri_table: Mutex<Vec<(String, Sri)>>,
    streams: DashMap<String, OutputStream<T>>,
    stats: Mutex<LinkStatistics>,
}

/// True when `stream_id` is routed to `connection_id` under `table`.
fn routed(table: &[FilterEntry], connection_id: &str, stream_id: &str) -> bool {
    if table.is_empty() {
        return true;
    }
    let mut listed = false;
    for entry in table {
        if entry.connection_id == connection_id {
            if entry.stream_id == stream_id {
                return true;
            }
            listed = true;
        }
    }
    // A connection the table never names is unrestricted
    !listed
}

impl<T: Element> OutInner<T> {
    pub(crate) fn push_sri(&self, sri: &Sri) -> Result<()> {
        if sri.stream_id.is_empty() {
            return Err(Error::InvalidStreamId(String::new()));
        }
        {
            let mut table = self.sri_table.lock();
            match table.iter_mut().find(|(id, _)| id == &sri.stream_id) {
                Some((_, held)) => *held = sri.clone(),
                None => table.push((sri.stream_id.clone(), sri.clone())),
            }
        }
        let filter = self.filter.lock().clone();
        let connections = self.connections.lock();
        for conn in connections.iter() {
            if routed(&filter, &conn.id, &sri.stream_id) {
                conn.sink.push_sri(sri);
            }
        }
        Ok(())
    }

    pub(crate) fn push_packet(
        &self,
        data: &[T],
        time: UtcTime,
        eos: bool,
        stream_id: &str,
    ) -> Result<()> {
        if stream_id.is_empty() {
            return Err(Error::InvalidStreamId(String::new()));
        }
        self.stats
            .lock()
            .update(data.len(), 0.0, eos, stream_id, false);
        let filter = self.filter.lock().clone();
        {
            let connections = self.connections.lock();
            for conn in connections.iter() {
                if routed(&filter, &conn.id, stream_id) {
                    conn.sink.push_packet(data, time, eos, stream_id);
                }
            }
        }
        if eos {
            self.sri_table.lock().retain(|(id, _)| id != stream_id);
        }
        Ok(())
    }

    pub(crate) fn drop_stream(&self, stream_id: &str) {
        self.streams.remove(stream_id);
    }
}

/// Sender-side streaming port, generic over the payload element.
///
/// Clones share the same underlying port.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use sigport::{InPort, OutPort, Sri, UtcTime};
///
/// let out: OutPort<f32> = OutPort::new("out_float");
/// let dest: InPort<f32> = InPort::new("in_float");
/// out.add_connection("conn_1", Arc::new(dest.clone()));
///
/// let stream = out.create_stream(Sri::for_stream("tuner_1")).unwrap();
/// stream.write(&[0.0, 1.0], UtcTime::now()).unwrap();
///
/// let packet = dest.try_get_packet().expect("delivered");
/// assert!(packet.sri_changed);
/// ```
pub struct OutPort<T: Element> {
    inner: Arc<OutInner<T>>,
}

impl<T: Element> Clone for OutPort<T> {
    fn clone(&self) -> Self {
        OutPort {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Element> OutPort<T> {
    /// Create a port with no connections.
    #[must_use]
    pub fn new(name: &str) -> Self {
        log::debug!("OutPort '{}' created", name);
        OutPort {
            inner: Arc::new(OutInner {
                name: name.to_string(),
                connections: Mutex::new(Vec::new()),
                filter: Mutex::new(Vec::new()),
                sri_table: Mutex::new(Vec::new()),
                streams: DashMap::new(),
                stats: Mutex::new(LinkStatistics::new(name, T::BITS)),
            }),
        }
    }

    /// Port name, for logs and statistics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Attach a downstream sink. A connection added mid-flight receives
    /// the current SRI of every stream routed to it before any data.
    /// Re-using a connection ID replaces the previous sink.
    pub fn add_connection(&self, connection_id: &str, sink: Arc<dyn PacketSink<T>>) {
        log::debug!(
            "port '{}': connect '{}'",
            self.inner.name,
            connection_id
        );
        let filter = self.inner.filter.lock().clone();
        {
            let sris = self.inner.sri_table.lock();
            for (stream_id, sri) in sris.iter() {
                if routed(&filter, connection_id, stream_id) {
                    sink.push_sri(sri);
                }
            }
        }
        let mut connections = self.inner.connections.lock();
        if let Some(existing) = connections.iter_mut().find(|c| c.id == connection_id) {
            log::warn!(
                "port '{}': replacing connection '{}'",
                self.inner.name,
                connection_id
            );
            existing.sink = sink;
        } else {
            connections.push(Connection {
                id: connection_id.to_string(),
                sink,
            });
        }
    }

    /// Detach a downstream sink.
    pub fn remove_connection(&self, connection_id: &str) -> Result<()> {
        let mut connections = self.inner.connections.lock();
        let before = connections.len();
        connections.retain(|c| c.id != connection_id);
        if connections.len() == before {
            return Err(Error::UnknownConnection(connection_id.to_string()));
        }
        log::debug!(
            "port '{}': disconnect '{}'",
            self.inner.name,
            connection_id
        );
        Ok(())
    }

    /// IDs of the attached connections, in attach order.
    #[must_use]
    pub fn connection_ids(&self) -> Vec<String> {
        self.inner
            .connections
            .lock()
            .iter()
            .map(|c| c.id.clone())
            .collect()
    }

    /// Replace the connection filter table. Streams newly routed to a
    /// connection get their current SRI re-pushed; receivers deduplicate
    /// identical records.
    pub fn set_filter_table(&self, entries: Vec<FilterEntry>) {
        *self.inner.filter.lock() = entries;
        let filter = self.inner.filter.lock().clone();
        let sris = self.inner.sri_table.lock().clone();
        let connections = self.inner.connections.lock();
        for conn in connections.iter() {
            for (stream_id, sri) in &sris {
                if routed(&filter, &conn.id, stream_id) {
                    conn.sink.push_sri(sri);
                }
            }
        }
    }

    /// Current filter table.
    #[must_use]
    pub fn filter_table(&self) -> Vec<FilterEntry> {
        self.inner.filter.lock().clone()
    }

    /// Open a stream for writing. Returns the existing handle when the ID
    /// is already open.
    pub fn create_stream(&self, sri: Sri) -> Result<OutputStream<T>> {
        if sri.stream_id.is_empty() {
            return Err(Error::InvalidStreamId(String::new()));
        }
        if let Some(existing) = self.inner.streams.get(&sri.stream_id) {
            return Ok(existing.clone());
        }
        let stream = OutputStream::create(sri.clone(), Arc::downgrade(&self.inner));
        self.inner
            .streams
            .insert(sri.stream_id.clone(), stream.clone());
        Ok(stream)
    }

    /// Handle for an open stream.
    #[must_use]
    pub fn get_stream(&self, stream_id: &str) -> Option<OutputStream<T>> {
        self.inner.streams.get(stream_id).map(|s| s.clone())
    }

    /// All open stream handles.
    #[must_use]
    pub fn streams(&self) -> Vec<OutputStream<T>> {
        self.inner.streams.iter().map(|s| s.clone()).collect()
    }

    /// Push a metadata record to all routed connections.
    ///
    /// Fails fast on an empty stream ID; that is a programming error,
    /// never silently substituted.
    pub fn push_sri(&self, sri: &Sri) -> Result<()> {
        self.inner.push_sri(sri)
    }

    /// Push a data packet to all routed connections.
    pub fn push_packet(&self, data: &[T], time: UtcTime, eos: bool, stream_id: &str) -> Result<()> {
        self.inner.push_packet(data, time, eos, stream_id)
    }

    /// SRIs of all open streams.
    #[must_use]
    pub fn active_sris(&self) -> Vec<Sri> {
        self.inner
            .sri_table
            .lock()
            .iter()
            .map(|(_, sri)| sri.clone())
            .collect()
    }

    /// Coarse state: idle without connections, active otherwise.
    #[must_use]
    pub fn state(&self) -> PortState {
        if self.inner.connections.lock().is_empty() {
            PortState::Idle
        } else {
            PortState::Active
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::InPort;

    /// Sink that records what it is handed, for fan-out assertions.
    #[derive(Default)]
    struct RecordingSink {
        sris: Mutex<Vec<Sri>>,
        packets: Mutex<Vec<(String, usize, bool)>>,
    }

    impl RecordingSink {
        fn sri_count(&self) -> usize {
            self.sris.lock().len()
        }

        fn packet_streams(&self) -> Vec<String> {
            self.packets.lock().iter().map(|(id, _, _)| id.clone()).collect()
        }
    }

    impl PacketSink<f32> for RecordingSink {
        fn push_sri(&self, sri: &Sri) {
            self.sris.lock().push(sri.clone());
        }

        fn push_packet(&self, data: &[f32], _time: UtcTime, eos: bool, stream_id: &str) {
            self.packets
                .lock()
                .push((stream_id.to_string(), data.len(), eos));
        }
    }

    #[test]
    fn test_empty_stream_id_fails_fast() {
        let port: OutPort<f32> = OutPort::new("out_float");
        assert!(matches!(
            port.create_stream(Sri::for_stream("")),
            Err(Error::InvalidStreamId(_))
        ));
        assert!(matches!(
            port.push_sri(&Sri::for_stream("")),
            Err(Error::InvalidStreamId(_))
        ));
        assert!(matches!(
            port.push_packet(&[1.0], UtcTime::now(), false, ""),
            Err(Error::InvalidStreamId(_))
        ));
    }

    #[test]
    fn test_broadcast_without_filter_table() {
        let port: OutPort<f32> = OutPort::new("out_float");
        let a = Arc::new(RecordingSink::default());
        let b = Arc::new(RecordingSink::default());
        port.add_connection("a", a.clone());
        port.add_connection("b", b.clone());

        port.push_sri(&Sri::for_stream("s1")).expect("push_sri");
        port.push_packet(&[1.0, 2.0], UtcTime::now(), false, "s1")
            .expect("push_packet");

        assert_eq!(a.sri_count(), 1);
        assert_eq!(b.sri_count(), 1);
        assert_eq!(a.packet_streams(), vec!["s1"]);
        assert_eq!(b.packet_streams(), vec!["s1"]);
    }

    #[test]
    fn test_filter_table_restricts_listed_connections() {
        let port: OutPort<f32> = OutPort::new("out_float");
        let a = Arc::new(RecordingSink::default());
        let b = Arc::new(RecordingSink::default());
        port.add_connection("a", a.clone());
        port.add_connection("b", b.clone());
        port.set_filter_table(vec![FilterEntry::new("a", "s1")]);

        port.push_sri(&Sri::for_stream("s1")).expect("push s1");
        port.push_sri(&Sri::for_stream("s2")).expect("push s2");
        port.push_packet(&[1.0], UtcTime::now(), false, "s1").expect("s1 data");
        port.push_packet(&[2.0], UtcTime::now(), false, "s2").expect("s2 data");

        // "a" is listed: only its named stream arrives
        assert_eq!(a.packet_streams(), vec!["s1"]);
        // "b" is never named: unrestricted
        assert_eq!(b.packet_streams(), vec!["s1", "s2"]);
    }

    #[test]
    fn test_late_joiner_receives_active_sris() {
        let port: OutPort<f32> = OutPort::new("out_float");
        port.push_sri(&Sri::for_stream("s1")).expect("push_sri");

        let late = Arc::new(RecordingSink::default());
        port.add_connection("late", late.clone());
        assert_eq!(late.sri_count(), 1);
        assert_eq!(late.sris.lock()[0].stream_id, "s1");
    }

    #[test]
    fn test_eos_retires_stream_from_sri_table() {
        let port: OutPort<f32> = OutPort::new("out_float");
        port.push_sri(&Sri::for_stream("s1")).expect("push_sri");
        assert_eq!(port.active_sris().len(), 1);
        port.push_packet(&[], UtcTime::not_set(), true, "s1")
            .expect("eos");
        assert!(port.active_sris().is_empty());
    }

    #[test]
    fn test_remove_connection_unknown_id() {
        let port: OutPort<f32> = OutPort::new("out_float");
        port.add_connection("a", Arc::new(RecordingSink::default()));
        assert!(port.remove_connection("a").is_ok());
        assert!(matches!(
            port.remove_connection("a"),
            Err(Error::UnknownConnection(_))
        ));
    }

    #[test]
    fn test_end_to_end_delivery_to_in_port() {
        let out: OutPort<f32> = OutPort::new("out_float");
        let dest: InPort<f32> = InPort::new("in_float");
        out.add_connection("loop", Arc::new(dest.clone()));

        out.push_sri(&Sri::for_stream("s")).expect("sri");
        out.push_packet(&[1.0, 2.0, 3.0], UtcTime::now(), false, "s")
            .expect("data");

        let pkt = dest.try_get_packet().expect("delivered");
        assert_eq!(pkt.buffer, vec![1.0, 2.0, 3.0]);
        assert!(pkt.sri_changed);
        assert_eq!(pkt.sri.stream_id, "s");
    }

    #[test]
    fn test_port_state_follows_connections() {
        let port: OutPort<f32> = OutPort::new("out_float");
        assert_eq!(port.state(), PortState::Idle);
        port.add_connection("a", Arc::new(RecordingSink::default()));
        assert_eq!(port.state(), PortState::Active);
    }
}
