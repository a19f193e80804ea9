// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 sigport developers

//! # sigport — streaming sample ports for SDR pipelines
//!
//! Typed, multiplexed streaming ports that move blocks of samples (plus
//! timing and format metadata) between signal-processing stages, with
//! bounded queuing, overflow handling, and a sample-accurate reader
//! layered on top of packet-oriented delivery.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use sigport::{InPort, OutPort, Sri, UtcTime};
//!
//! // Producer side: an output port fanning out to connections
//! let out: OutPort<f32> = OutPort::new("samples_out");
//! let dest: InPort<f32> = InPort::new("samples_in");
//! out.add_connection("conn_1", Arc::new(dest.clone()));
//!
//! // One writer per stream; metadata pushes are elided when unchanged
//! let mut sri = Sri::for_stream("tuner_1");
//! sri.xdelta = 1.0 / 250_000.0;
//! let writer = out.create_stream(sri).unwrap();
//! writer.write(&vec![0.0f32; 1024], UtcTime::now()).unwrap();
//!
//! // Consumer side: sample-accurate reads, regardless of packetization
//! let reader = dest.get_stream("tuner_1").unwrap();
//! let block = reader.read(512).unwrap();
//! assert_eq!(block.len(), 512);
//! assert!(!block.timestamps()[0].synthetic);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                          Producer stage                            |
//! |   OutputStream (SRI diff, EOS on close) -> OutPort (filter table)  |
//! +--------------------------------------------------------------------+
//! |                     Transport (external, RPC)                      |
//! |                      abstracted as PacketSink                      |
//! +--------------------------------------------------------------------+
//! |                          Consumer stage                            |
//! |   InPort (bounded queue, overflow flush) -> InputStream            |
//! |   (per-stream demux, sample slicing, timestamp synthesis)          |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`InPort`] | Receiver port: bounded multi-stream packet queue |
//! | [`InputStream`] | Sample-accurate reader for one received stream |
//! | [`OutPort`] | Sender port: connection fan-out with stream routing |
//! | [`OutputStream`] | Per-stream writer with metadata-change elision |
//! | [`SampleBlock`] | Contiguous samples plus timestamps and SRI diff |
//! | [`Sri`] | Stream metadata record with field-level change masks |
//! | [`UtcTime`] | Split whole/fractional-seconds UTC timestamp |
//!
//! ## Overflow policy
//!
//! A full input queue is never an error: the port flushes, keeping each
//! stream's newest packet and folding the dropped packets' flags into it.
//! The loss is reported on the surviving packet (`queue_flushed`), never
//! as an exception.

/// Receiver and sender ports (packet queue, connection fan-out).
pub mod port;
/// Stream metadata records and change detection.
pub mod sri;
/// Port link statistics.
pub mod stats;
/// Readers, writers, and sample blocks.
pub mod stream;
/// Precision UTC timestamps.
pub mod time;

pub use port::{
    Bit, Element, FileUri, FilterEntry, InPort, OutPort, Packet, PacketSink, PortState,
    XmlDocument,
};
pub use sri::{DefaultComparator, Keyword, KeywordValue, Sri, SriChanges, SriComparator};
pub use stats::PortStatistics;
pub use stream::{InputStream, OutputStream, SampleBlock, SampleTimestamp};
pub use time::{TimeSource, TimeStatus, UtcTime};

/// Errors returned by sigport write-side operations.
///
/// The read side never errors: reading past end-of-stream or from an
/// unknown stream returns "no data", and queue overflow is resolved by
/// the flush policy.
#[derive(Debug)]
pub enum Error {
    /// Stream metadata carried an empty stream ID (programming error,
    /// failed fast rather than silently substituted).
    InvalidStreamId(String),
    /// Write attempted on a closed stream.
    StreamClosed(String),
    /// Connection ID not present on the port.
    UnknownConnection(String),
    /// The owning port was dropped while a stream handle was in use.
    PortDetached(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidStreamId(_) => write!(f, "stream ID must not be empty"),
            Error::StreamClosed(id) => write!(f, "stream '{}' is closed", id),
            Error::UnknownConnection(id) => write!(f, "no connection '{}'", id),
            Error::PortDetached(id) => write!(f, "port for stream '{}' no longer exists", id),
        }
    }
}

impl std::error::Error for Error {}

/// Convenient alias for API results using the public [`Error`] type.
pub type Result<T> = core::result::Result<T, Error>;

/// sigport version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
