// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 sigport developers

//! Per-stream writer with metadata-change elision.
//!
//! An [`OutputStream`] owns the mutable SRI for one output stream. Every
//! setter only marks the record modified; the next [`write`] pushes the
//! SRI ahead of the data exactly when something changed (or on the first
//! write), so identical metadata is never re-sent.
//!
//! Closing the stream emits a zero-length end-of-stream packet under the
//! stream's last-known SRI.
//!
//! [`write`]: OutputStream::write

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::port::out_port::OutInner;
use crate::port::Element;
use crate::sri::{KeywordValue, Sri};
use crate::time::UtcTime;
use crate::{Error, Result};

struct WriterState {
    sri: Sri,
    /// SRI must be re-pushed before the next data packet.
    modified: bool,
    closed: bool,
}

struct OutStreamImpl<T: Element> {
    stream_id: String,
    port: Weak<OutInner<T>>,
    state: Mutex<WriterState>,
}

/// Handle for one output stream.
///
/// Handles are cheap to clone; all clones share the stream's SRI state.
/// Writers to different streams on the same port never contend on this
/// state.
pub struct OutputStream<T: Element> {
    inner: Arc<OutStreamImpl<T>>,
}

impl<T: Element> Clone for OutputStream<T> {
    fn clone(&self) -> Self {
        OutputStream {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Element> PartialEq for OutputStream<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Element> std::fmt::Debug for OutputStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStream")
            .field("stream_id", &self.inner.stream_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T: Element> OutputStream<T> {
    pub(crate) fn create(sri: Sri, port: Weak<OutInner<T>>) -> Self {
        OutputStream {
            inner: Arc::new(OutStreamImpl {
                stream_id: sri.stream_id.clone(),
                port,
                state: Mutex::new(WriterState {
                    sri,
                    // First write always announces the stream
                    modified: true,
                    closed: false,
                }),
            }),
        }
    }

    /// Stream identifier (immutable for the life of the stream).
    #[must_use]
    pub fn stream_id(&self) -> &str {
        &self.inner.stream_id
    }

    /// Current metadata record.
    #[must_use]
    pub fn sri(&self) -> Sri {
        self.inner.state.lock().sri.clone()
    }

    /// Overwrite all SRI fields except `stream_id`, which is immutable.
    pub fn set_sri(&self, sri: &Sri) {
        let mut st = self.inner.state.lock();
        let stream_id = st.sri.stream_id.clone();
        st.sri = sri.clone();
        st.sri.stream_id = stream_id;
        st.modified = true;
    }

    /// Set the primary-axis start.
    pub fn set_xstart(&self, xstart: f64) {
        let mut st = self.inner.state.lock();
        st.sri.xstart = xstart;
        st.modified = true;
    }

    /// Set the sample spacing.
    pub fn set_xdelta(&self, xdelta: f64) {
        let mut st = self.inner.state.lock();
        st.sri.xdelta = xdelta;
        st.modified = true;
    }

    /// Set the primary-axis unit code.
    pub fn set_xunits(&self, xunits: i16) {
        let mut st = self.inner.state.lock();
        st.sri.xunits = xunits;
        st.modified = true;
    }

    /// Set the frame size (0 for 1-D data).
    pub fn set_subsize(&self, subsize: u32) {
        let mut st = self.inner.state.lock();
        st.sri.subsize = subsize;
        st.modified = true;
    }

    /// Set the secondary-axis start.
    pub fn set_ystart(&self, ystart: f64) {
        let mut st = self.inner.state.lock();
        st.sri.ystart = ystart;
        st.modified = true;
    }

    /// Set the secondary-axis spacing.
    pub fn set_ydelta(&self, ydelta: f64) {
        let mut st = self.inner.state.lock();
        st.sri.ydelta = ydelta;
        st.modified = true;
    }

    /// Set the secondary-axis unit code.
    pub fn set_yunits(&self, yunits: i16) {
        let mut st = self.inner.state.lock();
        st.sri.yunits = yunits;
        st.modified = true;
    }

    /// Switch between real (false) and complex (true) samples.
    pub fn set_complex(&self, complex: bool) {
        let mut st = self.inner.state.lock();
        st.sri.mode = i16::from(complex);
        st.modified = true;
    }

    /// Request backpressure instead of overflow flush downstream.
    pub fn set_blocking(&self, blocking: bool) {
        let mut st = self.inner.state.lock();
        st.sri.blocking = blocking;
        st.modified = true;
    }

    /// Insert or replace a keyword.
    pub fn set_keyword<V: Into<KeywordValue>>(&self, name: &str, value: V) {
        let mut st = self.inner.state.lock();
        st.sri.set_keyword(name, value);
        st.modified = true;
    }

    /// Remove a keyword.
    pub fn erase_keyword(&self, name: &str) {
        let mut st = self.inner.state.lock();
        if st.sri.erase_keyword(name) {
            st.modified = true;
        }
    }

    /// Write a block of samples with the timestamp of its first sample.
    ///
    /// Pushes the SRI first when anything changed since the last write
    /// (or on the stream's first write); otherwise data only.
    pub fn write(&self, data: &[T], time: UtcTime) -> Result<()> {
        let port = self
            .inner
            .port
            .upgrade()
            .ok_or_else(|| Error::PortDetached(self.inner.stream_id.clone()))?;
        let mut st = self.inner.state.lock();
        if st.closed {
            return Err(Error::StreamClosed(self.inner.stream_id.clone()));
        }
        if st.modified {
            port.push_sri(&st.sri)?;
            st.modified = false;
        }
        port.push_packet(data, time, false, &self.inner.stream_id)
    }

    /// Close the stream, emitting a zero-length end-of-stream packet under
    /// the last-known SRI. Idempotent; further writes fail.
    pub fn close(&self) -> Result<()> {
        let port = self
            .inner
            .port
            .upgrade()
            .ok_or_else(|| Error::PortDetached(self.inner.stream_id.clone()))?;
        let mut st = self.inner.state.lock();
        if st.closed {
            return Ok(());
        }
        if st.modified {
            port.push_sri(&st.sri)?;
            st.modified = false;
        }
        port.push_packet(&[], UtcTime::not_set(), true, &self.inner.stream_id)?;
        st.closed = true;
        drop(st);
        port.drop_stream(&self.inner.stream_id);
        Ok(())
    }

    /// True once [`close`](OutputStream::close) has completed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }
}
