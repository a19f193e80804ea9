// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 sigport developers

//! Stream-level abstractions over packet delivery.
//!
//! - [`InputStream`]: sample-accurate reader for one received stream.
//! - [`OutputStream`]: per-stream writer with metadata-change elision.
//! - [`SampleBlock`] / [`SampleTimestamp`]: what a read hands back.

pub mod block;
pub mod in_stream;
pub mod out_stream;

pub use block::{SampleBlock, SampleTimestamp};
pub use in_stream::InputStream;
pub use out_stream::OutputStream;
