// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 sigport developers

//! Port link statistics.
//!
//! A sliding window of the last few transfers, reduced to rate figures on
//! demand. Collection is cheap enough to leave on, but can be disabled per
//! port via `enable_stats(false)`.

use std::collections::VecDeque;
use std::time::Instant;

/// Number of transfers the rate window covers.
const WINDOW: usize = 10;

/// Snapshot of a port's transfer rates.
#[derive(Debug, Clone)]
pub struct PortStatistics {
    /// Name of the port that produced this snapshot.
    pub port_name: String,
    /// Samples per second over the window.
    pub elements_per_second: f64,
    /// Bits per second over the window.
    pub bits_per_second: f64,
    /// Push/pop calls per second over the window.
    pub calls_per_second: f64,
    /// Mean queue fill ratio (0.0 = empty, 1.0 = at bound).
    pub average_queue_depth: f64,
    /// Seconds since the most recent transfer.
    pub time_since_last_call: f64,
    /// Stream IDs seen since the last EOS for each.
    pub stream_ids: Vec<String>,
    /// Number of queue-flush episodes (overflow drops).
    pub flushes: u64,
}

#[derive(Debug)]
struct TransferPoint {
    elements: usize,
    queue_fill: f64,
    at: Instant,
}

/// Per-port sliding-window rate tracker.
#[derive(Debug)]
pub(crate) struct LinkStatistics {
    port_name: String,
    bits_per_element: usize,
    enabled: bool,
    window: VecDeque<TransferPoint>,
    stream_ids: Vec<String>,
    flushes: u64,
}

impl LinkStatistics {
    pub(crate) fn new(port_name: &str, bits_per_element: usize) -> Self {
        LinkStatistics {
            port_name: port_name.to_string(),
            bits_per_element,
            enabled: true,
            window: VecDeque::with_capacity(WINDOW),
            stream_ids: Vec::new(),
            flushes: 0,
        }
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.window.clear();
        }
    }

    /// Record one transfer. `queue_fill` is the post-transfer fill ratio;
    /// EOS retires the stream ID from the active list.
    pub(crate) fn update(
        &mut self,
        elements: usize,
        queue_fill: f64,
        eos: bool,
        stream_id: &str,
        flushed: bool,
    ) {
        if flushed {
            self.flushes += 1;
        }
        if eos {
            self.stream_ids.retain(|id| id != stream_id);
        } else if !self.stream_ids.iter().any(|id| id == stream_id) {
            self.stream_ids.push(stream_id.to_string());
        }
        if !self.enabled {
            return;
        }
        if self.window.len() == WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(TransferPoint {
            elements,
            queue_fill,
            at: Instant::now(),
        });
    }

    pub(crate) fn retrieve(&self) -> PortStatistics {
        let mut stats = PortStatistics {
            port_name: self.port_name.clone(),
            elements_per_second: 0.0,
            bits_per_second: 0.0,
            calls_per_second: 0.0,
            average_queue_depth: 0.0,
            time_since_last_call: 0.0,
            stream_ids: self.stream_ids.clone(),
            flushes: self.flushes,
        };

        let Some(oldest) = self.window.front() else {
            return stats;
        };
        let Some(newest) = self.window.back() else {
            return stats;
        };

        stats.time_since_last_call = newest.at.elapsed().as_secs_f64();

        let span = newest.at.duration_since(oldest.at).as_secs_f64();
        if span > 0.0 {
            let elements: usize = self.window.iter().map(|p| p.elements).sum();
            stats.elements_per_second = elements as f64 / span;
            stats.bits_per_second = stats.elements_per_second * self.bits_per_element as f64;
            stats.calls_per_second = self.window.len() as f64 / span;
        }
        stats.average_queue_depth =
            self.window.iter().map(|p| p.queue_fill).sum::<f64>() / self.window.len() as f64;
        stats
    }
}
