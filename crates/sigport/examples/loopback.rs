// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 sigport developers

//! In-process loopback: a writer streams chirp samples through an output
//! port wired directly to an input port, and a reader thread consumes
//! them in fixed-size blocks.
//!
//! Run with: `cargo run --example loopback`

use std::sync::Arc;
use std::thread;

use sigport::{InPort, OutPort, Sri, UtcTime};

const SAMPLE_RATE: f64 = 250_000.0;
const BLOCK: usize = 2048;

fn main() {
    let out: OutPort<f32> = OutPort::new("chirp_out");
    let dest: InPort<f32> = InPort::new("chirp_in");
    out.add_connection("loopback", Arc::new(dest.clone()));

    let reader = thread::spawn(move || {
        let stream = loop {
            if let Some(stream) = dest.current_stream() {
                break stream;
            }
        };
        let mut total = 0usize;
        while let Some(block) = stream.read(BLOCK) {
            let first = block.timestamps()[0];
            println!(
                "read {:5} samples @ {} (synthetic={}, sri_changed={})",
                block.len(),
                first.time,
                first.synthetic,
                block.sri_changed()
            );
            total += block.len();
        }
        println!("stream ended after {} samples", total);
    });

    let mut sri = Sri::for_stream("chirp_1");
    sri.xdelta = 1.0 / SAMPLE_RATE;
    sri.set_keyword("COL_RF", 101.5e6);
    let writer = out.create_stream(sri).expect("create stream");

    // Deliberately odd packet sizes; the reader still sees 2048-sample
    // blocks with accurate timestamps
    let mut t = UtcTime::now();
    let mut phase = 0f64;
    for packet_len in [700usize, 1300, 900, 2200, 1500, 1592] {
        let data: Vec<f32> = (0..packet_len)
            .map(|i| {
                let x = phase + i as f64 / SAMPLE_RATE;
                (2.0 * std::f64::consts::PI * 1000.0 * x * x).sin() as f32
            })
            .collect();
        writer.write(&data, t).expect("write");
        t += packet_len as f64 / SAMPLE_RATE;
        phase += packet_len as f64 / SAMPLE_RATE;
    }
    writer.close().expect("close");

    reader.join().expect("reader thread");
}
