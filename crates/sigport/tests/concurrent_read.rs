// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 sigport developers

//! Concurrency behavior: blocking reads, cancellation, producer/consumer
//! threading across the port boundary.

use std::thread;
use std::time::Duration;

use sigport::{InPort, Sri, UtcTime};

fn ramp(start: i32, len: usize) -> Vec<f32> {
    (0..len).map(|i| (start + i as i32) as f32).collect()
}

#[test]
fn test_blocking_read_wakes_on_push() {
    let port: InPort<f32> = InPort::new("in_float");
    port.push_sri(&Sri::for_stream("s"));
    let stream = port.get_stream("s").expect("stream");

    let producer = port.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        producer.push_packet(&ramp(0, 32), UtcTime::now(), false, "s");
    });

    let block = stream.read(32).expect("woken by push");
    assert_eq!(block.len(), 32);
    handle.join().expect("producer");
}

#[test]
fn test_interrupted_read_keeps_arrived_samples() {
    let port: InPort<f32> = InPort::new("in_float");
    port.push_sri(&Sri::for_stream("s"));
    let stream = port.get_stream("s").expect("stream");

    // Less than the reader wants
    port.push_packet(&ramp(0, 60), UtcTime::now(), false, "s");

    let reader = stream.clone();
    let handle = thread::spawn(move || reader.read(100));

    thread::sleep(Duration::from_millis(30));
    port.interrupt();
    let result = handle.join().expect("reader thread");
    assert!(result.is_none(), "cancelled wait returns no data");

    // Nothing was consumed; the retry sees old plus new samples
    port.resume();
    port.push_packet(&ramp(60, 40), UtcTime::now(), false, "s");
    let block = stream.read(100).expect("retry succeeds");
    assert_eq!(block.len(), 100);
    assert_eq!(block.buffer(), &ramp(0, 100)[..]);
}

#[test]
fn test_producer_consumer_stream_integrity() {
    let port: InPort<f32> = InPort::new("in_float");
    port.set_max_queue_depth(0); // unbounded: no flush losses in this test
    port.push_sri(&Sri::for_stream("s"));
    let stream = port.get_stream("s").expect("stream");

    const TOTAL: usize = 4096;
    let producer = port.clone();
    let handle = thread::spawn(move || {
        fastrand::seed(42);
        let mut sent = 0usize;
        while sent < TOTAL {
            let len = fastrand::usize(1..=64).min(TOTAL - sent);
            producer.push_packet(&ramp(sent as i32, len), UtcTime::now(), false, "s");
            sent += len;
            if fastrand::bool() {
                thread::yield_now();
            }
        }
        producer.push_packet(&[], UtcTime::now(), true, "s");
    });

    let mut received: Vec<f32> = Vec::with_capacity(TOTAL);
    while let Some(block) = stream.read_between(1, 300) {
        received.extend_from_slice(block.buffer());
    }
    handle.join().expect("producer");

    assert_eq!(received.len(), TOTAL, "no samples lost or duplicated");
    assert_eq!(received, ramp(0, TOTAL));
    assert!(stream.eos());
}

#[test]
fn test_poll_streams_wakes_on_push() {
    let port: InPort<f32> = InPort::new("in_float");
    port.push_sri(&Sri::for_stream("a"));
    port.push_sri(&Sri::for_stream("b"));

    let producer = port.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        producer.push_packet(&ramp(0, 16), UtcTime::now(), false, "b");
    });

    let ready = port.poll_streams(16);
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].stream_id(), "b");
    handle.join().expect("producer");
}

#[test]
fn test_concurrent_pushers_multiplex_one_queue() {
    let port: InPort<i32> = InPort::new("in_long");
    port.set_max_queue_depth(0);
    let mut handles = Vec::new();
    for worker in 0..4 {
        let producer = port.clone();
        handles.push(thread::spawn(move || {
            let id = format!("w{}", worker);
            producer.push_sri(&Sri::for_stream(&id));
            for _ in 0..50 {
                producer.push_packet(&[worker; 16], UtcTime::now(), false, &id);
            }
        }));
    }
    for handle in handles {
        handle.join().expect("pusher");
    }

    assert_eq!(port.current_queue_depth(), 200);
    let mut counts = [0usize; 4];
    while let Some(pkt) = port.try_get_packet() {
        let idx = pkt.buffer[0] as usize;
        assert_eq!(pkt.buffer, vec![idx as i32; 16]);
        counts[idx] += 1;
    }
    assert_eq!(counts, [50, 50, 50, 50]);
}
