//! Basic usage walk-through: create a named channel, stream messages from
//! a producer thread, and drain them with zero-copy pops until the
//! producer goes away.
//!
//! Run with: `cargo run --example basic_usage`

use std::time::Duration;

use bytelane::{registry, ChannelConfig, PopError};

fn main() {
    let (mut producer, mut consumer) = registry()
        .request_channel(
            "demo.basic",
            ChannelConfig {
                capacity: 64,
                max_message_size: 256,
            },
        )
        .expect("failed to create channel");

    println!(
        "channel created: capacity={} max_message_size={}",
        producer.capacity(),
        producer.max_message_size()
    );

    let producer_thread = std::thread::spawn(move || {
        // Copying push for ready-made payloads.
        for i in 0..5u32 {
            let payload = format!("message #{i}");
            producer
                .blocking_push(payload.as_bytes(), Duration::from_secs(1))
                .expect("push");
        }

        // Zero-copy push: build the payload directly in the ring slot.
        let buf = producer.reserve(64).expect("reserve");
        let text = b"built in place";
        buf[..text.len()].copy_from_slice(text);
        producer.commit(text.len()).expect("commit");

        let stats = producer.stats();
        println!(
            "producer done: {} messages, {} bytes",
            stats.messages_sent, stats.bytes_sent
        );
        // Dropping the endpoint signals the consumer.
    });

    loop {
        match consumer.blocking_pop(Duration::from_secs(1)) {
            Ok(msg) => println!("received {:3} bytes: {}", msg.len(), String::from_utf8_lossy(&msg)),
            Err(PopError::ChannelClosed) => {
                println!("producer gone, queue drained");
                break;
            }
            Err(e) => {
                println!("pop failed: {e}");
                break;
            }
        }
    }

    producer_thread.join().unwrap();

    let stats = consumer.stats();
    println!(
        "consumer done: {} messages, {} bytes",
        stats.messages_received, stats.bytes_received
    );

    drop(consumer);
    assert!(registry().remove_channel("demo.basic"));
}
