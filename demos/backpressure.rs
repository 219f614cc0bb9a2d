//! Backpressure walk-through: a fast producer against a slow consumer on
//! a deliberately tiny ring. Shows blocking pushes absorbing the mismatch
//! and timeouts surfacing when the consumer cannot keep up.
//!
//! Run with: `cargo run --example backpressure`

use std::time::{Duration, Instant};

use bytelane::{registry, ChannelConfig, PushError};

const MESSAGES: u32 = 200;

fn main() {
    let (mut producer, mut consumer) = registry()
        .request_channel(
            "demo.backpressure",
            ChannelConfig {
                capacity: 8,
                max_message_size: 64,
            },
        )
        .expect("failed to create channel");

    println!(
        "ring holds {} messages; producer will send {}",
        producer.capacity() - 1,
        MESSAGES
    );

    let consumer_thread = std::thread::spawn(move || {
        let mut received = 0u32;
        while let Ok(msg) = consumer.blocking_pop(Duration::from_secs(2)) {
            received += u32::from(msg[0] == 0xC7);
            // Simulate slow downstream processing.
            std::thread::sleep(Duration::from_micros(200));
        }
        println!("consumer drained {received} messages");
        consumer
    });

    let start = Instant::now();
    let mut timeouts = 0u32;
    for _ in 0..MESSAGES {
        match producer.blocking_push(&[0xC7; 16], Duration::from_millis(5)) {
            Ok(()) => {}
            Err(PushError::Timeout) => {
                timeouts += 1;
                // Retry once with a generous deadline.
                producer
                    .blocking_push(&[0xC7; 16], Duration::from_secs(2))
                    .expect("retry push");
            }
            Err(e) => panic!("push failed: {e}"),
        }
    }
    let elapsed = start.elapsed();

    let stats = producer.stats();
    println!(
        "producer sent {} messages in {elapsed:?} ({timeouts} short timeouts, {} recorded failures)",
        stats.messages_sent, stats.failed_pushes
    );

    drop(producer);
    let consumer = consumer_thread.join().unwrap();
    drop(consumer);
    assert!(registry().remove_channel("demo.backpressure"));
}
