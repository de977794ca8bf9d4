//! Inspect the shared motion history
//!
//! Maps the history region read-only and prints the header state plus the
//! newest samples. With `--follow` it keeps polling the publish counter
//! the way a sensor consumer would, reporting when the producer goes
//! stale.

use motion_io::history::HistoryReader;
use motion_io::sample::Sample;
use motion_io::transport::{delay_ms, now_ms};
use motion_io::{Error, Result};
use std::env;

/// Poll interval while following, in milliseconds.
const POLL_MS: u64 = 200;

/// An unchanged counter for this long means the producer is idle or gone.
const STALE_AFTER_MS: u64 = 1000;

/// Samples from the window tail shown in one-shot mode.
const TAIL_SAMPLES: usize = 8;

fn print_header(reader: &HistoryReader) {
    println!(
        "history: {} slots, counter {}, latest slot {}, oldest slot {}",
        reader.capacity(),
        reader.counter(),
        reader.latest_index(),
        reader.oldest_index()
    );
    println!("orientation code: {}", reader.orientation());
    match reader.tap() {
        (Some(direction), count) => println!("last tap: {direction:?} x{count}"),
        (None, _) => println!("last tap: none"),
    }
    let mag = reader.mag();
    println!("mag: [{:.1}, {:.1}, {:.1}]", mag[0], mag[1], mag[2]);
}

fn print_sample(seq: u64, sample: &Sample) {
    println!(
        "#{seq} t={} flags={:#05b} gyro=[{:+8.2}, {:+8.2}, {:+8.2}] dps \
         accel=[{:+6.3}, {:+6.3}, {:+6.3}] g quat=[{:+.4}, {:+.4}, {:+.4}, {:+.4}]",
        sample.timestamp_ms,
        sample.flags,
        sample.gyro[0],
        sample.gyro[1],
        sample.gyro[2],
        sample.accel[0],
        sample.accel[1],
        sample.accel[2],
        sample.quat[0],
        sample.quat[1],
        sample.quat[2],
        sample.quat[3]
    );
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let mut follow = false;
    let mut path = "/dev/shm/motion_history.shm".to_string();
    for arg in &args[1..] {
        match arg.as_str() {
            "--follow" | "-f" => follow = true,
            other if !other.starts_with('-') => path = other.to_string(),
            other => {
                eprintln!("Usage: history-dump [path] [--follow]");
                return Err(Error::InvalidParameter(format!("unknown flag: {other}")));
            }
        }
    }

    let reader = HistoryReader::open(&path)?;
    print_header(&reader);

    let window = reader.recent()?;
    println!("window: {} samples", window.len());
    let first_seq = reader.counter() - window.len() as u64 + 1;
    let tail = window.len().saturating_sub(TAIL_SAMPLES);
    for (offset, sample) in window.iter().enumerate().skip(tail) {
        print_sample(first_seq + offset as u64, sample);
    }

    if follow {
        let mut last_counter = reader.counter();
        let mut last_change_ms = now_ms();
        let mut reported_stale = false;
        loop {
            delay_ms(POLL_MS);
            let counter = reader.counter();
            if counter != last_counter {
                last_counter = counter;
                last_change_ms = now_ms();
                reported_stale = false;
                match reader.latest() {
                    Ok(Some(sample)) => print_sample(counter, &sample),
                    Ok(None) => {}
                    // Contended reads retry next poll.
                    Err(e) => log::warn!("latest read failed: {e}"),
                }
            } else if !reported_stale && now_ms().saturating_sub(last_change_ms) >= STALE_AFTER_MS {
                println!("(stale: counter stuck at {counter})");
                reported_stale = true;
            }
        }
    }

    Ok(())
}
