//! Demonstration of a small conference on the bridge.
//!
//! Three memory-backed callers emit test tones, everyone hears everyone
//! else, and the per-port signal levels are printed as a VU readout.
//!
//! Run with: cargo run --example loopback
#![allow(missing_docs)]

use tertulia_bridge::{AudioFormat, Bridge, BridgeParams, MemoryPort};

const RATE: f32 = 8000.0;

fn tone(freq: f32, amplitude: f32, len: usize) -> Vec<i16> {
    (0..len)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * freq * i as f32 / RATE;
            (phase.sin() * amplitude) as i16
        })
        .collect()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tertulia_bridge=debug".into()),
        )
        .init();

    let bridge = Bridge::create(BridgeParams::default()).expect("bridge creation");
    bridge.set_op_cb(|info| {
        println!("op {:?} completed: {:?}", info.kind, info.status);
    });

    let fmt = AudioFormat::new(8000, 1, 160);
    let tones = [(440.0, 12000.0), (660.0, 8000.0), (880.0, 4000.0)];

    let mut slots = Vec::new();
    for (i, &(freq, amp)) in tones.iter().enumerate() {
        let port = MemoryPort::with_playback(
            format!("caller-{i}"),
            fmt,
            tone(freq, amp, 8000),
            true,
        );
        let slot = bridge
            .add_port(Box::new(port), None)
            .expect("port attaches");
        slots.push(slot);
    }

    // Full mesh: everyone hears everyone else.
    for &src in &slots {
        for &sink in &slots {
            if src != sink {
                bridge.connect_port(src, sink, 0).expect("connect");
            }
        }
    }

    println!(
        "conference: {} ports, {} connections after first tick",
        bridge.port_count() - 1,
        slots.len() * (slots.len() - 1)
    );

    // Drive the clock for one second of audio.
    for tick in 0..50 {
        bridge.tick();

        if tick % 10 == 9 {
            let levels: Vec<String> = slots
                .iter()
                .map(|&slot| {
                    let (tx, rx) = bridge.get_signal_level(slot).unwrap();
                    format!("{slot}: tx {tx:3} rx {rx:3}")
                })
                .collect();
            println!("t={:4} ms  {}", (tick + 1) * 20, levels.join("  |  "));
        }
    }

    bridge.destroy();
    println!("done");
}
