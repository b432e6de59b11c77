//! Boundary and determinism tests: churn, rate-mismatch chains, and
//! bit-identical mixes across worker counts.

use tertulia_bridge::{AudioFormat, Bridge, BridgeParams, MemoryPort, SlotId};

fn sine(freq: f32, rate: f32, amplitude: f32, len: usize) -> Vec<i16> {
    (0..len)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * freq * i as f32 / rate;
            (phase.sin() * amplitude) as i16
        })
        .collect()
}

#[test]
fn ten_thousand_connect_disconnect_cycles() {
    let bridge = Bridge::create(BridgeParams {
        max_slots: 2,
        ..BridgeParams::default()
    })
    .unwrap();

    let fmt = AudioFormat::new(8000, 1, 160);
    let slot = bridge
        .add_port(Box::new(MemoryPort::new("churn", fmt)), None)
        .unwrap();
    bridge.tick();

    for _ in 0..10_000 {
        bridge.connect_port(slot, SlotId::MASTER, 0).unwrap();
        bridge.disconnect_port(slot, SlotId::MASTER).unwrap();
    }
    bridge.tick();

    assert_eq!(bridge.connect_count(), 0);
    assert_eq!(bridge.port_count(), 2);

    // Connecting twice must leave exactly one edge behind.
    bridge.connect_port(slot, SlotId::MASTER, 0).unwrap();
    bridge.connect_port(slot, SlotId::MASTER, 64).unwrap();
    bridge.tick();
    assert_eq!(bridge.connect_count(), 1);
    let info = bridge.get_port_info(slot).unwrap();
    assert_eq!(info.listeners, vec![(SlotId::MASTER, 64)]);
}

#[test]
fn add_then_remove_restores_bridge_state() {
    let bridge = Bridge::create(BridgeParams {
        max_slots: 8,
        ..BridgeParams::default()
    })
    .unwrap();
    let fmt = AudioFormat::new(8000, 1, 160);

    let anchor = bridge
        .add_port(Box::new(MemoryPort::new("anchor", fmt)), None)
        .unwrap();
    bridge.connect_port(anchor, SlotId::MASTER, 0).unwrap();
    bridge.tick();

    let before_ports = bridge.enum_ports();
    let before_connects = bridge.connect_count();

    let transient = bridge
        .add_port(Box::new(MemoryPort::new("transient", fmt)), None)
        .unwrap();
    bridge.connect_port(transient, anchor, 0).unwrap();
    bridge.connect_port(anchor, transient, 0).unwrap();
    bridge.tick();
    bridge.remove_port(transient).unwrap();
    bridge.tick();

    assert_eq!(bridge.enum_ports(), before_ports);
    assert_eq!(bridge.connect_count(), before_connects);
    // The freed slot is reusable.
    let again = bridge
        .add_port(Box::new(MemoryPort::new("again", fmt)), None)
        .unwrap();
    assert_eq!(again, transient);
}

#[test]
fn mismatched_rate_chain_has_no_dropouts() {
    // Source at 16 kHz into an 8 kHz bridge, delivered to a 48 kHz sink,
    // for 1000 ticks.
    let bridge = Bridge::create(BridgeParams {
        max_slots: 4,
        ..BridgeParams::default()
    })
    .unwrap();

    let src = MemoryPort::with_playback(
        "src16k",
        AudioFormat::new(16000, 1, 320),
        vec![6000; 320],
        true,
    );
    let sink = MemoryPort::new("sink48k", AudioFormat::new(48000, 1, 960));
    let capture = sink.capture_buffer();

    let src_slot = bridge.add_port(Box::new(src), None).unwrap();
    let sink_slot = bridge.add_port(Box::new(sink), None).unwrap();
    bridge.connect_port(src_slot, sink_slot, 0).unwrap();

    const TICKS: usize = 1000;
    for _ in 0..TICKS {
        bridge.tick();
    }

    let data = capture.lock();
    // Every tick delivered exactly one 20 ms frame at 48 kHz.
    assert_eq!(data.len(), TICKS * 960);

    // After the resampler warm-up, every 20 ms window holds the signal.
    for (w, window) in data.chunks(960).enumerate().skip(3) {
        let mean: i64 = window.iter().map(|&s| i64::from(s)).sum::<i64>() / 960;
        assert!(
            (mean - 6000).abs() < 200,
            "window {w} dropped out: mean {mean}"
        );
    }
}

#[test]
fn worker_counts_produce_bit_identical_mixes() {
    let run = |workers: usize| -> Vec<Vec<i16>> {
        let bridge = Bridge::create(BridgeParams {
            max_slots: 8,
            worker_threads: workers,
            ..BridgeParams::default()
        })
        .unwrap();

        let waves = [
            sine(440.0, 8000.0, 9000.0, 1600),
            sine(1000.0, 8000.0, 7000.0, 1600),
            sine(1800.0, 8000.0, 5000.0, 1600),
        ];

        let mut slots = Vec::new();
        let mut captures = Vec::new();
        for (i, wave) in waves.iter().enumerate() {
            let port = MemoryPort::with_playback(
                format!("src{i}"),
                AudioFormat::new(8000, 1, 160),
                wave.clone(),
                true,
            );
            captures.push(port.capture_buffer());
            slots.push(bridge.add_port(Box::new(port), None).unwrap());
        }
        for &src in &slots {
            for &sink in &slots {
                if src != sink {
                    bridge.connect_port(src, sink, 16).unwrap();
                }
            }
        }

        for _ in 0..50 {
            bridge.tick();
        }
        bridge.destroy();

        captures.iter().map(|c| c.lock().clone()).collect()
    };

    let sequential = run(0);
    assert!(sequential.iter().all(|c| c.len() == 50 * 160));
    for workers in [1, 4] {
        let parallel = run(workers);
        assert_eq!(
            sequential, parallel,
            "worker count {workers} changed the mix"
        );
    }
}
