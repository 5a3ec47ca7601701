use std::thread;
use std::time::{Duration, Instant};

use midiproc::transport::memory::{pipe, PipeReceiver, PipeSender};
use midiproc::{
    wire, Bridge, BridgeConfig, Event, InboundChannel, InputEvent, MidiPortBuffer,
    OutboundChannel, Peer, PeerTransform, RealtimeContext, RunningBridge, Shutdown, RECORD_LEN,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < TIMEOUT {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

fn fast_config() -> BridgeConfig {
    BridgeConfig {
        recv_poll: Duration::from_millis(10),
        output_wait: Duration::from_millis(10),
        ..BridgeConfig::default()
    }
}

struct Harness {
    running: RunningBridge,
    rt: RealtimeContext,
    out: MidiPortBuffer,
    /// What the bridge forwards
    forwarded: PipeReceiver,
    /// Feeds the bridge's input worker
    replies: PipeSender,
}

impl Harness {
    fn new(config: BridgeConfig) -> Self {
        let (out_tx, out_rx) = pipe(64);
        let (in_tx, in_rx) = pipe(64);
        let mut running = Bridge::new(config).unwrap().start(out_tx, in_rx).unwrap();
        let rt = running.take_realtime().unwrap();
        Self {
            running,
            rt,
            out: MidiPortBuffer::new(512, 32),
            forwarded: out_rx,
            replies: in_tx,
        }
    }

    fn period(&mut self, frames: u32, inputs: &[InputEvent<'_>]) -> Vec<(u32, Vec<u8>)> {
        self.out.clear(frames);
        self.rt.process(frames, inputs.iter().copied(), &mut self.out);
        self.out.events().map(|(o, b)| (o, b.to_vec())).collect()
    }
}

#[test]
fn captured_event_forwarded_then_reply_emitted_on_time() {
    let mut h = Harness::new(fast_config());

    h.period(1000, &[]);
    h.period(40, &[InputEvent::new(&[0x90, 60, 100], 0)]);
    assert_eq!(h.rt.now(), 1040);

    let record = h.forwarded.recv(TIMEOUT).unwrap().expect("record forwarded");
    assert_eq!(record.len(), RECORD_LEN);
    let captured = wire::decode(&record).unwrap();
    assert_eq!(captured.payload(), &[0x90, 60, 100]);
    assert_eq!(captured.time(), 1000);

    // Remote side echoes the note-on and schedules the release
    h.replies.send(&record).unwrap();
    let off = Event::new(&[0x80, 60, 0], 1050).unwrap();
    h.replies.send(&wire::encode(&off)).unwrap();
    assert!(wait_for(|| h.running.scheduled() == 2));

    // 1040..1048: overdue note-on at offset 0, release still parked
    assert_eq!(h.period(8, &[]), vec![(0, vec![0x90, 60, 100])]);
    assert_eq!(h.running.scheduled(), 1);

    // 1048..1056: release due at 1050
    assert_eq!(h.period(8, &[]), vec![(2, vec![0x80, 60, 0])]);
    assert_eq!(h.running.scheduled(), 0);

    let stats = h.running.shutdown();
    assert_eq!(stats.captured, 1);
    assert_eq!(stats.forwarded, 1);
    assert_eq!(stats.received, 2);
    assert_eq!(stats.emitted, 2);
}

#[test]
fn release_without_tracked_note_is_filtered() {
    let mut h = Harness::new(fast_config());
    let off = Event::new(&[0x80, 60, 0], 10).unwrap();
    h.replies.send(&wire::encode(&off)).unwrap();
    assert!(wait_for(|| h.running.scheduled() == 1));

    assert!(h.period(64, &[]).is_empty());
    assert_eq!(h.running.scheduled(), 0);
    assert_eq!(h.running.stats().filtered, 1);
}

#[test]
fn malformed_records_counted_and_skipped() {
    let mut h = Harness::new(fast_config());
    h.replies.send(&[0u8; 10]).unwrap();

    let mut bad_tag = wire::encode(&Event::new(&[0xF8], 5).unwrap());
    bad_tag[0] = 7;
    h.replies.send(&bad_tag).unwrap();

    let good = Event::new(&[0xF8], 5).unwrap();
    h.replies.send(&wire::encode(&good)).unwrap();

    assert!(wait_for(|| h.running.scheduled() == 1));
    let stats = h.running.stats();
    assert_eq!(stats.malformed, 2);
    assert_eq!(stats.received, 1);
    assert!(!h.running.is_stopping());

    assert_eq!(h.period(64, &[]), vec![(5, vec![0xF8])]);
}

#[test]
fn pool_exhaustion_drops_and_counts() {
    let config = BridgeConfig {
        capacity: 1,
        ..fast_config()
    };
    let mut h = Harness::new(config);
    for t in 0..40u64 {
        let event = Event::new(&[0xF8], 100 + t).unwrap();
        h.replies.send(&wire::encode(&event)).unwrap();
    }
    assert!(wait_for(|| h.running.stats().received == 40));
    assert!(wait_for(|| h.running.stats().pool_exhausted == 8));
    assert_eq!(h.running.scheduled(), 32);

    // Draining frees every slot
    let emitted = h.period(256, &[]);
    assert_eq!(emitted.len(), 32);
    assert_eq!(h.running.scheduled(), 0);
}

#[test]
fn inbound_disconnect_shuts_bridge_down() {
    let Harness {
        mut running,
        rt: _rt,
        replies,
        forwarded: _forwarded,
        ..
    } = Harness::new(fast_config());

    drop(replies);
    assert!(wait_for(|| running.is_stopping()));
    assert!(running.shutdown_flag().is_set());
    running.wait(Duration::from_millis(5));
}

#[test]
fn outbound_failure_shuts_bridge_down() {
    let mut h = Harness::new(fast_config());
    let (_, dangling) = pipe(1);
    drop(std::mem::replace(&mut h.forwarded, dangling));

    h.period(64, &[InputEvent::new(&[0x90, 60, 100], 0)]);
    assert!(wait_for(|| h.running.is_stopping()));
    assert!(h.running.shutdown_flag().is_set());
    assert_eq!(h.running.stats().forwarded, 0);
}

#[test]
fn pass_through_bypasses_remote_side() {
    let config = BridgeConfig {
        pass_through: true,
        ..fast_config()
    };
    let mut h = Harness::new(config);
    let emitted = h.period(
        64,
        &[
            InputEvent::new(&[0x90, 60, 100], 4),
            InputEvent::new(&[0x90, 60, 100], 8),
        ],
    );
    assert_eq!(
        emitted,
        vec![(4, vec![0x90, 60, 100]), (8, vec![0x90, 60, 100])]
    );
    assert!(h.forwarded.recv(Duration::from_millis(50)).unwrap().is_none());
}

#[test]
fn pass_through_ignores_inbound_records() {
    let config = BridgeConfig {
        pass_through: true,
        ..fast_config()
    };
    let mut h = Harness::new(config);
    for t in 0..40u64 {
        let event = Event::new(&[0x90, 60, 100], t).unwrap();
        h.replies.send(&wire::encode(&event)).unwrap();
    }
    assert!(wait_for(|| h.running.stats().received == 40));

    for _ in 0..4 {
        assert!(h.period(256, &[]).is_empty());
    }
    let stats = h.running.stats();
    assert_eq!(h.running.scheduled(), 0);
    assert_eq!(stats.pool_exhausted, 0);
    assert_eq!(stats.emitted, 0);
    assert!(!h.running.is_stopping());
}

#[test]
fn peer_loop_transposes_captured_notes() {
    let (out_tx, out_rx) = pipe(64);
    let (in_tx, in_rx) = pipe(64);
    let mut running = Bridge::new(fast_config())
        .unwrap()
        .start(out_tx, in_rx)
        .unwrap();
    let mut rt = running.take_realtime().unwrap();

    let transform = PeerTransform {
        transpose: 12,
        delay: 16,
    };
    let shutdown = Shutdown::new();
    let peer_shutdown = shutdown.clone();
    let peer = thread::spawn(move || {
        Peer::new(out_rx, in_tx, transform)
            .with_poll(Duration::from_millis(10))
            .run(&peer_shutdown)
    });

    let mut out = MidiPortBuffer::new(256, 16);
    out.clear(64);
    rt.process(64, [InputEvent::new(&[0x90, 60, 100], 8)], &mut out);
    assert!(out.is_empty());
    assert!(wait_for(|| running.scheduled() == 1));

    // Captured at 8, echoed an octave up 16 frames later
    out.clear(64);
    rt.process(64, [], &mut out);
    let emitted: Vec<(u32, Vec<u8>)> = out.events().map(|(o, b)| (o, b.to_vec())).collect();
    assert_eq!(emitted, vec![(0, vec![0x90, 72, 100])]);

    shutdown.trigger();
    let summary = peer.join().unwrap().unwrap();
    assert_eq!(summary.echoed, 1);
    running.shutdown();
}
