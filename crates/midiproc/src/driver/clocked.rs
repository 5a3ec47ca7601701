//! Software-clocked MIDI host on top of midir
//!
//! There is no audio server here, so the host makes its own periods: a
//! dedicated thread wakes every `period_frames / sample_rate` seconds, turns
//! the MIDI input that arrived since the last wake into in-period offsets,
//! runs the bridge callback and writes whatever it emitted to the output port.
//!
//! ```text
//! midir input thread ──push──► rtrb ring ──pop──► period thread
//!                                                     │ RealtimeContext::process
//!                                                     ▼
//!                                             MidiPortBuffer ──► midir output
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, info, warn};

use super::{InputEvent, MidiPortBuffer};
use crate::bridge::RealtimeContext;
use crate::event::Event;

/// Period clock and port selection
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub client_name: String,
    pub sample_rate: u32,
    pub period_frames: u32,
    /// Substring of the input port name; empty picks the first port
    pub input_port: String,
    /// Substring of the output port name; empty picks the first port
    pub output_port: String,
    /// Input events buffered between periods
    pub input_capacity: usize,
    /// Output events per period
    pub max_events: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            client_name: "midiproc".to_string(),
            sample_rate: 48000,
            period_frames: 256,
            input_port: String::new(),
            output_port: String::new(),
            input_capacity: 256,
            max_events: 256,
        }
    }
}

impl DriverConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(f64::from(self.period_frames) / f64::from(self.sample_rate))
    }
}

/// Errors from the MIDI host
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Sample rate and period length must be non-zero")]
    InvalidClock,

    #[error("Failed to initialize MIDI: {0}")]
    InitFailed(String),

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Failed to spawn period thread: {0}")]
    ThreadSpawn(String),
}

/// Input byte stamped with its arrival
struct Stamped {
    at: Instant,
    event: Event,
}

/// Running host; stops the period thread and closes ports on drop
pub struct ClockedMidiDriver {
    input: Option<MidiInputConnection<Producer<Stamped>>>,
    thread_handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    send_failures: Arc<AtomicU64>,
    input_dropped: Arc<AtomicU64>,
    input_name: Option<String>,
    output_name: Option<String>,
}

impl ClockedMidiDriver {
    /// Open the ports and start calling `ctx` once per period
    pub fn start(config: DriverConfig, ctx: RealtimeContext) -> Result<Self, DriverError> {
        if config.sample_rate == 0 || config.period_frames == 0 {
            return Err(DriverError::InvalidClock);
        }

        let (producer, consumer) = RingBuffer::new(config.input_capacity.max(1));
        let input_dropped = Arc::new(AtomicU64::new(0));
        let (input, input_name) = match open_input(&config, producer, Arc::clone(&input_dropped))? {
            Some((conn, name)) => (Some(conn), Some(name)),
            None => (None, None),
        };
        let (output, output_name) = match open_output(&config)? {
            Some((conn, name)) => (Some(conn), Some(name)),
            None => (None, None),
        };

        let running = Arc::new(AtomicBool::new(true));
        let send_failures = Arc::new(AtomicU64::new(0));

        let running_for_thread = Arc::clone(&running);
        let failures_for_thread = Arc::clone(&send_failures);
        let config_clone = config.clone();
        let thread_handle = thread::Builder::new()
            .name("midiproc-period".to_string())
            .spawn(move || {
                run_periods(
                    config_clone,
                    ctx,
                    consumer,
                    output,
                    running_for_thread,
                    failures_for_thread,
                )
            })
            .map_err(|e| DriverError::ThreadSpawn(e.to_string()))?;

        info!(
            "MIDI host started: {} frames @ {}Hz ({:?} per period)",
            config.period_frames,
            config.sample_rate,
            config.period()
        );

        Ok(Self {
            input,
            thread_handle: Some(thread_handle),
            running,
            send_failures,
            input_dropped,
            input_name,
            output_name,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn input_name(&self) -> Option<&str> {
        self.input_name.as_deref()
    }

    pub fn output_name(&self) -> Option<&str> {
        self.output_name.as_deref()
    }

    /// Output port writes that failed
    pub fn send_failures(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }

    /// Input events lost to a full ring or an oversized message
    pub fn input_dropped(&self) -> u64 {
        self.input_dropped.load(Ordering::Relaxed)
    }

    /// Detach the callback: stop the clock, then close the input port
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            debug!("Waiting for period thread to stop...");
            let _ = handle.join();
        }
        if let Some(conn) = self.input.take() {
            conn.close();
            let dropped = self.input_dropped();
            if dropped > 0 {
                warn!("MIDI host dropped {} input events", dropped);
            }
            info!("MIDI host stopped");
        }
    }
}

impl Drop for ClockedMidiDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Queue one incoming message for the period thread, counting what is lost
fn enqueue(producer: &mut Producer<Stamped>, data: &[u8], at: Instant, dropped: &AtomicU64) {
    let queued = match Event::new(data, 0) {
        Ok(event) => producer.push(Stamped { at, event }).is_ok(),
        Err(_) => false,
    };
    if !queued {
        dropped.fetch_add(1, Ordering::Relaxed);
    }
}

fn open_input(
    config: &DriverConfig,
    producer: Producer<Stamped>,
    dropped: Arc<AtomicU64>,
) -> Result<Option<(MidiInputConnection<Producer<Stamped>>, String)>, DriverError> {
    let mut midi_in = MidiInput::new(&format!("{}-in", config.client_name))
        .map_err(|e| DriverError::InitFailed(e.to_string()))?;
    midi_in.ignore(Ignore::None);

    let ports = midi_in.ports();
    let Some(port) = ports.iter().find(|p| {
        midi_in
            .port_name(p)
            .map(|n| n.contains(&config.input_port))
            .unwrap_or(false)
    }) else {
        if config.input_port.is_empty() {
            warn!("No MIDI input ports available, running without input");
            return Ok(None);
        }
        return Err(DriverError::PortNotFound(config.input_port.clone()));
    };

    let port_name = midi_in
        .port_name(port)
        .map_err(|e| DriverError::ConnectionFailed(e.to_string()))?;

    let connection = midi_in
        .connect(
            port,
            "midiproc-input",
            move |_stamp, data, producer: &mut Producer<Stamped>| {
                enqueue(producer, data, Instant::now(), &dropped)
            },
            producer,
        )
        .map_err(|e| DriverError::ConnectionFailed(e.to_string()))?;

    info!("Opened MIDI input: {}", port_name);
    Ok(Some((connection, port_name)))
}

fn open_output(config: &DriverConfig) -> Result<Option<(MidiOutputConnection, String)>, DriverError> {
    let midi_out = MidiOutput::new(&format!("{}-out", config.client_name))
        .map_err(|e| DriverError::InitFailed(e.to_string()))?;

    let ports = midi_out.ports();
    let Some(port) = ports.iter().find(|p| {
        midi_out
            .port_name(p)
            .map(|n| n.contains(&config.output_port))
            .unwrap_or(false)
    }) else {
        if config.output_port.is_empty() {
            warn!("No MIDI output ports available, emitted events are discarded");
            return Ok(None);
        }
        return Err(DriverError::PortNotFound(config.output_port.clone()));
    };

    let port_name = midi_out
        .port_name(port)
        .map_err(|e| DriverError::ConnectionFailed(e.to_string()))?;

    let connection = midi_out
        .connect(port, "midiproc-output")
        .map_err(|e| DriverError::ConnectionFailed(e.to_string()))?;

    info!("Opened MIDI output: {}", port_name);
    Ok(Some((connection, port_name)))
}

/// Frame offset of `at` within a period that started at `start`
fn frame_offset(start: Instant, at: Instant, sample_rate: u32, period_frames: u32) -> u32 {
    let elapsed = at.saturating_duration_since(start);
    let frames = elapsed.as_nanos() * u128::from(sample_rate) / 1_000_000_000;
    frames.min(u128::from(period_frames - 1)) as u32
}

fn run_periods(
    config: DriverConfig,
    mut ctx: RealtimeContext,
    mut consumer: Consumer<Stamped>,
    mut output: Option<MidiOutputConnection>,
    running: Arc<AtomicBool>,
    send_failures: Arc<AtomicU64>,
) {
    let period = config.period();
    let frames = config.period_frames;
    let mut pending: Vec<Stamped> = Vec::with_capacity(config.input_capacity.max(1));
    let mut out = MidiPortBuffer::new(config.max_events * 3, config.max_events);

    // Input that arrived during [window_start, now) lands in the coming period
    let mut window_start = Instant::now();
    let mut next_wake = window_start + period;

    while running.load(Ordering::Acquire) {
        let now = Instant::now();
        if next_wake > now {
            thread::sleep(next_wake - now);
        }
        next_wake += period;

        pending.clear();
        while pending.len() < pending.capacity() {
            match consumer.pop() {
                Ok(stamped) => pending.push(stamped),
                Err(_) => break,
            }
        }

        let mut last_offset = 0;
        let inputs = pending.iter().map(|s| {
            let offset = frame_offset(window_start, s.at, config.sample_rate, frames);
            last_offset = last_offset.max(offset);
            InputEvent::new(s.event.payload(), last_offset)
        });

        out.clear(frames);
        ctx.process(frames, inputs, &mut out);
        window_start += period;

        if let Some(conn) = output.as_mut() {
            for (_, bytes) in out.events() {
                if conn.send(bytes).is_err() {
                    send_failures.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    if let Some(conn) = output.take() {
        conn.close();
    }
    debug!("Period thread exited at frame {}", ctx.now());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_duration() {
        let config = DriverConfig::default();
        let period = config.period();
        let expected = 256.0 / 48000.0;
        assert!((period.as_secs_f64() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_enqueue_counts_overflow_and_oversized() {
        let (mut producer, mut consumer) = RingBuffer::new(2);
        let dropped = AtomicU64::new(0);
        let now = Instant::now();

        enqueue(&mut producer, &[0x90, 60, 100], now, &dropped);
        enqueue(&mut producer, &[0x80, 60, 0], now, &dropped);
        enqueue(&mut producer, &[0xF8], now, &dropped);
        assert_eq!(dropped.load(Ordering::Relaxed), 1);

        let sysex = [0xF0u8; 200];
        let _ = consumer.pop();
        enqueue(&mut producer, &sysex, now, &dropped);
        assert_eq!(dropped.load(Ordering::Relaxed), 2);

        let kept = consumer.pop().unwrap();
        assert_eq!(kept.event.payload(), &[0x80, 60, 0]);
        assert!(consumer.pop().is_err());
    }

    #[test]
    fn test_frame_offset_scales_and_clamps() {
        let start = Instant::now();
        let at = start + Duration::from_millis(1);
        assert_eq!(frame_offset(start, at, 48000, 256), 48);

        let late = start + Duration::from_secs(1);
        assert_eq!(frame_offset(start, late, 48000, 256), 255);

        // Arrived before the window: offset 0
        assert_eq!(frame_offset(at, start, 48000, 256), 0);
    }
}
