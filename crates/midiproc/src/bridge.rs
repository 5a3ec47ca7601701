//! The realtime bridge: capture, forward, schedule, re-inject
//!
//! ```text
//!   host callback ──► RealtimeContext::process
//!        │                 │ capture (rtrb push, never blocks)
//!        │                 ▼
//!        │          handoff ring ──► output worker ──► outbound channel
//!        │
//!        │          inbound channel ──► input worker
//!        │                                  │ lock, alloc slot, push
//!        │                                  ▼
//!        └─ try_lock ◄──────────── Schedule { pool, heap }
//!              pop ready events ──► NoteFilter ──► OutputBuffer
//! ```
//!
//! The callback side only holds a [`RealtimeContext`], which has no way to
//! block on a lock. Worker threads get a [`WorkerToken`] at spawn time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, error, info};

use crate::driver::{InputEvent, OutputBuffer};
use crate::event::Event;
use crate::filter::{FilterModes, NoteFilter};
use crate::heap::SchedHeap;
use crate::pool::{BlockPool, PoolError, SlotId};
use crate::shared::{BridgeStats, HandoffSignal, RtLock, Shutdown, StatsSnapshot, WorkerToken};
use crate::transport::{InboundChannel, OutboundChannel};
use crate::workers;

/// Bridge sizing and behaviour
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Scheduled events held at once (rounded up to a multiple of 32)
    pub capacity: usize,
    /// Captured events waiting for the output worker
    pub handoff_capacity: usize,
    pub modes: FilterModes,
    /// Copy input straight to output; no capture, scheduling or filtering
    pub pass_through: bool,
    /// How long the input worker waits on the inbound channel per poll
    pub recv_poll: Duration,
    /// Upper bound on an output worker sleep without a signal
    pub output_wait: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            capacity: 32,
            handoff_capacity: 64,
            modes: FilterModes::both(),
            pass_through: false,
            recv_poll: Duration::from_millis(100),
            output_wait: Duration::from_millis(100),
        }
    }
}

/// Errors from building or starting the bridge
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to allocate scheduling pool: {0}")]
    Pool(#[from] PoolError),

    #[error("Handoff capacity must be non-zero")]
    ZeroHandoffCapacity,

    #[error("Failed to spawn {name} thread: {reason}")]
    ThreadSpawn { name: &'static str, reason: String },
}

/// Why the input worker could not schedule an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("Block pool exhausted")]
    PoolExhausted,

    #[error("Scheduling heap full (capacity {0})")]
    HeapFull(usize),
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    time: u64,
    slot: SlotId,
}

fn later_or_equal(a: &Pending, b: &Pending) -> bool {
    a.time >= b.time
}

fn ignore_move(_: &Pending, _: usize) {}

type PendingHeap = SchedHeap<Pending, fn(&Pending, &Pending) -> bool, fn(&Pending, usize)>;

/// Pool and heap, always locked together
///
/// The heap holds slot handles; the event bytes live in the pool. A slot is
/// freed exactly once, when its entry leaves the heap or when the heap
/// refuses it.
#[derive(Debug)]
pub(crate) struct Schedule {
    pool: BlockPool<Event>,
    heap: PendingHeap,
}

impl Schedule {
    pub(crate) fn new(capacity: usize) -> Result<Self, PoolError> {
        let pool = BlockPool::new(capacity)?;
        let heap = SchedHeap::new(
            pool.capacity(),
            later_or_equal as fn(&Pending, &Pending) -> bool,
            ignore_move as fn(&Pending, usize),
        );
        Ok(Self { pool, heap })
    }

    pub(crate) fn insert(&mut self, event: Event) -> Result<(), ScheduleError> {
        let slot = self.pool.alloc().ok_or(ScheduleError::PoolExhausted)?;
        *self.pool.get_mut(slot) = event;
        let pending = Pending {
            time: event.time(),
            slot,
        };
        if let Err(full) = self.heap.push(pending) {
            self.pool.free(full.item.slot);
            return Err(ScheduleError::HeapFull(full.capacity));
        }
        Ok(())
    }

    /// Remove the earliest event if it is due before `period_end`
    fn pop_ready(&mut self, period_end: u64) -> Option<Event> {
        if self.heap.top()?.time >= period_end {
            return None;
        }
        let pending = self.heap.pop()?;
        let event = *self.pool.get(pending.slot);
        self.pool.free(pending.slot);
        Some(event)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}

/// Everything the callback and the workers share
#[derive(Debug)]
pub(crate) struct SharedState {
    pub(crate) schedule: RtLock<Schedule>,
    pub(crate) signal: HandoffSignal,
    pub(crate) stats: BridgeStats,
    pub(crate) shutdown: Shutdown,
    /// Start of the next period, published for observers
    clock: AtomicU64,
}

/// What one callback did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub captured: u32,
    pub capture_dropped: u32,
    pub emitted: u32,
    pub filtered: u32,
    pub reserve_failed: u32,
    pub heap_skipped: bool,
}

/// The callback half of the bridge
///
/// Owned by whichever thread the host runs the callback on. Nothing in here
/// blocks or allocates.
pub struct RealtimeContext {
    shared: Arc<SharedState>,
    producer: Producer<Event>,
    handoff_capacity: usize,
    filter: NoteFilter,
    pass_through: bool,
    now: u64,
}

impl RealtimeContext {
    /// Absolute frame count at the start of the next period
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn is_pass_through(&self) -> bool {
        self.pass_through
    }

    /// Run one period of `frames` frames
    pub fn process<'a, I, O>(&mut self, frames: u32, inputs: I, out: &mut O) -> ProcessReport
    where
        I: IntoIterator<Item = InputEvent<'a>>,
        O: OutputBuffer + ?Sized,
    {
        let stats = &self.shared.stats;
        BridgeStats::bump(&stats.callbacks);

        let mut report = ProcessReport::default();
        let period_start = self.now;
        let period_end = period_start + u64::from(frames);

        if self.pass_through {
            for input in inputs {
                match out.reserve(input.offset, input.bytes) {
                    Ok(()) => {
                        report.emitted += 1;
                        BridgeStats::bump(&stats.emitted);
                    }
                    Err(_) => {
                        report.reserve_failed += 1;
                        BridgeStats::bump(&stats.reserve_failed);
                    }
                }
            }
            self.now = period_end;
            self.shared.clock.store(period_end, Ordering::Relaxed);
            return report;
        }

        for input in inputs {
            let time = period_start + u64::from(input.offset);
            let queued = match Event::new(input.bytes, time) {
                Ok(event) => self.producer.push(event).is_ok(),
                Err(_) => false,
            };
            if queued {
                report.captured += 1;
                BridgeStats::bump(&stats.captured);
            } else {
                report.capture_dropped += 1;
                BridgeStats::bump(&stats.capture_dropped);
            }
        }
        self.now = period_end;
        self.shared.clock.store(period_end, Ordering::Relaxed);

        if self.producer.slots() < self.handoff_capacity && !self.shared.signal.try_notify() {
            BridgeStats::bump(&stats.signal_skipped);
        }

        let Some(mut schedule) = self.shared.schedule.try_lock() else {
            report.heap_skipped = true;
            BridgeStats::bump(&stats.heap_lock_skipped);
            return report;
        };
        while let Some(event) = schedule.pop_ready(period_end) {
            if !self.filter.should_emit(event.payload()) {
                report.filtered += 1;
                BridgeStats::bump(&stats.filtered);
                continue;
            }
            let offset = event.time().saturating_sub(period_start) as u32;
            match out.reserve(offset, event.payload()) {
                Ok(()) => {
                    report.emitted += 1;
                    BridgeStats::bump(&stats.emitted);
                }
                Err(_) => {
                    report.reserve_failed += 1;
                    BridgeStats::bump(&stats.reserve_failed);
                }
            }
        }
        report
    }
}

impl std::fmt::Debug for RealtimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeContext")
            .field("now", &self.now)
            .field("pass_through", &self.pass_through)
            .field("filter", &self.filter)
            .finish()
    }
}

/// A configured bridge whose workers have not started yet
pub struct Bridge {
    config: BridgeConfig,
    shared: Arc<SharedState>,
    realtime: RealtimeContext,
    consumer: Consumer<Event>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
        if config.handoff_capacity == 0 {
            return Err(BridgeError::ZeroHandoffCapacity);
        }
        let schedule = Schedule::new(config.capacity)?;
        let (producer, consumer) = RingBuffer::new(config.handoff_capacity);

        let shared = Arc::new(SharedState {
            schedule: RtLock::new(schedule),
            signal: HandoffSignal::new(),
            stats: BridgeStats::default(),
            shutdown: Shutdown::new(),
            clock: AtomicU64::new(0),
        });

        let realtime = RealtimeContext {
            shared: Arc::clone(&shared),
            producer,
            handoff_capacity: config.handoff_capacity,
            filter: NoteFilter::new(config.modes),
            pass_through: config.pass_through,
            now: 0,
        };

        debug!(
            "Bridge created: capacity={} handoff={} modes={:?} pass_through={}",
            config.capacity, config.handoff_capacity, config.modes, config.pass_through
        );

        Ok(Self {
            config,
            shared,
            realtime,
            consumer,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Spawn the output and input workers
    pub fn start<O, I>(self, outbound: O, inbound: I) -> Result<RunningBridge, BridgeError>
    where
        O: OutboundChannel + 'static,
        I: InboundChannel + 'static,
    {
        let Bridge {
            config,
            shared,
            realtime,
            consumer,
        } = self;

        let output_shared = Arc::clone(&shared);
        let output_wait = config.output_wait;
        let output = thread::Builder::new()
            .name("midiproc-output".to_string())
            .spawn(move || {
                workers::output_worker(
                    output_shared,
                    consumer,
                    outbound,
                    output_wait,
                    WorkerToken::new(),
                )
            })
            .map_err(|e| BridgeError::ThreadSpawn {
                name: "output",
                reason: e.to_string(),
            })?;

        let input_shared = Arc::clone(&shared);
        let recv_poll = config.recv_poll;
        let pass_through = config.pass_through;
        let input = thread::Builder::new()
            .name("midiproc-input".to_string())
            .spawn(move || {
                workers::input_worker(
                    input_shared,
                    inbound,
                    recv_poll,
                    pass_through,
                    WorkerToken::new(),
                )
            });
        let input = match input {
            Ok(handle) => handle,
            Err(e) => {
                // Unwind the output worker before reporting
                let token = WorkerToken::new();
                shared.shutdown.trigger();
                shared.signal.notify(&token);
                let _ = output.join();
                return Err(BridgeError::ThreadSpawn {
                    name: "input",
                    reason: e.to_string(),
                });
            }
        };

        info!(
            "Bridge started (capacity {}, handoff {})",
            config.capacity, config.handoff_capacity
        );

        Ok(RunningBridge {
            shared,
            realtime: Some(realtime),
            output: Some(output),
            input: Some(input),
            token: WorkerToken::new(),
        })
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("config", &self.config)
            .field("realtime", &self.realtime)
            .finish()
    }
}

/// Handle to a started bridge
///
/// Stops and joins the workers on drop.
pub struct RunningBridge {
    shared: Arc<SharedState>,
    realtime: Option<RealtimeContext>,
    output: Option<JoinHandle<()>>,
    input: Option<JoinHandle<()>>,
    token: WorkerToken,
}

impl RunningBridge {
    /// Hand the callback context to the host; only the first call gets it
    pub fn take_realtime(&mut self) -> Option<RealtimeContext> {
        self.realtime.take()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Shutdown flag shared with the workers
    pub fn shutdown_flag(&self) -> Shutdown {
        self.shared.shutdown.clone()
    }

    /// Frame count at the start of the next period
    pub fn clock(&self) -> u64 {
        self.shared.clock.load(Ordering::Relaxed)
    }

    /// Events currently parked in the scheduling heap
    pub fn scheduled(&self) -> usize {
        self.shared.schedule.lock(&self.token).len()
    }

    /// True once shutdown was requested or a worker stopped by itself
    pub fn is_stopping(&self) -> bool {
        self.shared.shutdown.is_set()
            || self.output.as_ref().map_or(true, |h| h.is_finished())
            || self.input.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Block until a worker exits or shutdown is requested, then stop
    pub fn wait(&mut self, poll: Duration) -> StatsSnapshot {
        while !self.is_stopping() {
            thread::sleep(poll);
        }
        self.shutdown()
    }

    /// Raise the shutdown flag, wake the workers and join them
    pub fn shutdown(&mut self) -> StatsSnapshot {
        self.shared.shutdown.trigger();
        self.shared.signal.notify(&self.token);

        for (name, handle) in [("output", self.output.take()), ("input", self.input.take())] {
            if let Some(handle) = handle {
                debug!("Waiting for {} worker to stop...", name);
                if handle.join().is_err() {
                    error!("{} worker panicked", name);
                }
            }
        }
        self.stats()
    }
}

impl Drop for RunningBridge {
    fn drop(&mut self) {
        if self.output.is_some() || self.input.is_some() {
            self.shutdown();
        }
    }
}

impl std::fmt::Debug for RunningBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningBridge")
            .field("clock", &self.clock())
            .field("stopping", &self.is_stopping())
            .field("stats", &self.stats())
            .finish()
    }
}
