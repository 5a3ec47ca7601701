//! midiproc: realtime MIDI bridge
//!
//! Captures MIDI input inside a deadline-bound host callback, forwards it to a
//! separate process over a one-directional IPC channel, and re-injects events
//! that process sends back at their scheduled absolute time.
//!
//! - **Capture**: callback → rtrb handoff ring → output worker → outbound channel
//! - **Schedule**: inbound channel → input worker → block pool + min-heap
//! - **Emit**: callback try-locks the heap, pops due events, filters
//!   duplicate notes and writes them into the period's output buffer
//!
//! Time is counted in frames since the bridge started. The callback never
//! blocks, allocates or logs; contention and overflow become counted drops.

pub mod bridge;
pub mod driver;
pub mod event;
pub mod filter;
pub mod heap;
pub mod peer;
pub mod pool;
pub mod shared;
pub mod transport;
pub mod wire;

mod workers;

pub use bridge::{
    Bridge, BridgeConfig, BridgeError, ProcessReport, RealtimeContext, RunningBridge,
    ScheduleError,
};
pub use driver::{InputEvent, MidiPortBuffer, OutputBuffer, ReserveError};
#[cfg(feature = "midir-driver")]
pub use driver::{ClockedMidiDriver, DriverConfig, DriverError};
pub use event::{Event, EventError, MidiMessage, MAX_EVENT_LEN};
pub use filter::{FilterModes, NoteFilter};
pub use heap::{HeapFull, SchedHeap};
pub use peer::{Peer, PeerSummary, PeerTransform};
pub use pool::{BlockPool, PoolError, SlotId};
pub use shared::{BridgeStats, Shutdown, StatsSnapshot};
pub use transport::{InboundChannel, OutboundChannel, TransportError};
pub use wire::{WireError, RECORD_LEN};

/// Build a [`BridgeConfig`] from the loaded configuration
pub fn bridge_config(config: &midiconf::MidiprocConfig) -> BridgeConfig {
    BridgeConfig {
        capacity: config.bridge.capacity,
        handoff_capacity: config.bridge.handoff_capacity,
        modes: FilterModes {
            suppress_note_on: config.bridge.suppress_note_on,
            suppress_note_off: config.bridge.suppress_note_off,
        },
        pass_through: config.bridge.pass_through,
        recv_poll: std::time::Duration::from_millis(config.transport.recv_poll_ms),
        ..BridgeConfig::default()
    }
}
