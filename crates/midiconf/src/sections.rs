//! Config sections, one struct per TOML table.

use serde::{Deserialize, Serialize};

/// Scheduling and filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSection {
    /// Events the scheduling heap can hold (rounded up to a multiple of 32).
    /// Default: 32
    #[serde(default = "BridgeSection::default_capacity")]
    pub capacity: usize,

    /// Captured events waiting to be forwarded.
    /// Default: 64
    #[serde(default = "BridgeSection::default_handoff_capacity")]
    pub handoff_capacity: usize,

    #[serde(default = "default_true")]
    pub suppress_note_on: bool,

    #[serde(default = "default_true")]
    pub suppress_note_off: bool,

    /// Copy input straight to output, skipping the remote process.
    #[serde(default)]
    pub pass_through: bool,
}

impl BridgeSection {
    fn default_capacity() -> usize {
        32
    }

    fn default_handoff_capacity() -> usize {
        64
    }
}

fn default_true() -> bool {
    true
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            capacity: Self::default_capacity(),
            handoff_capacity: Self::default_handoff_capacity(),
            suppress_note_on: true,
            suppress_note_off: true,
            pass_through: false,
        }
    }
}

/// IPC endpoints. The bridge binds both; the peer connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportSection {
    /// Captured events, bridge -> peer.
    /// Default: ipc:///tmp/midiproc-out
    #[serde(default = "TransportSection::default_outbound")]
    pub outbound: String,

    /// Scheduled events, peer -> bridge.
    /// Default: ipc:///tmp/midiproc-in
    #[serde(default = "TransportSection::default_inbound")]
    pub inbound: String,

    /// Receive poll interval, bounds shutdown latency.
    /// Default: 100
    #[serde(default = "TransportSection::default_recv_poll_ms")]
    pub recv_poll_ms: u64,
}

impl TransportSection {
    fn default_outbound() -> String {
        "ipc:///tmp/midiproc-out".to_string()
    }

    fn default_inbound() -> String {
        "ipc:///tmp/midiproc-in".to_string()
    }

    fn default_recv_poll_ms() -> u64 {
        100
    }
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            outbound: Self::default_outbound(),
            inbound: Self::default_inbound(),
            recv_poll_ms: Self::default_recv_poll_ms(),
        }
    }
}

/// MIDI host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverSection {
    #[serde(default = "DriverSection::default_client_name")]
    pub client_name: String,

    #[serde(default = "DriverSection::default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "DriverSection::default_period_frames")]
    pub period_frames: u32,

    /// Substring match on port names; empty picks the first port.
    #[serde(default)]
    pub input_port: String,

    #[serde(default)]
    pub output_port: String,
}

impl DriverSection {
    fn default_client_name() -> String {
        "midiproc".to_string()
    }

    fn default_sample_rate() -> u32 {
        48000
    }

    fn default_period_frames() -> u32 {
        256
    }
}

impl Default for DriverSection {
    fn default() -> Self {
        Self {
            client_name: Self::default_client_name(),
            sample_rate: Self::default_sample_rate(),
            period_frames: Self::default_period_frames(),
            input_port: String::new(),
            output_port: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySection {
    /// Log filter directive, e.g. "info" or "midiproc=debug".
    #[serde(default = "TelemetrySection::default_log_level")]
    pub log_level: String,
}

impl TelemetrySection {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}
