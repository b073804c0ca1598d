//! Event system for UI decoupling.
//!
//! Allows the CLI and the test runner to subscribe to protocol events without
//! tight coupling to the core logic.

use std::fmt;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Host operation phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShieldPhase {
    /// Nothing in progress.
    Idle,
    /// Break + flush + version probe.
    Reset,
    /// Baud rate negotiation.
    BaudChange,
    /// Reading the firmware image.
    Dump,
    /// Reading the whole flash.
    DumpAll,
    /// Writing a firmware image.
    Update,
    /// Forcing an FPGA reload.
    Reload,
}

impl fmt::Display for ShieldPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShieldPhase::Idle => write!(f, "Idle"),
            ShieldPhase::Reset => write!(f, "Reset"),
            ShieldPhase::BaudChange => write!(f, "Baud Change"),
            ShieldPhase::Dump => write!(f, "Dump"),
            ShieldPhase::DumpAll => write!(f, "Dump All"),
            ShieldPhase::Update => write!(f, "Update"),
            ShieldPhase::Reload => write!(f, "Reload"),
        }
    }
}

/// Events emitted by the command client.
#[derive(Debug, Clone)]
pub enum ShieldEvent {
    /// Device answered the post-reset version probe.
    DeviceResponding { version: i64 },
    /// Phase changed.
    PhaseChanged { from: ShieldPhase, to: ShieldPhase },
    /// Transfer progress.
    Progress {
        phase: ShieldPhase,
        position: usize,
        total: usize,
    },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// Device refused a command (replied something other than `ok`).
    Rejected { command: String, reply: String },
    /// Packet sent/received.
    Packet {
        direction: PacketDirection,
        length: usize,
        data: Option<Vec<u8>>,
    },
    /// Command finished with an `ok` from the device.
    Complete { command: String },
}

/// Packet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Host -> Device
    Rx, // Device -> Host
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Observer trait for receiving shield events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait ShieldObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &ShieldEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl ShieldObserver for NullObserver {
    fn on_event(&self, _event: &ShieldEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl ShieldObserver for TracingObserver {
    fn on_event(&self, event: &ShieldEvent) {
        match event {
            ShieldEvent::DeviceResponding { version } => {
                tracing::info!(version, "Device responding");
            }
            ShieldEvent::PhaseChanged { from, to } => {
                tracing::debug!(from = %from, to = %to, "Phase changed");
            }
            ShieldEvent::Progress {
                phase,
                position,
                total,
            } => {
                tracing::trace!(phase = %phase, position, total, "Progress");
            }
            ShieldEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            ShieldEvent::Rejected { command, reply } => {
                tracing::warn!(command = %command, reply = %reply, "Device rejected command");
            }
            ShieldEvent::Packet {
                direction, length, ..
            } => {
                tracing::trace!(dir = %direction, len = length, "Packet");
            }
            ShieldEvent::Complete { command } => {
                tracing::info!(command = %command, "Command complete");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Observer that records every event.
    #[derive(Default)]
    pub struct RecordingObserver {
        pub events: Mutex<Vec<ShieldEvent>>,
    }

    impl ShieldObserver for RecordingObserver {
        fn on_event(&self, event: &ShieldEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}
