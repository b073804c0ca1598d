//! Simulated FPGA test shield.
//!
//! Runs the device half of the protocol stack on its own thread and exposes the
//! host end of the line as a [`SerialLink`](crate::transport::SerialLink), so the
//! whole host stack can be driven without hardware.

mod device;
mod link;

pub use link::SimLink;

use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use tracing::debug;

use crate::image::build_image;
use crate::protocol::DeviceStats;
use crate::protocol::constants::{DEVICE_CHUNK_SIZE, INITIAL_BAUD_RATE};

/// Flash erase value.
const FLASH_ERASED: u8 = 0xFF;
const DEFAULT_FLASH_SIZE: usize = 0x40_0000;
const DEFAULT_VERSION: i64 = 1;

pub(crate) struct DeviceState {
    pub(crate) version: i64,
    pub(crate) image: Vec<u8>,
    pub(crate) flash_size: usize,
    pub(crate) chunk_size: usize,
    pub(crate) initial_baud: u32,
    pub(crate) baud: u32,
    pub(crate) stats: DeviceStats,
    pub(crate) reloads: u32,
    pub(crate) updates_accepted: u32,
    pub(crate) updates_rejected: u32,
}

impl DeviceState {
    /// Flash contents: the stored image followed by erased space.
    pub(crate) fn flash(&self) -> Vec<u8> {
        let mut flash = self.image.clone();
        if flash.len() < self.flash_size {
            flash.resize(self.flash_size, FLASH_ERASED);
        }
        flash
    }
}

/// Handle to a simulated shield. Clones share the same device.
#[derive(Clone)]
pub struct SimulatedShield {
    state: Arc<Mutex<DeviceState>>,
}

impl Default for SimulatedShield {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedShield {
    /// A device holding a small valid image, listening at the initial baud rate.
    pub fn new() -> Self {
        let bitstream: Vec<u8> = (0..1024u32).map(|i| (i * 7 + 3) as u8).collect();
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                version: DEFAULT_VERSION,
                image: build_image(&bitstream),
                flash_size: DEFAULT_FLASH_SIZE,
                chunk_size: DEVICE_CHUNK_SIZE,
                initial_baud: INITIAL_BAUD_RATE,
                baud: INITIAL_BAUD_RATE,
                stats: DeviceStats::default(),
                reloads: 0,
                updates_accepted: 0,
                updates_rejected: 0,
            })),
        }
    }

    pub fn with_version(self, version: i64) -> Self {
        self.state().version = version;
        self
    }

    /// Replace the stored wire image.
    pub fn with_image(self, image: Vec<u8>) -> Self {
        self.state().image = image;
        self
    }

    pub fn with_flash_size(self, flash_size: usize) -> Self {
        self.state().flash_size = flash_size;
        self
    }

    /// Bytes per remote file read/write issued by the device.
    pub fn with_chunk_size(self, chunk_size: usize) -> Self {
        self.state().chunk_size = chunk_size.max(1);
        self
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn stored_image(&self) -> Vec<u8> {
        self.state().image.clone()
    }

    pub fn stats(&self) -> DeviceStats {
        self.state().stats
    }

    pub fn reloads(&self) -> u32 {
        self.state().reloads
    }

    /// `(accepted, rejected)` update counts.
    pub fn updates(&self) -> (u32, u32) {
        let state = self.state();
        (state.updates_accepted, state.updates_rejected)
    }

    /// Baud rate the device is currently listening at.
    pub fn baud_rate(&self) -> u32 {
        self.state().baud
    }

    /// Plug a new line into the device and start its firmware loop.
    ///
    /// The host end starts at the device's initial baud rate. Dropping the
    /// returned link stops the device thread.
    pub fn connect(&self) -> SimLink {
        let (to_device, device_rx) = mpsc::channel();
        let (device_tx, from_device) = mpsc::channel();
        let state = Arc::clone(&self.state);
        let initial_baud = {
            let mut state = self.state();
            state.baud = state.initial_baud;
            state.initial_baud
        };

        debug!(baud = initial_baud, "Simulated shield connected");
        let handle = thread::spawn(move || device::run(device_rx, device_tx, state));
        SimLink::new(to_device, from_device, initial_baud, handle)
    }
}
