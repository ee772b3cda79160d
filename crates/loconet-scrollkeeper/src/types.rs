//! The layout-state records Scrollkeeper mirrors (spec.md §3.2-§3.4).

use std::collections::HashMap;

use loconet_proto::{ConsistState, Direction, SensorState, SlotStatus, ThrownState};

/// Observed state of one sensor address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sensor {
    /// Sensor address.
    pub address: u16,
    /// Last reported state.
    pub state: SensorState,
}

/// Observed state of one switch (turnout) address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch {
    /// Switch address.
    pub address: u16,
    /// Last reported position.
    pub thrown: ThrownState,
    /// Whether the output coil is currently engaged.
    pub engaged: bool,
}

/// Mirrored state of one command station slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Slot number.
    pub slot: u8,
    /// Locomotive address, once known.
    pub address: Option<u16>,
    /// Speed step, 0..127.
    pub speed: u8,
    /// Direction of travel.
    pub direction: Direction,
    /// Slot occupancy status.
    pub status: SlotStatus,
    /// Consist membership.
    pub consist: ConsistState,
    /// Function index (0..=28) → on/off.
    pub functions: HashMap<u8, bool>,
}

impl Slot {
    /// A freshly allocated slot with every function off and unknown
    /// direction/status/consist, before any data has arrived for it.
    #[must_use]
    pub fn empty(slot: u8) -> Self {
        Self {
            slot,
            address: None,
            speed: 0,
            direction: Direction::Forward,
            status: SlotStatus::Free,
            consist: ConsistState::Free,
            functions: HashMap::new(),
        }
    }
}
