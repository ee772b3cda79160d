//! Thin, synchronous façade over Scrollkeeper (spec.md §4.5).
//!
//! Holds no state of its own; every call is a direct pass-through to the
//! [`Scrollkeeper`] it wraps. Exists so layout-automation scripts read like
//! a short sequence of verbs (`throw_switch`, `wait_for_sensor`, ...)
//! instead of reaching into the mirror's full query surface.

use std::sync::Arc;
use std::time::Duration;

use loconet_proto::{Direction, SensorState, ThrownState};
use loconet_scrollkeeper::{Result, Scrollkeeper};

/// A synchronous handle for scripting layout automation against one
/// Scrollkeeper.
#[derive(Clone)]
pub struct Script {
    scrollkeeper: Arc<Scrollkeeper>,
}

impl Script {
    /// Wrap an existing Scrollkeeper.
    #[must_use]
    pub fn new(scrollkeeper: Arc<Scrollkeeper>) -> Self {
        Self { scrollkeeper }
    }

    /// Throw or close a turnout.
    ///
    /// # Errors
    /// See [`Scrollkeeper::set_switch`].
    pub fn throw_switch(&self, addr: u16, thrown: ThrownState) -> Result<()> {
        self.scrollkeeper.set_switch(addr, thrown)
    }

    /// Set a locomotive's speed step.
    ///
    /// # Errors
    /// See [`Scrollkeeper::set_loco_speed`].
    pub fn set_speed(&self, addr: u16, speed: u8) -> Result<()> {
        self.scrollkeeper.set_loco_speed(addr, speed)
    }

    /// Set a locomotive's direction of travel.
    ///
    /// # Errors
    /// See [`Scrollkeeper::set_loco_direction`].
    pub fn set_direction(&self, addr: u16, direction: Direction) -> Result<()> {
        self.scrollkeeper.set_loco_direction(addr, direction)
    }

    /// Turn a locomotive function (F0..F28) on or off.
    ///
    /// # Errors
    /// See [`Scrollkeeper::set_loco_function`].
    pub fn set_function(&self, addr: u16, function: u8, on: bool) -> Result<()> {
        self.scrollkeeper.set_loco_function(addr, function, on)
    }

    /// Block until `addr`'s sensor state matches `state`, or `timeout`
    /// elapses.
    ///
    /// # Errors
    /// See [`Scrollkeeper::wait_for_sensor`].
    pub fn wait_for_sensor(&self, addr: u16, state: SensorState, timeout: Duration) -> Result<()> {
        self.scrollkeeper.wait_for_sensor(addr, state, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loconet_transport::Interface;

    #[test]
    fn wait_for_sensor_passes_through_to_scrollkeeper() {
        let iface = Interface::open_dummy();
        let sk = Scrollkeeper::new(&iface);
        let script = Script::new(sk);

        assert!(script.wait_for_sensor(1, SensorState::Active, Duration::from_millis(5)).is_err());
    }

    #[test]
    fn set_speed_fails_on_unknown_loco_like_scrollkeeper_does() {
        let iface = Interface::open_dummy();
        let sk = Scrollkeeper::new(&iface);
        let script = Script::new(sk);
        assert!(script.set_speed(42, 50).is_err());
    }
}
