//! Live mirror of bus-observable layout state (spec.md §4.3).
//!
//! Three collections, three independent `Mutex<HashMap>` + `Condvar` pairs —
//! never one global lock, so a caller blocked in `wait_for_sensor` never
//! holds up a switch update. A fourth map tracks locomotive address → slot
//! number, since `LOCO_SPD`/`LOCO_DIRF`/`LOCO_SND` address a slot, not a
//! locomotive address directly; commands against an address with no known
//! slot yet trigger a bounded status-request-and-retry before giving up.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use loconet_proto::{ConsistState, Direction, Message, SensorState, SlotStatus, ThrownState};
use loconet_transport::{CallbackToken, Interface};

use crate::error::{Result, ScrollError};
use crate::types::{Sensor, Slot, Switch};

const STATUS_REQUEST_ATTEMPTS: u32 = 3;
const STATUS_REQUEST_TIMEOUT: Duration = Duration::from_millis(500);

/// Live mirror of sensors, switches, and command-station slots, kept in
/// sync by registering itself as an [`Interface`] callback.
pub struct Scrollkeeper {
    interface: Weak<Interface>,
    callback_token: Mutex<Option<CallbackToken>>,

    sensors: Mutex<HashMap<u16, Sensor>>,
    sensors_cv: std::sync::Condvar,

    switches: Mutex<HashMap<u16, Switch>>,
    switches_cv: std::sync::Condvar,

    slots: Mutex<HashMap<u8, Slot>>,
    slots_cv: std::sync::Condvar,

    addr_to_slot: Mutex<HashMap<u16, u8>>,
    addr_to_slot_cv: std::sync::Condvar,

    last_long_ack: Mutex<Option<(u8, u8)>>,
    last_extended_functions: Mutex<Option<(u8, [bool; 8])>>,
}

impl Scrollkeeper {
    /// Build a Scrollkeeper wired to `interface` via a `Weak` back-reference
    /// (spec.md §9 design note), and register it as an inbound callback.
    ///
    /// # Panics
    ///
    /// Panics if the internal callback-token mutex is poisoned.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(interface: &Arc<Interface>) -> Arc<Self> {
        let this = Arc::new(Self {
            interface: Arc::downgrade(interface),
            callback_token: Mutex::new(None),
            sensors: Mutex::new(HashMap::new()),
            sensors_cv: std::sync::Condvar::new(),
            switches: Mutex::new(HashMap::new()),
            switches_cv: std::sync::Condvar::new(),
            slots: Mutex::new(HashMap::new()),
            slots_cv: std::sync::Condvar::new(),
            addr_to_slot: Mutex::new(HashMap::new()),
            addr_to_slot_cv: std::sync::Condvar::new(),
            last_long_ack: Mutex::new(None),
            last_extended_functions: Mutex::new(None),
        });

        let weak = Arc::downgrade(&this);
        let token = interface.register_callback(move |msg| {
            if let Some(sk) = weak.upgrade() {
                sk.on_message(msg);
            }
        });
        *this.callback_token.lock().expect("Scrollkeeper callback_token mutex poisoned") =
            Some(token);
        this
    }

    /// Stop mirroring: unregisters the Interface callback. Safe to call more
    /// than once.
    ///
    /// # Panics
    ///
    /// Panics if the internal callback-token mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn detach(&self) {
        let token = self
            .callback_token
            .lock()
            .expect("Scrollkeeper callback_token mutex poisoned")
            .take();
        if let (Some(token), Some(iface)) = (token, self.interface.upgrade()) {
            iface.unregister_callback(token);
        }
    }

    /// The callback registered with Interface (spec.md §4.3 `on_message`).
    #[allow(clippy::expect_used)]
    fn on_message(&self, msg: &Message) {
        match *msg {
            Message::InputRep { sensor, state } => {
                let mut sensors = self.sensors.lock().expect("sensors mutex poisoned");
                sensors.insert(sensor, Sensor { address: sensor, state });
                drop(sensors);
                self.sensors_cv.notify_all();
            },
            Message::SwReq { switch, thrown, engaged } => {
                self.upsert_switch(switch, thrown, engaged);
            },
            Message::SwRep { switch, thrown, engaged } => {
                self.upsert_switch(switch, thrown, engaged);
            },
            Message::LongAck { response_to, code } => {
                *self.last_long_ack.lock().expect("last_long_ack mutex poisoned") =
                    Some((response_to, code));
            },
            Message::SlotRdData { slot, address, speed, direction, status, consist, functions } => {
                let mut map = HashMap::new();
                for (i, on) in functions.into_iter().enumerate() {
                    map.insert(i as u8, on);
                }
                let record = Slot { slot, address: Some(address), speed, direction, status, consist, functions: map };
                self.upsert_slot(slot, record);
                if address != 0 {
                    self.link_address(address, slot);
                }
            },
            Message::LocoSpd { slot, speed } => {
                self.mutate_slot(slot, |s| s.speed = speed);
            },
            Message::LocoDirF { slot, direction, f0, f1, f2, f3, f4 } => {
                self.mutate_slot(slot, |s| {
                    s.direction = direction;
                    s.functions.insert(0, f0);
                    s.functions.insert(1, f1);
                    s.functions.insert(2, f2);
                    s.functions.insert(3, f3);
                    s.functions.insert(4, f4);
                });
            },
            Message::LocoSnd { slot, f5, f6, f7, f8 } => {
                self.mutate_slot(slot, |s| {
                    s.functions.insert(5, f5);
                    s.functions.insert(6, f6);
                    s.functions.insert(7, f7);
                    s.functions.insert(8, f8);
                });
            },
            Message::LocoF9F12 { slot, f9, f10, f11, f12 } => {
                self.mutate_slot(slot, |s| {
                    s.functions.insert(9, f9);
                    s.functions.insert(10, f10);
                    s.functions.insert(11, f11);
                    s.functions.insert(12, f12);
                });
            },
            Message::ImmPacket { .. } => {
                // OPC_IMM_PACKET carries no slot number, only a raw DCC
                // packet; mapping its F13..F28 bits to a specific slot
                // would need out-of-band DCC-address matching this layer
                // doesn't do. Exposed for callers that want to do that
                // matching themselves — see `last_extended_functions`.
                if let Some(decoded) = msg.extended_functions() {
                    *self
                        .last_extended_functions
                        .lock()
                        .expect("last_extended_functions mutex poisoned") = Some(decoded);
                }
            },
            Message::CaptureTimeStamp { .. } => {
                // Never reaches here: the reader worker filters these out
                // before they hit the inbound queue. Matched for completeness.
            },
            Message::GpOn | Message::GpBusy | Message::GpOff => {},
            Message::SwStateReq { .. } | Message::LocoAdr { .. } | Message::Unknown { .. } => {
                tracing::trace!(?msg, "no Scrollkeeper state change for this message");
            },
        }
    }

    #[allow(clippy::expect_used)]
    fn upsert_switch(&self, switch: u16, thrown: ThrownState, engaged: bool) {
        let mut switches = self.switches.lock().expect("switches mutex poisoned");
        switches.insert(switch, Switch { address: switch, thrown, engaged });
        drop(switches);
        self.switches_cv.notify_all();
    }

    #[allow(clippy::expect_used)]
    fn upsert_slot(&self, slot: u8, record: Slot) {
        let mut slots = self.slots.lock().expect("slots mutex poisoned");
        slots.insert(slot, record);
        drop(slots);
        self.slots_cv.notify_all();
    }

    #[allow(clippy::expect_used)]
    fn mutate_slot(&self, slot: u8, f: impl FnOnce(&mut Slot)) {
        let mut slots = self.slots.lock().expect("slots mutex poisoned");
        let entry = slots.entry(slot).or_insert_with(|| Slot::empty(slot));
        f(entry);
        drop(slots);
        self.slots_cv.notify_all();
    }

    #[allow(clippy::expect_used)]
    fn link_address(&self, address: u16, slot: u8) {
        let mut map = self.addr_to_slot.lock().expect("addr_to_slot mutex poisoned");
        map.insert(address, slot);
        drop(map);
        self.addr_to_slot_cv.notify_all();
    }

    /// Current state of one sensor, if ever observed.
    ///
    /// # Panics
    ///
    /// Panics if the sensors mutex is poisoned.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn get_sensor(&self, addr: u16) -> Option<Sensor> {
        self.sensors.lock().expect("sensors mutex poisoned").get(&addr).copied()
    }

    /// Current state of one switch, if ever observed.
    ///
    /// # Panics
    ///
    /// Panics if the switches mutex is poisoned.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn get_switch(&self, addr: u16) -> Option<Switch> {
        self.switches.lock().expect("switches mutex poisoned").get(&addr).copied()
    }

    /// Current state of one slot, if ever observed.
    ///
    /// # Panics
    ///
    /// Panics if the slots mutex is poisoned.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn get_slot(&self, slot: u8) -> Option<Slot> {
        self.slots.lock().expect("slots mutex poisoned").get(&slot).cloned()
    }

    /// Snapshot of every known sensor.
    ///
    /// # Panics
    ///
    /// Panics if the sensors mutex is poisoned.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn sensors(&self) -> Vec<Sensor> {
        self.sensors.lock().expect("sensors mutex poisoned").values().copied().collect()
    }

    /// Snapshot of every known switch.
    ///
    /// # Panics
    ///
    /// Panics if the switches mutex is poisoned.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn switches(&self) -> Vec<Switch> {
        self.switches.lock().expect("switches mutex poisoned").values().copied().collect()
    }

    /// Snapshot of every known slot.
    ///
    /// # Panics
    ///
    /// Panics if the slots mutex is poisoned.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn slots(&self) -> Vec<Slot> {
        self.slots.lock().expect("slots mutex poisoned").values().cloned().collect()
    }

    /// The most recent NMRA DCC feature-expansion decode seen in an
    /// `IMM_PACKET` (F13..F20 or F21..F28), if any.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn last_extended_functions(&self) -> Option<(u8, [bool; 8])> {
        *self.last_extended_functions.lock().expect("last_extended_functions mutex poisoned")
    }

    /// Block until `addr`'s sensor state matches `desired`, or `timeout`
    /// elapses.
    ///
    /// # Errors
    /// `Timeout` if the deadline elapses first.
    ///
    /// # Panics
    ///
    /// Panics if the sensors mutex or its condvar is poisoned.
    #[allow(clippy::expect_used)]
    pub fn wait_for_sensor(&self, addr: u16, desired: SensorState, timeout: Duration) -> Result<()> {
        let guard = self.sensors.lock().expect("sensors mutex poisoned");
        let (_guard, wait_result) = self
            .sensors_cv
            .wait_timeout_while(guard, timeout, |m| {
                m.get(&addr).map(|s| s.state) != Some(desired)
            })
            .expect("sensors condvar wait poisoned");
        if wait_result.timed_out() { Err(ScrollError::Timeout) } else { Ok(()) }
    }

    /// Block until `addr`'s switch position matches `desired`, or `timeout`
    /// elapses.
    ///
    /// # Errors
    /// `Timeout` if the deadline elapses first.
    ///
    /// # Panics
    ///
    /// Panics if the switches mutex or its condvar is poisoned.
    #[allow(clippy::expect_used)]
    pub fn wait_for_switch(&self, addr: u16, desired: ThrownState, timeout: Duration) -> Result<()> {
        let guard = self.switches.lock().expect("switches mutex poisoned");
        let (_guard, wait_result) = self
            .switches_cv
            .wait_timeout_while(guard, timeout, |m| {
                m.get(&addr).map(|s| s.thrown) != Some(desired)
            })
            .expect("switches condvar wait poisoned");
        if wait_result.timed_out() { Err(ScrollError::Timeout) } else { Ok(()) }
    }

    /// Command a turnout to move. If `addr` has never been observed, first
    /// requests its state and retries the command once it's known, up to a
    /// bounded attempt count.
    ///
    /// # Errors
    /// `UnknownEntity` if the switch never responds; `InterfaceClosed` if
    /// the underlying Interface has stopped.
    pub fn set_switch(&self, addr: u16, thrown: ThrownState) -> Result<()> {
        self.ensure_switch_known(addr)?;
        self.send(Message::SwReq { switch: addr, thrown, engaged: true })
    }

    /// Set a locomotive's speed step. Resolves `address` to a slot first,
    /// requesting one if none is known yet.
    ///
    /// # Errors
    /// `UnknownEntity` if no slot is ever allocated; `InterfaceClosed` if
    /// the underlying Interface has stopped.
    pub fn set_loco_speed(&self, address: u16, speed: u8) -> Result<()> {
        let slot = self.ensure_slot_for_address(address)?;
        self.send(Message::LocoSpd { slot, speed })
    }

    /// Set a locomotive's direction of travel, preserving its last-known
    /// F0..F4 state.
    ///
    /// # Errors
    /// `UnknownEntity` if no slot is ever allocated; `InterfaceClosed` if
    /// the underlying Interface has stopped.
    pub fn set_loco_direction(&self, address: u16, direction: Direction) -> Result<()> {
        let slot_num = self.ensure_slot_for_address(address)?;
        let slot = self.get_slot(slot_num).unwrap_or_else(|| Slot::empty(slot_num));
        self.send(Message::LocoDirF {
            slot: slot_num,
            direction,
            f0: slot.functions.get(&0).copied().unwrap_or(false),
            f1: slot.functions.get(&1).copied().unwrap_or(false),
            f2: slot.functions.get(&2).copied().unwrap_or(false),
            f3: slot.functions.get(&3).copied().unwrap_or(false),
            f4: slot.functions.get(&4).copied().unwrap_or(false),
        })
    }

    /// Set one function (F0..F28) on or off, resolving `address` to a slot
    /// first. F0..F12 ride the dedicated `LOCO_DIRF`/`LOCO_SND`/`LOCO_F9F12`
    /// opcodes; F13..F28 are sent as an NMRA DCC feature-expansion
    /// instruction wrapped in `IMM_PACKET`.
    ///
    /// # Errors
    /// `InvalidArgument` if `n > 28`; `UnknownEntity` if no slot is ever
    /// allocated; `InterfaceClosed` if the underlying Interface has stopped.
    pub fn set_loco_function(&self, address: u16, n: u8, on: bool) -> Result<()> {
        if n > 28 {
            return Err(ScrollError::InvalidArgument(format!(
                "function index {n} out of range 0..=28"
            )));
        }
        let slot_num = self.ensure_slot_for_address(address)?;
        let mut slot = self.get_slot(slot_num).unwrap_or_else(|| Slot::empty(slot_num));
        slot.functions.insert(n, on);

        match n {
            0..=4 => self.send(Message::LocoDirF {
                slot: slot_num,
                direction: slot.direction,
                f0: slot.functions.get(&0).copied().unwrap_or(false),
                f1: slot.functions.get(&1).copied().unwrap_or(false),
                f2: slot.functions.get(&2).copied().unwrap_or(false),
                f3: slot.functions.get(&3).copied().unwrap_or(false),
                f4: slot.functions.get(&4).copied().unwrap_or(false),
            }),
            5..=8 => self.send(Message::LocoSnd {
                slot: slot_num,
                f5: slot.functions.get(&5).copied().unwrap_or(false),
                f6: slot.functions.get(&6).copied().unwrap_or(false),
                f7: slot.functions.get(&7).copied().unwrap_or(false),
                f8: slot.functions.get(&8).copied().unwrap_or(false),
            }),
            9..=12 => self.send(Message::LocoF9F12 {
                slot: slot_num,
                f9: slot.functions.get(&9).copied().unwrap_or(false),
                f10: slot.functions.get(&10).copied().unwrap_or(false),
                f11: slot.functions.get(&11).copied().unwrap_or(false),
                f12: slot.functions.get(&12).copied().unwrap_or(false),
            }),
            _ => {
                let base: u8 = if n <= 20 { 13 } else { 21 };
                let instr: u8 = if base == 13 { 0xDE } else { 0xDF };
                let mut mask = 0u8;
                for i in 0..8u8 {
                    if slot.functions.get(&(base + i)).copied().unwrap_or(false) {
                        mask |= 1 << i;
                    }
                }
                self.send(Message::ImmPacket { reps: 1, dcc: vec![instr, mask] })
            },
        }
    }

    /// A JSON snapshot of the whole mirror: `{time, slots, sensors,
    /// switches}`, consumed by `loconet-monitor`'s optional web push
    /// (spec.md §6.4).
    #[must_use]
    pub fn to_json_snapshot(&self) -> serde_json::Value {
        let time = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();

        let sensors: Vec<_> = self
            .sensors()
            .into_iter()
            .map(|s| {
                serde_json::json!({
                    "address": s.address,
                    "state": sensor_state_str(s.state),
                })
            })
            .collect();

        let switches: Vec<_> = self
            .switches()
            .into_iter()
            .map(|s| {
                serde_json::json!({
                    "address": s.address,
                    "thrown": thrown_state_str(s.thrown),
                    "engaged": s.engaged,
                })
            })
            .collect();

        let slots: Vec<_> = self
            .slots()
            .into_iter()
            .map(|s| {
                serde_json::json!({
                    "slot": s.slot,
                    "address": s.address,
                    "speed": s.speed,
                    "direction": matches!(s.direction, Direction::Reverse),
                    "status": slot_status_str(s.status),
                    "consist": consist_state_str(s.consist),
                    "functions": s.functions,
                })
            })
            .collect();

        serde_json::json!({ "time": time, "slots": slots, "sensors": sensors, "switches": switches })
    }

    #[allow(clippy::expect_used)]
    fn ensure_switch_known(&self, addr: u16) -> Result<()> {
        if self.get_switch(addr).is_some() {
            return Ok(());
        }
        for _ in 0..STATUS_REQUEST_ATTEMPTS {
            self.send(Message::SwStateReq { switch: addr })?;
            let guard = self.switches.lock().expect("switches mutex poisoned");
            let (_guard, wait_result) = self
                .switches_cv
                .wait_timeout_while(guard, STATUS_REQUEST_TIMEOUT, |m| !m.contains_key(&addr))
                .expect("switches condvar wait poisoned");
            if !wait_result.timed_out() {
                return Ok(());
            }
        }
        Err(ScrollError::UnknownEntity { address: addr, attempts: STATUS_REQUEST_ATTEMPTS })
    }

    #[allow(clippy::expect_used)]
    fn ensure_slot_for_address(&self, address: u16) -> Result<u8> {
        if let Some(&slot) = self.addr_to_slot.lock().expect("addr_to_slot mutex poisoned").get(&address) {
            return Ok(slot);
        }
        for _ in 0..STATUS_REQUEST_ATTEMPTS {
            self.send(Message::LocoAdr { address })?;
            let guard = self.addr_to_slot.lock().expect("addr_to_slot mutex poisoned");
            let (guard, wait_result) = self
                .addr_to_slot_cv
                .wait_timeout_while(guard, STATUS_REQUEST_TIMEOUT, |m| !m.contains_key(&address))
                .expect("addr_to_slot condvar wait poisoned");
            if !wait_result.timed_out() {
                return Ok(guard[&address]);
            }
        }
        Err(ScrollError::UnknownEntity { address, attempts: STATUS_REQUEST_ATTEMPTS })
    }

    fn send(&self, msg: Message) -> Result<()> {
        let iface = self
            .interface
            .upgrade()
            .ok_or_else(|| ScrollError::InterfaceClosed("interface dropped".to_string()))?;
        iface.send(msg).map_err(|err| ScrollError::InterfaceClosed(err.to_string()))
    }
}

fn sensor_state_str(state: SensorState) -> &'static str {
    match state {
        SensorState::Active => "active",
        SensorState::Inactive => "inactive",
        SensorState::Unknown => "unknown",
    }
}

fn thrown_state_str(state: ThrownState) -> &'static str {
    match state {
        ThrownState::Closed => "closed",
        ThrownState::Thrown => "thrown",
        ThrownState::Unknown => "unknown",
    }
}

fn slot_status_str(status: SlotStatus) -> &'static str {
    match status {
        SlotStatus::Free => "free",
        SlotStatus::Common => "common",
        SlotStatus::Idle => "idle",
        SlotStatus::InUse => "in_use",
    }
}

fn consist_state_str(consist: ConsistState) -> &'static str {
    match consist {
        ConsistState::Free => "free",
        ConsistState::Top => "top",
        ConsistState::Sub => "sub",
        ConsistState::Mid => "mid",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_update_and_wait() {
        let iface = Interface::open_dummy();
        let sk = Scrollkeeper::new(&iface);
        assert!(sk.get_sensor(12).is_none());

        sk.on_message(&Message::InputRep { sensor: 12, state: SensorState::Active });
        assert_eq!(sk.get_sensor(12).unwrap().state, SensorState::Active);

        sk.wait_for_sensor(12, SensorState::Active, Duration::from_millis(10)).unwrap();
        assert!(sk.wait_for_sensor(99, SensorState::Active, Duration::from_millis(10)).is_err());
    }

    #[test]
    fn switch_roundtrip_through_sw_rep() {
        let iface = Interface::open_dummy();
        let sk = Scrollkeeper::new(&iface);
        sk.on_message(&Message::SwRep { switch: 5, thrown: ThrownState::Thrown, engaged: false });
        let sw = sk.get_switch(5).unwrap();
        assert_eq!(sw.thrown, ThrownState::Thrown);
    }

    #[test]
    fn set_switch_on_unknown_address_times_out() {
        let iface = Interface::open_dummy();
        let sk = Scrollkeeper::new(&iface);
        let result = sk.set_switch(777, ThrownState::Thrown);
        assert!(matches!(result, Err(ScrollError::UnknownEntity { address: 777, .. })));
    }

    #[test]
    fn slot_read_data_links_address_and_speed_command_uses_it() {
        let iface = Interface::open_dummy();
        let sk = Scrollkeeper::new(&iface);
        sk.on_message(&Message::SlotRdData {
            slot: 3,
            address: 1234,
            speed: 0,
            direction: Direction::Forward,
            status: SlotStatus::InUse,
            consist: ConsistState::Free,
            functions: [false; 9],
        });
        assert!(sk.set_loco_speed(1234, 60).is_ok());
        assert_eq!(sk.get_slot(3).unwrap().address, Some(1234));
    }

    #[test]
    fn repeated_identical_status_messages_are_idempotent() {
        let iface = Interface::open_dummy();
        let sk = Scrollkeeper::new(&iface);

        for _ in 0..5 {
            sk.on_message(&Message::InputRep { sensor: 12, state: SensorState::Active });
            sk.on_message(&Message::SwRep { switch: 4, thrown: ThrownState::Thrown, engaged: true });
        }

        assert_eq!(sk.sensors().len(), 1);
        assert_eq!(sk.switches().len(), 1);
        assert_eq!(sk.get_sensor(12).unwrap().state, SensorState::Active);
        assert_eq!(sk.get_switch(4).unwrap().thrown, ThrownState::Thrown);
    }

    #[test]
    fn json_snapshot_reflects_mirrored_state() {
        let iface = Interface::open_dummy();
        let sk = Scrollkeeper::new(&iface);
        sk.on_message(&Message::InputRep { sensor: 1, state: SensorState::Active });
        let snapshot = sk.to_json_snapshot();
        assert_eq!(snapshot["sensors"][0]["address"], 1);
        assert_eq!(snapshot["sensors"][0]["state"], "active");
    }
}
