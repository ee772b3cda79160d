//! Live mirror of bus-observable LocoNet layout state, and the query/wait
//! primitives scripts and monitors read it through (spec.md §4.3).

mod error;
mod scrollkeeper;
mod types;

pub use error::{Result, ScrollError};
pub use scrollkeeper::Scrollkeeper;
pub use types::{Sensor, Slot, Switch};
