//! Time resolution policy for an analog clock.
//!
//! This crate decides which time a clock face shows on every tick, how the
//! hands are angled, and which alarms go off. It does no IO of its own: the
//! daemon in `clockd` feeds it host time and remote fetch results.

#![forbid(unsafe_code)]

mod alarm;
mod reading;
mod remote;
mod resolver;

pub use alarm::{Alarm, AlarmBook, AlarmError};
pub use reading::{ClockReading, Field, HandAngles, InputError};
pub use remote::{FetchFailure, RemoteReading, ValidRemoteReading};
pub use resolver::{
    AlarmMode, ClockTimeResolver, FetchTicket, Precedence, ResolverSettings, TickOutcome,
    TimeSource,
};
