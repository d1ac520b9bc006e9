use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    alarm::{Alarm, AlarmBook, AlarmError},
    reading::{ClockReading, HandAngles},
    remote::{FetchFailure, RemoteReading},
};

/// Where the displayed time of a tick came from
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeSource {
    RemoteBackend,
    LocalSimulated,
    UserOverride,
}

impl std::fmt::Display for TimeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeSource::RemoteBackend => f.write_str("remote backend"),
            TimeSource::LocalSimulated => f.write_str("local clock"),
            TimeSource::UserOverride => f.write_str("user override"),
        }
    }
}

/// How a user override and a reachable remote source rank against each other.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Precedence {
    /// While an override is set the remote source is not consulted.
    #[default]
    OverrideFirst,
    /// A reachable remote source always wins, the override only advances on
    /// ticks where the remote failed.
    RemoteFirst,
}

/// Which stored alarms are eligible to fire.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlarmMode {
    #[default]
    All,
    ActiveOnly,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ResolverSettings {
    pub precedence: Precedence,
    pub alarm_mode: AlarmMode,
}

/// Everything a renderer and notifier need to know about one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickOutcome {
    pub source: TimeSource,
    pub reading: ClockReading,
    pub angles: HandAngles,
    /// An eligible alarm matches the current minute, or the remote reports
    /// its alarm as active.
    pub alarm_ringing: bool,
    /// Alarms that went off on this tick
    pub fired: Vec<Alarm>,
}

impl TickOutcome {
    pub fn alarm_fired(&self) -> bool {
        !self.fired.is_empty()
    }
}

/// Handed out when a remote fetch starts, returned when it completes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket {
    seq: u64,
}

/// Decides, once per tick, which time to display and which alarms are due.
///
/// The resolver performs no IO. The host wall-clock time and the outcome of
/// any remote fetch are passed in by the caller.
#[derive(Debug, Clone)]
pub struct ClockTimeResolver {
    settings: ResolverSettings,
    override_time: Option<ClockReading>,
    alarms: AlarmBook,
    backend_available: bool,
    next_seq: u64,
    last_applied: Option<u64>,
    // (hour, minute) alarms last fired in, so a repeated second 0 is ignored
    last_fired: Option<(u8, u8)>,
}

impl ClockTimeResolver {
    pub fn new(settings: ResolverSettings) -> Self {
        Self::with_state(settings, None, AlarmBook::default())
    }

    pub fn with_state(
        settings: ResolverSettings,
        override_time: Option<ClockReading>,
        alarms: AlarmBook,
    ) -> Self {
        ClockTimeResolver {
            settings,
            override_time,
            alarms,
            backend_available: false,
            next_seq: 0,
            last_applied: None,
            last_fired: None,
        }
    }

    /// Forget the override, the alarms and the backend state. Fetches that
    /// are still in flight are ignored when they complete.
    pub fn reset(&mut self) {
        self.override_time = None;
        self.alarms.clear();
        self.backend_available = false;
        self.last_applied = self.next_seq.checked_sub(1);
        self.last_fired = None;
    }

    pub fn settings(&self) -> ResolverSettings {
        self.settings
    }

    pub fn override_time(&self) -> Option<ClockReading> {
        self.override_time
    }

    pub fn alarms(&self) -> &AlarmBook {
        &self.alarms
    }

    pub fn backend_available(&self) -> bool {
        self.backend_available
    }

    pub fn set_override(&mut self, reading: ClockReading) {
        info!(%reading, "clock override set");
        self.override_time = Some(reading);
        if !self.consults_remote() {
            // not contacted until the override is cleared
            self.backend_available = false;
        }
    }

    /// Go back to real time. Returns the override that was cleared.
    pub fn clear_override(&mut self) -> Option<ClockReading> {
        let previous = self.override_time.take();
        if previous.is_some() {
            info!("clock override cleared, following real time again");
        }
        previous
    }

    pub fn add_alarm(&mut self, alarm: Alarm) -> Result<usize, AlarmError> {
        let index = self.alarms.add(alarm)?;
        info!(%alarm, index, "alarm set");
        Ok(index)
    }

    pub fn delete_alarm(&mut self, index: usize) -> Result<Alarm, AlarmError> {
        let alarm = self.alarms.remove(index)?;
        info!(%alarm, index, active = ?self.alarms.active(), "alarm deleted");
        Ok(alarm)
    }

    /// Whether the remote source should be consulted for the next tick
    pub fn consults_remote(&self) -> bool {
        match self.settings.precedence {
            Precedence::OverrideFirst => self.override_time.is_none(),
            Precedence::RemoteFirst => true,
        }
    }

    pub fn begin_fetch(&mut self) -> FetchTicket {
        let ticket = FetchTicket { seq: self.next_seq };
        self.next_seq += 1;
        ticket
    }

    /// Finish a tick that consulted the remote source.
    ///
    /// Returns `None` when a fetch that started later has already completed;
    /// its result supersedes this one.
    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<RemoteReading, FetchFailure>,
        wall: ClockReading,
    ) -> Option<TickOutcome> {
        if matches!(self.last_applied, Some(last) if ticket.seq <= last) {
            debug!(seq = ticket.seq, "dropping stale remote result");
            // the tick still happened, a local tick would have advanced the override
            let failed = result.map_or(true, |remote| remote.validate().is_err());
            if failed || !self.consults_remote() {
                self.override_time = self.override_time.map(ClockReading::advance);
            }
            return None;
        }
        self.last_applied = Some(ticket.seq);

        let valid = match result.and_then(|remote| remote.validate()) {
            Ok(valid) => valid,
            Err(failure) => {
                self.mark_backend(false, Some(&failure));
                return Some(self.tick_local(wall));
            }
        };

        self.mark_backend(true, None);

        // an override set while the fetch was in flight takes over right away
        if !self.consults_remote() {
            return Some(self.tick_local(wall));
        }

        let (ringing, fired) = self.check_alarms(valid.reading);
        Some(TickOutcome {
            source: TimeSource::RemoteBackend,
            reading: valid.reading,
            angles: valid.angles,
            alarm_ringing: ringing || valid.alarm,
            fired,
        })
    }

    /// Tick without a remote source: advance the override if there is one,
    /// otherwise show the host time.
    pub fn tick_local(&mut self, wall: ClockReading) -> TickOutcome {
        let (source, reading) = match self.override_time {
            Some(current) => {
                let next = current.advance();
                self.override_time = Some(next);
                (TimeSource::UserOverride, next)
            }
            None => (TimeSource::LocalSimulated, wall),
        };

        let (alarm_ringing, fired) = self.check_alarms(reading);
        TickOutcome {
            source,
            reading,
            angles: reading.angles(),
            alarm_ringing,
            fired,
        }
    }

    fn mark_backend(&mut self, available: bool, failure: Option<&FetchFailure>) {
        match (self.backend_available, available) {
            (false, true) => info!("remote time source available"),
            (true, false) => {
                warn!(
                    reason = ?failure,
                    "remote time source stopped responding, simulating locally"
                )
            }
            (false, false) => {
                debug!(reason = ?failure, "remote time source unavailable")
            }
            (true, true) => {}
        }
        self.backend_available = available;
    }

    fn check_alarms(&mut self, reading: ClockReading) -> (bool, Vec<Alarm>) {
        let minute = (reading.hour(), reading.minute());
        if self.last_fired.is_some_and(|fired| fired != minute) {
            self.last_fired = None;
        }

        let eligible: Vec<Alarm> = match self.settings.alarm_mode {
            AlarmMode::All => self.alarms.alarms().to_vec(),
            AlarmMode::ActiveOnly => self.alarms.active().into_iter().collect(),
        };
        let matching: Vec<Alarm> = eligible
            .into_iter()
            .filter(|alarm| alarm.matches(reading))
            .collect();
        let ringing = !matching.is_empty();

        if ringing && reading.second() == 0 && self.last_fired.is_none() {
            self.last_fired = Some(minute);
            for alarm in &matching {
                info!(%alarm, "alarm fired");
            }
            (ringing, matching)
        } else {
            (ringing, vec![])
        }
    }
}
