use std::fmt::Display;

use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: u32 = 24 * 60 * 60;

/// One of the components of a clock reading, used to report which input was
/// rejected.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Field {
    Hour,
    Minute,
    Second,
}

impl Field {
    /// Largest value accepted for this field
    pub const fn max(self) -> i64 {
        match self {
            Field::Hour => 23,
            Field::Minute | Field::Second => 59,
        }
    }

    fn check(self, value: i64) -> Result<u8, InputError> {
        if (0..=self.max()).contains(&value) {
            Ok(value as u8)
        } else {
            Err(InputError::OutOfRange { field: self, value })
        }
    }

    /// Parse user supplied text for this field. Leading and trailing
    /// whitespace is ignored, anything else that is not a decimal integer is
    /// rejected.
    pub fn parse(self, text: &str) -> Result<u8, InputError> {
        let value = text
            .trim()
            .parse::<i64>()
            .map_err(|_| InputError::NotANumber {
                field: self,
                value: text.to_owned(),
            })?;
        self.check(value)
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Hour => f.write_str("hour"),
            Field::Minute => f.write_str("minute"),
            Field::Second => f.write_str("second"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("{field} must be a number, got '{value}'")]
    NotANumber { field: Field, value: String },
    #[error("{field} must be between 0 and {}, got {value}", field.max())]
    OutOfRange { field: Field, value: i64 },
}

/// Wall-clock time of day as shown on the clock face.
///
/// Construction always validates, so a `ClockReading` is guaranteed to have
/// an hour in 0..=23 and a minute and second in 0..=59.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawReading")]
pub struct ClockReading {
    hour: u8,
    minute: u8,
    second: u8,
}

#[derive(Deserialize)]
struct RawReading {
    #[serde(alias = "hora")]
    hour: i64,
    #[serde(alias = "minuto")]
    minute: i64,
    #[serde(alias = "segundo")]
    second: i64,
}

impl TryFrom<RawReading> for ClockReading {
    type Error = InputError;

    fn try_from(raw: RawReading) -> Result<Self, Self::Error> {
        ClockReading::new(raw.hour, raw.minute, raw.second)
    }
}

impl ClockReading {
    pub const MIDNIGHT: ClockReading = ClockReading {
        hour: 0,
        minute: 0,
        second: 0,
    };

    pub fn new(hour: i64, minute: i64, second: i64) -> Result<Self, InputError> {
        Ok(ClockReading {
            hour: Field::Hour.check(hour)?,
            minute: Field::Minute.check(minute)?,
            second: Field::Second.check(second)?,
        })
    }

    /// Parse a reading from user supplied text fields
    pub fn parse(hour: &str, minute: &str, second: &str) -> Result<Self, InputError> {
        Ok(ClockReading {
            hour: Field::Hour.parse(hour)?,
            minute: Field::Minute.parse(minute)?,
            second: Field::Second.parse(second)?,
        })
    }

    pub const fn hour(self) -> u8 {
        self.hour
    }

    pub const fn minute(self) -> u8 {
        self.minute
    }

    pub const fn second(self) -> u8 {
        self.second
    }

    pub fn seconds_since_midnight(self) -> u32 {
        self.hour as u32 * 3600 + self.minute as u32 * 60 + self.second as u32
    }

    fn from_seconds_since_midnight(seconds: u32) -> Self {
        let seconds = seconds % SECONDS_PER_DAY;
        ClockReading {
            hour: (seconds / 3600) as u8,
            minute: (seconds / 60 % 60) as u8,
            second: (seconds % 60) as u8,
        }
    }

    /// The reading one second later. Seconds carry into minutes, minutes into
    /// hours, and 23:59:59 wraps around to 00:00:00.
    pub fn advance(self) -> Self {
        let mut next = self;
        next.second += 1;
        if next.second == 60 {
            next.second = 0;
            next.minute += 1;
            if next.minute == 60 {
                next.minute = 0;
                next.hour = (next.hour + 1) % 24;
            }
        }
        next
    }

    /// The reading `seconds` later, wrapping at midnight.
    pub fn advanced_by(self, seconds: u32) -> Self {
        Self::from_seconds_since_midnight(
            self.seconds_since_midnight() + seconds % SECONDS_PER_DAY,
        )
    }

    pub fn angles(self) -> HandAngles {
        HandAngles::from_reading(self)
    }

    /// Twelve hour representation as shown in the display region,
    /// e.g. `07:05:09 PM`. Midnight and noon show as 12.
    pub fn twelve_hour(self) -> String {
        let period = if self.hour >= 12 { "PM" } else { "AM" };
        let hour = match self.hour % 12 {
            0 => 12,
            h => h,
        };
        format!(
            "{hour:02}:{:02}:{:02} {period}",
            self.minute, self.second
        )
    }
}

impl Default for ClockReading {
    fn default() -> Self {
        Self::MIDNIGHT
    }
}

impl Display for ClockReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

/// Angles of the three hands in degrees, measured clockwise from the 12
/// o'clock position.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HandAngles {
    pub hour: f64,
    pub minute: f64,
    pub second: f64,
}

impl HandAngles {
    /// second = 6·s, minute = 6·m + 0.1·s, hour = 30·(h mod 12) + 0.5·m
    pub fn from_reading(reading: ClockReading) -> Self {
        let hour = (reading.hour % 12) as f64;
        let minute = reading.minute as f64;
        let second = reading.second as f64;

        HandAngles {
            hour: 30.0 * hour + 0.5 * minute,
            // computed over tenths of a degree so the result is the correctly
            // rounded value of 6·m + 0.1·s
            minute: (60.0 * minute + second) / 10.0,
            second: 6.0 * second,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.hour.is_finite() && self.minute.is_finite() && self.second.is_finite()
    }
}
