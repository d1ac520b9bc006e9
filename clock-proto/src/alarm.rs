use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::reading::{ClockReading, Field, InputError};

/// An alarm going off every day at a given hour and minute.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawAlarm")]
pub struct Alarm {
    hour: u8,
    minute: u8,
}

#[derive(Deserialize)]
struct RawAlarm {
    #[serde(alias = "hora")]
    hour: i64,
    #[serde(alias = "minuto")]
    minute: i64,
}

impl TryFrom<RawAlarm> for Alarm {
    type Error = InputError;

    fn try_from(raw: RawAlarm) -> Result<Self, Self::Error> {
        Alarm::new(raw.hour, raw.minute)
    }
}

impl Alarm {
    pub fn new(hour: i64, minute: i64) -> Result<Self, InputError> {
        // an alarm is a reading without seconds
        let reading = ClockReading::new(hour, minute, 0)?;
        Ok(Alarm {
            hour: reading.hour(),
            minute: reading.minute(),
        })
    }

    pub fn parse(hour: &str, minute: &str) -> Result<Self, InputError> {
        Ok(Alarm {
            hour: Field::Hour.parse(hour)?,
            minute: Field::Minute.parse(minute)?,
        })
    }

    pub const fn hour(self) -> u8 {
        self.hour
    }

    pub const fn minute(self) -> u8 {
        self.minute
    }

    pub fn matches(self, reading: ClockReading) -> bool {
        self.hour == reading.hour() && self.minute == reading.minute()
    }
}

impl Display for Alarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlarmError {
    #[error("no alarm at index {index}, {len} alarm(s) set")]
    NoSuchAlarm { index: usize, len: usize },
    #[error("an alarm for {0} is already set")]
    Duplicate(Alarm),
}

/// Ordered collection of alarms with one of them marked active.
///
/// Insertion order is the priority order: when the active alarm is deleted,
/// the alarm that followed it becomes active. When the deleted alarm was the
/// last one in the list, the first remaining alarm is promoted instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAlarmBook")]
pub struct AlarmBook {
    alarms: Vec<Alarm>,
    active: Option<usize>,
}

#[derive(Deserialize)]
struct RawAlarmBook {
    #[serde(default)]
    alarms: Vec<Alarm>,
    #[serde(default)]
    active: Option<usize>,
}

impl TryFrom<RawAlarmBook> for AlarmBook {
    type Error = AlarmError;

    fn try_from(raw: RawAlarmBook) -> Result<Self, Self::Error> {
        let mut book = AlarmBook::default();
        for alarm in raw.alarms {
            book.add(alarm)?;
        }
        if let Some(index) = raw.active {
            book.activate(index)?;
        }
        Ok(book)
    }
}

impl AlarmBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an alarm, returning its index. The first alarm added to an
    /// empty book becomes the active one.
    pub fn add(&mut self, alarm: Alarm) -> Result<usize, AlarmError> {
        if self.alarms.contains(&alarm) {
            return Err(AlarmError::Duplicate(alarm));
        }

        self.alarms.push(alarm);
        let index = self.alarms.len() - 1;
        if self.active.is_none() {
            self.active = Some(index);
        }

        Ok(index)
    }

    pub fn remove(&mut self, index: usize) -> Result<Alarm, AlarmError> {
        if index >= self.alarms.len() {
            return Err(AlarmError::NoSuchAlarm {
                index,
                len: self.alarms.len(),
            });
        }

        let removed = self.alarms.remove(index);

        self.active = match self.active {
            _ if self.alarms.is_empty() => None,
            // the alarm after the removed one now sits at `index`
            Some(active) if active == index => Some(if index < self.alarms.len() {
                index
            } else {
                0
            }),
            Some(active) if active > index => Some(active - 1),
            other => other,
        };

        Ok(removed)
    }

    pub fn activate(&mut self, index: usize) -> Result<Alarm, AlarmError> {
        let alarm = self.get(index)?;
        self.active = Some(index);
        Ok(alarm)
    }

    pub fn get(&self, index: usize) -> Result<Alarm, AlarmError> {
        self.alarms
            .get(index)
            .copied()
            .ok_or(AlarmError::NoSuchAlarm {
                index,
                len: self.alarms.len(),
            })
    }

    pub fn active(&self) -> Option<Alarm> {
        self.active.map(|index| self.alarms[index])
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn alarms(&self) -> &[Alarm] {
        &self.alarms
    }

    pub fn len(&self) -> usize {
        self.alarms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alarms.is_empty()
    }

    pub fn clear(&mut self) {
        self.alarms.clear();
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alarm(h: i64, m: i64) -> Alarm {
        Alarm::new(h, m).unwrap()
    }

    fn book(alarms: &[(i64, i64)]) -> AlarmBook {
        let mut book = AlarmBook::new();
        for (h, m) in alarms {
            book.add(alarm(*h, *m)).unwrap();
        }
        book
    }

    #[test]
    fn first_alarm_becomes_active() {
        let mut book = AlarmBook::new();
        assert_eq!(book.active(), None);

        assert_eq!(book.add(alarm(7, 0)), Ok(0));
        assert_eq!(book.add(alarm(8, 0)), Ok(1));
        assert_eq!(book.active(), Some(alarm(7, 0)));
    }

    #[test]
    fn deleting_active_promotes_next() {
        let mut book = book(&[(7, 0), (8, 0)]);
        assert_eq!(book.remove(0), Ok(alarm(7, 0)));
        assert_eq!(book.active(), Some(alarm(8, 0)));
        assert_eq!(book.active_index(), Some(0));
    }

    #[test]
    fn deleting_last_alarm_clears_active() {
        let mut book = book(&[(7, 0)]);
        book.remove(0).unwrap();
        assert!(book.is_empty());
        assert_eq!(book.active(), None);
    }

    #[test]
    fn deleting_active_at_end_promotes_first() {
        let mut book = book(&[(6, 0), (7, 0), (8, 0)]);
        book.activate(2).unwrap();
        book.remove(2).unwrap();
        assert_eq!(book.active(), Some(alarm(6, 0)));
    }

    #[test]
    fn deleting_other_alarm_keeps_active() {
        let mut book = book(&[(6, 0), (7, 0), (8, 0)]);
        book.activate(2).unwrap();
        book.remove(0).unwrap();
        assert_eq!(book.active(), Some(alarm(8, 0)));
        assert_eq!(book.active_index(), Some(1));

        book.remove(0).unwrap();
        assert_eq!(book.active(), Some(alarm(8, 0)));
        assert_eq!(book.active_index(), Some(0));
    }

    #[test]
    fn invalid_index() {
        let mut book = book(&[(7, 0)]);
        assert_eq!(
            book.remove(3),
            Err(AlarmError::NoSuchAlarm { index: 3, len: 1 })
        );
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn duplicates_rejected() {
        let mut book = book(&[(7, 30)]);
        assert_eq!(
            book.add(alarm(7, 30)),
            Err(AlarmError::Duplicate(alarm(7, 30)))
        );
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn serde_roundtrip_keeps_active() {
        let mut original = book(&[(6, 0), (7, 0)]);
        original.activate(1).unwrap();

        let json = serde_json::to_string(&original).unwrap();
        let restored: AlarmBook = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn corrupt_book_is_rejected() {
        let result: Result<AlarmBook, _> =
            serde_json::from_str(r#"{"alarms": [{"hour": 7, "minute": 0}], "active": 4}"#);
        assert!(result.is_err());

        let result: Result<AlarmBook, _> =
            serde_json::from_str(r#"{"alarms": [{"hora": 27, "minuto": 0}]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn missing_index_message() {
        let mut book = AlarmBook::new();
        book.add(Alarm::new(7, 0).unwrap()).unwrap();
        book.add(Alarm::new(8, 0).unwrap()).unwrap();

        let error = book.remove(4).unwrap_err();
        assert_eq!(error.to_string(), "no alarm at index 4, 2 alarm(s) set");
    }
}
