use serde::{Deserialize, Serialize};

use crate::reading::{ClockReading, HandAngles};

/// Payload of the remote time endpoint.
///
/// The hand angles are what the remote wants displayed; the `current_*`
/// fields report the remote's actual wall time separately and default to 0
/// when absent. Field names follow what the existing backends serve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteReading {
    #[serde(rename = "hora", alias = "hour")]
    pub hour_angle: f64,
    #[serde(rename = "minuto", alias = "minute")]
    pub minute_angle: f64,
    #[serde(rename = "segundo", alias = "second")]
    pub second_angle: f64,
    #[serde(rename = "alarma", alias = "alarm", default)]
    pub alarm: bool,
    #[serde(rename = "hora_actual", alias = "current_hour", default)]
    pub current_hour: Option<i64>,
    #[serde(rename = "minuto_actual", alias = "current_minute", default)]
    pub current_minute: Option<i64>,
    #[serde(rename = "segundo_actual", alias = "current_second", default)]
    pub current_second: Option<i64>,
}

/// A remote reading that passed validation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidRemoteReading {
    pub angles: HandAngles,
    pub reading: ClockReading,
    pub alarm: bool,
}

impl RemoteReading {
    pub fn new(angles: HandAngles, reading: ClockReading, alarm: bool) -> Self {
        RemoteReading {
            hour_angle: angles.hour,
            minute_angle: angles.minute,
            second_angle: angles.second,
            alarm,
            current_hour: Some(reading.hour().into()),
            current_minute: Some(reading.minute().into()),
            current_second: Some(reading.second().into()),
        }
    }

    pub fn angles(&self) -> HandAngles {
        HandAngles {
            hour: self.hour_angle,
            minute: self.minute_angle,
            second: self.second_angle,
        }
    }

    pub fn validate(&self) -> Result<ValidRemoteReading, FetchFailure> {
        let angles = self.angles();
        if !angles.is_finite() {
            return Err(FetchFailure::Malformed(
                "hand angles must be finite numbers".into(),
            ));
        }

        let reading = ClockReading::new(
            self.current_hour.unwrap_or(0),
            self.current_minute.unwrap_or(0),
            self.current_second.unwrap_or(0),
        )
        .map_err(|e| FetchFailure::Malformed(e.to_string()))?;

        Ok(ValidRemoteReading {
            angles,
            reading,
            alarm: self.alarm,
        })
    }
}

/// Why the remote time source could not be used for a tick
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchFailure {
    #[error("remote unreachable: {0}")]
    Unreachable(String),
    #[error("remote did not answer in time")]
    Timeout,
    #[error("remote answered with status {0}")]
    Status(u16),
    #[error("malformed remote payload: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_payload() {
        let payload = r#"{"hora": 304.0, "minuto": 48.5, "segundo": 30.0, "alarma": true,
            "hora_actual": 22, "minuto_actual": 8, "segundo_actual": 5}"#;
        let remote: RemoteReading = serde_json::from_str(payload).unwrap();
        let valid = remote.validate().unwrap();

        assert_eq!(valid.angles.hour, 304.0);
        assert_eq!(valid.angles.minute, 48.5);
        assert_eq!(valid.angles.second, 30.0);
        assert!(valid.alarm);
        assert_eq!(valid.reading, ClockReading::new(22, 8, 5).unwrap());
    }

    #[test]
    fn parses_english_names() {
        let payload = r#"{"hour": 1.5, "minute": 2.5, "second": 3.0, "alarm": false,
            "current_hour": 1, "current_minute": 2, "current_second": 3}"#;
        let remote: RemoteReading = serde_json::from_str(payload).unwrap();
        assert_eq!(
            remote.validate().unwrap().reading,
            ClockReading::new(1, 2, 3).unwrap()
        );
    }

    #[test]
    fn missing_actual_time_defaults_to_zero() {
        let remote: RemoteReading =
            serde_json::from_str(r#"{"hora": 0, "minuto": 0, "segundo": 0}"#).unwrap();
        let valid = remote.validate().unwrap();
        assert_eq!(valid.reading, ClockReading::MIDNIGHT);
        assert!(!valid.alarm);
    }

    #[test]
    fn non_numeric_angles_are_malformed() {
        let result: Result<RemoteReading, _> =
            serde_json::from_str(r#"{"hora": "noon", "minuto": 0, "segundo": 0}"#);
        assert!(result.is_err());

        let result: Result<RemoteReading, _> =
            serde_json::from_str(r#"{"minuto": 0, "segundo": 0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn out_of_range_actual_time_is_malformed() {
        let remote: RemoteReading = serde_json::from_str(
            r#"{"hora": 0, "minuto": 0, "segundo": 0, "hora_actual": 24}"#,
        )
        .unwrap();
        assert!(matches!(
            remote.validate(),
            Err(FetchFailure::Malformed(_))
        ));
    }

    #[test]
    fn served_payload_uses_backend_names() {
        let reading = ClockReading::new(15, 0, 0).unwrap();
        let remote = RemoteReading::new(reading.angles(), reading, false);
        let value = serde_json::to_value(&remote).unwrap();

        assert_eq!(value["hora"], 90.0);
        assert_eq!(value["hora_actual"], 15);
        assert_eq!(value["alarma"], false);
    }
}
