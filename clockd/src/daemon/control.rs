use std::os::unix::fs::PermissionsExt;
use std::time::Instant;

use clock_proto::{Alarm, ClockReading};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{
    config::ObservabilityConfig,
    sockets::{create_unix_socket_with_permissions, read_json, write_json},
    system::{ClockAction, ClockHandle, ClockSnapshot},
};

/// What clock-ctl asks the daemon. Values are checked by the daemon, so
/// out-of-range numbers are sent as they were typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "kebab-case")]
pub enum ControlRequest {
    Status,
    SetAlarm { hour: i64, minute: i64 },
    DeleteAlarm { index: usize },
    SetTime { hour: i64, minute: i64, second: i64 },
    Sync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub status: ResponseStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub state: Option<ObservableState>,
}

impl ControlResponse {
    fn error(message: impl Into<String>) -> Self {
        ControlResponse {
            status: ResponseStatus::Error,
            message: Some(message.into()),
            state: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservableState {
    pub program: ProgramData,
    pub clock: ClockSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramData {
    pub version: String,
    pub build_commit: String,
    pub build_commit_date: String,
    pub uptime_seconds: f64,
}

impl ProgramData {
    pub fn with_uptime(uptime_seconds: f64) -> ProgramData {
        ProgramData {
            uptime_seconds,
            ..Default::default()
        }
    }
}

impl Default for ProgramData {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_owned(),
            build_commit: env!("CLOCKD_GIT_REV").to_owned(),
            build_commit_date: env!("CLOCKD_GIT_DATE").to_owned(),
            uptime_seconds: 0.0,
        }
    }
}

fn action_for(request: &ControlRequest) -> Result<Option<ClockAction>, String> {
    let action = match *request {
        ControlRequest::Status => return Ok(None),
        ControlRequest::SetAlarm { hour, minute } => {
            ClockAction::SetAlarm(Alarm::new(hour, minute).map_err(|e| e.to_string())?)
        }
        ControlRequest::DeleteAlarm { index } => ClockAction::DeleteAlarm(index),
        ControlRequest::SetTime {
            hour,
            minute,
            second,
        } => ClockAction::SetTime(
            ClockReading::new(hour, minute, second).map_err(|e| e.to_string())?,
        ),
        ControlRequest::Sync => ClockAction::Sync,
    };
    Ok(Some(action))
}

pub async fn handle_request(
    request: &ControlRequest,
    clock: &ClockHandle,
    start_time: Instant,
) -> ControlResponse {
    let message = match action_for(request) {
        Err(message) => return ControlResponse::error(message),
        Ok(None) => None,
        Ok(Some(action)) => match clock.perform(action).await {
            Ok(message) => Some(message),
            Err(message) => return ControlResponse::error(message),
        },
    };

    ControlResponse {
        status: ResponseStatus::Success,
        message,
        state: Some(ObservableState {
            program: ProgramData::with_uptime(start_time.elapsed().as_secs_f64()),
            clock: clock.snapshot(),
        }),
    }
}

pub async fn spawn(
    config: &ObservabilityConfig,
    clock: ClockHandle,
) -> JoinHandle<std::io::Result<()>> {
    let config = config.clone();
    tokio::spawn(async move {
        let result = serve(config, clock).await;
        if let Err(ref e) = result {
            warn!("Abnormal termination of the control socket: {e}");
            warn!("clock-ctl will not be able to reach the daemon");
        }
        result
    })
}

async fn serve(config: ObservabilityConfig, clock: ClockHandle) -> std::io::Result<()> {
    let start_time = Instant::now();

    // clock-ctl usually runs as a different user than the daemon
    let permissions: std::fs::Permissions =
        PermissionsExt::from_mode(config.control_permissions);
    let listener = create_unix_socket_with_permissions(&config.control_path, permissions)?;

    loop {
        let (mut stream, _addr) = listener.accept().await?;
        let clock = clock.clone();

        tokio::spawn(async move {
            let mut buffer = Vec::with_capacity(256);
            let response = match read_json::<ControlRequest>(&mut stream, &mut buffer).await {
                Ok(request) => {
                    debug!(?request, "control request");
                    handle_request(&request, &clock, start_time).await
                }
                Err(error) => {
                    debug!(?error, "unreadable control request");
                    ControlResponse::error(format!("invalid request: {error}"))
                }
            };

            if let Err(error) = write_json(&mut stream, &response).await {
                debug!(?error, "could not answer control request");
            }
        });
    }
}
