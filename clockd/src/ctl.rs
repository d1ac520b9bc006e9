use std::{fmt::Write, path::PathBuf, process::ExitCode};

use clock_proto::{Alarm, ClockReading, Precedence};
use tracing_subscriber::util::SubscriberInitExt;

use crate::daemon::{
    cli::CliArg,
    sockets::{read_json, write_json},
    tracing::LogLevel,
    Config, ControlRequest, ControlResponse, ObservableState, ResponseStatus,
};

const USAGE_MSG: &str = "\
usage: clock-ctl validate [-c PATH]
       clock-ctl status [-f FORMAT] [-c PATH]
       clock-ctl set-alarm HOUR MINUTE [-c PATH]
       clock-ctl delete-alarm INDEX [-c PATH]
       clock-ctl set-time HOUR MINUTE SECOND [-c PATH]
       clock-ctl sync [-c PATH]
       clock-ctl -h | clock-ctl -v";

const DESCRIPTOR: &str = "clock-ctl - inspect and control clock-daemon";

const HELP_MSG: &str = "Options:
  -f, --format=FORMAT                  how to print the clock state [plain, json]
  -c, --config=CONFIG                  which configuration file to read the socket path from
  -h, --help                           display this help text
  -v, --version                        display version information";

pub fn long_help_message() -> String {
    format!("{DESCRIPTOR}\n\n{USAGE_MSG}\n\n{HELP_MSG}")
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Format {
    #[default]
    Plain,
    Json,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub enum ClockCtlAction {
    #[default]
    Help,
    Version,
    Validate,
    Status,
    Control(ControlRequest),
}

#[derive(Debug, Default)]
pub(crate) struct ClockCtlOptions {
    config: Option<PathBuf>,
    format: Format,
    help: bool,
    version: bool,
    command: Option<ClockCtlAction>,
    action: ClockCtlAction,
}

fn expect_args<'a>(
    command: &str,
    args: &'a [String],
    names: &[&str],
) -> Result<&'a [String], String> {
    if args.len() != names.len() {
        let usage = names.join(" ");
        return Err(format!("usage: clock-ctl {command} {usage}"));
    }
    Ok(args)
}

fn parse_command(rest: &[String]) -> Result<ClockCtlAction, String> {
    let Some((command, args)) = rest.split_first() else {
        return Ok(ClockCtlAction::Help);
    };

    let action = match command.as_str() {
        "validate" => ClockCtlAction::Validate,
        "status" => ClockCtlAction::Status,
        "sync" => ClockCtlAction::Control(ControlRequest::Sync),
        "set-alarm" => {
            let args = expect_args(command, args, &["HOUR", "MINUTE"])?;
            let alarm = Alarm::parse(&args[0], &args[1]).map_err(|e| e.to_string())?;
            ClockCtlAction::Control(ControlRequest::SetAlarm {
                hour: alarm.hour().into(),
                minute: alarm.minute().into(),
            })
        }
        "delete-alarm" => {
            let args = expect_args(command, args, &["INDEX"])?;
            let index = args[0]
                .trim()
                .parse()
                .map_err(|_| format!("index must be a number, got '{}'", args[0]))?;
            ClockCtlAction::Control(ControlRequest::DeleteAlarm { index })
        }
        "set-time" => {
            let args = expect_args(command, args, &["HOUR", "MINUTE", "SECOND"])?;
            let reading =
                ClockReading::parse(&args[0], &args[1], &args[2]).map_err(|e| e.to_string())?;
            ClockCtlAction::Control(ControlRequest::SetTime {
                hour: reading.hour().into(),
                minute: reading.minute().into(),
                second: reading.second().into(),
            })
        }
        unknown => return Err(format!("unknown command: {unknown}")),
    };

    let takes_no_arguments = matches!(
        action,
        ClockCtlAction::Validate
            | ClockCtlAction::Status
            | ClockCtlAction::Control(ControlRequest::Sync)
    );
    if takes_no_arguments && !args.is_empty() {
        return Err(format!("{command} takes no arguments"));
    }

    Ok(action)
}

impl ClockCtlOptions {
    const TAKES_ARGUMENT: &'static [&'static str] = &["--config", "--format"];
    const TAKES_ARGUMENT_SHORT: &'static [char] = &['c', 'f'];

    /// parse an iterator over command line arguments
    pub fn try_parse_from<I, T>(iter: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str> + Clone,
    {
        let mut options = ClockCtlOptions::default();

        let it = iter.into_iter().map(|x| x.as_ref().to_string());
        let args =
            CliArg::normalize_arguments(Self::TAKES_ARGUMENT, Self::TAKES_ARGUMENT_SHORT, it)?;

        for arg in args {
            match arg {
                CliArg::Flag(flag) => match flag.as_str() {
                    "-h" | "--help" => options.help = true,
                    "-v" | "--version" => options.version = true,
                    option => Err(format!("invalid option provided: {option}"))?,
                },
                CliArg::Argument(option, value) => match option.as_str() {
                    "-c" | "--config" => options.config = Some(PathBuf::from(value)),
                    "-f" | "--format" => match value.as_str() {
                        "plain" => options.format = Format::Plain,
                        "json" => options.format = Format::Json,
                        _ => Err(format!("invalid format option provided: {value}"))?,
                    },
                    option => Err(format!("invalid option provided: {option}"))?,
                },
                CliArg::Rest(rest) => options.command = Some(parse_command(&rest)?),
            }
        }

        options.resolve_action();
        Ok(options)
    }

    /// from the arguments resolve which action should be performed
    fn resolve_action(&mut self) {
        self.action = if self.help {
            ClockCtlAction::Help
        } else if self.version {
            ClockCtlAction::Version
        } else {
            self.command.take().unwrap_or_default()
        };
    }
}

async fn validate(config: Option<PathBuf>) -> std::io::Result<ExitCode> {
    crate::daemon::tracing::tracing_init(LogLevel::Info, true).init();
    match Config::from_args(config).await {
        Ok(config) => {
            if config.check() {
                eprintln!("Config looks good");
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Err(e) => {
            eprintln!("Error: Could not load configuration: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn main() -> std::io::Result<ExitCode> {
    let options = match ClockCtlOptions::try_parse_from(std::env::args()) {
        Ok(options) => options,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let request = match options.action {
        ClockCtlAction::Help => {
            println!("{}", long_help_message());
            return Ok(ExitCode::SUCCESS);
        }
        ClockCtlAction::Version => {
            eprintln!("clock-ctl {VERSION}");
            return Ok(ExitCode::SUCCESS);
        }
        ClockCtlAction::Validate => return validate(options.config).await,
        ClockCtlAction::Status => ControlRequest::Status,
        ClockCtlAction::Control(request) => request,
    };

    let config = Config::from_args(options.config).await;
    if let Err(ref e) = config {
        eprintln!("Warning: Unable to load configuration file: {e}");
    }
    let control_path = config.unwrap_or_default().observability.control_path;

    send_request(options.format, control_path, &request).await
}

async fn send_request(
    format: Format,
    control_path: PathBuf,
    request: &ControlRequest,
) -> std::io::Result<ExitCode> {
    let mut stream = match tokio::net::UnixStream::connect(&control_path).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("Could not open socket at {}: {e}", control_path.display());
            return Ok(ExitCode::FAILURE);
        }
    };

    if let Err(e) = write_json(&mut stream, request).await {
        eprintln!("Failed to send request to the daemon: {e}");
        return Ok(ExitCode::FAILURE);
    }

    let mut msg = Vec::with_capacity(4 * 1024);
    let response = match read_json::<ControlResponse>(&mut stream, &mut msg).await {
        Ok(response) => response,
        Err(e) => {
            eprintln!("Failed to read response from the control socket: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    if response.status == ResponseStatus::Error {
        eprintln!(
            "Error: {}",
            response.message.as_deref().unwrap_or("request failed")
        );
        return Ok(ExitCode::FAILURE);
    }

    match format {
        Format::Json => match serde_json::to_string_pretty(&response) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Failed to encode the response: {e}");
                return Ok(ExitCode::FAILURE);
            }
        },
        Format::Plain => {
            if let Some(message) = &response.message {
                println!("{message}");
            }
            // mutations only confirm, status shows the whole picture
            if let (ControlRequest::Status, Some(state)) = (request, &response.state) {
                let mut buf = String::new();
                if format_state(&mut buf, state).is_ok() {
                    print!("{buf}");
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn format_state(buf: &mut String, state: &ObservableState) -> std::fmt::Result {
    let clock = &state.clock;

    match &clock.tick {
        Some(tick) => {
            writeln!(buf, "Time: {} ({})", tick.reading.twelve_hour(), tick.source)?;
            writeln!(
                buf,
                "Hands: hour {:.1}, minute {:.1}, second {:.1}",
                tick.angles.hour, tick.angles.minute, tick.angles.second
            )?;
            if tick.alarm_ringing {
                writeln!(buf, "ALARM")?;
            }
        }
        None => writeln!(buf, "Time: not yet determined")?,
    }

    let not_consulted =
        clock.precedence == Precedence::OverrideFirst && clock.override_time.is_some();
    let remote = if not_consulted {
        "not consulted while the override is set"
    } else if clock.backend_available {
        "available"
    } else {
        "unavailable"
    };
    writeln!(buf, "Remote time source: {remote}")?;
    match clock.override_time {
        Some(reading) => writeln!(buf, "Override: {reading}")?,
        None => writeln!(buf, "Override: none")?,
    }

    writeln!(buf)?;
    if clock.alarms.is_empty() {
        writeln!(buf, "Alarms: none")?;
    } else {
        writeln!(buf, "Alarms:")?;
        for (index, alarm) in clock.alarms.alarms().iter().enumerate() {
            let marker = if clock.alarms.active_index() == Some(index) {
                " (active)"
            } else {
                ""
            };
            writeln!(buf, "  {index}: {alarm}{marker}")?;
        }
    }

    writeln!(buf)?;
    writeln!(
        buf,
        "clock-daemon {} ({} {}), up {:.0}s",
        state.program.version,
        state.program.build_commit,
        state.program.build_commit_date,
        state.program.uptime_seconds
    )
}
