use std::{
    fmt::Display,
    io::ErrorKind,
    net::SocketAddr,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use clock_proto::{AlarmMode, Precedence, ResolverSettings};
use serde::{Deserialize, Deserializer};
use tokio::{fs::read_to_string, io};
use tracing::{info, warn};

use super::{cli::CliArg, tracing::LogLevel};

const USAGE_MSG: &str = "\
usage: clock-daemon [-c PATH] [-l LOG_LEVEL]
       clock-daemon -h
       clock-daemon -v";

const DESCRIPTOR: &str = "clock-daemon - drive an analog clock from local, remote or user time";

const HELP_MSG: &str = "Options:
  -c, --config=PATH             change the config .toml file
  -l, --log-level=LOG_LEVEL     change the log level
  -h, --help                    display this help text
  -v, --version                 display version information";

pub fn long_help_message() -> String {
    format!("{DESCRIPTOR}\n\n{USAGE_MSG}\n\n{HELP_MSG}")
}

pub(crate) const DEFAULT_CONFIG_PATH: &str = "/etc/clockd/clock.toml";

#[derive(Debug, Default)]
pub(crate) struct ClockDaemonOptions {
    /// Path of the configuration file
    pub config: Option<PathBuf>,
    /// Level for messages to display in logs
    pub log_level: Option<LogLevel>,
    help: bool,
    version: bool,
    pub action: ClockDaemonAction,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub enum ClockDaemonAction {
    #[default]
    Help,
    Version,
    Run,
}

impl ClockDaemonOptions {
    const TAKES_ARGUMENT: &'static [&'static str] = &["--config", "--log-level"];
    const TAKES_ARGUMENT_SHORT: &'static [char] = &['c', 'l'];

    /// parse an iterator over command line arguments
    pub fn try_parse_from<I, T>(iter: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str> + Clone,
    {
        let mut options = ClockDaemonOptions::default();
        let args = CliArg::normalize_arguments(
            Self::TAKES_ARGUMENT,
            Self::TAKES_ARGUMENT_SHORT,
            iter.into_iter().map(|x| x.as_ref().to_string()),
        )?;

        for arg in args {
            match arg {
                CliArg::Flag(flag) => match flag.as_str() {
                    "-h" | "--help" => options.help = true,
                    "-v" | "--version" => options.version = true,
                    option => Err(format!("invalid option provided: {option}"))?,
                },
                CliArg::Argument(option, value) => match option.as_str() {
                    "-c" | "--config" => options.config = Some(PathBuf::from(value)),
                    "-l" | "--log-level" => {
                        options.log_level =
                            Some(LogLevel::from_str(&value).map_err(|e| e.to_string())?)
                    }
                    option => Err(format!("invalid option provided: {option}"))?,
                },
                CliArg::Rest(rest) => {
                    Err(format!("unexpected argument: {}", rest.join(" ")))?;
                }
            }
        }

        options.action = if options.help {
            ClockDaemonAction::Help
        } else if options.version {
            ClockDaemonAction::Version
        } else {
            ClockDaemonAction::Run
        };

        Ok(options)
    }
}

fn deserialize_remote_url<'de, D>(deserializer: D) -> Result<reqwest::Url, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: String = Deserialize::deserialize(deserializer)?;
    let url = reqwest::Url::parse(&raw)
        .map_err(|e| serde::de::Error::custom(format!("invalid remote url '{raw}': {e}")))?;

    match url.scheme() {
        "http" | "https" => {
            tracing::debug!(%url, "using remote time source");
            Ok(url)
        }
        scheme => Err(serde::de::Error::custom(format!(
            "unsupported remote url scheme '{scheme}', expected http or https"
        ))),
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub log_level: Option<LogLevel>,
    #[serde(default = "default_ansi_colors")]
    pub ansi_colors: bool,
    #[serde(default = "default_control_path")]
    pub control_path: PathBuf,
    #[serde(default = "default_control_permissions")]
    pub control_permissions: u32,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            ansi_colors: default_ansi_colors(),
            control_path: default_control_path(),
            control_permissions: default_control_permissions(),
        }
    }
}

const fn default_ansi_colors() -> bool {
    true
}

fn default_control_path() -> PathBuf {
    PathBuf::from("/run/clockd/control")
}

const fn default_control_permissions() -> u32 {
    0o666
}

/// Time zone the host wall clock is read in
#[derive(Debug, Default, Copy, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeZone {
    #[default]
    Local,
    Utc,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ClockConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default)]
    pub time_zone: TimeZone,
    #[serde(default)]
    pub precedence: Precedence,
    #[serde(default)]
    pub alarm_mode: AlarmMode,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            time_zone: TimeZone::default(),
            precedence: Precedence::default(),
            alarm_mode: AlarmMode::default(),
        }
    }
}

const fn default_tick_interval_ms() -> u64 {
    1000
}

impl ClockConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            precedence: self.precedence,
            alarm_mode: self.alarm_mode,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RemoteConfig {
    #[serde(deserialize_with = "deserialize_remote_url")]
    pub url: reqwest::Url,
    #[serde(default = "default_remote_timeout_ms")]
    pub timeout_ms: u64,
    /// Append a timestamp query parameter so no cache serves stale readings
    #[serde(default = "default_cache_bust")]
    pub cache_bust: bool,
}

const fn default_remote_timeout_ms() -> u64 {
    800
}

const fn default_cache_bust() -> bool {
    true
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct StateConfig {
    /// Directory holding the persisted override and alarms. Without it state
    /// only lives as long as the daemon.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DisplayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub bell: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bell: true,
        }
    }
}

const fn default_true() -> bool {
    true
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PublishConfig {
    pub listen: SocketAddr,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub publish: Option<PublishConfig>,
}

impl Config {
    async fn from_file(file: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let meta = std::fs::metadata(&file)?;
        let perm = meta.permissions();

        if perm.mode() as libc::mode_t & libc::S_IWOTH != 0 {
            warn!("Unrestricted config file permissions: Others can write.");
        }

        let contents = read_to_string(file).await?;
        Ok(toml::de::from_str(&contents)?)
    }

    async fn from_first_file(file: Option<impl AsRef<Path>>) -> Result<Config, ConfigError> {
        // if an explicit file is given, always use that one
        if let Some(f) = file {
            let path: &Path = f.as_ref();
            info!(?path, "using config file");
            return Config::from_file(f).await;
        }

        // for the global file we also ignore it when there are permission errors
        let global_path = Path::new(DEFAULT_CONFIG_PATH);
        if global_path.exists() {
            info!("using config file at default location `{:?}`", global_path);
            match Config::from_file(global_path).await {
                Err(ConfigError::Io(e)) if e.kind() == ErrorKind::PermissionDenied => {
                    info!("permission denied on global config file! using default config ...");
                }
                other => return other,
            }
        }

        Ok(Config::default())
    }

    pub async fn from_args(file: Option<impl AsRef<Path>>) -> Result<Config, ConfigError> {
        Config::from_first_file(file).await
    }

    /// Check that the config is reasonable. Returns false when the daemon
    /// cannot run with it, warnings are logged for questionable settings.
    pub fn check(&self) -> bool {
        let mut ok = true;

        if self.clock.tick_interval_ms == 0 {
            warn!("The tick interval must be at least one millisecond.");
            ok = false;
        }

        if let Some(remote) = &self.remote {
            if remote.timeout_ms >= self.clock.tick_interval_ms {
                warn!(
                    "Remote timeout ({}ms) is not shorter than the tick interval ({}ms); remote requests of consecutive ticks will overlap.",
                    remote.timeout_ms, self.clock.tick_interval_ms
                );
            }
        } else {
            info!("No remote time source configured, the clock runs on local time.");
        }

        if self.state.path.is_none() {
            info!("No state path configured, alarms and overrides are lost on restart.");
        }

        ok
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Toml(toml::de::Error),
}

impl std::error::Error for ConfigError {}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error while reading config: {e}"),
            Self::Toml(e) => write!(f, "config toml parsing error: {e}"),
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Toml(value)
    }
}
