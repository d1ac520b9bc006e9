pub mod cli;
mod clock;
pub mod config;
pub mod control;
mod notify;
mod publish;
mod remote;
mod render;
pub mod sockets;
mod store;
mod system;
pub mod tracing;

use std::{error::Error, path::PathBuf};

use ::tracing::{debug, error, info};
pub use config::Config;
pub use control::{ControlRequest, ControlResponse, ObservableState, ResponseStatus};
use tokio::runtime::Builder;
use tracing_subscriber::util::SubscriberInitExt;

use config::{ClockDaemonAction, ClockDaemonOptions};

use self::tracing::LogLevel;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn main() -> Result<(), Box<dyn Error>> {
    let options = ClockDaemonOptions::try_parse_from(std::env::args())?;

    match options.action {
        ClockDaemonAction::Help => {
            println!("{}", config::long_help_message());
        }
        ClockDaemonAction::Version => {
            eprintln!("clock-daemon {VERSION}");
        }
        ClockDaemonAction::Run => run(options)?,
    }

    Ok(())
}

// Logging is set up before the config is read so problems in the config file
// are reported. Afterwards the log level from the config applies, unless one
// was given on the command line.
pub(crate) async fn initialize_logging_parse_config(
    initial_log_level: Option<LogLevel>,
    config_path: Option<PathBuf>,
) -> Config {
    let mut log_level = initial_log_level.unwrap_or_default();

    let config = {
        let _guard = ::tracing::subscriber::set_default(self::tracing::tracing_init(
            log_level, true,
        ));
        match Config::from_args(config_path).await {
            Ok(c) => c,
            Err(e) => {
                // the global subscriber is not set up yet
                eprintln!("There was an error loading the config: {e}");
                std::process::exit(exitcode::CONFIG);
            }
        }
    };

    if let Some(config_log_level) = config.observability.log_level {
        if initial_log_level.is_none() {
            log_level = config_log_level;
        }
    }

    self::tracing::tracing_init(log_level, config.observability.ansi_colors).init();

    config
}

fn run(options: ClockDaemonOptions) -> Result<(), Box<dyn Error>> {
    let runtime = Builder::new_multi_thread().enable_all().build()?;

    runtime.block_on(async {
        let config = initialize_logging_parse_config(options.log_level, options.config).await;

        if config.observability.log_level.is_some() && options.log_level.is_some() {
            info!("Log level override from command line arguments is active");
        }

        if !config.check() {
            error!("Refusing to start with this configuration");
            std::process::exit(exitcode::CONFIG);
        }

        debug!("Configuration loaded, spawning daemon jobs");
        let (clock_task, clock) = system::spawn(&config)?;

        let control = control::spawn(&config.observability, clock.clone()).await;
        let publish = match config.publish {
            Some(publish_config) => Some(publish::spawn(publish_config, clock.clone()).await?),
            None => None,
        };

        tokio::select! {
            result = clock_task => result?,
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Interrupted, shutting down");
            }
        }

        control.abort();
        if let Some(publish) = publish {
            publish.abort();
        }
        // a stale socket would be replaced on the next start anyway
        let _ = std::fs::remove_file(&config.observability.control_path);

        Ok::<(), Box<dyn Error>>(())
    })
}

pub(crate) mod exitcode {
    /// Something was found in an unconfigured or misconfigured state.
    pub const CONFIG: i32 = 78;
}
