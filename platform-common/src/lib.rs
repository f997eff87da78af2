use std::env;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::path::Path;
use std::process::{ExitCode, Termination};
use std::sync::OnceLock;

use clap::ValueEnum;
use log::LevelFilter;

/// Locations of the ONIE machine configuration. SONiC mounts it under `/host`,
/// ONIE itself keeps it in `/etc`.
pub const MACHINE_CONF_PATHS: [&str; 2] = ["/host/machine.conf", "/etc/machine.conf"];

const PLATFORM_ENV: &str = "onie_platform";

pub struct App(pub anyhow::Result<()>);

impl Termination for App {
    fn report(self) -> ExitCode {
        match self.0 {
            Ok(_) => ExitCode::SUCCESS,
            Err(e) => {
                log::error!("Unrecoverable application error: {:?}. Exiting...", e);
                ExitCode::FAILURE
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    /// A level lower than all log levels.
    Off,
    /// Corresponds to the `Error` log level.
    Error,
    /// Corresponds to the `Warn` log level.
    Warn,
    /// Corresponds to the `Info` log level.
    Info,
    /// Corresponds to the `Debug` log level.
    Debug,
    /// Corresponds to the `Trace` log level.
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

static PLATFORM: OnceLock<String> = OnceLock::new();

/// Returns the platform string of the running system, or an empty string if it
/// cannot be determined. The result is computed once and cached.
pub fn arg_platform() -> String {
    PLATFORM
        .get_or_init(|| {
            // check if the environment variable is set first
            if let Ok(v) = env::var(PLATFORM_ENV) {
                return v;
            }

            // if not, then we are going to parse the machine.conf files in order
            for path in MACHINE_CONF_PATHS {
                if let Some(v) = platform_from_machine_conf(Path::new(path)) {
                    return v;
                }
            }

            // if we are here, then we could not determine the platform
            String::new()
        })
        .to_string()
}

/// Looks up the `onie_platform` key in a machine.conf style `key=value` file.
pub fn platform_from_machine_conf(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let reader = BufReader::new(file);
    for line in reader.lines().map_while(Result::ok) {
        if let Some((k, v)) = line.split_once('=') {
            if k.trim() == PLATFORM_ENV {
                return Some(v.trim().to_string());
            }
        }
    }
    None
}
