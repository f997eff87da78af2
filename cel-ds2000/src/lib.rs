//! Hardware access for the Celestica DS2000 switch platform.
//!
//! Everything here reads raw state from sysfs (PDDF attribute files and the
//! system CPLD register interface) and translates it into the shapes the
//! platform framework expects.

pub mod chassis;
pub mod cpld;
pub mod fan;
pub mod poller;
pub mod settings;
pub mod sfp;

mod sysfs;

use std::path::PathBuf;

pub use chassis::{read_bmc_present, read_reboot_cause, ChangeEvent, Chassis, RebootCause};
pub use cpld::{RegisterAccess, SysfsCpld};
pub use fan::Fan;
pub use poller::{Changes, PresencePoller, PresenceState, Transition};
pub use settings::{PluginData, Settings};
pub use sfp::{PresenceReader, Sfp, SysfsPresence};

/// A 1-based physical port index.
pub type Slot = usize;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("hardware read from {path} failed: {reason}")]
    HardwareRead { path: PathBuf, reason: String },
    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid settings: {0}")]
    Settings(String),
    #[error("{what} index {index} out of range (1-{max})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        max: usize,
    },
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("polling cancelled")]
    Cancelled,
}
