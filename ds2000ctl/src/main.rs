use anyhow::Context;
use clap::{Parser, Subcommand};
use log::LevelFilter;

use std::fmt::Display;
use std::path::PathBuf;
use std::sync::mpsc::channel;

use cel_ds2000::{Chassis, Fan, PluginData, Settings, Slot, SysfsCpld, SysfsPresence};
use platform_common::{arg_platform, LogLevel};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Changes the log level setting
    #[arg(long, value_enum, default_value_t=LogLevel::Info)]
    log_level: LogLevel,

    #[arg(long, default_value = arg_platform())]
    platform: String,

    /// Platform settings file [default: /usr/share/sonic/device/<platform>/ds2000_settings.json]
    #[arg(long)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transceiver ports
    Sfp {
        #[command(subcommand)]
        command: SfpCommands,
    },

    /// Show the cause of the last reboot
    RebootCause,

    /// Show whether a BMC is fitted
    Bmc,

    /// Fan trays
    Fan {
        #[command(subcommand)]
        command: FanCommands,
    },
}

#[derive(Subcommand)]
enum SfpCommands {
    /// List presence of all ports
    List,

    /// Get presence of one port
    Get {
        /// Port number (one based index)
        index: Slot,
    },

    /// Print transceiver insertions and removals as they happen
    Watch {
        /// Give up waiting for a change after this long, 0 waits forever
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        timeout_ms: i64,

        /// Stop after this many change events, 0 never stops
        #[arg(long, default_value_t = 0)]
        count: usize,
    },
}

#[derive(Subcommand)]
enum FanCommands {
    /// List all tray fans
    List,
}

type SysfsChassis = Chassis<SysfsPresence, SysfsCpld>;

pub fn main() -> platform_common::App {
    platform_common::App(app())
}

fn app() -> anyhow::Result<()> {
    // parse flags and initialize logger
    let cli = Cli::parse();
    env_logger::builder()
        .filter_level(LevelFilter::from(cli.log_level))
        .init();

    // validation of some of the arguments
    if cli.platform.is_empty() && cli.settings.is_none() {
        return Err(anyhow::anyhow!(
            "no platform detected and no settings file given"
        ));
    }

    let (settings, plugin) = load_settings(&cli)?;

    match cli.command {
        Commands::Sfp { command } => {
            let mut chassis = new_chassis(&settings)?;
            match command {
                SfpCommands::List => list_sfps(&chassis),
                SfpCommands::Get { index } => get_sfp(&chassis, index)?,
                SfpCommands::Watch { timeout_ms, count } => {
                    watch_sfps(&mut chassis, timeout_ms, count)?
                }
            }
        }
        // the CPLD is read directly, so these work even when a port is broken
        Commands::RebootCause => {
            let cpld = SysfsCpld::new(&settings.getreg_path);
            let (cause, description) = cel_ds2000::read_reboot_cause(&cpld);
            println!("{} ({})", cause, description);
        }
        Commands::Bmc => {
            let cpld = SysfsCpld::new(&settings.getreg_path);
            println!("BMC present: {}", cel_ds2000::read_bmc_present(&cpld));
        }
        Commands::Fan { command } => match command {
            FanCommands::List => list_fans(&settings, &plugin),
        },
    }
    Ok(())
}

fn load_settings(cli: &Cli) -> anyhow::Result<(Settings, PluginData)> {
    let (settings_path, explicit) = match cli.settings.as_ref() {
        Some(p) => (p.clone(), true),
        None => (Settings::default_path(&cli.platform), false),
    };

    let settings = if explicit || settings_path.exists() {
        Settings::load(&settings_path).with_context(|| {
            format!("failed to load settings from {}", settings_path.display())
        })?
    } else {
        log::warn!(
            "settings file {} not found: using DS2000 defaults",
            settings_path.display()
        );
        Settings::default()
    };

    let plugin_path = PluginData::path_for(&settings_path);
    let plugin = match PluginData::load(&plugin_path) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("plugin data: {}. Fan speeds will be unavailable.", e);
            PluginData::default()
        }
    };
    Ok((settings, plugin))
}

fn new_chassis(settings: &Settings) -> anyhow::Result<SysfsChassis> {
    Chassis::new(
        settings,
        SysfsPresence::from_settings(settings),
        SysfsCpld::new(&settings.getreg_path),
    )
    .context("failed to initialize chassis")
}

fn list_sfps(chassis: &SysfsChassis) {
    for idx in 1..=chassis.num_sfps() {
        if let Err(e) = get_sfp(chassis, idx) {
            log::warn!("port {}: {:?}", idx, e);
        }
    }
}

fn get_sfp(chassis: &SysfsChassis, index: Slot) -> anyhow::Result<()> {
    let present = chassis
        .get_sfp(index)?
        .get_presence()
        .with_context(|| format!("port {}: failed to get presence", index))?;
    println!("port {}: present: {}", index, present);
    Ok(())
}

fn watch_sfps(chassis: &mut SysfsChassis, timeout_ms: i64, count: usize) -> anyhow::Result<()> {
    // initialize signal handling, it only ends the watch loop
    let (ctrlc_tx, ctrlc_rx) = channel();
    ctrlc::set_handler(move || {
        if let Err(e) = ctrlc_tx.send(()) {
            log::warn!("failed to send on termination channel: {:?}", e);
        }
    })
    .context("failed to set signal handler for SIGINT, SIGTERM and SIGHUP")?;

    log::info!(
        "watching {} ports for changes. Waiting for termination signal...",
        chassis.num_sfps()
    );
    let mut seen = 0;
    loop {
        match chassis.get_change_event_with_cancel(timeout_ms, &ctrlc_rx) {
            Ok((_, event)) if event.sfp.is_empty() => {
                log::debug!("no change within {} ms", timeout_ms);
            }
            Ok((_, event)) => {
                println!("{}", serde_json::to_string(&event)?);
                seen += 1;
                if count != 0 && seen >= count {
                    return Ok(());
                }
            }
            Err(cel_ds2000::Error::Cancelled) => {
                log::info!("received termination signal, stopping watch");
                return Ok(());
            }
            Err(e) => return Err(e).context("failed to poll for port changes"),
        }
    }
}

fn list_fans(settings: &Settings, plugin: &PluginData) {
    for fan in Fan::all_tray_fans(settings, plugin) {
        println!(
            "{}: present: {}, status: {}, direction: {}, speed: {}%",
            fan.name(),
            show(fan.get_presence()),
            show(fan.get_status()),
            show(fan.get_direction()),
            show(fan.get_speed()),
        );
    }
}

fn show<T: Display>(v: Result<T, cel_ds2000::Error>) -> String {
    match v {
        Ok(v) => v.to_string(),
        Err(e) => {
            log::debug!("{}", e);
            "N/A".to_string()
        }
    }
}
