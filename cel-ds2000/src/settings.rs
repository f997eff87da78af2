use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Error;

pub const SETTINGS_FILE_NAME: &str = "ds2000_settings.json";
pub const PLUGIN_DATA_FILE_NAME: &str = "pd-plugin.json";
/// Access mode whose value maps are preferred, the others are only consulted
/// when it is missing.
pub const PLUGIN_ACCESS_MODE: &str = "i2c";

/// Platform topology and sysfs locations. Every field falls back to the stock
/// DS2000 layout when it is missing from the settings file.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub num_sfp: usize,
    /// PDDF control directory of a port, `{}` is replaced by the 1-based index.
    pub sfp_ctrl_dir_template: String,
    pub getreg_path: PathBuf,
    pub fan_ctrl_dir: PathBuf,
    pub num_fantrays: usize,
    pub num_fans_pertray: usize,
    pub psu_dirs: Vec<PathBuf>,
    pub poll_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            num_sfp: 56,
            sfp_ctrl_dir_template: "/sys/kernel/pddf/devices/xcvr/PORT{}".to_string(),
            getreg_path: PathBuf::from("/sys/devices/platform/sys_cpld/getreg"),
            fan_ctrl_dir: PathBuf::from("/sys/kernel/pddf/devices/fan/FAN-CTRL"),
            num_fantrays: 4,
            num_fans_pertray: 2,
            psu_dirs: vec![
                PathBuf::from("/sys/kernel/pddf/devices/psu/PSU1"),
                PathBuf::from("/sys/kernel/pddf/devices/psu/PSU2"),
            ],
            poll_interval_ms: 500,
        }
    }
}

impl Settings {
    pub fn default_path(platform: &str) -> PathBuf {
        PathBuf::from(format!(
            "/usr/share/sonic/device/{}/{}",
            platform, SETTINGS_FILE_NAME
        ))
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let settings_file = std::fs::File::open(path).map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let settings: Settings =
            serde_json::from_reader(settings_file).map_err(|e| Error::Json {
                path: path.to_path_buf(),
                source: e,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.num_sfp == 0 {
            return Err(Error::Settings("num_sfp must be at least 1".to_string()));
        }
        if !self.sfp_ctrl_dir_template.contains("{}") {
            return Err(Error::Settings(format!(
                "sfp_ctrl_dir_template {:?} has no {{}} placeholder",
                self.sfp_ctrl_dir_template
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Settings(
                "poll_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sfp_ctrl_dirs(&self) -> Vec<PathBuf> {
        (1..=self.num_sfp)
            .map(|i| {
                PathBuf::from(
                    self.sfp_ctrl_dir_template
                        .replacen("{}", i.to_string().as_str(), 1),
                )
            })
            .collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// PDDF plugin values are sometimes numbers and sometimes numeric strings.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    pub fn value(&self) -> Option<f64> {
        match self {
            Numeric::Number(v) => Some(*v),
            Numeric::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct FanMaxRpm {
    #[serde(rename = "Front")]
    pub front: Option<Numeric>,
    #[serde(rename = "Rear")]
    pub rear: Option<Numeric>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ValMap {
    #[serde(default)]
    pub valmap: HashMap<String, String>,
}

/// Value maps keyed by access mode, e.g. `{"i2c": {"valmap": {..}}}`.
pub type ModeValMaps = BTreeMap<String, ValMap>;

fn lookup(maps: &ModeValMaps, raw: &str) -> Option<String> {
    let vm = maps
        .get(PLUGIN_ACCESS_MODE)
        .or_else(|| maps.values().next())?;
    vm.valmap.get(raw.trim()).map(|v| v.to_lowercase())
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct FanPlugin {
    #[serde(rename = "FAN_MAX_RPM_SPEED", default)]
    pub max_rpm: FanMaxRpm,
    #[serde(default)]
    pub direction: ModeValMaps,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PsuPlugin {
    #[serde(rename = "PSU_FAN_MAX_SPEED")]
    pub fan_max_speed: Option<Numeric>,
    #[serde(default)]
    pub psu_fan_dir: ModeValMaps,
}

/// The subset of the PDDF `pd-plugin.json` used by the fan code. Unknown keys
/// are ignored.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PluginData {
    #[serde(rename = "FAN", default)]
    pub fan: FanPlugin,
    #[serde(rename = "PSU", default)]
    pub psu: PsuPlugin,
}

impl PluginData {
    /// The plugin data lives next to the settings file.
    pub fn path_for(settings_path: &Path) -> PathBuf {
        settings_path.with_file_name(PLUGIN_DATA_FILE_NAME)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let f = std::fs::File::open(path).map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_reader(f).map_err(|e| Error::Json {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn fan_max_rpm(&self, front: bool) -> Option<f64> {
        let v = if front {
            &self.fan.max_rpm.front
        } else {
            &self.fan.max_rpm.rear
        };
        v.as_ref().and_then(Numeric::value)
    }

    pub fn psu_fan_max_speed(&self) -> Option<f64> {
        self.psu.fan_max_speed.as_ref().and_then(Numeric::value)
    }

    /// Maps a raw tray fan direction value, e.g. `"1"`, to `"intake"` or
    /// `"exhaust"`.
    pub fn fan_direction(&self, raw: &str) -> Option<String> {
        lookup(&self.fan.direction, raw)
    }

    pub fn psu_fan_direction(&self, raw: &str) -> Option<String> {
        lookup(&self.psu.psu_fan_dir, raw)
    }
}
