use std::path::PathBuf;

use crate::settings::{PluginData, Settings};
use crate::sysfs;
use crate::Error;

pub const DIRECTION_NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FanKind {
    /// 1-based fan tray index
    Tray(usize),
    /// 1-based PSU index
    Psu(usize),
}

/// A fan in a fan tray or inside a PSU. Fan indexes are 1-based within their
/// tray or PSU.
pub struct Fan<'a> {
    kind: FanKind,
    fan_index: usize,
    settings: &'a Settings,
    plugin: &'a PluginData,
}

impl<'a> Fan<'a> {
    pub fn tray(
        settings: &'a Settings,
        plugin: &'a PluginData,
        tray_index: usize,
        fan_index: usize,
    ) -> Result<Self, Error> {
        if tray_index == 0 || tray_index > settings.num_fantrays {
            return Err(Error::IndexOutOfRange {
                what: "fan tray",
                index: tray_index,
                max: settings.num_fantrays,
            });
        }
        if fan_index == 0 || fan_index > settings.num_fans_pertray {
            return Err(Error::IndexOutOfRange {
                what: "fan",
                index: fan_index,
                max: settings.num_fans_pertray,
            });
        }
        Ok(Self {
            kind: FanKind::Tray(tray_index),
            fan_index,
            settings,
            plugin,
        })
    }

    pub fn psu(
        settings: &'a Settings,
        plugin: &'a PluginData,
        psu_index: usize,
        fan_index: usize,
    ) -> Result<Self, Error> {
        if psu_index == 0 || psu_index > settings.psu_dirs.len() {
            return Err(Error::IndexOutOfRange {
                what: "PSU",
                index: psu_index,
                max: settings.psu_dirs.len(),
            });
        }
        Ok(Self {
            kind: FanKind::Psu(psu_index),
            fan_index,
            settings,
            plugin,
        })
    }

    /// All tray fans of the platform, in tray order.
    pub fn all_tray_fans(settings: &'a Settings, plugin: &'a PluginData) -> Vec<Self> {
        let mut fans = Vec::with_capacity(settings.num_fantrays * settings.num_fans_pertray);
        for tray in 1..=settings.num_fantrays {
            for fan in 1..=settings.num_fans_pertray {
                fans.push(Self {
                    kind: FanKind::Tray(tray),
                    fan_index: fan,
                    settings,
                    plugin,
                });
            }
        }
        fans
    }

    pub fn is_psu_fan(&self) -> bool {
        matches!(self.kind, FanKind::Psu(_))
    }

    pub fn name(&self) -> String {
        match self.kind {
            FanKind::Tray(t) => format!("Fantray{}_{}", t, self.fan_index),
            FanKind::Psu(p) => format!("PSU{}_FAN{}", p, self.fan_index),
        }
    }

    /// The first fan of a tray sits at the front, the others at the rear.
    fn is_front(&self) -> bool {
        self.fan_index == 1
    }

    fn psu_dir(&self, psu: usize) -> &PathBuf {
        // bounds are checked on construction
        &self.settings.psu_dirs[psu - 1]
    }

    /// Index of this fan in the fan controller's flat `fan<N>_*` attribute
    /// numbering.
    fn ctrl_index(&self, tray: usize) -> usize {
        (tray - 1) * self.settings.num_fans_pertray + self.fan_index
    }

    fn speed_attr(&self) -> PathBuf {
        match self.kind {
            FanKind::Tray(t) => self
                .settings
                .fan_ctrl_dir
                .join(format!("fan{}_input", self.ctrl_index(t))),
            FanKind::Psu(p) => self
                .psu_dir(p)
                .join(format!("psu_fan{}_speed_rpm", self.fan_index)),
        }
    }

    pub fn get_speed_rpm(&self) -> Result<u32, Error> {
        let raw = sysfs::read_attr(&self.speed_attr())?;
        Ok(parse_speed(&raw))
    }

    /// A fan is healthy when it spins.
    pub fn get_status(&self) -> Result<bool, Error> {
        Ok(self.get_speed_rpm()? != 0)
    }

    pub fn get_presence(&self) -> Result<bool, Error> {
        match self.kind {
            FanKind::Psu(p) => Ok(sysfs::read_int(&self.psu_dir(p).join("psu_present"))? >= 1),
            FanKind::Tray(t) => {
                let p = self
                    .settings
                    .fan_ctrl_dir
                    .join(format!("fan{}_present", t));
                Ok(sysfs::read_int(&p)? >= 1 && self.get_status()?)
            }
        }
    }

    /// `"intake"` or `"exhaust"`, or `"N/A"` when the fan is stopped or the
    /// raw value is not in the plugin's direction map.
    pub fn get_direction(&self) -> Result<String, Error> {
        if !self.get_status()? {
            return Ok(DIRECTION_NOT_AVAILABLE.to_string());
        }
        let p = match self.kind {
            FanKind::Tray(t) => self
                .settings
                .fan_ctrl_dir
                .join(format!("fan{}_direction", t)),
            FanKind::Psu(p) => self.psu_dir(p).join("psu_fan_dir"),
        };
        let raw = sysfs::read_attr(&p)?;
        let direction = match self.kind {
            FanKind::Tray(_) => self.plugin.fan_direction(&raw),
            FanKind::Psu(_) => self.plugin.psu_fan_direction(&raw),
        };
        match direction {
            Some(d) => Ok(d),
            None => {
                log::warn!("{}: unknown direction value {:?}", self.name(), raw);
                Ok(DIRECTION_NOT_AVAILABLE.to_string())
            }
        }
    }

    /// Target speed as a percentage of the tray fan's maximum rpm. PSU fans
    /// have no target speed.
    pub fn get_target_speed(&self) -> Result<u32, Error> {
        if self.is_psu_fan() {
            return Err(Error::NotImplemented("target speed of PSU fans"));
        }
        let max = self.max_rpm()?;
        let rpm = self.get_speed_rpm()?;
        Ok((rpm as f64 * 100.0 / max) as u32)
    }

    /// Current speed as a percentage of maximum, capped at 100.
    pub fn get_speed(&self) -> Result<u32, Error> {
        let max = self.max_rpm()?;
        let rpm = self.get_speed_rpm()?;
        Ok(speed_percentage(rpm, max))
    }

    fn max_rpm(&self) -> Result<f64, Error> {
        let (max, key) = match self.kind {
            FanKind::Tray(_) if self.is_front() => {
                (self.plugin.fan_max_rpm(true), "FAN_MAX_RPM_SPEED.Front")
            }
            FanKind::Tray(_) => (self.plugin.fan_max_rpm(false), "FAN_MAX_RPM_SPEED.Rear"),
            FanKind::Psu(_) => (self.plugin.psu_fan_max_speed(), "PSU_FAN_MAX_SPEED"),
        };
        match max {
            Some(v) if v > 0.0 => Ok(v),
            _ => Err(Error::Settings(format!(
                "plugin data has no usable {} for {}",
                key,
                self.name()
            ))),
        }
    }
}

/// Parses a speed attribute. Drivers report `N/A` style text for a missing or
/// stalled fan, which counts as 0.
fn parse_speed(raw: &str) -> u32 {
    let raw = raw.trim();
    if raw.chars().any(|c| c.is_ascii_alphabetic()) {
        return 0;
    }
    match raw.parse::<f64>() {
        Ok(v) if v > 0.0 => v as u32,
        _ => 0,
    }
}

fn speed_percentage(rpm: u32, max_rpm: f64) -> u32 {
    let pct = (rpm as f64 * 100.0 / max_rpm).round();
    if pct >= 100.0 {
        100
    } else {
        pct as u32
    }
}
