use std::path::PathBuf;

use crate::settings::Settings;
use crate::sysfs;
use crate::{Error, Slot};

/// Reads the presence signal of one physical port.
///
/// A failed read must be reported as an error and never as absence, otherwise
/// the poller would emit a spurious "removed" event for a port whose module is
/// still seated.
pub trait PresenceReader {
    fn read_presence(&self, slot: Slot) -> Result<bool, Error>;
}

impl<T: PresenceReader + ?Sized> PresenceReader for &T {
    fn read_presence(&self, slot: Slot) -> Result<bool, Error> {
        (**self).read_presence(slot)
    }
}

/// Presence through the `xcvr_present` attribute of the PDDF transceiver
/// control directory of each port.
pub struct SysfsPresence {
    ctrl_dirs: Vec<PathBuf>,
}

impl SysfsPresence {
    pub fn new(ctrl_dirs: Vec<PathBuf>) -> Self {
        Self { ctrl_dirs }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.sfp_ctrl_dirs())
    }

    pub fn num_ports(&self) -> usize {
        self.ctrl_dirs.len()
    }
}

impl PresenceReader for SysfsPresence {
    fn read_presence(&self, slot: Slot) -> Result<bool, Error> {
        if slot == 0 || slot > self.ctrl_dirs.len() {
            return Err(Error::IndexOutOfRange {
                what: "SFP",
                index: slot,
                max: self.ctrl_dirs.len(),
            });
        }
        let p = self.ctrl_dirs[slot - 1].join("xcvr_present");
        let num = sysfs::read_int(&p)?;
        Ok(num >= 1)
    }
}

/// A single transceiver port as handed out by the chassis.
pub struct Sfp<'a, R: ?Sized> {
    index: Slot,
    reader: &'a R,
}

impl<'a, R: PresenceReader + ?Sized> Sfp<'a, R> {
    pub(crate) fn new(index: Slot, reader: &'a R) -> Self {
        Self { index, reader }
    }

    pub fn index(&self) -> Slot {
        self.index
    }

    pub fn get_presence(&self) -> Result<bool, Error> {
        self.reader.read_presence(self.index)
    }
}
