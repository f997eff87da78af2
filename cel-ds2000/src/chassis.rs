use serde::Serialize;
use std::fmt;
use std::sync::mpsc::Receiver;

use crate::cpld::{RegisterAccess, BMC_PRESENCE_REG, REBOOT_CAUSE_REG};
use crate::poller::{Changes, PresencePoller};
use crate::settings::Settings;
use crate::sfp::{PresenceReader, Sfp};
use crate::{Error, Slot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootCause {
    PowerLoss,
    Watchdog,
    NonHardware,
    HardwareOther,
}

impl RebootCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            RebootCause::PowerLoss => "Power Loss",
            RebootCause::Watchdog => "Watchdog",
            RebootCause::NonHardware => "Non-Hardware",
            RebootCause::HardwareOther => "Hardware - Other",
        }
    }
}

impl fmt::Display for RebootCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decodes the reboot cause register. `None` (register unreadable) and unknown
/// values both map to [`RebootCause::HardwareOther`].
pub fn decode_reboot_cause(value: Option<u8>) -> (RebootCause, &'static str) {
    match value {
        Some(0x77) => (RebootCause::PowerLoss, "Power Cycle Reset"),
        Some(0x66) => (RebootCause::Watchdog, "Hardware Watchdog Reset"),
        Some(0x44) => (RebootCause::NonHardware, "CPU Warm Reset"),
        Some(0x33) => (RebootCause::NonHardware, "Soft-Set Cold Reset"),
        Some(0x22) => (RebootCause::NonHardware, "Soft-Set Warm Reset"),
        Some(0x11) => (RebootCause::PowerLoss, "Power On Reset"),
        _ => (RebootCause::HardwareOther, "Hardware reason"),
    }
}

/// Reads and decodes the reboot cause register. Needs only the CPLD, so it
/// works when the transceiver ports cannot be read.
pub fn read_reboot_cause<C: RegisterAccess + ?Sized>(cpld: &C) -> (RebootCause, &'static str) {
    let value = match cpld.read_register(REBOOT_CAUSE_REG) {
        Ok(v) => Some(v),
        Err(e) => {
            log::warn!("failed to read reboot cause register: {}", e);
            None
        }
    };
    decode_reboot_cause(value)
}

/// The BMC presence register reads 0x00 when a BMC is fitted.
pub fn read_bmc_present<C: RegisterAccess + ?Sized>(cpld: &C) -> bool {
    match cpld.read_register(BMC_PRESENCE_REG) {
        Ok(v) => v == 0x00,
        Err(e) => {
            log::warn!("failed to read BMC presence register: {}", e);
            false
        }
    }
}

/// Change event in the shape the platform framework consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub sfp: Changes,
}

pub struct Chassis<R, C> {
    poller: PresencePoller<R>,
    cpld: C,
}

impl<R: PresenceReader, C: RegisterAccess> Chassis<R, C> {
    /// Builds the chassis and takes the initial presence snapshot of all
    /// transceiver ports.
    pub fn new(settings: &Settings, sfp_reader: R, cpld: C) -> Result<Self, Error> {
        let poller = PresencePoller::new(sfp_reader, settings.num_sfp)?
            .with_interval(settings.poll_interval());
        Ok(Self { poller, cpld })
    }

    pub fn num_sfps(&self) -> usize {
        self.poller.num_slots()
    }

    /// Retrieves the SFP at 1-based `index`.
    pub fn get_sfp(&self, index: Slot) -> Result<Sfp<'_, R>, Error> {
        if index == 0 || index > self.num_sfps() {
            log::error!(
                "SFP index {} out of range (1-{})",
                index,
                self.num_sfps()
            );
            return Err(Error::IndexOutOfRange {
                what: "SFP",
                index,
                max: self.num_sfps(),
            });
        }
        Ok(Sfp::new(index, self.poller.reader()))
    }

    pub fn get_reboot_cause(&self) -> (RebootCause, &'static str) {
        read_reboot_cause(&self.cpld)
    }

    pub fn bmc_present(&self) -> bool {
        read_bmc_present(&self.cpld)
    }

    /// Waits up to `timeout_ms` (0 = forever) for transceiver insertions or
    /// removals.
    pub fn get_change_event(&mut self, timeout_ms: i64) -> Result<(bool, ChangeEvent), Error> {
        let (ok, sfp) = self.poller.poll(timeout_ms)?;
        Ok((ok, ChangeEvent { sfp }))
    }

    pub fn get_change_event_with_cancel(
        &mut self,
        timeout_ms: i64,
        cancel: &Receiver<()>,
    ) -> Result<(bool, ChangeEvent), Error> {
        let (ok, sfp) = self.poller.poll_with_cancel(timeout_ms, cancel)?;
        Ok((ok, ChangeEvent { sfp }))
    }
}
