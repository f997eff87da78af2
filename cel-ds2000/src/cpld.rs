use std::path::{Path, PathBuf};

use crate::sysfs;
use crate::Error;

/// Base board CPLD register holding the cause of the last reset.
pub const REBOOT_CAUSE_REG: u16 = 0xA107;
/// Base board CPLD register reading `0x00` when a BMC is fitted.
pub const BMC_PRESENCE_REG: u16 = 0xA108;

pub trait RegisterAccess {
    fn read_register(&self, addr: u16) -> Result<u8, Error>;
}

impl<T: RegisterAccess + ?Sized> RegisterAccess for &T {
    fn read_register(&self, addr: u16) -> Result<u8, Error> {
        (**self).read_register(addr)
    }
}

/// The `sys_cpld` driver's indirect register interface: the address is
/// written to `getreg`, after which reading `getreg` returns the value.
pub struct SysfsCpld {
    getreg: PathBuf,
}

impl SysfsCpld {
    pub fn new(getreg: &Path) -> Self {
        Self {
            getreg: getreg.to_path_buf(),
        }
    }
}

impl RegisterAccess for SysfsCpld {
    fn read_register(&self, addr: u16) -> Result<u8, Error> {
        std::fs::write(&self.getreg, format!("0x{:04X}", addr))
            .map_err(|e| sysfs::hardware_read(&self.getreg, e))?;
        let raw = sysfs::read_attr(&self.getreg)?;
        let v = parse_register_value(&raw).ok_or_else(|| {
            sysfs::hardware_read(
                &self.getreg,
                format!("register 0x{:04X}: unexpected value {:?}", addr, raw),
            )
        })?;
        log::debug!("cpld register 0x{:04X}: 0x{:02x}", addr, v);
        Ok(v)
    }
}

/// Parses a register value as printed by the driver, e.g. `0x77`.
pub fn parse_register_value(s: &str) -> Option<u8> {
    let s = s.trim();
    let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    u8::from_str_radix(hex, 16).ok()
}
