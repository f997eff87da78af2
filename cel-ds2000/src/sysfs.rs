use std::path::Path;

use crate::Error;

pub(crate) fn hardware_read(path: &Path, reason: impl ToString) -> Error {
    Error::HardwareRead {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Reads a sysfs attribute and strips the trailing newline.
pub(crate) fn read_attr(path: &Path) -> Result<String, Error> {
    let v = std::fs::read_to_string(path).map_err(|e| hardware_read(path, e))?;
    log::trace!("{}: {:?}", path.display(), v);
    Ok(v.trim().to_string())
}

/// Reads a sysfs attribute holding an integer, decimal or `0x` prefixed hex.
pub(crate) fn read_int(path: &Path) -> Result<i64, Error> {
    let v = read_attr(path)?;
    parse_int(&v).ok_or_else(|| hardware_read(path, format!("unexpected value {:?}", v)))
}

pub(crate) fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}
