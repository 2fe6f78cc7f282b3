//! Platform-independent GUID
//!
//! Provider identifiers have to be handled on every target (the controller and its tests are not
//! Windows-only), so this crate does not rely on `windows::core::GUID` outside of the native layer.
use std::fmt;
use std::str::FromStr;

/// GUID module errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuidError {
    /// The string does not have the `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` shape
    InvalidFormat(String),
}

impl fmt::Display for GuidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuidError::InvalidFormat(s) => write!(f, "invalid GUID: {:?}", s),
        }
    }
}

impl std::error::Error for GuidError {}

/// A GUID, laid out like the Win32 `GUID` struct
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    pub const fn from_values(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }
}

impl FromStr for Guid {
    type Err = GuidError;

    /// Parses `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`, with or without surrounding braces
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GuidError::InvalidFormat(s.to_string());

        let trimmed = s.trim();
        let inner = match (trimmed.strip_prefix('{'), trimmed.strip_suffix('}')) {
            (Some(_), Some(_)) => &trimmed[1..trimmed.len() - 1],
            (None, None) => trimmed,
            _ => return Err(invalid()),
        };

        let groups: Vec<&str> = inner.split('-').collect();
        if groups.len() != 5
            || [8, 4, 4, 4, 12]
                .iter()
                .zip(groups.iter())
                .any(|(len, group)| group.len() != *len || !group.bytes().all(|b| b.is_ascii_hexdigit()))
        {
            return Err(invalid());
        }

        let data1 = u32::from_str_radix(groups[0], 16).map_err(|_| invalid())?;
        let data2 = u16::from_str_radix(groups[1], 16).map_err(|_| invalid())?;
        let data3 = u16::from_str_radix(groups[2], 16).map_err(|_| invalid())?;

        let tail = format!("{}{}", groups[3], groups[4]);
        let mut data4 = [0u8; 8];
        for (i, byte) in data4.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&tail[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }

        Ok(Self::from_values(data1, data2, data3, data4))
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-",
            self.data1, self.data2, self.data3, self.data4[0], self.data4[1]
        )?;
        for byte in &self.data4[2..] {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

#[cfg(windows)]
impl From<Guid> for windows::core::GUID {
    fn from(guid: Guid) -> Self {
        windows::core::GUID::from_values(guid.data1, guid.data2, guid.data3, guid.data4)
    }
}
