//! Collector configuration file
//!
//! The external collector reads a flat text file made of `[section]` headers followed by indented
//! `key = value` lines. Sections and keys keep their insertion order so that writing the same
//! configuration twice produces byte-identical files.
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use num_traits::FromPrimitive;
use once_cell::sync::Lazy;

pub const CORE_SECTION: &str = "core";
pub const LEVEL_KEY: &str = "level";
pub const LOG_KEY: &str = "log";
pub const TYPE_KEY: &str = "type";
pub const LIB_KEY: &str = "lib";

/// Value of `core.lib` when the tracer should not load a specific runtime library
pub const NO_LIBRARY: &str = "none";
const OUTPUT_TYPE: &str = "file";

const CONFIG_DIR_NAME: &str = "tracectl";
const CONFIG_FILE_NAME: &str = "tracer.conf";

static DEFAULT_CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| {
    let data_dir = std::env::var_os("LOCALAPPDATA")
        .or_else(|| std::env::var_os("XDG_CONFIG_HOME"))
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .unwrap_or_else(std::env::temp_dir);

    data_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)
});

/// Where the collector expects its configuration unless told otherwise
pub fn default_config_path() -> &'static Path {
    &DEFAULT_CONFIG_PATH
}

/// Config module errors
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be opened, written or read
    IoError(std::io::Error),
    /// A line of the file could not be understood
    SyntaxError { line: usize, reason: &'static str },
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(err) => write!(f, "configuration file I/O error: {}", err),
            ConfigError::SyntaxError { line, reason } => {
                write!(f, "configuration syntax error on line {}: {}", line, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(err) => Some(err),
            ConfigError::SyntaxError { .. } => None,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// How much the tracer records
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u32)]
pub enum CaptureLevel {
    Default = 1,
    Full = 2,
}

impl Default for CaptureLevel {
    fn default() -> Self {
        CaptureLevel::Default
    }
}

/// Only `2` selects a full capture, every other raw level is treated as the default one
impl From<u32> for CaptureLevel {
    fn from(raw: u32) -> Self {
        CaptureLevel::from_u32(raw).unwrap_or_default()
    }
}

impl CaptureLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureLevel::Default => "default",
            CaptureLevel::Full => "full",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

/// Ordered `section -> key -> value` mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    sections: Vec<Section>,
}

impl SessionConfig {
    pub fn new() -> Self {
        Default::default()
    }

    /// Builds the configuration the collector needs: a `core` section with exactly
    /// `level`, `log`, `type` and `lib`
    pub fn core(level: CaptureLevel, log_path: &str, lib: &str) -> Self {
        let mut config = Self::new();
        config.set(CORE_SECTION, LEVEL_KEY, level.as_str());
        config.set(CORE_SECTION, LOG_KEY, &quote(log_path));
        config.set(CORE_SECTION, TYPE_KEY, OUTPUT_TYPE);
        config.set(CORE_SECTION, LIB_KEY, lib);
        config
    }

    /// Inserts or replaces a value. New sections and keys are appended, existing ones keep their position.
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let idx = match self.sections.iter().position(|s| s.name == section) {
            Some(idx) => idx,
            None => {
                self.sections.push(Section {
                    name: section.to_string(),
                    entries: Vec::new(),
                });
                self.sections.len() - 1
            }
        };

        let entries = &mut self.sections[idx].entries;
        match entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => entries.push((key.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.name == section)?
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.name.as_str())
    }

    pub fn keys<'a>(&'a self, section: &'a str) -> impl Iterator<Item = &'a str> {
        self.sections
            .iter()
            .filter(move |s| s.name == section)
            .flat_map(|s| s.entries.iter().map(|(k, _)| k.as_str()))
    }

    /// Parses the text format written by [`SessionConfig::write_to`]
    pub fn parse(text: &str) -> ConfigResult<Self> {
        let mut config = Self::new();
        let mut current: Option<String> = None;

        for (idx, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let name = rest.strip_suffix(']').ok_or(ConfigError::SyntaxError {
                    line: idx + 1,
                    reason: "unterminated section header",
                })?;
                let name = name.trim();
                if name.is_empty() {
                    return Err(ConfigError::SyntaxError {
                        line: idx + 1,
                        reason: "empty section name",
                    });
                }
                current = Some(name.to_string());
                continue;
            }

            let section = current.as_deref().ok_or(ConfigError::SyntaxError {
                line: idx + 1,
                reason: "key outside of any section",
            })?;
            let (key, value) = line.split_once('=').ok_or(ConfigError::SyntaxError {
                line: idx + 1,
                reason: "expected `key = value`",
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ConfigError::SyntaxError {
                    line: idx + 1,
                    reason: "empty key",
                });
            }
            config.set(section, key, value.trim());
        }

        Ok(config)
    }

    /// Overwrites `path` with this configuration, creating the parent directories if needed
    pub fn write_to(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = fs::File::create(path)?;
        file.write_all(self.to_string().as_bytes())?;
        file.flush()?;
        log::debug!("Wrote collector configuration to {}", path.display());
        Ok(())
    }

    pub fn read_from(path: &Path) -> ConfigResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }
}

impl fmt::Display for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for section in &self.sections {
            writeln!(f, "[{}]", section.name)?;
            for (key, value) in &section.entries {
                writeln!(f, "  {} = {}", key, value)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

pub(crate) fn quote(value: &str) -> String {
    format!("\"{}\"", value)
}

/// Strips one pair of surrounding double quotes, if any
pub fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
