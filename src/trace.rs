//! ETW capture session controller
//!
//! Keeps the collector configuration file and the native collector in a consistent state while
//! a front end asks to start capturing, stop capturing, or how much has been written so far.
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::collector::{Collector, DefaultSessions, TraceSessions};
use crate::config::{self, CaptureLevel, ConfigError, SessionConfig};
use crate::guid::Guid;
use crate::native::time::FileTime;
use crate::native::NativeError;

/// Name of the ETW session driven by the collector
pub const DEFAULT_SESSION_NAME: &str = "tracectl";
/// Provider whose events the collector consumes
pub const DEFAULT_PROVIDER: Guid = Guid::from_values(
    0x2d6b112a, 0xd21c, 0x4a40, [0x9b, 0xf2, 0xa3, 0xed, 0xf2, 0x12, 0xf6, 0x24]);

/// Index of the rollover file considered as the capture target
const FIRST_ROLLOVER: u32 = 1;

/// Trace module errors
#[derive(Debug)]
pub enum TraceError {
    /// The collector configuration file could not be written
    ConfigWriteError(ConfigError),
    /// `start` was called while the collector was already capturing
    AlreadyRunningError,
    /// Wrapper over an internal [NativeError]
    NativeCallError(NativeError),
}

impl From<ConfigError> for TraceError {
    fn from(err: ConfigError) -> Self {
        TraceError::ConfigWriteError(err)
    }
}

impl From<NativeError> for TraceError {
    fn from(err: NativeError) -> Self {
        TraceError::NativeCallError(err)
    }
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceError::ConfigWriteError(err) => write!(f, "unable to write the collector configuration: {}", err),
            TraceError::AlreadyRunningError => write!(f, "the collector is already capturing"),
            TraceError::NativeCallError(err) => write!(f, "collector call failed: {}", err),
        }
    }
}

impl std::error::Error for TraceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TraceError::ConfigWriteError(err) => Some(err),
            TraceError::AlreadyRunningError => None,
            TraceError::NativeCallError(err) => Some(err),
        }
    }
}

pub type TraceResult<T> = Result<T, TraceError>;

/// Where the collector stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum CollectorState {
    Idle,
    Configured,
    Collecting,
}

/// Snapshot of what the session has written so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TraceStatistics {
    pub kilobytes_written: u64,
    pub buffers_written: u64,
    pub events_lost: u64,
}

/// Builder for a [`TraceController`]
#[derive(Debug)]
pub struct TraceControllerBuilder<C, S = DefaultSessions> {
    collector: C,
    sessions: S,
    session_name: String,
    config_path: PathBuf,
    capture_dir: PathBuf,
    provider: Guid,
    library: String,
}

impl<C: Collector> TraceControllerBuilder<C, DefaultSessions> {
    fn new(collector: C) -> Self {
        Self {
            collector,
            sessions: DefaultSessions::default(),
            session_name: DEFAULT_SESSION_NAME.to_string(),
            config_path: config::default_config_path().to_path_buf(),
            capture_dir: std::env::temp_dir(),
            provider: DEFAULT_PROVIDER,
            library: config::NO_LIBRARY.to_string(),
        }
    }
}

impl<C: Collector, S: TraceSessions> TraceControllerBuilder<C, S> {
    pub fn named(mut self, name: String) -> Self {
        if name.is_empty() {
            panic!("Attempted to set an empty name for a trace session");
        }

        self.session_name = name;
        self
    }

    pub fn config_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_path = path.into();
        self
    }

    /// Directory the collector writes its `.etl` rollover files into
    pub fn capture_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.capture_dir = dir.into();
        self
    }

    pub fn provider(mut self, guid: Guid) -> Self {
        self.provider = guid;
        self
    }

    /// Runtime library the tracer should load (`core.lib`), `none` by default
    pub fn library(mut self, lib: &str) -> Self {
        self.library = lib.to_string();
        self
    }

    /// Replaces the OS session query backend
    pub fn sessions<S2: TraceSessions>(self, sessions: S2) -> TraceControllerBuilder<C, S2> {
        TraceControllerBuilder {
            collector: self.collector,
            sessions,
            session_name: self.session_name,
            config_path: self.config_path,
            capture_dir: self.capture_dir,
            provider: self.provider,
            library: self.library,
        }
    }

    pub fn build(self) -> TraceController<C, S> {
        TraceController {
            collector: self.collector,
            sessions: self.sessions,
            session_name: self.session_name,
            config_path: self.config_path,
            capture_dir: self.capture_dir,
            provider: self.provider,
            library: self.library,
            level: CaptureLevel::default(),
            log_path: String::new(),
            state: CollectorState::Idle,
            config: None,
            has_started: false,
        }
    }
}

/// Controller of the single named capture session
///
/// Operations are blocking calls into the collector and must not run concurrently; taking
/// `&mut self` is what serializes them. Only one controller should exist per machine, see
/// [`InstanceLock`](crate::instance::InstanceLock).
///
/// On drop the collector is stopped and the session torn down, whatever the current state.
pub struct TraceController<C: Collector, S: TraceSessions = DefaultSessions> {
    collector: C,
    sessions: S,
    session_name: String,
    config_path: PathBuf,
    capture_dir: PathBuf,
    provider: Guid,
    library: String,
    level: CaptureLevel,
    log_path: String,
    state: CollectorState,
    config: Option<SessionConfig>,
    has_started: bool,
}

impl<C: Collector> TraceController<C, DefaultSessions> {
    pub fn builder(collector: C) -> TraceControllerBuilder<C, DefaultSessions> {
        TraceControllerBuilder::new(collector)
    }
}

impl<C: Collector, S: TraceSessions> TraceController<C, S> {
    /// Records the capture level and the text log path. Nothing is written until [`Self::create`].
    pub fn configure(&mut self, level: CaptureLevel, log_path: &str) {
        self.level = level;
        self.log_path = log_path.to_string();
    }

    /// Tears down whatever a previous session left behind, then writes a fresh configuration file
    pub fn create(&mut self) -> TraceResult<()> {
        self.delete();
        self.remove_rollover_files();

        let config = SessionConfig::core(self.level, &self.log_path, &self.library);
        config.write_to(&self.config_path)?;

        self.config = Some(config);
        self.state = CollectorState::Configured;
        log::debug!("Session {} configured", self.session_name);
        Ok(())
    }

    pub fn start(&mut self) -> TraceResult<()> {
        if self.state == CollectorState::Collecting {
            return Err(TraceError::AlreadyRunningError);
        }

        self.create()?;

        if let Err(err) = self.start_collector() {
            log::warn!("Unable to start session {}: {}", self.session_name, err);
            if let Err(err) = self.collector.destroy_all_consumers() {
                log::warn!("Unable to destroy consumers: {}", err);
            }
            return Err(err.into());
        }

        self.state = CollectorState::Collecting;
        self.has_started = true;
        log::info!("Session {} is capturing to {}", self.session_name, self.target_file_path());
        Ok(())
    }

    fn start_collector(&mut self) -> Result<(), NativeError> {
        let trace_file = self.capture_dir.join(format!("{}.etl", self.session_name));
        self.collector.set_trace_file(&trace_file)?;
        self.collector.create_consumer(&self.provider)?;
        self.collector.start()
    }

    /// Stops capturing. The local state always goes back to `Configured`, even if the collector fails.
    ///
    /// This does not guarantee the buffers reached the disk: query the statistics afterwards to confirm.
    pub fn stop(&mut self) -> TraceResult<()> {
        if self.state != CollectorState::Collecting {
            return Ok(());
        }

        self.state = CollectorState::Configured;
        let stopped = self.collector.stop();
        let flushed = self.collector.flush_loggers();
        log::info!("Session {} stopped", self.session_name);

        stopped.and(flushed).map_err(|err| {
            log::warn!("Collector did not stop cleanly: {}", err);
            TraceError::NativeCallError(err)
        })
    }

    /// Stops if needed and removes the session state. Never fails, always ends `Idle`.
    pub fn delete(&mut self) {
        if let Err(err) = self.stop() {
            log::warn!("Ignoring stop failure while deleting: {}", err);
        }

        if self.state != CollectorState::Idle {
            if let Err(err) = self.collector.destroy_all_consumers() {
                log::warn!("Unable to destroy consumers: {}", err);
            }
        }

        match self.sessions.stop(&self.session_name) {
            Ok(true) => log::info!("Stopped leftover session {}", self.session_name),
            Ok(false) => (),
            Err(err) => log::warn!("Unable to stop leftover session {}: {}", self.session_name, err),
        }

        remove_if_exists(&self.config_path);

        self.config = None;
        self.state = CollectorState::Idle;
    }

    /// Single query of the OS session. Zeroed if nothing is (or was ever) captured.
    pub fn query_statistics(&self) -> TraceStatistics {
        if !self.has_started {
            return TraceStatistics::default();
        }

        match self.sessions.query(&self.session_name) {
            Ok(Some(counters)) => TraceStatistics {
                kilobytes_written: counters.kilobytes_written(),
                buffers_written: counters.buffers_written as u64,
                events_lost: counters.events_lost as u64,
            },
            Ok(None) => TraceStatistics::default(),
            Err(err) => {
                log::warn!("Unable to query session {}: {}", self.session_name, err);
                TraceStatistics::default()
            }
        }
    }

    /// Quoted path of the first rollover file the collector produces
    pub fn target_file_path(&self) -> String {
        config::quote(&self.rollover_file(FIRST_ROLLOVER).display().to_string())
    }

    fn rollover_file(&self, index: u32) -> PathBuf {
        self.capture_dir
            .join(format!("{}_{:06}.etl", self.session_name, index))
    }

    fn remove_rollover_files(&self) {
        let entries = match fs::read_dir(&self.capture_dir) {
            Ok(entries) => entries,
            Err(err) => {
                log::debug!("Unable to list {}: {}", self.capture_dir.display(), err);
                return;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            if is_rollover_file(&self.session_name, &name.to_string_lossy()) {
                remove_if_exists(&entry.path());
            }
        }
    }

    pub fn provider_events(&self) -> TraceResult<u64> {
        Ok(self.collector.provider_events(&self.provider)?)
    }

    /// Time of the last event the collector received
    pub fn provider_timestamp(&self) -> TraceResult<FileTime> {
        let quad = self.collector.provider_timestamp(&self.provider)?;
        Ok(FileTime::from_quad(quad))
    }

    pub fn is_running(&self) -> bool {
        self.state == CollectorState::Collecting
    }

    pub fn state(&self) -> CollectorState {
        self.state
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Configuration written by the last successful [`Self::create`]
    pub fn config(&self) -> Option<&SessionConfig> {
        self.config.as_ref()
    }

    pub fn collector(&self) -> &C {
        &self.collector
    }
}

impl<C: Collector, S: TraceSessions> fmt::Debug for TraceController<C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceController")
            .field("session_name", &self.session_name)
            .field("state", &self.state)
            .field("level", &self.level)
            .field("config_path", &self.config_path)
            .finish()
    }
}

impl<C: Collector, S: TraceSessions> Drop for TraceController<C, S> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::warn!("Session {} did not stop cleanly on drop: {}", self.session_name, err);
        }
        self.delete();
    }
}

/// `<session>_NNNNNN.etl`
fn is_rollover_file(session_name: &str, file_name: &str) -> bool {
    file_name
        .strip_prefix(session_name)
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|rest| rest.strip_suffix(".etl"))
        .map_or(false, |index| index.len() == 6 && index.bytes().all(|b| b.is_ascii_digit()))
}

fn remove_if_exists(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => log::debug!("Removed {}", path.display()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => (),
        Err(err) => log::warn!("Unable to remove {}: {}", path.display(), err),
    }
}
