//! Capabilities the controller delegates to
//!
//! The actual capture engine lives in a native tracer library. The controller only talks to it
//! through the [`Collector`] and [`Converter`] traits, and to the OS trace sessions through
//! [`TraceSessions`], so that one implementation can be picked at startup (see
//! `native::tracer_dll` on Windows) and replaced by test doubles elsewhere.
use std::path::Path;

use crate::guid::Guid;
use crate::native::NativeResult;

/// Counters read from a running trace session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCounters {
    /// Size of each buffer, in KB
    pub buffer_size_kb: u32,
    pub buffers_written: u32,
    pub events_lost: u32,
}

impl SessionCounters {
    pub fn kilobytes_written(&self) -> u64 {
        self.buffer_size_kb as u64 * self.buffers_written as u64
    }
}

/// Start/stop side of the native tracer
pub trait Collector {
    /// Base path of the `.etl` output. The tracer appends the rollover suffix itself.
    fn set_trace_file(&mut self, path: &Path) -> NativeResult<()>;
    fn create_consumer(&mut self, provider: &Guid) -> NativeResult<()>;
    fn destroy_all_consumers(&mut self) -> NativeResult<()>;
    fn flush_loggers(&mut self) -> NativeResult<()>;
    /// Number of events received so far from `provider`
    fn provider_events(&self, provider: &Guid) -> NativeResult<u64>;
    /// Raw FILETIME quad of the last event received from `provider`
    fn provider_timestamp(&self, provider: &Guid) -> NativeResult<i64>;
    fn start(&mut self) -> NativeResult<()>;
    fn stop(&mut self) -> NativeResult<()>;
}

/// ETL-to-text conversion entry point
///
/// The call is opaque: it either returns once the whole file has been converted or fails.
pub trait Converter: Send + Sync {
    fn convert(&self, source: &Path, destination: &Path) -> NativeResult<()>;
}

/// Query side of the OS trace sessions
pub trait TraceSessions {
    /// Point-in-time counters of the session called `name`, `None` if no such session is running
    fn query(&self, name: &str) -> NativeResult<Option<SessionCounters>>;

    /// Stops the session called `name` if it exists. Returns whether a session was stopped.
    fn stop(&self, name: &str) -> NativeResult<bool>;
}

/// [`TraceSessions`] for hosts without ETW: there never is a session to query
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSessions;

impl TraceSessions for NoSessions {
    fn query(&self, _name: &str) -> NativeResult<Option<SessionCounters>> {
        Ok(None)
    }

    fn stop(&self, _name: &str) -> NativeResult<bool> {
        Ok(false)
    }
}

/// The [`TraceSessions`] implementation matching the host
#[cfg(windows)]
pub type DefaultSessions = crate::native::evntrace::EtwSessions;
/// The [`TraceSessions`] implementation matching the host
#[cfg(not(windows))]
pub type DefaultSessions = NoSessions;

impl<T: Collector + ?Sized> Collector for Box<T> {
    fn set_trace_file(&mut self, path: &Path) -> NativeResult<()> {
        (**self).set_trace_file(path)
    }
    fn create_consumer(&mut self, provider: &Guid) -> NativeResult<()> {
        (**self).create_consumer(provider)
    }
    fn destroy_all_consumers(&mut self) -> NativeResult<()> {
        (**self).destroy_all_consumers()
    }
    fn flush_loggers(&mut self) -> NativeResult<()> {
        (**self).flush_loggers()
    }
    fn provider_events(&self, provider: &Guid) -> NativeResult<u64> {
        (**self).provider_events(provider)
    }
    fn provider_timestamp(&self, provider: &Guid) -> NativeResult<i64> {
        (**self).provider_timestamp(provider)
    }
    fn start(&mut self) -> NativeResult<()> {
        (**self).start()
    }
    fn stop(&mut self) -> NativeResult<()> {
        (**self).stop()
    }
}
