//! Basic ETW types
//!
//! The `etw_types` module provides an abstraction over the ETW types needed to control and query a
//! trace session. Most of the types in this module are wrappers over the windows bindings using the
//! newtype pattern to extend their implementations
use std::fmt::Formatter;

use widestring::U16CString;
use windows::Win32::System::Diagnostics::Etw;

use crate::collector::SessionCounters;

pub const TRACE_NAME_MAX_CHARS: usize = 200; // Microsoft documentation says the limit is 1024, but do not trust us. Experience shows that traces with names longer than ~240 character silently fail.
pub const LOG_FILE_NAME_MAX_CHARS: usize = 260; // MAX_PATH

/// Wrapper over an [EVENT_TRACE_PROPERTIES](https://docs.microsoft.com/en-us/windows/win32/api/evntrace/ns-evntrace-event_trace_properties), and its allocated companion members
///
/// `ControlTrace` expects the session name and the log file name to be stored right after the
/// struct, at the offsets given in `LoggerNameOffset` and `LogFileNameOffset`. On a query, Windows
/// fills both buffers along with the counters.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct EventTraceProperties {
    etw_trace_properties: Etw::EVENT_TRACE_PROPERTIES,
    wide_trace_name: [u16; TRACE_NAME_MAX_CHARS + 1], // The +1 leaves space for the final null widechar.
    wide_log_file_name: [u16; LOG_FILE_NAME_MAX_CHARS + 1],
}

impl std::fmt::Debug for EventTraceProperties {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTraceProperties")
            .field("name", &wide_to_string(&self.wide_trace_name))
            .field("buffer_size", &self.etw_trace_properties.BufferSize)
            .field("buffers_written", &self.etw_trace_properties.BuffersWritten)
            .finish()
    }
}

impl EventTraceProperties {
    /// Creates an empty block suitable for `EVENT_TRACE_CONTROL_QUERY` and `EVENT_TRACE_CONTROL_STOP`
    pub(crate) fn for_control() -> Self {
        let mut etw_trace_properties = Etw::EVENT_TRACE_PROPERTIES::default();

        etw_trace_properties.Wnode.BufferSize = std::mem::size_of::<EventTraceProperties>() as u32;
        etw_trace_properties.Wnode.Flags = Etw::WNODE_FLAG_TRACED_GUID;
        etw_trace_properties.LoggerNameOffset = offset_of!(EventTraceProperties, wide_trace_name) as u32;
        etw_trace_properties.LogFileNameOffset = offset_of!(EventTraceProperties, wide_log_file_name) as u32;

        Self {
            etw_trace_properties,
            wide_trace_name: [0u16; TRACE_NAME_MAX_CHARS + 1],
            wide_log_file_name: [0u16; LOG_FILE_NAME_MAX_CHARS + 1],
        }
    }

    /// Gets a pointer to the wrapped [Etw::EVENT_TRACE_PROPERTIES]
    ///
    /// # Safety
    ///
    /// The API enforces this points to an allocated, valid `EVENT_TRACE_PROPERTIES` instance, followed by the buffers its offsets refer to.
    /// As evey other mutable raw pointer, you should not use it in case someone else is keeping a reference to this object.
    ///
    /// Note that `ControlTraceW` **will** modify its content on output.
    pub unsafe fn as_mut_ptr(&mut self) -> *mut Etw::EVENT_TRACE_PROPERTIES {
        &mut self.etw_trace_properties as *mut Etw::EVENT_TRACE_PROPERTIES
    }

    pub fn counters(&self) -> SessionCounters {
        SessionCounters {
            buffer_size_kb: self.etw_trace_properties.BufferSize,
            buffers_written: self.etw_trace_properties.BuffersWritten,
            events_lost: self.etw_trace_properties.EventsLost,
        }
    }
}

fn wide_to_string(buf: &[u16]) -> String {
    U16CString::from_vec_truncate(buf.to_vec()).to_string_lossy()
}
