//! Native API - Event Tracing evntrace header
//!
//! The `evntrace` module is an abstraction layer for the Windows evntrace library. This module act as a
//! internal API that holds all `unsafe` calls to functions exported by the `evntrace` Windows library.
//!
//! This module shouldn't be accessed directly. [`EtwSessions`] is the safe entry point.
use widestring::U16CString;
use windows::core::PCWSTR;
use windows::Win32::Foundation::ERROR_WMI_INSTANCE_NOT_FOUND;
use windows::Win32::System::Diagnostics::Etw;

use super::etw_types::{EventTraceProperties, TRACE_NAME_MAX_CHARS};
use super::{NativeError, NativeResult};
use crate::collector::{SessionCounters, TraceSessions};

/// Issues a control request on the session called `name`
///
/// Returns `None` if Windows does not know any session with this name
fn control_trace(name: &str, control_code: Etw::EVENT_TRACE_CONTROL) -> NativeResult<Option<EventTraceProperties>> {
    let mut wide_name = U16CString::from_str_truncate(name).into_vec();
    wide_name.truncate(TRACE_NAME_MAX_CHARS);
    wide_name.push(0);

    let mut properties = EventTraceProperties::for_control();

    let status = unsafe {
        // Safety:
        //  * the name is a valid, null terminated widestring that outlives the call
        //  * `properties` is a valid EVENT_TRACE_PROPERTIES followed by the buffers its offsets point to (and will be mutated)
        Etw::ControlTraceW(
            0,
            PCWSTR::from_raw(wide_name.as_ptr()),
            properties.as_mut_ptr(),
            control_code,
        )
    };

    match status {
        0 => Ok(Some(properties)),
        status if status == ERROR_WMI_INSTANCE_NOT_FOUND.0 => Ok(None),
        status => Err(NativeError::IoError(std::io::Error::from_raw_os_error(
            status as i32,
        ))),
    }
}

/// `QueryTrace` on the session called `name`
pub(crate) fn query_trace(name: &str) -> NativeResult<Option<SessionCounters>> {
    let properties = control_trace(name, Etw::EVENT_TRACE_CONTROL_QUERY)?;
    Ok(properties.map(|p| p.counters()))
}

/// `StopTrace` on the session called `name`. Returns whether a session was running.
pub(crate) fn stop_trace(name: &str) -> NativeResult<bool> {
    let properties = control_trace(name, Etw::EVENT_TRACE_CONTROL_STOP)?;
    Ok(properties.is_some())
}

/// [`TraceSessions`] backed by `ControlTraceW`
#[derive(Debug, Default, Clone, Copy)]
pub struct EtwSessions;

impl TraceSessions for EtwSessions {
    fn query(&self, name: &str) -> NativeResult<Option<SessionCounters>> {
        query_trace(name)
    }

    fn stop(&self, name: &str) -> NativeResult<bool> {
        stop_trace(name)
    }
}
