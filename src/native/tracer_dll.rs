//! Native API - tracer library
//!
//! The capture engine ships as a native library built once per pointer width. The matching
//! library is loaded the first time [`NativeCollector::load`] is called and its entry points are
//! resolved once, then shared by every [`NativeCollector`] of the process.
use std::path::Path;

use once_cell::sync::OnceCell;
use widestring::U16CString;
use windows::core::{GUID, PCSTR, PCWSTR};
use windows::Win32::Foundation::HMODULE;
use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};

use super::{check_status, NativeError, NativeResult};
use crate::collector::{Collector, Converter};
use crate::guid::Guid;

#[cfg(target_pointer_width = "64")]
pub const TRACER_LIBRARY: &str = "mfx_tracer_64.dll";
#[cfg(target_pointer_width = "32")]
pub const TRACER_LIBRARY: &str = "mfx_tracer_32.dll";

type StatusFn = unsafe extern "C" fn() -> i32;
type PathFn = unsafe extern "C" fn(*const u16) -> i32;
type GuidFn = unsafe extern "C" fn(*const GUID) -> i32;
type EventsFn = unsafe extern "C" fn(*const GUID, *mut u64) -> i32;
type TimestampFn = unsafe extern "C" fn(*const GUID, *mut i64) -> i32;
type ConvertFn = unsafe extern "C" fn(*const u16, *const u16) -> i32;

/// Entry points exported by the tracer library
#[derive(Debug)]
struct TracerFunctions {
    set_trace_file: PathFn,
    create_consumer: GuidFn,
    destroy_all_consumers: StatusFn,
    flush_loggers: StatusFn,
    get_provider_events: EventsFn,
    get_provider_timestamp: TimestampFn,
    start: StatusFn,
    stop: StatusFn,
    convert_etl_to_text: ConvertFn,
}

static TRACER: OnceCell<TracerFunctions> = OnceCell::new();

macro_rules! resolve {
    ($module: expr, $name: literal) => {{
        let proc = unsafe {
            // Safety: the name is a null terminated ASCII string
            GetProcAddress($module, PCSTR::from_raw(concat!($name, "\0").as_ptr()))
        };
        match proc {
            // Safety: the exported symbol has the signature this crate expects for this name
            Some(proc) => unsafe { std::mem::transmute(proc) },
            None => return Err(NativeError::EntryPointMissing($name)),
        }
    }};
}

impl TracerFunctions {
    fn load() -> NativeResult<Self> {
        let wide_name = U16CString::from_str_truncate(TRACER_LIBRARY);
        let module: HMODULE = unsafe {
            // Safety: the name is a valid, null terminated widestring
            LoadLibraryW(PCWSTR::from_raw(wide_name.as_ptr()))
        }
        .map_err(|err| NativeError::LibraryUnavailable(format!("{} ({})", TRACER_LIBRARY, err)))?;
        // The module is never freed: the function pointers below live as long as the process

        let functions = Self {
            set_trace_file: resolve!(module, "SetTraceFile"),
            create_consumer: resolve!(module, "CreateConsumer"),
            destroy_all_consumers: resolve!(module, "DestroyAllConsumers"),
            flush_loggers: resolve!(module, "FlushLoggers"),
            get_provider_events: resolve!(module, "GetProviderEvents"),
            get_provider_timestamp: resolve!(module, "GetProviderTimestamp"),
            start: resolve!(module, "Start"),
            stop: resolve!(module, "Stop"),
            convert_etl_to_text: resolve!(module, "ConvertEtlToText"),
        };
        log::info!("Loaded {}", TRACER_LIBRARY);
        Ok(functions)
    }
}

fn wide_path(path: &Path) -> U16CString {
    U16CString::from_os_str_truncate(path.as_os_str())
}

/// [`Collector`] and [`Converter`] backed by the tracer library
#[derive(Debug, Clone, Copy)]
pub struct NativeCollector {
    functions: &'static TracerFunctions,
}

impl NativeCollector {
    /// Loads the tracer library matching the host pointer width, once per process
    pub fn load() -> NativeResult<Self> {
        let functions = TRACER.get_or_try_init(TracerFunctions::load)?;
        Ok(Self { functions })
    }
}

impl Collector for NativeCollector {
    fn set_trace_file(&mut self, path: &Path) -> NativeResult<()> {
        let wide = wide_path(path);
        // Safety: the path is a null terminated widestring that outlives the call
        let status = unsafe { (self.functions.set_trace_file)(wide.as_ptr()) };
        check_status("SetTraceFile", status)
    }

    fn create_consumer(&mut self, provider: &Guid) -> NativeResult<()> {
        let guid = GUID::from(*provider);
        // Safety: the GUID outlives the call
        let status = unsafe { (self.functions.create_consumer)(&guid) };
        check_status("CreateConsumer", status)
    }

    fn destroy_all_consumers(&mut self) -> NativeResult<()> {
        let status = unsafe { (self.functions.destroy_all_consumers)() };
        check_status("DestroyAllConsumers", status)
    }

    fn flush_loggers(&mut self) -> NativeResult<()> {
        let status = unsafe { (self.functions.flush_loggers)() };
        check_status("FlushLoggers", status)
    }

    fn provider_events(&self, provider: &Guid) -> NativeResult<u64> {
        let guid = GUID::from(*provider);
        let mut events = 0u64;
        // Safety: both pointers are valid for the duration of the call
        let status = unsafe { (self.functions.get_provider_events)(&guid, &mut events) };
        check_status("GetProviderEvents", status)?;
        Ok(events)
    }

    fn provider_timestamp(&self, provider: &Guid) -> NativeResult<i64> {
        let guid = GUID::from(*provider);
        let mut timestamp = 0i64;
        // Safety: both pointers are valid for the duration of the call
        let status = unsafe { (self.functions.get_provider_timestamp)(&guid, &mut timestamp) };
        check_status("GetProviderTimestamp", status)?;
        Ok(timestamp)
    }

    fn start(&mut self) -> NativeResult<()> {
        let status = unsafe { (self.functions.start)() };
        check_status("Start", status)
    }

    fn stop(&mut self) -> NativeResult<()> {
        let status = unsafe { (self.functions.stop)() };
        check_status("Stop", status)
    }
}

impl Converter for NativeCollector {
    fn convert(&self, source: &Path, destination: &Path) -> NativeResult<()> {
        let wide_source = wide_path(source);
        let wide_destination = wide_path(destination);
        // Safety: both paths are null terminated widestrings that outlive the call
        let status = unsafe {
            (self.functions.convert_etl_to_text)(wide_source.as_ptr(), wide_destination.as_ptr())
        };
        check_status("ConvertEtlToText", status)
    }
}
