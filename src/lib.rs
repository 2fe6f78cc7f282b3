//! # Control a named ETW capture session
//! This crate drives a single, machine-wide Event Tracing for Windows (ETW) capture session whose
//! actual tracing engine lives in an external native tracer library.
//!
//! # What's in here
//! The tracer library owns the hard parts (kernel logger management, buffer sizing, binary ETL
//! parsing, ETL-to-text conversion). This crate owns what sits around it:
//! * the configuration file the tracer reads on startup ([`config`]),
//! * the start/stop/delete state machine coordinating that file and the tracer ([`trace`]),
//! * point-in-time statistics of the OS session (`QueryTrace` over an `EVENT_TRACE_PROPERTIES` block),
//! * background ETL-to-text conversion with pollable status ([`convert`]),
//! * a machine-wide single instance guard ([`instance`]).
//!
//! The tracer is reached through the [`collector`] traits. On Windows,
//! `native::tracer_dll::NativeCollector` loads the library matching the host pointer width; on other
//! hosts (and in tests) any implementation of the traits can be plugged in.
//!
//! # Getting started
//! ```no_run
//! # #[cfg(windows)]
//! # fn main() {
//! use tracectl::config::CaptureLevel;
//! use tracectl::convert::ConversionRunner;
//! use tracectl::instance::InstanceLock;
//! use tracectl::native::tracer_dll::NativeCollector;
//! use tracectl::trace::TraceController;
//!
//! // Only one process may drive the session
//! let _lock = InstanceLock::acquire("tracectl").unwrap();
//!
//! let collector = NativeCollector::load().unwrap();
//! let mut controller = TraceController::builder(collector)
//!     .capture_dir(r"C:\traces")
//!     .build();
//!
//! controller.configure(CaptureLevel::Full, r"C:\traces\tracer.log");
//! controller.start().unwrap();
//!
//! // Polling is up to the caller, the controller holds no timer
//! for _ in 0..10 {
//!     std::thread::sleep(std::time::Duration::from_secs(1));
//!     println!("{} KB written", controller.query_statistics().kilobytes_written);
//! }
//! controller.stop().unwrap();
//!
//! let mut runner = ConversionRunner::new(collector);
//! runner.start_convert(r"C:\traces\tracectl_000001.etl", r"C:\traces\tracectl.txt");
//! println!("{:?}", runner.wait());
//! # }
//! # #[cfg(not(windows))]
//! # fn main() {}
//! ```
//!
//! # Log messages
//! tracectl writes log messages using the [`log`](https://docs.rs/log/latest/log/) crate.<br/>
//! In case you want them to be printed to the console, your binary should use one of the various logger implementations. [`env_logger`](https://docs.rs/env_logger/latest/env_logger/) is one of them.

#[cfg(windows)]
#[macro_use]
extern crate memoffset;

#[macro_use]
extern crate num_derive;
extern crate num_traits;

pub mod collector;
pub mod config;
pub mod convert;
pub mod guid;
pub mod instance;
pub mod native;
pub mod trace;

// Convenience re-exports.
pub use crate::collector::{Collector, Converter, TraceSessions};
pub use crate::config::{CaptureLevel, SessionConfig};
pub use crate::convert::{ConversionProgress, ConversionRunner, ConversionStatus};
pub use crate::guid::Guid;
pub use crate::instance::InstanceLock;
pub use crate::trace::{CollectorState, TraceController, TraceStatistics};
