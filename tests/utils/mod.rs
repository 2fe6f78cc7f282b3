#![allow(dead_code)] // every test binary uses a different subset of these helpers

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracectl::collector::{Collector, Converter, SessionCounters, TraceSessions};
use tracectl::native::{NativeError, NativeResult};
use tracectl::Guid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    SetTraceFile(PathBuf),
    CreateConsumer(Guid),
    DestroyAllConsumers,
    FlushLoggers,
    Start,
    Stop,
}

/// Which collector call should fail
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailOn {
    Nothing,
    Start,
    Stop,
    DestroyConsumers,
}

/// Records every call, and can be told to fail one of them
#[derive(Clone, Debug)]
pub struct MockCollector {
    calls: Arc<Mutex<Vec<Call>>>,
    fail_on: Arc<Mutex<FailOn>>,
}

impl MockCollector {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_on: Arc::new(Mutex::new(FailOn::Nothing)),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn fail_on(&self, fail_on: FailOn) {
        *self.fail_on.lock().unwrap() = fail_on;
    }

    fn record(&self, call: Call, fails_when: FailOn) -> NativeResult<()> {
        self.calls.lock().unwrap().push(call);
        if fails_when != FailOn::Nothing && *self.fail_on.lock().unwrap() == fails_when {
            return Err(NativeError::Status { call: "mock", code: -1 });
        }
        Ok(())
    }
}

impl Collector for MockCollector {
    fn set_trace_file(&mut self, path: &Path) -> NativeResult<()> {
        self.record(Call::SetTraceFile(path.to_path_buf()), FailOn::Nothing)
    }
    fn create_consumer(&mut self, provider: &Guid) -> NativeResult<()> {
        self.record(Call::CreateConsumer(*provider), FailOn::Nothing)
    }
    fn destroy_all_consumers(&mut self) -> NativeResult<()> {
        self.record(Call::DestroyAllConsumers, FailOn::DestroyConsumers)
    }
    fn flush_loggers(&mut self) -> NativeResult<()> {
        self.record(Call::FlushLoggers, FailOn::Nothing)
    }
    fn provider_events(&self, _provider: &Guid) -> NativeResult<u64> {
        Ok(self.calls().iter().filter(|c| **c == Call::Start).count() as u64)
    }
    fn provider_timestamp(&self, _provider: &Guid) -> NativeResult<i64> {
        Ok(0)
    }
    fn start(&mut self) -> NativeResult<()> {
        self.record(Call::Start, FailOn::Start)
    }
    fn stop(&mut self) -> NativeResult<()> {
        self.record(Call::Stop, FailOn::Stop)
    }
}

/// OS sessions as seen by the controller, set by the test
#[derive(Clone, Debug, Default)]
pub struct MockSessions {
    running: Arc<Mutex<Option<SessionCounters>>>,
    stopped: Arc<Mutex<usize>>,
    failing: Arc<Mutex<bool>>,
}

impl MockSessions {
    /// Makes every query and stop fail, as if the OS trace API was unavailable
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    fn check_failing(&self, call: &'static str) -> NativeResult<()> {
        if *self.failing.lock().unwrap() {
            return Err(NativeError::Status { call, code: 5 });
        }
        Ok(())
    }

    pub fn set_running(&self, counters: Option<SessionCounters>) {
        *self.running.lock().unwrap() = counters;
    }

    /// How many times a leftover session was actually stopped
    pub fn stopped(&self) -> usize {
        *self.stopped.lock().unwrap()
    }
}

impl TraceSessions for MockSessions {
    fn query(&self, _name: &str) -> NativeResult<Option<SessionCounters>> {
        self.check_failing("QueryTrace")?;
        Ok(self.running.lock().unwrap().clone())
    }

    fn stop(&self, _name: &str) -> NativeResult<bool> {
        self.check_failing("StopTrace")?;
        let was_running = self.running.lock().unwrap().take().is_some();
        if was_running {
            *self.stopped.lock().unwrap() += 1;
        }
        Ok(was_running)
    }
}

/// A converter that blocks until the test opens the gate, then writes the destination file
#[derive(Debug)]
pub struct GatedConverter {
    gate: Mutex<mpsc::Receiver<NativeResult<()>>>,
    entered: Arc<AtomicUsize>,
}

#[derive(Debug)]
pub struct Gate {
    tx: mpsc::Sender<NativeResult<()>>,
    entered: Arc<AtomicUsize>,
}

impl Gate {
    /// How many conversions reached the gate so far
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn succeed(&self) {
        self.tx.send(Ok(())).unwrap();
    }

    pub fn fail(&self) {
        self.tx
            .send(Err(NativeError::Status { call: "ConvertEtlToText", code: 5 }))
            .unwrap();
    }
}

pub fn gated_converter() -> (GatedConverter, Gate) {
    let (tx, rx) = mpsc::channel();
    let entered = Arc::new(AtomicUsize::new(0));
    (
        GatedConverter {
            gate: Mutex::new(rx),
            entered: Arc::clone(&entered),
        },
        Gate { tx, entered },
    )
}

impl Converter for GatedConverter {
    fn convert(&self, source: &Path, destination: &Path) -> NativeResult<()> {
        let gate = self.gate.lock().unwrap();
        self.entered.fetch_add(1, Ordering::SeqCst);
        let outcome = gate
            .recv_timeout(Duration::from_secs(10))
            .unwrap_or_else(|_| panic!("gate was never opened"));
        outcome?;

        std::fs::write(destination, format!("converted from {}\n", source.display()))?;
        Ok(())
    }
}

/// Polls `f` until it returns true, for up to ten seconds
#[track_caller]
pub fn wait_until<F: FnMut() -> bool>(mut f: F) {
    for _attempt in 0..1000 {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("condition not reached within the allowed timeout");
}
