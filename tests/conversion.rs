//! Test background conversions and their status reporting

use std::path::Path;
use std::sync::Arc;

use tracectl::collector::Converter;
use tracectl::convert::{ConversionError, ConversionRunner, ConversionStatus};
use tracectl::native::{NativeError, NativeResult};

mod utils;
use utils::{gated_converter, wait_until};

#[test]
fn started_then_completed() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("trace.etl");
    let destination = dir.path().join("trace.txt");
    std::fs::write(&source, b"etl").unwrap();

    let (converter, gate) = gated_converter();
    let mut runner = ConversionRunner::new(converter);
    runner.start_convert(&source, &destination);

    let mut seen = Vec::new();
    seen.push(runner.status().unwrap().status);
    wait_until(|| runner.status().unwrap().status == ConversionStatus::InProgress);
    seen.push(ConversionStatus::InProgress);
    assert!(!runner.is_finished());

    gate.succeed();
    wait_until(|| runner.is_finished());
    let last = runner.status().unwrap();
    seen.push(last.status);

    assert_eq!(
        seen,
        vec![
            ConversionStatus::Started,
            ConversionStatus::InProgress,
            ConversionStatus::Completed,
        ]
    );
    assert_eq!(last.percent_complete, 100);
    assert_eq!(last.source, source);
    assert_eq!(last.destination, destination);
    assert!(destination.exists());
    assert!(runner.take_error().is_none());
}

#[test]
fn polling_never_skips_started() {
    let (converter, gate) = gated_converter();
    let mut runner = ConversionRunner::new(converter);
    let dir = tempfile::tempdir().unwrap();

    // Let the conversion finish before anyone polls
    gate.succeed();
    runner.start_convert(dir.path().join("trace.etl"), dir.path().join("trace.txt"));
    wait_until(|| runner.is_finished());

    let mut statuses = Vec::new();
    loop {
        let progress = runner.status().unwrap();
        statuses.push(progress.status);
        if progress.status.is_terminal() {
            assert_eq!(progress.percent_complete, 100);
            break;
        }
    }
    assert_eq!(statuses, vec![ConversionStatus::Started, ConversionStatus::Completed]);
}

#[test]
fn failing_delegate_aborts() {
    let (converter, gate) = gated_converter();
    let mut runner = ConversionRunner::new(converter);
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("trace.txt");

    runner.start_convert(dir.path().join("trace.etl"), &destination);
    gate.fail();
    let last = runner.wait().unwrap();

    assert_eq!(last.status, ConversionStatus::Aborted);
    assert_eq!(last.percent_complete, 0);
    assert!(!destination.exists());
    match runner.take_error() {
        Some(ConversionError::ConversionAbortError(NativeError::Status { code: 5, .. })) => (),
        other => panic!("unexpected error {:?}", other),
    }
    // The error is handed out once
    assert!(runner.take_error().is_none());
}

struct PanickingConverter;

impl Converter for PanickingConverter {
    fn convert(&self, _source: &Path, _destination: &Path) -> NativeResult<()> {
        panic!("delegate exploded");
    }
}

#[test]
fn panicking_delegate_aborts() {
    let mut runner = ConversionRunner::new(PanickingConverter);
    runner.start_convert("trace.etl", "trace.txt");

    let last = runner.wait().unwrap();
    assert_eq!(last.status, ConversionStatus::Aborted);
    match runner.take_error() {
        Some(ConversionError::ConversionAbortError(NativeError::Panicked(msg))) => {
            assert!(msg.contains("delegate exploded"))
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn newer_job_supersedes_older_one() {
    let (converter, gate) = gated_converter();
    let mut runner = ConversionRunner::from_arc(Arc::new(converter));
    let dir = tempfile::tempdir().unwrap();

    runner.start_convert(dir.path().join("first.etl"), dir.path().join("first.txt"));
    wait_until(|| gate.entered() == 1);

    runner.start_convert(dir.path().join("second.etl"), dir.path().join("second.txt"));
    let progress = runner.status().unwrap();
    assert_eq!(progress.status, ConversionStatus::Started);
    assert_eq!(progress.source, dir.path().join("second.etl"));

    // First job fails, second one succeeds: only the second one is visible
    wait_until(|| runner.status().unwrap().status == ConversionStatus::InProgress);
    gate.fail();
    gate.succeed();

    let last = runner.wait().unwrap();
    assert_eq!(last.source, dir.path().join("second.etl"));
    assert_eq!(last.status, ConversionStatus::Completed);
    assert_eq!(last.percent_complete, 100);
    assert!(runner.take_error().is_none());
    assert!(dir.path().join("second.txt").exists());
}
