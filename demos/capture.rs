//! Captures for a few seconds, then converts the capture to text
//!
//! Usage: `capture <capture dir> [seconds] [full|default] [provider guid]`

#[cfg(windows)]
fn main() {
    use std::path::PathBuf;
    use std::time::Duration;

    use tracectl::config::{unquote, CaptureLevel};
    use tracectl::convert::ConversionRunner;
    use tracectl::instance::InstanceLock;
    use tracectl::native::tracer_dll::NativeCollector;
    use tracectl::trace::{TraceController, DEFAULT_PROVIDER, DEFAULT_SESSION_NAME};
    use tracectl::Guid;

    env_logger::init(); // this is optional. This makes the log messages of tracectl to be printed to stderr

    let mut args = std::env::args().skip(1);
    let capture_dir = PathBuf::from(args.next().unwrap_or_else(|| String::from(".")));
    let seconds: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(10);
    let level = match args.next().as_deref() {
        Some("full") => CaptureLevel::Full,
        _ => CaptureLevel::Default,
    };
    let provider = match args.next().map(|s| s.parse::<Guid>()) {
        None => DEFAULT_PROVIDER,
        Some(Ok(guid)) => guid,
        Some(Err(err)) => {
            eprintln!("{}", err);
            std::process::exit(2);
        }
    };

    let _lock = match InstanceLock::acquire(DEFAULT_SESSION_NAME) {
        Ok(lock) => lock,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    };

    let collector = NativeCollector::load().unwrap();
    let mut controller = TraceController::builder(collector)
        .capture_dir(&capture_dir)
        .provider(provider)
        .build();
    controller.configure(level, &capture_dir.join("tracer.log").display().to_string());

    controller.start().unwrap();
    for _ in 0..seconds {
        std::thread::sleep(Duration::from_secs(1));
        let stats = controller.query_statistics();
        println!(
            "{} KB written, {} events received",
            stats.kilobytes_written,
            controller.provider_events().unwrap_or(0)
        );
    }
    match controller.provider_timestamp() {
        Ok(last) if !last.is_zero() => println!("Last event from {} at {} ms", provider, last.as_unix_timestamp()),
        Ok(_) => println!("No event received from {}", provider),
        Err(err) => eprintln!("{}", err),
    }
    controller.stop().unwrap(); // This is not required, as it will automatically be stopped on Drop
    println!("Flushed: {:?}", controller.query_statistics());

    let target = PathBuf::from(unquote(&controller.target_file_path()));
    let mut runner = ConversionRunner::new(collector);
    runner.start_convert(&target, target.with_extension("txt"));
    while !runner.is_finished() {
        println!("{:?}", runner.status());
        std::thread::sleep(Duration::from_millis(500));
    }
    println!("{:?}", runner.status());
    if let Some(err) = runner.take_error() {
        eprintln!("{}", err);
    }
}

#[cfg(not(windows))]
fn main() {
    eprintln!("The native tracer is only available on Windows");
}
