use anyhow::Result;
use log::LevelFilter;
use ringlog::{Drain, File, LogBuilder, MultiLogBuilder, Output, Stderr};
use std::path::Path;
use std::time::Duration;

/// Maximum log file size before rotation (10MB)
const LOG_FILE_MAX_SIZE: u64 = 1024 * 1024 * 10;

/// Initializes the ringlog backend for the `log` facade.
///
/// Diagnostics go to stderr by default, or to a rotating trace file when one
/// is given, keeping stdout clean for reports.
pub fn init(level: LevelFilter, trace_log: Option<&Path>) -> Result<()> {
    let output: Box<dyn Output> = if let Some(path) = trace_log {
        let backup = path.with_extension("old");
        Box::new(File::new(path.to_path_buf(), backup, LOG_FILE_MAX_SIZE)?)
    } else {
        Box::new(Stderr::new())
    };

    let log = LogBuilder::new()
        .output(output)
        .build()
        .expect("failed to initialize logger");

    let mut drain = MultiLogBuilder::new()
        .level_filter(level)
        .default(log)
        .build()
        .start();

    // The drain buffers log lines; flush it from a background thread.
    std::thread::spawn(move || {
        loop {
            let _ = drain.flush();
            std::thread::sleep(Duration::from_millis(100));
        }
    });

    Ok(())
}
