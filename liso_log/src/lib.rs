use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

static LOG_SINK: Mutex<Option<File>> = Mutex::new(None);

/// Route log records to the given file (append, create if missing).
/// Until this is called, records go to stderr.
pub fn set_log_file(path: &Path) -> std::io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    *LOG_SINK.lock().unwrap() = Some(file);
    Ok(())
}

pub fn write_record(record: &str) {
    let mut sink = LOG_SINK.lock().unwrap();
    match sink.as_mut() {
        Some(file) => {
            let _ = writeln!(file, "{}", record);
        }
        None => eprintln!("{}", record),
    }
}

pub fn format_time(now: SystemTime) -> String {
    let duration = now.duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = duration.as_secs();

    let year = 1970 + (secs / 31_557_600); // Rough years
    let month = ((secs % 31_557_600) / 2_628_000) as u8 + 1;
    let day = ((secs % 2_628_000) / 86_400) as u8 + 1;
    let hour = ((secs % 86_400) / 3600) as u8;
    let minute = ((secs % 3600) / 60) as u8;
    let second = (secs % 60) as u8;

    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        year, month, day, hour, minute, second
    )
}

#[macro_export]
macro_rules! log {
    ($level:expr, $($arg:tt)*) => {
        $crate::write_record(&format!(
            "[{}] lisod {}: {}",
            $crate::format_time(std::time::SystemTime::now()),
            $level,
            format!($($arg)*)
        ));
    };
}

#[macro_export]
macro_rules! info { ($($arg:tt)*) => { $crate::log!("INFO ", $($arg)*); }; }
#[macro_export]
macro_rules! warn { ($($arg:tt)*) => { $crate::log!("WARN ", $($arg)*); }; }
#[macro_export]
macro_rules! errors { ($($arg:tt)*) => { $crate::log!("ERROR", $($arg)*); }; }
#[macro_export]
macro_rules! debug { ($($arg:tt)*) => { $crate::log!("DEBUG", $($arg)*); }; }
#[macro_export]
macro_rules! trace { ($($arg:tt)*) => { $crate::log!("TRACE", $($arg)*); }; }
