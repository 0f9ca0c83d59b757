use super::logrecord::Logrecord;
use chrono::Local;
use colored::*;
use glob::glob;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Level 0, very verbose diagnostics.
pub const SILLY: i64 = 0;
/// Level 1, execution flow.
pub const TRACE: i64 = 1;
/// Level 2, internal detail.
pub const DEBUG: i64 = 2;
/// Level 3, normal progress.
pub const INFO: i64 = 3;
/// Level 4, unusual but recoverable.
pub const WARN: i64 = 4;
/// Level 5, an operation failed.
pub const ERROR: i64 = 5;
/// Level 6, the process cannot continue.
pub const FATAL: i64 = 6;

/// Parses a level name (`trace`, `debug`, `info`, `warn`, `error`, `fatal`,
/// `critical`, `silly`) into its numeric level.
pub fn parse_level(name: &str) -> Option<i64> {
    match name.trim().to_lowercase().as_str() {
        "silly" => Some(SILLY),
        "trace" => Some(TRACE),
        "debug" => Some(DEBUG),
        "info" => Some(INFO),
        "warn" | "warning" => Some(WARN),
        "error" => Some(ERROR),
        "fatal" | "critical" => Some(FATAL),
        _ => None,
    }
}

/// Every level from `min` up to `FATAL`, the shape `LoggerLocalOptions` expects.
pub fn levels_from(min: i64) -> Vec<i64> {
    (min.clamp(SILLY, FATAL)..=FATAL).rev().collect()
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
/// # Logger Local Options
///
/// Controls where and how log messages are output.
pub struct LoggerLocalOptions {
    /// A list of log levels that should be printed to the TTY (console).
    pub use_tty: Option<Vec<i64>>,
    /// A list of log levels that should be written to a log file.
    pub use_file: Option<Vec<i64>>,
    /// The directory where log files should be stored. If `None`, defaults to `./logs`.
    pub log_dir: Option<PathBuf>,
    /// Keep every rendered line in memory, readable through `LoggerLocal::captured`.
    pub capture: bool,
}

impl LoggerLocalOptions {
    /// TTY output for every level at or above `min`, no file.
    pub fn tty(min: i64) -> Self {
        Self {
            use_tty: Some(levels_from(min)),
            ..Default::default()
        }
    }

    /// No TTY and no file; every line is kept in memory.
    pub fn capture_only() -> Self {
        Self {
            capture: true,
            ..Default::default()
        }
    }
}

/// # Logger Local
///
/// The observability sink handed to every component as `Arc<LoggerLocal>`.
/// There is no process-wide logger; whoever needs to log receives one.
pub struct LoggerLocal {
    /// The name of the application associated with this logger instance.
    app_name: String,
    /// Configuration options determining logging behavior.
    options: LoggerLocalOptions,
    /// The path to the currently active log file, if file logging is enabled.
    current_log_file: Option<PathBuf>,
    /// Serializes appends so concurrent tasks never interleave lines.
    file_mutex: Mutex<()>,
    /// Rendered lines, when `capture` is on.
    captured: std::sync::Mutex<Vec<String>>,
}

impl LoggerLocal {
    /// Rotates log files for a given application and log directory.
    ///
    /// Keeps only the most recent log file (by the timestamp in its name) and
    /// deletes older ones.
    fn rotate_logs(app_name: &str, log_dir: &Path) {
        let pattern = format!("{}/{}-*.log", log_dir.display(), app_name);
        let entries = match glob(&pattern) {
            Ok(entries) => entries,
            Err(e) => {
                eprintln!("Invalid log rotation pattern {}: {}", pattern, e);
                return;
            }
        };
        let mut log_files: Vec<PathBuf> = entries.filter_map(Result::ok).collect();

        // Newest first.
        log_files.sort_by(|a, b| b.file_name().cmp(&a.file_name()));

        for old_file in log_files.iter().skip(1) {
            if let Err(e) = std::fs::remove_file(old_file) {
                eprintln!("Error deleting old log file {}: {}", old_file.display(), e);
            }
        }
    }

    /// Creates a new `LoggerLocal` instance.
    ///
    /// If file logging is enabled, it ensures the log directory exists,
    /// rotates old logs, and sets up the current log file path.
    ///
    /// # Arguments
    /// * `app_name` - The name of the application using this logger.
    /// * `options` - Optional `LoggerLocalOptions`. If `None`, TTY output for
    ///   info and above is used.
    pub fn new(app_name: String, options: Option<LoggerLocalOptions>) -> Self {
        let opts = options.unwrap_or_else(|| LoggerLocalOptions::tty(INFO));

        let mut logger = Self {
            app_name: app_name.clone(),
            options: opts,
            current_log_file: None,
            file_mutex: Mutex::new(()),
            captured: std::sync::Mutex::new(Vec::new()),
        };

        if logger.options.use_file.is_some() {
            let log_base_dir = logger
                .options
                .log_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("./logs"));

            if let Err(e) = std::fs::create_dir_all(&log_base_dir) {
                eprintln!("Error creating log directory {}: {}", log_base_dir.display(), e);
            }

            LoggerLocal::rotate_logs(&app_name, &log_base_dir);

            let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
            let current_log_filename = format!("{}-{}.log", app_name, timestamp);
            logger.current_log_file = Some(log_base_dir.join(current_log_filename));
        }

        logger
    }

    /// The file this logger appends to, if any.
    pub fn log_file(&self) -> Option<&Path> {
        self.current_log_file.as_deref()
    }

    /// Lines rendered so far when capture is enabled.
    pub fn captured(&self) -> Vec<String> {
        self.captured
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Emits a structured record at `log_level`.
    pub async fn event(&self, log_level: i64, mut record: Logrecord) {
        record.loglevel = log_level;
        record.app.name = self.app_name.clone();
        let text = record.text();

        if let Some(tty_levels) = &self.options.use_tty {
            if tty_levels.contains(&log_level) {
                let ts = record.rfc9557.as_str().truecolor(128, 128, 128);
                let app_name_colored = format!("[{}]", self.app_name).truecolor(128, 128, 128);
                let plain = text.as_str();
                let colored_message = match log_level {
                    FATAL => plain.bright_white().on_bright_red(),
                    ERROR => plain.bright_red(),
                    WARN => plain.bright_yellow(),
                    INFO => plain.bright_green(),
                    DEBUG => plain.bright_white(),
                    TRACE => plain.bright_cyan(),
                    _ => plain.blue(),
                };

                println!("{}{}\n{}", ts, app_name_colored, colored_message);
                if record.has_tags() {
                    if let Ok(tags_str) = serde_json::to_string(&record.tags) {
                        println!("{}{}{}", ts, app_name_colored, tags_str.truecolor(128, 128, 128));
                    }
                }
            }
        }

        let mut line = format!("{} [{}] {}", record.rfc9557, self.app_name, text);
        if record.has_tags() {
            if let Ok(tags_str) = serde_json::to_string(&record.tags) {
                line.push(' ');
                line.push_str(&tags_str);
            }
        }

        if let Some(file_levels) = &self.options.use_file {
            if file_levels.contains(&log_level) {
                if let Some(log_file_path) = &self.current_log_file {
                    let _guard = self.file_mutex.lock().await;
                    let written = OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(log_file_path)
                        .and_then(|mut file| writeln!(file, "{}", line));
                    if let Err(e) = written {
                        eprintln!("Error writing log file {}: {}", log_file_path.display(), e);
                    }
                }
            }
        }

        if self.options.capture {
            if let Ok(mut lines) = self.captured.lock() {
                lines.push(line);
            }
        }
    }

    /// Logs a free-form message with optional structured extras.
    ///
    /// # Arguments
    /// * `log_level` - The numeric log level (0 silly .. 6 fatal).
    /// * `log_message` - The main message string to be logged.
    /// * `log_extras` - Additional structured data to include in the log.
    pub async fn log(&self, log_level: i64, log_message: &str, log_extras: Option<Value>) {
        let mut record = Logrecord::default();
        record.message.text = log_message.to_string();
        if let Some(extras) = log_extras {
            record.tags = extras;
        }
        self.event(log_level, record).await;
    }

    /// Logs a message at the "Debug" (level 2) log level.
    pub async fn debug(&self, log_message: &str, log_extras: Option<Value>) {
        self.log(DEBUG, log_message, log_extras).await;
    }

    /// Logs a message at the "Info" (level 3) log level.
    pub async fn info(&self, log_message: &str, log_extras: Option<Value>) {
        self.log(INFO, log_message, log_extras).await;
    }

    /// Logs a message at the "Warn" (level 4) log level.
    pub async fn warn(&self, log_message: &str, log_extras: Option<Value>) {
        self.log(WARN, log_message, log_extras).await;
    }

    /// Logs a message at the "Error" (level 5) log level.
    pub async fn error(&self, log_message: &str, log_extras: Option<Value>) {
        self.log(ERROR, log_message, log_extras).await;
    }

    /// Logs a message at the "Fatal" (level 6) log level.
    pub async fn fatal(&self, log_message: &str, log_extras: Option<Value>) {
        self.log(FATAL, log_message, log_extras).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_parse_level_names() {
        assert_eq!(parse_level("DEBUG"), Some(DEBUG));
        assert_eq!(parse_level("critical"), Some(FATAL));
        assert_eq!(parse_level("loud"), None);
        assert_eq!(levels_from(WARN), vec![6, 5, 4]);
    }

    #[tokio::test]
    async fn test_capture_keeps_rendered_lines() {
        let logger = LoggerLocal::new("capture".to_string(), Some(LoggerLocalOptions::capture_only()));
        logger
            .event(INFO, Logrecord::action("connect", "success").field("client_id", "1"))
            .await;
        logger.warn("plain text", Some(serde_json::json!({"code": 101}))).await;

        let lines = logger.captured();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[capture] action: connect | result: success | client_id: 1"));
        assert!(lines[1].contains("plain text"));
        assert!(lines[1].contains(r#""code":101"#));
    }

    #[tokio::test]
    async fn test_file_output_and_rotation() {
        let temp_dir = tempdir().expect("Failed to create temporary directory");
        let log_dir_path = temp_dir.path().to_path_buf();

        // Two files from previous runs: rotation keeps only the newer one.
        fs::write(log_dir_path.join("agency-20000101_000000.log"), "oldest\n").unwrap();
        fs::write(log_dir_path.join("agency-20000102_000000.log"), "previous\n").unwrap();

        let options = LoggerLocalOptions {
            use_tty: None,
            use_file: Some(levels_from(SILLY)),
            log_dir: Some(log_dir_path.clone()),
            capture: false,
        };
        let logger = LoggerLocal::new("agency".to_string(), Some(options));
        logger.info("This is an info message", None).await;
        logger.error("This is an error message", None).await;

        let contents = fs::read_to_string(logger.log_file().unwrap()).unwrap();
        assert!(contents.contains("This is an info message"));
        assert!(contents.contains("This is an error message"));

        assert!(!log_dir_path.join("agency-20000101_000000.log").exists());
        assert!(log_dir_path.join("agency-20000102_000000.log").exists());
        let remaining: Vec<_> = fs::read_dir(&log_dir_path).unwrap().filter_map(Result::ok).collect();
        assert_eq!(remaining.len(), 2, "Log rotation failed");
    }

    #[tokio::test]
    async fn test_file_levels_filter() {
        let temp_dir = tempdir().unwrap();
        let options = LoggerLocalOptions {
            use_tty: None,
            use_file: Some(levels_from(WARN)),
            log_dir: Some(temp_dir.path().to_path_buf()),
            capture: false,
        };
        let logger = LoggerLocal::new("filtered".to_string(), Some(options));
        logger.debug("hidden", None).await;
        logger.warn("shown", None).await;

        let contents = fs::read_to_string(logger.log_file().unwrap()).unwrap();
        assert!(!contents.contains("hidden"));
        assert!(contents.contains("shown"));
    }
}
