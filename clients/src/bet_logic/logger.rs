use lib_lottery::loggers::loggerlocal::levels_from;
use lib_lottery::{LoggerLocal, LoggerLocalOptions};
use std::path::Path;

pub const APP_NAME: &str = "bet_client";

/// Terminal output from `min_level` up, plus a rotated log file when
/// `log_dir` is set.
pub fn setup_logging(log_dir: Option<&Path>, min_level: i64) -> LoggerLocal {
    let levels = levels_from(min_level);
    let options = LoggerLocalOptions {
        use_tty: Some(levels.clone()),
        use_file: log_dir.map(|_| levels),
        log_dir: log_dir.map(Path::to_path_buf),
        capture: false,
    };
    LoggerLocal::new(APP_NAME.to_string(), Some(options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_lottery::loggers::loggerlocal::WARN;

    #[test]
    fn test_file_logging_only_with_log_dir() {
        assert!(setup_logging(None, WARN).log_file().is_none());

        let dir = tempfile::tempdir().unwrap();
        let logger = setup_logging(Some(dir.path()), WARN);
        let file = logger.log_file().unwrap();
        assert!(file.starts_with(dir.path()));
        assert!(file.file_name().unwrap().to_string_lossy().starts_with("bet_client-"));
    }
}
