use clap::Parser;
use lib_lottery::loggers::loggerlocal::parse_level;
use lib_lottery::{AckPolicy, ConnectionOptions, Delimiter, SessionConfig, SessionError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Lottery agency client: submits bets in batches, then queries its winners", version)]
#[serde(default)]
pub struct Config {
    #[clap(long, env = "CLI_ID", help = "Agency identifier.")]
    pub id: Option<String>,

    #[clap(long, env = "CLI_SERVER_ADDRESS", help = "Aggregator address as host:port.")]
    pub server_address: Option<String>,

    #[clap(long, env = "CLI_CONFIG_PATH", help = "Path to the YAML configuration file.")]
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "CLI_BATCH_MAXAMOUNT", help = "Maximum number of bets per batch.")]
    pub batch_max_amount: Option<usize>,

    #[clap(long, env = "CLI_LOOP_PERIOD", help = "Pause between batches, in milliseconds.")]
    pub loop_period_ms: Option<u64>,

    #[clap(long, env = "CLI_DELIMITER", help = "Field delimiter on the wire ('#' or '|').")]
    pub delimiter: Option<Delimiter>,

    #[clap(long, env = "CLI_ACK_POLICY", help = "Batch acknowledgment: 'await' or 'fire-and-forget'.")]
    pub ack_policy: Option<AckPolicy>,

    #[clap(long, env = "CLI_CONNECT_TIMEOUT", help = "Connect timeout in milliseconds.")]
    pub connect_timeout_ms: Option<u64>,

    #[clap(long, env = "CLI_RESPONSE_TIMEOUT", help = "Reply timeout in milliseconds; 0 waits indefinitely.")]
    pub response_timeout_ms: Option<u64>,

    #[clap(long, env = "CLI_DATA_PATH", help = "CSV file of bets. Without it the bet is read from NOMBRE, APELLIDO, DOCUMENTO, NACIMIENTO and NUMERO.")]
    pub data_path: Option<PathBuf>,

    #[clap(long, env = "CLI_LOG_LEVEL", help = "Logging level (silly, trace, debug, info, warn, error, fatal).")]
    pub log_level: Option<String>,

    #[clap(long, env = "CLI_LOG_DIR", help = "Directory for log files. Without it logs go to the terminal only.")]
    pub log_dir: Option<PathBuf>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            id: other.id.or(self.id),
            server_address: other.server_address.or(self.server_address),
            config_path: other.config_path.or(self.config_path),
            batch_max_amount: other.batch_max_amount.or(self.batch_max_amount),
            loop_period_ms: other.loop_period_ms.or(self.loop_period_ms),
            delimiter: other.delimiter.or(self.delimiter),
            ack_policy: other.ack_policy.or(self.ack_policy),
            connect_timeout_ms: other.connect_timeout_ms.or(self.connect_timeout_ms),
            response_timeout_ms: other.response_timeout_ms.or(self.response_timeout_ms),
            data_path: other.data_path.or(self.data_path),
            log_level: other.log_level.or(self.log_level),
            log_dir: other.log_dir.or(self.log_dir),
        }
    }

    fn defaults() -> Config {
        Config {
            batch_max_amount: Some(100),
            loop_period_ms: Some(0),
            delimiter: Some(Delimiter::Hash),
            ack_policy: Some(AckPolicy::Await),
            connect_timeout_ms: Some(5000),
            response_timeout_ms: Some(30000),
            log_level: Some("info".to_string()),
            ..Default::default()
        }
    }
}

/// # Settings
///
/// The validated, typed form of `Config`.
#[derive(Debug, Clone)]
pub struct Settings {
    pub session: SessionConfig,
    pub data_path: Option<PathBuf>,
    pub log_level: i64,
    pub log_dir: Option<PathBuf>,
}

impl TryFrom<Config> for Settings {
    type Error = SessionError;

    fn try_from(config: Config) -> Result<Self, Self::Error> {
        let agency = config
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| SessionError::InvalidConfig("id (CLI_ID) is required".to_string()))?;
        let server_address = config
            .server_address
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| {
                SessionError::InvalidConfig("server_address (CLI_SERVER_ADDRESS) is required".to_string())
            })?;

        let level_name = config.log_level.unwrap_or_else(|| "info".to_string());
        let log_level = parse_level(&level_name)
            .ok_or_else(|| SessionError::InvalidConfig(format!("unknown log level '{}'", level_name)))?;

        let mut session = SessionConfig::new(agency.trim(), server_address.trim());
        session.batch_max_amount = config.batch_max_amount.unwrap_or(session.batch_max_amount);
        session.loop_period = Duration::from_millis(config.loop_period_ms.unwrap_or(0));
        session.delimiter = config.delimiter.unwrap_or_default();
        session.ack_policy = config.ack_policy.unwrap_or_default();
        session.connection = ConnectionOptions {
            connect_timeout: Duration::from_millis(config.connect_timeout_ms.unwrap_or(5000)),
            response_timeout: config
                .response_timeout_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
        };
        session.validate()?;

        Ok(Settings {
            session,
            data_path: config.data_path,
            log_level,
            log_dir: config.log_dir,
        })
    }
}

/// Reads the YAML file at `path`. `Ok(None)` when it does not exist.
fn read_config_file(path: &Path) -> anyhow::Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)?;
    let parsed: Config = serde_yml::from_str(&text)?;
    Ok(Some(parsed))
}

/// Layers defaults, the YAML file and `cli` (which already folds in the
/// environment). Returns the merged config and notes worth logging once a
/// logger exists.
pub fn load_config(cli: Config) -> (Config, Vec<String>) {
    let mut notes = Vec::new();

    // 1. Load defaults
    let mut current_config = Config::defaults();

    // 2. Load from the config file if present
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    match read_config_file(&config_file_path) {
        Ok(Some(file_config)) => {
            current_config = current_config.merge(file_config);
            notes.push(format!("Loaded config file {}", config_file_path.display()));
        }
        Ok(None) => notes.push(format!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            config_file_path.display()
        )),
        Err(e) => notes.push(format!(
            "Failed to load config file {}: {}. Falling back to other sources.",
            config_file_path.display(),
            e
        )),
    }

    // 3. Override with environment variables and CLI arguments
    current_config = current_config.merge(cli);

    (current_config, notes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_lottery::loggers::loggerlocal::INFO;
    use std::io::Write;

    /// What clap would hand over for `--config-path <path>` alone.
    fn cli_with_file(path: &Path) -> Config {
        Config {
            config_path: Some(path.to_path_buf()),
            ..Config::default()
        }
    }

    fn absent_file() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        (dir, path)
    }

    #[test]
    fn test_cli_overrides_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "id: \"7\"").unwrap();
        writeln!(file, "server_address: \"server:12345\"").unwrap();
        writeln!(file, "batch_max_amount: 20").unwrap();
        writeln!(file, "ack_policy: fire-and-forget").unwrap();

        let cli = Config {
            batch_max_amount: Some(5),
            ..cli_with_file(file.path())
        };
        let (config, notes) = load_config(cli);
        assert!(notes[0].starts_with("Loaded config file"));

        let settings = Settings::try_from(config).unwrap();
        assert_eq!(settings.session.agency, "7");
        assert_eq!(settings.session.server_address, "server:12345");
        assert_eq!(settings.session.batch_max_amount, 5);
        assert_eq!(settings.session.ack_policy, AckPolicy::FireAndForget);
        assert_eq!(settings.session.delimiter, Delimiter::Hash);
        assert_eq!(settings.session.connection.connect_timeout, Duration::from_millis(5000));
        assert_eq!(settings.session.connection.response_timeout, Some(Duration::from_millis(30000)));
        assert_eq!(settings.log_level, INFO);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let (_dir, path) = absent_file();
        let cli = Config {
            id: Some("2".to_string()),
            server_address: Some("127.0.0.1:12345".to_string()),
            delimiter: Some(Delimiter::Pipe),
            loop_period_ms: Some(250),
            ..cli_with_file(&path)
        };
        let (config, notes) = load_config(cli);
        assert!(notes[0].starts_with("Config file not found"));

        let settings = Settings::try_from(config).unwrap();
        assert_eq!(settings.session.batch_max_amount, 100);
        assert_eq!(settings.session.delimiter, Delimiter::Pipe);
        assert_eq!(settings.session.loop_period, Duration::from_millis(250));
        assert!(settings.data_path.is_none());
    }

    #[test]
    fn test_zero_response_timeout_waits_indefinitely() {
        let (_dir, path) = absent_file();
        let base = Config {
            id: Some("1".to_string()),
            server_address: Some("x:1".to_string()),
            ..cli_with_file(&path)
        };

        let (config, _) = load_config(Config {
            response_timeout_ms: Some(0),
            ..base.clone()
        });
        let settings = Settings::try_from(config).unwrap();
        assert_eq!(settings.session.connection.response_timeout, None);

        let (config, _) = load_config(Config {
            response_timeout_ms: Some(750),
            ..base
        });
        let settings = Settings::try_from(config).unwrap();
        assert_eq!(settings.session.connection.response_timeout, Some(Duration::from_millis(750)));
    }

    #[test]
    fn test_validation_errors_are_invalid_config() {
        let (_dir, path) = absent_file();
        let valid = Config {
            id: Some("1".to_string()),
            server_address: Some("x:1".to_string()),
            ..cli_with_file(&path)
        };

        let (config, _) = load_config(Config {
            id: None,
            ..valid.clone()
        });
        assert!(matches!(Settings::try_from(config), Err(SessionError::InvalidConfig(_))));

        let (config, _) = load_config(Config {
            batch_max_amount: Some(0),
            ..valid.clone()
        });
        assert!(matches!(Settings::try_from(config), Err(SessionError::InvalidConfig(_))));

        let (config, _) = load_config(Config {
            log_level: Some("chatty".to_string()),
            ..valid
        });
        assert!(matches!(Settings::try_from(config), Err(SessionError::InvalidConfig(_))));
    }

    #[test]
    fn test_broken_yaml_is_noted_not_fatal() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "batch_max_amount: [not, a, number]").unwrap();

        let (config, notes) = load_config(cli_with_file(file.path()));
        assert!(notes[0].starts_with("Failed to load config file"));
        assert_eq!(config.batch_max_amount, Some(100));
    }

    #[test]
    fn test_explicit_flags_parse_into_config() {
        // Every env-backed key is passed as a flag, so no CLI_* variable in the
        // test environment can leak in.
        let config = Config::try_parse_from([
            "bet_client",
            "--id",
            "3",
            "--server-address",
            "server:12345",
            "--config-path",
            "client.yaml",
            "--batch-max-amount",
            "8",
            "--loop-period-ms",
            "10",
            "--delimiter",
            "|",
            "--ack-policy",
            "fire-and-forget",
            "--connect-timeout-ms",
            "100",
            "--response-timeout-ms",
            "200",
            "--data-path",
            "bets.csv",
            "--log-level",
            "debug",
            "--log-dir",
            "logs",
        ])
        .unwrap();
        assert_eq!(config.id.as_deref(), Some("3"));
        assert_eq!(config.delimiter, Some(Delimiter::Pipe));
        assert_eq!(config.ack_policy, Some(AckPolicy::FireAndForget));
        assert_eq!(config.response_timeout_ms, Some(200));
        assert_eq!(config.data_path, Some(PathBuf::from("bets.csv")));
    }
}
