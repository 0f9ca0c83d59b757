use anyhow::{Context, Result};
use lib_lottery::loggers::loggerlocal::INFO;
use lib_lottery::{
    CsvRecordSource, EnvRecordSource, LoggerLocal, RecordSource, Session, SessionOutcome, ShutdownSupervisor,
};
use std::sync::Arc;

use super::config::{self, Config, Settings};
use super::logger;

/// Loads configuration, wires the session and runs it once.
///
/// Completion and signal-driven shutdown return `Ok`; any session failure
/// returns the error so the process exits non-zero.
pub async fn run(cli: Config) -> Result<()> {
    // --- Phase 1: configuration ---
    let (merged, notes) = config::load_config(cli);
    let settings = match Settings::try_from(merged) {
        Ok(settings) => settings,
        Err(e) => {
            let logger = LoggerLocal::new(logger::APP_NAME.to_string(), None);
            logger.fatal(&format!("action: config | result: fail | error: {}", e), None).await;
            return Err(e).context("invalid configuration");
        }
    };

    // --- Phase 2: logging ---
    let logger = Arc::new(logger::setup_logging(settings.log_dir.as_deref(), settings.log_level));
    for note in &notes {
        logger.debug(note, None).await;
    }
    let agency = settings.session.agency.clone();
    logger
        .info(
            &format!(
                "action: config | result: success | client_id: {} | server_address: {} | batch_max_amount: {} | loop_period: {:?} | ack_policy: {} | response_timeout: {:?}",
                agency,
                settings.session.server_address,
                settings.session.batch_max_amount,
                settings.session.loop_period,
                settings.session.ack_policy,
                settings.session.connection.response_timeout,
            ),
            None,
        )
        .await;

    // --- Phase 3: shutdown supervision ---
    let supervisor = ShutdownSupervisor::new(agency.clone(), logger.clone());
    let listener = supervisor.install();

    // --- Phase 4: the session ---
    let source: Box<dyn RecordSource> = match &settings.data_path {
        Some(path) => Box::new(CsvRecordSource::new(path.clone())),
        None => Box::new(EnvRecordSource::new()),
    };
    let result = match Session::new(settings.session, source, supervisor.token(), logger.clone()) {
        Ok(mut session) => session.run().await,
        Err(e) => Err(e),
    };
    listener.abort();

    match result {
        Ok(SessionOutcome::Completed(report)) => {
            logger
                .log(
                    INFO,
                    &format!(
                        "action: session | result: success | client_id: {} | batches: {} | bets: {} | winners: {}",
                        agency,
                        report.batches_delivered,
                        report.bets_delivered,
                        report.winners.unwrap_or(0)
                    ),
                    serde_json::to_value(&report).ok(),
                )
                .await;
            Ok(())
        }
        Ok(SessionOutcome::Interrupted(report)) => {
            let phase = report
                .interrupted_in
                .map(|p| p.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            logger
                .info(
                    &format!(
                        "action: session | result: interrupted | client_id: {} | phase: {} | shutdown: graceful",
                        agency, phase
                    ),
                    None,
                )
                .await;
            Ok(())
        }
        Err(e) => {
            logger
                .fatal(
                    &format!(
                        "action: session | result: fail | client_id: {} | phase: {} | error: {}",
                        agency,
                        e.phase(),
                        e
                    ),
                    None,
                )
                .await;
            Err(e).with_context(|| format!("agency {} session failed", agency))
        }
    }
}
