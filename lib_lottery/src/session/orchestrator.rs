//! # Session Orchestrator
//!
//! Drives one agency through the three protocol phases. All exchanges are
//! awaited in sequence, so at most one `Connection` is open at any time and it
//! is closed before the next one is opened.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::batch::{BatchEnvelope, BatchScheduler};
use crate::errors::{ProtocolError, SessionError, TransportError};
use crate::loggers::loggerlocal::{LoggerLocal, DEBUG, ERROR, INFO, WARN};
use crate::loggers::logrecord::Logrecord;
use crate::protocol::bet::BET_SOURCE_FIELDS;
use crate::protocol::{BetRecord, FrameCodec, Response, WireMessage};
use crate::session::{Phase, SessionConfig, SessionOutcome, SessionReport};
use crate::source::RecordSource;
use crate::transport::Connection;

/// How a phase handed control back to `run`.
enum Flow {
    Continue,
    Interrupted,
}

/// # Session
///
/// One agency run against one aggregator.
pub struct Session<S: RecordSource> {
    config: SessionConfig,
    codec: FrameCodec,
    scheduler: BatchScheduler,
    source: S,
    cancel: CancellationToken,
    logger: Arc<LoggerLocal>,
    phase: Phase,
    report: SessionReport,
}

impl<S: RecordSource> Session<S> {
    /// Validates `config`; nothing touches the network here.
    pub fn new(
        config: SessionConfig,
        source: S,
        cancel: CancellationToken,
        logger: Arc<LoggerLocal>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let scheduler = BatchScheduler::new(config.batch_max_amount, config.loop_period)?;
        let report = SessionReport {
            agency: config.agency.clone(),
            ..SessionReport::default()
        };
        Ok(Self {
            codec: FrameCodec::new(config.delimiter),
            config,
            scheduler,
            source,
            cancel,
            logger,
            phase: Phase::Init,
            report,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn report(&self) -> &SessionReport {
        &self.report
    }

    pub fn agency(&self) -> &str {
        &self.config.agency
    }

    /// Runs the session to `DONE`, to the first failure (`FAILED`), or until
    /// shutdown (`INTERRUPTED`).
    ///
    /// A session runs once; calling `run` again after a terminal phase is a
    /// configuration error.
    pub async fn run(&mut self) -> Result<SessionOutcome, SessionError> {
        if self.phase != Phase::Init {
            return Err(SessionError::InvalidConfig(format!(
                "session for agency {} already ran (phase {})",
                self.config.agency, self.phase
            )));
        }

        match self.drive().await {
            Ok(Flow::Continue) => {
                self.transition(Phase::Done).await;
                self.logger
                    .event(
                        INFO,
                        Logrecord::action("loop_finished", "success")
                            .field("client_id", &self.config.agency)
                            .tags(serde_json::to_value(&self.report).unwrap_or_default()),
                    )
                    .await;
                Ok(SessionOutcome::Completed(self.report.clone()))
            }
            Ok(Flow::Interrupted) => Ok(self.interrupted().await),
            Err(e) if e.is_cancelled() => Ok(self.interrupted().await),
            Err(e) => {
                self.logger
                    .event(
                        ERROR,
                        Logrecord::action("phase_transition", "fail")
                            .field("client_id", &self.config.agency)
                            .field("from", self.phase)
                            .field("to", Phase::Failed)
                            .field("error", &e),
                    )
                    .await;
                self.phase = Phase::Failed;
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> Result<Flow, SessionError> {
        // --- Phase 1: obtain records, then batches ---
        let bets = self.load_records().await?;
        if let Flow::Interrupted = self.enter(Phase::SendingBatches).await {
            return Ok(Flow::Interrupted);
        }
        let envelopes = self.scheduler.schedule(bets);
        for envelope in &envelopes {
            if let Flow::Interrupted = self.send_envelope(envelope).await? {
                return Ok(Flow::Interrupted);
            }
        }

        // --- Phase 2: finish notification ---
        if let Flow::Interrupted = self.enter(Phase::NotifyingFinish).await {
            return Ok(Flow::Interrupted);
        }
        self.notify_finish().await?;

        // --- Phase 3: winners query ---
        if let Flow::Interrupted = self.enter(Phase::QueryingWinners).await {
            return Ok(Flow::Interrupted);
        }
        self.query_winners().await?;

        Ok(Flow::Continue)
    }

    async fn load_records(&mut self) -> Result<Vec<BetRecord>, SessionError> {
        let agency = self.config.agency.clone();
        let rows = self
            .source
            .records()
            .map_err(|e| SessionError::SourceUnavailable {
                agency: agency.clone(),
                reason: e.to_string(),
            })?;

        let mut bets = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            match BetRecord::from_fields(&agency, row) {
                Some(bet) => bets.push(bet),
                None => {
                    self.report.records_skipped += 1;
                    self.logger
                        .event(
                            WARN,
                            Logrecord::action("record_skipped", "success")
                                .field("client_id", &agency)
                                .field("index", index)
                                .field("fields", row.len())
                                .field("expected", BET_SOURCE_FIELDS),
                        )
                        .await;
                }
            }
        }

        if bets.is_empty() {
            return Err(SessionError::SourceUnavailable {
                agency,
                reason: format!("{} produced no valid records", self.source.describe()),
            });
        }
        Ok(bets)
    }

    /// Moves to `next` unless shutdown was requested first.
    async fn enter(&mut self, next: Phase) -> Flow {
        if self.cancel.is_cancelled() {
            return Flow::Interrupted;
        }
        self.transition(next).await;
        Flow::Continue
    }

    async fn transition(&mut self, next: Phase) {
        self.logger
            .event(
                DEBUG,
                Logrecord::action("phase_transition", "success")
                    .field("client_id", &self.config.agency)
                    .field("from", self.phase)
                    .field("to", next),
            )
            .await;
        self.phase = next;
    }

    /// Records where shutdown hit and parks the session in `INTERRUPTED`.
    async fn interrupted(&mut self) -> SessionOutcome {
        self.report.interrupted_in = Some(self.phase);
        self.logger
            .event(
                INFO,
                Logrecord::action("shutdown", "success")
                    .field("client_id", &self.config.agency)
                    .field("phase", self.phase),
            )
            .await;
        self.phase = Phase::Interrupted;
        SessionOutcome::Interrupted(self.report.clone())
    }

    async fn send_envelope(&mut self, envelope: &BatchEnvelope) -> Result<Flow, SessionError> {
        if self.cancel.is_cancelled() {
            return Ok(Flow::Interrupted);
        }
        let message = self.codec.encode_batch(&envelope.records);
        if message.is_empty() {
            return Ok(Flow::Continue);
        }

        let awaits_reply = self.config.ack_policy.awaits_reply();
        let reply = self.exchange(Phase::SendingBatches, &message, awaits_reply).await?;
        if let Some(line) = reply {
            match self.decode(Phase::SendingBatches, &line)? {
                Response::Ok => {}
                _ => {
                    self.logger
                        .event(
                            ERROR,
                            Logrecord::action("batch_sent", "fail")
                                .field("client_id", &self.config.agency)
                                .field("batch", envelope.sequence)
                                .field("reply", &line),
                        )
                        .await;
                    return Err(SessionError::BatchRejected {
                        agency: self.config.agency.clone(),
                        batch: envelope.sequence,
                        reply: line,
                    });
                }
            }
        }

        self.report.batches_delivered += 1;
        self.report.bets_delivered += envelope.len();
        self.logger
            .event(
                INFO,
                Logrecord::action("batch_sent", "success")
                    .field("client_id", &self.config.agency)
                    .field("batch", envelope.sequence)
                    .field("cantidad", envelope.len()),
            )
            .await;

        match self
            .scheduler
            .pace(envelope, &self.config.agency, &self.cancel, &self.logger)
            .await
        {
            None => Ok(Flow::Interrupted),
            Some(paused) => {
                if paused {
                    self.report.pacing_pauses += 1;
                }
                Ok(Flow::Continue)
            }
        }
    }

    async fn notify_finish(&mut self) -> Result<(), SessionError> {
        let message = self.codec.encode_finish(&self.config.agency);
        let line = self.request(Phase::NotifyingFinish, &message).await?;
        match self.decode(Phase::NotifyingFinish, &line)? {
            Response::Ok => {
                self.report.finish_acknowledged = true;
                self.logger
                    .event(
                        INFO,
                        Logrecord::action("finish_bets", "success").field("client_id", &self.config.agency),
                    )
                    .await;
                Ok(())
            }
            _ => Err(SessionError::FinishRejected {
                agency: self.config.agency.clone(),
                reply: line,
            }),
        }
    }

    async fn query_winners(&mut self) -> Result<(), SessionError> {
        let message = self.codec.encode_query(&self.config.agency);
        let line = self.request(Phase::QueryingWinners, &message).await?;
        match self.decode(Phase::QueryingWinners, &line)? {
            Response::Winners { count, documents } => {
                self.logger
                    .event(
                        INFO,
                        Logrecord::action("consulta_ganadores", "success")
                            .field("client_id", &self.config.agency)
                            .field("cant_ganadores", count),
                    )
                    .await;
                self.report.winners = Some(count);
                self.report.winner_documents = documents;
                Ok(())
            }
            _ => Err(SessionError::QueryRejected {
                agency: self.config.agency.clone(),
                reply: line,
            }),
        }
    }

    /// An exchange that always reads a reply.
    async fn request(&self, phase: Phase, message: &WireMessage) -> Result<String, SessionError> {
        match self.exchange(phase, message, true).await? {
            Some(line) => Ok(line),
            None => Err(self.transport_error(
                phase,
                TransportError::Closed(self.config.server_address.clone()),
            )),
        }
    }

    /// Opens a fresh connection, sends `message`, optionally reads one line,
    /// and closes the connection whatever happened.
    async fn exchange(
        &self,
        phase: Phase,
        message: &WireMessage,
        expect_reply: bool,
    ) -> Result<Option<String>, SessionError> {
        let mut connection = Connection::open(
            &self.config.server_address,
            &self.config.agency,
            &self.config.connection,
            self.cancel.clone(),
            self.logger.clone(),
        )
        .await
        .map_err(|e| self.transport_error(phase, e))?;

        let outcome = match connection.send_all(message.as_bytes()).await {
            Ok(()) if expect_reply => connection.receive_line().await.map(Some),
            Ok(()) => Ok(None),
            Err(e) => Err(e),
        };
        connection.close().await;

        outcome.map_err(|e| self.transport_error(phase, e))
    }

    fn decode(&self, phase: Phase, line: &str) -> Result<Response, SessionError> {
        self.codec
            .decode_response(line)
            .map_err(|source: ProtocolError| SessionError::MalformedResponse {
                agency: self.config.agency.clone(),
                phase,
                source,
            })
    }

    fn transport_error(&self, phase: Phase, source: TransportError) -> SessionError {
        SessionError::Transport {
            agency: self.config.agency.clone(),
            phase,
            source,
        }
    }
}
