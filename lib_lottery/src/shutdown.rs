//! # Shutdown Supervisor
//!
//! Turns SIGINT (CTRL+C) and, on UNIX, SIGTERM into a cancelled
//! `CancellationToken`. The session and its connections hold clones of the
//! token and race every await point against it, so a pending connect, write,
//! read or pacing sleep returns immediately and the open connection is closed
//! by its owner. The supervisor itself never touches protocol state.

use std::future::Future;
use std::io;
use std::sync::Arc;

use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::loggers::loggerlocal::{LoggerLocal, ERROR, INFO};
use crate::loggers::logrecord::Logrecord;

/// # ShutdownSupervisor
///
/// Owns the root cancellation token of a process.
#[derive(Clone)]
pub struct ShutdownSupervisor {
    token: CancellationToken,
    agency: String,
    logger: Arc<LoggerLocal>,
}

impl ShutdownSupervisor {
    pub fn new(agency: impl Into<String>, logger: Arc<LoggerLocal>) -> Self {
        Self {
            token: CancellationToken::new(),
            agency: agency.into(),
            logger,
        }
    }

    /// A handle observed by the session. Cancelling it is the shutdown request.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Requests shutdown without an OS signal. Idempotent.
    pub async fn trigger(&self, reason: &str) {
        if self.token.is_cancelled() {
            return;
        }
        self.token.cancel();
        self.logger
            .event(
                INFO,
                Logrecord::action("shutdown_requested", "success")
                    .field("client_id", &self.agency)
                    .field("reason", reason),
            )
            .await;
    }

    /// Spawns the listener task. It ends when a signal arrives or when the
    /// token is cancelled by someone else.
    pub fn install(&self) -> JoinHandle<()> {
        let supervisor = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = supervisor.token.cancelled() => {}
                name = supervisor.first_signal(signal::ctrl_c(), terminate()) => {
                    supervisor
                        .logger
                        .event(
                            INFO,
                            Logrecord::action("signal_received", "success")
                                .field("client_id", &supervisor.agency)
                                .field("signal", name)
                                .field("shutdown", "graceful"),
                        )
                        .await;
                    supervisor.token.cancel();
                }
            }
        })
    }

    /// Waits for whichever of the two signal sources fires first and names it.
    ///
    /// A source that cannot be registered is logged and then never fires, so
    /// the other one is still watched.
    async fn first_signal<I, T>(&self, interrupt: I, terminate: T) -> &'static str
    where
        I: Future<Output = io::Result<()>>,
        T: Future<Output = io::Result<()>>,
    {
        tokio::select! {
            name = self.watch("SIGINT", interrupt) => name,
            name = self.watch("SIGTERM", terminate) => name,
        }
    }

    async fn watch<F>(&self, name: &'static str, source: F) -> &'static str
    where
        F: Future<Output = io::Result<()>>,
    {
        match source.await {
            Ok(()) => name,
            Err(e) => {
                self.logger
                    .event(
                        ERROR,
                        Logrecord::action("signal_register", "fail")
                            .field("client_id", &self.agency)
                            .field("signal", name)
                            .field("error", &e),
                    )
                    .await;
                std::future::pending().await
            }
        }
    }
}

/// Resolves on SIGTERM. On non-UNIX systems it never resolves.
async fn terminate() -> io::Result<()> {
    #[cfg(unix)]
    signal::unix::signal(signal::unix::SignalKind::terminate())?.recv().await;

    #[cfg(not(unix))]
    std::future::pending::<()>().await;

    Ok(())
}
