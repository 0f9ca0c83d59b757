//! A scripted aggregator for smoke runs of `bet_client`.
//!
//! Accepts one message per connection and answers with one line: `OK` for
//! batches and finish notifications, `WINNERS` for winner queries. Winners are
//! the stored bets of the querying agency whose number equals
//! `--winning-number`; an agency that has not sent FINISH_BETS yet gets
//! `ERROR:finish_pending` instead. `--reject-batch N` answers the N-th batch with a
//! rejection so the failure path can be exercised by hand.

use anyhow::{Context, Result};
use clap::Parser;
use lib_lottery::{BetRecord, Delimiter, Frame, FrameCodec, LoggerLocal};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[clap(short, long, default_value_t = 12345)]
    port: u16,

    /// Field delimiter ('#' or '|')
    #[clap(short, long, default_value = "#")]
    delimiter: Delimiter,

    /// Bets with this number win
    #[clap(short, long, default_value = "7574")]
    winning_number: String,

    /// Reject the N-th batch received (1-based)
    #[clap(long)]
    reject_batch: Option<usize>,
}

#[derive(Default)]
struct Ledger {
    bets: Vec<BetRecord>,
    batches: usize,
    finished: HashSet<String>,
}

impl Ledger {
    fn winners(&self, agency: &str, number: &str) -> Vec<String> {
        self.bets
            .iter()
            .filter(|b| b.agency == agency && b.number == number)
            .map(|b| b.document.clone())
            .collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let logger = Arc::new(LoggerLocal::new("test_aggregator_stub".to_string(), None));
    let codec = FrameCodec::new(args.delimiter);
    let ledger = Arc::new(Mutex::new(Ledger::default()));

    let listener = TcpListener::bind(("0.0.0.0", args.port))
        .await
        .with_context(|| format!("binding port {}", args.port))?;
    logger
        .info(&format!("action: server_start | result: success | port: {}", args.port), None)
        .await;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                logger.info("action: server_shutdown | result: success", None).await;
                return Ok(());
            }
            accepted = listener.accept() => {
                let (socket, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        logger.error(&format!("action: accept_connection | result: fail | error: {}", e), None).await;
                        continue;
                    }
                };
                let logger = logger.clone();
                let ledger = ledger.clone();
                let winning_number = args.winning_number.clone();
                let reject_batch = args.reject_batch;
                tokio::spawn(async move {
                    let reply = handle(socket, codec, &ledger, &winning_number, reject_batch).await;
                    match reply {
                        Ok(reply) => logger
                            .info(&format!("action: receive_message | result: success | ip: {} | reply: {}", peer, reply), None)
                            .await,
                        Err(e) => logger
                            .error(&format!("action: receive_message | result: fail | ip: {} | error: {:#}", peer, e), None)
                            .await,
                    }
                });
            }
        }
    }
}

async fn handle(
    socket: TcpStream,
    codec: FrameCodec,
    ledger: &Mutex<Ledger>,
    winning_number: &str,
    reject_batch: Option<usize>,
) -> Result<String> {
    let mut reader = BufReader::new(socket);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let reply = match codec.decode_frame(&line)? {
        Frame::BatchHeader(count) => {
            let mut bets = Vec::with_capacity(count);
            for _ in 0..count {
                let mut bet_line = String::new();
                reader.read_line(&mut bet_line).await?;
                bets.push(codec.decode_bet(&bet_line)?);
            }
            let mut ledger = ledger.lock().map_err(|_| anyhow::anyhow!("ledger poisoned"))?;
            ledger.batches += 1;
            if reject_batch == Some(ledger.batches) {
                "REJECTED:bad_document\n".to_string()
            } else {
                ledger.bets.extend(bets);
                codec.encode_ok()
            }
        }
        Frame::Bet(bet) => {
            let mut ledger = ledger.lock().map_err(|_| anyhow::anyhow!("ledger poisoned"))?;
            ledger.bets.push(bet);
            codec.encode_ok()
        }
        Frame::FinishBets(agency) => {
            let mut ledger = ledger.lock().map_err(|_| anyhow::anyhow!("ledger poisoned"))?;
            ledger.finished.insert(agency);
            codec.encode_ok()
        }
        Frame::QueryWinners(agency) => {
            let ledger = ledger.lock().map_err(|_| anyhow::anyhow!("ledger poisoned"))?;
            if ledger.finished.contains(&agency) {
                codec.encode_winners(&ledger.winners(&agency, winning_number))
            } else {
                "ERROR:finish_pending\n".to_string()
            }
        }
    };

    reader.get_mut().write_all(reply.as_bytes()).await?;
    Ok(reply.trim_end().to_string())
}

