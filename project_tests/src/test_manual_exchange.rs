//! Sends a single FINISH_BETS and/or QUERY_WINNERS frame to an aggregator and
//! prints the raw reply and how it decodes.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use lib_lottery::{Connection, ConnectionOptions, Delimiter, FrameCodec, LoggerLocal, WireMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Exchange {
    Finish,
    Query,
    Both,
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Aggregator address
    #[clap(short, long, default_value = "127.0.0.1:12345")]
    address: String,

    /// Agency to announce
    #[clap(short = 'i', long, default_value = "1")]
    agency: String,

    /// Field delimiter ('#' or '|')
    #[clap(short, long, default_value = "#")]
    delimiter: Delimiter,

    /// Which frame(s) to send
    #[clap(short, long, value_enum, default_value_t = Exchange::Both)]
    frames: Exchange,
}

async fn send_one(args: &Args, message: &WireMessage, logger: Arc<LoggerLocal>) -> Result<String> {
    let options = ConnectionOptions {
        response_timeout: Some(Duration::from_secs(5)),
        ..ConnectionOptions::default()
    };
    let mut connection =
        Connection::open(&args.address, &args.agency, &options, CancellationToken::new(), logger).await?;
    let outcome = match connection.send_all(message.as_bytes()).await {
        Ok(()) => connection.receive_line().await,
        Err(e) => Err(e),
    };
    connection.close().await;
    Ok(outcome?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let logger = Arc::new(LoggerLocal::new("test_manual_exchange".to_string(), None));
    let codec = FrameCodec::new(args.delimiter);

    let mut messages = Vec::new();
    if matches!(args.frames, Exchange::Finish | Exchange::Both) {
        messages.push(codec.encode_finish(&args.agency));
    }
    if matches!(args.frames, Exchange::Query | Exchange::Both) {
        messages.push(codec.encode_query(&args.agency));
    }

    for (index, message) in messages.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        println!("=== Test {} ===", message.tag());
        println!("Sending: {:?}", message.as_str());
        match send_one(&args, message, logger.clone()).await {
            Ok(reply) => {
                println!("Reply: {:?}", reply);
                match codec.decode_response(&reply) {
                    Ok(decoded) => println!("Decoded: {:?}", decoded),
                    Err(e) => println!("Decoded: {}", e),
                }
            }
            Err(e) => println!("Error: {:#}", e),
        }
    }
    Ok(())
}
