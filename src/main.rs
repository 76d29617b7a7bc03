//! CLI for chatsub
//!
//! Subcommands:
//! - `server`: run the WebSocket chat server
//! - `client`: join a topic, print its events and send stdin lines to it

use std::io::Write;
use std::sync::Arc;

use chatsub::broker::{DeliveryPolicy, EventBus};
use chatsub::client::connect;
use chatsub::config::load_config;
use chatsub::transport::start_websocket_server;
use chatsub::utils::{ChatError, logging};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "chatsub")]
enum Command {
    /// Start the WebSocket server
    Server,
    /// Join a topic as `author`: print its events, send each stdin line
    Client {
        author: String,
        topic: String,
        /// WebSocket server URL (default: derived from the server config)
        #[arg(long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cmd = Command::parse();

    let result = match cmd {
        Command::Server => run_server().await,
        Command::Client { author, topic, url } => run_client(&author, &topic, url).await,
    };

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("chatsub: {e}");
        std::process::exit(1);
    }
}

async fn run_server() -> Result<(), ChatError> {
    let config = load_config()?;
    logging::init(&config.log.level);

    let addr = config.server.addr();
    let bus = Arc::new(EventBus::with_policy(DeliveryPolicy::from(&config.broker)));

    tokio::select! {
        res = start_websocket_server(&addr, bus, config.clone()) => {
            res?;
            error!("WebSocket server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}

async fn run_client(author: &str, topic: &str, url: Option<String>) -> Result<(), ChatError> {
    logging::init("warn");

    let url = match url {
        Some(url) => url,
        None => load_config()?.server.url(),
    };

    println!("Starting client");
    println!("Joining as user: {author}");
    println!("To topic: {topic}");

    let mut stream = connect(&url).await?.receive(author, topic).await?;
    let mut producer = connect(&url).await?;

    let printer = tokio::spawn(async move {
        loop {
            match stream.next_message().await {
                Ok(Some(msg)) => println!("{msg}"),
                Ok(None) => {
                    println!("Stream closed by server");
                    break;
                }
                Err(e) => {
                    error!("Receive failed: {}", e);
                    break;
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!(">> ");
        std::io::stdout().flush()?;

        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                producer.send(author, topic, line).await?;
            }
            _ = tokio::signal::ctrl_c() => break,
        }

        if printer.is_finished() {
            break;
        }
    }

    printer.abort();
    Ok(())
}
