use chrono::Utc;
use std::env;
use std::io;
use std::process::ExitCode;

use offer_settle::csv::{read_events, read_offers, write_summaries};
use offer_settle::{EngineConfig, Scenario};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // optional, the process environment wins
    let _ = dotenvy::dotenv();

    let args: Vec<String> = env::args().skip(1).collect();
    let [offers_path, events_path] = args.as_slice() else {
        error!("usage: offer-settle <offers.csv> <events.csv>");
        return ExitCode::from(2);
    };

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut scenario = Scenario::new(config, Utc::now());

    let offers = match read_offers(offers_path) {
        Ok(offers) => offers,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    for result in offers {
        match result {
            Ok(offer) => {
                if let Err(e) = scenario.add_offer(offer).await {
                    warn!("{e}");
                }
            }
            Err(e) => warn!("{e}"),
        }
    }

    let events = match read_events(events_path.clone()) {
        Ok(events) => events,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let (event_sender, event_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in events {
            match result {
                Ok(event) => {
                    if event_sender.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    scenario.run(ReceiverStream::new(event_receiver)).await;

    let summaries = match scenario.summaries().await {
        Ok(summaries) => summaries,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = write_summaries(io::stdout().lock(), &summaries) {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
