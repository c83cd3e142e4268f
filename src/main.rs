//! CLI for tagsub
//!
//! Subcommands:
//! - `server`: run the broker
//! - `publisher`: publish messages for one tag at a Poisson-distributed rate
//! - `subscriber`: receive messages for one tag (random if not given)
//! - `tags`: print the broker's tag list

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rand::seq::SliceRandom;
use tracing::{error, info};

use tagsub::broker::{BrokerCoordinator, Tag, WireMessage};
use tagsub::client::{BrokerClient, PoissonSchedule};
use tagsub::config::{Settings, load_config};
use tagsub::retention::RetentionStore;
use tagsub::transport::start_websocket_server;
use tagsub::utils::logging;
use tagsub::{BrokerError, Result};

const DEFAULT_URL: &str = "ws://127.0.0.1:50051";

#[derive(Parser)]
#[command(name = "tagsub", version, about = "Tag-partitioned publish/subscribe broker")]
enum Command {
    /// Start the broker
    Server {
        /// How long to keep messages for replay, in seconds
        #[arg(long)]
        ttl: Option<u64>,
        /// Port to listen on (overrides configuration)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Register a tag and publish messages for it until interrupted
    Publisher {
        /// TRIAL, LICENSE, SUPPORT or BUG
        #[arg(long)]
        tag: Tag,
        /// Average number of messages per hour
        #[arg(long, value_parser = positive_rate)]
        rate: f64,
        /// Broker URL
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
        /// Stop after this many messages
        #[arg(long)]
        count: Option<u64>,
    },
    /// Subscribe to a tag and print every message received
    Subscriber {
        /// Broker URL
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
        /// Tag to follow; picked at random from the broker's list if omitted
        #[arg(long)]
        tag: Option<Tag>,
    },
    /// Print the tags the broker serves
    Tags {
        /// Broker URL
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cmd = Command::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&settings.log.level);

    let result = match cmd {
        Command::Server { ttl, port } => run_server(settings, ttl, port).await,
        Command::Publisher {
            tag,
            rate,
            url,
            count,
        } => run_publisher(&url, tag, rate, count).await,
        Command::Subscriber { url, tag } => run_subscriber(&url, tag).await,
        Command::Tags { url } => run_tags(&url).await,
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run_server(mut settings: Settings, ttl: Option<u64>, port: Option<u16>) -> Result<()> {
    if let Some(ttl) = ttl {
        settings.broker.message_ttl_secs = ttl;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }

    let ttl = Duration::from_secs(settings.broker.message_ttl_secs);
    let coordinator = Arc::new(BrokerCoordinator::new(ttl));
    info!(
        ttl_secs = ttl.as_secs(),
        tags = coordinator.request_tags(),
        "starting broker"
    );

    let sweeper = match settings.broker.eviction_interval_secs {
        0 => None,
        secs => Some(tokio::spawn(RetentionStore::start_eviction_loop(
            coordinator.store().clone(),
            Duration::from_secs(secs),
        ))),
    };

    let outcome = tokio::select! {
        result = start_websocket_server(coordinator, settings) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
            Ok(())
        }
    };

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    outcome
}

async fn run_publisher(url: &str, tag: Tag, rate: f64, count: Option<u64>) -> Result<()> {
    let client = BrokerClient::new(url);
    client.register(tag).await?;
    info!(%tag, "registered with the broker");

    let mut schedule = PoissonSchedule::new(rate);
    info!(
        rate,
        mean_gap_secs = schedule.mean().as_secs_f64(),
        "generating messages"
    );

    let mut publisher = client.publisher().await?;
    let mut id = 0u64;
    loop {
        publisher
            .send(WireMessage {
                id,
                tag: tag.as_str().to_string(),
                timestamp: chrono::Utc::now().timestamp(),
                payload: tag.sample_text().to_string(),
            })
            .await?;
        id += 1;

        if count.is_some_and(|c| id >= c) {
            break;
        }

        let delay = schedule.next_delay();
        info!("next message will be sent after {:.1} seconds", delay.as_secs_f64());
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let accepted = publisher.finish().await?;
    info!(accepted, "finished publishing");
    Ok(())
}

async fn run_subscriber(url: &str, tag: Option<Tag>) -> Result<()> {
    let client = BrokerClient::new(url);
    let tag = match tag {
        Some(tag) => tag.as_str().to_string(),
        None => pick_tag(&client).await?,
    };

    let mut subscription = client.subscribe(&tag).await?;
    info!(%tag, "receiving stream of messages");

    loop {
        tokio::select! {
            next = subscription.next_message() => match next {
                Some(Ok(message)) => {
                    println!(
                        "[{}] #{} @{}: {}",
                        message.tag, message.id, message.timestamp, message.payload
                    );
                }
                Some(Err(e)) => return Err(e),
                None => {
                    info!("broker closed the stream");
                    return Ok(());
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    subscription.close().await
}

async fn run_tags(url: &str) -> Result<()> {
    let tags = BrokerClient::new(url).request_tags().await?;
    println!("{}", tags.join(","));
    Ok(())
}

async fn pick_tag(client: &BrokerClient) -> Result<String> {
    info!("requesting list of tags");
    let tags = client.request_tags().await?;
    let tag = tags
        .choose(&mut rand::thread_rng())
        .cloned()
        .ok_or_else(|| BrokerError::protocol("broker reported no tags"))?;
    info!(%tag, "chose tag");
    Ok(tag)
}

fn positive_rate(s: &str) -> std::result::Result<f64, String> {
    let rate: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if rate > 0.0 && rate.is_finite() {
        Ok(rate)
    } else {
        Err("rate must be a positive number of messages per hour".to_string())
    }
}
