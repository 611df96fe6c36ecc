use anyhow::Result;
use is_terminal::IsTerminal;
use netsim::{Config, DnsQueryEvent, Engine, FixedResponse, HttpCaptureEvent};
use std::sync::Arc;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CLOCK: &[FormatItem<'static>] = format_description!("[hour]:[minute]:[second]");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    let config = config_init(std::env::args().nth(1))?;
    tracing::info!("CA material is kept in {}", config.storage_dir.display());

    let responses = Arc::new(FixedResponse::new(config.response.clone()));
    let mut engine = Engine::new(config);

    let started = engine
        .start(Arc::new(log_query), Arc::new(log_request), responses)
        .await;
    if let Err(err) = started {
        engine.stop().await;
        return Err(err.into());
    }

    signal::ctrl_c().await?;
    tracing::info!("quitting from signal");
    engine.stop().await;
    tracing::info!("goodbye");
    Ok(())
}

fn tracing_init() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_ansi(std::io::stdout().is_terminal()))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "netsim=info".into()),
        )
        .init();
}

fn config_init(config_file: Option<String>) -> Result<Config> {
    let mut config = match config_file {
        None => {
            tracing::debug!("no config file given, using defaults");
            Config::default()
        }
        Some(config_file) => {
            tracing::debug!("loaded config from {config_file}");
            Config::try_from_file(&config_file)?
        }
    };

    let port_env =
        |name: &str, current: u16| std::env::var(name).unwrap_or_else(|_| current.to_string());
    let dns = port_env("NETSIM_DNS_PORT", config.dns_port);
    let http = port_env("NETSIM_HTTP_PORT", config.http_port);
    let https = port_env("NETSIM_HTTPS_PORT", config.https_port);
    config.apply_port_strings(&dns, &http, &https);
    Ok(config)
}

fn clock(at: OffsetDateTime) -> String {
    at.format(CLOCK).unwrap_or_default()
}

fn log_query(event: DnsQueryEvent) {
    tracing::info!("[{}] DNS query for {}", clock(event.received), event.domain);
}

fn log_request(event: HttpCaptureEvent) {
    tracing::info!("[{}] {}", clock(event.received), event.uri);
    tracing::debug!("{}", event.content);
    tracing::debug!("{}", event.curl_command);
}
