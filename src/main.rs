//! Exodus Edge local driver
//!
//! Runs one CloudFront event through the edge handlers and prints the
//! result, the way the edge trigger would receive it.

use exodus_edge::{logging, CloudFrontEvent, EdgeConfig, EdgeService};
use std::env;
use std::io::Read;
use tracing::{error, info};

/// Main entry point for the edge driver
///
/// # Usage
/// ```bash
/// # Config from EXODUS_LAMBDA_CONF_FILE (default lambda_config.yaml), event on stdin
/// exodus-edge < event.json
///
/// # Explicit config and event file
/// exodus-edge lambda_config.yaml event.json
/// ```
///
/// Events whose record carries a `response` go to the origin-response
/// handler; all others to the origin-request handler.
#[tokio::main]
async fn main() {
    let mut args = env::args().skip(1);

    let config = match args.next() {
        Some(path) => EdgeConfig::from_file(&path),
        None => EdgeConfig::from_env(),
    };
    let config = match config {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    info!("Configuration loaded successfully");
    info!("  - Table: {} {:?}", config.table.name, config.table.available_regions);
    info!("  - Config table: {}", config.config_table.name);
    info!("  - Definitions TTL: {} minutes", config.config_cache_ttl);
    info!("  - Mirrored reads: {}", config.mirror_reads);

    let event_text = match read_event(args.next()) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to read event: {}", e);
            std::process::exit(1);
        }
    };

    let output = match run(config, &event_text).await {
        Ok(output) => output,
        Err(e) => {
            error!("Failed to handle event (status {}): {}", e.to_http_status(), e);
            std::process::exit(1);
        }
    };

    println!("{}", output);
}

fn read_event(path: Option<String>) -> std::io::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

async fn run(config: EdgeConfig, event_text: &str) -> exodus_edge::Result<String> {
    let event = CloudFrontEvent::from_json(event_text)?;
    let service = EdgeService::from_config(config)?;

    let output = service.dispatch(event).await?;
    Ok(serde_json::to_string_pretty(&output)?)
}
