//! One-shot discovery from the command line.
//!
//! Usage: `discover <industry> <location>[;<location>...] [max_results]`
//!
//! Prints the discovery outcome as JSON on stdout.

use std::env;
use std::sync::Arc;

use rust_lead_discovery::config::Config;
use rust_lead_discovery::context::DiscoveryContext;
use rust_lead_discovery::engine::DiscoveryEngine;
use rust_lead_discovery::models::DiscoveryRequest;
use rust_lead_discovery::scoring::{InMemoryOutcomeLog, WeightsStore};
use rust_lead_discovery::sources::build_http_client;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 2 {
        anyhow::bail!("usage: discover <industry> <location>[;<location>...] [max_results]");
    }

    let max_results = args
        .get(2)
        .map(|raw| raw.parse::<usize>())
        .transpose()
        .map_err(|_| anyhow::anyhow!("max_results must be a positive number"))?;

    let locations: Vec<String> = args[1]
        .split(';')
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();

    let request = DiscoveryRequest {
        industry: args[0].clone(),
        location: locations.first().cloned().unwrap_or_default(),
        max_results,
        multi_location: (locations.len() > 1).then_some(locations),
        ..Default::default()
    };

    let config = Config::from_env()?;
    let client = build_http_client(config.source_timeout())?;
    let engine = DiscoveryEngine::from_config(
        &config,
        client,
        Arc::new(WeightsStore::new()),
        Arc::new(InMemoryOutcomeLog::new()),
    );

    let ctx = DiscoveryContext::with_timeout(config.discovery_deadline());
    let outcome = engine.discover(&ctx, &request).await?;

    if outcome.all_sources_failed {
        eprintln!("All sources failed:");
        for error in &outcome.errors {
            eprintln!("  - {}", error);
        }
    }
    if !outcome.skipped_locations.is_empty() {
        eprintln!("Deadline reached; skipped locations: {}", outcome.skipped_locations.join("; "));
    }

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
