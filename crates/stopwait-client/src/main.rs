use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::info;

use stopwait_link::{
    run_access_sender, run_transfer_sender, AccessOutcome, FaultPlan, RetryPolicy, SenderConfig,
    TracingLogger, DEFAULT_PORT,
};

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stopwait_client=debug,stopwait_link=debug".into()),
        )
        .init();

    let profile = std::env::args().nth(1).unwrap_or_else(|| "transfer".into());

    let peer: SocketAddr = std::env::var("STOPWAIT_SERVER")
        .unwrap_or_else(|_| format!("127.0.0.1:{DEFAULT_PORT}"))
        .parse()
        .context("STOPWAIT_SERVER is not a valid address")?;
    let payload_path =
        std::env::var("STOPWAIT_PAYLOAD").unwrap_or_else(|_| "payload.txt".into());
    let source_id: u8 = std::env::var("STOPWAIT_SOURCE_ID")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0xFF);

    // Missing payload source is fatal before anything goes on the wire.
    let text = std::fs::read_to_string(&payload_path)
        .with_context(|| format!("payload source {payload_path:?} not found"))?;

    let config = SenderConfig {
        peer,
        source_id,
        policy: RetryPolicy::default(),
        faults: matches!(std::env::var("STOPWAIT_FAULT_DEMO").as_deref(), Ok("1"))
            .then(FaultPlan::default),
        logger: Arc::new(TracingLogger),
    };

    match profile.as_str() {
        "transfer" => {
            let lines: Vec<String> = text.lines().map(str::to_owned).collect();
            info!(peer = %peer, units = lines.len(), "starting transfer session");
            let report = run_transfer_sender(&config, &lines)?;
            info!(
                units = report.units,
                acked = report.acked,
                rejected = report.rejected.len(),
                "transfer session complete"
            );
            for (seq, reason) in &report.rejected {
                info!(seq, %reason, "unit was rejected");
            }
        }
        "access" => {
            let requests = parse_requests(&text)?;
            info!(peer = %peer, requests = requests.len(), "starting access session");
            let outcomes = run_access_sender(&config, &requests)?;
            for ((subscriber, technology), outcome) in requests.iter().zip(&outcomes) {
                match outcome {
                    AccessOutcome::Answered(status) => {
                        info!(subscriber, technology, %status, "access lookup answered")
                    }
                    AccessOutcome::Rejected(reason) => {
                        info!(subscriber, technology, %reason, "access request rejected")
                    }
                }
            }
        }
        other => bail!("unknown profile {other:?} (expected \"transfer\" or \"access\")"),
    }

    Ok(())
}

/// Each payload line carries `subscriber technology`, whitespace separated.
fn parse_requests(text: &str) -> anyhow::Result<Vec<(u32, u8)>> {
    let mut requests = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        if raw.trim().is_empty() {
            continue;
        }
        let mut fields = raw.split_whitespace();
        let subscriber: u32 = fields
            .next()
            .with_context(|| format!("payload line {}: missing subscriber number", i + 1))?
            .parse()
            .with_context(|| format!("payload line {}: bad subscriber number", i + 1))?;
        let technology: u8 = fields
            .next()
            .with_context(|| format!("payload line {}: missing technology code", i + 1))?
            .parse()
            .with_context(|| format!("payload line {}: bad technology code", i + 1))?;
        requests.push((subscriber, technology));
    }
    Ok(requests)
}
