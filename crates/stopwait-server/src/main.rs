use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::info;

use stopwait_link::{
    create_receiver_socket, AccessReceiver, AccessTable, TracingLogger, TransferReceiver,
    WireEvent, WireLog, WireLogger, DEFAULT_PORT,
};

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stopwait_server=debug,stopwait_link=debug".into()),
        )
        .init();

    let profile = std::env::args().nth(1).unwrap_or_else(|| "transfer".into());

    let host = std::env::var("STOPWAIT_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("STOPWAIT_PORT")
        .unwrap_or_else(|_| DEFAULT_PORT.to_string())
        .parse()
        .context("STOPWAIT_PORT is not a valid port")?;

    let bind_addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .context("STOPWAIT_HOST is not a valid address")?;
    // Bind failure is fatal: a receiver without its port has nothing to do.
    let socket = create_receiver_socket(bind_addr)
        .with_context(|| format!("cannot bind receiver socket on {bind_addr}"))?;
    info!(addr = %bind_addr, profile = %profile, "receiver listening");

    let logger: Arc<dyn WireLogger> = Arc::new(TracingLogger);

    match profile.as_str() {
        "transfer" => {
            let mut receiver = TransferReceiver::new(logger);
            receiver.serve(&socket)?;
        }
        "access" => {
            let table_path =
                std::env::var("STOPWAIT_SUBSCRIBERS").unwrap_or_else(|_| "subscribers.txt".into());
            let table = AccessTable::load(&table_path)
                .with_context(|| format!("cannot load subscriber table {table_path:?}"))?;
            logger.log(WireLog {
                role: "receiver",
                event: WireEvent::TableLoaded {
                    records: table.len(),
                },
            });
            let receiver = AccessReceiver::new(table, logger);
            receiver.serve(&socket)?;
        }
        other => bail!("unknown profile {other:?} (expected \"transfer\" or \"access\")"),
    }

    Ok(())
}
