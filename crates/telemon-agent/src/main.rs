use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use telemon_agent::config::{AgentArgs, AgentConfig};
use telemon_agent::{CollectionAgent, HttpTransport, MetricSender, RetrySender};
use telemon_storage::{MemStorage, Storage};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("telemon=info".parse()?))
        .init();

    let args = AgentArgs::parse();
    let config = AgentConfig::from_args(&args)?;

    tracing::info!(
        server = %config.server_url(),
        poll_interval_secs = config.poll_interval_secs,
        report_interval_secs = config.report_interval_secs,
        wire_format = ?config.wire_format,
        retries = config.send_retries,
        "telemon-agent starting"
    );

    let transport = HttpTransport::new(
        config.server_url(),
        config.wire_format,
        config.request_timeout(),
    )?;
    let sender: Arc<dyn MetricSender> =
        Arc::new(RetrySender::new(transport, config.retry_policy()));
    let store: Arc<dyn Storage> = Arc::new(MemStorage::new());

    let agent = CollectionAgent::new(
        store,
        telemon_collector::default_collectors(),
        sender,
        config.poll_interval(),
        config.report_interval(),
    );
    agent.run(telemon_common::shutdown_signal()).await;

    tracing::info!("telemon-agent stopped");
    Ok(())
}
