use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use otlb_engine::{BridgeConfig, TelemetryBridge};
use otlb_net::{
    AcceptHook, AgentSession, AgentTargetConfig, BridgeServer, DuplexSession, MetricHandler,
    ReverseConnector, SessionRegistry, TcpAcceptor, TcpConnector,
};
use otlb_proto::MetricRequest;

/// Telemetry Ingestion Bridge
#[derive(Parser, Debug)]
#[command(name = "otlb-bridged", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "otlb-bridged.toml")]
    config: String,

    /// Listen endpoint, overrides the configuration file
    #[arg(long)]
    listen: Option<String>,

    /// Dump default configuration and exit
    #[arg(long)]
    dump_default_config: bool,
}

/// Hands received batches to the bridge.
struct BridgeMetricHandler(Arc<TelemetryBridge>);

#[async_trait]
impl MetricHandler for BridgeMetricHandler {
    async fn on_metric(&self, request: MetricRequest) {
        self.0.on_metric(request);
    }
}

fn agent_target(config: &BridgeConfig) -> AgentTargetConfig {
    AgentTargetConfig {
        check_timeout: config.check_timeout,
        export_period: config.export_period,
        max_concurrent_checks: config.max_concurrent_checks,
        use_exemplar: config.use_exemplar,
        key: config.key.clone(),
        salt: config.salt.clone(),
    }
}

/// Wait for a shutdown signal (CTRL+C or SIGTERM).
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = ctrl_c => { tracing::info!("Received CTRL+C"); }
        _ = sigterm.recv() => { tracing::info!("Received SIGTERM"); }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    if args.dump_default_config {
        print!("{}", toml::to_string_pretty(&BridgeConfig::default())?);
        return Ok(());
    }

    let mut config = if Path::new(&args.config).exists() {
        BridgeConfig::from_file(&args.config)?
    } else {
        tracing::warn!(config = %args.config, "configuration file not found, using defaults");
        BridgeConfig::default()
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    let listen: SocketAddr = config.listen.parse()?;

    tracing::info!(%listen, "Starting telemetry bridge");

    let bridge = TelemetryBridge::new(&config);
    let _sweeper = bridge.start_sweeper();

    // Periodic expiry sweep over the buffered telemetry.
    {
        let fifos = Arc::clone(bridge.fifos());
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                tick.tick().await;
                fifos.clean();
            }
        });
    }

    let handler = Arc::new(BridgeMetricHandler(Arc::clone(&bridge)));
    let stats = Arc::new(otlb_net::AgentStats::new());
    let registry = SessionRegistry::new();
    let target = agent_target(&config);

    let hook: AcceptHook = {
        let handler = Arc::clone(&handler);
        let stats = Arc::clone(&stats);
        let registry = Arc::clone(&registry);
        let target = target.clone();
        Arc::new(move |socket| {
            let session = DuplexSession::new(socket, Box::new(otlb_net::AcceptedRole));
            let agent = AgentSession::attach(
                session,
                handler.clone() as Arc<dyn MetricHandler>,
                Arc::clone(&stats),
                false,
                None,
                target.clone(),
            );
            registry.register(Arc::clone(&agent));
            agent
        })
    };

    let acceptor = TcpAcceptor::bind(listen).await?;
    let mut server = BridgeServer::new();
    server.start(Box::new(acceptor), hook);

    let mut reverse_connectors = Vec::new();
    for endpoint in &config.reverse_endpoints {
        let addr: SocketAddr = endpoint.parse()?;
        let handler = Arc::clone(&handler);
        let stats = Arc::clone(&stats);
        let registry = Arc::clone(&registry);
        let target = target.clone();
        let reverse = ReverseConnector::new(
            addr,
            Arc::new(TcpConnector),
            Box::new(move |socket| {
                let session = DuplexSession::new(socket, Box::new(otlb_net::InitiatedRole));
                let agent = AgentSession::attach(
                    session,
                    handler.clone() as Arc<dyn MetricHandler>,
                    Arc::clone(&stats),
                    false,
                    None,
                    target.clone(),
                );
                registry.register(Arc::clone(&agent));
                agent
            }),
        );
        reverse.spawn();
        reverse_connectors.push(reverse);
    }

    tracing::info!("Telemetry bridge initialization complete");
    wait_for_shutdown_signal().await?;
    tracing::info!("Telemetry bridge shutting down");

    server.stop();
    for reverse in &reverse_connectors {
        reverse.stop();
    }
    registry.shutdown_all().await;

    Ok(())
}
