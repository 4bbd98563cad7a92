//! PLC monitor service (`plcsrv`)
//!
//! Serves live PLC tag values over HTTP.

use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{error, info};

use common::bootstrap_args::ServiceArgs;
use common::shutdown::wait_for_shutdown;
use plcsrv::api::{create_routes, AppState};
use plcsrv::core::{plan_span, ReadSpan, TagRegistry};
use plcsrv::transport::ModbusTcpTransport;
use plcsrv::{AppConfig, PlcSession, PlcSrvError, Result};

const SERVICE_NAME: &str = "plcsrv";

#[derive(Debug, Parser)]
#[command(name = "plcsrv", version, about = "PLC tag monitor over Modbus TCP")]
struct Args {
    #[command(flatten)]
    service: ServiceArgs,

    /// Override api.bind_address
    #[arg(short, long, env = "PLCSRV_BIND")]
    bind: Option<String>,

    /// Validate configuration and tag map, print the read plan, then exit
    #[arg(long)]
    validate: bool,
}

#[derive(Serialize)]
struct ReadPlan {
    endpoint: String,
    tags: usize,
    spans: Vec<ReadSpan>,
}

fn read_plan(config: &AppConfig, registry: &TagRegistry) -> Result<ReadPlan> {
    let mut spans = Vec::new();
    for space in registry.spaces() {
        if let Some(span) = plan_span(space, registry.tags_in(space))? {
            spans.push(span);
        }
    }
    Ok(ReadPlan {
        endpoint: format!("{}:{}", config.device.host, config.device.port),
        tags: registry.len(),
        spans,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config first so its logging section applies; report failures once logging is up
    let loaded = AppConfig::load(&args.service.config);
    let mut log_config = args.service.log_config(
        SERVICE_NAME,
        loaded.as_ref().ok().and_then(|c| c.logging.level.as_deref()),
    );
    if let Ok(config) = &loaded {
        log_config.enable_json |= config.logging.json;
        if log_config.log_dir.is_none() {
            log_config.log_dir = config.logging.dir.as_ref().map(Into::into);
        }
    }
    common::logging::init_with_config(log_config)
        .map_err(|e| PlcSrvError::internal(format!("Logging init failed: {e}")))?;

    let config = loaded.inspect_err(|e| error!("{}", e))?;
    let registry = config.build_registry().inspect_err(|e| error!("{}", e))?;
    let plan = read_plan(&config, &registry)?;

    if args.validate {
        let text = serde_yaml::to_string(&plan)
            .map_err(|e| PlcSrvError::internal(format!("Plan serialization: {e}")))?;
        println!("{text}");
        info!("Validation completed successfully");
        return Ok(());
    }

    for span in &plan.spans {
        info!("Read span {}", span);
    }
    if registry.is_empty() {
        info!("No tags configured; only /health will be meaningful");
    }

    let transport = ModbusTcpTransport::new(config.device.tcp_config());
    let session = Arc::new(PlcSession::new(
        Box::new(transport),
        config.device.keep_alive,
    ));
    let state = AppState::new(session.clone(), Arc::new(registry));
    let app = create_routes(state);

    let bind = args.bind.unwrap_or_else(|| config.api.bind_address.clone());
    let listener = TcpListener::bind(&bind).await?;
    info!(
        "{} v{} listening on {} (device {})",
        SERVICE_NAME,
        env!("CARGO_PKG_VERSION"),
        bind,
        session.endpoint()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    session.close().await;
    info!("{} stopped", SERVICE_NAME);
    Ok(())
}
