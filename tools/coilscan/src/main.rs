//! coilscan - watch PLC coils and print every change
//!
//! Useful for mapping an unknown program: toggle something on the machine and
//! see which coil follows.
//!
//! ```text
//! coilscan --host 192.168.1.10 --start 0 --count 256
//! Coil 120 -> ON
//! Coil 120 -> OFF
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use colored::*;
use tokio::sync::mpsc;
use tracing::{debug, info};

use common::bootstrap_args::ServiceArgs;
use plcsrv::core::discovery::{self, ChangeEvent};
use plcsrv::transport::ModbusTcpTransport;
use plcsrv::AppConfig;

const TOOL_NAME: &str = "coilscan";

#[derive(Debug, Parser)]
#[command(name = "coilscan", version, about = "Print PLC coil changes as they happen")]
struct Args {
    #[command(flatten)]
    service: ServiceArgs,

    /// PLC address (overrides device.host)
    #[arg(long)]
    host: Option<String>,

    /// Modbus TCP port (overrides device.port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Unit identifier (overrides device.unit_id)
    #[arg(short, long)]
    unit: Option<u8>,

    /// Bit table to watch: coils or discrete_inputs
    #[arg(short, long)]
    table: Option<String>,

    /// First address to watch
    #[arg(short, long)]
    start: Option<u16>,

    /// Number of addresses to watch
    #[arg(short = 'n', long)]
    count: Option<u16>,

    /// Delay between samples in milliseconds
    #[arg(short, long)]
    interval_ms: Option<u64>,
}

impl Args {
    /// Config file when present, defaults otherwise; flags win over both
    fn resolve_config(&self) -> Result<AppConfig> {
        let mut config = if Path::new(&self.service.config).exists() {
            AppConfig::load(&self.service.config)?
        } else {
            AppConfig::default()
        };

        if let Some(host) = &self.host {
            config.device.host = host.clone();
        }
        if let Some(port) = self.port {
            config.device.port = port;
        }
        if let Some(unit) = self.unit {
            config.device.unit_id = unit;
        }
        if let Some(table) = &self.table {
            config.discovery.table = table.clone();
        }
        if let Some(start) = self.start {
            config.discovery.start = start;
        }
        if let Some(count) = self.count {
            config.discovery.count = count;
        }
        if let Some(interval) = self.interval_ms {
            config.discovery.interval_ms = interval;
        }

        config.validate()?;
        Ok(config)
    }
}

fn render(event: &ChangeEvent) -> String {
    let state = if event.value {
        "ON".green().bold()
    } else {
        "OFF".red()
    };
    format!("Coil {:03} -> {}", event.position, state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if args.service.no_color {
        colored::control::set_override(false);
    }

    let config = args.resolve_config().context("Invalid configuration")?;
    let log_config = args
        .service
        .log_config(TOOL_NAME, config.logging.level.as_deref());
    common::logging::init_with_config(log_config)
        .map_err(|e| anyhow!("Logging init failed: {e}"))?;

    let discovery_config = config.discovery.discovery_config()?;
    let mut transport = ModbusTcpTransport::new(config.device.tcp_config());

    println!(
        "Watching {} {}..{} on {}:{} every {} ms (Ctrl+C to stop)",
        discovery_config.table,
        discovery_config.start,
        u32::from(discovery_config.start) + u32::from(discovery_config.count) - 1,
        config.device.host.cyan(),
        config.device.port,
        config.discovery.interval_ms
    );

    let (tx, mut rx) = mpsc::channel::<ChangeEvent>(256);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            println!("{}", render(&event));
        }
        debug!("Event channel closed");
    });

    let cancel = common::shutdown::shutdown_token();
    let stats = discovery::run(&discovery_config, &mut transport, tx, cancel).await;

    // run() dropped the sender; let the printer drain what is left
    let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;

    info!("coilscan finished");
    println!(
        "{} cycles, {} changes, {} failures",
        stats.cycles,
        stats.events.to_string().bold(),
        if stats.failures > 0 {
            stats.failures.to_string().yellow()
        } else {
            stats.failures.to_string().normal()
        }
    );
    Ok(())
}
