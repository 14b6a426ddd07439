use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use ticket_dispatch::config::{SchedulerConfig, WorkerMode};
use ticket_dispatch::dashboard::{run_dashboard, DashboardState};
use ticket_dispatch::driver::Driver;
use ticket_dispatch::fleet::HostInfo;
use ticket_dispatch::monitor::{LogMonitor, Monitor, WatchMonitor};
use ticket_dispatch::scheduler::Scheduler;
use ticket_dispatch::scripts::ScriptTable;
use ticket_dispatch::shutdown::install_shutdown_handler;
use ticket_dispatch::sim::{SimFleet, SimTarget};
use ticket_dispatch::target::{MoneyTier, Target};

/// Runs the scheduler against a simulated fleet.
#[derive(Parser, Debug)]
#[command(name = "ticket-dispatch")]
#[command(version)]
#[command(about = "Ticket-based work distribution across RAM-limited worker hosts")]
struct Args {
    /// Fraction of each target's money an attack round aims to take
    #[arg(long, default_value = "0.5")]
    taking: f64,

    /// Allow new work while a target still has work in flight
    #[arg(long)]
    boost: bool,

    /// Fill leftover RAM with share work
    #[arg(long)]
    share: bool,

    /// Which hosts receive work
    #[arg(long, value_enum, default_value = "all")]
    workers: WorkerMode,

    /// RAM (GB) to keep free on the home host
    #[arg(long, default_value = "0")]
    home_reserved: f64,

    /// Cap on the RAM (GB) used per host
    #[arg(long)]
    ram_cap: Option<f64>,

    /// Milliseconds between scheduling steps
    #[arg(long, default_value = "1000")]
    tick_ms: u64,

    /// Number of extra hosts to buy while running
    #[arg(long, default_value = "0")]
    purchases: usize,

    /// Port for the JSON status dashboard (optional)
    #[arg(long)]
    dashboard_port: Option<u16>,
}

fn demo_fleet(table: &ScriptTable, config: &SchedulerConfig, purchases: usize) -> SimFleet {
    let fleet = SimFleet::new()
        .with_host(HostInfo::home("home"), 64.0)
        .with_host(HostInfo::remote("foodnstuff"), 16.0)
        .with_host(HostInfo::remote("sigma-cosmetics"), 16.0)
        .with_locked_host(HostInfo::remote("CSEC"), 8.0, true)
        .with_scripts(&config.scripts, table, Some(Duration::from_secs(3)));
    for i in 0..purchases {
        fleet.queue_purchase(&format!("pserv-{}", i), 32.0);
    }
    fleet
}

fn demo_targets() -> Vec<Arc<dyn Target>> {
    vec![
        Arc::new(
            SimTarget::new("n00dles", 1_750_000.0, 1.0)
                .with_money(70_000.0)
                .with_security(3.5)
                .with_tier(MoneyTier::Lowest),
        ),
        Arc::new(SimTarget::new("joesguns", 62_500_000.0, 5.0).with_money(20_000_000.0)),
        Arc::new(
            SimTarget::new("phantasy", 600_000_000.0, 7.0)
                .with_money(150_000_000.0)
                .with_security(12.0)
                .with_tier(MoneyTier::High),
        ),
    ]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ticket_dispatch=info".parse()?))
        .init();

    let args = Args::parse();

    let config = SchedulerConfig::new(args.taking)
        .with_boost(args.boost)
        .with_share_spare_ram(args.share)
        .with_worker_mode(args.workers)
        .with_home_reserved_ram(args.home_reserved)
        .with_ram_cap(args.ram_cap)
        .with_tick_interval_ms(args.tick_ms);

    let table = Arc::new(ScriptTable::default());
    let fleet = Arc::new(demo_fleet(&table, &config, args.purchases));

    let monitor: Arc<dyn Monitor> = match args.dashboard_port {
        Some(port) => {
            let (monitor, snapshots) = WatchMonitor::new();
            let addr: SocketAddr = format!("127.0.0.1:{}", port).parse()?;
            tokio::spawn(run_dashboard(addr, DashboardState { snapshots }));
            Arc::new(monitor)
        }
        None => Arc::new(LogMonitor),
    };

    let scheduler = Scheduler::new(config, fleet.clone(), table, demo_targets())
        .with_monitor(monitor);

    let token = CancellationToken::new();
    install_shutdown_handler(token.clone());

    let scheduler = Driver::new(scheduler)
        .with_upgrader(fleet)
        .run(token)
        .await;
    tracing::info!(initialized = scheduler.is_initialized(), "Scheduler stopped");
    Ok(())
}
