#[allow(dead_code)]
mod config;
#[allow(dead_code)]
mod repo;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Datelike, Utc};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use energy_monitor::shared::consumption::{session_consumption, SessionConsumption};
use energy_monitor::shared::refresh::{
    spawn_refresh, RefreshHandle, CONSUMPTION_REFRESH, DASHBOARD_REFRESH, RUNNING_TIME_REFRESH,
};
use energy_monitor::shared::reports::{build_home_summary, month_to_date_kwh, HomeSummary};
use energy_monitor::shared::time::{month_start, Clock, SystemClock};

#[derive(Parser)]
#[command(author, version, about = "Follow live consumption of a device or home")]
#[must_use]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Live session energy and cost of one device.
    #[clap(name = "device")]
    Device {
        #[clap(env = "MONITOR_DEVICE_ID")]
        device_id: String,

        /// Refresh period in seconds (default 5).
        #[clap(long, env = "MONITOR_INTERVAL_SECS")]
        interval_secs: Option<u64>,
    },

    /// Dashboard summary of a home.
    #[clap(name = "home")]
    Home {
        #[clap(env = "MONITOR_HOME_ID")]
        home_id: String,

        /// Refresh period in seconds (default 30).
        #[clap(long, env = "MONITOR_INTERVAL_SECS")]
        interval_secs: Option<u64>,
    },
}

fn refresh_period(interval_secs: Option<u64>, default: Duration) -> Duration {
    interval_secs
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// Everything one refresh needs, cloned into each run
#[derive(Clone)]
struct Monitor {
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
}

impl Monitor {
    async fn month_kwh(&self, home_id: &str, now: DateTime<Utc>) -> anyhow::Result<f64> {
        let start = month_start(now.year(), now.month()).unwrap_or(now);
        let readings = repo::readings::list_home_readings(
            &self.config.dynamodb_client,
            &self.config.tables.device_readings,
            home_id,
            start,
            now,
        )
        .await?;
        Ok(month_to_date_kwh(&readings, now))
    }

    async fn device_consumption(&self, device_id: &str) -> anyhow::Result<SessionConsumption> {
        let client = &self.config.dynamodb_client;
        let tables = &self.config.tables;

        let device = repo::devices::get_device(client, &tables.devices, device_id)
            .await?
            .ok_or_else(|| anyhow!("device {} not found", device_id))?;
        let home = repo::homes::get_home(client, &tables.homes, &device.home_id)
            .await?
            .ok_or_else(|| anyhow!("home {} not found", device.home_id))?;

        let now = self.clock.now();
        let month_kwh = self.month_kwh(&home.home_id, now).await?;

        Ok(session_consumption(&device, &home.tariff, month_kwh, now))
    }

    async fn home_summary(&self, home_id: &str) -> anyhow::Result<HomeSummary> {
        let client = &self.config.dynamodb_client;
        let tables = &self.config.tables;

        let home = repo::homes::get_home(client, &tables.homes, home_id)
            .await?
            .ok_or_else(|| anyhow!("home {} not found", home_id))?;
        let devices = repo::devices::list_devices_for_home(client, &tables.devices, home_id).await?;

        let now = self.clock.now();
        let start = month_start(now.year(), now.month()).unwrap_or(now);
        let readings = repo::readings::list_home_readings(
            client,
            &tables.device_readings,
            home_id,
            start,
            now,
        )
        .await?;

        Ok(build_home_summary(&home, &devices, &readings, now))
    }
}

fn log_consumption(consumption: &SessionConsumption) {
    if consumption.is_active {
        info!(
            device_id = %consumption.device_id,
            power_w = consumption.current_power_w,
            minutes = %format!("{:.1}", consumption.duration_minutes),
            energy_kwh = %format!("{:.4}", consumption.energy_kwh),
            cost = %format!("{:.2} {}", consumption.cost, consumption.currency),
            "on"
        );
    } else {
        info!(device_id = %consumption.device_id, "off");
    }
}

/// Elapsed session time as `H:MM:SS`
fn format_running_time(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - since).num_seconds().max(0);
    format!("{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

fn log_summary(summary: &HomeSummary) {
    info!(
        home_id = %summary.home_id,
        active_devices = summary.active_devices,
        load_w = summary.current_load_w,
        month_kwh = %format!("{:.2}", summary.month_to_date_kwh),
        projected_kwh = %format!("{:.2}", summary.projected_month_kwh),
        projected_bill = %format!("{:.2}", summary.projected_bill.total),
        "summary"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = Config::from_env()
        .await
        .context("failed to load configuration")?;
    let monitor = Monitor {
        config: Arc::new(config),
        clock: Arc::new(SystemClock::new()),
    };

    let mut handles: Vec<RefreshHandle> = match args.command {
        Command::Device {
            device_id,
            interval_secs,
        } => {
            let period = refresh_period(interval_secs, CONSUMPTION_REFRESH);
            info!(device_id = %device_id, period = ?period, "watching device");

            // Session start as of the last successful fetch
            let (started_tx, mut started_rx) = watch::channel(None);
            let started_tx = Arc::new(started_tx);
            let clock = monitor.clock.clone();

            let consumption = spawn_refresh(period, move || {
                let monitor = monitor.clone();
                let device_id = device_id.clone();
                let started_tx = started_tx.clone();
                async move {
                    match monitor.device_consumption(&device_id).await {
                        Ok(consumption) => {
                            started_tx.send_replace(consumption.started_at);
                            log_consumption(&consumption);
                        }
                        Err(e) => warn!(device_id = %device_id, "refresh failed: {:#}", e),
                    }
                }
            });

            let running = spawn_refresh(RUNNING_TIME_REFRESH, move || {
                let since: Option<DateTime<Utc>> = *started_rx.borrow_and_update();
                let now = clock.now();
                async move {
                    if let Some(since) = since {
                        info!(running = %format_running_time(since, now), "running time");
                    }
                }
            });

            vec![consumption, running]
        }
        Command::Home {
            home_id,
            interval_secs,
        } => {
            let period = refresh_period(interval_secs, DASHBOARD_REFRESH);
            info!(home_id = %home_id, period = ?period, "watching home");

            vec![spawn_refresh(period, move || {
                let monitor = monitor.clone();
                let home_id = home_id.clone();
                async move {
                    match monitor.home_summary(&home_id).await {
                        Ok(summary) => log_summary(&summary),
                        Err(e) => warn!(home_id = %home_id, "refresh failed: {:#}", e),
                    }
                }
            })]
        }
    };

    let sig = tokio::signal::ctrl_c();
    tokio::pin!(sig);
    tokio::select! {
        res = &mut sig => {
            res.context("failed to listen for ctrl-c")?;
            info!("shutdown requested");
        }
        _ = wait_any_finished(&handles) => {
            warn!("refresh task stopped unexpectedly");
        }
    }

    for handle in &mut handles {
        handle.cancel().await;
    }
    Ok(())
}

async fn wait_any_finished(handles: &[RefreshHandle]) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    while !handles.iter().any(RefreshHandle::is_finished) {
        ticker.tick().await;
    }
}
