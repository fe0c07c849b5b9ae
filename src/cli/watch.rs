use std::time::Duration;

use clap::Parser;
use tokio::signal;

use crate::{
    cli::{EpbArgs, HeartbeatArgs},
    poller::Poller,
    prelude::*,
    tables::build_readings_table,
};

#[derive(Parser)]
pub struct WatchArgs {
    #[clap(flatten)]
    pub epb: EpbArgs,

    /// Polling interval in minutes.
    #[clap(
        long = "polling-interval-minutes",
        env = "POLLING_INTERVAL_MINUTES",
        default_value = "5",
        value_parser = clap::value_parser!(u64).range(1..=60),
    )]
    pub polling_interval_minutes: u64,

    #[clap(flatten)]
    pub heartbeat: HeartbeatArgs,
}

impl WatchArgs {
    pub const fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_minutes * 60)
    }

    pub async fn run(self) -> Result {
        let polling_interval = self.polling_interval();
        let poller = Poller::builder().provider(self.epb.new_client()?).build();

        let mut readings = poller.subscribe();
        let heartbeat = self.heartbeat;
        let reporter = tokio::spawn(async move {
            // Ends as soon as the poller stops and drops the sender.
            while readings.changed().await.is_ok() {
                let readings = readings.borrow_and_update().clone();
                println!("{}", build_readings_table(&readings));
                heartbeat.send().await;
            }
        });

        info!(?polling_interval, "watching…");
        poller.run(polling_interval, shutdown_signal()).await;
        reporter.await.context("the reporter has crashed")?;
        Ok(())
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {error:#}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(error) => {
                error!("failed to listen for SIGTERM: {error:#}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("received a shutdown signal");
}
