mod burrow;
mod heartbeat;
mod watch;

use clap::{Parser, Subcommand};
use reqwest::Url;

pub use self::{burrow::BurrowArgs, heartbeat::HeartbeatArgs, watch::WatchArgs};
use crate::{api::epb, prelude::*};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Main command: poll EPB periodically and publish the accumulated readings.
    #[clap(name = "watch")]
    Watch(Box<WatchArgs>),

    /// Development tools.
    #[clap(name = "burrow")]
    Burrow(Box<BurrowArgs>),
}

#[derive(Parser)]
pub struct EpbArgs {
    /// EPB customer portal username.
    #[clap(long = "username", env = "EPB_USERNAME")]
    pub username: String,

    /// EPB customer portal password.
    #[clap(long = "password", env = "EPB_PASSWORD", hide_env_values = true)]
    pub password: String,

    #[clap(long = "api-base-url", env = "EPB_API_BASE_URL", default_value = epb::DEFAULT_BASE_URL)]
    pub base_url: Url,
}

impl EpbArgs {
    pub fn new_client(&self) -> Result<epb::Api> {
        epb::Api::new(&self.base_url, self.username.clone(), self.password.clone())
            .context("failed to build the EPB API client")
    }
}
