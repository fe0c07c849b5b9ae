use chrono::Local;
use clap::{Parser, Subcommand};

use crate::{
    api::UsageProvider,
    cli::EpbArgs,
    prelude::*,
    tables::{build_accounts_table, build_samples_table},
};

#[derive(Parser)]
pub struct BurrowArgs {
    #[clap(flatten)]
    pub epb: EpbArgs,

    #[command(subcommand)]
    pub command: BurrowCommand,
}

#[derive(Subcommand)]
pub enum BurrowCommand {
    /// List the linked power accounts.
    Accounts,

    /// Fetch the raw month-to-date usage of every account, without accumulation.
    Usage,
}

impl BurrowArgs {
    pub async fn run(self) -> Result {
        let mut api = self.epb.new_client()?;
        let accounts = api.fetch_accounts().await?;

        match self.command {
            BurrowCommand::Accounts => {
                println!("{}", build_accounts_table(&accounts));
            }
            BurrowCommand::Usage => {
                let today = Local::now().date_naive();
                let mut samples = Vec::with_capacity(accounts.len());
                for account in &accounts {
                    samples.push((account, api.fetch_usage(account, today).await?));
                }
                println!("{}", build_samples_table(&samples));
            }
        }

        Ok(())
    }
}
