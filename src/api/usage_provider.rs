use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    api::epb::Error,
    core::{Account, UsageSample},
};

/// Source of the per-account usage samples.
#[async_trait]
pub trait UsageProvider: Send {
    /// Discover the accounts linked to the authenticated identity.
    async fn fetch_accounts(&mut self) -> Result<Vec<Account>, Error>;

    /// Fetch the month-to-date usage of the account for the calendar month of `on`.
    ///
    /// Implementations absorb per-account failures into [`UsageSample::ZERO`],
    /// and only return authentication errors.
    async fn fetch_usage(&mut self, account: &Account, on: NaiveDate) -> Result<UsageSample, Error>;
}
