use std::time::Duration;

use bon::Builder;
use chrono::{Local, NaiveDateTime};
use tokio::{
    sync::watch,
    time::{Interval, MissedTickBehavior, interval},
};

use crate::{
    api::{UsageProvider, epb},
    core::{Account, Accumulator, Readings},
    prelude::*,
};

/// Periodically polls the provider and publishes the accumulated readings.
#[derive(Builder)]
pub struct Poller<P> {
    provider: P,

    #[builder(default)]
    accumulator: Accumulator,

    /// Discovered accounts, dropped on authentication failure.
    #[builder(skip)]
    accounts: Option<Vec<Account>>,

    #[builder(skip = watch::Sender::new(Readings::default()))]
    publisher: watch::Sender<Readings>,
}

impl<P: UsageProvider> Poller<P> {
    /// Subscribe to the published readings.
    ///
    /// The receiver always holds the latest successfully published readings.
    pub fn subscribe(&self) -> watch::Receiver<Readings> {
        self.publisher.subscribe()
    }

    /// Poll immediately, then every `period`, until `shutdown` resolves.
    pub async fn run(mut self, period: Duration, shutdown: impl Future<Output = ()>) {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("shutting down…");
                    break;
                }
                () = self.tick(&mut interval) => {}
            }
        }
    }

    async fn tick(&mut self, interval: &mut Interval) {
        interval.tick().await;
        if let Err(error) = self.poll(Local::now().naive_local()).await {
            // Previously published readings stay in place until the next successful cycle.
            warn!("{error:#}");
        }
    }

    /// Run one poll cycle at the specified local time and publish its readings.
    #[instrument(skip_all, fields(at = %at))]
    pub async fn poll(&mut self, at: NaiveDateTime) -> Result<Readings> {
        match self.try_poll(at).await {
            Ok(readings) => {
                info!(n_accounts = readings.len(), "publishing");
                self.publisher.send_replace(readings.clone());
                Ok(readings)
            }
            Err(error) => {
                if error.is_auth() {
                    self.accounts = None;
                }
                Err(Error::from(error).context("refresh failed"))
            }
        }
    }

    async fn try_poll(&mut self, at: NaiveDateTime) -> Result<Readings, epb::Error> {
        if self.accounts.as_ref().is_none_or(Vec::is_empty) {
            self.accounts = Some(self.provider.fetch_accounts().await?);
        }
        let accounts = self.accounts.as_deref().unwrap_or_default();

        // Fetch everything first, so that a failed or cancelled cycle leaves the state untouched.
        let mut samples = Vec::with_capacity(accounts.len());
        for account in accounts {
            samples.push(self.provider.fetch_usage(account, at.date()).await?);
        }

        self.accumulator.start_cycle(at.date());
        Ok(accounts
            .iter()
            .zip(&samples)
            .map(|(account, sample)| {
                (account.id.clone(), self.accumulator.ingest(&account.id, sample, at))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use approx::assert_abs_diff_eq;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use mockito::{Matcher, Server};
    use reqwest::{StatusCode, Url};
    use serde_json::json;

    use super::*;
    use crate::{
        core::UsageSample,
        quantity::{Quantity, energy::KilowattHours},
    };

    #[derive(Default)]
    struct FakeProvider {
        accounts: Vec<Account>,

        /// Current month-to-date counter per account.
        counters: HashMap<String, f64>,

        /// Account, for which fetching the usage fails to authenticate.
        unauthorized_account: Option<String>,

        /// Makes the account discovery fail with a server error.
        is_discovery_down: bool,

        n_account_fetches: usize,
    }

    impl FakeProvider {
        fn with_accounts(ids: &[&str]) -> Self {
            Self {
                accounts: ids.iter().map(|id| Account::builder().id(*id).build()).collect(),
                ..Self::default()
            }
        }

        fn set(&mut self, account_id: &str, kwh: f64) {
            self.counters.insert(account_id.to_owned(), kwh);
        }
    }

    #[async_trait]
    impl UsageProvider for FakeProvider {
        async fn fetch_accounts(&mut self) -> Result<Vec<Account>, epb::Error> {
            self.n_account_fetches += 1;
            if self.is_discovery_down {
                return Err(epb::Error::Api {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    body: "maintenance".to_owned(),
                });
            }
            Ok(self.accounts.clone())
        }

        async fn fetch_usage(
            &mut self,
            account: &Account,
            _on: NaiveDate,
        ) -> Result<UsageSample, epb::Error> {
            if self.unauthorized_account.as_ref() == Some(&account.id) {
                return Err(epb::Error::auth("invalid credentials"));
            }
            Ok(self.counters.get(&account.id).map_or(UsageSample::ZERO, |kwh| {
                UsageSample::builder().kwh(Quantity(*kwh)).cost(Quantity(kwh * 0.12)).build()
            }))
        }
    }

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap().and_hms_opt(hour, 5, 0).unwrap()
    }

    fn total(readings: &Readings, account_id: &str) -> KilowattHours {
        readings[account_id].total
    }

    #[tokio::test]
    async fn test_poll_publishes_all_accounts() -> Result {
        let mut provider = FakeProvider::with_accounts(&["1", "2"]);
        provider.set("1", 100.0);
        provider.set("2", 250.0);
        let mut poller = Poller::builder().provider(provider).build();
        let mut receiver = poller.subscribe();

        let readings = poller.poll(at(10, 8)).await?;
        assert_abs_diff_eq!(total(&readings, "1").0, 100.0);
        assert_abs_diff_eq!(total(&readings, "2").0, 250.0);
        assert_abs_diff_eq!(readings["2"].cost.0, 30.0);

        assert!(receiver.has_changed()?);
        assert_eq!(*receiver.borrow_and_update(), readings);
        Ok(())
    }

    #[tokio::test]
    async fn test_accounts_are_discovered_once() -> Result {
        let mut provider = FakeProvider::with_accounts(&["1"]);
        provider.set("1", 10.0);
        let mut poller = Poller::builder().provider(provider).build();

        poller.poll(at(10, 8)).await?;
        poller.poll(at(10, 9)).await?;
        poller.poll(at(10, 10)).await?;
        assert_eq!(poller.provider.n_account_fetches, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_reset_is_published_across_cycles() -> Result {
        let mut provider = FakeProvider::with_accounts(&["1", "2"]);
        provider.set("1", 100.0);
        provider.set("2", 100.0);
        let mut poller = Poller::builder().provider(provider).build();
        poller.poll(at(10, 8)).await?;

        poller.provider.set("1", 40.0);
        poller.provider.set("2", 95.0);
        let readings = poller.poll(at(10, 9)).await?;
        assert_abs_diff_eq!(total(&readings, "1").0, 140.0);
        assert_abs_diff_eq!(readings["1"].raw.0, 40.0);
        assert_abs_diff_eq!(total(&readings, "2").0, 95.0);

        // The new day starts from the raw counter again:
        poller.provider.set("1", 41.0);
        let readings = poller.poll(at(11, 0)).await?;
        assert_abs_diff_eq!(total(&readings, "1").0, 41.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_usage_gives_zero_reading_for_that_account_only() -> Result {
        let mut provider = FakeProvider::with_accounts(&["1", "2"]);
        provider.set("2", 75.0);
        let mut poller = Poller::builder().provider(provider).build();

        let readings = poller.poll(at(10, 8)).await?;
        assert_abs_diff_eq!(total(&readings, "1").0, 0.0);
        assert_abs_diff_eq!(readings["1"].cost.0, 0.0);
        assert_abs_diff_eq!(total(&readings, "2").0, 75.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_cycle_keeps_state_and_published_readings() -> Result {
        let mut provider = FakeProvider::with_accounts(&["1", "2"]);
        provider.set("1", 100.0);
        provider.set("2", 200.0);
        let mut poller = Poller::builder().provider(provider).build();
        let receiver = poller.subscribe();
        let published = poller.poll(at(10, 8)).await?;

        // Account 1 gets fetched successfully, but the cycle fails on account 2:
        poller.provider.set("1", 10.0);
        poller.provider.unauthorized_account = Some("2".to_owned());
        assert!(poller.poll(at(10, 9)).await.is_err());
        assert_eq!(*receiver.borrow(), published);
        let state = poller.accumulator.state("1").unwrap();
        assert_abs_diff_eq!(state.previous.0, 100.0);
        assert_eq!(state.last_seen_hour, 8);

        // Authentication failure makes the poller rediscover the accounts:
        poller.provider.unauthorized_account = None;
        let readings = poller.poll(at(10, 10)).await?;
        assert_eq!(poller.provider.n_account_fetches, 2);
        assert_abs_diff_eq!(total(&readings, "1").0, 110.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_discovery_publishes_nothing() -> Result {
        let mut provider = FakeProvider::with_accounts(&["1"]);
        provider.set("1", 100.0);
        provider.is_discovery_down = true;
        let mut poller = Poller::builder().provider(provider).build();
        let mut receiver = poller.subscribe();

        assert!(poller.poll(at(10, 8)).await.is_err());
        assert!(!receiver.has_changed()?);
        assert!(receiver.borrow().is_empty());
        assert!(poller.accumulator.state("1").is_none());

        poller.provider.is_discovery_down = false;
        let readings = poller.poll(at(10, 9)).await?;
        assert_abs_diff_eq!(total(&readings, "1").0, 100.0);
        assert!(receiver.has_changed()?);
        assert_eq!(poller.provider.n_account_fetches, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_rediscovery_keeps_published_readings() -> Result {
        let mut provider = FakeProvider::with_accounts(&["1"]);
        provider.set("1", 100.0);
        let mut poller = Poller::builder().provider(provider).build();
        let receiver = poller.subscribe();
        let published = poller.poll(at(10, 8)).await?;

        // Authentication failure drops the accounts, and then the discovery is down:
        poller.provider.unauthorized_account = Some("1".to_owned());
        assert!(poller.poll(at(10, 9)).await.is_err());
        poller.provider.unauthorized_account = None;
        poller.provider.is_discovery_down = true;
        poller.provider.set("1", 10.0);
        assert!(poller.poll(at(10, 10)).await.is_err());

        assert_eq!(*receiver.borrow(), published);
        let state = poller.accumulator.state("1").unwrap();
        assert_abs_diff_eq!(state.previous.0, 100.0);
        assert_abs_diff_eq!(state.accumulated.0, 0.0);
        assert_eq!(state.last_seen_hour, 8);
        Ok(())
    }

    #[tokio::test]
    async fn test_poll_with_epb_api_fails_when_discovery_fails() -> Result {
        let mut server = Server::new_async().await;
        let _login = server
            .mock("POST", "/web/api/v1/login/")
            .with_status(200)
            .with_body(r#"{"tokens": {"access": {"token": "secret"}}}"#)
            .create_async()
            .await;
        let _links = server
            .mock("GET", "/web/api/v1/account-links/")
            .with_status(503)
            .with_body("Service Unavailable")
            .create_async()
            .await;

        let base_url: Url = server.url().parse()?;
        let api = epb::Api::new(&base_url, "user".into(), "password".into())?;
        let mut poller = Poller::builder().provider(api).build();
        let receiver = poller.subscribe();

        assert!(poller.poll(at(10, 8)).await.is_err());
        assert!(receiver.borrow().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_account_list_is_rediscovered() -> Result {
        let mut poller = Poller::builder().provider(FakeProvider::default()).build();
        let readings = poller.poll(at(10, 8)).await?;
        assert!(readings.is_empty());

        poller.provider.accounts = vec![Account::builder().id("1").build()];
        poller.provider.set("1", 5.0);
        let readings = poller.poll(at(10, 8)).await?;
        assert_abs_diff_eq!(total(&readings, "1").0, 5.0);
        assert_eq!(poller.provider.n_account_fetches, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() -> Result {
        let mut provider = FakeProvider::with_accounts(&["1"]);
        provider.set("1", 12.5);
        let poller = Poller::builder().provider(provider).build();
        let mut receiver = poller.subscribe();
        let mut shutdown_receiver = poller.subscribe();

        let shutdown = async move {
            let _ = shutdown_receiver.changed().await;
        };
        poller.run(Duration::from_secs(3600), shutdown).await;

        let readings = receiver.borrow_and_update();
        assert_abs_diff_eq!(readings["1"].total.0, 12.5);
        Ok(())
    }

    #[tokio::test]
    async fn test_poll_with_epb_api_absorbs_single_account_failure() -> Result {
        let mut server = Server::new_async().await;
        let _login = server
            .mock("POST", "/web/api/v1/login/")
            .with_status(200)
            .with_body(r#"{"tokens": {"access": {"token": "secret"}}}"#)
            .create_async()
            .await;
        let _links = server
            .mock("GET", "/web/api/v1/account-links/")
            .with_status(200)
            .with_body(
                r#"[{"power_account": {"account_id": "1"}}, {"power_account": {"account_id": "2"}}]"#,
            )
            .create_async()
            .await;
        let _failing = server
            .mock("POST", "/web/api/v1/usage/power/permanent/compare/daily")
            .match_body(Matcher::PartialJson(json!({"account_number": "1"})))
            .with_status(503)
            .create_async()
            .await;
        let _working = server
            .mock("POST", "/web/api/v1/usage/power/permanent/compare/daily")
            .match_body(Matcher::PartialJson(json!({"account_number": "2"})))
            .with_status(200)
            .with_body(r#"{"interval_a_totals": {"pos_kwh": 321.0, "pos_wh_est_cost": 40.1}}"#)
            .create_async()
            .await;

        let base_url: Url = server.url().parse()?;
        let api = epb::Api::new(&base_url, "user".into(), "password".into())?;
        let mut poller = Poller::builder().provider(api).build();

        let readings = poller.poll(at(10, 8)).await?;
        assert_abs_diff_eq!(total(&readings, "1").0, 0.0);
        assert_abs_diff_eq!(readings["1"].cost.0, 0.0);
        assert_abs_diff_eq!(total(&readings, "2").0, 321.0);
        assert_abs_diff_eq!(readings["2"].cost.0, 40.1);
        Ok(())
    }
}
