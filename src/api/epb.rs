//! [EPB](https://epb.com) customer portal API client.

mod error;
mod models;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use reqwest::{Client, Method, StatusCode, Url};
use serde::{Serialize, de::DeserializeOwned};

pub use self::error::Error;
use self::models::{
    AccountLink,
    AccountLinks,
    LoginRequest,
    LoginResponse,
    UsageRequest,
    UsageResponse,
};
use crate::{
    api::{client, usage_provider::UsageProvider},
    core::{Account, UsageSample},
    prelude::*,
};

pub const DEFAULT_BASE_URL: &str = "https://api.epb.com";

/// How many times a single call may re-authenticate after the token has expired.
pub const MAX_TOKEN_REFRESHES: usize = 1;

const TOKEN_HEADER: &str = "X-User-Token";
const TOKEN_EXPIRED: &str = "TOKEN_EXPIRED";
const ZONE_ID: &str = "America/New_York";

pub struct Api {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    token: Option<String>,
}

impl Api {
    pub fn new(base_url: &Url, username: String, password: String) -> Result<Self, Error> {
        Ok(Self {
            client: client::try_new()?,
            base_url: base_url.as_str().trim_end_matches('/').to_owned(),
            username,
            password,
            token: None,
        })
    }

    /// Exchange the credentials for a fresh access token.
    #[instrument(skip_all, fields(username = %self.username))]
    pub async fn authenticate(&mut self) -> Result<(), Error> {
        info!("authenticating…");
        self.token = None;
        let response = self
            .client
            .post(self.endpoint("web/api/v1/login/"))
            .json(&LoginRequest {
                username: &self.username,
                password: &self.password,
                grant_type: "PASSWORD",
            })
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(%status, "login responded");

        if !status.is_success() {
            return Err(Error::auth(format!("login failed with `{status}`: {body}")));
        }
        let token = serde_json::from_str::<LoginResponse>(&body)
            .ok()
            .and_then(LoginResponse::into_token)
            .ok_or_else(|| Error::auth("no token in the login response"))?;
        self.token = Some(token);
        info!("authenticated");
        Ok(())
    }

    async fn token(&mut self) -> Result<String, Error> {
        if self.token.is_none() {
            self.authenticate().await?;
        }
        self.token.clone().ok_or_else(|| Error::auth("no access token"))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// Make an authenticated call, re-authenticating on token expiration.
    #[instrument(skip_all, level = Level::DEBUG, fields(path = path))]
    async fn call<B: Serialize + Sync, R: DeserializeOwned>(
        &mut self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<R, Error> {
        let url = self.endpoint(path);

        for attempt in 0..=MAX_TOKEN_REFRESHES {
            let token = self.token().await?;
            let mut request =
                self.client.request(method.clone(), &url).header(TOKEN_HEADER, token);
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request.send().await?;
            let status = response.status();
            let text = response.text().await?;
            debug!(%status, attempt, "call responded");

            if status == StatusCode::BAD_REQUEST && text.contains(TOKEN_EXPIRED) {
                info!(attempt, "token expired");
                self.token = None;
                continue;
            }
            if !status.is_success() {
                return Err(Error::Api { status, body: text });
            }
            return Ok(serde_json::from_str(&text)?);
        }

        Err(Error::auth(format!(
            "token still expired after {MAX_TOKEN_REFRESHES} re-authentication(s)"
        )))
    }

    #[cfg(test)]
    fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_owned());
        self
    }
}

#[async_trait]
impl UsageProvider for Api {
    #[instrument(skip_all)]
    async fn fetch_accounts(&mut self) -> Result<Vec<Account>, Error> {
        info!("fetching the account links…");
        let links: AccountLinks =
            self.call(Method::GET, "web/api/v1/account-links/", None::<&()>).await?;
        let accounts: Vec<Account> =
            links.into_iter().filter_map(AccountLink::into_account).collect();
        info!(n_accounts = accounts.len(), "fetched");
        Ok(accounts)
    }

    #[instrument(skip_all, fields(account_id = %account.id, on = %on))]
    async fn fetch_usage(&mut self, account: &Account, on: NaiveDate) -> Result<UsageSample, Error> {
        // Failing to authenticate is not specific to the account.
        self.token().await?;

        let request = UsageRequest {
            account_number: &account.id,
            gis_id: account.gis_id,
            zone_id: ZONE_ID,
            usage_year: on.year(),
            usage_month: on.month(),
        };
        let result = self
            .call::<_, UsageResponse>(
                Method::POST,
                "web/api/v1/usage/power/permanent/compare/daily",
                Some(&request),
            )
            .await;

        match result {
            Ok(response) => {
                let sample = response.into_sample();
                info!(kwh = ?sample.kwh, cost = ?sample.cost, "fetched");
                Ok(sample)
            }
            Err(error) if error.is_auth() => Err(error),
            Err(error) => {
                let error = anyhow::Error::from(error);
                error!("failed to fetch the usage, substituting zeros: {error:#}");
                Ok(UsageSample::ZERO)
            }
        }
    }
}
