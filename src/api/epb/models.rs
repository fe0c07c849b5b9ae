use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use serde_with::serde_as;

use crate::{
    core::{Account, UsageSample},
    prelude::*,
    quantity::Quantity,
};

#[derive(Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub grant_type: &'static str,
}

#[derive(Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    tokens: Option<Tokens>,
}

#[derive(Deserialize)]
struct Tokens {
    #[serde(default)]
    access: Option<AccessToken>,
}

#[derive(Deserialize)]
struct AccessToken {
    #[serde(default)]
    token: Option<String>,
}

impl LoginResponse {
    /// Access token, if the response carries a non-empty one.
    pub fn into_token(self) -> Option<String> {
        self.tokens?.access?.token.filter(|token| !token.is_empty())
    }
}

#[must_use]
#[serde_as]
#[derive(Deserialize, derive_more::IntoIterator)]
pub struct AccountLinks(#[serde_as(as = "serde_with::VecSkipError<_>")] pub Vec<AccountLink>);

#[derive(Deserialize)]
pub struct AccountLink {
    pub power_account: PowerAccount,

    #[serde(default)]
    pub premise: Option<Premise>,
}

#[derive(Deserialize)]
pub struct PowerAccount {
    #[serde(default)]
    pub account_id: Option<String>,

    #[serde(default)]
    pub nickname: Option<String>,

    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct Premise {
    #[serde(default)]
    pub gis_id: Option<i64>,

    #[serde(default)]
    pub full_service_address: Option<String>,
}

impl AccountLink {
    /// Convert into the account, given the link carries a non-empty account ID.
    pub fn into_account(self) -> Option<Account> {
        let id = self.power_account.account_id.filter(|id| !id.is_empty())?;
        let premise = self.premise;
        Some(
            Account::builder()
                .id(id)
                .maybe_gis_id(premise.as_ref().and_then(|premise| premise.gis_id))
                .maybe_nickname(self.power_account.nickname)
                .maybe_status(self.power_account.status)
                .maybe_address(premise.and_then(|premise| premise.full_service_address))
                .build(),
        )
    }
}

#[derive(Serialize)]
pub struct UsageRequest<'a> {
    pub account_number: &'a str,
    pub gis_id: Option<i64>,
    pub zone_id: &'static str,
    pub usage_year: i32,
    pub usage_month: u32,
}

#[serde_as]
#[derive(Deserialize)]
pub struct UsageResponse {
    /// Month-to-date totals.
    #[serde(default, rename = "interval_a_totals")]
    totals: Option<UsageValues>,

    /// Daily breakdown in chronological order.
    #[serde_as(as = "Option<serde_with::VecSkipError<_>>")]
    #[serde(rename = "data")]
    days: Option<Vec<DailyEntry>>,
}

#[derive(Deserialize)]
struct DailyEntry {
    #[serde(default, rename = "a")]
    interval: Option<DailyInterval>,
}

#[derive(Deserialize)]
struct DailyInterval {
    #[serde(default)]
    values: Option<UsageValues>,
}

#[derive(Copy, Clone, Default, Deserialize)]
struct UsageValues {
    #[serde(default, rename = "pos_kwh", deserialize_with = "deserialize_lenient")]
    kwh: Option<f64>,

    #[serde(default, rename = "pos_wh_est_cost", deserialize_with = "deserialize_lenient")]
    cost: Option<f64>,
}

impl UsageValues {
    const fn is_empty(self) -> bool {
        self.kwh.is_none() && self.cost.is_none()
    }
}

impl UsageResponse {
    /// Extract the usage sample, falling back to the daily values when the totals are missing.
    pub fn into_sample(self) -> UsageSample {
        let totals = self.totals.unwrap_or_default();
        let latest_day = self
            .days
            .unwrap_or_default()
            .into_iter()
            .rev()
            .find_map(|entry| entry.interval?.values.filter(|values| !values.is_empty()))
            .unwrap_or_default();

        let mut sample = UsageSample::builder()
            .kwh(Quantity(totals.kwh.unwrap_or_default()))
            .cost(Quantity(totals.cost.unwrap_or_default()))
            .daily_kwh(Quantity(latest_day.kwh.unwrap_or_default()))
            .daily_cost(Quantity(latest_day.cost.unwrap_or_default()))
            .build();
        debug!(kwh = ?sample.kwh, cost = ?sample.cost, "month-to-date totals");
        debug!(kwh = ?sample.daily_kwh, cost = ?sample.daily_cost, "latest daily usage");

        if sample.kwh.is_zero() && sample.daily_kwh > Quantity::ZERO {
            warn!("no totals found, using the daily values instead");
            sample.kwh = sample.daily_kwh;
            sample.cost = sample.daily_cost;
        }
        if sample.kwh.is_zero() && sample.daily_kwh.is_zero() {
            warn!("no usage data found in the response");
        }
        sample
    }
}

/// Accept a non-negative number or numeric string, degrade anything else to `None`.
fn deserialize_lenient<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let number: Option<f64> = match &value {
        Value::Null => None,
        Value::Number(number) => number.as_f64(),
        Value::String(string) => string.trim().parse().ok(),
        _ => None,
    };
    let number = number.filter(|number| number.is_finite() && *number >= 0.0);
    if number.is_none() && !value.is_null() {
        warn!(%value, "unusable numeric field, defaulting to zero");
    }
    Ok(number)
}
