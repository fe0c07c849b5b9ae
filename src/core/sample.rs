use crate::quantity::{cost::Cost, energy::KilowattHours};

/// Normalized usage record for one account at one poll time.
#[must_use]
#[derive(Copy, Clone, Debug, Default, PartialEq, bon::Builder)]
pub struct UsageSample {
    /// Month-to-date energy usage, as reported upstream.
    #[builder(default)]
    pub kwh: KilowattHours,

    /// Month-to-date estimated cost.
    #[builder(default)]
    pub cost: Cost,

    /// Usage on the most recent day with data.
    #[builder(default)]
    pub daily_kwh: KilowattHours,

    #[builder(default)]
    pub daily_cost: Cost,
}

impl UsageSample {
    /// Placeholder for an account whose usage could not be fetched.
    pub const ZERO: Self = Self {
        kwh: KilowattHours::ZERO,
        cost: Cost::ZERO,
        daily_kwh: KilowattHours::ZERO,
        daily_cost: Cost::ZERO,
    };
}
