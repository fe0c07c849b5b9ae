//! Turns the resettable month-to-date counter into a monotonic cumulative series.
//!
//! EPB occasionally drops the month-to-date counter to near zero in the middle of the month.
//! The accumulator keeps a running total of the values lost to such drops and publishes
//! `accumulated + raw`, so the energy dashboard keeps seeing a non-decreasing total.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, Timelike};

use crate::{
    core::{reading::Reading, sample::UsageSample},
    prelude::*,
    quantity::{Quantity, energy::KilowattHours},
};

/// Relative drop of the counter above which the drop is treated as an upstream reset.
pub const RESET_DROP_THRESHOLD: f64 = 0.5;

/// Previous value below which reset detection is skipped altogether.
pub const MIN_RESET_BASELINE: KilowattHours = Quantity(0.1);

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AccumulationState {
    /// Raw counter value from the previous sample.
    pub previous: KilowattHours,

    /// Sum of the counter values folded in on detected resets.
    pub accumulated: KilowattHours,

    pub last_seen_hour: u32,
    pub last_seen_day: NaiveDate,
}

impl AccumulationState {
    fn new(sample: KilowattHours, at: NaiveDateTime) -> Self {
        Self {
            previous: sample,
            accumulated: KilowattHours::ZERO,
            last_seen_hour: at.time().hour(),
            last_seen_day: at.date(),
        }
    }

    /// Relative drop from the previous value, if the counter went down from a meaningful baseline.
    fn drop_to(&self, current: KilowattHours) -> Option<f64> {
        (self.previous > MIN_RESET_BASELINE && current < self.previous)
            .then(|| 1.0 - current / self.previous)
    }
}

/// Per-account accumulation states of one scheduler instance.
#[must_use]
#[derive(Default)]
pub struct Accumulator {
    /// Local date of the latest poll cycle.
    current_day: Option<NaiveDate>,

    states: HashMap<String, AccumulationState>,
}

impl Accumulator {
    /// Mark the beginning of a poll cycle.
    ///
    /// Must be called once per cycle, before any [`Accumulator::ingest`] of that cycle.
    /// When the day changes, all the accumulated totals get cleared.
    pub fn start_cycle(&mut self, today: NaiveDate) {
        if let Some(current_day) = self.current_day
            && current_day != today
        {
            info!(
                %current_day,
                %today,
                n_accounts = self.states.len(),
                "new day, resetting the accumulated totals"
            );
            for state in self.states.values_mut() {
                state.accumulated = KilowattHours::ZERO;
            }
        }
        self.current_day = Some(today);
    }

    /// Fold the account's sample into its state and return the reading to publish.
    pub fn ingest(&mut self, account_id: &str, sample: &UsageSample, at: NaiveDateTime) -> Reading {
        let current = sample.kwh;
        let hour = at.time().hour();

        let state = self
            .states
            .entry(account_id.to_owned())
            .or_insert_with(|| AccumulationState::new(current, at));

        if hour != state.last_seen_hour {
            debug!(account_id, from = state.last_seen_hour, to = hour, "hour changed");
            if let Some(drop) = state.drop_to(current)
                && drop > RESET_DROP_THRESHOLD
            {
                info!(
                    account_id,
                    previous = ?state.previous,
                    ?current,
                    drop_percent = drop * 100.0,
                    "counter reset detected"
                );
                state.accumulated += state.previous;
            }
            state.last_seen_hour = hour;
        }

        state.previous = current;
        state.last_seen_day = at.date();

        let reading =
            Reading { total: state.accumulated + current, raw: current, cost: sample.cost };
        debug!(
            account_id,
            raw = ?reading.raw,
            accumulated = ?state.accumulated,
            total = ?reading.total
        );
        reading
    }

    #[cfg(test)]
    #[must_use]
    pub fn state(&self, account_id: &str) -> Option<&AccumulationState> {
        self.states.get(account_id)
    }
}
