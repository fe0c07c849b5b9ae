pub mod accumulator;
mod account;
pub mod reading;
mod sample;

pub use self::{
    accumulator::Accumulator,
    account::Account,
    reading::Readings,
    sample::UsageSample,
};
