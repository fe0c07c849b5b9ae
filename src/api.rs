pub mod client;
pub mod epb;
pub mod usage_provider;

pub use self::usage_provider::UsageProvider;
