//! Statistics for the signaling broker

pub mod metrics;

pub use metrics::BrokerStats;
