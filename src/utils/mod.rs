pub mod series;
pub mod metrics;
pub mod export;
pub mod config;
