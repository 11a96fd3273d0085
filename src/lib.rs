pub mod collector;
pub mod config;
pub mod export;
pub mod metrics;
pub mod wazuh;
