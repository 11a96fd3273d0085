pub mod health;
pub mod server;

pub use health::ExporterMetrics;
pub use server::MetricsServer;
