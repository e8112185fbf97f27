pub mod config;
pub mod crl;
pub mod telemetry;
pub mod tls;
