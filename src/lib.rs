pub mod config;
pub mod dashboard;
pub mod error;
pub mod monitor;
pub mod remote;
pub mod server;
pub mod shutdown;
