pub mod config;
pub mod error;
pub mod pipeline;
pub mod platform;
pub mod report;
pub mod shutdown;
