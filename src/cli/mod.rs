pub mod actions;
pub mod commands;
pub mod dispatch;
pub mod report;
pub mod start;
pub mod telemetry;

pub use start::start;
