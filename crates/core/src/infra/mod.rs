pub mod api;
pub mod convert;
pub mod metrics;
pub mod upload;
