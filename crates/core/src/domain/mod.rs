pub mod error;
pub mod job;
pub mod server_status;
pub mod settings;
pub mod types;

mod serde_tests;
