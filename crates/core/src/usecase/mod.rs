pub mod app_service;
pub mod chat_store;
pub mod job_service;
pub mod poller;
