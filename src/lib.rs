pub mod client;
pub mod config;
pub mod errors;
pub mod job_scheduling;
pub mod observability;
pub mod shutdown;
pub mod store;
pub mod web;
