pub mod ask;
pub mod config;
pub mod patient;
pub mod session;
