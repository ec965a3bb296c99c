pub mod activity_log;
pub mod config_store;
pub mod defaults;
pub mod files;
pub mod live;
pub mod rest;
pub mod secrets;
pub mod session_builder;
