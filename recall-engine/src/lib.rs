pub mod activity;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod session;
pub mod traits;
