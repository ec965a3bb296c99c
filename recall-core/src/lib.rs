pub mod activity;
pub mod config;
pub mod error;
pub mod events;
pub mod live;
pub mod types;

// Keep the public surface small and intentional.
pub use activity::*;
pub use config::*;
pub use error::*;
pub use events::*;
pub use live::*;
pub use types::*;
