pub mod config;
pub mod error;
pub mod event;
pub mod schema;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{Result, ScribeError};
pub use event::EventBus;
pub use types::*;
