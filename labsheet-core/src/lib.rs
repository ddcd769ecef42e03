#![deny(clippy::all)]

pub mod auth;
pub mod config;
pub mod encoding;
pub mod error;
pub mod export;
pub mod form;
pub mod gate;
pub mod record;
pub mod renderer;
pub mod session;
pub mod storage;
pub mod template;

pub use config::{AppConfig, Labels};
pub use error::{AuthError, ConfigError, FormError, StoreError};
pub use form::{FormContext, FormSession};
pub use record::Record;
pub use session::Session;
pub use storage::{MemoryStore, OpendalStore, TabularStore};
pub use template::Template;
