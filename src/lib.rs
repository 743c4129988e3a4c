#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod events;
pub mod lock;
pub mod mode;
pub mod models;
pub mod prime;
pub mod role;
pub mod session;
pub mod workspace;

pub use config::IdentityConfig;
pub use errors::{AppError, Result};
