pub mod artifact;
pub mod config;
pub mod error;
pub mod gatekeeper;
pub mod history;
pub mod io;
pub mod lock;
pub mod paths;
pub mod pending;
pub mod processed;
pub mod publish;
pub mod runner;
pub mod secrets;
pub mod unit;

pub use error::{ReelError, Result};
