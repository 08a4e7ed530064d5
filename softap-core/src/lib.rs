//! Core library for the SoftAP controller.
//! This crate drives wpa_supplicant into access point mode and back: it
//! saves the station configuration, provisions the AP network over the
//! control socket, keeps the supplicant's event queue drained while the AP
//! is up, and reports AP / tethering state changes to the modem access
//! daemon over D-Bus.

pub mod command;
pub mod config;
pub mod config_store;
pub mod ctrl_socket;
pub mod drain;
pub mod lifecycle;
pub mod notifier;
pub mod process;
pub mod provisioning;
pub mod session;
pub mod traits;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use config::SoftapConfig;
pub use session::{SessionController, SessionState};

// Define a shared Error and Result type for the entire crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command [{command}] failed, reply [{reply}]")]
    Protocol { command: String, reply: String },

    #[error("Command exceeds {max} bytes: {len}")]
    CommandTooLong { len: usize, max: usize },

    #[error("Supplicant connection error: {0}")]
    Connection(String),

    #[error("Missing arguments: got {got}, need at least {need}")]
    MissingArguments { got: usize, need: usize },

    #[error("Invalid channel: {0}")]
    InvalidChannel(String),

    #[cfg(feature = "mad")]
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("{} teardown step(s) failed: {}", .0.len(), join_errors(.0))]
    Teardown(Vec<Error>),
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Negative errno-style result code reported back to the caller of a
    /// softap command.
    pub fn code(&self) -> i32 {
        match self {
            Error::Io(e) => -e.raw_os_error().unwrap_or(5),
            Error::Protocol { .. } => -71,
            Error::CommandTooLong { .. } => -7,
            Error::Connection(_) => -111,
            Error::MissingArguments { .. } | Error::InvalidChannel(_) => -22,
            #[cfg(feature = "mad")]
            Error::Dbus(_) => -111,
            Error::Config(_) => -22,
            Error::Unsupported(_) => -95,
            Error::Teardown(errors) => errors.first().map(Error::code).unwrap_or(-1),
        }
    }
}

/// A specialized `Result` type for this crate's operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Collects failures from teardown steps that must all run even when an
/// earlier one fails.
#[derive(Debug, Default)]
pub struct Failures(Vec<Error>);

impl Failures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the error of `result`, if any.
    pub fn note<T>(&mut self, result: Result<T>) {
        if let Err(e) = result {
            self.push(e);
        }
    }

    /// Records an error. Nested teardown errors are flattened.
    pub fn push(&mut self, error: Error) {
        match error {
            Error::Teardown(inner) => self.0.extend(inner),
            other => self.0.push(other),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(Error::Teardown(self.0))
        }
    }
}
