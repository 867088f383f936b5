//! # Error Types
//!
//! This module defines the error taxonomy of the optimizer. Errors fall into
//! two groups:
//!
//! - **Fatal** errors abort initialization or the generational loop:
//!   [`OptimizerError::Configuration`], [`OptimizerError::IncompatibleState`],
//!   [`OptimizerError::Storage`] and [`OptimizerError::Serialization`].
//! - **Contained** errors never leave their boundary:
//!   [`OptimizerError::Evaluation`] is turned into an invalid result record by
//!   the batch evaluator, and [`OptimizerError::Telemetry`] is logged and
//!   dropped by the optimizer.
//!
//! ## Examples
//!
//! Using the `ResultExt` trait to wrap a backend error of a checkpoint store:
//!
//! ```rust
//! use roboevo::error::{OptimizerError, Result, ResultExt};
//! use std::fs::File;
//!
//! fn open_snapshot(path: &str) -> Result<File> {
//!     File::open(path).context(format!("Failed to open snapshot {}", path))
//! }
//!
//! assert!(matches!(
//!     open_snapshot("/does/not/exist"),
//!     Err(OptimizerError::Storage(_))
//! ));
//! ```

use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Represents errors that can occur while initializing or running the optimizer.
#[derive(Error, Debug)]
pub enum OptimizerError {
    /// An invalid or inconsistent configuration was supplied.
    ///
    /// Raised for unknown fitness function names, malformed population sizes
    /// and configuration that does not match a stored checkpoint.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The checkpoint store holds data that cannot belong to a consistent run.
    #[error("Incompatible checkpoint state: {0}")]
    IncompatibleState(String),

    /// A single evaluation failed.
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// The telemetry sink rejected a report.
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// The checkpoint store failed to read or write.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A persisted payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An operation required a non-empty population.
    #[error("Empty population error: Cannot operate on an empty population")]
    EmptyPopulation,
}

impl From<rusqlite::Error> for OptimizerError {
    fn from(error: rusqlite::Error) -> Self {
        OptimizerError::Storage(error.to_string())
    }
}

impl From<serde_json::Error> for OptimizerError {
    fn from(error: serde_json::Error) -> Self {
        OptimizerError::Serialization(error.to_string())
    }
}

impl OptimizerError {
    /// Returns `true` for errors that must abort the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            OptimizerError::Evaluation(_) | OptimizerError::Telemetry(_)
        )
    }
}

/// A specialized Result type for optimizer operations.
pub type Result<T> = std::result::Result<T, OptimizerError>;

/// Extension trait for wrapping backend errors of a checkpoint store.
pub trait ResultExt<T, E> {
    /// Converts the error into an [`OptimizerError::Storage`] prefixed with `context`.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: fmt::Display + Send + Sync + 'static;
}

impl<T, E> ResultExt<T, E> for std::result::Result<T, E>
where
    E: StdError + Send + Sync + 'static,
{
    fn context<C>(self, context: C) -> Result<T>
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| OptimizerError::Storage(format!("{}: {}", context, e)))
    }
}
