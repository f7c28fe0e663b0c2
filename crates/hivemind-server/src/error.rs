//! Server errors.

use thiserror::Error;

use hivemind_bus::BusError;
use hivemind_control_plane::{DispatchError, FleetError};
use hivemind_core::CoreError;

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] CoreError),

    #[error("Message bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Failed to start worker: {0}")]
    Fleet(#[from] FleetError),

    #[error("Failed to seed tasks: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
