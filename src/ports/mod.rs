//! Port traits for the collaborators the engine consumes.

pub mod calendar_port;
pub mod config_port;
pub mod data_port;
pub mod execution_port;
