//! Requerimiento submission flow and the local development proxy.

pub mod cli;
pub mod form;
pub mod location;
pub mod problem;
pub mod proxy;
pub mod router;
pub mod telemetry;
