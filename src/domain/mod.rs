//! Domain layer for the Harmony request engine
//!
//! Pure data types, rule tables and the ports the engine talks through.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
