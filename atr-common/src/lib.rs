//! # ATR Common Library
//!
//! Shared code for the target observation relay:
//! - Wire model (Envelope / Observation)
//! - Message normalization and validation errors
//! - Configuration loading
//! - Clock abstraction for timestamp defaults

pub mod config;
pub mod error;
pub mod model;
pub mod normalize;
pub mod time;

pub use error::{Error, Result, ValidationError};
pub use model::{Envelope, Observation};
pub use normalize::normalize;
