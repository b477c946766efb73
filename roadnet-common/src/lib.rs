//! Common types for the roadnet toolkit

pub mod error;

pub use error::{Error, Result};
