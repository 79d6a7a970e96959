//! Common types, protocol definitions, and errors shared across `flow-endpoint` crates.

pub mod error;
pub mod protocol;

pub use error::FlowError;
