//! Error handling for all parsing and pipeline steps

mod context;
mod custom_error;

pub use context::Context;
pub use custom_error::CustomError;
