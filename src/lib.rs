//! # Derivar: reverse-mode automatic differentiation
//!
//! Derivar builds a dynamic computation graph while tensor operations run,
//! then replays it backward to compute gradients with the chain rule.
//!
//! ## Architecture
//!
//! - **autograd**: graph arena ([`Context`]), operation library and backward engine
//! - **numeric**: broadcast-aware gradient reduction and generalized tensor contraction
//! - **config**: declarative YAML settings for the engine
//!
//! `ndarray` serves as the underlying array engine.

pub mod autograd;
pub mod config;
pub mod numeric;

pub mod error;

// Re-export commonly used types
pub use autograd::{backward, Context, Function, Tensor, TensorId};
pub use config::GradConfig;
pub use error::{Error, Result};
