//! Autograd operations with backward passes

mod activations;
mod basic;
mod linear;
mod math;
mod reduce;
mod shape;

pub use activations::{relu, Relu};
pub use basic::{add, div, mul, sub, Add, Divide, Multiply, Subtract};
pub use linear::{linear, Linear};
pub use math::{exp, log, pow, pow_scalar, sqrt, Exp, Log, Pow, Sqrt};
pub use reduce::{max, mean, sum, Max, Sum};
pub use shape::{detach, flatten, reshape, Reshape};

use crate::error::{Error, Result};
use ndarray::ArrayD;

/// Destructure the forward inputs of an operation with a fixed arity
fn arity<'a, const N: usize>(
    op: &'static str,
    inputs: &[&'a ArrayD<f32>],
) -> Result<[&'a ArrayD<f32>; N]> {
    inputs.try_into().map_err(|_| {
        Error::invalid(op, format!("expected {N} inputs, got {}", inputs.len()))
    })
}

/// Borrow an intermediate saved during forward
fn saved<'a, T>(op: &'static str, slot: &'a Option<T>) -> Result<&'a T> {
    slot.as_ref().ok_or_else(|| {
        Error::BackwardFailed(format!("{op}: forward intermediates were not saved"))
    })
}
