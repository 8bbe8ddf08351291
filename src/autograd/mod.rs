//! Dynamic-graph autograd engine
//!
//! Operations applied through a [`Context`] record the graph as they run.
//! Calling [`backward`] on a node walks that graph once, in reverse
//! topological order, and accumulates gradients into every tracked ancestor.
//!
//! ```
//! use derivar::autograd::{add, backward, mul, Context};
//!
//! let mut ctx = Context::new();
//! let x = ctx.scalar(3.0, true);
//! let one = ctx.scalar(1.0, false);
//! let y = mul(&mut ctx, x, x)?;
//! let z = add(&mut ctx, y, one)?;
//!
//! backward(&mut ctx, z, None)?;
//! assert_eq!(ctx.grad(x).unwrap()[[0]], 6.0);
//! # Ok::<(), derivar::Error>(())
//! ```

mod backward;
mod context;
mod engine;
mod ops;
mod tensor;

#[cfg(test)]
mod tests;

pub use backward::{Function, GradFn};
pub use context::{Context, NoGradGuard};
pub use ops::*;
pub use tensor::{Tensor, TensorId};

use crate::error::Result;
use ndarray::ArrayD;

/// Perform backward pass from `root`
///
/// `grad_output` seeds the root gradient and must match its shape; `None`
/// seeds with ones, which is the gradient of a scalar loss.
pub fn backward(ctx: &mut Context, root: TensorId, grad_output: Option<ArrayD<f32>>) -> Result<()> {
    engine::run(ctx, root, grad_output)
}
