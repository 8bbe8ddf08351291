//! Shape manipulation

use super::arity;
use crate::autograd::{Context, Function, TensorId};
use crate::error::{Error, Result};
use crate::numeric::{self, numel};
use ndarray::ArrayD;

/// Reshape `a` to `shape` in row-major order
pub fn reshape(ctx: &mut Context, a: TensorId, shape: &[usize]) -> Result<TensorId> {
    ctx.apply(Reshape::new(shape), &[a])
}

/// Flatten to `[numel]`, or to `[batch, numel / batch]` when `keep_batch` is set
pub fn flatten(ctx: &mut Context, a: TensorId, keep_batch: bool) -> Result<TensorId> {
    let shape = ctx.get(a)?.shape().to_vec();
    let total = numel(&shape);
    let target = match (keep_batch, shape.first()) {
        (true, Some(&batch)) if batch > 0 => vec![batch, total / batch],
        (true, _) => {
            return Err(Error::invalid(
                "flatten",
                format!("cannot keep a batch axis of shape {shape:?}"),
            ))
        }
        (false, _) => vec![total],
    };
    reshape(ctx, a, &target)
}

/// Copy `a` into a new leaf that does not track gradients
pub fn detach(ctx: &mut Context, a: TensorId) -> Result<TensorId> {
    let value = ctx.value(a)?.clone();
    Ok(ctx.tensor(value, false))
}

#[derive(Debug)]
pub struct Reshape {
    shape: Vec<usize>,
    input_shape: Option<Vec<usize>>,
}

impl Reshape {
    pub fn new(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            input_shape: None,
        }
    }
}

impl Function for Reshape {
    fn name(&self) -> &'static str {
        "reshape"
    }

    fn forward(&mut self, inputs: &[&ArrayD<f32>], needs_grad: bool) -> Result<ArrayD<f32>> {
        let [x] = arity(self.name(), inputs)?;
        if x.len() != numel(&self.shape) {
            return Err(Error::shape(self.name(), x.shape(), &self.shape));
        }
        if needs_grad {
            self.input_shape = Some(x.shape().to_vec());
        }
        numeric::reshape(x.clone(), &self.shape)
    }

    fn backward(
        &self,
        grad: &ArrayD<f32>,
        needs_input_grad: &[bool],
    ) -> Result<Vec<Option<ArrayD<f32>>>> {
        let input_shape = super::saved(self.name(), &self.input_shape)?;
        Ok(vec![needs_input_grad[0]
            .then(|| numeric::reshape(grad.clone(), input_shape))
            .transpose()?])
    }
}
