//! Activation functions

use super::{arity, saved};
use crate::autograd::{Context, Function, TensorId};
use crate::error::Result;
use crate::numeric::zip_with;
use ndarray::ArrayD;

/// ReLU activation
pub fn relu(ctx: &mut Context, a: TensorId) -> Result<TensorId> {
    ctx.apply(Relu::default(), &[a])
}

#[derive(Debug, Default)]
pub struct Relu {
    output: Option<ArrayD<f32>>,
}

impl Function for Relu {
    fn name(&self) -> &'static str {
        "relu"
    }

    fn forward(&mut self, inputs: &[&ArrayD<f32>], needs_grad: bool) -> Result<ArrayD<f32>> {
        let [x] = arity(self.name(), inputs)?;
        let output = x.mapv(|v| v.max(0.0));
        if needs_grad {
            self.output = Some(output.clone());
        }
        Ok(output)
    }

    fn backward(
        &self,
        grad: &ArrayD<f32>,
        needs_input_grad: &[bool],
    ) -> Result<Vec<Option<ArrayD<f32>>>> {
        // ∂L/∂x = ∂L/∂out * (out > 0)
        let output = saved(self.name(), &self.output)?;
        Ok(vec![needs_input_grad[0]
            .then(|| {
                zip_with(self.name(), grad, output, |g, y| if y > 0.0 { g } else { 0.0 })
            })
            .transpose()?])
    }
}
