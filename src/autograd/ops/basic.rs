//! Elementwise arithmetic with broadcasting

use super::{arity, saved};
use crate::autograd::{Context, Function, TensorId};
use crate::error::Result;
use crate::numeric::{reduce_to_shape, zip_with};
use ndarray::ArrayD;

/// Add two tensors: `a + b`
pub fn add(ctx: &mut Context, a: TensorId, b: TensorId) -> Result<TensorId> {
    ctx.apply(Add::default(), &[a, b])
}

/// Subtract two tensors: `a - b`
pub fn sub(ctx: &mut Context, a: TensorId, b: TensorId) -> Result<TensorId> {
    ctx.apply(Subtract::default(), &[a, b])
}

/// Multiply two tensors element-wise: `a ⊙ b`
pub fn mul(ctx: &mut Context, a: TensorId, b: TensorId) -> Result<TensorId> {
    ctx.apply(Multiply::default(), &[a, b])
}

/// Divide two tensors element-wise: `a / b`
pub fn div(ctx: &mut Context, a: TensorId, b: TensorId) -> Result<TensorId> {
    ctx.apply(Divide::default(), &[a, b])
}

#[derive(Debug, Default)]
pub struct Add {
    shapes: Option<(Vec<usize>, Vec<usize>)>,
}

impl Function for Add {
    fn name(&self) -> &'static str {
        "add"
    }

    fn forward(&mut self, inputs: &[&ArrayD<f32>], needs_grad: bool) -> Result<ArrayD<f32>> {
        let [a, b] = arity(self.name(), inputs)?;
        let out = zip_with(self.name(), a, b, |x, y| x + y)?;
        if needs_grad {
            self.shapes = Some((a.shape().to_vec(), b.shape().to_vec()));
        }
        Ok(out)
    }

    fn backward(
        &self,
        grad: &ArrayD<f32>,
        needs_input_grad: &[bool],
    ) -> Result<Vec<Option<ArrayD<f32>>>> {
        // ∂L/∂a = ∂L/∂out, ∂L/∂b = ∂L/∂out (reduced over broadcast axes)
        let (a_shape, b_shape) = saved(self.name(), &self.shapes)?;
        Ok(vec![
            needs_input_grad[0]
                .then(|| reduce_to_shape(a_shape, grad.clone()))
                .transpose()?,
            needs_input_grad[1]
                .then(|| reduce_to_shape(b_shape, grad.clone()))
                .transpose()?,
        ])
    }
}

#[derive(Debug, Default)]
pub struct Subtract {
    shapes: Option<(Vec<usize>, Vec<usize>)>,
}

impl Function for Subtract {
    fn name(&self) -> &'static str {
        "sub"
    }

    fn forward(&mut self, inputs: &[&ArrayD<f32>], needs_grad: bool) -> Result<ArrayD<f32>> {
        let [a, b] = arity(self.name(), inputs)?;
        let out = zip_with(self.name(), a, b, |x, y| x - y)?;
        if needs_grad {
            self.shapes = Some((a.shape().to_vec(), b.shape().to_vec()));
        }
        Ok(out)
    }

    fn backward(
        &self,
        grad: &ArrayD<f32>,
        needs_input_grad: &[bool],
    ) -> Result<Vec<Option<ArrayD<f32>>>> {
        let (a_shape, b_shape) = saved(self.name(), &self.shapes)?;
        Ok(vec![
            needs_input_grad[0]
                .then(|| reduce_to_shape(a_shape, grad.clone()))
                .transpose()?,
            needs_input_grad[1]
                .then(|| reduce_to_shape(b_shape, grad.mapv(|g| -g)))
                .transpose()?,
        ])
    }
}

#[derive(Debug, Default)]
pub struct Multiply {
    saved: Option<(ArrayD<f32>, ArrayD<f32>)>,
}

impl Function for Multiply {
    fn name(&self) -> &'static str {
        "mul"
    }

    fn forward(&mut self, inputs: &[&ArrayD<f32>], needs_grad: bool) -> Result<ArrayD<f32>> {
        let [a, b] = arity(self.name(), inputs)?;
        let out = zip_with(self.name(), a, b, |x, y| x * y)?;
        if needs_grad {
            self.saved = Some((a.clone(), b.clone()));
        }
        Ok(out)
    }

    fn backward(
        &self,
        grad: &ArrayD<f32>,
        needs_input_grad: &[bool],
    ) -> Result<Vec<Option<ArrayD<f32>>>> {
        let (a, b) = saved(self.name(), &self.saved)?;
        let grad_a = needs_input_grad[0]
            .then(|| {
                // ∂L/∂a = ∂L/∂out ⊙ b
                let full = zip_with(self.name(), grad, b, |g, y| g * y)?;
                reduce_to_shape(a.shape(), full)
            })
            .transpose()?;
        let grad_b = needs_input_grad[1]
            .then(|| {
                // ∂L/∂b = ∂L/∂out ⊙ a
                let full = zip_with(self.name(), grad, a, |g, x| g * x)?;
                reduce_to_shape(b.shape(), full)
            })
            .transpose()?;
        Ok(vec![grad_a, grad_b])
    }
}

#[derive(Debug, Default)]
pub struct Divide {
    saved: Option<(ArrayD<f32>, ArrayD<f32>)>,
}

impl Function for Divide {
    fn name(&self) -> &'static str {
        "div"
    }

    fn forward(&mut self, inputs: &[&ArrayD<f32>], needs_grad: bool) -> Result<ArrayD<f32>> {
        let [a, b] = arity(self.name(), inputs)?;
        let out = zip_with(self.name(), a, b, |x, y| x / y)?;
        if needs_grad {
            self.saved = Some((a.clone(), b.clone()));
        }
        Ok(out)
    }

    fn backward(
        &self,
        grad: &ArrayD<f32>,
        needs_input_grad: &[bool],
    ) -> Result<Vec<Option<ArrayD<f32>>>> {
        let (a, b) = saved(self.name(), &self.saved)?;
        let grad_a = needs_input_grad[0]
            .then(|| {
                // ∂L/∂a = ∂L/∂out / b
                let full = zip_with(self.name(), grad, b, |g, y| g / y)?;
                reduce_to_shape(a.shape(), full)
            })
            .transpose()?;
        let grad_b = needs_input_grad[1]
            .then(|| {
                // ∂L/∂b = -∂L/∂out ⊙ a / b²
                let numer = zip_with(self.name(), grad, a, |g, x| -g * x)?;
                let full = zip_with(self.name(), &numer, b, |n, y| n / (y * y))?;
                reduce_to_shape(b.shape(), full)
            })
            .transpose()?;
        Ok(vec![grad_a, grad_b])
    }
}
