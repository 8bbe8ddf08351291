//! Power, exponential, logarithm and square root

use super::{arity, saved};
use crate::autograd::{Context, Function, TensorId};
use crate::error::{Error, Result};
use crate::numeric::{reduce_to_shape, zip_with};
use ndarray::{ArrayD, IxDyn, Zip};

/// Raise `a` to a single-valued exponent tensor `b`
///
/// The exponent may itself track gradients; it must hold exactly one element.
pub fn pow(ctx: &mut Context, a: TensorId, b: TensorId) -> Result<TensorId> {
    ctx.apply(Pow::default(), &[a, b])
}

/// Raise `a` to a constant exponent
pub fn pow_scalar(ctx: &mut Context, a: TensorId, exponent: f32) -> Result<TensorId> {
    let b = ctx.constant(ArrayD::from_elem(IxDyn(&[1]), exponent));
    pow(ctx, a, b)
}

/// Element-wise natural exponential
pub fn exp(ctx: &mut Context, a: TensorId) -> Result<TensorId> {
    ctx.apply(Exp::default(), &[a])
}

/// Element-wise natural logarithm
pub fn log(ctx: &mut Context, a: TensorId) -> Result<TensorId> {
    ctx.apply(Log::default(), &[a])
}

/// Element-wise square root
pub fn sqrt(ctx: &mut Context, a: TensorId) -> Result<TensorId> {
    ctx.apply(Sqrt::default(), &[a])
}

#[derive(Debug)]
struct PowSaved {
    base: ArrayD<f32>,
    exponent: f32,
    exponent_shape: Vec<usize>,
    result: ArrayD<f32>,
}

#[derive(Debug, Default)]
pub struct Pow {
    saved: Option<PowSaved>,
}

impl Function for Pow {
    fn name(&self) -> &'static str {
        "pow"
    }

    fn forward(&mut self, inputs: &[&ArrayD<f32>], needs_grad: bool) -> Result<ArrayD<f32>> {
        let [a, b] = arity(self.name(), inputs)?;
        let exponent = match b.len() {
            1 => b.iter().next().copied(),
            _ => None,
        }
        .ok_or_else(|| {
            Error::invalid(
                self.name(),
                format!("exponent must hold a single value, got shape {:?}", b.shape()),
            )
        })?;

        let result = a.mapv(|x| x.powf(exponent));
        if needs_grad {
            self.saved = Some(PowSaved {
                base: a.clone(),
                exponent,
                exponent_shape: b.shape().to_vec(),
                result: result.clone(),
            });
        }
        Ok(result)
    }

    fn backward(
        &self,
        grad: &ArrayD<f32>,
        needs_input_grad: &[bool],
    ) -> Result<Vec<Option<ArrayD<f32>>>> {
        let s = saved(self.name(), &self.saved)?;
        let grad_base = needs_input_grad[0]
            .then(|| {
                // ∂L/∂a = ∂L/∂out ⊙ e·a^(e-1)
                let e = s.exponent;
                zip_with(self.name(), grad, &s.base, |g, x| g * e * x.powf(e - 1.0))
            })
            .transpose()?;
        let grad_exponent = needs_input_grad[1]
            .then(|| {
                // ∂L/∂e = Σ ∂L/∂out ⊙ ln(a) ⊙ a^e
                if grad.shape() != s.base.shape() {
                    return Err(Error::shape(self.name(), grad.shape(), s.base.shape()));
                }
                let mut full = grad.clone();
                Zip::from(&mut full)
                    .and(&s.base)
                    .and(&s.result)
                    .for_each(|g, &x, &r| *g *= x.ln() * r);
                reduce_to_shape(&s.exponent_shape, full)
            })
            .transpose()?;
        Ok(vec![grad_base, grad_exponent])
    }
}

#[derive(Debug, Default)]
pub struct Exp {
    result: Option<ArrayD<f32>>,
}

impl Function for Exp {
    fn name(&self) -> &'static str {
        "exp"
    }

    fn forward(&mut self, inputs: &[&ArrayD<f32>], needs_grad: bool) -> Result<ArrayD<f32>> {
        let [x] = arity(self.name(), inputs)?;
        let result = x.mapv(f32::exp);
        if needs_grad {
            self.result = Some(result.clone());
        }
        Ok(result)
    }

    fn backward(
        &self,
        grad: &ArrayD<f32>,
        needs_input_grad: &[bool],
    ) -> Result<Vec<Option<ArrayD<f32>>>> {
        let result = saved(self.name(), &self.result)?;
        Ok(vec![needs_input_grad[0]
            .then(|| zip_with(self.name(), grad, result, |g, r| g * r))
            .transpose()?])
    }
}

#[derive(Debug, Default)]
pub struct Log {
    input: Option<ArrayD<f32>>,
}

impl Function for Log {
    fn name(&self) -> &'static str {
        "log"
    }

    fn forward(&mut self, inputs: &[&ArrayD<f32>], needs_grad: bool) -> Result<ArrayD<f32>> {
        let [x] = arity(self.name(), inputs)?;
        if needs_grad {
            self.input = Some(x.clone());
        }
        Ok(x.mapv(f32::ln))
    }

    fn backward(
        &self,
        grad: &ArrayD<f32>,
        needs_input_grad: &[bool],
    ) -> Result<Vec<Option<ArrayD<f32>>>> {
        let x = saved(self.name(), &self.input)?;
        Ok(vec![needs_input_grad[0]
            .then(|| zip_with(self.name(), grad, x, |g, x| g / x))
            .transpose()?])
    }
}

#[derive(Debug, Default)]
pub struct Sqrt {
    result: Option<ArrayD<f32>>,
}

impl Function for Sqrt {
    fn name(&self) -> &'static str {
        "sqrt"
    }

    fn forward(&mut self, inputs: &[&ArrayD<f32>], needs_grad: bool) -> Result<ArrayD<f32>> {
        let [x] = arity(self.name(), inputs)?;
        let result = x.mapv(f32::sqrt);
        if needs_grad {
            self.result = Some(result.clone());
        }
        Ok(result)
    }

    fn backward(
        &self,
        grad: &ArrayD<f32>,
        needs_input_grad: &[bool],
    ) -> Result<Vec<Option<ArrayD<f32>>>> {
        // ∂√x/∂x = 1 / (2√x)
        let result = saved(self.name(), &self.result)?;
        Ok(vec![needs_input_grad[0]
            .then(|| zip_with(self.name(), grad, result, |g, r| g * 0.5 / r))
            .transpose()?])
    }
}
