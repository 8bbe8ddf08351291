//! Affine map over the trailing axis: `x · w (+ bias)`

use super::saved;
use crate::autograd::{Context, Function, TensorId};
use crate::error::{Error, Result};
use crate::numeric::{reduce_to_shape, squeeze, tensordot, zip_with, Axes};
use ndarray::{ArrayD, Axis};

/// Contract the last axis of `x` with the first axis of the 2-D weight `w`,
/// then broadcast-add `bias` when given
pub fn linear(
    ctx: &mut Context,
    x: TensorId,
    w: TensorId,
    bias: Option<TensorId>,
) -> Result<TensorId> {
    match bias {
        Some(b) => ctx.apply(Linear::default(), &[x, w, b]),
        None => ctx.apply(Linear::default(), &[x, w]),
    }
}

#[derive(Debug, Default)]
pub struct Linear {
    saved: Option<(ArrayD<f32>, ArrayD<f32>)>,
    bias_shape: Option<Vec<usize>>,
}

impl Function for Linear {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn forward(&mut self, inputs: &[&ArrayD<f32>], needs_grad: bool) -> Result<ArrayD<f32>> {
        let (x, w, bias) = match inputs {
            [x, w] => (*x, *w, None),
            [x, w, b] => (*x, *w, Some(*b)),
            _ => {
                return Err(Error::invalid(
                    self.name(),
                    format!("expected 2 or 3 inputs, got {}", inputs.len()),
                ))
            }
        };
        if w.ndim() != 2 {
            return Err(Error::invalid(
                self.name(),
                format!("weight must be 2-D, got shape {:?}", w.shape()),
            ));
        }
        let Some(&features) = x.shape().last() else {
            return Err(Error::invalid(self.name(), "input must have at least one axis"));
        };
        if features != w.shape()[0] {
            return Err(Error::invalid(
                self.name(),
                format!(
                    "trailing axis of input ({features}) does not match leading axis of weight ({})",
                    w.shape()[0]
                ),
            ));
        }

        let mut out = tensordot(x, w, &Axes::Pair(-1, 0))?;
        if let Some(b) = bias {
            let biased = zip_with(self.name(), &out, b, |y, b| y + b)?;
            if biased.shape() != out.shape() {
                return Err(Error::shape(self.name(), out.shape(), b.shape()));
            }
            out = biased;
            self.bias_shape = Some(b.shape().to_vec());
        }

        if needs_grad {
            self.saved = Some((x.clone(), w.clone()));
        }
        Ok(out)
    }

    fn backward(
        &self,
        grad: &ArrayD<f32>,
        needs_input_grad: &[bool],
    ) -> Result<Vec<Option<ArrayD<f32>>>> {
        let (x, w) = saved(self.name(), &self.saved)?;
        let batch_axes: Vec<isize> = (0..grad.ndim().saturating_sub(1) as isize).collect();

        // ∂L/∂x = ∂L/∂out · wᵀ
        let grad_x = needs_input_grad[0]
            .then(|| tensordot(grad, &w.t().to_owned(), &Axes::Pair(-1, 0)))
            .transpose()?;

        // ∂L/∂w = xᵀ · ∂L/∂out, contracting every batch axis
        let grad_w = needs_input_grad[1]
            .then(|| tensordot(x, grad, &Axes::Lists(batch_axes.clone(), batch_axes.clone())))
            .transpose()?;

        let mut grads = vec![grad_x, grad_w];
        if let Some(bias_shape) = &self.bias_shape {
            let needs_bias = needs_input_grad.get(2).copied().unwrap_or(false);
            grads.push(
                needs_bias
                    .then(|| bias_grad(grad, bias_shape))
                    .transpose()?,
            );
        }
        Ok(grads)
    }
}

/// Sum the upstream gradient over all leading axes and squeeze
fn bias_grad(grad: &ArrayD<f32>, bias_shape: &[usize]) -> Result<ArrayD<f32>> {
    let mut summed = grad.clone();
    for axis in 0..grad.ndim().saturating_sub(1) {
        summed = summed.sum_axis(Axis(axis)).insert_axis(Axis(axis));
    }
    let squeezed = squeeze(summed)?;
    if squeezed.shape() == bias_shape {
        return Ok(squeezed);
    }
    // bias with explicit unit axes, e.g. [1, out]
    reduce_to_shape(bias_shape, grad.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_linear_forward_values() {
        let mut ctx = Context::new();
        let x = ctx.from_vec(vec![1.0, 2.0], &[1, 2], false).unwrap();
        let w = ctx.from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3], false).unwrap();
        let b = ctx.from_vec(vec![0.5, 0.5, 0.5], &[3], false).unwrap();
        let y = linear(&mut ctx, x, w, Some(b)).unwrap();

        let value = ctx.value(y).unwrap();
        assert_eq!(value.shape(), &[1, 3]);
        assert_abs_diff_eq!(value[[0, 0]], 9.5);
        assert_abs_diff_eq!(value[[0, 1]], 12.5);
        assert_abs_diff_eq!(value[[0, 2]], 15.5);
    }

    #[test]
    fn test_linear_backward_values() {
        let mut ctx = Context::new();
        let x = ctx.from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2], true).unwrap();
        let w = ctx.from_vec(vec![1.0, 0.0, 0.0, 1.0], &[2, 2], true).unwrap();
        let b = ctx.from_vec(vec![0.0, 0.0], &[2], true).unwrap();
        let y = linear(&mut ctx, x, w, Some(b)).unwrap();
        backward(&mut ctx, y, None).unwrap();

        // dx = ones · wᵀ = row sums of w
        assert_eq!(ctx.grad(x).unwrap().iter().copied().collect::<Vec<_>>(), vec![1.0; 4]);
        // dw = xᵀ · ones = column sums of x broadcast across outputs
        assert_eq!(
            ctx.grad(w).unwrap().iter().copied().collect::<Vec<_>>(),
            vec![4.0, 4.0, 6.0, 6.0]
        );
        assert_eq!(ctx.grad(b).unwrap().iter().copied().collect::<Vec<_>>(), vec![2.0, 2.0]);
    }

    #[test]
    fn test_linear_rank3_input() {
        let mut ctx = Context::new();
        let x = ctx.ones(&[2, 3, 4], true);
        let w = ctx.ones(&[4, 5], true);
        let b = ctx.zeros(&[5], true);
        let y = linear(&mut ctx, x, w, Some(b)).unwrap();
        assert_eq!(ctx.value(y).unwrap().shape(), &[2, 3, 5]);

        backward(&mut ctx, y, None).unwrap();
        assert_eq!(ctx.grad(x).unwrap().shape(), &[2, 3, 4]);
        assert_eq!(ctx.grad(w).unwrap().shape(), &[4, 5]);
        assert_abs_diff_eq!(ctx.grad(w).unwrap()[[0, 0]], 6.0);
        assert_eq!(ctx.grad(b).unwrap().shape(), &[5]);
        assert_abs_diff_eq!(ctx.grad(b).unwrap()[[0]], 6.0);
    }

    #[test]
    fn test_linear_vector_input() {
        let mut ctx = Context::new();
        let x = ctx.from_vec(vec![1.0, 2.0, 3.0], &[3], true).unwrap();
        let w = ctx.ones(&[3, 2], true);
        let y = linear(&mut ctx, x, w, None).unwrap();
        assert_eq!(ctx.value(y).unwrap().shape(), &[2]);

        backward(&mut ctx, y, None).unwrap();
        assert_eq!(ctx.grad(w).unwrap().shape(), &[3, 2]);
        assert_abs_diff_eq!(ctx.grad(w).unwrap()[[2, 1]], 3.0);
    }

    #[test]
    fn test_linear_misaligned_axes() {
        let mut ctx = Context::new();
        let x = ctx.ones(&[4, 5], true);
        let w = ctx.ones(&[4, 2], true);
        let err = linear(&mut ctx, x, w, None).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { op: "linear", .. }));
    }

    #[test]
    fn test_linear_rejects_non_matrix_weight() {
        let mut ctx = Context::new();
        let x = ctx.ones(&[4, 5], true);
        let w = ctx.ones(&[5, 2, 2], true);
        assert!(linear(&mut ctx, x, w, None).is_err());
    }

    #[test]
    fn test_linear_bias_that_grows_output() {
        let mut ctx = Context::new();
        let x = ctx.ones(&[4, 5], true);
        let w = ctx.ones(&[5, 2], true);
        let b = ctx.ones(&[3, 1, 2], true);
        let err = linear(&mut ctx, x, w, Some(b)).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { op: "linear", .. }));
    }

    #[test]
    fn test_linear_row_bias_keeps_unit_axis() {
        let mut ctx = Context::new();
        let x = ctx.ones(&[4, 3], true);
        let w = ctx.ones(&[3, 2], true);
        let b = ctx.zeros(&[1, 2], true);
        let y = linear(&mut ctx, x, w, Some(b)).unwrap();
        assert_eq!(ctx.value(y).unwrap().shape(), &[4, 2]);

        let seed = ArrayD::from_shape_vec(
            ndarray::IxDyn(&[4, 2]),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
        )
        .unwrap();
        backward(&mut ctx, y, Some(seed)).unwrap();

        let grad = ctx.grad(b).unwrap();
        assert_eq!(grad.shape(), &[1, 2]);
        assert_abs_diff_eq!(grad[[0, 0]], 16.0);
        assert_abs_diff_eq!(grad[[0, 1]], 20.0);
    }

    #[test]
    fn test_linear_per_position_bias() {
        let mut ctx = Context::new();
        let x = ctx.ones(&[2, 3, 4], true);
        let w = ctx.ones(&[4, 5], true);
        let b = ctx.zeros(&[3, 5], true);
        let y = linear(&mut ctx, x, w, Some(b)).unwrap();
        assert_eq!(ctx.value(y).unwrap().shape(), &[2, 3, 5]);

        let seed = ArrayD::from_shape_fn(ndarray::IxDyn(&[2, 3, 5]), |idx| {
            (idx[0] * 100 + idx[1] * 10 + idx[2]) as f32
        });
        backward(&mut ctx, y, Some(seed)).unwrap();

        // summed over the batch axis only
        let grad = ctx.grad(b).unwrap();
        assert_eq!(grad.shape(), &[3, 5]);
        for j in 0..3 {
            for k in 0..5 {
                assert_abs_diff_eq!(grad[[j, k]], (100 + 20 * j + 2 * k) as f32);
            }
        }
    }

    #[test]
    fn test_linear_single_value_bias() {
        let mut ctx = Context::new();
        let x = ctx.ones(&[4, 3], true);
        let w = ctx.ones(&[3, 2], true);
        let b = ctx.zeros(&[1], true);
        let y = linear(&mut ctx, x, w, Some(b)).unwrap();
        backward(&mut ctx, y, None).unwrap();

        let grad = ctx.grad(b).unwrap();
        assert_eq!(grad.shape(), &[1]);
        assert_abs_diff_eq!(grad[[0]], 8.0);
    }
}
