//! Axis reductions: sum, max and mean

use super::{arity, saved};
use crate::autograd::{Context, Function, TensorId};
use crate::error::{Error, Result};
use crate::numeric::{normalize_axes, reshape, zip_with};
use ndarray::{ArrayD, Axis, IxDyn, Zip};

/// Sum over `axes`; an empty slice reduces every axis
///
/// Reduced axes are removed from the output shape. Reducing every axis
/// yields shape `[1]`.
pub fn sum(ctx: &mut Context, a: TensorId, axes: &[isize]) -> Result<TensorId> {
    ctx.apply(Sum::new(axes), &[a])
}

/// Maximum over `axes`; an empty slice reduces every axis
pub fn max(ctx: &mut Context, a: TensorId, axes: &[isize]) -> Result<TensorId> {
    ctx.apply(Max::new(axes), &[a])
}

/// Arithmetic mean over `axes`; an empty slice averages every element
pub fn mean(ctx: &mut Context, a: TensorId, axes: &[isize]) -> Result<TensorId> {
    let shape = ctx.get(a)?.shape().to_vec();
    let plan = ReductionPlan::new("mean", axes, &shape)?;
    let count: usize = plan.axes.iter().map(|&axis| shape[axis]).product();

    let total = sum(ctx, a, axes)?;
    let divisor = ctx.constant(ArrayD::from_elem(IxDyn(&[1]), count as f32));
    super::div(ctx, total, divisor)
}

/// Resolved reduction axes plus the keep-dims and squeezed output shapes
#[derive(Debug, Clone)]
struct ReductionPlan {
    axes: Vec<usize>,
    input_shape: Vec<usize>,
    kept_shape: Vec<usize>,
    output_shape: Vec<usize>,
}

impl ReductionPlan {
    fn new(op: &'static str, axes: &[isize], shape: &[usize]) -> Result<Self> {
        let rank = shape.len();
        let mut axes = if axes.is_empty() {
            (0..rank).collect()
        } else {
            normalize_axes(op, axes, rank)?
        };
        axes.sort_unstable();

        let kept_shape: Vec<usize> = shape
            .iter()
            .enumerate()
            .map(|(i, &d)| if axes.contains(&i) { 1 } else { d })
            .collect();
        let output_shape = if axes.len() == rank {
            vec![1]
        } else {
            shape
                .iter()
                .enumerate()
                .filter(|(i, _)| !axes.contains(i))
                .map(|(_, &d)| d)
                .collect()
        };

        Ok(Self {
            axes,
            input_shape: shape.to_vec(),
            kept_shape,
            output_shape,
        })
    }

    /// Reshape an output-shaped gradient to keep-dims and stretch it over the input
    fn expand(&self, op: &'static str, grad: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let kept = reshape(grad.clone(), &self.kept_shape)?;
        let expanded = kept
            .broadcast(self.input_shape.as_slice())
            .ok_or_else(|| Error::shape(op, kept.shape(), &self.input_shape))?
            .to_owned();
        Ok(expanded)
    }
}

#[derive(Debug)]
pub struct Sum {
    axes: Vec<isize>,
    plan: Option<ReductionPlan>,
}

impl Sum {
    pub fn new(axes: &[isize]) -> Self {
        Self {
            axes: axes.to_vec(),
            plan: None,
        }
    }
}

impl Function for Sum {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn forward(&mut self, inputs: &[&ArrayD<f32>], needs_grad: bool) -> Result<ArrayD<f32>> {
        let [x] = arity(self.name(), inputs)?;
        let plan = ReductionPlan::new(self.name(), &self.axes, x.shape())?;

        let mut kept = x.clone();
        for &axis in &plan.axes {
            kept = kept.sum_axis(Axis(axis)).insert_axis(Axis(axis));
        }
        let out = reshape(kept, &plan.output_shape)?;
        if needs_grad {
            self.plan = Some(plan);
        }
        Ok(out)
    }

    fn backward(
        &self,
        grad: &ArrayD<f32>,
        needs_input_grad: &[bool],
    ) -> Result<Vec<Option<ArrayD<f32>>>> {
        // ∂L/∂x = ∂L/∂out broadcast back over the reduced axes
        let plan = saved(self.name(), &self.plan)?;
        Ok(vec![needs_input_grad[0]
            .then(|| plan.expand(self.name(), grad))
            .transpose()?])
    }
}

#[derive(Debug)]
pub struct Max {
    axes: Vec<isize>,
    saved: Option<MaxSaved>,
}

/// Input, keep-dims maxima and the plan that produced them
#[derive(Debug)]
struct MaxSaved {
    input: ArrayD<f32>,
    kept: ArrayD<f32>,
    plan: ReductionPlan,
}

impl Max {
    pub fn new(axes: &[isize]) -> Self {
        Self {
            axes: axes.to_vec(),
            saved: None,
        }
    }
}

impl Function for Max {
    fn name(&self) -> &'static str {
        "max"
    }

    fn forward(&mut self, inputs: &[&ArrayD<f32>], needs_grad: bool) -> Result<ArrayD<f32>> {
        let [x] = arity(self.name(), inputs)?;
        let plan = ReductionPlan::new(self.name(), &self.axes, x.shape())?;

        let mut kept = x.clone();
        for &axis in &plan.axes {
            kept = kept
                .fold_axis(Axis(axis), f32::NEG_INFINITY, |&m, &v| m.max(v))
                .insert_axis(Axis(axis));
        }
        let out = reshape(kept.clone(), &plan.output_shape)?;
        if needs_grad {
            self.saved = Some(MaxSaved {
                input: x.clone(),
                kept,
                plan,
            });
        }
        Ok(out)
    }

    fn backward(
        &self,
        grad: &ArrayD<f32>,
        needs_input_grad: &[bool],
    ) -> Result<Vec<Option<ArrayD<f32>>>> {
        let MaxSaved { input: x, kept, plan } = saved(self.name(), &self.saved)?;
        let grad_x = needs_input_grad[0]
            .then(|| {
                // Split the gradient evenly across every position tied for the max
                let peak = kept
                    .broadcast(x.shape())
                    .ok_or_else(|| Error::shape(self.name(), kept.shape(), x.shape()))?;
                let mask = Zip::from(x)
                    .and(&peak)
                    .map_collect(|&v, &m| if v == m { 1.0f32 } else { 0.0 });

                let mut ties = mask.clone();
                for &axis in &plan.axes {
                    ties = ties.sum_axis(Axis(axis)).insert_axis(Axis(axis));
                }
                let share = zip_with(self.name(), &mask, &ties, |m, n| m / n)?;
                let upstream = reshape(grad.clone(), &plan.kept_shape)?;
                zip_with(self.name(), &share, &upstream, |s, g| s * g)
            })
            .transpose()?;
        Ok(vec![grad_x])
    }
}
