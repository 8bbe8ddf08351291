//! Operation trait and the record linking a node to its inputs

use super::TensorId;
use crate::error::Result;
use ndarray::ArrayD;
use std::fmt;

/// A differentiable operation: one forward rule and its vector-Jacobian product
///
/// `forward` runs exactly once, when the operation is applied. Intermediates
/// needed by `backward` are saved only when `needs_grad` is set. `backward`
/// returns one slot per input; a slot may be `None` when `needs_input_grad`
/// is false for that input.
pub trait Function: fmt::Debug {
    /// Operation name used in errors and logs
    fn name(&self) -> &'static str;

    /// Compute the output value from the input values
    fn forward(&mut self, inputs: &[&ArrayD<f32>], needs_grad: bool) -> Result<ArrayD<f32>>;

    /// Map the upstream gradient to one gradient per input
    fn backward(
        &self,
        grad: &ArrayD<f32>,
        needs_input_grad: &[bool],
    ) -> Result<Vec<Option<ArrayD<f32>>>>;
}

/// Producing operation of a node, with the inputs it was applied to
///
/// Owned exclusively by the produced node. Parents are referenced by id only,
/// so the operation never keeps its inputs alive.
#[derive(Debug)]
pub struct GradFn {
    function: Box<dyn Function>,
    parents: Vec<TensorId>,
    needs_input_grad: Vec<bool>,
}

impl GradFn {
    pub(crate) fn new(
        function: Box<dyn Function>,
        parents: Vec<TensorId>,
        needs_input_grad: Vec<bool>,
    ) -> Self {
        Self {
            function,
            parents,
            needs_input_grad,
        }
    }

    pub fn name(&self) -> &'static str {
        self.function.name()
    }

    pub fn parents(&self) -> &[TensorId] {
        &self.parents
    }

    pub fn needs_input_grad(&self) -> &[bool] {
        &self.needs_input_grad
    }

    /// Whether any input tracks gradients
    pub fn requires_grad(&self) -> bool {
        self.needs_input_grad.iter().any(|&n| n)
    }

    pub(crate) fn backward(&self, grad: &ArrayD<f32>) -> Result<Vec<Option<ArrayD<f32>>>> {
        self.function.backward(grad, &self.needs_input_grad)
    }
}
