//! Graph nodes with gradient tracking

use super::backward::GradFn;
use crate::error::{Error, Result};
use ndarray::ArrayD;
use std::fmt;

/// Handle to a node owned by a [`Context`](super::Context)
///
/// Ids are plain indices into the context's arena and are invalidated by
/// [`Context::clear`](super::Context::clear).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(usize);

impl TensorId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of the node in its arena
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Tensor with automatic differentiation support
pub struct Tensor {
    value: ArrayD<f32>,
    requires_grad: bool,
    grad_fn: Option<GradFn>,
    grad: Option<ArrayD<f32>>,
}

impl Tensor {
    /// Create a leaf node
    pub fn new(value: ArrayD<f32>, requires_grad: bool) -> Self {
        Self {
            value,
            requires_grad,
            grad_fn: None,
            grad: None,
        }
    }

    pub(crate) fn produced(value: ArrayD<f32>, requires_grad: bool, grad_fn: Option<GradFn>) -> Self {
        Self {
            value,
            requires_grad,
            grad_fn,
            grad: None,
        }
    }

    /// Get reference to the forward value
    pub fn value(&self) -> &ArrayD<f32> {
        &self.value
    }

    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Check if requires gradient
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// True when no operation is attached (inputs, constants, detached or released nodes)
    pub fn is_leaf(&self) -> bool {
        self.grad_fn.is_none()
    }

    /// Name of the producing operation, if still attached
    pub fn grad_fn_name(&self) -> Option<&'static str> {
        self.grad_fn.as_ref().map(GradFn::name)
    }

    /// Get gradient (if computed)
    pub fn grad(&self) -> Option<&ArrayD<f32>> {
        self.grad.as_ref()
    }

    /// Set gradient, replacing any accumulated value
    pub fn set_grad(&mut self, grad: ArrayD<f32>) -> Result<()> {
        if grad.shape() != self.value.shape() {
            return Err(Error::shape("set_grad", grad.shape(), self.value.shape()));
        }
        self.grad = Some(grad);
        Ok(())
    }

    /// Accumulate gradient (for when the tensor feeds several consumers)
    pub fn accumulate_grad(&mut self, grad: ArrayD<f32>) -> Result<()> {
        if grad.shape() != self.value.shape() {
            return Err(Error::shape("accumulate_grad", grad.shape(), self.value.shape()));
        }
        match self.grad.as_mut() {
            Some(existing) => *existing += &grad,
            None => self.grad = Some(grad),
        }
        Ok(())
    }

    /// Zero out gradient
    pub fn zero_grad(&mut self) {
        self.grad = None;
    }

    pub(crate) fn grad_fn(&self) -> Option<&GradFn> {
        self.grad_fn.as_ref()
    }

    /// Drop the producing operation and everything it saved
    pub(crate) fn release_grad_fn(&mut self) {
        self.grad_fn = None;
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("value", &self.value)
            .field("grad", &self.grad)
            .field("requires_grad", &self.requires_grad)
            .field("grad_fn", &self.grad_fn_name())
            .finish()
    }
}
