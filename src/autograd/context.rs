//! Execution context owning the computational graph

use super::backward::{Function, GradFn};
use super::tensor::{Tensor, TensorId};
use crate::config::GradConfig;
use crate::error::{Error, Result};
use log::{debug, trace};
use ndarray::{ArrayD, IxDyn};
use std::ops::{Deref, DerefMut};

/// Arena of graph nodes plus the gradient mode they are created under
///
/// Nodes live until [`Context::clear`] or until the context is dropped.
/// Operations refer to their inputs by [`TensorId`], so the graph holds no
/// reference cycles.
#[derive(Debug)]
pub struct Context {
    nodes: Vec<Tensor>,
    grad_enabled: bool,
    config: GradConfig,
}

impl Context {
    /// Create a new context
    pub fn new() -> Self {
        Self::with_config(GradConfig::default())
    }

    /// Create a context from explicit settings
    pub fn with_config(config: GradConfig) -> Self {
        Self {
            nodes: Vec::new(),
            grad_enabled: config.grad_enabled,
            config,
        }
    }

    pub fn config(&self) -> &GradConfig {
        &self.config
    }

    /// Create a leaf tensor
    pub fn tensor(&mut self, value: ArrayD<f32>, requires_grad: bool) -> TensorId {
        self.push(Tensor::new(value, requires_grad))
    }

    /// Create a leaf tensor from row-major data
    pub fn from_vec(
        &mut self,
        data: Vec<f32>,
        shape: &[usize],
        requires_grad: bool,
    ) -> Result<TensorId> {
        let value = ArrayD::from_shape_vec(IxDyn(shape), data)?;
        Ok(self.tensor(value, requires_grad))
    }

    /// Create a single-element leaf of shape `[1]`
    pub fn scalar(&mut self, value: f32, requires_grad: bool) -> TensorId {
        self.tensor(ArrayD::from_elem(IxDyn(&[1]), value), requires_grad)
    }

    /// Create a leaf filled with zeros
    pub fn zeros(&mut self, shape: &[usize], requires_grad: bool) -> TensorId {
        self.tensor(ArrayD::zeros(IxDyn(shape)), requires_grad)
    }

    /// Create a leaf filled with ones
    pub fn ones(&mut self, shape: &[usize], requires_grad: bool) -> TensorId {
        self.tensor(ArrayD::ones(IxDyn(shape)), requires_grad)
    }

    /// Wrap a plain array as an untracked operand
    pub fn constant(&mut self, value: ArrayD<f32>) -> TensorId {
        self.tensor(value, false)
    }

    pub fn get(&self, id: TensorId) -> Result<&Tensor> {
        self.nodes
            .get(id.index())
            .ok_or(Error::UnknownTensor(id.index()))
    }

    pub fn get_mut(&mut self, id: TensorId) -> Result<&mut Tensor> {
        self.nodes
            .get_mut(id.index())
            .ok_or(Error::UnknownTensor(id.index()))
    }

    /// Forward value of a node
    pub fn value(&self, id: TensorId) -> Result<&ArrayD<f32>> {
        Ok(self.get(id)?.value())
    }

    /// Accumulated gradient of a node, if any
    ///
    /// Unlike [`Context::get`] and [`Context::value`], an id that does not
    /// belong to this context is not an error here: it has no gradient, so the
    /// result is `None`. Use [`Context::get`] to tell the two cases apart.
    pub fn grad(&self, id: TensorId) -> Option<&ArrayD<f32>> {
        self.nodes.get(id.index()).and_then(Tensor::grad)
    }

    pub fn zero_grad(&mut self, id: TensorId) -> Result<()> {
        self.get_mut(id)?.zero_grad();
        Ok(())
    }

    /// Clear the gradient of every node
    pub fn zero_grads(&mut self) {
        self.nodes.iter_mut().for_each(Tensor::zero_grad);
    }

    /// Number of nodes in the arena
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop every node; all previously issued ids become invalid
    pub fn clear(&mut self) {
        debug!("Clearing context with {} nodes", self.nodes.len());
        self.nodes.clear();
    }

    /// Check if operations applied now attach their producing context
    pub fn is_grad_enabled(&self) -> bool {
        self.grad_enabled
    }

    /// Disable gradient tracking until the returned guard is dropped
    ///
    /// The guard dereferences to the context, so operations are applied
    /// through it. Guards nest; dropping one restores the mode that was
    /// active when it was created.
    pub fn no_grad(&mut self) -> NoGradGuard<'_> {
        let previous = self.grad_enabled;
        self.grad_enabled = false;
        debug!("Entering no-grad scope (previously enabled: {previous})");
        NoGradGuard {
            ctx: self,
            previous,
        }
    }

    /// Apply an operation to existing nodes and record the result
    ///
    /// The result requires gradients when any input does. Its producing
    /// operation is attached only while gradient tracking is enabled.
    pub fn apply<F>(&mut self, mut function: F, inputs: &[TensorId]) -> Result<TensorId>
    where
        F: Function + 'static,
    {
        let mut needs_input_grad = Vec::with_capacity(inputs.len());
        for &id in inputs {
            needs_input_grad.push(self.get(id)?.requires_grad());
        }
        let requires_grad = needs_input_grad.iter().any(|&n| n);
        let track = requires_grad && self.grad_enabled;

        let value = {
            let values: Vec<&ArrayD<f32>> = inputs.iter().map(|&id| self.node(id).value()).collect();
            function.forward(&values, track)?
        };

        let grad_fn =
            track.then(|| GradFn::new(Box::new(function), inputs.to_vec(), needs_input_grad));
        let id = self.push(Tensor::produced(value, requires_grad, grad_fn));
        trace!("Applied op -> {id} (tracked: {track})");
        Ok(id)
    }

    pub(crate) fn node(&self, id: TensorId) -> &Tensor {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: TensorId) -> &mut Tensor {
        &mut self.nodes[id.index()]
    }

    fn push(&mut self, tensor: Tensor) -> TensorId {
        let id = TensorId::new(self.nodes.len());
        self.nodes.push(tensor);
        id
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Scope token returned by [`Context::no_grad`]
pub struct NoGradGuard<'a> {
    ctx: &'a mut Context,
    previous: bool,
}

impl Deref for NoGradGuard<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.ctx
    }
}

impl DerefMut for NoGradGuard<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.ctx
    }
}

impl Drop for NoGradGuard<'_> {
    fn drop(&mut self) {
        self.ctx.grad_enabled = self.previous;
        debug!("Leaving no-grad scope (enabled: {})", self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_new() {
        let ctx = Context::new();
        assert!(ctx.is_grad_enabled());
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_context_default() {
        let ctx = Context::default();
        assert!(ctx.is_grad_enabled());
    }

    #[test]
    fn test_context_config_disables_grad() {
        let config = GradConfig {
            grad_enabled: false,
            ..GradConfig::default()
        };
        let ctx = Context::with_config(config);
        assert!(!ctx.is_grad_enabled());
    }

    #[test]
    fn test_no_grad_guard_restores_mode() {
        let mut ctx = Context::new();
        {
            let guard = ctx.no_grad();
            assert!(!guard.is_grad_enabled());
        }
        assert!(ctx.is_grad_enabled());
    }

    #[test]
    fn test_no_grad_guard_nesting() {
        let mut ctx = Context::new();
        {
            let mut outer = ctx.no_grad();
            {
                let inner = outer.no_grad();
                assert!(!inner.is_grad_enabled());
            }
            // inner guard restores the outer scope's mode, not the global one
            assert!(!outer.is_grad_enabled());
        }
        assert!(ctx.is_grad_enabled());
    }

    #[test]
    fn test_leaf_constructors() {
        let mut ctx = Context::new();
        let a = ctx.from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2], true).unwrap();
        let s = ctx.scalar(3.0, false);
        let z = ctx.zeros(&[3], true);
        let o = ctx.ones(&[2, 1], false);

        assert_eq!(ctx.get(a).unwrap().shape(), &[2, 2]);
        assert!(ctx.get(a).unwrap().requires_grad());
        assert!(ctx.get(a).unwrap().is_leaf());
        assert_eq!(ctx.value(s).unwrap()[[0]], 3.0);
        assert_eq!(ctx.value(z).unwrap().sum(), 0.0);
        assert_eq!(ctx.value(o).unwrap().sum(), 2.0);
        assert_eq!(ctx.len(), 4);
    }

    #[test]
    fn test_from_vec_bad_shape() {
        let mut ctx = Context::new();
        assert!(matches!(
            ctx.from_vec(vec![1.0, 2.0, 3.0], &[2, 2], true),
            Err(Error::Array(_))
        ));
    }

    #[test]
    fn test_unknown_tensor() {
        let mut ctx = Context::new();
        let a = ctx.scalar(1.0, true);
        ctx.clear();
        assert!(matches!(ctx.get(a), Err(Error::UnknownTensor(0))));
        assert!(matches!(ctx.value(a), Err(Error::UnknownTensor(0))));
        assert!(matches!(ctx.zero_grad(a), Err(Error::UnknownTensor(0))));
        // grad reports absence rather than an error for foreign ids
        assert!(ctx.grad(a).is_none());
    }
}
