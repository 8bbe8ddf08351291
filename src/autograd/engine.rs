//! Backward engine: topological ordering and gradient accumulation

use super::{Context, TensorId};
use crate::error::{Error, Result};
use crate::numeric::numel;
use log::{debug, trace};
use ndarray::{ArrayD, IxDyn};

/// Run one backward pass from `root`
///
/// The root gradient is replaced by `grad_output`, or by ones when none is
/// given. Every tracked ancestor then receives the sum of the gradients
/// flowing into it, and each processed operation is detached from its node
/// unless the context retains the graph.
///
/// The pass is all-or-nothing: every gradient is computed and validated
/// before the context is touched, so a failing pass leaves gradients and
/// producing operations exactly as they were.
pub(crate) fn run(
    ctx: &mut Context,
    root: TensorId,
    grad_output: Option<ArrayD<f32>>,
) -> Result<()> {
    let shape = ctx.get(root)?.shape().to_vec();
    let seed = match grad_output {
        Some(grad) => grad,
        None => {
            if ctx.config().strict_scalar_root && numel(&shape) != 1 {
                return Err(Error::NonScalarRoot { shape });
            }
            ArrayD::ones(IxDyn(&shape))
        }
    };
    if seed.shape() != shape.as_slice() {
        return Err(Error::shape("backward", seed.shape(), &shape));
    }

    if ctx.node(root).is_leaf() {
        debug!("Backward from {root}: no producing operation, nothing to propagate");
        return ctx.node_mut(root).set_grad(seed);
    }

    let order = topological_order(ctx, root);
    debug!("Backward from {root}: {} nodes in topological order", order.len());

    let pass = Pass::compute(ctx, &order, root, seed)?;
    let invoked = pass.invoked.len();
    pass.commit(ctx, &order, root)?;

    debug!(
        "Backward from {root} finished: {invoked} operations invoked, graph {}",
        if ctx.config().retain_graph { "retained" } else { "released" }
    );
    Ok(())
}

/// Gradients of one backward pass, held apart from the context until committed
struct Pass {
    grads: Vec<Option<ArrayD<f32>>>,
    invoked: Vec<TensorId>,
}

impl Pass {
    /// Walk `order` in reverse and run every reachable backward rule
    fn compute(
        ctx: &Context,
        order: &[TensorId],
        root: TensorId,
        seed: ArrayD<f32>,
    ) -> Result<Self> {
        let check_finite = ctx.config().check_finite;
        let mut grads: Vec<Option<ArrayD<f32>>> = vec![None; ctx.len()];
        grads[root.index()] = Some(seed);
        let mut invoked = Vec::new();

        for &id in order.iter().rev() {
            let Some(grad_fn) = ctx.node(id).grad_fn() else {
                continue;
            };
            if !grad_fn.requires_grad() {
                continue;
            }
            let Some(grad) = grads[id.index()].take() else {
                debug!("No gradient reached {id} ({}), skipping", grad_fn.name());
                continue;
            };

            trace!("Backward through {} at {id}", grad_fn.name());
            let result = grad_fn.backward(&grad);
            grads[id.index()] = Some(grad);
            let slots = result?;

            if slots.len() != grad_fn.parents().len() {
                return Err(Error::BackwardFailed(format!(
                    "{} returned {} gradients for {} inputs",
                    grad_fn.name(),
                    slots.len(),
                    grad_fn.parents().len()
                )));
            }

            let slots = grad_fn
                .parents()
                .iter()
                .zip(grad_fn.needs_input_grad())
                .zip(slots);
            for ((&parent, &needs), slot) in slots {
                let Some(grad) = slot else {
                    continue;
                };
                if !needs {
                    continue;
                }
                if check_finite && grad.iter().any(|v| !v.is_finite()) {
                    return Err(Error::NonFiniteGradient { op: grad_fn.name() });
                }
                let parent_shape = ctx.node(parent).shape();
                if grad.shape() != parent_shape {
                    return Err(Error::shape(grad_fn.name(), grad.shape(), parent_shape));
                }
                match grads[parent.index()].as_mut() {
                    Some(pending) => *pending += &grad,
                    None => grads[parent.index()] = Some(grad),
                }
            }
            invoked.push(id);
        }

        Ok(Self { grads, invoked })
    }

    /// Write the computed gradients into the context and release the graph
    ///
    /// The root and interior nodes take this pass's gradient; leaves add it to
    /// whatever they accumulated before.
    fn commit(mut self, ctx: &mut Context, order: &[TensorId], root: TensorId) -> Result<()> {
        for &id in order {
            let grad = self.grads[id.index()].take();
            let node = ctx.node_mut(id);
            if id == root || !node.is_leaf() {
                match grad {
                    Some(grad) => node.set_grad(grad)?,
                    None => node.zero_grad(),
                }
            } else if let Some(grad) = grad {
                trace!("Accumulating gradient into {id}");
                node.accumulate_grad(grad)?;
            }
        }

        if !ctx.config().retain_graph {
            for &id in &self.invoked {
                ctx.node_mut(id).release_grad_fn();
            }
        }
        Ok(())
    }
}

/// Depth-first post-order over producing operations, starting at `root`
///
/// Parents always precede the nodes computed from them. Nodes reachable along
/// several paths appear exactly once.
pub(crate) fn topological_order(ctx: &Context, root: TensorId) -> Vec<TensorId> {
    let mut order = Vec::new();
    let mut visited = vec![false; ctx.len()];
    let mut stack = vec![(root, false)];

    while let Some((id, expanded)) = stack.pop() {
        if expanded {
            order.push(id);
            continue;
        }
        if visited[id.index()] {
            continue;
        }
        visited[id.index()] = true;
        stack.push((id, true));

        if let Some(grad_fn) = ctx.node(id).grad_fn() {
            for &parent in grad_fn.parents().iter().rev() {
                if !visited[parent.index()] {
                    stack.push((parent, false));
                }
            }
        }
    }

    order
}
