//! Array-engine glue over `ndarray`
//!
//! The autograd core treats `ndarray` as its external array engine. This module
//! adds the pieces the core needs on top of it: layout-independent reshapes,
//! axis normalization, broadcast-aware gradient reduction and generalized
//! tensor contraction.

mod broadcast;
mod contract;

pub use broadcast::{broadcast_axes, broadcast_shape, reduce_to_shape, zip_with};
pub use contract::{tensordot, Axes};

use crate::error::{Error, Result};
use ndarray::{ArrayD, IxDyn};

/// Total element count of a shape (1 for rank 0)
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Reshape in logical row-major order, whatever the memory layout of `array`
pub fn reshape(array: ArrayD<f32>, shape: &[usize]) -> Result<ArrayD<f32>> {
    if array.len() != numel(shape) {
        return Err(Error::shape("reshape", array.shape(), shape));
    }
    if array.shape() == shape {
        return Ok(array);
    }
    if array.is_standard_layout() {
        return Ok(array.into_shape(IxDyn(shape))?);
    }
    let data: Vec<f32> = array.iter().copied().collect();
    Ok(ArrayD::from_shape_vec(IxDyn(shape), data)?)
}

/// Drop every unit axis; an all-unit shape collapses to `[1]`
pub fn squeeze(array: ArrayD<f32>) -> Result<ArrayD<f32>> {
    let mut shape: Vec<usize> = array.shape().iter().copied().filter(|&d| d != 1).collect();
    if shape.is_empty() {
        shape.push(1);
    }
    reshape(array, &shape)
}

/// Resolve a possibly negative axis against `rank`
pub fn normalize_axis(op: &'static str, axis: isize, rank: usize) -> Result<usize> {
    let resolved = if axis < 0 { axis + rank as isize } else { axis };
    if resolved < 0 || resolved as usize >= rank {
        return Err(Error::AxisOutOfRange { op, axis, rank });
    }
    Ok(resolved as usize)
}

/// Resolve a list of axes, preserving order and rejecting duplicates
pub fn normalize_axes(op: &'static str, axes: &[isize], rank: usize) -> Result<Vec<usize>> {
    let mut resolved = Vec::with_capacity(axes.len());
    for &axis in axes {
        let axis = normalize_axis(op, axis, rank)?;
        if resolved.contains(&axis) {
            return Err(Error::invalid(op, format!("axis {axis} listed more than once")));
        }
        resolved.push(axis);
    }
    Ok(resolved)
}
