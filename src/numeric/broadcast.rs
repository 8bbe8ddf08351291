//! Broadcasting: forward kernels and gradient reduction

use super::reshape;
use crate::error::{Error, Result};
use ndarray::{ArrayD, Axis, Zip};

/// Numpy-style broadcast of two shapes
pub fn broadcast_shape(op: &'static str, lhs: &[usize], rhs: &[usize]) -> Result<Vec<usize>> {
    let rank = lhs.len().max(rhs.len());
    let lhs_pad = rank - lhs.len();
    let rhs_pad = rank - rhs.len();

    (0..rank)
        .map(|i| {
            let l = if i < lhs_pad { 1 } else { lhs[i - lhs_pad] };
            let r = if i < rhs_pad { 1 } else { rhs[i - rhs_pad] };
            match (l, r) {
                (l, r) if l == r => Ok(l),
                (1, r) => Ok(r),
                (l, 1) => Ok(l),
                _ => Err(Error::shape(op, lhs, rhs)),
            }
        })
        .collect()
}

/// Apply `f` elementwise over the broadcast of `a` and `b`
pub fn zip_with<F>(op: &'static str, a: &ArrayD<f32>, b: &ArrayD<f32>, f: F) -> Result<ArrayD<f32>>
where
    F: Fn(f32, f32) -> f32,
{
    let shape = broadcast_shape(op, a.shape(), b.shape())?;
    let (Some(av), Some(bv)) = (a.broadcast(shape.as_slice()), b.broadcast(shape.as_slice()))
    else {
        return Err(Error::shape(op, a.shape(), b.shape()));
    };
    Ok(Zip::from(&av).and(&bv).map_collect(|&x, &y| f(x, y)))
}

/// Axes of `grown` that broadcasting stretched or prepended relative to `original`
///
/// `original` is right-aligned against `grown` by left-padding with ones. An axis
/// qualifies when the padded extent differs and the grown extent is not 1.
pub fn broadcast_axes(original: &[usize], grown: &[usize]) -> Vec<usize> {
    if original.len() > grown.len() {
        return Vec::new();
    }
    let pad = grown.len() - original.len();
    grown
        .iter()
        .enumerate()
        .filter(|&(i, &g)| {
            let o = if i < pad { 1 } else { original[i - pad] };
            o != g && g != 1
        })
        .map(|(i, _)| i)
        .collect()
}

/// Collapse a gradient computed at a broadcast shape back to `shape`
///
/// Each broadcast axis is summed with its dimension kept, then the result is
/// reshaped to `shape`, which also drops the prepended axes. `grown` must be a
/// shape that broadcasting `shape` could have produced.
pub fn reduce_to_shape(shape: &[usize], grown: ArrayD<f32>) -> Result<ArrayD<f32>> {
    let grown_shape = grown.shape().to_vec();
    let mismatch = || Error::shape("reduce_to_shape", &grown_shape, shape);
    let expected = broadcast_shape("reduce_to_shape", shape, &grown_shape).map_err(|_| mismatch())?;
    if expected != grown_shape {
        return Err(mismatch());
    }

    let mut reduced = grown;
    for axis in broadcast_axes(shape, &grown_shape) {
        reduced = reduced.sum_axis(Axis(axis)).insert_axis(Axis(axis));
    }
    reshape(reduced, shape)
}
