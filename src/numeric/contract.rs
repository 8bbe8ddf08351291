//! Generalized tensor contraction (tensordot)
//!
//! Contraction is lowered to a single matrix multiplication: each operand is
//! permuted so its contracted axes sit on the inner side, flattened to 2-D,
//! multiplied, and the product is reshaped back to the free dimensions of `a`
//! followed by the free dimensions of `b`.

use super::{normalize_axes, normalize_axis};
use crate::error::{Error, Result};
use ndarray::{Array2, ArrayD, IxDyn};

const OP: &str = "tensordot";

/// Which axes of the two operands are contracted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Axes {
    /// The last `k` axes of `a` against the first `k` axes of `b`
    Count(usize),
    /// One axis of `a` against one axis of `b`
    Pair(isize, isize),
    /// Equal-length axis lists, paired positionally
    Lists(Vec<isize>, Vec<isize>),
}

impl From<usize> for Axes {
    fn from(k: usize) -> Self {
        Axes::Count(k)
    }
}

impl From<(isize, isize)> for Axes {
    fn from((a, b): (isize, isize)) -> Self {
        Axes::Pair(a, b)
    }
}

impl From<(Vec<isize>, Vec<isize>)> for Axes {
    fn from((a, b): (Vec<isize>, Vec<isize>)) -> Self {
        Axes::Lists(a, b)
    }
}

impl Axes {
    /// Concrete contracted axis indices for operands of the given ranks
    pub fn resolve(&self, a_rank: usize, b_rank: usize) -> Result<(Vec<usize>, Vec<usize>)> {
        match self {
            Axes::Count(k) => {
                let k = *k;
                if k > a_rank || k > b_rank {
                    return Err(Error::invalid(
                        OP,
                        format!("cannot contract {k} axes of ranks {a_rank} and {b_rank}"),
                    ));
                }
                Ok(((a_rank - k..a_rank).collect(), (0..k).collect()))
            }
            Axes::Pair(a, b) => Ok((
                vec![normalize_axis(OP, *a, a_rank)?],
                vec![normalize_axis(OP, *b, b_rank)?],
            )),
            Axes::Lists(a, b) => {
                if a.len() != b.len() {
                    return Err(Error::invalid(
                        OP,
                        format!("axis lists differ in length: {} vs {}", a.len(), b.len()),
                    ));
                }
                Ok((normalize_axes(OP, a, a_rank)?, normalize_axes(OP, b, b_rank)?))
            }
        }
    }
}

/// Contract `a` and `b` over the given axes
pub fn tensordot(a: &ArrayD<f32>, b: &ArrayD<f32>, axes: &Axes) -> Result<ArrayD<f32>> {
    let (a_axes, b_axes) = axes.resolve(a.ndim(), b.ndim())?;

    for (&i, &j) in a_axes.iter().zip(&b_axes) {
        if a.shape()[i] != b.shape()[j] {
            return Err(Error::shape(OP, a.shape(), b.shape()));
        }
    }

    let (a_mat, a_free) = matricize(a, &a_axes, false)?;
    let (b_mat, b_free) = matricize(b, &b_axes, true)?;
    let product = a_mat.dot(&b_mat);

    let out_shape: Vec<usize> = a_free.into_iter().chain(b_free).collect();
    if product.shape() == out_shape.as_slice() {
        return Ok(product.into_dyn());
    }
    Ok(product.into_shape(IxDyn(&out_shape))?)
}

/// Flatten `a` into a matrix with the contracted axes on one side
///
/// With `contracted_first` the result is `(prod_axes, prod_free)`, otherwise
/// `(prod_free, prod_axes)`. Also returns the extents of the free axes.
fn matricize(
    a: &ArrayD<f32>,
    axes: &[usize],
    contracted_first: bool,
) -> Result<(Array2<f32>, Vec<usize>)> {
    let shape = a.shape();
    let free: Vec<usize> = (0..a.ndim()).filter(|i| !axes.contains(i)).collect();
    let free_dims: Vec<usize> = free.iter().map(|&i| shape[i]).collect();
    let prod_free: usize = free_dims.iter().product();
    let prod_axes: usize = axes.iter().map(|&i| shape[i]).product();

    let (perm, rows, cols): (Vec<usize>, _, _) = if contracted_first {
        (axes.iter().chain(&free).copied().collect(), prod_axes, prod_free)
    } else {
        (free.iter().chain(axes).copied().collect(), prod_free, prod_axes)
    };

    let identity = perm.iter().enumerate().all(|(i, &p)| i == p);
    let matrix = if identity && a.is_standard_layout() {
        a.view().into_shape((rows, cols))?.to_owned()
    } else {
        let data: Vec<f32> = a.view().permuted_axes(perm).iter().copied().collect();
        Array2::from_shape_vec((rows, cols), data)?
    };
    Ok((matrix, free_dims))
}
