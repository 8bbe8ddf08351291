#![no_main]

use arbitrary::Arbitrary;
use derivar::autograd::{
    add, backward, div, exp, linear, log, max, mean, mul, pow_scalar, relu, reshape, sqrt, sub,
    sum, Context, TensorId,
};
use derivar::Result;
use libfuzzer_sys::fuzz_target;
use ndarray::{ArrayD, IxDyn};

/// Fuzz target for graph construction and backward
///
/// Arbitrary shapes, axes and operation sequences must surface as `Err`
/// values, never as panics.

#[derive(Arbitrary, Debug)]
struct TensorOpFuzzInput {
    shape_a: Vec<u8>, // Dims of tensor A (rank and extents are clamped)
    shape_b: Vec<u8>, // Dims of tensor B
    values: Vec<u8>,  // Raw bytes for both tensors
    ops: Vec<u8>,     // Operation selectors
    axis: i8,         // Axis argument for reductions
}

fn clamp_shape(dims: &[u8]) -> Vec<usize> {
    dims.iter().take(3).map(|&d| (d % 4) as usize).collect()
}

fn tensor_from(ctx: &mut Context, shape: &[usize], bytes: &[u8]) -> TensorId {
    let len: usize = shape.iter().product();
    // Map 0..255 to -10.0..10.0 range
    let data = (0..len)
        .map(|i| bytes.get(i % bytes.len().max(1)).copied().unwrap_or(128))
        .map(|b| ((b as f32) / 255.0) * 20.0 - 10.0)
        .collect();
    let value = ArrayD::from_shape_vec(IxDyn(shape), data).unwrap_or_else(|_| ArrayD::zeros(IxDyn(&[1])));
    ctx.tensor(value, true)
}

fn step(ctx: &mut Context, op: u8, a: TensorId, b: TensorId, axis: isize) -> Result<TensorId> {
    match op % 15 {
        0 => add(ctx, a, b),
        1 => sub(ctx, a, b),
        2 => mul(ctx, a, b),
        3 => div(ctx, a, b),
        4 => exp(ctx, a),
        5 => log(ctx, a),
        6 => sqrt(ctx, a),
        7 => relu(ctx, a),
        8 => pow_scalar(ctx, a, 2.0),
        9 => sum(ctx, a, &[axis]),
        10 => max(ctx, a, &[axis]),
        11 => mean(ctx, a, &[]),
        12 => linear(ctx, a, b, None),
        13 => {
            let len = ctx.value(a)?.len();
            reshape(ctx, a, &[len])
        }
        14 => linear(ctx, a, b, Some(a)),
        _ => unreachable!(),
    }
}

fuzz_target!(|input: TensorOpFuzzInput| {
    let mut ctx = Context::new();
    let a = tensor_from(&mut ctx, &clamp_shape(&input.shape_a), &input.values);
    let b = tensor_from(&mut ctx, &clamp_shape(&input.shape_b), &input.values);

    // Invariant 1: operations report bad shapes and axes as errors
    let mut current = a;
    for &op in input.ops.iter().take(16) {
        if let Ok(next) = step(&mut ctx, op, current, b, input.axis as isize) {
            current = next;
        }
    }

    // Invariant 2: backward either succeeds or fails cleanly
    if backward(&mut ctx, current, None).is_ok() {
        // Invariant 3: every gradient that arrived matches its tensor's shape
        for id in [a, b, current] {
            if let (Some(grad), Ok(node)) = (ctx.grad(id), ctx.get(id)) {
                assert_eq!(grad.shape(), node.shape());
            }
        }
    }
});
