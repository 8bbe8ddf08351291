//! Property-based gradient checks against central finite differences

use super::test_utils::gradient_error;
use crate::autograd::*;
use ndarray::{ArrayD, IxDyn};
use proptest::prelude::*;
use std::ops::Range;

const TOLERANCE: f32 = 2e-2;

fn array(shape: &'static [usize], range: Range<f32>) -> impl Strategy<Value = ArrayD<f32>> {
    let len = shape.iter().product::<usize>();
    prop::collection::vec(range, len)
        .prop_map(move |data| ArrayD::from_shape_vec(IxDyn(shape), data).unwrap())
}

/// Smallest distance between any two entries of each row of a 2-D array
fn min_row_gap(a: &ArrayD<f32>) -> f32 {
    let cols = a.shape()[1];
    let flat: Vec<f32> = a.iter().copied().collect();
    let mut gap = f32::INFINITY;
    for row in flat.chunks(cols) {
        for (i, x) in row.iter().enumerate() {
            for y in &row[i + 1..] {
                gap = gap.min((x - y).abs());
            }
        }
    }
    gap
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_add_broadcast_gradients(
        a in array(&[2, 3], -3.0..3.0),
        b in array(&[3], -3.0..3.0),
    ) {
        let err = gradient_error(|ctx, x| { let c = ctx.constant(b.clone()); add(ctx, x, c) }, &a);
        prop_assert!(err < TOLERANCE, "add lhs error {}", err);
        let err = gradient_error(|ctx, x| { let c = ctx.constant(a.clone()); add(ctx, c, x) }, &b);
        prop_assert!(err < TOLERANCE, "add rhs error {}", err);
    }

    #[test]
    fn prop_sub_broadcast_gradients(
        a in array(&[2, 3], -3.0..3.0),
        b in array(&[2, 1], -3.0..3.0),
    ) {
        let err = gradient_error(|ctx, x| { let c = ctx.constant(b.clone()); sub(ctx, x, c) }, &a);
        prop_assert!(err < TOLERANCE, "sub lhs error {}", err);
        let err = gradient_error(|ctx, x| { let c = ctx.constant(a.clone()); sub(ctx, c, x) }, &b);
        prop_assert!(err < TOLERANCE, "sub rhs error {}", err);
    }

    #[test]
    fn prop_mul_gradients(
        a in array(&[2, 3], -2.0..2.0),
        b in array(&[3], -2.0..2.0),
    ) {
        let err = gradient_error(|ctx, x| { let c = ctx.constant(b.clone()); mul(ctx, x, c) }, &a);
        prop_assert!(err < TOLERANCE, "mul lhs error {}", err);
        let err = gradient_error(|ctx, x| { let c = ctx.constant(a.clone()); mul(ctx, c, x) }, &b);
        prop_assert!(err < TOLERANCE, "mul rhs error {}", err);
    }

    #[test]
    fn prop_div_gradients(
        a in array(&[2, 3], -2.0..2.0),
        b in array(&[2, 3], 0.5..2.0),
    ) {
        let err = gradient_error(|ctx, x| { let c = ctx.constant(b.clone()); div(ctx, x, c) }, &a);
        prop_assert!(err < TOLERANCE, "div lhs error {}", err);
        let err = gradient_error(|ctx, x| { let c = ctx.constant(a.clone()); div(ctx, c, x) }, &b);
        prop_assert!(err < TOLERANCE, "div rhs error {}", err);
    }

    #[test]
    fn prop_pow_gradients(
        base in array(&[2, 3], 0.5..2.0),
        exponent in 0.5f32..2.5,
    ) {
        let err = gradient_error(|ctx, x| pow_scalar(ctx, x, exponent), &base);
        prop_assert!(err < TOLERANCE, "pow base error {}", err);

        let e = ArrayD::from_elem(IxDyn(&[1]), exponent);
        let err = gradient_error(|ctx, x| { let c = ctx.constant(base.clone()); pow(ctx, c, x) }, &e);
        prop_assert!(err < TOLERANCE, "pow exponent error {}", err);
    }

    #[test]
    fn prop_exp_gradient(x in array(&[2, 3], -2.0..2.0)) {
        let err = gradient_error(exp, &x);
        prop_assert!(err < TOLERANCE, "exp error {}", err);
    }

    #[test]
    fn prop_log_gradient(x in array(&[2, 3], 0.5..3.0)) {
        let err = gradient_error(log, &x);
        prop_assert!(err < TOLERANCE, "log error {}", err);
    }

    #[test]
    fn prop_sqrt_gradient(x in array(&[2, 3], 0.5..4.0)) {
        let err = gradient_error(sqrt, &x);
        prop_assert!(err < TOLERANCE, "sqrt error {}", err);
    }

    #[test]
    fn prop_relu_gradient(x in array(&[2, 3], -2.0..2.0)) {
        // stay clear of the kink at zero
        prop_assume!(x.iter().all(|v| v.abs() > 0.05));
        let err = gradient_error(relu, &x);
        prop_assert!(err < TOLERANCE, "relu error {}", err);
    }

    #[test]
    fn prop_linear_gradients(
        x in array(&[3, 4], -1.0..1.0),
        w in array(&[4, 2], -1.0..1.0),
        b in array(&[2], -1.0..1.0),
    ) {
        let err = gradient_error(|ctx, t| {
            let w = ctx.constant(w.clone());
            let b = ctx.constant(b.clone());
            linear(ctx, t, w, Some(b))
        }, &x);
        prop_assert!(err < TOLERANCE, "linear input error {}", err);

        let err = gradient_error(|ctx, t| {
            let x = ctx.constant(x.clone());
            let b = ctx.constant(b.clone());
            linear(ctx, x, t, Some(b))
        }, &w);
        prop_assert!(err < TOLERANCE, "linear weight error {}", err);

        let err = gradient_error(|ctx, t| {
            let x = ctx.constant(x.clone());
            let w = ctx.constant(w.clone());
            linear(ctx, x, w, Some(t))
        }, &b);
        prop_assert!(err < TOLERANCE, "linear bias error {}", err);
    }

    #[test]
    fn prop_linear_broadcast_bias_gradients(
        x in array(&[2, 3, 2], -1.0..1.0),
        w in array(&[2, 2], -1.0..1.0),
        row in array(&[1, 2], -1.0..1.0),
        per_position in array(&[3, 2], -1.0..1.0),
        scale in array(&[2, 3, 2], -2.0..2.0),
    ) {
        // weight the output so each bias entry sees a distinct upstream gradient
        for bias in [row, per_position] {
            let err = gradient_error(|ctx, t| {
                let x = ctx.constant(x.clone());
                let w = ctx.constant(w.clone());
                let y = linear(ctx, x, w, Some(t))?;
                let s = ctx.constant(scale.clone());
                mul(ctx, y, s)
            }, &bias);
            prop_assert!(err < TOLERANCE, "linear bias {:?} error {}", bias.shape(), err);
        }
    }

    #[test]
    fn prop_reshape_gradient(
        x in array(&[2, 3], -2.0..2.0),
        scale in array(&[3, 2], -2.0..2.0),
    ) {
        let err = gradient_error(|ctx, t| {
            let r = reshape(ctx, t, &[3, 2])?;
            let s = ctx.constant(scale.clone());
            mul(ctx, r, s)
        }, &x);
        prop_assert!(err < TOLERANCE, "reshape error {}", err);
    }

    #[test]
    fn prop_sum_gradient(
        x in array(&[2, 3], -2.0..2.0),
        scale in array(&[2], -2.0..2.0),
    ) {
        let err = gradient_error(|ctx, t| {
            let s = sum(ctx, t, &[1])?;
            let c = ctx.constant(scale.clone());
            mul(ctx, s, c)
        }, &x);
        prop_assert!(err < TOLERANCE, "sum error {}", err);
    }

    #[test]
    fn prop_mean_gradient(
        x in array(&[2, 3], -2.0..2.0),
        scale in array(&[3], -2.0..2.0),
    ) {
        let err = gradient_error(|ctx, t| {
            let m = mean(ctx, t, &[0])?;
            let c = ctx.constant(scale.clone());
            mul(ctx, m, c)
        }, &x);
        prop_assert!(err < TOLERANCE, "mean error {}", err);
    }

    #[test]
    fn prop_max_gradient(x in array(&[2, 3], -3.0..3.0)) {
        // a perturbation must never change which entry wins
        prop_assume!(min_row_gap(&x) > 0.05);
        let err = gradient_error(|ctx, t| max(ctx, t, &[-1]), &x);
        prop_assert!(err < TOLERANCE, "max error {}", err);
    }

    #[test]
    fn prop_composite_gradient(x in array(&[2, 3], 0.5..2.0)) {
        // sqrt(exp(x) * x) / (x + 1)
        let err = gradient_error(|ctx, t| {
            let e = exp(ctx, t)?;
            let p = mul(ctx, e, t)?;
            let r = sqrt(ctx, p)?;
            let one = ctx.scalar(1.0, false);
            let d = add(ctx, t, one)?;
            div(ctx, r, d)
        }, &x);
        prop_assert!(err < TOLERANCE, "composite error {}", err);
    }
}
