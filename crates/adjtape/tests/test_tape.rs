//! Integration tests for tape recording and replay.
//!
//! Sweeps are checked against central-difference gradients and against the
//! closed-form derivatives of small programs.

use adjtape::tape::blocks::{AssignBlock, MulBlock};
use adjtape::tape::{
    AdjFloat, Block, BlockVariable, Control, Function, OverloadedType, ReducedFunctional, Tape,
    annotation_enabled, compute_gradient, compute_hessian, compute_tangent,
    create_overloaded_object, get_working_tape, no_annotations, push_working_tape,
};
use adjtape::{AdjointError, Field, Value};
use approx::assert_relative_eq;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Compute numerical gradient using central difference.
///
/// grad_i ≈ (f(x + eps*e_i) - f(x - eps*e_i)) / (2*eps)
fn numerical_gradient<F>(f: F, x: &[f64], eps: f64) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut grad = vec![0.0; x.len()];
    let mut x_plus = x.to_vec();
    let mut x_minus = x.to_vec();

    for i in 0..x.len() {
        x_plus[i] = x[i] + eps;
        x_minus[i] = x[i] - eps;

        grad[i] = (f(&x_plus) - f(&x_minus)) / (2.0 * eps);

        x_plus[i] = x[i];
        x_minus[i] = x[i];
    }
    grad
}

fn float(value: &Value) -> f64 {
    value.as_float().expect("float value")
}

#[test]
fn test_numerical_gradient_mul_add_chain() {
    init_logger();
    let _guard = push_working_tape(Tape::shared());
    let eps = 1e-6;

    // f(x, y) = (x * y) * x + 2 y
    let f = |p: &[f64]| (p[0] * p[1]) * p[0] + 2.0 * p[1];
    let point = [1.3, -0.7];
    let numerical = numerical_gradient(f, &point, eps);

    let x = AdjFloat::new(point[0]);
    let y = AdjFloat::new(point[1]);
    let j = &(&(&x * &y) * &x) + &(&y * 2.0);
    assert_relative_eq!(j.value(), f(&point), epsilon = 1e-12);

    let grad = compute_gradient(&j, &[Control::new(&x), Control::new(&y)]).unwrap();
    assert_relative_eq!(float(&grad[0]), numerical[0], epsilon = 1e-6);
    assert_relative_eq!(float(&grad[1]), numerical[1], epsilon = 1e-6);
}

#[test]
fn test_numerical_gradient_assign_chain() {
    init_logger();
    let _guard = push_working_tape(Tape::shared());
    let eps = 1e-6;

    // u = c everywhere on 3 entries, v = copy(u), v *= k, J = sum(v) = 3 c k
    let f = |p: &[f64]| 3.0 * p[0] * p[1];
    let point = [0.4, 2.5];
    let numerical = numerical_gradient(f, &point, eps);

    let c = AdjFloat::new(point[0]);
    let k = AdjFloat::new(point[1]);
    let mut u = Function::zeros(&[3]);
    u.assign(&c).unwrap();
    let mut v = u.copy();
    v.scale_by(&k);

    let grad = compute_gradient(&v, &[Control::new(&c), Control::new(&k)]).unwrap();
    assert_relative_eq!(float(&grad[0]), numerical[0], epsilon = 1e-6);
    assert_relative_eq!(float(&grad[1]), numerical[1], epsilon = 1e-6);
}

#[test]
fn test_numerical_gradient_split_merge_chain() {
    init_logger();
    let _guard = push_working_tape(Tape::shared());
    let eps = 1e-6;

    let data = vec![1.0, -2.0, 0.5, 3.0, 1.5];
    let sizes = [2, 3];

    // scale component 1 by a and merge it back: J = sum(w[1]) * a + sum(w[0])
    let f = |p: &[f64]| p[0] * (data[2] + data[3] + data[4]);
    let point = [0.8];
    let numerical = numerical_gradient(f, &point, eps);

    let a = AdjFloat::new(point[0]);
    let mut w = Function::new(Field::from_vec(data.clone(), &sizes).unwrap());
    let w0 = Control::new(&w);
    let mut parts = w.split().unwrap();
    parts[1].scale_by(&a);
    w.merge(1, &parts[1]).unwrap();

    let grad = compute_gradient(&w, &[Control::new(&a), w0]).unwrap();
    assert_relative_eq!(float(&grad[0]), numerical[0], epsilon = 1e-6);
    // merge carries component 0 as a constant, component 1 sees the scaling
    assert_eq!(grad[1].to_flat(), vec![0.0, 0.0, 0.8, 0.8, 0.8]);
}

#[test]
fn test_end_to_end_assign_then_mul() {
    init_logger();
    let tape = Tape::shared();
    assert!(tape.borrow().is_empty());

    let x = BlockVariable::new(Value::Float(0.0));
    let y = BlockVariable::new(Value::Float(2.0));
    let b_output = BlockVariable::new(Value::Float(2.0));
    let z = BlockVariable::new(Value::Float(5.0));
    let c_output = BlockVariable::new(Value::Float(10.0));

    let mut assign = AssignBlock::new(&x, &y);
    assign.add_output(&b_output);
    let mut mul = MulBlock::new(&b_output, &z);
    mul.add_output(&c_output);
    tape.borrow_mut().add_block(Box::new(assign));
    tape.borrow_mut().add_block(Box::new(mul));

    c_output.set_initial_adj_input(Value::Float(1.0)).unwrap();
    tape.borrow().evaluate_adj().unwrap();

    assert_eq!(b_output.adj_output(), Value::Float(5.0));
    assert_eq!(z.adj_output(), Value::Float(2.0));
    assert_eq!(y.adj_output(), Value::Float(5.0));
    assert_eq!(x.adj_output(), Value::Float(0.0));

    // reset without reseeding: every adjoint is zero again
    tape.borrow().reset_variables();
    tape.borrow().evaluate_adj().unwrap();
    for var in [&x, &y, &b_output, &z, &c_output] {
        assert_eq!(var.adj_output(), Value::Float(0.0));
    }
}

#[test]
fn test_product_rule() {
    init_logger();
    let _guard = push_working_tape(Tape::shared());
    let a = AdjFloat::new(-1.5);
    let b = AdjFloat::new(4.0);
    let c = &a * &b;

    c.set_initial_adj_input(Value::Float(1.0)).unwrap();
    get_working_tape().borrow().evaluate_adj().unwrap();

    assert_eq!(a.get_derivative(), Value::Float(4.0));
    assert_eq!(b.get_derivative(), Value::Float(-1.5));
}

#[test]
fn test_split_merge_round_trip() {
    init_logger();
    let _guard = push_working_tape(Tape::shared());
    let original = Field::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0], &[2, 3]).unwrap();
    let mut w = Function::new(original.clone());
    let before = Rc::clone(w.block_variable());

    let parts = w.split().unwrap();
    w.merge(1, &parts[1]).unwrap();
    assert_eq!(w.field(), &original);

    let seed = Field::from_vec(vec![0.1, 0.2, 0.3, 0.4, 0.5], &[2, 3]).unwrap();
    w.set_initial_adj_input(Value::Field(seed)).unwrap();
    get_working_tape().borrow().evaluate_adj().unwrap();

    assert_eq!(before.adj_output().to_flat(), vec![0.0, 0.0, 0.3, 0.4, 0.5]);
}

#[test]
fn test_merge_recompute_follows_control_dependent_parent() {
    init_logger();
    let _guard = push_working_tape(Tape::shared());

    // u = [c, c]; u[0] *= c; J = u = [c^2, c]
    let c = AdjFloat::new(2.0);
    let mut u = Function::zeros(&[1, 1]);
    u.assign(&c).unwrap();
    let mut parts = u.split().unwrap();
    parts[0].scale_by(&c);
    u.merge(0, &parts[0]).unwrap();
    assert_eq!(u.field().data(), &[4.0, 2.0]);

    let rf = ReducedFunctional::new(&u, vec![Control::new(&c)]);
    let at_three = rf.call(&[Value::Float(3.0)]).unwrap();
    assert_eq!(at_three.to_flat(), vec![9.0, 3.0]);

    let back = rf.call(&[Value::Float(2.0)]).unwrap();
    assert_eq!(back.to_flat(), vec![4.0, 2.0]);
}

#[test]
fn test_merge_gradient_keeps_part_layout() {
    init_logger();
    let _guard = push_working_tape(Tape::shared());

    let mut w = Function::zeros(&[2, 1]);
    let part = Function::new(Field::from_vec(vec![1.0, 2.0], &[1, 1]).unwrap());
    w.merge(0, &part).unwrap();
    assert_eq!(w.field().data(), &[1.0, 2.0, 0.0]);

    let grad = compute_gradient(&w, &[Control::new(&part)]).unwrap();
    let expected = Field::from_vec(vec![1.0, 1.0], &[1, 1]).unwrap();
    assert_eq!(grad, vec![Value::Field(expected)]);
}

#[test]
fn test_numerical_gradient_scalar_assign_chain() {
    init_logger();
    let _guard = push_working_tape(Tape::shared());
    let eps = 1e-6;

    // b := a, then b := b * a, J = b * b = a^4
    let f = |p: &[f64]| p[0].powi(4);
    let point = [1.2];
    let numerical = numerical_gradient(f, &point, eps);

    let a = AdjFloat::new(point[0]);
    let mut b = AdjFloat::new(0.0);
    b.assign(&a).unwrap();
    b *= &a;
    let j = &b * &b;

    let grad = compute_gradient(&j, &[Control::new(&a)]).unwrap();
    assert_relative_eq!(float(&grad[0]), numerical[0], epsilon = 1e-6);
}

#[test]
fn test_recompute_is_bitwise_idempotent() {
    init_logger();
    let tape = Tape::shared();
    let _guard = push_working_tape(Rc::clone(&tape));

    let a = AdjFloat::new(0.1);
    let b = AdjFloat::new(0.7);
    let mut u = Function::zeros(&[4]);
    u.assign(&(&a * &b)).unwrap();
    u.scale_by(&a);

    Control::new(&a).update(Value::Float(1.0 / 3.0)).unwrap();

    let snapshot = |tape: &Tape| -> Vec<u64> {
        tape.blocks()
            .iter()
            .flat_map(|block| block.outputs().iter())
            .flat_map(|var| var.saved_output().to_flat())
            .map(f64::to_bits)
            .collect()
    };

    tape.borrow().recompute().unwrap();
    let first = snapshot(&*tape.borrow());
    tape.borrow().recompute().unwrap();
    let second = snapshot(&*tape.borrow());

    assert_eq!(first, second);
    assert_relative_eq!(u.block_variable().saved_output().sum(), 4.0 * 0.7 / 9.0, epsilon = 1e-12);
}

#[test]
fn test_recompute_keeps_control_checkpoint() {
    init_logger();
    let tape = Tape::shared();
    let _guard = push_working_tape(Rc::clone(&tape));

    let c = AdjFloat::new(2.0);
    let mut u = Function::zeros(&[2]);
    u.assign(&c).unwrap();

    // u is produced by the assign block and marked as a control
    let control = Control::new(&u);
    let pinned = Value::Field(Field::from_slice(&[7.0, 8.0]));
    control.update(pinned.clone()).unwrap();

    Control::new(&c).update(Value::Float(-1.0)).unwrap();
    tape.borrow().recompute().unwrap();

    assert_eq!(control.data(), pinned);
}

#[test]
fn test_no_annotations_restores_after_error() {
    init_logger();
    let tape = Tape::shared();
    let _guard = push_working_tape(Rc::clone(&tape));

    let a = AdjFloat::new(2.0);
    let b = &a * 3.0;
    let mut u = Function::zeros(&[2]);
    let count = tape.borrow().len();
    let enabled = annotation_enabled();

    let result: Result<(), AdjointError> = no_annotations(|| {
        let _ = &a * &b;
        u.assign(&b)?;
        let wrong = Function::zeros(&[3]);
        u.assign(&wrong)
    });

    assert!(result.is_err());
    assert_eq!(tape.borrow().len(), count);
    assert_eq!(annotation_enabled(), enabled);
    // the assignment inside the scope still happened
    assert_eq!(u.field().data(), &[6.0, 6.0]);
}

#[test]
fn test_no_annotations_restores_after_panic() {
    init_logger();
    let tape = Tape::shared();
    let _guard = push_working_tape(Rc::clone(&tape));

    let a = AdjFloat::new(2.0);
    let count = tape.borrow().len();

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        no_annotations(|| {
            let _ = &a * &a;
            panic!("failure inside unannotated scope");
        })
    }));

    assert!(outcome.is_err());
    assert_eq!(tape.borrow().len(), count);
    assert!(annotation_enabled());

    let _ = &a * &a;
    assert_eq!(tape.borrow().len(), count + 1);
}

#[test]
fn test_unsupported_payload() {
    init_logger();
    let err = create_overloaded_object(vec![1_u8, 2, 3]).unwrap_err();
    assert!(matches!(err, AdjointError::UnsupportedPayload { .. }));

    let wrapped = create_overloaded_object(Field::from_slice(&[1.0, 2.0])).unwrap();
    assert!(wrapped.as_function().is_some());
}

#[test]
fn test_tangent_matches_gradient() {
    init_logger();
    let _guard = push_working_tape(Tape::shared());

    let x = AdjFloat::new(0.9);
    let mut u = Function::new(Field::from_slice(&[1.0, -1.0, 2.0]));
    let controls = [Control::new(&x), Control::new(&u)];
    u.scale_by(&x);
    let j = u.copy();

    let directions = [
        Value::Float(0.3),
        Value::Field(Field::from_slice(&[0.5, 0.25, -1.0])),
    ];
    let tangent = compute_tangent(&j, &controls, &directions).unwrap();
    let gradient = compute_gradient(&j, &controls).unwrap();

    let expected: f64 = gradient
        .iter()
        .zip(&directions)
        .map(|(g, d)| g.dot(d).unwrap())
        .sum();
    assert_relative_eq!(tangent.sum(), expected, epsilon = 1e-12);
}

#[test]
fn test_hessian_matches_gradient_differences() {
    init_logger();
    let _guard = push_working_tape(Tape::shared());
    let eps = 1e-6;

    // J = x * x * y
    let x = AdjFloat::new(1.2);
    let y = AdjFloat::new(-0.4);
    let j = &(&x * &x) * &y;
    let controls = vec![Control::new(&x), Control::new(&y)];
    let direction = [Value::Float(0.6), Value::Float(-1.1)];

    let hv = compute_hessian(&j, &controls, &direction).unwrap();

    let rf = ReducedFunctional::new(&j, controls);
    let gradient_at = |sign: f64| -> Vec<f64> {
        let values = [
            Value::Float(1.2 + sign * eps * 0.6),
            Value::Float(-0.4 - sign * eps * 1.1),
        ];
        rf.call(&values).unwrap();
        rf.derivative().unwrap().iter().map(float).collect()
    };
    let plus = gradient_at(1.0);
    let minus = gradient_at(-1.0);

    for i in 0..2 {
        let numerical = (plus[i] - minus[i]) / (2.0 * eps);
        assert_relative_eq!(float(&hv[i]), numerical, epsilon = 1e-6);
    }
}

#[test]
fn test_missing_rule_surfaces_on_sweep() {
    init_logger();

    #[derive(Debug)]
    struct AdjointOnly {
        io: adjtape::tape::BlockIo,
    }

    impl Block for AdjointOnly {
        fn name(&self) -> &'static str {
            "AdjointOnly"
        }

        fn dependencies(&self) -> &[adjtape::tape::BlockVariableRef] {
            self.io.dependencies()
        }

        fn outputs(&self) -> &[adjtape::tape::BlockVariableRef] {
            self.io.outputs()
        }

        fn evaluate_adj(&self) -> Result<(), AdjointError> {
            Ok(())
        }
    }

    let mut io = adjtape::tape::BlockIo::new();
    io.add_dependency(&BlockVariable::new(Value::Float(1.0)));
    let mut tape = Tape::new();
    tape.add_block(Box::new(AdjointOnly { io }));

    assert!(tape.evaluate_adj().is_ok());
    assert_eq!(
        tape.recompute().unwrap_err(),
        AdjointError::MissingRule {
            block: "AdjointOnly",
            rule: "recompute"
        }
    );
}
