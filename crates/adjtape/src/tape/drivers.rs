//! Differentiation entry points.
//!
//! Each driver resets the accumulators it uses, seeds the functional or the
//! controls, and runs the matching sweeps over the functional's tape.

use super::block_variable::BlockVariableRef;
use super::control::Control;
use super::graph::Tape;
use super::overloaded::OverloadedType;
use crate::error::AdjointError;
use crate::value::Value;
use log::debug;

fn check_count(controls: &[Control], actual: usize) -> Result<(), AdjointError> {
    if controls.len() != actual {
        return Err(AdjointError::ControlCountMismatch {
            expected: controls.len(),
            actual,
        });
    }
    Ok(())
}

/// Derivative of `functional` with respect to each control.
///
/// The adjoint seed is one in every entry of the functional, so a field
/// functional is differentiated through the sum of its entries.
///
/// # Example
///
/// ```
/// use adjtape::Value;
/// use adjtape::tape::{AdjFloat, Control, Tape, compute_gradient, push_working_tape};
///
/// let _guard = push_working_tape(Tape::shared());
/// let x = AdjFloat::new(3.0);
/// let y = &x * &x;
/// let grad = compute_gradient(&y, &[Control::new(&x)]).unwrap();
/// assert_eq!(grad, vec![Value::Float(6.0)]);
/// ```
pub fn compute_gradient<O: OverloadedType>(
    functional: &O,
    controls: &[Control],
) -> Result<Vec<Value>, AdjointError> {
    let tape = functional.tape().borrow();
    gradient_on(&tape, functional.block_variable(), controls)
}

/// Directional derivative of `functional` along `directions`.
pub fn compute_tangent<O: OverloadedType>(
    functional: &O,
    controls: &[Control],
    directions: &[Value],
) -> Result<Value, AdjointError> {
    let tape = functional.tape().borrow();
    tangent_on(&tape, functional.block_variable(), controls, directions)
}

/// Hessian of `functional` applied to `directions`, one entry per control.
///
/// Runs its own adjoint and tangent sweeps first.
pub fn compute_hessian<O: OverloadedType>(
    functional: &O,
    controls: &[Control],
    directions: &[Value],
) -> Result<Vec<Value>, AdjointError> {
    let tape = functional.tape().borrow();
    hessian_on(&tape, functional.block_variable(), controls, directions)
}

pub(crate) fn gradient_on(
    tape: &Tape,
    functional: &BlockVariableRef,
    controls: &[Control],
) -> Result<Vec<Value>, AdjointError> {
    tape.reset_variables();
    functional.set_initial_adj_input(functional.output().ones_like())?;
    tape.evaluate_adj()?;
    debug!("gradient computed for {} controls", controls.len());
    Ok(controls.iter().map(Control::derivative).collect())
}

fn seed_tangents(tape: &Tape, controls: &[Control], directions: &[Value]) -> Result<(), AdjointError> {
    check_count(controls, directions.len())?;
    tape.reset_tlm_values();
    for (control, direction) in controls.iter().zip(directions) {
        control
            .block_variable()
            .set_initial_tlm_input(direction.clone())?;
    }
    tape.evaluate_tlm()
}

pub(crate) fn tangent_on(
    tape: &Tape,
    functional: &BlockVariableRef,
    controls: &[Control],
    directions: &[Value],
) -> Result<Value, AdjointError> {
    seed_tangents(tape, controls, directions)?;
    Ok(functional.tlm_output())
}

pub(crate) fn hessian_on(
    tape: &Tape,
    functional: &BlockVariableRef,
    controls: &[Control],
    directions: &[Value],
) -> Result<Vec<Value>, AdjointError> {
    check_count(controls, directions.len())?;
    gradient_on(tape, functional, controls)?;
    seed_tangents(tape, controls, directions)?;

    tape.reset_hessian_values();
    functional.set_initial_hessian_input(functional.output().zeros_like())?;
    tape.evaluate_hessian()?;
    debug!("hessian action computed for {} controls", controls.len());
    Ok(controls
        .iter()
        .map(|c| c.block_variable().hessian_output())
        .collect())
}
