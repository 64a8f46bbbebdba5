//! Taylor remainder tests for recorded gradients.
//!
//! For a correct gradient `g`, the remainder
//! `|J(m + h dm) - J(m) - h <g, dm>|` shrinks as `h^2`, so halving `h`
//! gives a convergence rate close to 2.

use crate::error::AdjointError;
use crate::tape::ReducedFunctional;
use crate::value::Value;
use log::debug;
use rand::Rng;

/// Step schedule of [`taylor_test`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaylorOptions {
    /// First perturbation size.
    pub initial_step: f64,
    /// Number of perturbations; the step halves each time.
    pub num_steps: usize,
}

impl Default for TaylorOptions {
    fn default() -> Self {
        Self {
            initial_step: 0.01,
            num_steps: 4,
        }
    }
}

/// Minimum observed convergence rate of the first-order Taylor remainder.
///
/// Field-valued functionals are reduced by summing their entries, matching
/// the seed used by the gradient driver. Controls are restored to `values`
/// before returning. The rate is infinite when every remainder is exactly
/// zero.
///
/// # Example
///
/// ```
/// use adjtape::Value;
/// use adjtape::tape::{AdjFloat, Control, ReducedFunctional, Tape, push_working_tape};
/// use adjtape::verification::{TaylorOptions, taylor_test};
///
/// let _guard = push_working_tape(Tape::shared());
/// let x = AdjFloat::new(1.5);
/// let y = &(&x * &x) * &x;
/// let rf = ReducedFunctional::new(&y, vec![Control::new(&x)]);
///
/// let rate = taylor_test(&rf, &[Value::Float(1.5)], &[Value::Float(0.3)], &TaylorOptions::default())
///     .unwrap();
/// assert!(rate > 1.9);
/// ```
pub fn taylor_test(
    rf: &ReducedFunctional,
    values: &[Value],
    directions: &[Value],
    options: &TaylorOptions,
) -> Result<f64, AdjointError> {
    if directions.len() != values.len() {
        return Err(AdjointError::ControlCountMismatch {
            expected: values.len(),
            actual: directions.len(),
        });
    }

    let j0 = rf.call(values)?.sum();
    let gradient = rf.derivative()?;
    let mut dj = 0.0;
    for (g, d) in gradient.iter().zip(directions) {
        dj += g.dot(d)?;
    }

    let mut residuals = Vec::with_capacity(options.num_steps);
    let mut step = options.initial_step;
    for _ in 0..options.num_steps.max(2) {
        let perturbed = values
            .iter()
            .zip(directions)
            .map(|(v, d)| v.add(&d.scale(step)))
            .collect::<Result<Vec<_>, _>>()?;
        let jh = rf.call(&perturbed)?.sum();
        residuals.push((jh - j0 - step * dj).abs());
        step /= 2.0;
    }
    rf.call(values)?;

    let rate = residuals
        .windows(2)
        .map(|pair| (pair[0] / pair[1]).log2())
        .fold(f64::INFINITY, f64::min);
    debug!("taylor test residuals {residuals:?}, min rate {rate}");
    Ok(rate)
}

/// Random perturbation with the kind and layout of `like`, entries in `[-1, 1)`.
pub fn random_direction(like: &Value) -> Value {
    random_direction_with_rng(like, &mut rand::rng())
}

/// [`random_direction`] drawing from a specific RNG, for reproducible tests.
pub fn random_direction_with_rng<R: Rng>(like: &Value, rng: &mut R) -> Value {
    match like {
        Value::Float(_) => Value::Float(rng.random_range(-1.0..1.0)),
        Value::Field(field) => {
            let mut direction = field.zeros_like();
            for x in direction.data_mut() {
                *x = rng.random_range(-1.0..1.0);
            }
            Value::Field(direction)
        }
    }
}
