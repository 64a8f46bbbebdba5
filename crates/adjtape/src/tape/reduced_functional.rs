//! A recorded functional viewed as a function of its controls.

use super::block_variable::BlockVariableRef;
use super::control::Control;
use super::drivers::{gradient_on, hessian_on, tangent_on};
use super::graph::SharedTape;
use super::overloaded::OverloadedType;
use crate::error::AdjointError;
use crate::value::Value;
use log::debug;
use std::rc::Rc;

/// `J(m)`: re-evaluates a taped computation at new control values by
/// replaying recompute, and differentiates it with the drivers.
///
/// # Example
///
/// ```
/// use adjtape::Value;
/// use adjtape::tape::{AdjFloat, Control, ReducedFunctional, Tape, push_working_tape};
///
/// let _guard = push_working_tape(Tape::shared());
/// let x = AdjFloat::new(3.0);
/// let y = &x * &x;
/// let rf = ReducedFunctional::new(&y, vec![Control::new(&x)]);
///
/// assert_eq!(rf.call(&[Value::Float(4.0)]).unwrap(), Value::Float(16.0));
/// assert_eq!(rf.derivative().unwrap(), vec![Value::Float(8.0)]);
/// ```
#[derive(Debug, Clone)]
pub struct ReducedFunctional {
    functional: BlockVariableRef,
    controls: Vec<Control>,
    tape: SharedTape,
}

impl ReducedFunctional {
    /// Wrap the current version of `functional`, recorded on its own tape.
    pub fn new<O: OverloadedType>(functional: &O, controls: Vec<Control>) -> Self {
        Self {
            functional: Rc::clone(functional.block_variable()),
            controls,
            tape: Rc::clone(functional.tape()),
        }
    }

    pub fn functional(&self) -> &BlockVariableRef {
        &self.functional
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn tape(&self) -> &SharedTape {
        &self.tape
    }

    /// Evaluate the functional at `values`, one per control.
    ///
    /// All values are checked before any control is touched.
    pub fn call(&self, values: &[Value]) -> Result<Value, AdjointError> {
        if values.len() != self.controls.len() {
            return Err(AdjointError::ControlCountMismatch {
                expected: self.controls.len(),
                actual: values.len(),
            });
        }
        for (control, value) in self.controls.iter().zip(values) {
            control.block_variable().output().check_compatible(value)?;
        }
        for (control, value) in self.controls.iter().zip(values) {
            control.update(value.clone())?;
        }
        self.tape.borrow().recompute()?;
        Ok(self.functional.saved_output())
    }

    /// Gradient at the last evaluated control values.
    pub fn derivative(&self) -> Result<Vec<Value>, AdjointError> {
        gradient_on(&self.tape.borrow(), &self.functional, &self.controls)
    }

    /// Directional derivative at the last evaluated control values.
    pub fn tangent(&self, directions: &[Value]) -> Result<Value, AdjointError> {
        tangent_on(&self.tape.borrow(), &self.functional, &self.controls, directions)
    }

    /// Hessian action at the last evaluated control values.
    pub fn hessian(&self, directions: &[Value]) -> Result<Vec<Value>, AdjointError> {
        hessian_on(&self.tape.borrow(), &self.functional, &self.controls, directions)
    }

    /// Drop blocks that do not contribute to the functional.
    pub fn optimize_tape(&self) -> usize {
        let removed = self
            .tape
            .borrow_mut()
            .optimize_for_functionals(std::slice::from_ref(&self.functional));
        debug!("reduced functional tape pruned by {removed} blocks");
        removed
    }
}
