//! Controls: the independent variables of a reduced functional.

use super::block_variable::BlockVariableRef;
use super::overloaded::OverloadedType;
use crate::error::AdjointError;
use crate::value::Value;
use log::debug;
use std::rc::Rc;

/// A marked variable whose value is set from outside the tape.
///
/// Creating a control flags the current version of the wrapped value as
/// a control, so recompute never overwrites its checkpoint. Later versions
/// of the same overloaded value are unaffected.
#[derive(Debug, Clone)]
pub struct Control {
    block_variable: BlockVariableRef,
}

impl Control {
    /// Mark the current version of `value` as a control.
    pub fn new<O: OverloadedType>(value: &O) -> Self {
        let block_variable = Rc::clone(value.block_variable());
        block_variable.set_control(true);
        Self { block_variable }
    }

    pub fn block_variable(&self) -> &BlockVariableRef {
        &self.block_variable
    }

    /// Current control value (checkpoint if updated, else the recorded payload).
    pub fn data(&self) -> Value {
        self.block_variable.saved_output()
    }

    /// Accumulated adjoint, zero if the last sweep did not reach this control.
    pub fn derivative(&self) -> Value {
        self.block_variable.adj_output()
    }

    pub fn tlm_value(&self) -> Option<Value> {
        self.block_variable.tlm_value()
    }

    pub fn hessian_value(&self) -> Option<Value> {
        self.block_variable.hessian_value()
    }

    /// Set a new control value. Kind and layout must match.
    pub fn update(&self, value: Value) -> Result<(), AdjointError> {
        self.block_variable.update_checkpoint(value)
    }

    /// Number of scalar degrees of freedom.
    pub fn dim(&self) -> usize {
        self.block_variable.output().dim()
    }
}

/// Concatenate the current values of `controls`.
pub fn controls_to_flat(controls: &[Control]) -> Vec<f64> {
    controls.iter().flat_map(|c| c.data().to_flat()).collect()
}

/// Update `controls` in order from a flat array.
///
/// `src` must hold exactly as many entries as the controls have degrees of
/// freedom; nothing is updated otherwise. Returns the number of entries read.
pub fn assign_flat_controls(controls: &[Control], src: &[f64]) -> Result<usize, AdjointError> {
    let expected: usize = controls.iter().map(Control::dim).sum();
    if src.len() != expected {
        return Err(AdjointError::LengthMismatch {
            expected,
            actual: src.len(),
        });
    }
    let mut offset = 0;
    for control in controls {
        let mut value = control.data();
        offset = value.assign_flat(src, offset)?;
        control.update(value)?;
    }
    debug!("assigned {offset} values to {} controls", controls.len());
    Ok(offset)
}
