//! Block variables: the tracked wires between blocks.

use crate::error::AdjointError;
use crate::value::Value;
use log::trace;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Unique identifier of a block variable within a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(usize);

impl VariableId {
    /// Get the internal index.
    pub fn index(&self) -> usize {
        self.0
    }
}

thread_local! {
    static NEXT_VARIABLE_ID: Cell<usize> = const { Cell::new(0) };
}

fn next_variable_id() -> VariableId {
    NEXT_VARIABLE_ID.with(|id| {
        let current = id.get();
        id.set(current + 1);
        VariableId(current)
    })
}

/// Shared handle to a block variable.
///
/// Blocks hold these as dependencies and outputs; the variable itself is
/// never deep-copied.
pub type BlockVariableRef = Rc<BlockVariable>;

/// One produced value in the recorded dataflow.
///
/// Holds the payload at creation time, the adjoint, tangent and Hessian
/// accumulators, and an optional checkpoint. An absent accumulator is the
/// additive identity.
#[derive(Debug)]
pub struct BlockVariable {
    id: VariableId,
    output: Value,
    adj_value: RefCell<Option<Value>>,
    tlm_value: RefCell<Option<Value>>,
    hessian_value: RefCell<Option<Value>>,
    checkpoint: RefCell<Option<Value>>,
    is_control: Cell<bool>,
}

fn accumulate_into(
    slot: &RefCell<Option<Value>>,
    output: &Value,
    value: Value,
) -> Result<(), AdjointError> {
    output.check_compatible(&value)?;
    let mut slot = slot.borrow_mut();
    match slot.as_mut() {
        Some(existing) => existing.accumulate(&value),
        None => {
            *slot = Some(value);
            Ok(())
        }
    }
}

fn seed(slot: &RefCell<Option<Value>>, output: &Value, value: Value) -> Result<(), AdjointError> {
    output.check_compatible(&value)?;
    *slot.borrow_mut() = Some(value);
    Ok(())
}

impl BlockVariable {
    /// Create a variable wrapping `output`.
    pub fn new(output: Value) -> BlockVariableRef {
        Rc::new(Self {
            id: next_variable_id(),
            output,
            adj_value: RefCell::new(None),
            tlm_value: RefCell::new(None),
            hessian_value: RefCell::new(None),
            checkpoint: RefCell::new(None),
            is_control: Cell::new(false),
        })
    }

    pub fn id(&self) -> VariableId {
        self.id
    }

    /// Payload recorded when the variable was created.
    pub fn output(&self) -> &Value {
        &self.output
    }

    /// Add `value` into the adjoint accumulator.
    pub fn add_adj_output(&self, value: Value) -> Result<(), AdjointError> {
        accumulate_into(&self.adj_value, &self.output, value)
    }

    /// Add `value` into the tangent accumulator.
    pub fn add_tlm_output(&self, value: Value) -> Result<(), AdjointError> {
        accumulate_into(&self.tlm_value, &self.output, value)
    }

    /// Add `value` into the second-order accumulator.
    pub fn add_hessian_output(&self, value: Value) -> Result<(), AdjointError> {
        accumulate_into(&self.hessian_value, &self.output, value)
    }

    /// Raw adjoint accumulator; `None` if nothing was added since the last reset.
    pub fn adj_value(&self) -> Option<Value> {
        self.adj_value.borrow().clone()
    }

    pub fn tlm_value(&self) -> Option<Value> {
        self.tlm_value.borrow().clone()
    }

    pub fn hessian_value(&self) -> Option<Value> {
        self.hessian_value.borrow().clone()
    }

    /// Accumulated adjoint, zero if never written.
    pub fn adj_output(&self) -> Value {
        self.adj_value().unwrap_or_else(|| self.output.zeros_like())
    }

    /// Accumulated tangent, zero if never written.
    pub fn tlm_output(&self) -> Value {
        self.tlm_value().unwrap_or_else(|| self.output.zeros_like())
    }

    /// Accumulated second-order adjoint, zero if never written.
    pub fn hessian_output(&self) -> Value {
        self.hessian_value()
            .unwrap_or_else(|| self.output.zeros_like())
    }

    /// Overwrite the adjoint accumulator with a seed.
    pub fn set_initial_adj_input(&self, value: Value) -> Result<(), AdjointError> {
        seed(&self.adj_value, &self.output, value)
    }

    /// Overwrite the tangent accumulator with a seed direction.
    pub fn set_initial_tlm_input(&self, value: Value) -> Result<(), AdjointError> {
        seed(&self.tlm_value, &self.output, value)
    }

    /// Overwrite the second-order accumulator with a seed.
    pub fn set_initial_hessian_input(&self, value: Value) -> Result<(), AdjointError> {
        seed(&self.hessian_value, &self.output, value)
    }

    /// Snapshot the payload into the checkpoint if none is held yet.
    pub fn save_output(&self) {
        let mut checkpoint = self.checkpoint.borrow_mut();
        if checkpoint.is_none() {
            *checkpoint = Some(self.output.clone());
        }
    }

    /// Checkpoint if present, otherwise the recorded payload.
    pub fn saved_output(&self) -> Value {
        self.checkpoint
            .borrow()
            .clone()
            .unwrap_or_else(|| self.output.clone())
    }

    pub fn checkpoint(&self) -> Option<Value> {
        self.checkpoint.borrow().clone()
    }

    /// Replace the checkpoint with a new value of the same kind and layout.
    ///
    /// This is the only path that changes a control's checkpoint.
    pub fn update_checkpoint(&self, value: Value) -> Result<(), AdjointError> {
        self.output.check_compatible(&value)?;
        *self.checkpoint.borrow_mut() = Some(value);
        Ok(())
    }

    /// Store a recomputed value unless this variable is a control.
    ///
    /// Returns whether the checkpoint was written.
    pub(crate) fn store_recomputed(&self, value: Value) -> Result<bool, AdjointError> {
        if self.is_control() {
            trace!("keeping control checkpoint of variable {:?}", self.id);
            return Ok(false);
        }
        self.update_checkpoint(value)?;
        Ok(true)
    }

    pub fn is_control(&self) -> bool {
        self.is_control.get()
    }

    /// Mark or unmark this variable as a control.
    pub fn set_control(&self, is_control: bool) {
        self.is_control.set(is_control);
    }

    /// Reset all accumulators to identity. The checkpoint is kept.
    pub fn reset_variables(&self) {
        self.adj_value.borrow_mut().take();
        self.tlm_value.borrow_mut().take();
        self.hessian_value.borrow_mut().take();
    }

    pub fn reset_tlm_value(&self) {
        self.tlm_value.borrow_mut().take();
    }

    pub fn reset_hessian_value(&self) {
        self.hessian_value.borrow_mut().take();
    }
}
