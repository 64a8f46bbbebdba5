//! The integration point between user values and the tape.

use super::adj_float::AdjFloat;
use super::block_variable::{BlockVariable, BlockVariableRef};
use super::function::Function;
use super::graph::SharedTape;
use crate::error::AdjointError;
use crate::value::Value;
use std::rc::Rc;

/// A value whose operations are recorded on a tape.
///
/// Implementors hold the [`BlockVariableRef`] of their current version and
/// the tape they were created under. A recorded in-place mutation replaces
/// the variable wholesale; earlier versions stay alive inside the blocks
/// that reference them.
pub trait OverloadedType {
    /// Variable of the current version.
    fn block_variable(&self) -> &BlockVariableRef;

    /// Replace the current version.
    fn set_block_variable(&mut self, var: BlockVariableRef);

    /// Tape this value records on.
    fn tape(&self) -> &SharedTape;

    /// Snapshot of the current payload.
    fn to_value(&self) -> Value;

    /// Start a new version from the current payload and return its variable.
    fn create_block_variable(&mut self) -> BlockVariableRef {
        let var = BlockVariable::new(self.to_value());
        self.set_block_variable(Rc::clone(&var));
        var
    }

    /// Raw adjoint of the current version.
    fn adj_value(&self) -> Option<Value> {
        self.block_variable().adj_value()
    }

    /// Seed the adjoint of the current version.
    fn set_initial_adj_input(&self, value: Value) -> Result<(), AdjointError> {
        self.block_variable().set_initial_adj_input(value)
    }

    /// Accumulated adjoint of the current version, zero if never written.
    fn get_derivative(&self) -> Value {
        self.block_variable().adj_output()
    }

    /// Overwrite the checkpoint of the current version.
    fn adj_update_value(&self, value: Value) -> Result<(), AdjointError> {
        self.block_variable().update_checkpoint(value)
    }

    /// Reset the accumulators of the current version.
    fn reset_variables(&self) {
        self.block_variable().reset_variables();
    }
}

/// A freshly wrapped overloaded value of either kind.
#[derive(Debug, Clone)]
pub enum Overloaded {
    Float(AdjFloat),
    Function(Function),
}

impl Overloaded {
    /// Wrap a payload snapshot as a new leaf on `tape`.
    pub fn from_value_on(tape: &SharedTape, value: Value) -> Self {
        match value {
            Value::Float(x) => Overloaded::Float(AdjFloat::new_on(tape, x)),
            Value::Field(f) => Overloaded::Function(Function::new_on(tape, f)),
        }
    }

    pub fn as_float(&self) -> Option<&AdjFloat> {
        match self {
            Overloaded::Float(x) => Some(x),
            Overloaded::Function(_) => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Overloaded::Function(f) => Some(f),
            Overloaded::Float(_) => None,
        }
    }

    pub fn into_float(self) -> Option<AdjFloat> {
        match self {
            Overloaded::Float(x) => Some(x),
            Overloaded::Function(_) => None,
        }
    }

    pub fn into_function(self) -> Option<Function> {
        match self {
            Overloaded::Function(f) => Some(f),
            Overloaded::Float(_) => None,
        }
    }
}

impl From<AdjFloat> for Overloaded {
    fn from(x: AdjFloat) -> Self {
        Overloaded::Float(x)
    }
}

impl From<Function> for Overloaded {
    fn from(f: Function) -> Self {
        Overloaded::Function(f)
    }
}

impl OverloadedType for Overloaded {
    fn block_variable(&self) -> &BlockVariableRef {
        match self {
            Overloaded::Float(x) => x.block_variable(),
            Overloaded::Function(f) => f.block_variable(),
        }
    }

    fn set_block_variable(&mut self, var: BlockVariableRef) {
        match self {
            Overloaded::Float(x) => x.set_block_variable(var),
            Overloaded::Function(f) => f.set_block_variable(var),
        }
    }

    fn tape(&self) -> &SharedTape {
        match self {
            Overloaded::Float(x) => x.tape(),
            Overloaded::Function(f) => f.tape(),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Overloaded::Float(x) => x.to_value(),
            Overloaded::Function(f) => f.to_value(),
        }
    }
}
