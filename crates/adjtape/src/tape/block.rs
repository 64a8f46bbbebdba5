//! The block contract.

use super::block_variable::BlockVariableRef;
use crate::error::AdjointError;
use crate::value::Value;
use smallvec::SmallVec;
use std::fmt::Debug;
use std::rc::Rc;

/// One recorded elementary operation.
///
/// A block reads the accumulators of its outputs and adds contributions into
/// its dependencies (adjoint and Hessian sweeps), or the other way round
/// (tangent sweep). Recompute rebuilds the output checkpoints from the
/// dependencies' saved values.
///
/// Only [`Block::evaluate_adj`] is required. The other rules default to
/// [`AdjointError::MissingRule`], which surfaces on the first sweep that
/// reaches the block.
pub trait Block: Debug {
    /// Operation name for diagnostics.
    fn name(&self) -> &'static str;

    /// Ordered inputs.
    fn dependencies(&self) -> &[BlockVariableRef];

    /// Ordered outputs.
    fn outputs(&self) -> &[BlockVariableRef];

    /// Reverse rule.
    fn evaluate_adj(&self) -> Result<(), AdjointError>;

    /// Forward (tangent linear) rule.
    fn evaluate_tlm(&self) -> Result<(), AdjointError> {
        Err(AdjointError::MissingRule {
            block: self.name(),
            rule: "evaluate_tlm",
        })
    }

    /// Second-order reverse rule.
    fn evaluate_hessian(&self) -> Result<(), AdjointError> {
        Err(AdjointError::MissingRule {
            block: self.name(),
            rule: "evaluate_hessian",
        })
    }

    /// Rebuild output checkpoints from saved dependency values.
    fn recompute(&self) -> Result<(), AdjointError> {
        Err(AdjointError::MissingRule {
            block: self.name(),
            rule: "recompute",
        })
    }

    /// Reset the accumulators of every variable this block touches.
    fn reset_variables(&self) {
        for var in self.dependencies().iter().chain(self.outputs()) {
            var.reset_variables();
        }
    }
}

/// Dependency and output lists shared by the concrete blocks.
#[derive(Debug, Default)]
pub struct BlockIo {
    dependencies: SmallVec<[BlockVariableRef; 2]>,
    outputs: SmallVec<[BlockVariableRef; 1]>,
}

impl BlockIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a dependency. Order is kept and duplicates are not collapsed.
    pub fn add_dependency(&mut self, var: &BlockVariableRef) {
        self.dependencies.push(Rc::clone(var));
    }

    pub fn add_output(&mut self, var: &BlockVariableRef) {
        self.outputs.push(Rc::clone(var));
    }

    pub fn dependencies(&self) -> &[BlockVariableRef] {
        &self.dependencies
    }

    pub fn outputs(&self) -> &[BlockVariableRef] {
        &self.outputs
    }

    pub fn dependency(&self, index: usize) -> Option<&BlockVariableRef> {
        self.dependencies.get(index)
    }

    pub fn output(&self, index: usize) -> Option<&BlockVariableRef> {
        self.outputs.get(index)
    }
}

/// Conform `value` to the shape of `target`'s payload and add it as adjoint.
pub(crate) fn add_adj_to(target: &BlockVariableRef, value: &Value) -> Result<(), AdjointError> {
    target.add_adj_output(value.conform_to(target.output())?)
}

pub(crate) fn add_tlm_to(target: &BlockVariableRef, value: &Value) -> Result<(), AdjointError> {
    target.add_tlm_output(value.conform_to(target.output())?)
}

pub(crate) fn add_hessian_to(target: &BlockVariableRef, value: &Value) -> Result<(), AdjointError> {
    target.add_hessian_output(value.conform_to(target.output())?)
}
