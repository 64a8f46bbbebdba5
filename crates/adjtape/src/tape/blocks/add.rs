//! Sum `lhs + rhs`.

use crate::error::AdjointError;
use crate::tape::block::{Block, BlockIo, add_adj_to, add_hessian_to, add_tlm_to};
use crate::tape::block_variable::BlockVariableRef;
use log::trace;

/// Records `output = lhs + rhs`.
#[derive(Debug)]
pub struct AddBlock {
    io: BlockIo,
}

impl AddBlock {
    pub fn new(lhs: &BlockVariableRef, rhs: &BlockVariableRef) -> Self {
        let mut io = BlockIo::new();
        io.add_dependency(lhs);
        io.add_dependency(rhs);
        Self { io }
    }

    pub fn add_output(&mut self, output: &BlockVariableRef) {
        self.io.add_output(output);
    }
}

impl Block for AddBlock {
    fn name(&self) -> &'static str {
        "AddBlock"
    }

    fn dependencies(&self) -> &[BlockVariableRef] {
        self.io.dependencies()
    }

    fn outputs(&self) -> &[BlockVariableRef] {
        self.io.outputs()
    }

    fn evaluate_adj(&self) -> Result<(), AdjointError> {
        let Some(output) = self.io.output(0) else {
            return Ok(());
        };
        let Some(adj_input) = output.adj_value() else {
            return Ok(());
        };
        for term in self.io.dependencies() {
            add_adj_to(term, &adj_input)?;
        }
        Ok(())
    }

    fn evaluate_tlm(&self) -> Result<(), AdjointError> {
        let Some(output) = self.io.output(0) else {
            return Ok(());
        };
        for term in self.io.dependencies() {
            if let Some(tlm_input) = term.tlm_value() {
                add_tlm_to(output, &tlm_input)?;
            }
        }
        Ok(())
    }

    fn evaluate_hessian(&self) -> Result<(), AdjointError> {
        let Some(output) = self.io.output(0) else {
            return Ok(());
        };
        let Some(hessian_input) = output.hessian_value() else {
            return Ok(());
        };
        for term in self.io.dependencies() {
            add_hessian_to(term, &hessian_input)?;
        }
        Ok(())
    }

    fn recompute(&self) -> Result<(), AdjointError> {
        let Some(output) = self.io.output(0) else {
            return Ok(());
        };
        if output.is_control() {
            trace!("AddBlock: output {:?} is a control", output.id());
            return Ok(());
        }
        let mut sum = output.output().zeros_like();
        for term in self.io.dependencies() {
            sum.accumulate(&term.saved_output().conform_to(output.output())?)?;
        }
        output.store_recomputed(sum)?;
        Ok(())
    }
}
