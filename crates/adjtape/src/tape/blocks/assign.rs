//! Assignment `dst = src`.

use crate::error::AdjointError;
use crate::tape::block::{Block, BlockIo, add_adj_to, add_hessian_to, add_tlm_to};
use crate::tape::block_variable::BlockVariableRef;
use log::trace;

/// Records `dst = src`.
///
/// Dependencies are `[previous dst, src]`. The previous value of `dst` is
/// kept for the dependency graph only: assignment discards it, so it never
/// receives an adjoint.
#[derive(Debug)]
pub struct AssignBlock {
    io: BlockIo,
}

impl AssignBlock {
    pub fn new(dst: &BlockVariableRef, src: &BlockVariableRef) -> Self {
        let mut io = BlockIo::new();
        io.add_dependency(dst);
        io.add_dependency(src);
        Self { io }
    }

    pub fn add_output(&mut self, output: &BlockVariableRef) {
        self.io.add_output(output);
    }

    fn src(&self) -> Option<&BlockVariableRef> {
        self.io.dependency(1)
    }
}

impl Block for AssignBlock {
    fn name(&self) -> &'static str {
        "AssignBlock"
    }

    fn dependencies(&self) -> &[BlockVariableRef] {
        self.io.dependencies()
    }

    fn outputs(&self) -> &[BlockVariableRef] {
        self.io.outputs()
    }

    fn evaluate_adj(&self) -> Result<(), AdjointError> {
        let (Some(output), Some(src)) = (self.io.output(0), self.src()) else {
            return Ok(());
        };
        let Some(adj_input) = output.adj_value() else {
            return Ok(());
        };
        // a float source receives the summed field adjoint
        add_adj_to(src, &adj_input)
    }

    fn evaluate_tlm(&self) -> Result<(), AdjointError> {
        let (Some(output), Some(src)) = (self.io.output(0), self.src()) else {
            return Ok(());
        };
        let Some(tlm_input) = src.tlm_value() else {
            return Ok(());
        };
        add_tlm_to(output, &tlm_input)
    }

    fn evaluate_hessian(&self) -> Result<(), AdjointError> {
        let (Some(output), Some(src)) = (self.io.output(0), self.src()) else {
            return Ok(());
        };
        let Some(hessian_input) = output.hessian_value() else {
            return Ok(());
        };
        add_hessian_to(src, &hessian_input)
    }

    fn recompute(&self) -> Result<(), AdjointError> {
        let (Some(output), Some(src)) = (self.io.output(0), self.src()) else {
            return Ok(());
        };
        if output.is_control() {
            trace!("AssignBlock: output {:?} is a control", output.id());
            return Ok(());
        }
        let value = src.saved_output().conform_to(output.output())?;
        output.store_recomputed(value)?;
        Ok(())
    }
}
