//! Product `lfactor * rfactor`.

use crate::error::AdjointError;
use crate::tape::block::{Block, BlockIo, add_adj_to, add_hessian_to, add_tlm_to};
use crate::tape::block_variable::BlockVariableRef;
use log::trace;

/// Records `output = lfactor * rfactor`.
///
/// Factors may be floats or fields; a float factor scales a field. Each
/// contribution is conformed to the shape of the variable that receives it.
#[derive(Debug)]
pub struct MulBlock {
    io: BlockIo,
}

impl MulBlock {
    pub fn new(lfactor: &BlockVariableRef, rfactor: &BlockVariableRef) -> Self {
        let mut io = BlockIo::new();
        io.add_dependency(lfactor);
        io.add_dependency(rfactor);
        Self { io }
    }

    pub fn add_output(&mut self, output: &BlockVariableRef) {
        self.io.add_output(output);
    }

    fn parts(&self) -> Option<(&BlockVariableRef, &BlockVariableRef, &BlockVariableRef)> {
        Some((
            self.io.dependency(0)?,
            self.io.dependency(1)?,
            self.io.output(0)?,
        ))
    }
}

impl Block for MulBlock {
    fn name(&self) -> &'static str {
        "MulBlock"
    }

    fn dependencies(&self) -> &[BlockVariableRef] {
        self.io.dependencies()
    }

    fn outputs(&self) -> &[BlockVariableRef] {
        self.io.outputs()
    }

    fn evaluate_adj(&self) -> Result<(), AdjointError> {
        let Some((lfactor, rfactor, output)) = self.parts() else {
            return Ok(());
        };
        let Some(adj_input) = output.adj_value() else {
            return Ok(());
        };
        let l = lfactor.saved_output();
        let r = rfactor.saved_output();
        add_adj_to(lfactor, &adj_input.mul(&r)?)?;
        add_adj_to(rfactor, &adj_input.mul(&l)?)
    }

    fn evaluate_tlm(&self) -> Result<(), AdjointError> {
        let Some((lfactor, rfactor, output)) = self.parts() else {
            return Ok(());
        };
        let (tlm_l, tlm_r) = (lfactor.tlm_value(), rfactor.tlm_value());
        if let Some(tlm_l) = tlm_l {
            add_tlm_to(output, &tlm_l.mul(&rfactor.saved_output())?)?;
        }
        if let Some(tlm_r) = tlm_r {
            add_tlm_to(output, &lfactor.saved_output().mul(&tlm_r)?)?;
        }
        Ok(())
    }

    fn evaluate_hessian(&self) -> Result<(), AdjointError> {
        let Some((lfactor, rfactor, output)) = self.parts() else {
            return Ok(());
        };
        let hessian_input = output.hessian_value();
        let adj_input = output.adj_value();
        if hessian_input.is_none() && adj_input.is_none() {
            return Ok(());
        }
        let l = lfactor.saved_output();
        let r = rfactor.saved_output();

        if let Some(hessian_input) = &hessian_input {
            add_hessian_to(lfactor, &hessian_input.mul(&r)?)?;
            add_hessian_to(rfactor, &hessian_input.mul(&l)?)?;
        }
        // mixed second derivative: d2(l*r)/dl dr = 1
        if let Some(adj_input) = &adj_input {
            if let Some(tlm_r) = rfactor.tlm_value() {
                add_hessian_to(lfactor, &adj_input.mul(&tlm_r)?)?;
            }
            if let Some(tlm_l) = lfactor.tlm_value() {
                add_hessian_to(rfactor, &adj_input.mul(&tlm_l)?)?;
            }
        }
        Ok(())
    }

    fn recompute(&self) -> Result<(), AdjointError> {
        let Some((lfactor, rfactor, output)) = self.parts() else {
            return Ok(());
        };
        if output.is_control() {
            trace!("MulBlock: output {:?} is a control", output.id());
            return Ok(());
        }
        let product = lfactor.saved_output().mul(&rfactor.saved_output())?;
        output.store_recomputed(product.conform_to(output.output())?)?;
        Ok(())
    }
}
