//! Component extraction and insertion for composite fields.
//!
//! A split is a coordinate projection and a merge is the matching subspace
//! embedding, so both route adjoints without scaling; only the shape
//! changes.

use crate::error::AdjointError;
use crate::field::Field;
use crate::tape::block::{Block, BlockIo};
use crate::tape::block_variable::BlockVariableRef;
use crate::value::Value;
use log::trace;

fn field_of(value: &Value) -> Result<&Field, AdjointError> {
    value.as_field().ok_or(AdjointError::KindMismatch {
        expected: "field",
        actual: value.kind(),
    })
}

/// Zero value shaped like `parent` holding `part` at component `index`.
fn embed_in(parent: &BlockVariableRef, index: usize, part: &Value) -> Result<Value, AdjointError> {
    let layout = field_of(parent.output())?;
    Ok(Value::Field(layout.embed(index, field_of(part)?)?))
}

fn component_of(value: &Value, index: usize) -> Result<Value, AdjointError> {
    Ok(Value::Field(field_of(value)?.sub(index)?))
}

/// Component `index` of `value`, laid out like the payload of `like`.
fn component_like(
    value: &Value,
    index: usize,
    like: &BlockVariableRef,
) -> Result<Value, AdjointError> {
    let part = field_of(value)?.sub(index)?;
    let layout = field_of(like.output())?;
    Ok(Value::Field(part.with_layout_of(layout)?))
}

/// Records `part = parent[index]`.
#[derive(Debug)]
pub struct SplitBlock {
    io: BlockIo,
    index: usize,
}

impl SplitBlock {
    pub fn new(parent: &BlockVariableRef, index: usize) -> Self {
        let mut io = BlockIo::new();
        io.add_dependency(parent);
        Self { io, index }
    }

    pub fn add_output(&mut self, output: &BlockVariableRef) {
        self.io.add_output(output);
    }

    /// Component index.
    pub fn index(&self) -> usize {
        self.index
    }

    fn endpoints(&self) -> Option<(&BlockVariableRef, &BlockVariableRef)> {
        Some((self.io.dependency(0)?, self.io.output(0)?))
    }
}

impl Block for SplitBlock {
    fn name(&self) -> &'static str {
        "SplitBlock"
    }

    fn dependencies(&self) -> &[BlockVariableRef] {
        self.io.dependencies()
    }

    fn outputs(&self) -> &[BlockVariableRef] {
        self.io.outputs()
    }

    fn evaluate_adj(&self) -> Result<(), AdjointError> {
        let Some((parent, output)) = self.endpoints() else {
            return Ok(());
        };
        let Some(adj_input) = output.adj_value() else {
            return Ok(());
        };
        parent.add_adj_output(embed_in(parent, self.index, &adj_input)?)
    }

    fn evaluate_tlm(&self) -> Result<(), AdjointError> {
        let Some((parent, output)) = self.endpoints() else {
            return Ok(());
        };
        let Some(tlm_input) = parent.tlm_value() else {
            return Ok(());
        };
        output.add_tlm_output(component_of(&tlm_input, self.index)?)
    }

    fn evaluate_hessian(&self) -> Result<(), AdjointError> {
        let Some((parent, output)) = self.endpoints() else {
            return Ok(());
        };
        let Some(hessian_input) = output.hessian_value() else {
            return Ok(());
        };
        parent.add_hessian_output(embed_in(parent, self.index, &hessian_input)?)
    }

    fn recompute(&self) -> Result<(), AdjointError> {
        let Some((parent, output)) = self.endpoints() else {
            return Ok(());
        };
        if output.is_control() {
            trace!("SplitBlock: output {:?} is a control", output.id());
            return Ok(());
        }
        output.store_recomputed(component_of(&parent.saved_output(), self.index)?)?;
        Ok(())
    }
}

/// Records `parent[index] = part`, producing a new version of the parent.
///
/// Dependencies are `[previous parent, part]`. The previous parent only
/// supplies the untouched components on recompute; they are carried over as
/// constants, so adjoints flow to `part` alone.
#[derive(Debug)]
pub struct MergeBlock {
    io: BlockIo,
    index: usize,
}

impl MergeBlock {
    pub fn new(parent: &BlockVariableRef, part: &BlockVariableRef, index: usize) -> Self {
        let mut io = BlockIo::new();
        io.add_dependency(parent);
        io.add_dependency(part);
        Self { io, index }
    }

    pub fn add_output(&mut self, output: &BlockVariableRef) {
        self.io.add_output(output);
    }

    pub fn index(&self) -> usize {
        self.index
    }

    fn endpoints(&self) -> Option<(&BlockVariableRef, &BlockVariableRef)> {
        Some((self.io.dependency(1)?, self.io.output(0)?))
    }
}

impl Block for MergeBlock {
    fn name(&self) -> &'static str {
        "MergeBlock"
    }

    fn dependencies(&self) -> &[BlockVariableRef] {
        self.io.dependencies()
    }

    fn outputs(&self) -> &[BlockVariableRef] {
        self.io.outputs()
    }

    fn evaluate_adj(&self) -> Result<(), AdjointError> {
        let Some((part, output)) = self.endpoints() else {
            return Ok(());
        };
        let Some(adj_input) = output.adj_value() else {
            return Ok(());
        };
        part.add_adj_output(component_like(&adj_input, self.index, part)?)
    }

    fn evaluate_tlm(&self) -> Result<(), AdjointError> {
        let Some((part, output)) = self.endpoints() else {
            return Ok(());
        };
        let Some(tlm_input) = part.tlm_value() else {
            return Ok(());
        };
        output.add_tlm_output(embed_in(output, self.index, &tlm_input)?)
    }

    fn evaluate_hessian(&self) -> Result<(), AdjointError> {
        let Some((part, output)) = self.endpoints() else {
            return Ok(());
        };
        let Some(hessian_input) = output.hessian_value() else {
            return Ok(());
        };
        part.add_hessian_output(component_like(&hessian_input, self.index, part)?)
    }

    fn recompute(&self) -> Result<(), AdjointError> {
        let (Some(parent), Some((part, output))) = (self.io.dependency(0), self.endpoints()) else {
            return Ok(());
        };
        if output.is_control() {
            trace!("MergeBlock: output {:?} is a control", output.id());
            return Ok(());
        }
        let mut merged = field_of(&parent.saved_output())?.clone();
        merged.assign_sub(self.index, field_of(&part.saved_output())?)?;
        output.store_recomputed(Value::Field(merged))?;
        Ok(())
    }
}
