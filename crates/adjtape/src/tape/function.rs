//! Overloaded composite field.

use super::adj_float::AdjFloat;
use super::annotation::annotate_tape;
use super::block_variable::{BlockVariable, BlockVariableRef};
use super::blocks::{AssignBlock, MergeBlock, MulBlock, SplitBlock};
use super::graph::{SharedTape, get_working_tape};
use super::overloaded::OverloadedType;
use crate::error::AdjointError;
use crate::field::Field;
use crate::value::Value;
use log::trace;
use std::rc::Rc;

/// A field whose assignments and component operations are recorded.
///
/// In-place operations (`assign`, `merge`, `scale_by`) start a new version:
/// the recorded block takes the previous variable as a dependency and a fresh
/// variable as its output. Without annotation the new version is a leaf.
/// The previous variable keeps its own payload, so it needs no checkpoint.
///
/// # Example
///
/// ```
/// use adjtape::tape::{AdjFloat, Function, Tape, push_working_tape};
///
/// let _guard = push_working_tape(Tape::shared());
/// let mut u = Function::zeros(&[3]);
/// let c = AdjFloat::new(2.0);
/// u.assign(&c).unwrap();
/// assert_eq!(u.field().data(), &[2.0, 2.0, 2.0]);
/// ```
#[derive(Debug, Clone)]
pub struct Function {
    field: Field,
    block_variable: BlockVariableRef,
    tape: SharedTape,
}

impl Function {
    /// Wrap `field` on the working tape.
    pub fn new(field: Field) -> Self {
        Self::new_on(&get_working_tape(), field)
    }

    /// Wrap `field` on an explicit tape.
    pub fn new_on(tape: &SharedTape, field: Field) -> Self {
        Self {
            block_variable: BlockVariable::new(Value::Field(field.clone())),
            field,
            tape: Rc::clone(tape),
        }
    }

    /// Zero field with the given component sizes, on the working tape.
    pub fn zeros(component_sizes: &[usize]) -> Self {
        Self::new(Field::zeros(component_sizes))
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn num_components(&self) -> usize {
        self.field.num_components()
    }

    /// Assign the value of `other`, broadcasting a float.
    pub fn assign<O: OverloadedType>(&mut self, other: &O) -> Result<(), AdjointError> {
        self.assign_with(other, None)
    }

    /// Assign with an explicit annotation override.
    ///
    /// Assigning a value to itself is a no-op and records nothing.
    pub fn assign_with<O: OverloadedType>(
        &mut self,
        other: &O,
        annotate: Option<bool>,
    ) -> Result<(), AdjointError> {
        if Rc::ptr_eq(&self.block_variable, other.block_variable()) {
            return Ok(());
        }
        let Value::Field(field) = other.to_value().conform_to(&self.to_value())? else {
            return Err(AdjointError::KindMismatch {
                expected: "field",
                actual: "float",
            });
        };

        let block = annotate_tape(annotate)
            .then(|| AssignBlock::new(&self.block_variable, other.block_variable()));
        self.field = field;
        let var = self.create_block_variable();
        if let Some(mut block) = block {
            block.add_output(&var);
            self.tape.borrow_mut().add_block(Box::new(block));
        }
        Ok(())
    }

    /// Deep copy, recorded as an assignment into the copy.
    pub fn copy(&self) -> Function {
        self.copy_with(None)
    }

    pub fn copy_with(&self, annotate: Option<bool>) -> Function {
        let mut copy = Function::new_on(&self.tape, self.field.clone());
        if annotate_tape(annotate) {
            let mut block = AssignBlock::new(&copy.block_variable, &self.block_variable);
            let var = copy.create_block_variable();
            block.add_output(&var);
            self.tape.borrow_mut().add_block(Box::new(block));
        }
        copy
    }

    /// One function per component, each recorded as a split.
    pub fn split(&self) -> Result<Vec<Function>, AdjointError> {
        self.split_with(None)
    }

    pub fn split_with(&self, annotate: Option<bool>) -> Result<Vec<Function>, AdjointError> {
        let annotate = annotate_tape(annotate);
        let mut parts = Vec::with_capacity(self.num_components());
        for index in 0..self.num_components() {
            let part = Function::new_on(&self.tape, self.field.sub(index)?);
            if annotate {
                let mut block = SplitBlock::new(&self.block_variable, index);
                block.add_output(&part.block_variable);
                self.tape.borrow_mut().add_block(Box::new(block));
            }
            parts.push(part);
        }
        Ok(parts)
    }

    /// Write `part` into component `index`.
    pub fn merge(&mut self, index: usize, part: &Function) -> Result<(), AdjointError> {
        self.merge_with(index, part, None)
    }

    pub fn merge_with(
        &mut self,
        index: usize,
        part: &Function,
        annotate: Option<bool>,
    ) -> Result<(), AdjointError> {
        self.field.assign_sub(index, &part.field)?;
        let block = annotate_tape(annotate)
            .then(|| MergeBlock::new(&self.block_variable, &part.block_variable, index));
        let var = self.create_block_variable();
        if let Some(mut block) = block {
            block.add_output(&var);
            self.tape.borrow_mut().add_block(Box::new(block));
        }
        Ok(())
    }

    /// Scale in place by a tracked float.
    pub fn scale_by(&mut self, factor: &AdjFloat) {
        self.scale_by_with(factor, None);
    }

    pub fn scale_by_with(&mut self, factor: &AdjFloat, annotate: Option<bool>) {
        let scale = factor.value();
        self.field = self.field.map(|x| x * scale);
        let block = annotate_tape(annotate)
            .then(|| MulBlock::new(factor.block_variable(), &self.block_variable));
        let var = self.create_block_variable();
        match block {
            Some(mut block) => {
                block.add_output(&var);
                self.tape.borrow_mut().add_block(Box::new(block));
            }
            None => trace!("unrecorded scaling, variable {:?} is a new leaf", var.id()),
        }
    }
}

impl OverloadedType for Function {
    fn block_variable(&self) -> &BlockVariableRef {
        &self.block_variable
    }

    fn set_block_variable(&mut self, var: BlockVariableRef) {
        self.block_variable = var;
    }

    fn tape(&self) -> &SharedTape {
        &self.tape
    }

    fn to_value(&self) -> Value {
        Value::Field(self.field.clone())
    }
}
