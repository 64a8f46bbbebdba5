//! Overloaded scalar.

use super::annotation::annotate_tape;
use super::block_variable::{BlockVariable, BlockVariableRef};
use super::blocks::{AddBlock, AssignBlock, MulBlock};
use super::graph::{SharedTape, get_working_tape};
use super::overloaded::OverloadedType;
use crate::error::AdjointError;
use crate::value::Value;
use std::ops::{Add, AddAssign, Mul, MulAssign};
use std::rc::Rc;

/// A float whose arithmetic is recorded.
///
/// Cloning shares the current version; it does not record anything.
/// In-place updates (`assign`, `*=`, `+=`) start a new version on `self`
/// only, clones keep the version they were made from.
///
/// # Example
///
/// ```
/// use adjtape::tape::{AdjFloat, OverloadedType, Tape, push_working_tape};
///
/// let _guard = push_working_tape(Tape::shared());
/// let a = AdjFloat::new(3.0);
/// let b = AdjFloat::new(5.0);
/// let c = &a * &b;
/// assert_eq!(c.value(), 15.0);
/// assert_eq!(c.tape().borrow().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct AdjFloat {
    value: f64,
    block_variable: BlockVariableRef,
    tape: SharedTape,
}

impl AdjFloat {
    /// Wrap `value` on the working tape.
    pub fn new(value: f64) -> Self {
        Self::new_on(&get_working_tape(), value)
    }

    /// Wrap `value` on an explicit tape.
    pub fn new_on(tape: &SharedTape, value: f64) -> Self {
        Self {
            value,
            block_variable: BlockVariable::new(Value::Float(value)),
            tape: Rc::clone(tape),
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// `self * other`, recorded unless annotation is off.
    pub fn mul_with(&self, other: &AdjFloat, annotate: Option<bool>) -> AdjFloat {
        let out = AdjFloat::new_on(&self.tape, self.value * other.value);
        if annotate_tape(annotate) {
            let mut block = MulBlock::new(&self.block_variable, &other.block_variable);
            block.add_output(&out.block_variable);
            self.tape.borrow_mut().add_block(Box::new(block));
        }
        out
    }

    /// `self + other`, recorded unless annotation is off.
    pub fn add_with(&self, other: &AdjFloat, annotate: Option<bool>) -> AdjFloat {
        let out = AdjFloat::new_on(&self.tape, self.value + other.value);
        if annotate_tape(annotate) {
            let mut block = AddBlock::new(&self.block_variable, &other.block_variable);
            block.add_output(&out.block_variable);
            self.tape.borrow_mut().add_block(Box::new(block));
        }
        out
    }

    /// Assign the value of a scalar `other`.
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
        let Value::Float(value) = other.to_value() else {
            return Err(AdjointError::KindMismatch {
                expected: "float",
                actual: "field",
            });
        };

        let block = annotate_tape(annotate)
            .then(|| AssignBlock::new(&self.block_variable, other.block_variable()));
        self.value = value;
        let var = self.create_block_variable();
        if let Some(mut block) = block {
            block.add_output(&var);
            self.tape.borrow_mut().add_block(Box::new(block));
        }
        Ok(())
    }

    // untracked constants share the tape of the value they combine with
    fn constant(&self, value: f64) -> AdjFloat {
        AdjFloat::new_on(&self.tape, value)
    }
}

impl OverloadedType for AdjFloat {
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
        Value::Float(self.value)
    }
}

impl From<f64> for AdjFloat {
    fn from(value: f64) -> Self {
        AdjFloat::new(value)
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $with:ident) => {
        impl $trait<&AdjFloat> for &AdjFloat {
            type Output = AdjFloat;

            fn $method(self, rhs: &AdjFloat) -> AdjFloat {
                self.$with(rhs, None)
            }
        }

        impl $trait for AdjFloat {
            type Output = AdjFloat;

            fn $method(self, rhs: AdjFloat) -> AdjFloat {
                self.$with(&rhs, None)
            }
        }

        impl $trait<f64> for &AdjFloat {
            type Output = AdjFloat;

            fn $method(self, rhs: f64) -> AdjFloat {
                self.$with(&self.constant(rhs), None)
            }
        }

        impl $trait<f64> for AdjFloat {
            type Output = AdjFloat;

            fn $method(self, rhs: f64) -> AdjFloat {
                self.$with(&self.constant(rhs), None)
            }
        }

        impl $trait<&AdjFloat> for f64 {
            type Output = AdjFloat;

            fn $method(self, rhs: &AdjFloat) -> AdjFloat {
                rhs.constant(self).$with(rhs, None)
            }
        }
    };
}

impl_binary_op!(Mul, mul, mul_with);
impl_binary_op!(Add, add, add_with);

macro_rules! impl_assign_op {
    ($trait:ident, $method:ident, $with:ident) => {
        impl $trait<&AdjFloat> for AdjFloat {
            fn $method(&mut self, rhs: &AdjFloat) {
                *self = self.$with(rhs, None);
            }
        }

        impl $trait<f64> for AdjFloat {
            fn $method(&mut self, rhs: f64) {
                *self = self.$with(&self.constant(rhs), None);
            }
        }
    };
}

impl_assign_op!(MulAssign, mul_assign, mul_with);
impl_assign_op!(AddAssign, add_assign, add_with);
