//! Payload values carried through the tape.
//!
//! The tape treats values as opaque. It only needs the backend contract in
//! [`Payload`]: a same-shape zero, accumulation, a deep-copy snapshot
//! (`Clone`), and a size plus flattening for optimizer interop. [`Value`] is
//! the closed set of payload kinds a tape can hold, so that one tape can mix
//! scalars and fields.

use crate::error::AdjointError;
use crate::field::Field;
use std::fmt::Debug;

/// Backend operations the tape consumes.
pub trait Payload: Clone + Debug + Into<Value> {
    /// Short name used in error messages.
    const KIND: &'static str;

    /// Additive identity with the same shape.
    fn zeros_like(&self) -> Self;

    /// In-place addition.
    fn accumulate(&mut self, other: &Self) -> Result<(), AdjointError>;

    /// Number of scalar degrees of freedom.
    fn dim(&self) -> usize;

    /// Flatten into a plain vector.
    fn to_flat(&self) -> Vec<f64>;

    /// Read `self.dim()` entries of `src` starting at `offset`.
    ///
    /// Returns the offset just past the consumed entries.
    fn assign_flat(&mut self, src: &[f64], offset: usize) -> Result<usize, AdjointError>;
}

fn check_flat_len(src: &[f64], offset: usize, dim: usize) -> Result<(), AdjointError> {
    if offset + dim > src.len() {
        return Err(AdjointError::LengthMismatch {
            expected: offset + dim,
            actual: src.len(),
        });
    }
    Ok(())
}

impl Payload for f64 {
    const KIND: &'static str = "float";

    fn zeros_like(&self) -> Self {
        0.0
    }

    fn accumulate(&mut self, other: &Self) -> Result<(), AdjointError> {
        *self += other;
        Ok(())
    }

    fn dim(&self) -> usize {
        1
    }

    fn to_flat(&self) -> Vec<f64> {
        vec![*self]
    }

    fn assign_flat(&mut self, src: &[f64], offset: usize) -> Result<usize, AdjointError> {
        check_flat_len(src, offset, 1)?;
        *self = src[offset];
        Ok(offset + 1)
    }
}

impl Payload for Field {
    const KIND: &'static str = "field";

    fn zeros_like(&self) -> Self {
        Field::zeros_like(self)
    }

    fn accumulate(&mut self, other: &Self) -> Result<(), AdjointError> {
        self.check_layout(other)?;
        for (a, b) in self.data_mut().iter_mut().zip(other.data()) {
            *a += b;
        }
        Ok(())
    }

    fn dim(&self) -> usize {
        self.len()
    }

    fn to_flat(&self) -> Vec<f64> {
        self.data().to_vec()
    }

    fn assign_flat(&mut self, src: &[f64], offset: usize) -> Result<usize, AdjointError> {
        let dim = self.len();
        check_flat_len(src, offset, dim)?;
        self.data_mut().copy_from_slice(&src[offset..offset + dim]);
        Ok(offset + dim)
    }
}

/// A payload held by a block variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Float(f64),
    Field(Field),
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<Field> for Value {
    fn from(f: Field) -> Self {
        Value::Field(f)
    }
}

impl Value {
    /// Kind name of this payload.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Float(_) => f64::KIND,
            Value::Field(_) => Field::KIND,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            Value::Field(_) => None,
        }
    }

    pub fn as_field(&self) -> Option<&Field> {
        match self {
            Value::Float(_) => None,
            Value::Field(f) => Some(f),
        }
    }

    fn kind_mismatch(&self, other: &Value) -> AdjointError {
        AdjointError::KindMismatch {
            expected: self.kind(),
            actual: other.kind(),
        }
    }

    /// Additive identity with the same shape.
    pub fn zeros_like(&self) -> Value {
        match self {
            Value::Float(x) => Value::Float(x.zeros_like()),
            Value::Field(f) => Value::Field(Payload::zeros_like(f)),
        }
    }

    /// All-ones value with the same shape.
    pub fn ones_like(&self) -> Value {
        match self {
            Value::Float(_) => Value::Float(1.0),
            Value::Field(f) => Value::Field(f.map(|_| 1.0)),
        }
    }

    /// Sum of two values of the same kind and layout.
    pub fn add(&self, other: &Value) -> Result<Value, AdjointError> {
        let mut out = self.clone();
        out.accumulate(other)?;
        Ok(out)
    }

    /// Add `other` into `self`.
    pub fn accumulate(&mut self, other: &Value) -> Result<(), AdjointError> {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a.accumulate(b),
            (Value::Field(a), Value::Field(b)) => a.accumulate(b),
            (this, other) => Err(this.kind_mismatch(other)),
        }
    }

    /// Product. A float scales a field, two fields multiply entrywise.
    pub fn mul(&self, other: &Value) -> Result<Value, AdjointError> {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a * b)),
            (Value::Float(a), Value::Field(f)) | (Value::Field(f), Value::Float(a)) => {
                Ok(Value::Field(f.map(|x| a * x)))
            }
            (Value::Field(a), Value::Field(b)) => a.zip_with(b, |x, y| x * y).map(Value::Field),
        }
    }

    /// Multiply by a plain scalar.
    pub fn scale(&self, factor: f64) -> Value {
        match self {
            Value::Float(x) => Value::Float(x * factor),
            Value::Field(f) => Value::Field(f.map(|x| x * factor)),
        }
    }

    /// Sum of all entries.
    pub fn sum(&self) -> f64 {
        match self {
            Value::Float(x) => *x,
            Value::Field(f) => f.data().iter().sum(),
        }
    }

    /// Euclidean inner product.
    pub fn dot(&self, other: &Value) -> Result<f64, AdjointError> {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => Ok(a * b),
            (Value::Field(a), Value::Field(b)) => {
                a.check_layout(b)?;
                Ok(a.data().iter().zip(b.data()).map(|(x, y)| x * y).sum())
            }
            _ => Err(self.kind_mismatch(other)),
        }
    }

    /// Bring `self` to the shape of `target`.
    ///
    /// A field conformed to a float is summed, a float conformed to a field
    /// is broadcast. Same kinds must share the layout.
    pub fn conform_to(&self, target: &Value) -> Result<Value, AdjointError> {
        match (self, target) {
            (Value::Float(x), Value::Float(_)) => Ok(Value::Float(*x)),
            (Value::Field(f), Value::Float(_)) => Ok(Value::Float(f.data().iter().sum())),
            (Value::Float(x), Value::Field(t)) => Ok(Value::Field(t.map(|_| *x))),
            (Value::Field(f), Value::Field(t)) => {
                t.check_layout(f)?;
                Ok(Value::Field(f.clone()))
            }
        }
    }

    /// Number of scalar degrees of freedom.
    pub fn dim(&self) -> usize {
        match self {
            Value::Float(x) => x.dim(),
            Value::Field(f) => f.dim(),
        }
    }

    pub fn to_flat(&self) -> Vec<f64> {
        match self {
            Value::Float(x) => x.to_flat(),
            Value::Field(f) => f.to_flat(),
        }
    }

    /// Overwrite from `src[offset..]`, returning the next offset.
    pub fn assign_flat(&mut self, src: &[f64], offset: usize) -> Result<usize, AdjointError> {
        match self {
            Value::Float(x) => x.assign_flat(src, offset),
            Value::Field(f) => f.assign_flat(src, offset),
        }
    }

    /// Check that `other` can replace `self` (same kind and layout).
    pub(crate) fn check_compatible(&self, other: &Value) -> Result<(), AdjointError> {
        match (self, other) {
            (Value::Float(_), Value::Float(_)) => Ok(()),
            (Value::Field(a), Value::Field(b)) => a.check_layout(b),
            _ => Err(self.kind_mismatch(other)),
        }
    }
}
