//! Composite field payload.
//!
//! A [`Field`] is a flat vector of `f64` split into contiguous components,
//! the way a function on a mixed space is laid out. It is the reference
//! backend value used by [`Function`](crate::tape::Function).

use crate::error::AdjointError;
use std::ops::Range;

/// Composite vector with one or more contiguous components.
///
/// # Example
///
/// ```
/// use adjtape::Field;
///
/// let f = Field::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0], &[2, 3]).unwrap();
/// assert_eq!(f.num_components(), 2);
/// assert_eq!(f.sub(1).unwrap().data(), &[3.0, 4.0, 5.0]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    data: Vec<f64>,
    /// Component boundaries, `offsets[i]..offsets[i + 1]` is component `i`.
    offsets: Vec<usize>,
}

fn offsets_from_sizes(sizes: &[usize]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(sizes.len() + 1);
    let mut acc = 0;
    offsets.push(acc);
    for &size in sizes {
        acc += size;
        offsets.push(acc);
    }
    offsets
}

impl Field {
    /// Create a zero field with the given component sizes.
    pub fn zeros(component_sizes: &[usize]) -> Self {
        let offsets = offsets_from_sizes(component_sizes);
        let len = offsets[offsets.len() - 1];
        Self {
            data: vec![0.0; len],
            offsets,
        }
    }

    /// Create a field from flat data and component sizes.
    ///
    /// # Errors
    ///
    /// Returns an error if the data length is not the sum of the sizes.
    pub fn from_vec(data: Vec<f64>, component_sizes: &[usize]) -> Result<Self, AdjointError> {
        let offsets = offsets_from_sizes(component_sizes);
        let expected = offsets[offsets.len() - 1];
        if data.len() != expected {
            return Err(AdjointError::LengthMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, offsets })
    }

    /// Create a single-component field.
    pub fn from_slice(data: &[f64]) -> Self {
        Self {
            offsets: vec![0, data.len()],
            data: data.to_vec(),
        }
    }

    /// Concatenate components into one composite field.
    pub fn from_components(parts: &[Field]) -> Self {
        let sizes: Vec<usize> = parts.iter().map(Field::len).collect();
        let data = parts.iter().flat_map(|p| p.data.iter().copied()).collect();
        Self {
            data,
            offsets: offsets_from_sizes(&sizes),
        }
    }

    /// Flat data.
    #[inline]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Mutable flat data.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Total number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of components.
    pub fn num_components(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Sizes of all components.
    pub fn component_sizes(&self) -> Vec<usize> {
        self.offsets.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Range of component `index` in the flat data.
    pub fn component_range(&self, index: usize) -> Result<Range<usize>, AdjointError> {
        if index >= self.num_components() {
            return Err(AdjointError::ComponentOutOfBounds {
                index,
                count: self.num_components(),
            });
        }
        Ok(self.offsets[index]..self.offsets[index + 1])
    }

    /// Deep copy of component `index` as a single-component field.
    pub fn sub(&self, index: usize) -> Result<Field, AdjointError> {
        let range = self.component_range(index)?;
        Ok(Field::from_slice(&self.data[range]))
    }

    /// Overwrite component `index` with the entries of `part`.
    pub fn assign_sub(&mut self, index: usize, part: &Field) -> Result<(), AdjointError> {
        let range = self.component_range(index)?;
        if range.len() != part.len() {
            return Err(AdjointError::LengthMismatch {
                expected: range.len(),
                actual: part.len(),
            });
        }
        self.data[range].copy_from_slice(&part.data);
        Ok(())
    }

    /// Zero field with this layout holding `part` at component `index`.
    pub fn embed(&self, index: usize, part: &Field) -> Result<Field, AdjointError> {
        let mut out = self.zeros_like();
        out.assign_sub(index, part)?;
        Ok(out)
    }

    /// The same entries regrouped into the component layout of `layout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the total lengths differ.
    pub fn with_layout_of(&self, layout: &Field) -> Result<Field, AdjointError> {
        if self.len() != layout.len() {
            return Err(AdjointError::LengthMismatch {
                expected: layout.len(),
                actual: self.len(),
            });
        }
        Ok(Field {
            data: self.data.clone(),
            offsets: layout.offsets.clone(),
        })
    }

    /// Zero field with this layout.
    pub fn zeros_like(&self) -> Field {
        Field {
            data: vec![0.0; self.data.len()],
            offsets: self.offsets.clone(),
        }
    }

    /// Set every entry to `value`.
    pub fn fill(&mut self, value: f64) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    /// Whether both fields have identical component layouts.
    pub fn same_layout(&self, other: &Field) -> bool {
        self.offsets == other.offsets
    }

    pub(crate) fn check_layout(&self, other: &Field) -> Result<(), AdjointError> {
        if self.same_layout(other) {
            Ok(())
        } else {
            Err(AdjointError::LayoutMismatch {
                expected: self.component_sizes(),
                actual: other.component_sizes(),
            })
        }
    }

    /// Elementwise combination of two fields with the same layout.
    pub(crate) fn zip_with(
        &self,
        other: &Field,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Field, AdjointError> {
        self.check_layout(other)?;
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| f(a, b))
            .collect();
        Ok(Field {
            data,
            offsets: self.offsets.clone(),
        })
    }

    /// Apply `f` to every entry.
    pub(crate) fn map(&self, f: impl Fn(f64) -> f64) -> Field {
        Field {
            data: self.data.iter().map(|&x| f(x)).collect(),
            offsets: self.offsets.clone(),
        }
    }
}
