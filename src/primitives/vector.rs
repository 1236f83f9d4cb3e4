//! Dense vector type.

use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// A dense vector of values.
///
/// # Examples
///
/// ```
/// use geoloc::primitives::Vector;
///
/// let v = Vector::from_slice(&[3.0, 4.0]);
/// assert!((v.norm() - 5.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vector<T> {
    data: Vec<T>,
}

impl<T: Copy> Vector<T> {
    /// Creates a vector taking ownership of `data`.
    #[must_use]
    pub fn from_vec(data: Vec<T>) -> Self {
        Self { data }
    }

    /// Creates a vector by copying a slice.
    #[must_use]
    pub fn from_slice(data: &[T]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the vector has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the underlying data as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Returns the underlying data as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consumes the vector, returning its storage.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

impl Vector<f64> {
    /// Creates a vector of zeros.
    #[must_use]
    pub fn zeros(n: usize) -> Self {
        Self { data: vec![0.0; n] }
    }

    /// Creates a vector of ones.
    #[must_use]
    pub fn ones(n: usize) -> Self {
        Self { data: vec![1.0; n] }
    }

    /// Dot product.
    ///
    /// # Panics
    ///
    /// Panics if lengths differ.
    #[must_use]
    pub fn dot(&self, other: &Self) -> f64 {
        assert_eq!(self.len(), other.len(), "dot product of unequal lengths");
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a * b)
            .sum()
    }

    /// Sum of squares.
    #[must_use]
    pub fn norm_squared(&self) -> f64 {
        self.data.iter().map(|x| x * x).sum()
    }

    /// Euclidean norm.
    #[must_use]
    pub fn norm(&self) -> f64 {
        self.norm_squared().sqrt()
    }

    /// Sum of elements.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Returns `self + alpha * other`.
    #[must_use]
    pub fn add_scaled(&self, alpha: f64, other: &Self) -> Self {
        assert_eq!(self.len(), other.len(), "add_scaled of unequal lengths");
        Self {
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| a + alpha * b)
                .collect(),
        }
    }

    /// Returns `self - other`.
    #[must_use]
    pub fn sub(&self, other: &Self) -> Self {
        self.add_scaled(-1.0, other)
    }

    /// Multiplies each element by a scalar.
    #[must_use]
    pub fn mul_scalar(&self, scalar: f64) -> Self {
        Self {
            data: self.data.iter().map(|x| x * scalar).collect(),
        }
    }

    /// Infinity norm (largest absolute element).
    #[must_use]
    pub fn norm_inf(&self) -> f64 {
        self.data.iter().fold(0.0, |m, x| m.max(x.abs()))
    }
}

impl<T> Index<usize> for Vector<T> {
    type Output = T;

    fn index(&self, i: usize) -> &T {
        &self.data[i]
    }
}

impl<T> IndexMut<usize> for Vector<T> {
    fn index_mut(&mut self, i: usize) -> &mut T {
        &mut self.data[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_and_norm() {
        let a = Vector::from_slice(&[1.0, 2.0, 3.0]);
        let b = Vector::from_slice(&[4.0, 5.0, 6.0]);
        assert!((a.dot(&b) - 32.0).abs() < 1e-12);
        assert!((Vector::from_slice(&[3.0, 4.0]).norm() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_add_scaled_and_sub() {
        let a = Vector::from_slice(&[1.0, 1.0]);
        let b = Vector::from_slice(&[2.0, -4.0]);
        let c = a.add_scaled(0.5, &b);
        assert_eq!(c.as_slice(), &[2.0, -1.0]);
        assert_eq!(c.sub(&a).as_slice(), &[1.0, -2.0]);
    }

    #[test]
    fn test_norm_inf() {
        let v = Vector::from_slice(&[0.5, -3.0, 2.0]);
        assert!((v.norm_inf() - 3.0).abs() < 1e-12);
        assert_eq!(Vector::zeros(0).norm_inf(), 0.0);
    }

    #[test]
    fn test_index_mut() {
        let mut v = Vector::zeros(2);
        v[1] = 7.0;
        assert_eq!(v[1], 7.0);
        assert_eq!(v.sum(), 7.0);
    }

    #[test]
    #[should_panic(expected = "unequal lengths")]
    fn test_dot_length_mismatch_panics() {
        let _ = Vector::ones(2).dot(&Vector::ones(3));
    }
}
