// Params — the tree of named arrays that flows through every transformation
//
// Parameters, gradients, updates and per-parameter optimizer buffers (moments,
// traces, accumulators) all share this one representation: an ordered map
// from leaf name to an n-dimensional f64 array.
//
// Binary operations are structure-checked. Two trees combine only when they
// carry the same leaf names with the same shapes; anything else is an error
// instead of a silent broadcast.

use std::collections::BTreeMap;

use ndarray::{Array, ArrayD, Dimension, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An ordered collection of named `f64` arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params {
    leaves: BTreeMap<String, ArrayD<f64>>,
}

impl Params {
    pub fn new() -> Self {
        Params::default()
    }

    /// Build a tree from `(name, array)` pairs.
    pub fn from_leaves<I, S, D>(leaves: I) -> Self
    where
        I: IntoIterator<Item = (S, Array<f64, D>)>,
        S: Into<String>,
        D: Dimension,
    {
        let mut params = Params::new();
        for (name, leaf) in leaves {
            params.insert(name, leaf);
        }
        params
    }

    /// Insert (or replace) a leaf. Any dimensionality is accepted.
    pub fn insert<D: Dimension>(&mut self, name: impl Into<String>, leaf: Array<f64, D>) {
        self.leaves.insert(name.into(), leaf.into_dyn());
    }

    /// Builder form of [`Params::insert`].
    pub fn with<D: Dimension>(mut self, name: impl Into<String>, leaf: Array<f64, D>) -> Self {
        self.insert(name, leaf);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ArrayD<f64>> {
        self.leaves.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ArrayD<f64>> {
        self.leaves.get_mut(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArrayD<f64>)> {
        self.leaves.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> Vec<String> {
        self.leaves.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Total number of scalar elements over all leaves.
    pub fn num_elements(&self) -> usize {
        self.leaves.values().map(|leaf| leaf.len()).sum()
    }

    /// Same structure, all elements zero.
    pub fn zeros_like(&self) -> Params {
        self.map(|leaf| ArrayD::zeros(leaf.raw_dim()))
    }

    /// Same structure, all elements set to `value`.
    pub fn full_like(&self, value: f64) -> Params {
        self.map(|leaf| ArrayD::from_elem(leaf.raw_dim(), value))
    }

    /// Apply `f` to every leaf.
    pub fn map<F>(&self, f: F) -> Params
    where
        F: Fn(&ArrayD<f64>) -> ArrayD<f64>,
    {
        Params {
            leaves: self
                .leaves
                .iter()
                .map(|(name, leaf)| (name.clone(), f(leaf)))
                .collect(),
        }
    }

    /// Apply `f` to every element of every leaf.
    pub fn mapv<F>(&self, f: F) -> Params
    where
        F: Fn(f64) -> f64,
    {
        self.map(|leaf| leaf.mapv(&f))
    }

    /// Combine two trees elementwise. Fails unless both share structure.
    pub fn zip_map<F>(&self, other: &Params, f: F) -> Result<Params>
    where
        F: Fn(f64, f64) -> f64,
    {
        self.check_structure(other)?;
        let leaves = self
            .leaves
            .iter()
            .zip(other.leaves.values())
            .map(|((name, a), b)| {
                let combined = Zip::from(a).and(b).map_collect(|&x, &y| f(x, y));
                (name.clone(), combined)
            })
            .collect();
        Ok(Params { leaves })
    }

    /// Verify that `other` has exactly the same leaf names and shapes.
    pub fn check_structure(&self, other: &Params) -> Result<()> {
        if self.leaves.len() != other.leaves.len()
            || self.leaves.keys().zip(other.leaves.keys()).any(|(a, b)| a != b)
        {
            return Err(Error::StructureMismatch {
                expected: self.names(),
                got: other.names(),
            });
        }
        for ((name, a), b) in self.leaves.iter().zip(other.leaves.values()) {
            if a.shape() != b.shape() {
                return Err(Error::ShapeMismatch {
                    name: name.clone(),
                    expected: a.shape().to_vec(),
                    got: b.shape().to_vec(),
                });
            }
        }
        Ok(())
    }

    /// Multiply every element by `factor`.
    pub fn scale(&self, factor: f64) -> Params {
        self.mapv(|x| x * factor)
    }

    /// Σ x² over every element of every leaf.
    pub fn sum_of_squares(&self) -> f64 {
        self.leaves
            .values()
            .map(|leaf| leaf.iter().map(|x| x * x).sum::<f64>())
            .sum()
    }

    /// Global L2 norm of the whole tree.
    pub fn global_norm(&self) -> f64 {
        self.sum_of_squares().sqrt()
    }
}

/// Global L2 norm of a tree: `sqrt(sum of all elements squared)`.
///
/// Useful for monitoring gradient magnitudes during training.
pub fn global_norm(tree: &Params) -> f64 {
    tree.global_norm()
}

/// Add `updates` to `params` leaf by leaf.
///
/// This is the only step of the training loop that touches the parameters;
/// transformations only ever propose updates.
pub fn apply_updates(params: &Params, updates: &Params) -> Result<Params> {
    params.zip_map(updates, |p, u| p + u)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn tree() -> Params {
        Params::new()
            .with("b", array![1.0, -2.0])
            .with("w", Array2::from_elem((2, 2), 1.0))
    }

    #[test]
    fn global_norm_covers_every_leaf() {
        // 1 + 4 + 4 * 1 = 9
        assert_eq!(tree().global_norm(), 3.0);
        assert_eq!(global_norm(&Params::new()), 0.0);
    }

    #[test]
    fn apply_updates_adds_leafwise() {
        let params = tree();
        let updates = params.full_like(0.5);
        let next = apply_updates(&params, &updates).unwrap();
        assert_eq!(next.get("b").unwrap(), &array![1.5, -1.5].into_dyn());
        assert_eq!(next.get("w").unwrap()[[1, 1]], 1.5);
    }

    #[test]
    fn apply_updates_rejects_missing_leaf() {
        let params = tree();
        let updates = Params::new().with("b", array![0.0, 0.0]);
        let err = apply_updates(&params, &updates).unwrap_err();
        assert!(matches!(err, Error::StructureMismatch { .. }));
    }

    #[test]
    fn apply_updates_rejects_wrong_shape() {
        let params = tree();
        let updates = Params::new()
            .with("b", array![0.0, 0.0, 0.0])
            .with("w", Array2::zeros((2, 2)));
        match apply_updates(&params, &updates).unwrap_err() {
            Error::ShapeMismatch { name, expected, got } => {
                assert_eq!(name, "b");
                assert_eq!(expected, vec![2]);
                assert_eq!(got, vec![3]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zeros_like_keeps_structure() {
        let zeros = tree().zeros_like();
        assert_eq!(zeros.names(), vec!["b".to_string(), "w".to_string()]);
        assert_eq!(zeros.num_elements(), 6);
        assert_eq!(zeros.sum_of_squares(), 0.0);
    }

    #[test]
    fn serde_round_trip_keeps_shapes() {
        let json = serde_json::to_string(&tree()).unwrap();
        let back: Params = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tree());
    }
}
