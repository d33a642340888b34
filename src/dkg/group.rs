use super::DkgError;
use crate::net::MembershipFilter;
use crate::points::KeyPoint;
use crate::poly::Index;
use crate::traits::Affine;
use crate::traits::Scheme;

use std::collections::HashSet;
use std::sync::Arc;

/// Group of a run. Immutable once constructed and shared read-only by every
/// member role of the node.
#[derive(Debug)]
pub struct Group<S: Scheme> {
    dishonest_threshold: usize,
    /// Operator static keys, member `i` at position `i - 1`.
    operators: Vec<KeyPoint<S>>,
    operators_bytes: Vec<Vec<u8>>,
}

impl<S: Scheme> Group<S> {
    pub fn new(dishonest_threshold: usize, operators: Vec<KeyPoint<S>>) -> Result<Self, DkgError> {
        let size = operators.len();
        if size == 0 {
            return Err(DkgError::GroupEmpty);
        }
        if 2 * dishonest_threshold >= size {
            return Err(DkgError::ThresholdTooHigh {
                threshold: dishonest_threshold,
                size,
            });
        }

        let operators_bytes: Vec<Vec<u8>> = operators.iter().map(|k| k.serialize()).collect();
        let mut seen = HashSet::new();
        for (i, key) in operators_bytes.iter().enumerate() {
            if !seen.insert(key) {
                return Err(DkgError::DuplicateOperator(i as Index + 1));
            }
        }

        Ok(Self {
            dishonest_threshold,
            operators,
            operators_bytes,
        })
    }

    pub fn size(&self) -> usize {
        self.operators.len()
    }

    /// Maximum number of misbehaving members tolerated, also the degree of
    /// the polynomials.
    pub fn dishonest_threshold(&self) -> usize {
        self.dishonest_threshold
    }

    /// Minimum number of shares needed to reconstruct.
    pub fn honest_threshold(&self) -> usize {
        self.dishonest_threshold + 1
    }

    pub fn member_indices(&self) -> impl Iterator<Item = Index> {
        1..=self.size() as Index
    }

    pub fn is_member(&self, index: Index) -> bool {
        index >= 1 && index as usize <= self.size()
    }

    pub fn operator_key(&self, index: Index) -> Option<&KeyPoint<S>> {
        if !self.is_member(index) {
            return None;
        }
        self.operators.get(index as usize - 1)
    }

    /// Member index of the operator with the given serialized key.
    pub fn index_of(&self, key: &[u8]) -> Option<Index> {
        self.operators_bytes
            .iter()
            .position(|k| k == key)
            .map(|pos| pos as Index + 1)
    }

    /// Accepts envelopes from group operators only.
    pub fn membership_filter(&self) -> MembershipFilter {
        let members: HashSet<Vec<u8>> = self.operators_bytes.iter().cloned().collect();
        Arc::new(move |sender: &[u8]| members.contains(sender))
    }
}
