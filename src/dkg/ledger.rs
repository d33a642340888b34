use super::DkgError;
use super::Phase;
use crate::poly::Index;

use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// Qualification ledger of a member: the qualified set, frozen once computed,
/// and the disqualified and inactive sets which only grow and never overlap.
#[derive(Debug, Clone)]
pub struct QualificationLedger {
    size: usize,
    qual: Option<BTreeSet<Index>>,
    /// Disqualified members with the phase of the fault.
    disqualified: BTreeMap<Index, Phase>,
    /// Inactive members with the phase whose message was missing.
    inactive: BTreeMap<Index, Phase>,
}

impl QualificationLedger {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            qual: None,
            disqualified: BTreeMap::new(),
            inactive: BTreeMap::new(),
        }
    }

    fn members(&self) -> impl Iterator<Item = Index> {
        1..=self.size as Index
    }

    /// Returns `false` if the member was already excluded.
    pub fn disqualify(&mut self, index: Index, phase: Phase) -> bool {
        if self.is_excluded(index) {
            return false;
        }
        let _ = self.disqualified.insert(index, phase);
        true
    }

    /// Returns `false` if the member was already excluded.
    pub fn mark_inactive(&mut self, index: Index, phase: Phase) -> bool {
        if self.is_excluded(index) {
            return false;
        }
        let _ = self.inactive.insert(index, phase);
        true
    }

    pub fn is_disqualified(&self, index: Index) -> bool {
        self.disqualified.contains_key(&index)
    }

    pub fn is_inactive(&self, index: Index) -> bool {
        self.inactive.contains_key(&index)
    }

    pub fn is_excluded(&self, index: Index) -> bool {
        self.is_disqualified(index) || self.is_inactive(index)
    }

    /// Members not excluded so far.
    pub fn operating(&self) -> BTreeSet<Index> {
        self.members().filter(|i| !self.is_excluded(*i)).collect()
    }

    /// Freezes the qualified set: all members except the disqualified ones
    /// and the ones that went silent before their deal was delivered.
    pub fn freeze_qual(&mut self) -> Result<&BTreeSet<Index>, DkgError> {
        if self.qual.is_some() {
            return Err(DkgError::BUG_QualAlreadyFrozen);
        }
        let qual = self
            .members()
            .filter(|i| !self.is_disqualified(*i))
            .filter(|i| !matches!(self.inactive.get(i), Some(phase) if *phase <= Phase::Committing))
            .collect();

        Ok(self.qual.insert(qual))
    }

    pub fn qual(&self) -> Option<&BTreeSet<Index>> {
        self.qual.as_ref()
    }

    /// Qualified members that are not excluded.
    pub fn operating_qual(&self) -> Result<BTreeSet<Index>, DkgError> {
        let qual = self.qual.as_ref().ok_or(DkgError::BUG_QualNotFrozen)?;
        Ok(qual.iter().copied().filter(|i| !self.is_excluded(*i)).collect())
    }

    /// Qualified members that are excluded at this point.
    pub fn excluded_qual(&self) -> Result<BTreeSet<Index>, DkgError> {
        let qual = self.qual.as_ref().ok_or(DkgError::BUG_QualNotFrozen)?;
        Ok(qual.iter().copied().filter(|i| self.is_excluded(*i)).collect())
    }

    /// Disqualified flags aligned to the member order, position `i - 1` for
    /// member `i`.
    pub fn disqualified_bitmap(&self) -> Vec<bool> {
        self.members().map(|i| self.is_disqualified(i)).collect()
    }

    /// Inactive flags aligned to the member order.
    pub fn inactive_bitmap(&self) -> Vec<bool> {
        self.members().map(|i| self.is_inactive(i)).collect()
    }

    pub fn disqualified(&self) -> impl Iterator<Item = (&Index, &Phase)> {
        self.disqualified.iter()
    }

    pub fn inactive(&self) -> impl Iterator<Item = (&Index, &Phase)> {
        self.inactive.iter()
    }
}
