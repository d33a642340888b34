use super::member::impl_member;
use super::member::MemberCore;
use super::DkgError;
use super::Phase;
use crate::chain::result_hash;
use crate::net::codec::write_bytes;
use crate::pedersen::SharePair;
use crate::points::KeyPoint;
use crate::points::KeyPointProjective;
use crate::poly::Index;
use crate::tbls::ThresholdSigner;
use crate::traits::Affine;
use crate::traits::Projective;
use crate::traits::Scheme;

use bytes::BufMut;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use tracing::info;
use tracing::warn;

/// Phase 12.
pub struct CombiningMember<S: Scheme> {
    pub(super) core: MemberCore<S>,
    pub(super) shares: BTreeMap<Index, SharePair<S>>,
    pub(super) master_share: S::Scalar,
    pub(super) points: BTreeMap<Index, Vec<KeyPoint<S>>>,
    pub(super) snapshot: BTreeSet<Index>,
    /// Individual public keys recovered for members of the snapshot.
    pub(super) reconstructed: BTreeMap<Index, KeyPoint<S>>,
}

/// Phase 13.
pub struct FinalizingMember<S: Scheme> {
    core: MemberCore<S>,
    group_public_key: Option<KeyPoint<S>>,
    private_key_share: S::Scalar,
}

impl_member!(CombiningMember, Phase::Combining);
impl_member!(FinalizingMember, Phase::Finalizing);

impl<S: Scheme> CombiningMember<S> {
    /// Sums the individual public keys of the contributing qualified members
    /// into the group public key. A qualified member whose key is unknown
    /// contributes nothing, and its share is taken out of the master share so
    /// that the share stays a share of the group private key.
    pub fn combine(mut self) -> Result<FinalizingMember<S>, DkgError> {
        let qual = self.core.ledger.qual().ok_or(DkgError::BUG_QualNotFrozen)?.clone();

        let mut group_key = KeyPointProjective::<S>::identity();
        let mut contributors = 0;
        for m in &qual {
            let individual = if self.snapshot.contains(m) {
                self.reconstructed.get(m)
            } else {
                self.points.get(m).and_then(|points| points.first())
            };
            match individual {
                Some(key) => {
                    group_key += key;
                    contributors += 1;
                }
                None => {
                    warn!(parent: &self.core.log, "dropping contribution of member {m}");
                    let share = self.shares.get(m).ok_or(DkgError::BUG_ShareNotFound(*m))?;
                    self.master_share -= &share.s;
                }
            }
        }

        let threshold = self.core.group.honest_threshold();
        let group_public_key = if contributors >= threshold {
            let key: KeyPoint<S> = group_key.into();
            info!(parent: &self.core.log, "group public key {key} from {contributors} contributors");
            Some(key)
        } else {
            warn!(parent: &self.core.log, "only {contributors} contributors, {threshold} needed");
            None
        };

        Ok(FinalizingMember {
            core: self.core,
            group_public_key,
            private_key_share: self.master_share,
        })
    }
}

impl<S: Scheme> FinalizingMember<S> {
    pub fn finalize(self) -> DkgResult<S> {
        let result = DkgResult {
            member_index: self.core.index,
            success: self.group_public_key.is_some(),
            group_public_key: self.group_public_key,
            private_key_share: self.private_key_share,
            disqualified: self.core.ledger.disqualified_bitmap(),
            inactive: self.core.ledger.inactive_bitmap(),
        };
        let core = &self.core;
        info!(parent: &core.log, "finished, success: {}, disqualified: {:?}, inactive: {:?}",
            result.success,
            core.ledger.disqualified().map(|(i, _)| *i).collect::<Vec<_>>(),
            core.ledger.inactive().map(|(i, _)| *i).collect::<Vec<_>>());

        result
    }
}

/// Outcome of a run for one member. A failed run is data, not an error: the
/// group public key is `None` iff `success` is false.
#[derive(Clone)]
pub struct DkgResult<S: Scheme> {
    pub member_index: Index,
    pub success: bool,
    pub group_public_key: Option<KeyPoint<S>>,
    pub private_key_share: S::Scalar,
    /// Aligned to the group order, position `i - 1` for member `i`.
    pub disqualified: Vec<bool>,
    pub inactive: Vec<bool>,
}

impl<S: Scheme> std::fmt::Debug for DkgResult<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DkgResult")
            .field("member_index", &self.member_index)
            .field("success", &self.success)
            .field("group_public_key", &self.group_public_key)
            .field("disqualified", &self.disqualified)
            .field("inactive", &self.inactive)
            .finish_non_exhaustive()
    }
}

fn write_bitmap(buf: &mut impl BufMut, bitmap: &[bool]) {
    let bytes: Vec<u8> = bitmap.iter().map(|b| *b as u8).collect();
    write_bytes(buf, &bytes);
}

impl<S: Scheme> DkgResult<S> {
    /// Encoding of the parts every member agrees on:
    /// `success || len-prefixed group public key || disqualified || inactive`.
    /// The member index and the private key share are left out.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![];
        buf.put_u8(self.success as u8);
        let key = self
            .group_public_key
            .as_ref()
            .map(|k| k.serialize())
            .unwrap_or_default();
        write_bytes(&mut buf, &key);
        write_bitmap(&mut buf, &self.disqualified);
        write_bitmap(&mut buf, &self.inactive);

        buf
    }

    /// Keccak-256 of [`Self::encode`], the hash supporting signatures are
    /// made over.
    pub fn hash(&self) -> [u8; 32] {
        result_hash(&self.encode())
    }

    /// Signer of a successful run.
    pub fn threshold_signer(&self) -> Option<ThresholdSigner<S>> {
        let key = self.group_public_key.as_ref().filter(|_| self.success)?;
        Some(ThresholdSigner::new(
            self.member_index,
            key.clone(),
            self.private_key_share,
        ))
    }
}
