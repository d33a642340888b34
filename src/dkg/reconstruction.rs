//! Recovery of the individual keys of qualified members that got excluded
//! after the qualified set was frozen. Their shares are revealed in the clear
//! and every member interpolates the same `t + 1` lowest valid ones.

use super::member::impl_member;
use super::member::MemberCore;
use super::message::DealMessage;
use super::message::RevealedSharesMessage;
use super::result::CombiningMember;
use super::DkgError;
use super::Phase;
use crate::pedersen::SharePair;
use crate::points::KeyPoint;
use crate::poly::recover_secret;
use crate::poly::Index;
use crate::poly::PriShare;
use crate::traits::Scheme;

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use tracing::info;
use tracing::warn;

/// Phase 10.
pub struct RevealingMember<S: Scheme> {
    pub(super) core: MemberCore<S>,
    pub(super) shares: BTreeMap<Index, SharePair<S>>,
    pub(super) master_share: S::Scalar,
    pub(super) points: BTreeMap<Index, Vec<KeyPoint<S>>>,
}

/// Phase 11.
pub struct ReconstructingMember<S: Scheme> {
    core: MemberCore<S>,
    shares: BTreeMap<Index, SharePair<S>>,
    master_share: S::Scalar,
    points: BTreeMap<Index, Vec<KeyPoint<S>>>,
    /// Qualified members excluded when revealing started.
    snapshot: BTreeSet<Index>,
}

impl_member!(RevealingMember, Phase::Revealing);
impl_member!(ReconstructingMember, Phase::Reconstruction);

impl<S: Scheme> RevealingMember<S> {
    /// Takes the snapshot of excluded qualified members and reveals the
    /// shares received from them. Members excluded later are never added.
    pub fn reveal(self) -> Result<(ReconstructingMember<S>, RevealedSharesMessage<S>), DkgError> {
        let me = self.core.index;
        let snapshot = self.core.ledger.excluded_qual()?;

        let shares: BTreeMap<Index, SharePair<S>> = snapshot
            .iter()
            .filter(|m| **m != me)
            .filter_map(|m| self.shares.get(m).map(|share| (*m, share.clone())))
            .collect();
        if !snapshot.is_empty() {
            info!(parent: &self.core.log, "revealing shares of excluded members {snapshot:?}");
        }

        let message = RevealedSharesMessage {
            sender_index: me,
            shares,
        };
        let next = ReconstructingMember {
            core: self.core,
            shares: self.shares,
            master_share: self.master_share,
            points: self.points,
            snapshot,
        };

        Ok((next, message))
    }
}

impl<S: Scheme> ReconstructingMember<S> {
    /// Recovers the individual public key of every member of the snapshot
    /// with enough valid revealed shares. Members without enough shares are
    /// left out and later dropped from the group key.
    pub fn reconstruct(
        mut self,
        messages: &[RevealedSharesMessage<S>],
    ) -> Result<CombiningMember<S>, DkgError> {
        let expected = self.core.expected_senders();
        let received = self.core.intake(messages);
        self.core.mark_missing(&expected, &received, Phase::Revealing);

        let needed = self.core.group.honest_threshold();
        let mut reconstructed = BTreeMap::new();
        for m in &self.snapshot {
            let revealed = self.valid_revealed_shares(*m, &received);
            if revealed.len() < needed {
                warn!(parent: &self.core.log, "can't reconstruct member {m}: {} valid shares out of {needed}", revealed.len());
                continue;
            }
            let private = recover_secret::<S>(&revealed, needed).map_err(DkgError::BUG_Interpolation)?;
            let _ = reconstructed.insert(*m, S::sk_to_pk(&private));
            info!(parent: &self.core.log, "reconstructed individual key of member {m}");
        }

        Ok(CombiningMember {
            core: self.core,
            shares: self.shares,
            master_share: self.master_share,
            points: self.points,
            snapshot: self.snapshot,
            reconstructed,
        })
    }

    /// Shares of `m` revealed by anybody that pass the Pedersen check against
    /// the logged commitments of `m`, lowest revealer first. The own share
    /// counts as revealed.
    fn valid_revealed_shares(
        &self,
        m: Index,
        received: &BTreeMap<Index, &RevealedSharesMessage<S>>,
    ) -> Vec<PriShare<S>> {
        let Some(deal) = self.core.evidence.message::<DealMessage<S>>(m) else {
            return vec![];
        };
        let degree = self.core.group.dishonest_threshold();

        let mut candidates: BTreeMap<Index, &SharePair<S>> = received
            .iter()
            .filter(|(revealer, _)| **revealer != m)
            .filter_map(|(revealer, message)| message.shares.get(&m).map(|share| (*revealer, share)))
            .collect();
        if self.core.index != m {
            if let Some(own) = self.shares.get(&m) {
                let _ = candidates.insert(self.core.index, own);
            }
        }

        candidates
            .into_iter()
            .filter(|(revealer, share)| {
                let valid = self.core.vss.verify(*revealer, share, &deal.commitments, degree);
                if !valid {
                    warn!(parent: &self.core.log, "member {revealer} revealed an invalid share of member {m}");
                }
                valid
            })
            .map(|(revealer, share)| PriShare::new(revealer, share.s))
            .collect()
    }
}
