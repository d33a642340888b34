use super::justification::PointsJustifyingMember;
use super::member::impl_member;
use super::member::MemberCore;
use super::message::Accusations;
use super::message::PointsAccusationsMessage;
use super::message::PublicKeySharePointsMessage;
use super::DkgError;
use super::Phase;
use crate::ephemeral::EphemeralKeyPair;
use crate::pedersen::verify_public_share;
use crate::pedersen::SecretCoefficients;
use crate::pedersen::SharePair;
use crate::points::KeyPoint;
use crate::poly::Index;
use crate::traits::ScalarField;
use crate::traits::Scheme;

use std::collections::BTreeMap;
use tracing::info;
use tracing::warn;

/// Phase 6.
pub struct QualifiedMember<S: Scheme> {
    pub(super) core: MemberCore<S>,
    pub(super) ephemeral: BTreeMap<Index, EphemeralKeyPair<S>>,
    pub(super) coefficients: SecretCoefficients<S>,
    pub(super) shares: BTreeMap<Index, SharePair<S>>,
}

/// Phase 7.
pub struct SharingMember<S: Scheme> {
    core: MemberCore<S>,
    ephemeral: BTreeMap<Index, EphemeralKeyPair<S>>,
    coefficients: SecretCoefficients<S>,
    shares: BTreeMap<Index, SharePair<S>>,
    master_share: S::Scalar,
}

/// Phase 8.
pub struct PointsValidatingMember<S: Scheme> {
    core: MemberCore<S>,
    ephemeral: BTreeMap<Index, EphemeralKeyPair<S>>,
    shares: BTreeMap<Index, SharePair<S>>,
    master_share: S::Scalar,
    points: BTreeMap<Index, Vec<KeyPoint<S>>>,
}

impl_member!(QualifiedMember, Phase::Qualification);
impl_member!(SharingMember, Phase::PointsSharing);
impl_member!(PointsValidatingMember, Phase::PointsValidation);

impl<S: Scheme> QualifiedMember<S> {
    /// Freezes the qualified set and sums the shares received from its
    /// members into the master private key share `x_i = Σ_{j∈QUAL} s_ji`.
    pub fn qualify(mut self) -> Result<SharingMember<S>, DkgError> {
        let qual = self.core.ledger.freeze_qual()?.clone();
        info!(parent: &self.core.log, "qualified members: {qual:?}");

        let mut master_share = S::Scalar::zero();
        for j in &qual {
            let share = self.shares.get(j).ok_or(DkgError::BUG_ShareNotFound(*j))?;
            master_share += &share.s;
        }

        Ok(SharingMember {
            core: self.core,
            ephemeral: self.ephemeral,
            coefficients: self.coefficients,
            shares: self.shares,
            master_share,
        })
    }
}

impl<S: Scheme> SharingMember<S> {
    /// Publishes `A_k = g * a_k`. The secret polynomials are dropped here.
    pub fn share_points(self) -> (PointsValidatingMember<S>, PublicKeySharePointsMessage<S>) {
        let points = self.coefficients.public_coefficients().commits;
        let message = PublicKeySharePointsMessage {
            sender_index: self.core.index,
            points: points.clone(),
        };
        let next = PointsValidatingMember {
            points: BTreeMap::from([(self.core.index, points)]),
            core: self.core,
            ephemeral: self.ephemeral,
            shares: self.shares,
            master_share: self.master_share,
        };

        (next, message)
    }
}

impl<S: Scheme> PointsValidatingMember<S> {
    /// Checks the share received from every qualified peer against its public
    /// points. Mismatches become accusations, peers without points are marked
    /// inactive.
    pub fn verify_points(
        mut self,
        messages: &[PublicKeySharePointsMessage<S>],
    ) -> Result<(PointsJustifyingMember<S>, PointsAccusationsMessage<S>), DkgError> {
        let me = self.core.index;
        let degree = self.core.group.dishonest_threshold();
        let expected = self.core.expected_senders();
        let received = self.core.intake(messages);

        let mut accused = BTreeMap::new();
        for j in &expected {
            let Some(message) = received.get(j) else {
                continue;
            };
            let share = self.shares.get(j).ok_or(DkgError::BUG_ShareNotFound(*j))?;
            if verify_public_share::<S>(me, &share.s, &message.points, degree) {
                let _ = self.points.insert(*j, message.points.clone());
                continue;
            }
            warn!(parent: &self.core.log, "accusing member {j}: share does not match the public key share points");
            let key_pair = self
                .ephemeral
                .get(j)
                .ok_or(DkgError::BUG_EphemeralKeyNotFound(*j))?;
            let _ = accused.insert(*j, *key_pair.private());
        }
        self.core.mark_missing(&expected, &received, Phase::PointsSharing);
        info!(parent: &self.core.log, "validated points of {} members, accusing {}", self.points.len() - 1, accused.len());

        let message = PointsAccusationsMessage(Accusations {
            sender_index: me,
            accused,
        });
        let next = PointsJustifyingMember {
            core: self.core,
            shares: self.shares,
            master_share: self.master_share,
            points: self.points,
        };

        Ok((next, message))
    }
}
