//! Resolution of accusations from the evidence log.
//!
//! An accusation names an accused member and reveals the ephemeral private
//! key the accuser generated for it. With that key anybody can derive the
//! symmetric key of the pair, decrypt the logged share and repeat the check
//! the accuser claims failed. Every member holds the same log, so every
//! member reaches the same verdict without another round.

use super::member::impl_member;
use super::member::MemberCore;
use super::message::DealMessage;
use super::message::EphemeralPublicKeyMessage;
use super::message::PointsAccusationsMessage;
use super::message::PublicKeySharePointsMessage;
use super::message::SecretSharesAccusationsMessage;
use super::reconstruction::RevealingMember;
use super::sharing::QualifiedMember;
use super::Phase;
use crate::ephemeral::is_key_pair;
use crate::ephemeral::EphemeralKeyPair;
use crate::ephemeral::SymmetricKey;
use crate::pedersen::verify_public_share;
use crate::pedersen::SecretCoefficients;
use crate::pedersen::SharePair;
use crate::points::KeyPoint;
use crate::poly::Index;
use crate::traits::Scheme;

use std::collections::BTreeMap;
use std::fmt::Display;
use tracing::info;
use tracing::warn;

/// Proven misbehaviour of the accused.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Fault {
    /// No valid ephemeral public key for the accuser was logged.
    InvalidEphemeralKey,
    /// The logged deal carries no share for the accuser.
    MissingShare,
    UndecryptableShare,
    MalformedShare,
    /// The share does not match the Pedersen commitments.
    InvalidShare,
    /// The share does not match the public key share points.
    InvalidPoints,
}

/// Reason an accusation is ignored.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Rejection {
    NotAMember,
    SelfAccusation,
    AlreadyExcluded,
    /// The revealed private key is not the one the accuser published.
    KeyMismatch,
    /// Nothing was logged for the accused to check against.
    NoEvidence,
    /// The logged evidence passes the check.
    ConsistentEvidence,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Verdict {
    Disqualify(Fault),
    Reject(Rejection),
}

impl Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Fault::InvalidEphemeralKey => "invalid ephemeral public key for the accuser",
            Fault::MissingShare => "no share for the accuser in the deal",
            Fault::UndecryptableShare => "undecryptable share",
            Fault::MalformedShare => "malformed share",
            Fault::InvalidShare => "share inconsistent with the commitments",
            Fault::InvalidPoints => "share inconsistent with the public key share points",
        };
        f.write_str(reason)
    }
}

impl Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Rejection::NotAMember => "accused is not a member",
            Rejection::SelfAccusation => "self accusation",
            Rejection::AlreadyExcluded => "accused is already excluded",
            Rejection::KeyMismatch => "revealed key does not match the published one",
            Rejection::NoEvidence => "no evidence logged for the accused",
            Rejection::ConsistentEvidence => "evidence is consistent",
        };
        f.write_str(reason)
    }
}

/// Decrypts the share the accused dealt to the accuser, as it was logged.
fn disputed_share<S: Scheme>(
    core: &MemberCore<S>,
    accuser: Index,
    accused: Index,
    revealed: &S::Scalar,
) -> Result<(SharePair<S>, DealMessage<S>), Verdict> {
    if !core.group.is_member(accused) {
        return Err(Verdict::Reject(Rejection::NotAMember));
    }
    if accuser == accused {
        return Err(Verdict::Reject(Rejection::SelfAccusation));
    }
    if core.ledger.is_excluded(accused) {
        return Err(Verdict::Reject(Rejection::AlreadyExcluded));
    }

    let published = core
        .evidence
        .message::<EphemeralPublicKeyMessage<S>>(accuser)
        .and_then(|m| m.keys.get(&accused).cloned());
    match published {
        Some(public) if is_key_pair::<S>(revealed, &public) => {}
        _ => return Err(Verdict::Reject(Rejection::KeyMismatch)),
    }

    let peer_public = core
        .evidence
        .message::<EphemeralPublicKeyMessage<S>>(accused)
        .and_then(|m| m.keys.get(&accuser).cloned())
        .ok_or(Verdict::Disqualify(Fault::InvalidEphemeralKey))?;
    let key = SymmetricKey::derive::<S>(revealed, &peer_public)
        .map_err(|_| Verdict::Disqualify(Fault::InvalidEphemeralKey))?;

    let deal = core
        .evidence
        .message::<DealMessage<S>>(accused)
        .ok_or(Verdict::Reject(Rejection::NoEvidence))?;
    let cipher = deal
        .shares
        .get(&accuser)
        .ok_or(Verdict::Disqualify(Fault::MissingShare))?;
    let plain = key
        .decrypt(cipher)
        .map_err(|_| Verdict::Disqualify(Fault::UndecryptableShare))?;
    let share = SharePair::from_bytes(&plain).map_err(|_| Verdict::Disqualify(Fault::MalformedShare))?;

    Ok((share, deal))
}

/// Phase 5 verdict: the accused is at fault if its logged share for the
/// accuser fails the Pedersen check.
pub fn resolve_shares_accusation<S: Scheme>(
    core: &MemberCore<S>,
    accuser: Index,
    accused: Index,
    revealed: &S::Scalar,
) -> Verdict {
    let (share, deal) = match disputed_share(core, accuser, accused, revealed) {
        Ok(disputed) => disputed,
        Err(verdict) => return verdict,
    };
    let degree = core.group.dishonest_threshold();
    if core.vss.verify(accuser, &share, &deal.commitments, degree) {
        Verdict::Reject(Rejection::ConsistentEvidence)
    } else {
        Verdict::Disqualify(Fault::InvalidShare)
    }
}

/// Phase 9 verdict: the accused is at fault if its logged share for the
/// accuser does not match its public key share points.
pub fn resolve_points_accusation<S: Scheme>(
    core: &MemberCore<S>,
    accuser: Index,
    accused: Index,
    revealed: &S::Scalar,
) -> Verdict {
    let (share, deal) = match disputed_share(core, accuser, accused, revealed) {
        Ok(disputed) => disputed,
        Err(verdict) => return verdict,
    };
    let Some(points) = core.evidence.message::<PublicKeySharePointsMessage<S>>(accused) else {
        return Verdict::Reject(Rejection::NoEvidence);
    };
    let degree = core.group.dishonest_threshold();
    if !core.vss.verify(accuser, &share, &deal.commitments, degree) {
        return Verdict::Disqualify(Fault::InvalidShare);
    }
    if verify_public_share::<S>(accuser, &share.s, &points.points, degree) {
        Verdict::Reject(Rejection::ConsistentEvidence)
    } else {
        Verdict::Disqualify(Fault::InvalidPoints)
    }
}

type Resolver<S> = fn(&MemberCore<S>, Index, Index, &<S as Scheme>::Scalar) -> Verdict;

/// Applies the verdicts on every accusation of the participants, in index
/// order. Accusers are taken as of the start of the phase, so a member
/// disqualified here still has its own accusations heard.
fn resolve_all<S: Scheme>(
    core: &mut MemberCore<S>,
    accusations: &BTreeMap<Index, &BTreeMap<Index, S::Scalar>>,
    resolver: Resolver<S>,
    phase: Phase,
) {
    let accusers = core.participants();
    for (accuser, accused) in accusations {
        if !accusers.contains(accuser) {
            continue;
        }
        for (m, revealed) in *accused {
            match resolver(core, *accuser, *m, revealed) {
                Verdict::Disqualify(fault) => core.disqualify(*m, phase, fault),
                Verdict::Reject(rejection) => {
                    warn!(parent: &core.log, "ignoring accusation of member {accuser} against {m}: {rejection}")
                }
            }
        }
    }
}

/// Phase 5.
pub struct SharesJustifyingMember<S: Scheme> {
    pub(super) core: MemberCore<S>,
    pub(super) ephemeral: BTreeMap<Index, EphemeralKeyPair<S>>,
    pub(super) coefficients: SecretCoefficients<S>,
    /// Valid share pairs received, the own pair included.
    pub(super) shares: BTreeMap<Index, SharePair<S>>,
}

impl_member!(SharesJustifyingMember, Phase::SharesJustification);

impl<S: Scheme> SharesJustifyingMember<S> {
    pub fn resolve_shares_accusations(
        mut self,
        messages: &[SecretSharesAccusationsMessage<S>],
    ) -> QualifiedMember<S> {
        let expected = self.core.expected_senders();
        let received = self.core.intake(messages);
        let accusations = received.iter().map(|(i, m)| (*i, &m.0.accused)).collect();

        resolve_all(
            &mut self.core,
            &accusations,
            resolve_shares_accusation::<S>,
            Phase::SharesJustification,
        );
        self.core.mark_missing(&expected, &received, Phase::Verification);
        info!(parent: &self.core.log, "resolved {} shares accusations messages", received.len());

        QualifiedMember {
            core: self.core,
            ephemeral: self.ephemeral,
            coefficients: self.coefficients,
            shares: self.shares,
        }
    }
}

/// Phase 9.
pub struct PointsJustifyingMember<S: Scheme> {
    pub(super) core: MemberCore<S>,
    pub(super) shares: BTreeMap<Index, SharePair<S>>,
    pub(super) master_share: S::Scalar,
    /// Validated public key share points, the own points included.
    pub(super) points: BTreeMap<Index, Vec<KeyPoint<S>>>,
}

impl_member!(PointsJustifyingMember, Phase::PointsJustification);

impl<S: Scheme> PointsJustifyingMember<S> {
    pub fn resolve_points_accusations(
        mut self,
        messages: &[PointsAccusationsMessage<S>],
    ) -> RevealingMember<S> {
        let expected = self.core.expected_senders();
        let received = self.core.intake(messages);
        let accusations = received.iter().map(|(i, m)| (*i, &m.0.accused)).collect();

        resolve_all(
            &mut self.core,
            &accusations,
            resolve_points_accusation::<S>,
            Phase::PointsJustification,
        );
        self.core.mark_missing(&expected, &received, Phase::PointsValidation);
        info!(parent: &self.core.log, "resolved {} points accusations messages", received.len());

        RevealingMember {
            core: self.core,
            shares: self.shares,
            master_share: self.master_share,
            points: self.points,
        }
    }
}
