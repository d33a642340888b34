use super::evidence::EvidenceLog;
use super::evidence::Logged;
use super::group::Group;
use super::ledger::QualificationLedger;
use super::message::DealMessage;
use super::message::EphemeralPublicKeyMessage;
use super::message::Packet;
use super::verification::CommitmentsVerifyingMember;
use super::DkgError;
use super::Phase;
use crate::config::DkgParams;
use crate::ephemeral::EphemeralKeyPair;
use crate::ephemeral::SymmetricKey;
use crate::pedersen::SecretCoefficients;
use crate::pedersen::Vss;
use crate::poly::Index;
use crate::traits::Affine;
use crate::traits::Scheme;

use rand_chacha::ChaChaRng;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::error;
use tracing::info;
use tracing::warn;

/// State shared by every phase of a member.
pub struct MemberCore<S: Scheme> {
    pub(super) index: Index,
    pub(super) group: Arc<Group<S>>,
    pub(super) vss: Vss<S>,
    pub(super) rng: ChaChaRng,
    pub(super) evidence: EvidenceLog,
    pub(super) ledger: QualificationLedger,
    pub(super) log: tracing::Span,
}

impl<S: Scheme> MemberCore<S> {
    pub fn index(&self) -> Index {
        self.index
    }

    pub fn group(&self) -> &Arc<Group<S>> {
        &self.group
    }

    pub fn ledger(&self) -> &QualificationLedger {
        &self.ledger
    }

    pub fn evidence(&self) -> &EvidenceLog {
        &self.evidence
    }

    pub fn log(&self) -> &tracing::Span {
        &self.log
    }

    /// Members taking part in the current phase: everybody not excluded, or
    /// the qualified members not excluded once the qualified set is frozen.
    pub fn participants(&self) -> BTreeSet<Index> {
        match self.ledger.operating_qual() {
            Ok(operating) => operating,
            Err(_) => self.ledger.operating(),
        }
    }

    /// Peers a message is still expected from.
    pub fn expected_senders(&self) -> BTreeSet<Index> {
        let mut expected = self.participants();
        let _ = expected.remove(&self.index);
        expected
    }

    /// Logs the received messages and returns the first one of every member.
    /// Messages of unknown senders and equivocations are dropped.
    pub(super) fn intake<'a, P: Packet>(&mut self, messages: &'a [P]) -> BTreeMap<Index, &'a P> {
        let mut accepted = BTreeMap::new();
        for message in messages {
            let sender = message.sender_index();
            if !self.group.is_member(sender) {
                error!(parent: &self.log, "ignoring {message}, sender is not a member");
                continue;
            }
            if self.evidence.put_message(message) == Logged::New {
                let _ = accepted.insert(sender, message);
            }
        }

        accepted
    }

    /// Marks every expected peer without a message as inactive in `phase`.
    pub(super) fn mark_missing<P>(
        &mut self,
        expected: &BTreeSet<Index>,
        received: &BTreeMap<Index, P>,
        phase: Phase,
    ) {
        for j in expected {
            if !received.contains_key(j) && self.ledger.mark_inactive(*j, phase) {
                warn!(parent: &self.log, "member {j} is inactive, no message in phase {phase}");
            }
        }
    }

    pub(super) fn disqualify(&mut self, j: Index, phase: Phase, reason: impl std::fmt::Display) {
        if self.ledger.disqualify(j, phase) {
            warn!(parent: &self.log, "member {j} is disqualified in phase {phase}: {reason}");
        }
    }
}

/// Common accessors of every phase of a member.
pub trait Member<S: Scheme> {
    /// Phase this member state executes.
    const PHASE: Phase;

    fn core(&self) -> &MemberCore<S>;

    fn index(&self) -> Index {
        self.core().index
    }

    fn ledger(&self) -> &QualificationLedger {
        &self.core().ledger
    }
}

macro_rules! impl_member {
    ($member:ident, $phase:expr) => {
        impl<S: Scheme> $crate::dkg::member::Member<S> for $member<S> {
            const PHASE: $crate::dkg::Phase = $phase;

            fn core(&self) -> &$crate::dkg::member::MemberCore<S> {
                &self.core
            }
        }
    };
}
pub(super) use impl_member;

/// Phase 1. A freshly created member.
pub struct EphemeralKeyGeneratingMember<S: Scheme> {
    core: MemberCore<S>,
}

/// Phase 2.
pub struct SymmetricKeyGeneratingMember<S: Scheme> {
    core: MemberCore<S>,
    ephemeral: BTreeMap<Index, EphemeralKeyPair<S>>,
}

/// Phase 3.
pub struct CommittingMember<S: Scheme> {
    core: MemberCore<S>,
    ephemeral: BTreeMap<Index, EphemeralKeyPair<S>>,
    symmetric: BTreeMap<Index, SymmetricKey>,
}

impl_member!(EphemeralKeyGeneratingMember, Phase::EphemeralKeyGeneration);
impl_member!(SymmetricKeyGeneratingMember, Phase::SymmetricKeyGeneration);
impl_member!(CommittingMember, Phase::Committing);

impl<S: Scheme> EphemeralKeyGeneratingMember<S> {
    pub fn new(index: Index, group: Arc<Group<S>>, params: &DkgParams) -> Result<Self, DkgError> {
        if !group.is_member(index) {
            return Err(DkgError::NotAMember(index));
        }
        let log = tracing::info_span!("dkg", member = index);
        let core = MemberCore {
            index,
            ledger: QualificationLedger::new(group.size()),
            group,
            vss: Vss::new(),
            rng: params.rng(),
            evidence: EvidenceLog::new(log.clone()),
            log,
        };

        Ok(Self { core })
    }

    /// Generates an ephemeral key pair for every peer.
    pub fn generate_ephemeral_keys(
        mut self,
    ) -> (SymmetricKeyGeneratingMember<S>, EphemeralPublicKeyMessage<S>) {
        let me = self.core.index;
        let peers: Vec<Index> = self.core.group.member_indices().filter(|j| *j != me).collect();

        let mut ephemeral = BTreeMap::new();
        let mut keys = BTreeMap::new();
        for j in peers {
            let key_pair = EphemeralKeyPair::<S>::generate(&mut self.core.rng);
            let _ = keys.insert(j, key_pair.public().clone());
            let _ = ephemeral.insert(j, key_pair);
        }
        info!(parent: &self.core.log, "generated {} ephemeral key pairs", ephemeral.len());

        let message = EphemeralPublicKeyMessage {
            sender_index: me,
            keys,
        };
        let next = SymmetricKeyGeneratingMember {
            core: self.core,
            ephemeral,
        };

        (next, message)
    }
}

impl<S: Scheme> SymmetricKeyGeneratingMember<S> {
    /// Derives a symmetric key with every peer that published its ephemeral
    /// keys. A message that does not hold exactly one valid key for every
    /// other member is publicly wrong and disqualifies its sender.
    pub fn generate_symmetric_keys(
        mut self,
        messages: &[EphemeralPublicKeyMessage<S>],
    ) -> CommittingMember<S> {
        let expected = self.core.expected_senders();
        let received = self.core.intake(messages);

        let mut symmetric = BTreeMap::new();
        for (j, message) in &received {
            if !expected.contains(j) {
                continue;
            }
            let complete = message
                .keys
                .keys()
                .copied()
                .eq(self.core.group.member_indices().filter(|i| i != j));
            if !complete || message.keys.values().any(|k| k.is_identity()) {
                self.core.disqualify(*j, Phase::SymmetricKeyGeneration, "malformed ephemeral public keys");
                continue;
            }
            let (Some(peer_key), Some(own)) = (message.keys.get(&self.core.index), self.ephemeral.get(j)) else {
                continue;
            };
            match own.agree(peer_key) {
                Ok(key) => {
                    let _ = symmetric.insert(*j, key);
                }
                Err(err) => self.core.disqualify(*j, Phase::SymmetricKeyGeneration, err),
            }
        }
        self.core.mark_missing(&expected, &received, Phase::EphemeralKeyGeneration);
        info!(parent: &self.core.log, "derived {} symmetric keys", symmetric.len());

        CommittingMember {
            core: self.core,
            ephemeral: self.ephemeral,
            symmetric,
        }
    }
}

impl<S: Scheme> CommittingMember<S> {
    /// Samples the two polynomials and deals their evaluations: commitments in
    /// the clear, shares encrypted for every peer with a symmetric key.
    pub fn commit(mut self) -> Result<(CommitmentsVerifyingMember<S>, DealMessage<S>), DkgError> {
        let degree = self.core.group.dishonest_threshold();
        let coefficients = SecretCoefficients::<S>::generate(degree, &mut self.core.rng);
        let commitments = self.core.vss.commit(&coefficients);

        let mut shares = BTreeMap::new();
        for (j, key) in &self.symmetric {
            let share = coefficients.shares_for(*j);
            let cipher = key
                .encrypt(&share.to_bytes(), &mut self.core.rng)
                .map_err(|source| DkgError::EncryptShare { index: *j, source })?;
            let _ = shares.insert(*j, cipher);
        }
        let own_share = coefficients.shares_for(self.core.index);
        info!(parent: &self.core.log, "dealing {} encrypted shares", shares.len());

        let message = DealMessage {
            sender_index: self.core.index,
            commitments,
            shares,
        };
        let next = CommitmentsVerifyingMember {
            core: self.core,
            ephemeral: self.ephemeral,
            symmetric: self.symmetric,
            coefficients,
            own_share,
        };

        Ok((next, message))
    }
}
