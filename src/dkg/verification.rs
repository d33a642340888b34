use super::justification::SharesJustifyingMember;
use super::member::impl_member;
use super::member::MemberCore;
use super::message::Accusations;
use super::message::DealMessage;
use super::message::SecretSharesAccusationsMessage;
use super::DkgError;
use super::Phase;
use crate::ephemeral::EphemeralKeyPair;
use crate::ephemeral::SymmetricKey;
use crate::pedersen::SecretCoefficients;
use crate::pedersen::SharePair;
use crate::poly::Index;
use crate::traits::Scheme;

use std::collections::BTreeMap;
use tracing::info;
use tracing::warn;

/// Phase 4.
pub struct CommitmentsVerifyingMember<S: Scheme> {
    pub(super) core: MemberCore<S>,
    pub(super) ephemeral: BTreeMap<Index, EphemeralKeyPair<S>>,
    pub(super) symmetric: BTreeMap<Index, SymmetricKey>,
    pub(super) coefficients: SecretCoefficients<S>,
    pub(super) own_share: SharePair<S>,
}

impl_member!(CommitmentsVerifyingMember, Phase::Verification);

impl<S: Scheme> CommitmentsVerifyingMember<S> {
    /// Decrypts and checks the share of every deal. Failed shares become
    /// accusations, peers without a deal are marked inactive.
    pub fn verify_received_shares(
        mut self,
        messages: &[DealMessage<S>],
    ) -> Result<(SharesJustifyingMember<S>, SecretSharesAccusationsMessage<S>), DkgError> {
        let me = self.core.index;
        let expected = self.core.expected_senders();
        let received = self.core.intake(messages);

        let mut shares = BTreeMap::new();
        let mut accused = BTreeMap::new();
        for j in &expected {
            let Some(deal) = received.get(j) else {
                continue;
            };
            match self.open_share(*j, deal) {
                Ok(share) => {
                    let _ = shares.insert(*j, share);
                }
                Err(reason) => {
                    warn!(parent: &self.core.log, "accusing member {j}: {reason}");
                    let key_pair = self
                        .ephemeral
                        .get(j)
                        .ok_or(DkgError::BUG_EphemeralKeyNotFound(*j))?;
                    let _ = accused.insert(*j, *key_pair.private());
                }
            }
        }
        self.core.mark_missing(&expected, &received, Phase::Committing);
        let _ = shares.insert(me, self.own_share);
        let log = &self.core.log;
        info!(parent: log, "verified {} shares, accusing {} members", shares.len() - 1, accused.len());

        let message = SecretSharesAccusationsMessage(Accusations {
            sender_index: me,
            accused,
        });
        let next = SharesJustifyingMember {
            core: self.core,
            ephemeral: self.ephemeral,
            coefficients: self.coefficients,
            shares,
        };

        Ok((next, message))
    }

    fn open_share(&self, j: Index, deal: &DealMessage<S>) -> Result<SharePair<S>, String> {
        let me = self.core.index;
        let key = self
            .symmetric
            .get(&j)
            .ok_or_else(|| "no symmetric key".to_string())?;
        let cipher = deal
            .shares
            .get(&me)
            .ok_or_else(|| "deal has no share for us".to_string())?;
        let plain = key.decrypt(cipher).map_err(|e| e.to_string())?;
        let share = SharePair::<S>::from_bytes(&plain).map_err(|e| e.to_string())?;

        let degree = self.core.group.dishonest_threshold();
        if !self.core.vss.verify(me, &share, &deal.commitments, degree) {
            return Err("share does not match the commitments".to_string());
        }

        Ok(share)
    }
}
