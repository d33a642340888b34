//! Publication of a finished result: members sign the result hash with their
//! operator keys and one of them submits the result with enough supporting
//! signatures.

use super::group::Group;
use super::message::ResultSignatureMessage;
use super::result::DkgResult;
use crate::chain::SupportSignatures;
use crate::config::Config;
use crate::poly::Index;
use crate::schnorr;
use crate::traits::Scheme;

use rand_core::RngCore;
use std::sync::Arc;
use tracing::warn;

/// Number of supporting signatures, own included, needed to submit.
pub fn support_threshold<S: Scheme>(config: &Config, group: &Group<S>) -> usize {
    config.support_threshold.unwrap_or(group.honest_threshold())
}

/// Signs the hash of `result` with the operator key of the member.
pub fn sign_result<S: Scheme, R: RngCore>(
    operator_private: &S::Scalar,
    result: &DkgResult<S>,
    rng: &mut R,
) -> ResultSignatureMessage {
    let result_hash = result.hash();

    ResultSignatureMessage {
        sender_index: result.member_index,
        result_hash,
        signature: schnorr::sign::<S, R>(operator_private, &result_hash, rng),
    }
}

/// Supporting signatures over one result hash, at most one per member.
pub struct SupportCollector<S: Scheme> {
    group: Arc<Group<S>>,
    result_hash: [u8; 32],
    signatures: SupportSignatures,
    log: tracing::Span,
}

impl<S: Scheme> SupportCollector<S> {
    /// Starts from the member's own signature.
    pub fn new(group: Arc<Group<S>>, own: &ResultSignatureMessage, log: tracing::Span) -> Self {
        let mut signatures = SupportSignatures::new();
        let _ = signatures.insert(own.sender_index, own.signature.clone());

        Self {
            group,
            result_hash: own.result_hash,
            signatures,
            log,
        }
    }

    /// Returns `true` if the signature was new and valid. Signatures over
    /// another hash support another result and are ignored.
    pub fn add(&mut self, message: &ResultSignatureMessage) -> bool {
        let sender = message.sender_index;
        if self.signatures.contains_key(&sender) {
            return false;
        }
        let Some(operator) = self.group.operator_key(sender) else {
            warn!(parent: &self.log, "result signature from non-member {sender}");
            return false;
        };
        if message.result_hash != self.result_hash {
            warn!(parent: &self.log, "member {sender} supports a different result {}", hex::encode(message.result_hash));
            return false;
        }
        if let Err(err) = schnorr::verify::<S>(operator, &message.result_hash, &message.signature) {
            warn!(parent: &self.log, "invalid result signature from member {sender}: {err}");
            return false;
        }
        let _ = self.signatures.insert(sender, message.signature.clone());

        true
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn supporters(&self) -> impl Iterator<Item = &Index> {
        self.signatures.keys()
    }

    pub fn signatures(&self) -> &SupportSignatures {
        &self.signatures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::KeyPoint;
    use crate::schemes::DefaultScheme;
    use crate::traits::Affine;
    use crate::traits::ScalarField;
    use rand::SeedableRng;
    use rand_chacha::ChaChaRng;

    type S = DefaultScheme;
    type Scalar = <S as Scheme>::Scalar;

    fn result(member_index: Index, success: bool) -> DkgResult<S> {
        DkgResult {
            member_index,
            success,
            group_public_key: success.then(KeyPoint::<S>::generator),
            private_key_share: Scalar::one(),
            disqualified: vec![false; 3],
            inactive: vec![false; 3],
        }
    }

    #[test]
    fn collects_valid_signatures_over_the_same_hash() {
        let mut rng = ChaChaRng::from_seed([101u8; 32]);
        let operators: Vec<Scalar> = (0..3).map(|_| Scalar::random(&mut rng)).collect();
        let group = Arc::new(
            Group::<S>::new(1, operators.iter().map(|sk| S::sk_to_pk(sk)).collect()).unwrap(),
        );
        assert_eq!(support_threshold(&Config::default(), &group), 2);

        let own = sign_result(&operators[0], &result(1, true), &mut rng);
        let mut collector = SupportCollector::new(group, &own, tracing::Span::none());

        // duplicate of the own signature
        assert!(!collector.add(&own));
        // a different result
        assert!(!collector.add(&sign_result(&operators[1], &result(2, false), &mut rng)));
        // signed with the key of member 3
        assert!(!collector.add(&sign_result(&operators[2], &result(2, true), &mut rng)));
        // unknown member
        assert!(!collector.add(&sign_result(&operators[2], &result(9, true), &mut rng)));

        assert!(collector.add(&sign_result(&operators[1], &result(2, true), &mut rng)));
        assert!(collector.add(&sign_result(&operators[2], &result(3, true), &mut rng)));
        assert_eq!(collector.supporters().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
