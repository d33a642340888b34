//! Threshold BLS signing with the key material produced by a successful run.

use crate::backends::error::BlsError;
use crate::backends::error::PointError;
use crate::backends::error::ScalarError;
use crate::points::KeyPoint;
use crate::points::SigPoint;
use crate::points::SigPointProjective;
use crate::poly::lagrange_coefficients;
use crate::poly::Index;
use crate::poly::PolyError;
use crate::traits::Affine;
use crate::traits::Group;
use crate::traits::PairingCurve;
use crate::traits::Projective;
use crate::traits::ScalarField;
use crate::traits::Scheme;

use std::collections::BTreeMap;

const INDEX_LEN: usize = 4;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TBlsError {
    #[error("sign: {0}")]
    Sign(BlsError),
    #[error("verify: {0}")]
    Verify(BlsError),
    #[error("not enough signature shares: needed {needed}, received {received}")]
    NotEnoughShares { needed: usize, received: usize },
    #[error("invalid input length of a share: expected {expected}, received {received}")]
    ShareInputLen { expected: usize, received: usize },
    #[error("invalid input length of a signer: expected {expected}, received {received}")]
    SignerInputLen { expected: usize, received: usize },
    #[error("signer index 0 is reserved for the secret")]
    ZeroIndex,
    #[error("point: {0}")]
    Point(#[from] PointError),
    #[error("scalar: {0}")]
    Scalar(#[from] ScalarError),
    #[error("recover: {0}")]
    Recover(#[from] PolyError),
}

/// Partial signature of a single member, `H(m) * x_i`.
#[derive(Debug)]
pub struct SigShare<S: Scheme> {
    index: Index,
    value: SigPoint<S>,
}

impl<S: Scheme> Clone for SigShare<S> {
    fn clone(&self) -> Self {
        Self {
            index: self.index,
            value: self.value.clone(),
        }
    }
}

impl<S: Scheme> PartialEq for SigShare<S> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.value == other.value
    }
}

impl<S: Scheme> SigShare<S> {
    pub fn new(index: Index, value: SigPoint<S>) -> Self {
        Self { index, value }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = self.index.to_be_bytes().to_vec();
        bytes.append(&mut self.value.serialize());

        bytes
    }

    pub fn deserialize(raw: &[u8]) -> Result<Self, TBlsError> {
        let expected = <S::Sig as Group>::POINT_SIZE + INDEX_LEN;
        if raw.len() != expected {
            return Err(TBlsError::ShareInputLen {
                expected,
                received: raw.len(),
            });
        }
        let (index, value) = raw.split_at(INDEX_LEN);
        let index = Index::from_be_bytes([index[0], index[1], index[2], index[3]]);
        let value = Affine::deserialize(value)?;

        Ok(Self::new(index, value))
    }

    pub fn index(&self) -> Index {
        self.index
    }

    pub fn value(&self) -> &SigPoint<S> {
        &self.value
    }
}

/// Signing identity of one member after a successful run: its index, the
/// group public key and its share of the group private key.
pub struct ThresholdSigner<S: Scheme> {
    member_index: Index,
    group_public_key: KeyPoint<S>,
    private_key_share: S::Scalar,
}

impl<S: Scheme> std::fmt::Debug for ThresholdSigner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThresholdSigner")
            .field("member_index", &self.member_index)
            .field("group_public_key", &self.group_public_key)
            .finish_non_exhaustive()
    }
}

impl<S: Scheme> ThresholdSigner<S> {
    pub fn new(
        member_index: Index,
        group_public_key: KeyPoint<S>,
        private_key_share: S::Scalar,
    ) -> Self {
        Self {
            member_index,
            group_public_key,
            private_key_share,
        }
    }

    pub fn member_index(&self) -> Index {
        self.member_index
    }

    pub fn group_public_key(&self) -> &KeyPoint<S> {
        &self.group_public_key
    }

    pub fn group_public_key_bytes(&self) -> Vec<u8> {
        self.group_public_key.serialize()
    }

    /// Public counterpart of the private key share, `g * x_i`.
    pub fn public_key_share(&self) -> KeyPoint<S> {
        S::sk_to_pk(&self.private_key_share)
    }

    pub fn calculate_signature_share(&self, msg: &[u8]) -> Result<SigShare<S>, TBlsError> {
        let value = <S::Key as PairingCurve>::bls_sign(msg, &self.private_key_share)
            .map_err(TBlsError::Sign)?;

        Ok(SigShare::new(self.member_index, value))
    }

    /// Recovers the group signature from at least `threshold` shares. Shares
    /// with the same index count once. The shares are not verified here, a
    /// wrong share yields a signature that does not verify under the group
    /// public key.
    pub fn complete_signature(
        &self,
        shares: &[SigShare<S>],
        threshold: usize,
    ) -> Result<SigPoint<S>, TBlsError> {
        recover::<S>(shares, threshold)
    }

    /// `member_index (4 bytes BE) || group public key || private key share`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.member_index.to_be_bytes().to_vec();
        bytes.append(&mut self.group_public_key.serialize());
        bytes.append(&mut self.private_key_share.to_bytes_be());

        bytes
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, TBlsError> {
        let point_size = <S::Key as Group>::POINT_SIZE;
        let expected = INDEX_LEN + point_size + S::Scalar::SCALAR_SIZE;
        if raw.len() != expected {
            return Err(TBlsError::SignerInputLen {
                expected,
                received: raw.len(),
            });
        }
        let (index, rest) = raw.split_at(INDEX_LEN);
        let (key, share) = rest.split_at(point_size);

        let member_index = Index::from_be_bytes([index[0], index[1], index[2], index[3]]);
        if member_index == 0 {
            return Err(TBlsError::ZeroIndex);
        }

        Ok(Self {
            member_index,
            group_public_key: Affine::deserialize(key)?,
            private_key_share: S::Scalar::from_bytes_be(share)?,
        })
    }
}

/// Verifies a group signature under the group public key.
pub fn verify<S: Scheme>(
    group_public_key: &KeyPoint<S>,
    msg: &[u8],
    sig: &SigPoint<S>,
) -> Result<(), TBlsError> {
    <S::Key as PairingCurve>::bls_verify(group_public_key, sig, msg).map_err(TBlsError::Verify)
}

/// Verifies a signature share under the public key share of its signer.
pub fn verify_share<S: Scheme>(
    public_key_share: &KeyPoint<S>,
    msg: &[u8],
    share: &SigShare<S>,
) -> Result<(), TBlsError> {
    <S::Key as PairingCurve>::bls_verify(public_key_share, share.value(), msg)
        .map_err(TBlsError::Verify)
}

// Recover reconstructs the full BLS signature S = x * H(m) from a threshold t
// of signature shares Si using Lagrange interpolation in the exponent.
fn recover<S: Scheme>(shares: &[SigShare<S>], t: usize) -> Result<SigPoint<S>, TBlsError> {
    // distinct indices, lowest first
    let mut distinct: BTreeMap<Index, &SigPoint<S>> = BTreeMap::new();
    for share in shares {
        distinct.entry(share.index()).or_insert(share.value());
    }
    if t == 0 || distinct.len() < t {
        return Err(TBlsError::NotEnoughShares {
            needed: t,
            received: distinct.len(),
        });
    }

    let (indices, points): (Vec<Index>, Vec<&SigPoint<S>>) = distinct.into_iter().take(t).unzip();
    let lambdas = lagrange_coefficients::<S>(&indices)?;

    let mut acc = SigPointProjective::<S>::identity();
    for (point, lambda) in points.into_iter().zip(lambdas.iter()) {
        let mut yi: SigPointProjective<S> = point.into();
        yi *= lambda;
        acc += &yi;
    }

    Ok(acc.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poly::PriPoly;
    use crate::schemes::DefaultScheme;
    use crate::schemes::SigsOnG1Scheme;
    use rand::SeedableRng;
    use rand_chacha::ChaChaRng;

    fn signers<S: Scheme>(n: Index, t: usize, seed: u8) -> Vec<ThresholdSigner<S>> {
        let mut rng = ChaChaRng::from_seed([seed; 32]);
        let poly = PriPoly::<S>::new(t - 1, &mut rng);
        let gpk = S::sk_to_pk(poly.secret());

        (1..=n)
            .map(|i| ThresholdSigner::new(i, gpk.clone(), poly.eval(i).v))
            .collect()
    }

    fn any_subset_signs<S: Scheme>() {
        let t = 3;
        let signers = signers::<S>(5, t, 31);
        let msg = b"threshold message";
        let shares: Vec<SigShare<S>> = signers
            .iter()
            .map(|s| s.calculate_signature_share(msg).unwrap())
            .collect();
        let gpk = signers[0].group_public_key().clone();

        for share in &shares {
            let signer = &signers[share.index() as usize - 1];
            assert!(verify_share::<S>(&signer.public_key_share(), msg, share).is_ok());
        }

        let sig_a = signers[0].complete_signature(&shares[..t], t).unwrap();
        let sig_b = signers[4].complete_signature(&shares[2..], t).unwrap();
        assert_eq!(sig_a, sig_b);
        assert!(verify::<S>(&gpk, msg, &sig_a).is_ok());
        assert!(verify::<S>(&gpk, b"another message", &sig_a).is_err());
    }

    #[test]
    fn test_any_subset_signs() {
        any_subset_signs::<DefaultScheme>();
        any_subset_signs::<SigsOnG1Scheme>();
    }

    #[test]
    fn too_few_distinct_shares_are_rejected() {
        type S = DefaultScheme;
        let t = 3;
        let signers = signers::<S>(5, t, 32);
        let share = signers[1].calculate_signature_share(b"msg").unwrap();
        let other = signers[3].calculate_signature_share(b"msg").unwrap();

        assert_eq!(
            signers[0].complete_signature(&[share.clone(), other.clone()], t),
            Err(TBlsError::NotEnoughShares {
                needed: 3,
                received: 2
            })
        );
        // the same share three times is still one share
        assert_eq!(
            signers[0].complete_signature(&[share.clone(), share.clone(), other], t),
            Err(TBlsError::NotEnoughShares {
                needed: 3,
                received: 2
            })
        );
    }

    #[test]
    fn empty_message_is_rejected() {
        let signers = signers::<DefaultScheme>(3, 2, 33);

        assert_eq!(
            signers[0].calculate_signature_share(&[]),
            Err(TBlsError::Sign(BlsError::EmptyMessage))
        );
    }

    #[test]
    fn signer_bytes() {
        type S = DefaultScheme;
        let signers = signers::<S>(3, 2, 34);
        let bytes = signers[2].to_bytes();
        assert_eq!(bytes.len(), 4 + 48 + 32);

        let decoded = ThresholdSigner::<S>::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.member_index(), 3);
        assert_eq!(decoded.group_public_key(), signers[2].group_public_key());
        assert_eq!(decoded.public_key_share(), signers[2].public_key_share());

        assert!(ThresholdSigner::<S>::from_bytes(&bytes[1..]).is_err());
        let mut zero = bytes.clone();
        zero[..4].copy_from_slice(&[0; 4]);
        assert_eq!(
            ThresholdSigner::<S>::from_bytes(&zero).unwrap_err(),
            TBlsError::ZeroIndex
        );
    }

    #[test]
    fn sig_share_bytes() {
        type S = DefaultScheme;
        let signers = signers::<S>(3, 2, 35);
        let share = signers[1].calculate_signature_share(b"msg").unwrap();
        let bytes = share.serialize();

        assert_eq!(bytes.len(), 4 + 96);
        assert_eq!(SigShare::<S>::deserialize(&bytes).unwrap(), share);
    }
}
