//! Pedersen verifiable secret sharing.
//!
//! A dealer samples two polynomials `a` and `b` of degree `t` and publishes
//! `C_k = g * a_k + h * b_k`. The receiver `j` of `(s, t) = (a(j), b(j))`
//! checks `g * s + h * t == Σ_k C_k * j^k` without learning anything about
//! `a(0)`, since the commitments are perfectly hiding.

use crate::backends::error::ScalarError;
use crate::points::KeyPoint;
use crate::points::KeyPointProjective;
use crate::poly::eval_commitments;
use crate::poly::Index;
use crate::poly::PriPoly;
use crate::poly::PubPoly;
use crate::traits::Affine;
use crate::traits::ScalarField;
use crate::traits::Scheme;

use rand_core::RngCore;

/// The two polynomials generated privately by a member. Never exposed except
/// as individual shares or commitments.
pub struct SecretCoefficients<S: Scheme> {
    a: PriPoly<S>,
    b: PriPoly<S>,
}

impl<S: Scheme> SecretCoefficients<S> {
    pub fn generate<R: RngCore>(degree: usize, rng: &mut R) -> Self {
        Self {
            a: PriPoly::new(degree, rng),
            b: PriPoly::new(degree, rng),
        }
    }

    /// Shares `(s_ij, t_ij)` for member `j`.
    pub fn shares_for(&self, j: Index) -> SharePair<S> {
        SharePair {
            s: self.a.eval(j).v,
            t: self.b.eval(j).v,
        }
    }

    /// `A_k = g * a_k`, published once the member is qualified.
    pub fn public_coefficients(&self) -> PubPoly<S> {
        self.a.commit()
    }

    pub fn degree(&self) -> usize {
        self.a.degree()
    }
}

/// Share pair sent by one member to another. The `s` value is the share of
/// the secret, `t` only blinds the commitment.
pub struct SharePair<S: Scheme> {
    pub s: S::Scalar,
    pub t: S::Scalar,
}

impl<S: Scheme> Clone for SharePair<S> {
    fn clone(&self) -> Self {
        Self {
            s: self.s,
            t: self.t,
        }
    }
}

impl<S: Scheme> PartialEq for SharePair<S> {
    fn eq(&self, other: &Self) -> bool {
        self.s == other.s && self.t == other.t
    }
}

impl<S: Scheme> std::fmt::Debug for SharePair<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharePair(..)")
    }
}

impl<S: Scheme> SharePair<S> {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.s.to_bytes_be();
        bytes.extend_from_slice(&self.t.to_bytes_be());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ScalarError> {
        let size = S::Scalar::SCALAR_SIZE;
        if bytes.len() != 2 * size {
            return Err(ScalarError::InvalidInputLength {
                expected: 2 * size,
                received: bytes.len(),
            });
        }
        let (s, t) = bytes.split_at(size);

        Ok(Self {
            s: S::Scalar::from_bytes_be(s)?,
            t: S::Scalar::from_bytes_be(t)?,
        })
    }
}

/// Pedersen VSS parameters: the two generators `g` and `h`.
pub struct Vss<S: Scheme> {
    h: KeyPoint<S>,
}

impl<S: Scheme> Default for Vss<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Scheme> Vss<S> {
    pub fn new() -> Self {
        Self { h: S::pedersen_h() }
    }

    pub fn h(&self) -> &KeyPoint<S> {
        &self.h
    }

    /// Commitments `C_k = g * a_k + h * b_k` to every coefficient.
    pub fn commit(&self, coefficients: &SecretCoefficients<S>) -> Vec<KeyPoint<S>> {
        coefficients
            .a
            .coeffs()
            .iter()
            .zip(coefficients.b.coeffs().iter())
            .map(|(a, b)| self.blinded(a, b).into())
            .collect()
    }

    /// Checks a share pair received by `receiver` against the dealer's
    /// commitments. Commitments of the wrong size never verify.
    pub fn verify(
        &self,
        receiver: Index,
        share: &SharePair<S>,
        commitments: &[KeyPoint<S>],
        degree: usize,
    ) -> bool {
        if commitments.len() != degree + 1 || receiver == 0 {
            return false;
        }
        let lhs: KeyPoint<S> = self.blinded(&share.s, &share.t).into();
        let rhs: KeyPoint<S> = eval_commitments::<S>(commitments, receiver).into();

        lhs == rhs
    }

    fn blinded(&self, a: &S::Scalar, b: &S::Scalar) -> KeyPointProjective<S> {
        let mut acc: KeyPointProjective<S> = KeyPoint::<S>::generator() * a;
        let hb: KeyPointProjective<S> = *b * &self.h;
        acc += &hb;
        acc
    }
}

/// Checks the secret share `s` received by `receiver` against the dealer's
/// public coefficients `A_k`: `g * s == Σ_k A_k * receiver^k`.
pub fn verify_public_share<S: Scheme>(
    receiver: Index,
    s: &S::Scalar,
    points: &[KeyPoint<S>],
    degree: usize,
) -> bool {
    if points.len() != degree + 1 || receiver == 0 {
        return false;
    }
    let expected: KeyPoint<S> = eval_commitments::<S>(points, receiver).into();

    S::sk_to_pk(s) == expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemes::DefaultScheme;
    use crate::schemes::SigsOnG1Scheme;
    use rand::SeedableRng;
    use rand_chacha::ChaChaRng;

    fn flip_bit(bytes: &mut [u8], bit: usize) {
        bytes[bit / 8] ^= 1 << (bit % 8);
    }

    fn valid_share_is_accepted<S: Scheme>() {
        let mut rng = ChaChaRng::from_seed([1u8; 32]);
        let vss = Vss::<S>::new();
        let t = 2;
        let coefficients = SecretCoefficients::<S>::generate(t, &mut rng);
        let commitments = vss.commit(&coefficients);

        for j in 1..=5 {
            let share = coefficients.shares_for(j);
            assert!(vss.verify(j, &share, &commitments, t));
            // the share of j is not a share of j + 1
            assert!(!vss.verify(j + 1, &share, &commitments, t));
        }
    }

    #[test]
    fn test_valid_share_is_accepted() {
        valid_share_is_accepted::<DefaultScheme>();
        valid_share_is_accepted::<SigsOnG1Scheme>();
    }

    #[test]
    fn tampered_shares_are_rejected() {
        type S = DefaultScheme;
        let mut rng = ChaChaRng::from_seed([2u8; 32]);
        let vss = Vss::<S>::new();
        let t = 1;
        let coefficients = SecretCoefficients::<S>::generate(t, &mut rng);
        let commitments = vss.commit(&coefficients);
        let share = coefficients.shares_for(3);
        let bytes = share.to_bytes();

        // low bits of both scalars, flipping them keeps the encoding canonical
        for bit in [248, 250, 255, 504, 507, 511] {
            let mut tampered = bytes.clone();
            flip_bit(&mut tampered, bit);
            let tampered = SharePair::<S>::from_bytes(&tampered).unwrap();
            assert!(!vss.verify(3, &tampered, &commitments, t));
        }
    }

    #[test]
    fn tampered_commitments_are_rejected() {
        type S = DefaultScheme;
        let mut rng = ChaChaRng::from_seed([3u8; 32]);
        let vss = Vss::<S>::new();
        let t = 2;
        let coefficients = SecretCoefficients::<S>::generate(t, &mut rng);
        let commitments = vss.commit(&coefficients);
        let share = coefficients.shares_for(2);

        for k in 0..commitments.len() {
            let mut tampered = commitments.clone();
            let mut p: KeyPointProjective<S> = tampered[k].clone().into();
            p += &KeyPoint::<S>::generator();
            tampered[k] = p.into();
            assert!(!vss.verify(2, &share, &tampered, t));
        }

        // wrong number of coefficients
        assert!(!vss.verify(2, &share, &commitments[..t], t));
    }

    #[test]
    fn public_coefficients_verify_the_secret_share() {
        type S = DefaultScheme;
        let mut rng = ChaChaRng::from_seed([4u8; 32]);
        let t = 2;
        let coefficients = SecretCoefficients::<S>::generate(t, &mut rng);
        let points = coefficients.public_coefficients().commits;
        let share = coefficients.shares_for(4);

        assert!(verify_public_share::<S>(4, &share.s, &points, t));
        assert!(!verify_public_share::<S>(4, &share.t, &points, t));
        assert!(!verify_public_share::<S>(5, &share.s, &points, t));
    }

    #[test]
    fn share_pair_bytes_have_fixed_size() {
        type S = DefaultScheme;
        let mut rng = ChaChaRng::from_seed([5u8; 32]);
        let coefficients = SecretCoefficients::<S>::generate(1, &mut rng);
        let share = coefficients.shares_for(1);
        let bytes = share.to_bytes();

        assert_eq!(bytes.len(), 64);
        assert_eq!(SharePair::<S>::from_bytes(&bytes).unwrap(), share);
        assert!(SharePair::<S>::from_bytes(&bytes[1..]).is_err());
    }
}
