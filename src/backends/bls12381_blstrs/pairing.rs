use super::point::G1Affine;
use super::point::G2Affine;
use super::scalar::Scalar;
use crate::backends::error::BlsError;
use crate::curves::bls12381;
use crate::traits::Group;
use crate::traits::PairingCurve;

use group::prime::PrimeCurveAffine as _;
use group::Group as _;
use pairing::MillerLoopResult;
use pairing::MultiMillerLoop;
use std::ops::Neg;

/// Keys on G1, signatures on G2.
impl PairingCurve for bls12381::G1 {
    type Pair = <bls12381::G2 as Group>::Affine;

    fn bls_sign(msg: &[u8], sk: &Scalar) -> Result<G2Affine, BlsError> {
        if msg.is_empty() {
            return Err(BlsError::EmptyMessage);
        }
        let h = blstrs::G2Projective::hash_to_curve(msg, bls12381::G2::DST, &[]);

        Ok(G2Affine((h * sk.0).into()))
    }

    fn bls_verify(key: &G1Affine, sig: &G2Affine, msg: &[u8]) -> Result<(), BlsError> {
        if msg.is_empty() {
            return Err(BlsError::EmptyMessage);
        }
        let h: blstrs::G2Affine =
            blstrs::G2Projective::hash_to_curve(msg, bls12381::G2::DST, &[]).into();
        let g = blstrs::G1Affine::generator();
        let neg_key = key.0.neg();
        let h_prepared = blstrs::G2Prepared::from(h);
        let sig_prepared = blstrs::G2Prepared::from(sig.0);

        // e(-pk, H(m)) * e(g, sig) == 1
        let ok: bool = blstrs::Bls12::multi_miller_loop(&[(&neg_key, &h_prepared), (&g, &sig_prepared)])
            .final_exponentiation()
            .is_identity()
            .into();
        if !ok {
            return Err(BlsError::FailedVerification);
        }

        Ok(())
    }
}

/// Keys on G2, signatures on G1.
impl PairingCurve for bls12381::G2 {
    type Pair = <bls12381::G1 as Group>::Affine;

    fn bls_sign(msg: &[u8], sk: &Scalar) -> Result<G1Affine, BlsError> {
        if msg.is_empty() {
            return Err(BlsError::EmptyMessage);
        }
        let h = blstrs::G1Projective::hash_to_curve(msg, bls12381::G1::DST, &[]);

        Ok(G1Affine((h * sk.0).into()))
    }

    fn bls_verify(key: &G2Affine, sig: &G1Affine, msg: &[u8]) -> Result<(), BlsError> {
        if msg.is_empty() {
            return Err(BlsError::EmptyMessage);
        }
        let h: blstrs::G1Affine =
            blstrs::G1Projective::hash_to_curve(msg, bls12381::G1::DST, &[]).into();
        let neg_key = blstrs::G2Prepared::from(key.0.neg());
        let g = blstrs::G2Prepared::from(blstrs::G2Affine::generator());

        // e(H(m), -pk) * e(sig, g) == 1
        let ok: bool = blstrs::Bls12::multi_miller_loop(&[(&h, &neg_key), (&sig.0, &g)])
            .final_exponentiation()
            .is_identity()
            .into();
        if !ok {
            return Err(BlsError::FailedVerification);
        }

        Ok(())
    }
}
