use crate::points::KeyPoint;
use crate::points::KeyPointProjective;
use crate::traits::Affine;
use crate::traits::Group;
use crate::traits::ScalarField;
use crate::traits::Scheme;

use rand_core::RngCore;

// Vanilla Schnorr signature scheme over the key group, used for operator
// signatures on unicast envelopes and on published results.
// ref: https://github.com/drand/kyber/blob/master/sign/schnorr

/// To simplify error nesting structures, the [`SchnorrError`] has prefixes on variants `Sign` and `Verify`.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SchnorrError {
    #[error("verify: invalid input length, expected {expected}, received {received}")]
    VerifyInvalidInputLength { expected: usize, received: usize },
    #[error("verify: failed to deserialize R public commitment")]
    VerifyDeserializeR,
    #[error("verify: failed to deserialize a challenge")]
    VerifyDeserializeS,
    #[error("signature is invalid")]
    InvalidSignature,
}

pub fn signature_len<S: Scheme>() -> usize {
    <S::Key as Group>::POINT_SIZE + S::Scalar::SCALAR_SIZE
}

pub fn sign<S: Scheme, R: RngCore>(private: &S::Scalar, msg: &[u8], rng: &mut R) -> Vec<u8> {
    // create random secret k and public point commitment r
    let k = S::Scalar::random(rng);
    let mut r_bytes = S::sk_to_pk(&k).serialize();

    // create hash(public || r || message)
    let public_bytes = S::sk_to_pk(private).serialize();
    let h = S::Scalar::set_bytes(&public_bytes, &r_bytes, msg);

    // compute response s = k + x*h
    let xh = h * private;
    let s = k + &xh;

    //  return r || s
    r_bytes.extend_from_slice(&s.to_bytes_be());

    r_bytes
}

pub fn verify<S: Scheme>(public: &KeyPoint<S>, msg: &[u8], sig: &[u8]) -> Result<(), SchnorrError> {
    let expected = signature_len::<S>();
    if sig.len() != expected {
        return Err(SchnorrError::VerifyInvalidInputLength {
            expected,
            received: sig.len(),
        });
    }
    let (r_bytes, s_bytes) = sig.split_at(<S::Key as Group>::POINT_SIZE);
    let r = KeyPoint::<S>::deserialize(r_bytes).map_err(|_| SchnorrError::VerifyDeserializeR)?;
    let s = S::Scalar::from_bytes_be(s_bytes).map_err(|_| SchnorrError::VerifyDeserializeS)?;

    // recompute hash(public || r || msg)
    let h = S::Scalar::set_bytes(&public.serialize(), r_bytes, msg);

    // compute g^s
    let gs: KeyPoint<S> = (KeyPoint::<S>::generator() * &s).into();

    // compute r + a^h
    let mut ah: KeyPointProjective<S> = h * public;
    ah += &r;
    let ah: KeyPoint<S> = ah.into();

    if gs != ah {
        return Err(SchnorrError::InvalidSignature);
    }

    Ok(())
}
