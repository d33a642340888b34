use crate::backends::error::BlsError;
use crate::backends::error::PointError;
use crate::backends::error::ScalarError;

use std::fmt::Debug;
use std::fmt::Display;
use std::ops::Add;
use std::ops::AddAssign;
use std::ops::Mul;
use std::ops::MulAssign;
use std::ops::SubAssign;

use crev_common::Blake2b256;
use rand_core::RngCore;
use sha2::digest::Digest;

pub trait Group: Sized {
    /// Hash-to-curve tag used for BLS signatures in this group.
    const DST: &'static [u8];
    /// Hash-to-curve tag of the second Pedersen generator in this group.
    const PEDERSEN_DST: &'static [u8];
    const POINT_SIZE: usize;

    type Affine: Affine
        + From<Self::Projective>
        + Into<Self::Projective>
        + for<'a> Mul<&'a Self::Scalar, Output = Self::Projective>;

    type Projective: Projective
        + From<Self::Affine>
        + for<'a> From<&'a Self::Affine>
        + for<'a> MulAssign<&'a Self::Scalar>
        + for<'a> AddAssign<&'a Self::Affine>
        + for<'a> AddAssign<&'a Self::Projective>;

    type Scalar: ScalarField + for<'a> Mul<&'a Self::Affine, Output = Self::Projective>;
}

pub trait ScalarField:
    Default
    + Sync
    + Send
    + Sized
    + Debug
    + PartialEq
    + Copy
    + Display
    + for<'a> Mul<&'a Self, Output = Self>
    + for<'a> MulAssign<&'a Self>
    + for<'a> Add<&'a Self, Output = Self>
    + for<'a> SubAssign<&'a Self>
    + for<'a> AddAssign<&'a Self>
{
    const SCALAR_SIZE: usize;

    fn zero() -> Self;
    fn one() -> Self;
    /// Samples a uniformly random scalar from the given source. Callers thread
    /// a seeded rng through so that runs are reproducible.
    fn random<R: RngCore>(rng: &mut R) -> Self;
    fn invert(&self) -> Result<Self, ScalarError>;
    fn from_u64(val: u64) -> Self;
    fn to_bytes_be(&self) -> Vec<u8>;
    fn from_bytes_be(bytes: &[u8]) -> Result<Self, ScalarError>;
    fn from_be_bytes_mod_order(bytes: &[u8]) -> Self;

    /// Challenge for Schnorr signatures: `H(r || public || msg)` reduced into the field.
    fn set_bytes(public: &[u8], r: &[u8], msg: &[u8]) -> Self {
        let mut h = sha2::Sha512::new();
        h.update(r);
        h.update(public);
        h.update(msg);

        Self::from_be_bytes_mod_order(h.finalize().as_slice())
    }
}

pub trait Affine: Default + Clone + Sync + Send + Sized + PartialEq + Debug + Display {
    fn generator() -> Self;
    fn identity() -> Self;
    fn is_identity(&self) -> bool;
    fn hash_to_curve(msg: &[u8], dst: &[u8]) -> Self;
    fn serialize(&self) -> Vec<u8>;
    fn deserialize(bytes: &[u8]) -> Result<Self, PointError>;
    fn hash(&self) -> [u8; 32] {
        let mut hasher = Blake2b256::new();
        hasher.update(self.serialize());

        hasher.finalize().into()
    }
}

pub trait Projective:
    Clone + Sync + Send + Sized + Debug + PartialEq + for<'a> AddAssign<&'a Self>
{
    fn identity() -> Self;
    fn generator() -> Self;
}

pub trait PairingCurve: Group {
    type Pair: Affine;

    fn bls_sign(msg: &[u8], sk: &Self::Scalar) -> Result<Self::Pair, BlsError>;
    fn bls_verify(key: &Self::Affine, sig: &Self::Pair, msg: &[u8]) -> Result<(), BlsError>;
}

pub trait Scheme: 'static + Sized + Send + Sync + Debug + Default + Clone + PartialEq {
    const ID: &'static str;

    type Key: Group<Scalar = Self::Scalar>
        + PairingCurve<Scalar = Self::Scalar, Pair = <Self::Sig as Group>::Affine>;

    type Sig: Group<Scalar = Self::Scalar>;

    type Scalar: ScalarField
        + for<'a> Mul<&'a <Self::Key as Group>::Affine, Output = <Self::Key as Group>::Projective>;

    fn sk_to_pk(sk: &Self::Scalar) -> <Self::Key as Group>::Affine {
        (<Self::Key as Group>::Affine::generator() * sk).into()
    }

    /// Second generator of the key group used by Pedersen commitments.
    fn pedersen_h() -> <Self::Key as Group>::Affine {
        <Self::Key as Group>::Affine::hash_to_curve(Self::ID.as_bytes(), Self::Key::PEDERSEN_DST)
    }
}
