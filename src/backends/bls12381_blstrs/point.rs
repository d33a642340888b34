use super::scalar::Scalar;
use crate::backends::error::PointError;
use crate::curves::bls12381;
use crate::traits::Affine;
use crate::traits::Projective;

use core::fmt;
use group::prime::PrimeCurveAffine as _;
use group::Group as _;
use std::ops::AddAssign;
use std::ops::Mul;
use std::ops::MulAssign;

/// Both BLS12-381 groups expose the same blstrs surface, only the point
/// size and the inner types differ.
macro_rules! impl_point {
    ($affine:ident, $projective:ident, $size:expr) => {
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $affine(pub(super) blstrs::$affine);

        #[derive(Debug, Clone, PartialEq)]
        pub struct $projective(pub(super) blstrs::$projective);

        impl Affine for $affine {
            fn generator() -> Self {
                Self(blstrs::$affine::generator())
            }

            fn identity() -> Self {
                Self(blstrs::$affine::identity())
            }

            fn is_identity(&self) -> bool {
                self.0.is_identity().into()
            }

            fn hash_to_curve(msg: &[u8], dst: &[u8]) -> Self {
                Self(blstrs::$projective::hash_to_curve(msg, dst, &[]).into())
            }

            fn serialize(&self) -> Vec<u8> {
                self.0.to_compressed().to_vec()
            }

            fn deserialize(bytes: &[u8]) -> Result<Self, PointError> {
                let bytes: &[u8; $size] =
                    bytes
                        .try_into()
                        .map_err(|_| PointError::InvalidInputLength {
                            expected: $size,
                            received: bytes.len(),
                        })?;

                // from_compressed performs the subgroup check
                let point = blstrs::$affine::from_compressed(bytes)
                    .into_option()
                    .ok_or(PointError::NonCanonicalInput)?;

                Ok(Self(point))
            }
        }

        impl Projective for $projective {
            fn identity() -> Self {
                Self(blstrs::$projective::identity())
            }

            fn generator() -> Self {
                Self(blstrs::$projective::generator())
            }
        }

        impl Mul<&Scalar> for $affine {
            type Output = $projective;

            fn mul(self, rhs: &Scalar) -> Self::Output {
                $projective(self.0 * rhs.0)
            }
        }

        impl Mul<&$affine> for Scalar {
            type Output = $projective;

            fn mul(self, rhs: &$affine) -> Self::Output {
                $projective(rhs.0 * self.0)
            }
        }

        impl<'a> Mul<&'a $affine> for &Scalar {
            type Output = $projective;

            fn mul(self, rhs: &'a $affine) -> Self::Output {
                $projective(rhs.0 * self.0)
            }
        }

        impl From<&$projective> for $affine {
            fn from(p: &$projective) -> $affine {
                $affine(blstrs::$affine::from(p.0))
            }
        }

        impl From<$projective> for $affine {
            fn from(p: $projective) -> $affine {
                $affine::from(&p)
            }
        }

        impl From<&$affine> for $projective {
            fn from(p: &$affine) -> $projective {
                $projective(blstrs::$projective::from(p.0))
            }
        }

        impl From<$affine> for $projective {
            fn from(p: $affine) -> $projective {
                $projective::from(&p)
            }
        }

        impl MulAssign<&Scalar> for $projective {
            #[inline]
            fn mul_assign(&mut self, rhs: &Scalar) {
                self.0 *= rhs.0;
            }
        }

        impl AddAssign<&$affine> for $projective {
            #[inline]
            fn add_assign(&mut self, rhs: &$affine) {
                self.0 += rhs.0;
            }
        }

        impl AddAssign<&$projective> for $projective {
            #[inline]
            fn add_assign(&mut self, rhs: &$projective) {
                self.0 += rhs.0;
            }
        }

        impl fmt::Display for $affine {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", &hex::encode(self.0.to_compressed()))
            }
        }
    };
}

impl_point!(G1Affine, G1Projective, bls12381::POINT_SIZE_G1);
impl_point!(G2Affine, G2Projective, bls12381::POINT_SIZE_G2);
