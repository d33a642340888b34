use crate::backends::error::ScalarError;
use crate::curves::bls12381;
use crate::traits::ScalarField;

use core::fmt;
use group::ff::Field;
use rand_core::RngCore;
use std::fmt::Display;
use std::ops::Add;
use std::ops::AddAssign;
use std::ops::Mul;
use std::ops::MulAssign;
use std::ops::SubAssign;

#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct Scalar(pub(super) blstrs::Scalar);

impl ScalarField for Scalar {
    const SCALAR_SIZE: usize = bls12381::SCALAR_SIZE;

    fn zero() -> Self {
        Self(blstrs::Scalar::ZERO)
    }

    fn one() -> Self {
        Self(blstrs::Scalar::ONE)
    }

    fn random<R: RngCore>(rng: &mut R) -> Self {
        Self(blstrs::Scalar::random(rng))
    }

    fn invert(&self) -> Result<Self, ScalarError> {
        let scalar = self
            .0
            .invert()
            .into_option()
            .ok_or(ScalarError::NonInvertible)?;

        Ok(Self(scalar))
    }

    fn from_u64(val: u64) -> Self {
        Self(blstrs::Scalar::from(val))
    }

    fn to_bytes_be(&self) -> Vec<u8> {
        self.0.to_bytes_be().to_vec()
    }

    fn from_bytes_be(bytes: &[u8]) -> Result<Self, ScalarError> {
        let bytes: [u8; bls12381::SCALAR_SIZE] =
            bytes
                .try_into()
                .map_err(|_| ScalarError::InvalidInputLength {
                    expected: bls12381::SCALAR_SIZE,
                    received: bytes.len(),
                })?;

        let scalar = blstrs::Scalar::from_bytes_be(&bytes)
            .into_option()
            .ok_or(ScalarError::NonCanonicalInput)?;

        Ok(Self(scalar))
    }

    fn from_be_bytes_mod_order(bytes: &[u8]) -> Self {
        let mut sk = blst_lib::blst_scalar::default();

        // blst reduces the input modulo r, so the result is always canonical
        unsafe {
            let _ = blst_lib::blst_scalar_from_be_bytes(&mut sk, bytes.as_ptr(), bytes.len());
        }

        match blstrs::Scalar::from_bytes_le(&sk.b).into_option() {
            Some(sk) => Self(sk),
            None => Self(blstrs::Scalar::ONE),
        }
    }
}

impl Mul<&Scalar> for Scalar {
    type Output = Scalar;

    #[inline]
    fn mul(self, rhs: &Scalar) -> Scalar {
        Self(self.0 * rhs.0)
    }
}

impl Add<&Scalar> for Scalar {
    type Output = Scalar;

    #[inline]
    fn add(self, rhs: &Scalar) -> Scalar {
        Self(self.0 + rhs.0)
    }
}

impl MulAssign<&Scalar> for Scalar {
    #[inline]
    fn mul_assign(&mut self, rhs: &Scalar) {
        self.0 *= rhs.0;
    }
}

impl AddAssign<&Scalar> for Scalar {
    #[inline]
    fn add_assign(&mut self, rhs: &Scalar) {
        self.0 += rhs.0;
    }
}

impl SubAssign<&Scalar> for Scalar {
    #[inline]
    fn sub_assign(&mut self, rhs: &Scalar) {
        self.0 -= rhs.0;
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", &hex::encode(self.0.to_bytes_be()))
    }
}
