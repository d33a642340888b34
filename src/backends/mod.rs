pub mod error;

#[cfg(feature = "bls12381_blstrs")]
mod bls12381_blstrs {
    mod pairing;
    mod point;
    mod scalar;

    use crate::curves::bls12381;
    super::impl_groups!(bls12381);
}

macro_rules! impl_groups {
    ($curve:ident) => {
        use crate::traits::Group;

        impl Group for $curve::G1 {
            const DST: &'static [u8] = $curve::DST_G1;
            const PEDERSEN_DST: &'static [u8] = $curve::PEDERSEN_DST_G1;
            const POINT_SIZE: usize = $curve::POINT_SIZE_G1;

            type Affine = point::G1Affine;
            type Projective = point::G1Projective;
            type Scalar = scalar::Scalar;
        }

        impl Group for $curve::G2 {
            const DST: &'static [u8] = $curve::DST_G2;
            const PEDERSEN_DST: &'static [u8] = $curve::PEDERSEN_DST_G2;
            const POINT_SIZE: usize = $curve::POINT_SIZE_G2;

            type Affine = point::G2Affine;
            type Projective = point::G2Projective;
            type Scalar = scalar::Scalar;
        }
    };
}

#[allow(unused_imports)]
pub(in crate::backends) use impl_groups;
