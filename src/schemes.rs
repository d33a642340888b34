//! Supported schemes. A scheme fixes the group holding the keys (and thus the
//! commitments, ephemeral keys and operator keys) and the group holding the
//! threshold signatures.

use crate::curves::bls12381;
use crate::traits::Group;
use crate::traits::Scheme;

macro_rules! impl_scheme {
  ( name = $scheme_name:ident,
    // ID is a str scheme representation, it also seeds the Pedersen generator
    id = $scheme_id:expr,
    curve = $curve:ident,
    // The group used to create the keys
    key_group = $key:ident,
    // The group used to create the signatures; it must always be different from the key_group,
    // this is enforced at compile time by the [`Scheme`] trait structure
    sig_group = $sig:ident ) => {

        #[derive(Debug, Default, PartialEq, Clone)]
        pub struct $scheme_name;

        impl Scheme for $scheme_name {
            const ID: &'static str = $scheme_id;
            type Key = $curve::$key;
            type Sig = $curve::$sig;
            type Scalar = <$curve::G1 as Group>::Scalar;
        }
    };
}

impl_scheme!(
    name = DefaultScheme,
    id = "gjkr-bls12381-keys-on-g1",
    curve = bls12381,
    key_group = G1,
    sig_group = G2
);

impl_scheme!(
    name = SigsOnG1Scheme,
    id = "gjkr-bls12381-sigs-on-g1",
    curve = bls12381,
    key_group = G2,
    sig_group = G1
);
