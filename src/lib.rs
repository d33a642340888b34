//! Threshold key generation after Gennaro, Jarecki, Krawczyk and Rabin.
//!
//! A group of `n` members, identified by their operator keys, jointly
//! generates a key pair whose private key is never known to anybody. Every
//! member ends up with a share of it, any `t + 1` of which produce threshold
//! BLS signatures under the group public key.
//!
//! The engine itself lives in [`dkg`]; [`dkg::Protocol`] runs it over a
//! broadcast channel with block-height deadlines.

mod backends;
pub mod chain;
pub mod config;
pub mod curves;
pub mod dkg;
pub mod ephemeral;
pub mod net;
pub mod pedersen;
pub mod poly;
pub mod registry;
pub mod schemes;
pub mod schnorr;
pub mod tbls;
pub mod traits;

pub mod points {
    use crate::traits::Group;
    use crate::traits::Scheme;

    /// Keygroup point in affine representation
    pub type KeyPoint<S> = <<S as Scheme>::Key as Group>::Affine;

    /// Siggroup point in affine representation
    pub type SigPoint<S> = <<S as Scheme>::Sig as Group>::Affine;

    /// Keygroup point in projective representation
    pub type KeyPointProjective<S> = <<S as Scheme>::Key as Group>::Projective;

    /// Siggroup point in projective representation
    pub type SigPointProjective<S> = <<S as Scheme>::Sig as Group>::Projective;
}
