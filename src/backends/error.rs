//! Errors of the curve backends, surfaced through the point, scalar and
//! pairing traits.

/// Decoding failures of curve points. Points received from peers go through
/// these checks before any use.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PointError {
    #[error("invalid input length: expected {expected}, received {received}")]
    InvalidInputLength { expected: usize, received: usize },
    #[error("input is not canonical")]
    NonCanonicalInput,
    #[error("point is the identity")]
    Identity,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ScalarError {
    #[error("invalid input length: expected {expected}, received {received}")]
    InvalidInputLength { expected: usize, received: usize },
    #[error("scalar is zero, not invertible")]
    NonInvertible,
    #[error("input is not canonical")]
    NonCanonicalInput,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum BlsError {
    #[error("empty message")]
    EmptyMessage,
    #[error("signature does not verify")]
    FailedVerification,
}
