use super::Phase;
use crate::chain::ChainError;
use crate::config::ConfigError;
use crate::ephemeral::EphemeralError;
use crate::net::NetError;
use crate::poly::Index;
use crate::poly::PolyError;

/// Errors surfacing from a run. Misbehaving peers never produce an error,
/// their faults end up in the qualification ledger.
#[allow(non_camel_case_types)]
#[derive(thiserror::Error, Debug)]
pub enum DkgError {
    #[error("can't run with an empty group")]
    GroupEmpty,
    #[error("dishonest threshold {threshold} is too high for a group of {size}")]
    ThresholdTooHigh { threshold: usize, size: usize },
    #[error("found duplicated operator key, index: {0}")]
    DuplicateOperator(Index),
    #[error("index {0} is not a group member")]
    NotAMember(Index),
    #[error("operator key does not belong to member {0}")]
    OperatorKeyMismatch(Index),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("net: {0}")]
    Net(#[from] NetError),
    #[error("chain: {0}")]
    Chain(#[from] ChainError),
    #[error("failed to encrypt share for member {index}: {source}")]
    EncryptShare { index: Index, source: EphemeralError },
    #[error("run cancelled in phase {0}")]
    Cancelled(Phase),
    #[error("inbound envelopes channel closed in phase {0}")]
    InboundClosed(Phase),

    #[error("BUG: qualified set is already frozen")]
    BUG_QualAlreadyFrozen,
    #[error("BUG: qualified set is not frozen yet")]
    BUG_QualNotFrozen,
    #[error("BUG: share not found from qualified member {0}")]
    BUG_ShareNotFound(Index),
    #[error("BUG: public points not found from operating member {0}")]
    BUG_PointsNotFound(Index),
    #[error("BUG: ephemeral key pair not found for member {0}")]
    BUG_EphemeralKeyNotFound(Index),
    #[error("BUG: interpolation failed: {0}")]
    BUG_Interpolation(PolyError),
}
