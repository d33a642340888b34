//! GJKR distributed key generation.
//!
//! Every member drives its own chain of phase structs. Each transition
//! consumes the previous phase, so the phases can only be executed in order:
//!
//! ```text
//! EphemeralKeyGeneratingMember  --generate_ephemeral_keys-->     SymmetricKeyGeneratingMember
//! SymmetricKeyGeneratingMember  --generate_symmetric_keys-->     CommittingMember
//! CommittingMember              --commit-->                      CommitmentsVerifyingMember
//! CommitmentsVerifyingMember    --verify_received_shares-->      SharesJustifyingMember
//! SharesJustifyingMember        --resolve_shares_accusations-->  QualifiedMember
//! QualifiedMember               --qualify-->                     SharingMember
//! SharingMember                 --share_points-->                PointsValidatingMember
//! PointsValidatingMember        --verify_points-->               PointsJustifyingMember
//! PointsJustifyingMember        --resolve_points_accusations-->  RevealingMember
//! RevealingMember               --reveal-->                      ReconstructingMember
//! ReconstructingMember          --reconstruct-->                 CombiningMember
//! CombiningMember               --combine-->                     FinalizingMember
//! FinalizingMember              --finalize-->                    DkgResult
//! ```
//!
//! [`protocol::Protocol`] runs this chain over a broadcast channel.

pub mod error;
pub mod evidence;
pub mod group;
pub mod justification;
pub mod ledger;
pub mod member;
pub mod message;
pub mod protocol;
pub mod publication;
pub mod reconstruction;
pub mod result;
pub mod sharing;
pub mod verification;

#[cfg(test)]
mod test;

pub use error::DkgError;
pub use group::Group;
pub use member::EphemeralKeyGeneratingMember;
pub use protocol::Protocol;
pub use result::DkgResult;

use std::fmt::Display;

/// Phases of a run, in execution order.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum Phase {
    EphemeralKeyGeneration = 1,
    SymmetricKeyGeneration = 2,
    Committing = 3,
    Verification = 4,
    SharesJustification = 5,
    Qualification = 6,
    PointsSharing = 7,
    PointsValidation = 8,
    PointsJustification = 9,
    Revealing = 10,
    Reconstruction = 11,
    Combining = 12,
    Finalizing = 13,
}

impl Phase {
    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(number: u8) -> Option<Self> {
        let phase = match number {
            1 => Phase::EphemeralKeyGeneration,
            2 => Phase::SymmetricKeyGeneration,
            3 => Phase::Committing,
            4 => Phase::Verification,
            5 => Phase::SharesJustification,
            6 => Phase::Qualification,
            7 => Phase::PointsSharing,
            8 => Phase::PointsValidation,
            9 => Phase::PointsJustification,
            10 => Phase::Revealing,
            11 => Phase::Reconstruction,
            12 => Phase::Combining,
            13 => Phase::Finalizing,
            _ => return None,
        };

        Some(phase)
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::EphemeralKeyGeneration => "ephemeral key generation",
            Phase::SymmetricKeyGeneration => "symmetric key generation",
            Phase::Committing => "committing",
            Phase::Verification => "verification",
            Phase::SharesJustification => "shares justification",
            Phase::Qualification => "qualification",
            Phase::PointsSharing => "points sharing",
            Phase::PointsValidation => "points validation",
            Phase::PointsJustification => "points justification",
            Phase::Revealing => "revealing",
            Phase::Reconstruction => "reconstruction",
            Phase::Combining => "combining",
            Phase::Finalizing => "finalizing",
        };
        write!(f, "{} ({name})", self.number())
    }
}

#[cfg(test)]
mod tests {
    use super::Phase;

    #[test]
    fn phases_are_ordered() {
        let phases: Vec<Phase> = (1..=13).filter_map(Phase::from_number).collect();
        assert_eq!(phases.len(), 13);
        assert!(phases.windows(2).all(|w| w[0] < w[1]));
        assert!(phases.iter().all(|p| Phase::from_number(p.number()) == Some(*p)));
        assert_eq!(Phase::from_number(0), None);
        assert_eq!(Phase::from_number(14), None);
    }
}
