use rand::SeedableRng;
use rand_chacha::ChaChaRng;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("phase duration must be at least one block")]
    ZeroPhaseDuration,
    #[error("result publication window must be at least one block")]
    ZeroPublicationWindow,
    #[error("support threshold must be positive")]
    ZeroSupportThreshold,
    #[error("support threshold {threshold} exceeds group size {size}")]
    SupportThresholdTooLarge { threshold: usize, size: usize },
    #[error("channel capacity must be positive")]
    ZeroChannelCapacity,
}

/// Protocol timing and runner parameters, shared by all members of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Number of blocks a collecting phase waits for messages before the
    /// missing senders are marked inactive.
    pub phase_duration_blocks: u64,

    /// Number of blocks to collect supporting signatures for the result.
    pub result_publication_blocks: u64,

    /// Supporting signatures (own included) required before submitting.
    /// Defaults to the honest threshold of the group.
    pub support_threshold: Option<usize>,

    /// Capacity of the envelope channels of a runner.
    pub channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            phase_duration_blocks: 5,
            result_publication_blocks: 10,
            support_threshold: None,
            channel_capacity: 256,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.phase_duration_blocks == 0 {
            return Err(ConfigError::ZeroPhaseDuration);
        }
        if self.result_publication_blocks == 0 {
            return Err(ConfigError::ZeroPublicationWindow);
        }
        if self.support_threshold == Some(0) {
            return Err(ConfigError::ZeroSupportThreshold);
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::ZeroChannelCapacity);
        }

        Ok(())
    }

    /// Checks the parameters that depend on the group size.
    pub fn validate_for_group(&self, size: usize) -> Result<(), ConfigError> {
        self.validate()?;
        match self.support_threshold {
            Some(threshold) if threshold > size => {
                Err(ConfigError::SupportThresholdTooLarge { threshold, size })
            }
            _ => Ok(()),
        }
    }
}

/// Per-member parameters of a single run.
#[derive(Clone)]
pub struct DkgParams {
    /// Seed of the member's randomness. Two runs with the same seed and the
    /// same inbound messages produce the same outbound messages.
    pub seed: [u8; 32],
}

impl std::fmt::Debug for DkgParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DkgParams(..)")
    }
}

impl DkgParams {
    pub fn new(seed: [u8; 32]) -> Self {
        Self { seed }
    }

    /// Fresh parameters seeded from the operating system.
    pub fn random() -> Self {
        Self {
            seed: rand::random(),
        }
    }

    pub fn rng(&self) -> ChaChaRng {
        ChaChaRng::from_seed(self.seed)
    }
}
