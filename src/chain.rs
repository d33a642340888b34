//! Chain-facing contracts: block heights drive the phase deadlines and a
//! finished result is handed to a [`ResultSubmitter`].

use crate::dkg::result::DkgResult;
use crate::poly::Index;
use crate::traits::Scheme;

use sha3::Digest;
use sha3::Keccak256;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tokio::sync::watch;

/// Receiver of the current block height.
pub type BlockReceiver = watch::Receiver<u64>;

/// Supporting signatures over the result hash, keyed by member index.
pub type SupportSignatures = BTreeMap<Index, Vec<u8>>;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ChainError {
    #[error("block watcher closed")]
    BlockWatcherClosed,
    #[error("result already submitted by member {0}")]
    AlreadySubmitted(Index),
    #[error("submission failed: {0}")]
    Submission(String),
}

/// Channel pair of a block counter starting at `height`.
pub fn block_counter(height: u64) -> (watch::Sender<u64>, BlockReceiver) {
    watch::channel(height)
}

/// Waits until the watched height reaches `height` and returns the height
/// that was observed.
pub async fn wait_for_block(blocks: &mut BlockReceiver, height: u64) -> Result<u64, ChainError> {
    let current = blocks
        .wait_for(|current| *current >= height)
        .await
        .map_err(|_| ChainError::BlockWatcherClosed)?;

    Ok(*current)
}

/// Keccak-256 of an encoded result. Supporting signatures are made over this
/// hash so it must be identical for every member that computed the same
/// result.
pub fn result_hash(encoded: &[u8]) -> [u8; 32] {
    let mut h = Keccak256::new();
    h.update(encoded);

    h.finalize().into()
}

/// Submission of a finished result together with the signatures supporting
/// it. Confirmation tracking is left to the implementor.
pub trait ResultSubmitter<S: Scheme>: Send + Sync {
    fn submit(
        &self,
        member_index: Index,
        result: &DkgResult<S>,
        signatures: &SupportSignatures,
    ) -> Result<(), ChainError>;
}

/// A submission recorded by [`LocalSubmitter`].
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub member_index: Index,
    pub result_hash: [u8; 32],
    pub signatures: SupportSignatures,
}

/// In-process submitter keeping the first submission per result hash, the
/// way a ledger accepts one result per group.
#[derive(Default)]
pub struct LocalSubmitter {
    submissions: Mutex<Vec<Submission>>,
}

impl LocalSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl<S: Scheme> ResultSubmitter<S> for LocalSubmitter {
    fn submit(
        &self,
        member_index: Index,
        result: &DkgResult<S>,
        signatures: &SupportSignatures,
    ) -> Result<(), ChainError> {
        let result_hash = result.hash();
        let mut submissions = self
            .submissions
            .lock()
            .map_err(|e| ChainError::Submission(e.to_string()))?;

        if let Some(first) = submissions.iter().find(|s| s.result_hash == result_hash) {
            return Err(ChainError::AlreadySubmitted(first.member_index));
        }
        submissions.push(Submission {
            member_index,
            result_hash,
            signatures: signatures.clone(),
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_result_hash() {
        // Keccak-256 of the empty input, not SHA3-256
        assert_eq!(
            hex::encode(result_hash(&[])),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[tokio::test]
    async fn waits_for_height() {
        let (tx, mut rx) = block_counter(10);
        assert_eq!(wait_for_block(&mut rx, 5).await, Ok(10));

        let producer = tokio::spawn(async move {
            for h in 11..=13 {
                tx.send(h).unwrap();
                tokio::task::yield_now().await;
            }
        });
        assert_eq!(wait_for_block(&mut rx, 13).await, Ok(13));
        producer.await.unwrap();

        // sender dropped
        assert_eq!(
            wait_for_block(&mut rx, 20).await,
            Err(ChainError::BlockWatcherClosed)
        );
    }
}
