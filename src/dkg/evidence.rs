use super::message::digest;
use super::message::Packet;
use super::Phase;
use crate::poly::Index;

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use tracing::warn;

/// Outcome of [`EvidenceLog::put`].
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Logged {
    New,
    /// Same payload received again.
    Duplicate,
    /// A different payload for an already logged sender and phase. The first
    /// payload stays.
    Equivocation,
}

/// Append-only record of every message a member received, one entry per
/// phase and sender. Accusations are resolved against this log only.
pub struct EvidenceLog {
    entries: BTreeMap<(Phase, Index), Vec<u8>>,
    log: tracing::Span,
}

impl EvidenceLog {
    pub fn new(log: tracing::Span) -> Self {
        Self {
            entries: BTreeMap::new(),
            log,
        }
    }

    /// Logs a raw payload, the first payload per phase and sender wins.
    pub fn put(&mut self, phase: Phase, sender: Index, payload: Vec<u8>) -> Logged {
        if let Some(first) = self.entries.get(&(phase, sender)) {
            if *first == payload {
                return Logged::Duplicate;
            }
            warn!(parent: &self.log, "equivocation of member {sender} in phase {phase}: logged {}, ignoring {}",
                hex::encode(digest(first)), hex::encode(digest(&payload)));
            return Logged::Equivocation;
        }
        let _ = self.entries.insert((phase, sender), payload);

        Logged::New
    }

    /// Logs a message under its own phase and sender.
    pub fn put_message<P: Packet>(&mut self, message: &P) -> Logged {
        self.put(P::PHASE, message.sender_index(), message.encode())
    }

    pub fn get(&self, phase: Phase, sender: Index) -> Option<&[u8]> {
        self.entries.get(&(phase, sender)).map(|p| p.as_slice())
    }

    /// Decodes the message logged for the sender in the phase of `P`.
    pub fn message<P: Packet>(&self, sender: Index) -> Option<P> {
        let raw = self.get(P::PHASE, sender)?;
        match P::decode(raw) {
            Ok(message) => Some(message),
            Err(err) => {
                warn!(parent: &self.log, "undecodable evidence of member {sender} in phase {}: {err}", P::PHASE);
                None
            }
        }
    }

    pub fn senders(&self, phase: Phase) -> BTreeSet<Index> {
        self.entries
            .keys()
            .filter(|(p, _)| *p == phase)
            .map(|(_, sender)| *sender)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
