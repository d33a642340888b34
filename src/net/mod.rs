//! Message envelopes and the channel contract the protocol runner consumes.
//!
//! The transport itself is external: the runner exchanges [`Envelope`]s with
//! it over a pair of tokio channels, see [`Channel`].

pub mod codec;

use crate::points::KeyPoint;
use crate::schnorr;
use crate::schnorr::SchnorrError;
use crate::traits::Affine;
use crate::traits::Scheme;
use codec::read_bytes;
use codec::read_u64;
use codec::read_u8;
use codec::write_bytes;
use codec::CodecError;
use codec::Read;
use codec::Write;

use bytes::Buf;
use bytes::BufMut;
use rand_core::RngCore;
use sha2::Digest;
use sha2::Sha256;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

const KIND_BROADCAST: u8 = 0;
const KIND_UNICAST: u8 = 1;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum NetError {
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
    #[error("no decoder registered for type tag {0}")]
    UnregisteredTag(String),
    #[error("decoder for type tag {tag} already registered")]
    DuplicateTag { tag: String },
    #[error("failed to decode {tag}: {source}")]
    Decode { tag: String, source: CodecError },
    #[error("unicast sender key: {0}")]
    SenderKey(CodecError),
    #[error("unicast signature: {0}")]
    Signature(SchnorrError),
    #[error("membership filter is already set")]
    FilterAlreadySet,
    #[error("outbound channel closed")]
    SendClosed,
}

/// How an envelope travelled: broadcast messages carry the sender's sequence
/// number, unicast messages are signed by the sender's operator key.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Broadcast { seq: u64 },
    Unicast { signature: Vec<u8> },
}

/// Wire-stable message envelope.
///
/// `u8 kind || sender || tag || payload || (u64 seq | signature)`, with the
/// variable fields length-prefixed.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub sender: Vec<u8>,
    pub tag: String,
    pub payload: Vec<u8>,
    pub delivery: Delivery,
}

impl Envelope {
    pub fn broadcast(sender: Vec<u8>, tag: &str, payload: Vec<u8>, seq: u64) -> Self {
        Self {
            sender,
            tag: tag.to_owned(),
            payload,
            delivery: Delivery::Broadcast { seq },
        }
    }

    /// Builds an envelope signed by the operator key `private`.
    pub fn unicast<S: Scheme, R: RngCore>(
        private: &S::Scalar,
        tag: &str,
        payload: Vec<u8>,
        rng: &mut R,
    ) -> Self {
        let sender = S::sk_to_pk(private).serialize();
        let digest = signing_digest(&sender, tag.as_bytes(), &payload);
        let signature = schnorr::sign::<S, R>(private, &digest, rng);

        Self {
            sender,
            tag: tag.to_owned(),
            payload,
            delivery: Delivery::Unicast { signature },
        }
    }

    /// Broadcast envelopes are authenticated by the transport, unicast ones
    /// must carry a valid signature of their sender.
    pub fn verify<S: Scheme>(&self) -> Result<(), NetError> {
        match &self.delivery {
            Delivery::Broadcast { .. } => Ok(()),
            Delivery::Unicast { signature } => {
                let key = KeyPoint::<S>::deserialize(&self.sender)
                    .map_err(|e| NetError::SenderKey(e.into()))?;
                let digest = signing_digest(&self.sender, self.tag.as_bytes(), &self.payload);

                schnorr::verify::<S>(&key, &digest, signature).map_err(NetError::Signature)
            }
        }
    }
}

fn signing_digest(sender: &[u8], tag: &[u8], payload: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    for field in [sender, tag, payload] {
        h.update((field.len() as u32).to_be_bytes());
        h.update(field);
    }

    h.finalize().into()
}

impl Write for Envelope {
    fn write(&self, buf: &mut impl BufMut) {
        let kind = match self.delivery {
            Delivery::Broadcast { .. } => KIND_BROADCAST,
            Delivery::Unicast { .. } => KIND_UNICAST,
        };
        buf.put_u8(kind);
        write_bytes(buf, &self.sender);
        write_bytes(buf, self.tag.as_bytes());
        write_bytes(buf, &self.payload);
        match &self.delivery {
            Delivery::Broadcast { seq } => buf.put_u64(*seq),
            Delivery::Unicast { signature } => write_bytes(buf, signature),
        }
    }
}

impl Read for Envelope {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        let kind = read_u8(buf)?;
        let sender = read_bytes(buf)?;
        let tag = String::from_utf8(read_bytes(buf)?)
            .map_err(|e| CodecError::InvalidData("Envelope::tag", e.to_string()))?;
        let payload = read_bytes(buf)?;
        let delivery = match kind {
            KIND_BROADCAST => Delivery::Broadcast {
                seq: read_u64(buf)?,
            },
            KIND_UNICAST => Delivery::Unicast {
                signature: read_bytes(buf)?,
            },
            other => {
                return Err(CodecError::InvalidData(
                    "Envelope::kind",
                    format!("unknown kind {other}"),
                ))
            }
        };

        Ok(Self {
            sender,
            tag,
            payload,
            delivery,
        })
    }
}

impl Display for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.delivery {
            Delivery::Broadcast { seq } => write!(f, "{}#{seq}", self.tag),
            Delivery::Unicast { .. } => write!(f, "{} (unicast)", self.tag),
        }
    }
}

type Decoder<M> = Box<dyn Fn(&[u8]) -> Result<M, CodecError> + Send + Sync>;

/// Decoders keyed by type tag. Payloads with an unregistered tag are never
/// decoded.
pub struct Registry<M> {
    decoders: HashMap<String, Decoder<M>>,
}

impl<M> Default for Registry<M> {
    fn default() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }
}

impl<M> Registry<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, tag: &str, decoder: F) -> Result<(), NetError>
    where
        F: Fn(&[u8]) -> Result<M, CodecError> + Send + Sync + 'static,
    {
        if self.decoders.contains_key(tag) {
            return Err(NetError::DuplicateTag {
                tag: tag.to_owned(),
            });
        }
        let _ = self.decoders.insert(tag.to_owned(), Box::new(decoder));

        Ok(())
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.decoders.contains_key(tag)
    }

    pub fn decode(&self, envelope: &Envelope) -> Result<M, NetError> {
        let decoder = self
            .decoders
            .get(&envelope.tag)
            .ok_or_else(|| NetError::UnregisteredTag(envelope.tag.clone()))?;

        decoder(&envelope.payload).map_err(|source| NetError::Decode {
            tag: envelope.tag.clone(),
            source,
        })
    }
}

/// Predicate over sender public key bytes.
pub type MembershipFilter = Arc<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// Sender to forward envelopes to the runner.
pub type EnvelopeSender = mpsc::Sender<Envelope>;

/// Receiver of envelopes produced by the runner.
pub type EnvelopeReceiver = mpsc::Receiver<Envelope>;

/// Runner side of the broadcast channel.
///
/// Drops envelopes rejected by the membership filter and retransmissions of
/// an already delivered `(sender, seq)` broadcast.
pub struct Channel {
    tx_out: mpsc::Sender<Envelope>,
    rx_in: mpsc::Receiver<Envelope>,
    filter: Option<MembershipFilter>,
    delivered: HashSet<(Vec<u8>, u64)>,
    seq: u64,
    log: tracing::Span,
}

impl Channel {
    pub fn new(
        tx_out: mpsc::Sender<Envelope>,
        rx_in: mpsc::Receiver<Envelope>,
        log: tracing::Span,
    ) -> Self {
        Self {
            tx_out,
            rx_in,
            filter: None,
            delivered: HashSet::new(),
            seq: 0,
            log,
        }
    }

    /// The filter can be set once, before the first envelope is received.
    pub fn set_filter(&mut self, filter: MembershipFilter) -> Result<(), NetError> {
        if self.filter.is_some() {
            return Err(NetError::FilterAlreadySet);
        }
        self.filter = Some(filter);

        Ok(())
    }

    pub async fn broadcast(&mut self, sender: &[u8], tag: &str, payload: Vec<u8>) -> Result<(), NetError> {
        self.seq += 1;
        let envelope = Envelope::broadcast(sender.to_vec(), tag, payload, self.seq);

        self.send(envelope).await
    }

    pub async fn send(&self, envelope: Envelope) -> Result<(), NetError> {
        self.tx_out
            .send(envelope)
            .await
            .map_err(|_| NetError::SendClosed)
    }

    /// Next envelope accepted by the filter, `None` once the inbound side is
    /// closed.
    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            let envelope = self.rx_in.recv().await?;
            if self.accept(&envelope) {
                return Some(envelope);
            }
        }
    }

    fn accept(&mut self, envelope: &Envelope) -> bool {
        if let Some(filter) = &self.filter {
            if !filter(&envelope.sender) {
                debug!(parent: &self.log, "dropping {envelope} from a non-member");
                return false;
            }
        }
        if let Delivery::Broadcast { seq } = envelope.delivery {
            if !self.delivered.insert((envelope.sender.clone(), seq)) {
                debug!(parent: &self.log, "dropping retransmitted {envelope}");
                return false;
            }
        }

        true
    }
}
