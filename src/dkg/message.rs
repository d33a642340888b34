//! Messages exchanged during a run and their wire encoding.

use super::Phase;
use crate::net::codec::read_bytes;
use crate::net::codec::read_fixed;
use crate::net::codec::read_len;
use crate::net::codec::read_point;
use crate::net::codec::read_scalar;
use crate::net::codec::read_u32;
use crate::net::codec::write_bytes;
use crate::net::codec::write_point;
use crate::net::codec::write_scalar;
use crate::net::codec::CodecError;
use crate::net::codec::Read;
use crate::net::codec::Write;
use crate::net::NetError;
use crate::net::Registry;
use crate::pedersen::SharePair;
use crate::points::KeyPoint;
use crate::poly::Index;
use crate::traits::Group;
use crate::traits::Scheme;

use bytes::Buf;
use bytes::BufMut;
use crev_common::Blake2b256;
use sha2::Digest;
use std::collections::BTreeMap;
use std::fmt::Display;

/// Packet is implemented by every message of the protocol. This allows the
/// runner and the evidence log to handle a message without knowing its type.
pub trait Packet: Write + Read + Display {
    /// Type tag of the envelopes carrying this message.
    const TAG: &'static str;
    /// Phase in which the message is collected.
    const PHASE: Phase;

    fn sender_index(&self) -> Index;

    /// Blake2b-256 digest of the encoded message.
    fn digest(&self) -> [u8; 32] {
        digest(&self.encode())
    }
}

pub fn digest(raw: &[u8]) -> [u8; 32] {
    let mut h = Blake2b256::new();
    h.update(raw);
    h.finalize().into()
}

fn point_size<S: Scheme>() -> usize {
    <S::Key as Group>::POINT_SIZE
}

fn write_map<B: BufMut, V>(buf: &mut B, map: &BTreeMap<Index, V>, write: impl Fn(&mut B, &V)) {
    buf.put_u32(map.len() as u32);
    for (index, value) in map {
        buf.put_u32(*index);
        write(buf, value);
    }
}

/// Reads a map written by [`write_map`]. Keys must be strictly increasing so
/// that every map has exactly one encoding.
fn read_map<B: Buf, V>(
    buf: &mut B,
    context: &'static str,
    read: impl Fn(&mut B) -> Result<V, CodecError>,
) -> Result<BTreeMap<Index, V>, CodecError> {
    let len = read_len(buf)?;
    let mut map = BTreeMap::new();
    let mut last = None;
    for _ in 0..len {
        let index = read_u32(buf)?;
        if last.is_some_and(|last| index <= last) {
            return Err(CodecError::InvalidData(context, format!("unordered index {index}")));
        }
        last = Some(index);
        let _ = map.insert(index, read(buf)?);
    }

    Ok(map)
}

fn read_points<S: Scheme, B: Buf>(buf: &mut B) -> Result<Vec<KeyPoint<S>>, CodecError> {
    let len = read_len(buf)?;
    (0..len)
        .map(|_| read_point::<KeyPoint<S>>(buf, point_size::<S>()))
        .collect()
}

fn write_points<S: Scheme>(buf: &mut impl BufMut, points: &[KeyPoint<S>]) {
    buf.put_u32(points.len() as u32);
    for p in points {
        write_point(buf, p);
    }
}

/// Phase 1: one ephemeral public key per peer, keyed by the peer index.
#[derive(Debug, Clone, PartialEq)]
pub struct EphemeralPublicKeyMessage<S: Scheme> {
    pub sender_index: Index,
    pub keys: BTreeMap<Index, KeyPoint<S>>,
}

impl<S: Scheme> Write for EphemeralPublicKeyMessage<S> {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.sender_index);
        write_map(buf, &self.keys, |buf, key| write_point(buf, key));
    }
}

impl<S: Scheme> Read for EphemeralPublicKeyMessage<S> {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        let sender_index = read_u32(buf)?;
        let keys = read_map(buf, "EphemeralPublicKeyMessage::keys", |buf| {
            read_point(buf, point_size::<S>())
        })?;

        Ok(Self { sender_index, keys })
    }
}

/// Phase 3: Pedersen commitments of the sender and the share pairs for every
/// peer, each encrypted under the symmetric key of the pair.
#[derive(Debug, Clone, PartialEq)]
pub struct DealMessage<S: Scheme> {
    pub sender_index: Index,
    pub commitments: Vec<KeyPoint<S>>,
    pub shares: BTreeMap<Index, Vec<u8>>,
}

impl<S: Scheme> Write for DealMessage<S> {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.sender_index);
        write_points::<S>(buf, &self.commitments);
        write_map(buf, &self.shares, |buf, share| write_bytes(buf, share));
    }
}

impl<S: Scheme> Read for DealMessage<S> {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        let sender_index = read_u32(buf)?;
        let commitments = read_points::<S, _>(buf)?;
        let shares = read_map(buf, "DealMessage::shares", |buf| read_bytes(buf))?;

        Ok(Self {
            sender_index,
            commitments,
            shares,
        })
    }
}

/// Phases 4 and 8: accused members, each with the ephemeral private key the
/// accuser generated for it so that everybody can decrypt the disputed share.
#[derive(Debug, Clone, PartialEq)]
pub struct Accusations<S: Scheme> {
    pub sender_index: Index,
    pub accused: BTreeMap<Index, S::Scalar>,
}

impl<S: Scheme> Accusations<S> {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.sender_index);
        write_map(buf, &self.accused, |buf, key| write_scalar(buf, key));
    }

    fn read(buf: &mut impl Buf, context: &'static str) -> Result<Self, CodecError> {
        let sender_index = read_u32(buf)?;
        let accused = read_map(buf, context, |buf| read_scalar(buf))?;

        Ok(Self {
            sender_index,
            accused,
        })
    }
}

/// Phase 4: accusations against members whose share failed the Pedersen check.
#[derive(Debug, Clone, PartialEq)]
pub struct SecretSharesAccusationsMessage<S: Scheme>(pub Accusations<S>);

/// Phase 8: accusations against members whose share failed the check against
/// their public points.
#[derive(Debug, Clone, PartialEq)]
pub struct PointsAccusationsMessage<S: Scheme>(pub Accusations<S>);

impl<S: Scheme> Write for SecretSharesAccusationsMessage<S> {
    fn write(&self, buf: &mut impl BufMut) {
        self.0.write(buf)
    }
}

impl<S: Scheme> Read for SecretSharesAccusationsMessage<S> {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        Accusations::read(buf, "SecretSharesAccusationsMessage::accused").map(Self)
    }
}

impl<S: Scheme> Write for PointsAccusationsMessage<S> {
    fn write(&self, buf: &mut impl BufMut) {
        self.0.write(buf)
    }
}

impl<S: Scheme> Read for PointsAccusationsMessage<S> {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        Accusations::read(buf, "PointsAccusationsMessage::accused").map(Self)
    }
}

/// Phase 7: public coefficients `A_k = g * a_k` of a qualified member.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicKeySharePointsMessage<S: Scheme> {
    pub sender_index: Index,
    pub points: Vec<KeyPoint<S>>,
}

impl<S: Scheme> Write for PublicKeySharePointsMessage<S> {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.sender_index);
        write_points::<S>(buf, &self.points);
    }
}

impl<S: Scheme> Read for PublicKeySharePointsMessage<S> {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        let sender_index = read_u32(buf)?;
        let points = read_points::<S, _>(buf)?;

        Ok(Self {
            sender_index,
            points,
        })
    }
}

/// Phase 10: share pairs received from excluded qualified members, keyed by
/// the member they were received from.
#[derive(Debug, Clone, PartialEq)]
pub struct RevealedSharesMessage<S: Scheme> {
    pub sender_index: Index,
    pub shares: BTreeMap<Index, SharePair<S>>,
}

impl<S: Scheme> Write for RevealedSharesMessage<S> {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.sender_index);
        write_map(buf, &self.shares, |buf, pair| {
            write_scalar(buf, &pair.s);
            write_scalar(buf, &pair.t);
        });
    }
}

impl<S: Scheme> Read for RevealedSharesMessage<S> {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        let sender_index = read_u32(buf)?;
        let shares = read_map(buf, "RevealedSharesMessage::shares", |buf| {
            Ok(SharePair {
                s: read_scalar(buf)?,
                t: read_scalar(buf)?,
            })
        })?;

        Ok(Self {
            sender_index,
            shares,
        })
    }
}

/// Operator signature of a member over the hash of its result.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSignatureMessage {
    pub sender_index: Index,
    pub result_hash: [u8; 32],
    pub signature: Vec<u8>,
}

impl Write for ResultSignatureMessage {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.sender_index);
        buf.put_slice(&self.result_hash);
        write_bytes(buf, &self.signature);
    }
}

impl Read for ResultSignatureMessage {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        let sender_index = read_u32(buf)?;
        let mut result_hash = [0u8; 32];
        result_hash.copy_from_slice(&read_fixed(buf, 32)?);
        let signature = read_bytes(buf)?;

        Ok(Self {
            sender_index,
            result_hash,
            signature,
        })
    }
}

macro_rules! impl_packet {
    ($msg:ident, $tag:expr, $phase:expr, |$m:ident| $sender:expr) => {
        impl<S: Scheme> Packet for $msg<S> {
            const TAG: &'static str = $tag;
            const PHASE: Phase = $phase;

            fn sender_index(&self) -> Index {
                let $m = self;
                $sender
            }
        }

        impl<S: Scheme> Display for $msg<S> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{} from {}", stringify!($msg), self.sender_index())
            }
        }
    };
}

impl_packet!(
    EphemeralPublicKeyMessage,
    "gjkr/ephemeral_public_key",
    Phase::EphemeralKeyGeneration,
    |m| m.sender_index
);
impl_packet!(DealMessage, "gjkr/deal", Phase::Committing, |m| m.sender_index);
impl_packet!(
    SecretSharesAccusationsMessage,
    "gjkr/secret_shares_accusations",
    Phase::Verification,
    |m| m.0.sender_index
);
impl_packet!(
    PublicKeySharePointsMessage,
    "gjkr/public_key_share_points",
    Phase::PointsSharing,
    |m| m.sender_index
);
impl_packet!(
    PointsAccusationsMessage,
    "gjkr/points_accusations",
    Phase::PointsValidation,
    |m| m.0.sender_index
);
impl_packet!(
    RevealedSharesMessage,
    "gjkr/revealed_shares",
    Phase::Revealing,
    |m| m.sender_index
);

impl Packet for ResultSignatureMessage {
    const TAG: &'static str = "gjkr/result_signature";
    const PHASE: Phase = Phase::Finalizing;

    fn sender_index(&self) -> Index {
        self.sender_index
    }
}

impl Display for ResultSignatureMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ResultSignatureMessage from {}", self.sender_index)
    }
}

/// Any message of the protocol, as decoded by the runner.
#[derive(Debug, Clone, PartialEq)]
pub enum DkgMessage<S: Scheme> {
    EphemeralPublicKey(EphemeralPublicKeyMessage<S>),
    Deal(DealMessage<S>),
    SecretSharesAccusations(SecretSharesAccusationsMessage<S>),
    PublicKeySharePoints(PublicKeySharePointsMessage<S>),
    PointsAccusations(PointsAccusationsMessage<S>),
    RevealedShares(RevealedSharesMessage<S>),
    ResultSignature(ResultSignatureMessage),
}

macro_rules! dispatch {
    ($self:ident, |$m:ident| $body:expr) => {
        match $self {
            DkgMessage::EphemeralPublicKey($m) => $body,
            DkgMessage::Deal($m) => $body,
            DkgMessage::SecretSharesAccusations($m) => $body,
            DkgMessage::PublicKeySharePoints($m) => $body,
            DkgMessage::PointsAccusations($m) => $body,
            DkgMessage::RevealedShares($m) => $body,
            DkgMessage::ResultSignature($m) => $body,
        }
    };
}

fn phase_of<P: Packet>(_: &P) -> Phase {
    P::PHASE
}

fn tag_of<P: Packet>(_: &P) -> &'static str {
    P::TAG
}

impl<S: Scheme> DkgMessage<S> {
    pub fn tag(&self) -> &'static str {
        dispatch!(self, |m| tag_of(m))
    }

    pub fn phase(&self) -> Phase {
        dispatch!(self, |m| phase_of(m))
    }

    pub fn sender_index(&self) -> Index {
        dispatch!(self, |m| m.sender_index())
    }

    pub fn payload(&self) -> Vec<u8> {
        dispatch!(self, |m| m.encode())
    }

    /// Decoders of every message type, keyed by type tag.
    pub fn registry() -> Result<Registry<Self>, NetError> {
        let mut registry = Registry::new();
        registry.register(EphemeralPublicKeyMessage::<S>::TAG, |raw: &[u8]| {
            EphemeralPublicKeyMessage::decode(raw).map(Self::EphemeralPublicKey)
        })?;
        registry.register(DealMessage::<S>::TAG, |raw: &[u8]| {
            DealMessage::decode(raw).map(Self::Deal)
        })?;
        registry.register(SecretSharesAccusationsMessage::<S>::TAG, |raw: &[u8]| {
            SecretSharesAccusationsMessage::decode(raw).map(Self::SecretSharesAccusations)
        })?;
        registry.register(PublicKeySharePointsMessage::<S>::TAG, |raw: &[u8]| {
            PublicKeySharePointsMessage::decode(raw).map(Self::PublicKeySharePoints)
        })?;
        registry.register(PointsAccusationsMessage::<S>::TAG, |raw: &[u8]| {
            PointsAccusationsMessage::decode(raw).map(Self::PointsAccusations)
        })?;
        registry.register(RevealedSharesMessage::<S>::TAG, |raw: &[u8]| {
            RevealedSharesMessage::decode(raw).map(Self::RevealedShares)
        })?;
        registry.register(ResultSignatureMessage::TAG, |raw: &[u8]| {
            ResultSignatureMessage::decode(raw).map(Self::ResultSignature)
        })?;

        Ok(registry)
    }
}

impl<S: Scheme> Display for DkgMessage<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        dispatch!(self, |m| Display::fmt(m, f))
    }
}

impl<S: Scheme> From<EphemeralPublicKeyMessage<S>> for DkgMessage<S> {
    fn from(m: EphemeralPublicKeyMessage<S>) -> Self {
        Self::EphemeralPublicKey(m)
    }
}

impl<S: Scheme> From<DealMessage<S>> for DkgMessage<S> {
    fn from(m: DealMessage<S>) -> Self {
        Self::Deal(m)
    }
}

impl<S: Scheme> From<SecretSharesAccusationsMessage<S>> for DkgMessage<S> {
    fn from(m: SecretSharesAccusationsMessage<S>) -> Self {
        Self::SecretSharesAccusations(m)
    }
}

impl<S: Scheme> From<PublicKeySharePointsMessage<S>> for DkgMessage<S> {
    fn from(m: PublicKeySharePointsMessage<S>) -> Self {
        Self::PublicKeySharePoints(m)
    }
}

impl<S: Scheme> From<PointsAccusationsMessage<S>> for DkgMessage<S> {
    fn from(m: PointsAccusationsMessage<S>) -> Self {
        Self::PointsAccusations(m)
    }
}

impl<S: Scheme> From<RevealedSharesMessage<S>> for DkgMessage<S> {
    fn from(m: RevealedSharesMessage<S>) -> Self {
        Self::RevealedShares(m)
    }
}

impl<S: Scheme> From<ResultSignatureMessage> for DkgMessage<S> {
    fn from(m: ResultSignatureMessage) -> Self {
        Self::ResultSignature(m)
    }
}

/// Extraction of a typed message out of [`DkgMessage`].
pub trait FromDkgMessage<S: Scheme>: Packet + Sized {
    fn from_dkg_message(m: DkgMessage<S>) -> Option<Self>;
}

macro_rules! impl_from_dkg_message {
    ($msg:ty, $variant:ident) => {
        impl<S: Scheme> FromDkgMessage<S> for $msg {
            fn from_dkg_message(m: DkgMessage<S>) -> Option<Self> {
                match m {
                    DkgMessage::$variant(m) => Some(m),
                    _ => None,
                }
            }
        }
    };
}

impl_from_dkg_message!(EphemeralPublicKeyMessage<S>, EphemeralPublicKey);
impl_from_dkg_message!(DealMessage<S>, Deal);
impl_from_dkg_message!(SecretSharesAccusationsMessage<S>, SecretSharesAccusations);
impl_from_dkg_message!(PublicKeySharePointsMessage<S>, PublicKeySharePoints);
impl_from_dkg_message!(PointsAccusationsMessage<S>, PointsAccusations);
impl_from_dkg_message!(RevealedSharesMessage<S>, RevealedShares);
impl_from_dkg_message!(ResultSignatureMessage, ResultSignature);
