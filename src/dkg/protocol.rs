use super::member::EphemeralKeyGeneratingMember;
use super::member::Member;
use super::message::DkgMessage;
use super::message::FromDkgMessage;
use super::message::Packet;
use super::message::ResultSignatureMessage;
use super::publication::sign_result;
use super::publication::support_threshold;
use super::publication::SupportCollector;
use super::DkgError;
use super::DkgResult;
use super::Group;
use super::Phase;
use crate::chain::wait_for_block;
use crate::chain::BlockReceiver;
use crate::chain::ChainError;
use crate::chain::ResultSubmitter;
use crate::config::Config;
use crate::config::DkgParams;
use crate::net::Channel;
use crate::net::Envelope;
use crate::net::EnvelopeReceiver;
use crate::net::EnvelopeSender;
use crate::net::Registry;
use crate::poly::Index;
use crate::traits::Affine;
use crate::traits::Scheme;

use rand_chacha::ChaChaRng;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::*;

/// Board serves as a transport between the phases and the application
/// layer. Messages of later phases wait in `pending`, at most one per phase
/// and sender, until their phase is collected.
struct Board<S: Scheme> {
    channel: Channel,
    registry: Registry<DkgMessage<S>>,
    group: Arc<Group<S>>,
    /// Serialized operator key of this member.
    sender: Vec<u8>,
    pending: BTreeMap<Phase, BTreeMap<Index, DkgMessage<S>>>,
    blocks: BlockReceiver,
    cancel: watch::Receiver<bool>,
    cancel_open: bool,
    log: tracing::Span,
}

impl<S: Scheme> Board<S> {
    async fn broadcast<P: Packet>(&mut self, message: &P) -> Result<(), DkgError> {
        self.channel
            .broadcast(&self.sender, P::TAG, message.encode())
            .await?;

        Ok(())
    }

    /// Collects messages of type `M` until every expected sender delivered
    /// or `window` blocks passed. Only the first message of a sender counts,
    /// in the current phase and in the read-ahead buffer alike.
    async fn collect<M: FromDkgMessage<S>>(
        &mut self,
        expected: &BTreeSet<Index>,
        window: u64,
    ) -> Result<Vec<M>, DkgError> {
        let phase = M::PHASE;
        if *self.cancel.borrow() {
            return Err(DkgError::Cancelled(phase));
        }

        let mut messages: BTreeMap<Index, M> = self
            .pending
            .remove(&phase)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(sender, message)| Some((sender, M::from_dkg_message(message)?)))
            .collect();

        let deadline = *self.blocks.borrow() + window;
        while !expected.iter().all(|i| messages.contains_key(i)) {
            tokio::select! {
                changed = self.cancel.changed(), if self.cancel_open => {
                    match changed {
                        Ok(()) if *self.cancel.borrow() => return Err(DkgError::Cancelled(phase)),
                        Ok(()) => {}
                        // nobody can cancel anymore
                        Err(_) => self.cancel_open = false,
                    }
                }
                height = wait_for_block(&mut self.blocks, deadline) => {
                    let height = height?;
                    let missing: Vec<_> = expected.iter().filter(|i| !messages.contains_key(i)).collect();
                    warn!(parent: &self.log, "phase {phase}: deadline reached at block {height}, missing {missing:?}");
                    break;
                }
                envelope = self.channel.recv() => {
                    let Some(envelope) = envelope else {
                        return Err(DkgError::InboundClosed(phase));
                    };
                    let Some(message) = self.open(envelope) else {
                        continue;
                    };
                    let sender = message.sender_index();
                    match message.phase().cmp(&phase) {
                        std::cmp::Ordering::Equal => {
                            if messages.contains_key(&sender) {
                                debug!(parent: &self.log, "phase {phase}: dropping repeated {message}");
                            } else if let Some(message) = M::from_dkg_message(message) {
                                let _ = messages.insert(sender, message);
                            }
                        }
                        std::cmp::Ordering::Greater => {
                            let buffered = self.pending.entry(message.phase()).or_default();
                            if buffered.contains_key(&sender) {
                                debug!(parent: &self.log, "phase {phase}: dropping repeated early {message}");
                            } else {
                                let _ = buffered.insert(sender, message);
                            }
                        }
                        std::cmp::Ordering::Less => {
                            debug!(parent: &self.log, "phase {phase}: dropping late {message}");
                        }
                    }
                }
            }
        }

        Ok(messages.into_values().collect())
    }

    /// Decodes an envelope whose sender is the operator of the member the
    /// message claims to come from.
    fn open(&self, envelope: Envelope) -> Option<DkgMessage<S>> {
        if let Err(err) = envelope.verify::<S>() {
            error!(parent: &self.log, "ignoring {envelope}, reason: {err}");
            return None;
        }
        let message = match self.registry.decode(&envelope) {
            Ok(message) => message,
            Err(err) => {
                error!(parent: &self.log, "ignoring {envelope}, reason: {err}");
                return None;
            }
        };
        if self.group.index_of(&envelope.sender) != Some(message.sender_index()) {
            error!(parent: &self.log, "ignoring {message}, sent by another operator");
            return None;
        }

        Some(message)
    }
}

/// Protocol is an asynchronous runner of one member through all phases.
pub struct Protocol<S: Scheme> {
    member: EphemeralKeyGeneratingMember<S>,
    operator_private: S::Scalar,
    config: Config,
    board: Board<S>,
    submitter: Option<Arc<dyn ResultSubmitter<S>>>,
    /// Randomness of the result signature, a stream apart from the member's.
    rng: ChaChaRng,
}

impl<S: Scheme> Protocol<S> {
    /// Initializes a run of member `member_index`, operated by the owner of
    /// `operator_private`.
    ///
    /// Returns a triplet:
    /// - Protocol instance to run (see [`Self::run`]).
    /// - `EnvelopeReceiver` for receiving envelopes from the protocol (protocol → external).
    /// - `EnvelopeSender` for sending envelopes to the protocol (external → protocol).
    #[allow(clippy::too_many_arguments)]
    pub fn new_dkg(
        member_index: Index,
        group: Arc<Group<S>>,
        operator_private: S::Scalar,
        params: &DkgParams,
        config: Config,
        blocks: BlockReceiver,
        cancel: watch::Receiver<bool>,
    ) -> Result<(Self, EnvelopeReceiver, EnvelopeSender), DkgError> {
        config.validate_for_group(group.size())?;
        let sender = S::sk_to_pk(&operator_private);
        if group.operator_key(member_index) != Some(&sender) {
            return Err(DkgError::OperatorKeyMismatch(member_index));
        }
        let member = EphemeralKeyGeneratingMember::new(member_index, group.clone(), params)?;

        // Channel for envelopes input
        let (tx_in, rx_in) = mpsc::channel::<Envelope>(config.channel_capacity);
        // Channel for envelopes output
        let (tx_out, rx_out) = mpsc::channel::<Envelope>(config.channel_capacity);
        let log = member.core().log().clone();
        let mut channel = Channel::new(tx_out, rx_in, log.clone());
        channel.set_filter(group.membership_filter())?;

        let board = Board {
            channel,
            registry: DkgMessage::registry()?,
            group,
            sender: sender.serialize(),
            pending: BTreeMap::new(),
            blocks,
            cancel,
            cancel_open: true,
            log,
        };
        let mut rng = params.rng();
        rng.set_stream(1);
        let protocol = Self {
            member,
            operator_private,
            config,
            board,
            submitter: None,
            rng,
        };

        Ok((protocol, rx_out, tx_in))
    }

    /// Publishes a successful result through `submitter` once enough members
    /// support it.
    pub fn with_submitter(mut self, submitter: Arc<dyn ResultSubmitter<S>>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    /// Drives the member through every phase. Returns the result, which may
    /// be unsuccessful, or an error if the run was cancelled or its channels
    /// closed.
    pub async fn run(self) -> Result<DkgResult<S>, DkgError> {
        let Self {
            member,
            operator_private,
            config,
            mut board,
            submitter,
            mut rng,
        } = self;
        let window = config.phase_duration_blocks;
        info!(parent: &board.log, "starting run in a group of {}", board.group.size());

        let (member, message) = member.generate_ephemeral_keys();
        let messages = board.exchange(message, &member, window).await?;
        let member = member.generate_symmetric_keys(&messages);

        let (member, message) = member.commit()?;
        let messages = board.exchange(message, &member, window).await?;
        let (member, message) = member.verify_received_shares(&messages)?;

        let messages = board.exchange(message, &member, window).await?;
        let member = member.resolve_shares_accusations(&messages).qualify()?;

        let (member, message) = member.share_points();
        let messages = board.exchange(message, &member, window).await?;
        let (member, message) = member.verify_points(&messages)?;

        let messages = board.exchange(message, &member, window).await?;
        let (member, message) = member.resolve_points_accusations(&messages).reveal()?;

        let messages = board.exchange(message, &member, window).await?;
        let result = member.reconstruct(&messages)?.combine()?.finalize();

        if let Some(submitter) = submitter.filter(|_| result.success) {
            let own = sign_result(&operator_private, &result, &mut rng);
            let threshold = support_threshold(&config, &board.group);
            board
                .publish(submitter.as_ref(), &result, own, threshold, config.result_publication_blocks)
                .await?;
        }

        Ok(result)
    }
}

impl<S: Scheme> Board<S> {
    /// Broadcasts the own message of a phase and collects the ones of the
    /// peers `member` still expects. The own message comes first.
    async fn exchange<P: FromDkgMessage<S>, M: Member<S>>(
        &mut self,
        own: P,
        member: &M,
        window: u64,
    ) -> Result<Vec<P>, DkgError> {
        self.broadcast(&own).await?;
        let expected = member.core().expected_senders();
        let mut messages = self.collect(&expected, window).await?;
        messages.insert(0, own);

        Ok(messages)
    }

    /// Collects supporting signatures of the members that completed the run
    /// and submits the result once `threshold` of them, own included, agree.
    async fn publish(
        &mut self,
        submitter: &dyn ResultSubmitter<S>,
        result: &DkgResult<S>,
        own: ResultSignatureMessage,
        threshold: usize,
        window: u64,
    ) -> Result<(), DkgError> {
        self.broadcast(&own).await?;
        let expected: BTreeSet<Index> = self
            .group
            .member_indices()
            .filter(|i| *i != result.member_index)
            .filter(|i| {
                let position = *i as usize - 1;
                let flagged = |bitmap: &[bool]| bitmap.get(position).copied().unwrap_or(true);
                !flagged(&result.disqualified) && !flagged(&result.inactive)
            })
            .collect();

        let mut collector = SupportCollector::new(self.group.clone(), &own, self.log.clone());
        for message in self.collect::<ResultSignatureMessage>(&expected, window).await? {
            let _ = collector.add(&message);
        }
        if collector.len() < threshold {
            warn!(parent: &self.log, "result supported by {} members, {threshold} needed", collector.len());
            return Ok(());
        }

        match submitter.submit(result.member_index, result, collector.signatures()) {
            Ok(()) => info!(parent: &self.log, "submitted result {}", hex::encode(result.hash())),
            Err(ChainError::AlreadySubmitted(by)) => {
                info!(parent: &self.log, "result already submitted by member {by}")
            }
            Err(err) => error!(parent: &self.log, "result submission failed: {err}"),
        }

        Ok(())
    }
}
