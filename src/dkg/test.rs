use super::member::EphemeralKeyGeneratingMember;
use super::member::Member;
use super::message::*;
use super::*;
use crate::chain::block_counter;
use crate::chain::LocalSubmitter;
use crate::chain::ResultSubmitter;
use crate::config::Config;
use crate::config::DkgParams;
use crate::net::EnvelopeReceiver;
use crate::net::EnvelopeSender;
use crate::points::KeyPoint;
use crate::poly::Index;
use crate::schemes::DefaultScheme;
use crate::schemes::SigsOnG1Scheme;
use crate::tbls;
use crate::tbls::SigShare;
use crate::traits::ScalarField;
use crate::traits::Scheme;

use rand::SeedableRng;
use rand_chacha::ChaChaRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

type Map<T> = Option<fn(&mut Vec<T>)>;

/// Rewrites the messages of a phase before they are delivered. Every member
/// receives the same rewritten messages.
struct Hooks<S: Scheme> {
    keys: Map<EphemeralPublicKeyMessage<S>>,
    deals: Map<DealMessage<S>>,
    accusations: Map<SecretSharesAccusationsMessage<S>>,
    points: Map<PublicKeySharePointsMessage<S>>,
    points_accusations: Map<PointsAccusationsMessage<S>>,
    reveals: Map<RevealedSharesMessage<S>>,
}

impl<S: Scheme> Default for Hooks<S> {
    fn default() -> Self {
        Self {
            keys: None,
            deals: None,
            accusations: None,
            points: None,
            points_accusations: None,
            reveals: None,
        }
    }
}

fn map<T>(hook: Map<T>, messages: &mut Vec<T>) {
    if let Some(hook) = hook {
        hook(messages)
    }
}

pub(super) fn operators<S: Scheme>(n: usize) -> Vec<S::Scalar> {
    let mut rng = ChaChaRng::from_seed([42u8; 32]);
    (0..n).map(|_| S::Scalar::random(&mut rng)).collect()
}

pub(super) fn test_group<S: Scheme>(n: usize, t: usize) -> Arc<Group<S>> {
    let keys = operators::<S>(n).iter().map(|sk| S::sk_to_pk(sk)).collect();
    Arc::new(Group::new(t, keys).unwrap())
}

fn params(i: Index) -> DkgParams {
    DkgParams::new([i as u8; 32])
}

fn run_dkg<S: Scheme>(n: usize, t: usize, hooks: Hooks<S>) -> Vec<DkgResult<S>> {
    let group = test_group::<S>(n, t);
    let members: Vec<_> = group
        .member_indices()
        .map(|i| EphemeralKeyGeneratingMember::new(i, group.clone(), &params(i)).unwrap())
        .collect();

    let (members, mut keys): (Vec<_>, Vec<_>) = members
        .into_iter()
        .map(|m| m.generate_ephemeral_keys())
        .unzip();
    map(hooks.keys, &mut keys);
    let members: Vec<_> = members
        .into_iter()
        .map(|m| m.generate_symmetric_keys(&keys))
        .collect();

    let (members, mut deals): (Vec<_>, Vec<_>) =
        members.into_iter().map(|m| m.commit().unwrap()).unzip();
    map(hooks.deals, &mut deals);
    let (members, mut accusations): (Vec<_>, Vec<_>) = members
        .into_iter()
        .map(|m| m.verify_received_shares(&deals).unwrap())
        .unzip();
    map(hooks.accusations, &mut accusations);

    let members: Vec<_> = members
        .into_iter()
        .map(|m| m.resolve_shares_accusations(&accusations).qualify().unwrap())
        .collect();
    let quals: Vec<_> = members.iter().map(|m| m.ledger().qual().cloned()).collect();

    let (members, mut points): (Vec<_>, Vec<_>) =
        members.into_iter().map(|m| m.share_points()).unzip();
    map(hooks.points, &mut points);
    let (members, mut points_accusations): (Vec<_>, Vec<_>) = members
        .into_iter()
        .map(|m| m.verify_points(&points).unwrap())
        .unzip();
    map(hooks.points_accusations, &mut points_accusations);

    let (members, mut reveals): (Vec<_>, Vec<_>) = members
        .into_iter()
        .map(|m| {
            m.resolve_points_accusations(&points_accusations)
                .reveal()
                .unwrap()
        })
        .unzip();
    map(hooks.reveals, &mut reveals);

    let members: Vec<_> = members
        .into_iter()
        .map(|m| m.reconstruct(&reveals).unwrap())
        .collect();
    for (m, qual) in members.iter().zip(quals.iter()) {
        assert_eq!(m.ledger().qual(), qual.as_ref(), "qualified set changed");
    }

    members
        .into_iter()
        .map(|m| m.combine().unwrap().finalize())
        .collect()
}

fn honest<S: Scheme>(results: &[DkgResult<S>], excluded: &[Index]) -> Vec<DkgResult<S>> {
    results
        .iter()
        .filter(|r| !excluded.contains(&r.member_index))
        .cloned()
        .collect()
}

fn bitmap(n: usize, set: &[Index]) -> Vec<bool> {
    (1..=n as Index).map(|i| set.contains(&i)).collect()
}

/// Checks that the results agree and that any `t + 1` of their signers
/// produce a signature valid under the group key.
fn assert_consistent<S: Scheme>(results: &[DkgResult<S>], t: usize) -> KeyPoint<S> {
    let group_key = results[0].group_public_key.clone().unwrap();
    for r in results {
        assert!(r.success);
        assert_eq!(r.group_public_key.as_ref(), Some(&group_key));
        assert_eq!(r.hash(), results[0].hash());
        assert!(r.disqualified.iter().zip(r.inactive.iter()).all(|(d, i)| !(*d && *i)));
    }

    let msg = b"threshold signed by the group";
    let signers: Vec<_> = results.iter().map(|r| r.threshold_signer().unwrap()).collect();
    let shares: Vec<SigShare<S>> = signers
        .iter()
        .map(|s| s.calculate_signature_share(msg).unwrap())
        .collect();
    for window in shares.windows(t + 1) {
        let sig = signers[0].complete_signature(window, t + 1).unwrap();
        tbls::verify::<S>(&group_key, msg, &sig).unwrap();
    }
    assert!(matches!(
        signers[0].complete_signature(&shares[..t], t + 1),
        Err(tbls::TBlsError::NotEnoughShares { .. })
    ));

    group_key
}

fn all_honest<S: Scheme>() {
    let (n, t) = (5, 1);
    let results = run_dkg::<S>(n, t, Hooks::default());

    assert_eq!(results.len(), n);
    for r in &results {
        assert_eq!(r.disqualified, vec![false; n]);
        assert_eq!(r.inactive, vec![false; n]);
    }
    assert_consistent(&results, t);
}

#[test]
fn test_all_honest() {
    all_honest::<DefaultScheme>();
    all_honest::<SigsOnG1Scheme>();
}

#[test]
fn larger_threshold() {
    let (n, t) = (7, 3);
    let results = run_dkg::<DefaultScheme>(n, t, Hooks::default());
    assert_consistent(&results, t);
}

#[test]
fn inconsistent_share_disqualifies_dealer() {
    let (n, t) = (5, 1);
    let hooks = Hooks::<DefaultScheme> {
        deals: Some(|deals| {
            // shares of member 3 no longer match its commitments
            let deal = deals.iter_mut().find(|d| d.sender_index == 3).unwrap();
            deal.commitments[1] = deal.commitments[0].clone();
        }),
        ..Default::default()
    };
    let results = run_dkg(n, t, hooks);
    let results = honest(&results, &[3]);

    for r in &results {
        assert_eq!(r.disqualified, bitmap(n, &[3]));
        assert_eq!(r.inactive, vec![false; n]);
    }
    let group_key = assert_consistent(&results, t);

    let full = run_dkg::<DefaultScheme>(n, t, Hooks::default());
    assert_ne!(full[0].group_public_key, Some(group_key));
}

#[test]
fn undecryptable_share_for_one_member_disqualifies_dealer() {
    let (n, t) = (5, 1);
    let hooks = Hooks::<DefaultScheme> {
        deals: Some(|deals| {
            // member 1 gets the ciphertext meant for member 2
            let deal = deals.iter_mut().find(|d| d.sender_index == 3).unwrap();
            let cipher = deal.shares[&2].clone();
            let _ = deal.shares.insert(1, cipher);
        }),
        ..Default::default()
    };
    let results = run_dkg(n, t, hooks);
    let results = honest(&results, &[3]);

    for r in &results {
        assert_eq!(r.disqualified, bitmap(n, &[3]));
    }
    assert_consistent(&results, t);
}

#[test]
fn false_accusation_is_ignored() {
    let (n, t) = (5, 1);
    let hooks = Hooks::<DefaultScheme> {
        accusations: Some(|accusations| {
            let a = accusations.iter_mut().find(|a| a.0.sender_index == 2).unwrap();
            let _ = a.0.accused.insert(4, <DefaultScheme as Scheme>::Scalar::one());
        }),
        ..Default::default()
    };
    let results = run_dkg(n, t, hooks);

    for r in &results {
        assert_eq!(r.disqualified, vec![false; n]);
        assert_eq!(r.inactive, vec![false; n]);
    }
    let group_key = assert_consistent(&results, t);
    let full = run_dkg::<DefaultScheme>(n, t, Hooks::default());
    assert_eq!(full[0].group_public_key, Some(group_key));
}

#[test]
fn member_silent_after_committing_is_reconstructed() {
    let (n, t) = (5, 1);
    let hooks = Hooks::<DefaultScheme> {
        accusations: Some(|m| m.retain(|m| m.0.sender_index != 5)),
        points: Some(|m| m.retain(|m| m.sender_index != 5)),
        points_accusations: Some(|m| m.retain(|m| m.0.sender_index != 5)),
        reveals: Some(|m| m.retain(|m| m.sender_index != 5)),
        ..Default::default()
    };
    let results = run_dkg(n, t, hooks);
    let results = honest(&results, &[5]);

    for r in &results {
        assert_eq!(r.disqualified, vec![false; n]);
        assert_eq!(r.inactive, bitmap(n, &[5]));
    }
    let group_key = assert_consistent(&results, t);

    // the key of member 5 is part of the group key
    let full = run_dkg::<DefaultScheme>(n, t, Hooks::default());
    assert_eq!(full[0].group_public_key, Some(group_key));
}

#[test]
fn unreconstructed_member_is_dropped_from_the_key() {
    let (n, t) = (5, 1);
    let hooks = Hooks::<DefaultScheme> {
        accusations: Some(|m| m.retain(|m| m.0.sender_index != 5)),
        points: Some(|m| m.retain(|m| m.sender_index != 5)),
        points_accusations: Some(|m| m.retain(|m| m.0.sender_index != 5)),
        reveals: Some(|m| {
            m.retain(|m| m.sender_index != 5);
            // nobody reveals what it holds of member 5
            for reveal in m.iter_mut() {
                let _ = reveal.shares.remove(&5);
            }
        }),
        ..Default::default()
    };
    let results = run_dkg(n, t, hooks);
    let results = honest(&results, &[5]);

    for r in &results {
        assert_eq!(r.disqualified, vec![false; n]);
        assert_eq!(r.inactive, bitmap(n, &[5]));
    }
    // master shares stay consistent with the reduced key
    let group_key = assert_consistent(&results, t);

    let full = run_dkg::<DefaultScheme>(n, t, Hooks::default());
    assert_ne!(full[0].group_public_key, Some(group_key));
}

#[test]
fn disqualification_outranks_inactivity() {
    let (n, t) = (5, 1);
    let hooks = Hooks::<DefaultScheme> {
        deals: Some(|deals| {
            let deal = deals.iter_mut().find(|d| d.sender_index == 3).unwrap();
            deal.commitments[1] = deal.commitments[0].clone();
        }),
        // member 3 goes quiet right after its bad deal
        accusations: Some(|m| m.retain(|m| m.0.sender_index != 3)),
        ..Default::default()
    };
    let results = run_dkg(n, t, hooks);
    let results = honest(&results, &[3]);

    for r in &results {
        assert_eq!(r.disqualified, bitmap(n, &[3]));
        assert_eq!(r.inactive, vec![false; n]);
    }
    assert_consistent(&results, t);
}

#[test]
fn member_silent_from_start_is_not_qualified() {
    let (n, t) = (5, 1);
    let hooks = Hooks::<DefaultScheme> {
        keys: Some(|m| m.retain(|m| m.sender_index != 4)),
        ..Default::default()
    };
    let results = run_dkg(n, t, hooks);
    let results = honest(&results, &[4]);

    for r in &results {
        assert_eq!(r.inactive, bitmap(n, &[4]));
    }
    let group_key = assert_consistent(&results, t);
    let full = run_dkg::<DefaultScheme>(n, t, Hooks::default());
    assert_ne!(full[0].group_public_key, Some(group_key));
}

#[test]
fn inconsistent_points_are_disqualified_and_reconstructed() {
    let (n, t) = (5, 1);
    let hooks = Hooks::<DefaultScheme> {
        points: Some(|points| {
            let p = points.iter_mut().find(|p| p.sender_index == 2).unwrap();
            p.points[1] = p.points[0].clone();
        }),
        ..Default::default()
    };
    let results = run_dkg(n, t, hooks);
    let results = honest(&results, &[2]);

    for r in &results {
        assert_eq!(r.disqualified, bitmap(n, &[2]));
        assert_eq!(r.inactive, vec![false; n]);
    }
    let group_key = assert_consistent(&results, t);

    // the secret of member 2 is recovered, so the group key is unchanged
    let full = run_dkg::<DefaultScheme>(n, t, Hooks::default());
    assert_eq!(full[0].group_public_key, Some(group_key));
}

#[test]
fn invalid_revealed_share_is_skipped() {
    let (n, t) = (5, 1);
    let hooks = Hooks::<DefaultScheme> {
        accusations: Some(|m| m.retain(|m| m.0.sender_index != 5)),
        points: Some(|m| m.retain(|m| m.sender_index != 5)),
        points_accusations: Some(|m| m.retain(|m| m.0.sender_index != 5)),
        reveals: Some(|reveals| {
            reveals.retain(|m| m.sender_index != 5);
            // member 1 reveals garbage for member 5
            let r = reveals.iter_mut().find(|r| r.sender_index == 1).unwrap();
            if let Some(share) = r.shares.get_mut(&5) {
                share.s = <DefaultScheme as Scheme>::Scalar::one();
            }
        }),
        ..Default::default()
    };
    let results = run_dkg(n, t, hooks);
    // member 1 still uses its own valid share of member 5
    let results = honest(&results, &[5]);
    let group_key = assert_consistent(&results, t);

    let full = run_dkg::<DefaultScheme>(n, t, Hooks::default());
    assert_eq!(full[0].group_public_key, Some(group_key));
}

#[test]
fn equivocated_deal_keeps_the_first_one() {
    let (n, t) = (5, 1);
    let hooks = Hooks::<DefaultScheme> {
        deals: Some(|deals| {
            let mut second = deals.iter().find(|d| d.sender_index == 2).unwrap().clone();
            second.commitments.reverse();
            deals.push(second);
        }),
        ..Default::default()
    };
    let results = run_dkg(n, t, hooks);

    for r in &results {
        assert_eq!(r.disqualified, vec![false; n]);
    }
    assert_consistent(&results, t);
}

#[test]
fn too_few_contributors_fail_the_run() {
    let (n, t) = (3, 1);
    let hooks = Hooks::<DefaultScheme> {
        accusations: Some(|m| m.retain(|m| m.0.sender_index == 1)),
        points: Some(|m| m.retain(|m| m.sender_index == 1)),
        points_accusations: Some(|m| m.retain(|m| m.0.sender_index == 1)),
        reveals: Some(|m| m.retain(|m| m.sender_index == 1)),
        ..Default::default()
    };
    let results = run_dkg(n, t, hooks);
    let r = &results[0];

    assert!(!r.success);
    assert_eq!(r.group_public_key, None);
    assert_eq!(r.inactive, bitmap(n, &[2, 3]));
    assert!(r.threshold_signer().is_none());
}

#[test]
fn runs_are_reproducible_from_the_seed() {
    let a = run_dkg::<DefaultScheme>(4, 1, Hooks::default());
    let b = run_dkg::<DefaultScheme>(4, 1, Hooks::default());
    for (a, b) in a.iter().zip(b.iter()) {
        assert_eq!(a.group_public_key, b.group_public_key);
        assert_eq!(a.private_key_share, b.private_key_share);
    }
}

/// Forwards every envelope produced by a member to all the other members.
fn spawn_hub(outs: Vec<EnvelopeReceiver>, ins: Vec<EnvelopeSender>) {
    for (i, mut out) in outs.into_iter().enumerate() {
        let ins = ins.clone();
        tokio::spawn(async move {
            while let Some(envelope) = out.recv().await {
                for (j, tx) in ins.iter().enumerate() {
                    if i != j {
                        let _ = tx.send(envelope.clone()).await;
                    }
                }
            }
        });
    }
}

#[tokio::test]
async fn protocol_runs_over_a_hub() {
    type S = DefaultScheme;
    let (n, t) = (4, 1);
    let group = test_group::<S>(n, t);
    let operators = operators::<S>(n);
    // heights never move, every phase completes on delivery
    let (_blocks_tx, blocks) = block_counter(0);
    let (_cancel_tx, cancel) = watch::channel(false);
    let submitter = Arc::new(LocalSubmitter::new());

    let mut outs = vec![];
    let mut ins = vec![];
    let mut handles = vec![];
    for i in group.member_indices() {
        let (protocol, rx_out, tx_in) = Protocol::new_dkg(
            i,
            group.clone(),
            operators[i as usize - 1],
            &params(i),
            Config::default(),
            blocks.clone(),
            cancel.clone(),
        )
        .unwrap();
        let submitter: Arc<dyn ResultSubmitter<S>> = submitter.clone();
        handles.push(tokio::spawn(protocol.with_submitter(submitter).run()));
        outs.push(rx_out);
        ins.push(tx_in);
    }
    spawn_hub(outs, ins);

    let mut results = vec![];
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }
    assert_consistent(&results, t);

    let submissions = submitter.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].result_hash, results[0].hash());
    assert!(submissions[0].signatures.len() >= t + 1);
}

#[tokio::test]
async fn deadlines_mark_silent_members_inactive() {
    type S = DefaultScheme;
    let (n, t) = (3, 1);
    let group = test_group::<S>(n, t);
    let operators = operators::<S>(n);
    let (blocks_tx, blocks) = block_counter(0);
    let (_cancel_tx, cancel) = watch::channel(false);

    let (protocol, _rx_out, _tx_in) = Protocol::new_dkg(
        1,
        group,
        operators[0],
        &params(1),
        Config::default(),
        blocks,
        cancel,
    )
    .unwrap();
    let handle = tokio::spawn(protocol.run());
    let ticker = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(2)).await;
            blocks_tx.send_modify(|height| *height += 1);
        }
    });

    let result = handle.await.unwrap().unwrap();
    ticker.abort();

    assert!(!result.success);
    assert_eq!(result.inactive, vec![false, true, true]);
    assert_eq!(result.disqualified, vec![false; n]);
}

#[tokio::test]
async fn cancelled_run_has_no_result() {
    type S = DefaultScheme;
    let group = test_group::<S>(3, 1);
    let operators = operators::<S>(3);
    let (_blocks_tx, blocks) = block_counter(0);
    let (cancel_tx, cancel) = watch::channel(false);

    let (protocol, _rx_out, _tx_in) = Protocol::new_dkg(
        2,
        group,
        operators[1],
        &params(2),
        Config::default(),
        blocks,
        cancel,
    )
    .unwrap();
    let handle = tokio::spawn(protocol.run());
    cancel_tx.send(true).unwrap();

    assert!(matches!(
        handle.await.unwrap(),
        Err(DkgError::Cancelled(Phase::EphemeralKeyGeneration))
    ));
}

#[test]
fn runner_rejects_foreign_operator_key() {
    type S = DefaultScheme;
    let group = test_group::<S>(3, 1);
    let operators = operators::<S>(3);
    let (_blocks_tx, blocks) = block_counter(0);
    let (_cancel_tx, cancel) = watch::channel(false);

    let err = Protocol::new_dkg(
        1,
        group,
        operators[1],
        &params(1),
        Config::default(),
        blocks,
        cancel,
    )
    .err()
    .unwrap();
    assert!(matches!(err, DkgError::OperatorKeyMismatch(1)));
}
