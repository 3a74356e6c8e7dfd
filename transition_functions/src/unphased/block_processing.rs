use std::collections::HashMap;

use anyhow::{ensure, Result};
use bls::{CachedPublicKey, PublicKeyBytes};
use helper_functions::{
    accessors::{
        get_committees, get_current_epoch, get_indexed_attestation, get_previous_epoch,
        get_randao_mix, index_of_public_key, slashable_indices, CommitteeAssignment,
    },
    error::SignatureKind,
    misc::compute_epoch_at_slot,
    mutators::initiate_validator_exit,
    predicates::{
        is_active_validator, is_slashable_attestation_data, is_slashable_validator,
        is_valid_merkle_branch, validate_indexed_attestation,
    },
    signing::{RandaoEpoch, SignForAllForks as _, SignForSingleFork as _},
    verifier::{SingleVerifier, Verifier},
};
use itertools::Itertools as _;
use ssz::SszHash as _;
use typenum::Unsigned as _;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        consts::FAR_FUTURE_EPOCH,
        containers::{
            Attestation, AttestationData, AttesterSlashing, BeaconBlock, BeaconBlockBody,
            BeaconBlockHeader, Deposit, DepositData, DepositMessage, ProposerSlashing,
            SignedVoluntaryExit,
        },
        primitives::{DepositIndex, Gwei, ValidatorIndex, H256},
    },
    preset::Preset,
};

use crate::unphased::Error;

/// Deposits of a single block grouped by public key.
pub enum CombinedDeposit {
    NewValidator {
        pubkey: CachedPublicKey,
        withdrawal_credentials: H256,
        amounts: Vec<Gwei>,
    },
    TopUp {
        validator_index: ValidatorIndex,
        amounts: Vec<Gwei>,
    },
}

/// Checks and caches the header of `block`.
///
/// `proposer_index` is the proposer computed from the state for the current slot.
pub fn process_block_header<P: Preset>(
    state: &mut BeaconState<P>,
    block: &BeaconBlock<P>,
    proposer_index: ValidatorIndex,
) -> Result<()> {
    // > Verify that the slots match
    ensure!(
        block.slot == state.slot,
        Error::SlotMismatch {
            state_slot: state.slot,
            block_slot: block.slot,
        },
    );

    // > Verify that the block is newer than latest block header
    ensure!(
        block.slot > state.latest_block_header.slot,
        Error::BlockNotNewerThanLatestBlockHeader {
            block_slot: block.slot,
            block_header_slot: state.latest_block_header.slot,
        },
    );

    // > Verify that proposer index is the correct index
    let computed = proposer_index;
    let in_block = block.proposer_index;

    ensure!(
        computed == in_block,
        Error::ProposerIndexMismatch { computed, in_block },
    );

    // > Verify that the parent matches
    let computed = state.latest_block_header.hash_tree_root();
    let in_block = block.parent_root;

    ensure!(
        computed == in_block,
        Error::ParentRootMismatch { computed, in_block },
    );

    // > Verify proposer is not slashed
    let index = block.proposer_index;

    ensure!(
        !state.validators.get(index)?.slashed,
        Error::ProposerSlashed { index },
    );

    // > Cache current block as the new latest block
    state.latest_block_header = BeaconBlockHeader {
        // > Overwritten in the next process_slot call
        state_root: H256::zero(),
        ..block.to_header()
    };

    Ok(())
}

pub fn process_randao<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    body: &BeaconBlockBody<P>,
    proposer_index: ValidatorIndex,
    mut verifier: impl Verifier,
) -> Result<()> {
    let epoch = get_current_epoch(state);
    let randao_reveal = body.randao_reveal;

    // > Verify RANDAO reveal
    verifier.verify_singular(
        RandaoEpoch::from(epoch).signing_root(config, state),
        randao_reveal,
        &state.validators.get(proposer_index)?.pubkey,
        SignatureKind::Randao,
    )?;

    // > Mix in RANDAO reveal
    let mix = get_randao_mix(state, epoch) ^ hashing::hash_768(randao_reveal);
    *state.randao_mixes.mod_index_mut(epoch) = mix;

    Ok(())
}

pub fn process_eth1_data<P: Preset>(
    state: &mut BeaconState<P>,
    body: &BeaconBlockBody<P>,
) -> Result<()> {
    state.eth1_data_votes.push(body.eth1_data)?;

    let vote_count = state
        .eth1_data_votes
        .iter()
        .filter(|vote| **vote == body.eth1_data)
        .count();

    if vote_count * 2 > P::SlotsPerEth1VotingPeriod::USIZE {
        state.eth1_data = body.eth1_data;
    }

    Ok(())
}

pub fn validate_proposer_slashing<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    proposer_slashing: ProposerSlashing,
) -> Result<()> {
    validate_proposer_slashing_with_verifier(config, state, proposer_slashing, SingleVerifier)
}

pub fn validate_proposer_slashing_with_verifier<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    proposer_slashing: ProposerSlashing,
    mut verifier: impl Verifier,
) -> Result<()> {
    let header_1 = proposer_slashing.signed_header_1.message;
    let header_2 = proposer_slashing.signed_header_2.message;

    // > Verify header slots match
    ensure!(
        header_1.slot == header_2.slot,
        Error::ProposerSlashingSlotMismatch {
            slot_1: header_1.slot,
            slot_2: header_2.slot,
        },
    );

    // > Verify header proposer indices match
    ensure!(
        header_1.proposer_index == header_2.proposer_index,
        Error::ProposerSlashingProposerMismatch {
            proposer_index_1: header_1.proposer_index,
            proposer_index_2: header_2.proposer_index,
        },
    );

    // > Verify the headers are different
    ensure!(
        header_1 != header_2,
        Error::ProposerSlashingHeadersIdentical { header: header_1 },
    );

    // > Verify the proposer is slashable
    let index = header_1.proposer_index;
    let proposer = state.validators.get(index)?;

    ensure!(
        is_slashable_validator(proposer, get_current_epoch(state)),
        Error::ProposerNotSlashable {
            index,
            proposer: Box::new(proposer.clone()),
        },
    );

    // > Verify signatures
    for signed_header in [
        proposer_slashing.signed_header_1,
        proposer_slashing.signed_header_2,
    ] {
        verifier.verify_singular(
            signed_header.message.signing_root(config, state),
            signed_header.signature,
            &proposer.pubkey,
            SignatureKind::Block,
        )?;
    }

    Ok(())
}

pub fn validate_attester_slashing<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    attester_slashing: &AttesterSlashing<P>,
) -> Result<Vec<ValidatorIndex>> {
    validate_attester_slashing_with_verifier(config, state, attester_slashing, SingleVerifier)
}

/// Returns the indices of validators that would be slashed, in increasing order.
pub fn validate_attester_slashing_with_verifier<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    attester_slashing: &AttesterSlashing<P>,
    mut verifier: impl Verifier,
) -> Result<Vec<ValidatorIndex>> {
    let attestation_1 = &attester_slashing.attestation_1;
    let attestation_2 = &attester_slashing.attestation_2;

    let data_1 = attestation_1.data;
    let data_2 = attestation_2.data;

    ensure!(
        is_slashable_attestation_data(data_1, data_2),
        Error::AttestationDataNotSlashable { data_1, data_2 },
    );

    validate_indexed_attestation(config, state, attestation_1, &mut verifier)?;
    validate_indexed_attestation(config, state, attestation_2, verifier)?;

    let current_epoch = get_current_epoch(state);
    let mut slashable = vec![];

    for attester_index in slashable_indices(attester_slashing) {
        if is_slashable_validator(state.validators.get(attester_index)?, current_epoch) {
            slashable.push(attester_index);
        }
    }

    ensure!(!slashable.is_empty(), Error::NoAttestersSlashed);

    Ok(slashable)
}

/// Validates `attestation` against `state` with signature checking.
///
/// Computes the committees of the target epoch. Block processing reuses committees through
/// [`validate_attestation_with_verifier`] instead.
pub fn validate_attestation<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    attestation: &Attestation<P>,
) -> Result<()> {
    validate_attestation_epoch(state, attestation.data)?;
    let assignment = get_committees(state, attestation.data.target.epoch)?;
    validate_attestation_with_verifier(config, state, &assignment, attestation, SingleVerifier)
}

/// Validates `attestation` using committees from `assignment`.
///
/// `assignment` must be for the target epoch of the attestation. A mismatch is reported as an
/// error by [`CommitteeAssignment::committee`].
pub fn validate_attestation_with_verifier<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    assignment: &CommitteeAssignment<P>,
    attestation: &Attestation<P>,
    verifier: impl Verifier,
) -> Result<()> {
    let AttestationData {
        slot: attestation_slot,
        source,
        target,
        ..
    } = attestation.data;

    validate_attestation_epoch(state, attestation.data)?;

    let low_slot = attestation_slot + P::MIN_ATTESTATION_INCLUSION_DELAY.get();
    let high_slot = attestation_slot + P::SlotsPerEpoch::U64;

    ensure!(
        (low_slot..=high_slot).contains(&state.slot),
        Error::AttestationOutsideInclusionRange {
            state_slot: state.slot,
            attestation_slot,
        },
    );

    let in_state = if target.epoch == get_current_epoch(state) {
        state.current_justified_checkpoint
    } else {
        state.previous_justified_checkpoint
    };

    let in_block = source;

    ensure!(
        in_state == in_block,
        Error::AttestationSourceMismatch { in_state, in_block },
    );

    // The committee index and the length of `aggregation_bits` are checked here.
    let indexed_attestation = get_indexed_attestation(assignment, attestation)?;

    // > Verify signature
    validate_indexed_attestation(config, state, &indexed_attestation, verifier)
}

fn validate_attestation_epoch<P: Preset>(
    state: &BeaconState<P>,
    data: AttestationData,
) -> Result<()> {
    let target_epoch = data.target.epoch;

    // Blocks cannot contain attestations from the future or epochs before the previous one.
    ensure!(
        [get_previous_epoch(state), get_current_epoch(state)].contains(&target_epoch)
            && target_epoch == compute_epoch_at_slot::<P>(data.slot),
        Error::AttestationTargetsWrongEpoch { data },
    );

    Ok(())
}

/// Checks deposit proofs and groups deposits by public key.
///
/// Deposits for unknown public keys with invalid proofs of possession are dropped. Later deposits
/// for the same key may still create the validator. The result is ordered by the position of the
/// first deposit that takes effect in each group.
pub fn validate_deposits<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    deposits: &[Deposit],
) -> Result<Vec<CombinedDeposit>> {
    let mut deposits_by_pubkey = HashMap::<PublicKeyBytes, Vec<(DepositIndex, &Deposit)>>::new();
    let mut pubkeys_in_order = vec![];

    for (position, deposit) in (0..).zip(deposits) {
        // > Verify the Merkle branch
        verify_deposit_merkle_branch(state, state.eth1_deposit_index + position, deposit)?;

        deposits_by_pubkey
            .entry(deposit.data.pubkey)
            .or_insert_with(|| {
                pubkeys_in_order.push(deposit.data.pubkey);
                vec![]
            })
            .push((position, deposit));
    }

    let mut combined_deposits = vec![];

    for pubkey in pubkeys_in_order {
        let Some(group) = deposits_by_pubkey.remove(&pubkey) else {
            continue;
        };

        if let Some(validator_index) = index_of_public_key(state, pubkey) {
            let (first_position, _) = group[0];
            let amounts = group.iter().map(|(_, deposit)| deposit.data.amount).collect();

            let combined_deposit = CombinedDeposit::TopUp {
                validator_index,
                amounts,
            };

            combined_deposits.push((first_position, combined_deposit));
            continue;
        }

        let cached_public_key = CachedPublicKey::from(pubkey);

        let first_valid = group.iter().position(|(_, deposit)| {
            // > Verify the deposit signature (proof of possession)
            // > which is not checked by the deposit contract
            DepositMessage::from(deposit.data)
                .verify(config, deposit.data.signature, &cached_public_key)
                .is_ok()
        });

        if let Some(first_valid) = first_valid {
            let (position, deposit) = group[first_valid];

            let DepositData {
                withdrawal_credentials,
                ..
            } = deposit.data;

            let amounts = group[first_valid..]
                .iter()
                .map(|(_, deposit)| deposit.data.amount)
                .collect();

            let combined_deposit = CombinedDeposit::NewValidator {
                pubkey: cached_public_key,
                withdrawal_credentials,
                amounts,
            };

            combined_deposits.push((position, combined_deposit));
        }
    }

    Ok(combined_deposits
        .into_iter()
        .sorted_by_key(|(position, _)| *position)
        .map(|(_, combined_deposit)| combined_deposit)
        .collect())
}

pub fn verify_deposit_merkle_branch<P: Preset>(
    state: &BeaconState<P>,
    eth1_deposit_index: DepositIndex,
    deposit: &Deposit,
) -> Result<()> {
    ensure!(
        is_valid_merkle_branch(
            deposit.data.hash_tree_root(),
            deposit.proof.iter().copied(),
            eth1_deposit_index,
            state.eth1_data.deposit_root,
        ),
        Error::DepositProofInvalid {
            deposit: Box::new(deposit.clone()),
        },
    );

    Ok(())
}

pub fn process_voluntary_exit<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    signed_voluntary_exit: SignedVoluntaryExit,
    verifier: impl Verifier,
) -> Result<()> {
    validate_voluntary_exit_with_verifier(config, state, signed_voluntary_exit, verifier)?;

    // > Initiate exit
    initiate_validator_exit(config, state, signed_voluntary_exit.message.validator_index)
}

pub fn validate_voluntary_exit<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    signed_voluntary_exit: SignedVoluntaryExit,
) -> Result<()> {
    validate_voluntary_exit_with_verifier(config, state, signed_voluntary_exit, SingleVerifier)
}

pub fn validate_voluntary_exit_with_verifier<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    signed_voluntary_exit: SignedVoluntaryExit,
    mut verifier: impl Verifier,
) -> Result<()> {
    let voluntary_exit = signed_voluntary_exit.message;
    let index = voluntary_exit.validator_index;
    let validator = state.validators.get(index)?;
    let current_epoch = get_current_epoch(state);

    // > Verify the validator is active
    ensure!(
        is_active_validator(validator, current_epoch),
        Error::ValidatorNotActive {
            index,
            current_epoch,
        },
    );

    // > Verify exit has not been initiated
    ensure!(
        validator.exit_epoch == FAR_FUTURE_EPOCH,
        Error::ValidatorAlreadyExited {
            index,
            exit_epoch: validator.exit_epoch,
        },
    );

    // > Exits must specify an epoch when they become valid; they are not valid before then
    ensure!(
        current_epoch >= voluntary_exit.epoch,
        Error::VoluntaryExitIsExpired {
            current_epoch,
            epoch: voluntary_exit.epoch,
        },
    );

    // > Verify the validator has been active long enough
    ensure!(
        current_epoch >= validator.activation_epoch + config.shard_committee_period,
        Error::ValidatorHasNotBeenActiveLongEnough {
            index,
            activation_epoch: validator.activation_epoch,
            current_epoch,
        },
    );

    // > Verify signature
    verifier.verify_singular(
        voluntary_exit.signing_root(config, state),
        signed_voluntary_exit.signature,
        &validator.pubkey,
        SignatureKind::VoluntaryExit,
    )?;

    Ok(())
}
