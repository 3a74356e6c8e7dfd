use core::ops::Not as _;

use anyhow::Result;
use helper_functions::{
    accessors::{
        get_committees, get_current_epoch, get_indexed_attestation, get_previous_epoch,
        public_key,
    },
    error::SignatureKind,
    misc::compute_epoch_at_slot,
    predicates::validate_indexed_attestation,
    signing::{RandaoEpoch, SignForSingleFork as _},
    verifier::{MultiVerifier, NullVerifier, Verifier},
};
use types::{
    config::Config,
    phase0::{beacon_state::BeaconState, containers::SignedBeaconBlock},
    preset::Preset,
};

use super::{block_processing, slot_processing};
use crate::unphased::{ProcessSlots, StateRootPolicy};

/// Applies `signed_block` to `state`.
///
/// The transition works on a copy of `state`. `state` is only replaced once the block has been
/// fully applied and every check has passed, so a rejected block leaves it untouched.
pub fn state_transition<P: Preset, V: Verifier + Send>(
    config: &Config,
    state: &mut BeaconState<P>,
    signed_block: &SignedBeaconBlock<P>,
    process_slots: ProcessSlots,
    state_root_policy: StateRootPolicy,
    verifier: V,
) -> Result<()> {
    let block = &signed_block.message;
    let mut post_state = state.clone();

    // > Process slots (including those with no blocks) since block
    if process_slots.should_process(&post_state, block) {
        slot_processing::process_slots(config, &mut post_state, block.slot)?;
    }

    // Signatures are checked against the state before the block, in parallel with processing.
    let verify_signatures = V::IS_NULL.not().then(|| {
        let pre_block_state = post_state.clone();

        // > Verify signature
        move || verify_signatures(config, &pre_block_state, signed_block, verifier)
    });

    let mut process_block = || {
        // > Process block
        block_processing::custom_process_block(config, &mut post_state, block, NullVerifier)?;

        // > Verify state root
        state_root_policy.verify(&post_state, block)
    };

    if let Some(verify_signatures) = verify_signatures {
        let (signature_result, block_result) = rayon::join(verify_signatures, process_block);
        signature_result.and(block_result)?;
    } else {
        process_block()?;
    }

    *state = post_state;

    Ok(())
}

/// Checks every signature in a block received from an untrusted source.
///
/// Signatures are batched and verified in parallel.
pub fn untrusted_state_transition<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    signed_block: &SignedBeaconBlock<P>,
) -> Result<()> {
    state_transition(
        config,
        state,
        signed_block,
        ProcessSlots::IfNeeded,
        StateRootPolicy::Verify,
        MultiVerifier::default(),
    )
}

/// Skips signature and state root checks for blocks that are already known to be valid.
pub fn trusted_state_transition<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    signed_block: &SignedBeaconBlock<P>,
) -> Result<()> {
    state_transition(
        config,
        state,
        signed_block,
        ProcessSlots::IfNeeded,
        StateRootPolicy::Trust,
        NullVerifier,
    )
}

/// Checks the signatures in `block` against `state`, which must be at the slot of the block.
///
/// Deposit signatures are not checked here. An invalid proof of possession does not invalidate a
/// block.
pub fn verify_signatures<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    block: &SignedBeaconBlock<P>,
    mut verifier: impl Verifier,
) -> Result<()> {
    let message = &block.message;
    let body = &message.body;

    verifier.reserve(1 + block_processing::count_required_signatures(message));

    // Block signature

    verifier.verify_singular(
        message.signing_root(config, state),
        block.signature,
        public_key(state, message.proposer_index)?,
        SignatureKind::Block,
    )?;

    // RANDAO reveal

    verifier.verify_singular(
        RandaoEpoch::from(compute_epoch_at_slot::<P>(message.slot)).signing_root(config, state),
        body.randao_reveal,
        public_key(state, message.proposer_index)?,
        SignatureKind::Randao,
    )?;

    // Proposer slashings

    for proposer_slashing in &body.proposer_slashings {
        for signed_header in [
            proposer_slashing.signed_header_1,
            proposer_slashing.signed_header_2,
        ] {
            verifier.verify_singular(
                signed_header.message.signing_root(config, state),
                signed_header.signature,
                public_key(state, signed_header.message.proposer_index)?,
                SignatureKind::Block,
            )?;
        }
    }

    // Attester slashings

    for attester_slashing in &body.attester_slashings {
        for attestation in [
            &attester_slashing.attestation_1,
            &attester_slashing.attestation_2,
        ] {
            validate_indexed_attestation(config, state, attestation, &mut verifier)?;
        }
    }

    // Attestations

    let current_committees = get_committees(state, get_current_epoch(state))?;
    let previous_epoch = get_previous_epoch(state);

    let previous_committees = if body
        .attestations
        .iter()
        .any(|attestation| attestation.data.target.epoch != current_committees.epoch())
    {
        Some(get_committees(state, previous_epoch)?)
    } else {
        None
    };

    for attestation in &body.attestations {
        let committees = match &previous_committees {
            Some(previous) if attestation.data.target.epoch == previous.epoch() => previous,
            _ => &current_committees,
        };

        let indexed_attestation = get_indexed_attestation(committees, attestation)?;

        validate_indexed_attestation(config, state, &indexed_attestation, &mut verifier)?;
    }

    // Voluntary exits

    for voluntary_exit in &body.voluntary_exits {
        verifier.verify_singular(
            voluntary_exit.message.signing_root(config, state),
            voluntary_exit.signature,
            public_key(state, voluntary_exit.message.validator_index)?,
            SignatureKind::VoluntaryExit,
        )?;
    }

    verifier.finish()
}
