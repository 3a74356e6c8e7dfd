use anyhow::{ensure, Result};
use arithmetic::U64Ext as _;
use helper_functions::{
    accessors::{get_committees, get_current_epoch, get_previous_epoch, CommitteeAssignment},
    mutators::{balance, increase_balance, slash_validator},
    verifier::Verifier,
};
use typenum::Unsigned as _;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        consts::FAR_FUTURE_EPOCH,
        containers::{
            Attestation, AttesterSlashing, BeaconBlock, BeaconBlockBody, PendingAttestation,
            ProposerSlashing, Validator,
        },
        primitives::{Gwei, ValidatorIndex},
    },
    preset::Preset,
};

use crate::unphased::{self, CombinedDeposit, Error};

/// Applies `block` to `state`, which must already be at the slot of the block.
///
/// `state` is left partially updated if this fails. Callers that need to keep the original state
/// should pass a clone, as [`state_transition`](crate::phase0::state_transition) does.
pub fn process_block<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    block: &BeaconBlock<P>,
    mut verifier: impl Verifier,
) -> Result<()> {
    verifier.reserve(count_required_signatures(block));

    custom_process_block(config, state, block, &mut verifier)?;

    verifier.finish()
}

/// Number of signatures in `block` that are checked by [`process_block`].
///
/// The block signature itself and deposit signatures are not included.
#[must_use]
pub fn count_required_signatures<P: Preset>(block: &BeaconBlock<P>) -> usize {
    let body = &block.body;

    1 + 2 * body.proposer_slashings.len()
        + 2 * body.attester_slashings.len()
        + body.attestations.len()
        + body.voluntary_exits.len()
}

pub(crate) fn custom_process_block<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    block: &BeaconBlock<P>,
    mut verifier: impl Verifier,
) -> Result<()> {
    // Registry changes made by the block take effect too late to change the current shuffling,
    // so committees can be computed once for the whole block.
    let current_committees = get_committees(state, get_current_epoch(state))?;
    let proposer_index = current_committees.proposer_index(state.slot)?;

    unphased::process_block_header(state, block, proposer_index)?;
    unphased::process_randao(config, state, &block.body, proposer_index, &mut verifier)?;
    unphased::process_eth1_data(state, &block.body)?;

    process_operations(
        config,
        state,
        &current_committees,
        proposer_index,
        &block.body,
        verifier,
    )
}

fn process_operations<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    current_committees: &CommitteeAssignment<P>,
    proposer_index: ValidatorIndex,
    body: &BeaconBlockBody<P>,
    mut verifier: impl Verifier,
) -> Result<()> {
    // > Verify that outstanding deposits are processed up to the maximum number of deposits
    let computed = P::MaxDeposits::U64.min(
        state
            .eth1_data
            .deposit_count
            .saturating_sub(state.eth1_deposit_index),
    );

    let in_block = body.deposits.len_u64();

    ensure!(
        computed == in_block,
        Error::DepositCountMismatch { computed, in_block },
    );

    for proposer_slashing in body.proposer_slashings.iter().copied() {
        process_proposer_slashing(
            config,
            state,
            proposer_slashing,
            proposer_index,
            &mut verifier,
        )?;
    }

    for attester_slashing in &body.attester_slashings {
        process_attester_slashing(
            config,
            state,
            attester_slashing,
            proposer_index,
            &mut verifier,
        )?;
    }

    let previous_epoch = get_previous_epoch(state);

    let needs_previous_committees = previous_epoch != current_committees.epoch()
        && body
            .attestations
            .iter()
            .any(|attestation| attestation.data.target.epoch == previous_epoch);

    let previous_committees = if needs_previous_committees {
        Some(get_committees(state, previous_epoch)?)
    } else {
        None
    };

    for attestation in &body.attestations {
        let committees = match &previous_committees {
            Some(previous) if attestation.data.target.epoch == previous.epoch() => previous,
            _ => current_committees,
        };

        unphased::validate_attestation_with_verifier(
            config,
            state,
            committees,
            attestation,
            &mut verifier,
        )?;

        apply_attestation(state, attestation, proposer_index)?;
    }

    // Deposits are grouped and applied in one go, but the result is the same as processing them
    // one at a time in block order.
    let combined_deposits = unphased::validate_deposits(config, state, &body.deposits)?;

    apply_deposits(state, in_block, combined_deposits)?;

    for voluntary_exit in body.voluntary_exits.iter().copied() {
        unphased::process_voluntary_exit(config, state, voluntary_exit, &mut verifier)?;
    }

    Ok(())
}

fn process_proposer_slashing<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    proposer_slashing: ProposerSlashing,
    proposer_index: ValidatorIndex,
    verifier: impl Verifier,
) -> Result<()> {
    unphased::validate_proposer_slashing_with_verifier(config, state, proposer_slashing, verifier)?;

    let index = proposer_slashing.signed_header_1.message.proposer_index;

    slash_validator(config, state, index, None, proposer_index)
}

fn process_attester_slashing<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    attester_slashing: &AttesterSlashing<P>,
    proposer_index: ValidatorIndex,
    verifier: impl Verifier,
) -> Result<()> {
    let slashable_indices = unphased::validate_attester_slashing_with_verifier(
        config,
        state,
        attester_slashing,
        verifier,
    )?;

    for validator_index in slashable_indices {
        slash_validator(config, state, validator_index, None, proposer_index)?;
    }

    Ok(())
}

fn apply_attestation<P: Preset>(
    state: &mut BeaconState<P>,
    attestation: &Attestation<P>,
    proposer_index: ValidatorIndex,
) -> Result<()> {
    let pending_attestation = PendingAttestation {
        aggregation_bits: attestation.aggregation_bits.clone(),
        data: attestation.data,
        inclusion_delay: state.slot - attestation.data.slot,
        proposer_index,
    };

    if attestation.data.target.epoch == get_current_epoch(state) {
        state.current_epoch_attestations.push(pending_attestation)?;
    } else {
        state.previous_epoch_attestations.push(pending_attestation)?;
    }

    Ok(())
}

fn apply_deposits<P: Preset>(
    state: &mut BeaconState<P>,
    deposit_count: u64,
    combined_deposits: impl IntoIterator<Item = CombinedDeposit>,
) -> Result<()> {
    state.eth1_deposit_index += deposit_count;

    for combined_deposit in combined_deposits {
        match combined_deposit {
            // > Add validator and balance entries
            CombinedDeposit::NewValidator {
                pubkey,
                withdrawal_credentials,
                amounts,
            } => {
                let first_amount = amounts.first().copied().unwrap_or_default();
                let total_amount = amounts.iter().sum::<Gwei>();

                let effective_balance = first_amount
                    .prev_multiple_of(P::EFFECTIVE_BALANCE_INCREMENT)
                    .min(P::MAX_EFFECTIVE_BALANCE);

                let validator = Validator {
                    pubkey,
                    withdrawal_credentials,
                    effective_balance,
                    slashed: false,
                    activation_eligibility_epoch: FAR_FUTURE_EPOCH,
                    activation_epoch: FAR_FUTURE_EPOCH,
                    exit_epoch: FAR_FUTURE_EPOCH,
                    withdrawable_epoch: FAR_FUTURE_EPOCH,
                };

                state.validators.push(validator)?;
                state.balances.push(total_amount)?;
            }
            // > Increase balance by deposit amount
            CombinedDeposit::TopUp {
                validator_index,
                amounts,
            } => {
                let total_amount = amounts.iter().sum();
                increase_balance(balance(state, validator_index)?, total_amount);
            }
        }
    }

    Ok(())
}
