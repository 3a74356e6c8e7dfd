use core::cmp::Ordering;

use anyhow::Result;
use typenum::Unsigned as _;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        consts::FAR_FUTURE_EPOCH,
        primitives::{Gwei, ValidatorIndex},
    },
    preset::Preset,
};

use crate::{
    accessors::{get_current_epoch, get_validator_churn_limit},
    error::Error,
    misc::compute_activation_exit_epoch,
};

pub fn balance<P: Preset>(
    state: &mut BeaconState<P>,
    validator_index: ValidatorIndex,
) -> Result<&mut Gwei> {
    state
        .balances
        .get_mut(validator_index)
        .map_err(Into::into)
}

#[inline]
pub fn increase_balance(balance: &mut Gwei, delta: Gwei) {
    *balance += delta;
}

/// Balances never go below zero.
#[inline]
pub fn decrease_balance(balance: &mut Gwei, delta: Gwei) {
    *balance = balance.saturating_sub(delta);
}

/// Schedules `validator_index` to exit after the validators already queued, respecting churn.
///
/// Does nothing if the validator is already exiting.
pub fn initiate_validator_exit<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    validator_index: ValidatorIndex,
) -> Result<()> {
    if state.validators.get(validator_index)?.exit_epoch != FAR_FUTURE_EPOCH {
        return Ok(());
    }

    let mut exit_queue_epoch = compute_activation_exit_epoch::<P>(get_current_epoch(state));
    let mut exit_queue_churn = 0;

    for validator in state.validators.iter() {
        let exit_epoch = validator.exit_epoch;

        if exit_epoch == FAR_FUTURE_EPOCH {
            continue;
        }

        match exit_epoch.cmp(&exit_queue_epoch) {
            Ordering::Less => {}
            Ordering::Equal => exit_queue_churn += 1,
            Ordering::Greater => {
                exit_queue_epoch = exit_epoch;
                exit_queue_churn = 1;
            }
        }
    }

    if exit_queue_churn >= get_validator_churn_limit(config, state) {
        exit_queue_epoch += 1;
    }

    let validator = state.validators.get_mut(validator_index)?;

    validator.exit_epoch = exit_queue_epoch;

    validator.withdrawable_epoch = exit_queue_epoch
        .checked_add(config.min_validator_withdrawability_delay)
        .ok_or(Error::EpochOverflow)?;

    Ok(())
}

/// Slashes `slashed_index` and rewards the whistleblower and the proposer.
///
/// The whistleblower defaults to the proposer of the block containing the slashing.
pub fn slash_validator<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    slashed_index: ValidatorIndex,
    whistleblower_index: Option<ValidatorIndex>,
    proposer_index: ValidatorIndex,
) -> Result<()> {
    initiate_validator_exit(config, state, slashed_index)?;

    let epoch = get_current_epoch(state);
    let validator = state.validators.get_mut(slashed_index)?;
    let effective_balance = validator.effective_balance;
    let slashing_penalty = effective_balance / P::MIN_SLASHING_PENALTY_QUOTIENT;

    validator.slashed = true;
    validator.withdrawable_epoch = validator
        .withdrawable_epoch
        .max(epoch + P::EpochsPerSlashingsVector::U64);

    *state.slashings.mod_index_mut(epoch) += effective_balance;

    decrease_balance(balance(state, slashed_index)?, slashing_penalty);

    let whistleblower_index = whistleblower_index.unwrap_or(proposer_index);
    let whistleblower_reward = effective_balance / P::WHISTLEBLOWER_REWARD_QUOTIENT;
    let proposer_reward = whistleblower_reward / P::PROPOSER_REWARD_QUOTIENT;
    let remaining_reward = whistleblower_reward - proposer_reward;

    increase_balance(balance(state, proposer_index)?, proposer_reward);
    increase_balance(balance(state, whistleblower_index)?, remaining_reward);

    Ok(())
}
