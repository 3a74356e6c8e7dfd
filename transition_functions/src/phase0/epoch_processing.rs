use anyhow::{ensure, Context as _, Result};
use helper_functions::{
    accessors::{compute_active_index_root, get_current_epoch, get_next_epoch, get_seed},
    mutators::{decrease_balance, increase_balance},
};
use log::error;
use types::{
    config::Config,
    phase0::{beacon_state::BeaconState, consts::DOMAIN_BEACON_ATTESTER},
    preset::Preset,
};

use super::epoch_intermediates::{self, EpochDeltas};
use crate::unphased::{self, Error};

/// Runs the end of epoch transition. `state` must be in the last slot of an epoch.
///
/// Failures here mean `state` violates an invariant. They are logged and reported as
/// [`Error::EpochProcessingFailed`].
pub fn process_epoch<P: Preset>(config: &Config, state: &mut BeaconState<P>) -> Result<()> {
    let epoch = get_current_epoch(state);

    custom_process_epoch(config, state)
        .inspect_err(|error| error!("epoch processing failed at end of epoch {epoch}: {error:?}"))
        .context(Error::EpochProcessingFailed { epoch })
}

fn custom_process_epoch<P: Preset>(config: &Config, state: &mut BeaconState<P>) -> Result<()> {
    ensure!(
        state.validators.len() == state.balances.len(),
        Error::BalancesLengthMismatch {
            validators: state.validators.len(),
            balances: state.balances.len(),
        },
    );

    let (statistics, summaries, performance) = epoch_intermediates::statistics(state)?;

    if unphased::should_process_justification_and_finalization(state) {
        unphased::weigh_justification_and_finalization(
            state,
            statistics.current_epoch_active_balance,
            statistics.previous_epoch_target_attesting_balance,
            statistics.current_epoch_target_attesting_balance,
        )?;
    }

    if unphased::should_process_rewards_and_penalties(state) {
        let deltas =
            epoch_intermediates::epoch_deltas(state, statistics, &summaries, &performance)?;

        apply_deltas(state, deltas);
    }

    unphased::process_registry_updates(config, state)?;
    unphased::process_slashings(state)?;

    // > Final updates
    unphased::process_eth1_data_reset(state);
    unphased::process_effective_balance_updates(state);
    unphased::process_slashings_reset(state);
    unphased::process_randao_mixes_reset(state);
    process_active_index_root_update(state)?;
    unphased::process_historical_roots_update(state)?;
    process_shuffling_update(state);
    process_participation_record_updates(state);

    Ok(())
}

fn apply_deltas<P: Preset>(state: &mut BeaconState<P>, deltas: Vec<EpochDeltas>) {
    for (balance, deltas) in state.balances.iter_mut().zip(deltas) {
        increase_balance(balance, deltas.reward);
        decrease_balance(balance, deltas.penalty);
    }
}

fn process_active_index_root_update<P: Preset>(state: &mut BeaconState<P>) -> Result<()> {
    let index_epoch = get_next_epoch(state) + P::MAX_SEED_LOOKAHEAD;

    *state.active_index_roots.mod_index_mut(index_epoch) =
        compute_active_index_root(state, index_epoch)?;

    Ok(())
}

// The seed of the next epoch depends on a RANDAO mix that is already final, but it can only be
// read while the mix is inside the window retained by the state.
fn process_shuffling_update<P: Preset>(state: &mut BeaconState<P>) {
    let current_epoch = get_current_epoch(state);
    let next_epoch = get_next_epoch(state);

    state.previous_shuffling_epoch = state.current_shuffling_epoch;
    state.previous_shuffling_seed = state.current_shuffling_seed;

    let next_seed = get_seed(state, next_epoch, DOMAIN_BEACON_ATTESTER).ok();

    if state.finalized_checkpoint.epoch > state.validator_registry_update_epoch {
        if let Some(seed) = next_seed {
            state.validator_registry_update_epoch = current_epoch;
            state.current_shuffling_epoch = next_epoch;
            state.current_shuffling_seed = seed;
            return;
        }
    }

    let epochs_since_last_registry_update = current_epoch - state.validator_registry_update_epoch;

    if epochs_since_last_registry_update > 1 && epochs_since_last_registry_update.is_power_of_two()
    {
        if let Some(seed) = next_seed {
            state.current_shuffling_epoch = next_epoch;
            state.current_shuffling_seed = seed;
        }
    }
}

fn process_participation_record_updates<P: Preset>(state: &mut BeaconState<P>) {
    // > Rotate current/previous epoch attestations
    state.previous_epoch_attestations = core::mem::take(&mut state.current_epoch_attestations);
}

#[cfg(test)]
mod tests {
    use core::num::NonZeroU64;

    use helper_functions::accessors::get_active_index_root;
    use types::{phase0::primitives::H256, preset::Minimal};

    use crate::{phase0::process_slots, unphased::ErrorKind};

    use super::*;

    fn genesis_state() -> Result<(Config, BeaconState<Minimal>)> {
        let config = Config::minimal();
        let validator_count = NonZeroU64::new(32).expect("count is nonzero");
        let state = interop::quick_start_beacon_state(&config, 0, validator_count)?;
        Ok((config, state))
    }

    #[test]
    fn mismatched_balances_are_an_invariant_violation() -> Result<()> {
        let (config, mut state) = genesis_state()?;
        state.balances.pop();
        state.slot = 7;

        let error = process_epoch(&config, &mut state).expect_err("lengths differ");

        assert_eq!(ErrorKind::of(&error), ErrorKind::EpochInvariantViolation);
        assert!(matches!(
            error.downcast_ref(),
            Some(Error::EpochProcessingFailed { epoch: 0 }),
        ));

        Ok(())
    }

    #[test]
    fn epoch_without_blocks_rotates_buckets_and_carries_randao_mix() -> Result<()> {
        let (config, mut state) = genesis_state()?;
        let genesis_mix = *state.randao_mixes.mod_index(0);

        process_slots(&config, &mut state, 8)?;

        assert_eq!(*state.randao_mixes.mod_index(1), genesis_mix);
        assert!(state.previous_epoch_attestations.is_empty());
        assert_eq!(state.previous_shuffling_epoch, 0);
        assert_eq!(
            get_active_index_root(&state, 1 + Minimal::MAX_SEED_LOOKAHEAD),
            compute_active_index_root(&state, 1 + Minimal::MAX_SEED_LOOKAHEAD)?,
        );
        assert_ne!(
            get_active_index_root(&state, 1 + Minimal::MAX_SEED_LOOKAHEAD),
            H256::zero(),
        );

        Ok(())
    }

    #[test]
    fn missed_epochs_cost_balance_and_never_justify() -> Result<()> {
        let (config, mut state) = genesis_state()?;
        let initial_balance = *state.balances.get(0)?;

        process_slots(&config, &mut state, 4 * 8)?;

        assert!(*state.balances.get(0)? < initial_balance);
        assert_eq!(state.current_justified_checkpoint.epoch, 0);
        assert_eq!(state.finalized_checkpoint.epoch, 0);

        Ok(())
    }

    #[test]
    fn shuffling_is_kept_until_two_epochs_since_registry_update() -> Result<()> {
        let (config, mut state) = genesis_state()?;
        let genesis_seed = state.current_shuffling_seed;

        // The end of epoch 1 is one epoch after the registry update in epoch 0.
        process_slots(&config, &mut state, 2 * 8)?;

        assert_eq!(state.validator_registry_update_epoch, 0);
        assert_eq!(state.current_shuffling_epoch, 0);
        assert_eq!(state.current_shuffling_seed, genesis_seed);

        Ok(())
    }

    #[test]
    fn shuffling_is_updated_after_power_of_two_epochs() -> Result<()> {
        let (config, mut state) = genesis_state()?;

        // The end of epoch 2 is two epochs after the registry update in epoch 0.
        process_slots(&config, &mut state, 3 * 8)?;

        assert_eq!(state.validator_registry_update_epoch, 0);
        assert_eq!(state.previous_shuffling_epoch, 0);
        assert_eq!(state.current_shuffling_epoch, 3);
        assert_eq!(
            state.current_shuffling_seed,
            get_seed(&state, 3, DOMAIN_BEACON_ATTESTER)?,
        );

        // Three epochs since the update is not a power of two.
        process_slots(&config, &mut state, 4 * 8)?;

        assert_eq!(state.previous_shuffling_epoch, 3);
        assert_eq!(state.current_shuffling_epoch, 3);

        Ok(())
    }

    #[test]
    fn finality_triggers_registry_shuffling_update() -> Result<()> {
        let (config, mut state) = genesis_state()?;
        process_slots(&config, &mut state, 8 + 7)?;

        state.finalized_checkpoint.epoch = 1;

        process_shuffling_update(&mut state);

        assert_eq!(state.validator_registry_update_epoch, 1);
        assert_eq!(state.current_shuffling_epoch, 2);

        Ok(())
    }
}
