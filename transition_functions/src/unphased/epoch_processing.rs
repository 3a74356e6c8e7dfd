use anyhow::Result;
use arithmetic::U64Ext as _;
use helper_functions::{
    accessors::{
        get_block_root, get_current_epoch, get_next_epoch, get_previous_epoch, get_randao_mix,
        get_total_active_balance, get_validator_churn_limit,
    },
    misc::compute_activation_exit_epoch,
    mutators::{decrease_balance, initiate_validator_exit},
    predicates::{is_active_validator, is_eligible_for_activation, is_eligible_for_activation_queue},
};
use itertools::Itertools as _;
use log::debug;
use ssz::SszHash as _;
use typenum::Unsigned as _;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        consts::GENESIS_EPOCH,
        containers::{Checkpoint, HistoricalBatch},
        primitives::Gwei,
    },
    preset::Preset,
};

pub fn process_registry_updates<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
) -> Result<()> {
    let current_epoch = get_current_epoch(state);
    let next_epoch = get_next_epoch(state);

    // The indices collected in these do not overlap.
    let mut eligible_for_activation_queue = vec![];
    let mut ejections = vec![];
    let mut activation_queue = vec![];

    for (validator, validator_index) in state.validators.iter().zip(0..) {
        if is_eligible_for_activation_queue::<P>(validator) {
            eligible_for_activation_queue.push(validator_index);
        }

        if is_active_validator(validator, current_epoch)
            && validator.effective_balance <= config.ejection_balance
        {
            ejections.push(validator_index);
        }

        if is_eligible_for_activation(state, validator) {
            activation_queue.push((validator_index, validator.activation_eligibility_epoch));
        }
    }

    // > Process activation eligibility and ejections
    for validator_index in eligible_for_activation_queue {
        state
            .validators
            .get_mut(validator_index)?
            .activation_eligibility_epoch = next_epoch;
    }

    for validator_index in ejections {
        initiate_validator_exit(config, state, validator_index)?;
    }

    // > Queue validators eligible for activation and not yet dequeued for activation
    let activation_queue = activation_queue
        .into_iter()
        .sorted_unstable_by_key(|&(validator_index, activation_eligibility_epoch)| {
            // > Order by the sequence of activation_eligibility_epoch setting and then index
            (activation_eligibility_epoch, validator_index)
        })
        .map(|(validator_index, _)| validator_index);

    // > Dequeued validators for activation up to churn limit
    let churn_limit = get_validator_churn_limit(config, state).try_into()?;
    let activation_exit_epoch = compute_activation_exit_epoch::<P>(current_epoch);

    for validator_index in activation_queue.take(churn_limit) {
        state.validators.get_mut(validator_index)?.activation_epoch = activation_exit_epoch;
    }

    Ok(())
}

pub fn process_slashings<P: Preset>(state: &mut BeaconState<P>) -> Result<()> {
    let epoch = get_current_epoch(state);
    let total_balance = get_total_active_balance(state);
    let slashings_sum = state.slashings.iter().sum::<Gwei>();

    let adjusted_total_slashing_balance =
        (slashings_sum * P::PROPORTIONAL_SLASHING_MULTIPLIER).min(total_balance);

    let penalized_epoch = epoch + P::EpochsPerSlashingsVector::U64 / 2;

    let penalties = (0..)
        .zip(state.validators.iter())
        .filter(|(_, validator)| {
            validator.slashed && validator.withdrawable_epoch == penalized_epoch
        })
        .map(|(validator_index, validator)| {
            let penalty = slashing_penalty::<P>(
                validator.effective_balance,
                adjusted_total_slashing_balance,
                total_balance,
            );

            (validator_index, penalty)
        })
        .collect_vec();

    for (validator_index, penalty) in penalties {
        decrease_balance(state.balances.get_mut(validator_index)?, penalty);
    }

    Ok(())
}

// `total_balance` is floored at `EFFECTIVE_BALANCE_INCREMENT` by `get_total_active_balance`.
fn slashing_penalty<P: Preset>(
    effective_balance: Gwei,
    adjusted_total_slashing_balance: Gwei,
    total_balance: Gwei,
) -> Gwei {
    let increment = P::EFFECTIVE_BALANCE_INCREMENT;

    let penalty_numerator = effective_balance / increment * adjusted_total_slashing_balance;

    penalty_numerator / total_balance.max(1) * increment.get()
}

pub fn process_eth1_data_reset<P: Preset>(state: &mut BeaconState<P>) {
    let next_epoch = get_next_epoch(state);

    // > Reset eth1 data votes
    if next_epoch.mod_typenum::<P::EpochsPerEth1VotingPeriod>() == 0 {
        state.eth1_data_votes.clear();
    }
}

pub fn process_effective_balance_updates<P: Preset>(state: &mut BeaconState<P>) {
    let hysteresis_increment = P::EFFECTIVE_BALANCE_INCREMENT.get() / P::HYSTERESIS_QUOTIENT;
    let downward_threshold = hysteresis_increment * P::HYSTERESIS_DOWNWARD_MULTIPLIER;
    let upward_threshold = hysteresis_increment * P::HYSTERESIS_UPWARD_MULTIPLIER;

    // > Update effective balances with hysteresis
    for (validator, balance) in state.validators.iter_mut().zip(state.balances.iter().copied()) {
        let below = balance + downward_threshold < validator.effective_balance;
        let above = validator.effective_balance + upward_threshold < balance;

        if below || above {
            validator.effective_balance = balance
                .prev_multiple_of(P::EFFECTIVE_BALANCE_INCREMENT)
                .min(P::MAX_EFFECTIVE_BALANCE);
        }
    }
}

pub fn process_slashings_reset<P: Preset>(state: &mut BeaconState<P>) {
    let next_epoch = get_next_epoch(state);

    // > Reset slashings
    *state.slashings.mod_index_mut(next_epoch) = 0;
}

pub fn process_randao_mixes_reset<P: Preset>(state: &mut BeaconState<P>) {
    let current_epoch = get_current_epoch(state);
    let next_epoch = get_next_epoch(state);

    // > Set randao mix
    *state.randao_mixes.mod_index_mut(next_epoch) = get_randao_mix(state, current_epoch);
}

pub fn process_historical_roots_update<P: Preset>(state: &mut BeaconState<P>) -> Result<()> {
    let next_epoch = get_next_epoch(state);

    // > Set historical root accumulator
    if next_epoch.mod_typenum::<P::EpochsPerHistoricalRoot>() == 0 {
        let historical_batch = HistoricalBatch::<P> {
            block_roots: state.block_roots.clone(),
            state_roots: state.state_roots.clone(),
        };

        state
            .historical_roots
            .push(historical_batch.hash_tree_root())?;
    }

    Ok(())
}

pub fn weigh_justification_and_finalization<P: Preset>(
    state: &mut BeaconState<P>,
    current_epoch_active_balance: Gwei,
    previous_epoch_target_balance: Gwei,
    current_epoch_target_balance: Gwei,
) -> Result<()> {
    let previous_epoch = get_previous_epoch(state);
    let current_epoch = get_current_epoch(state);
    let old_previous_justified_checkpoint = state.previous_justified_checkpoint;
    let old_current_justified_checkpoint = state.current_justified_checkpoint;
    let old_finalized_checkpoint = state.finalized_checkpoint;

    // > Process justifications
    state.previous_justified_checkpoint = state.current_justified_checkpoint;
    state.justification_bits.shift_up_by_1();

    let is_supermajority = |target_balance: Gwei| {
        u128::from(target_balance) * 3 >= u128::from(current_epoch_active_balance) * 2
    };

    if is_supermajority(previous_epoch_target_balance) {
        state.current_justified_checkpoint = Checkpoint {
            epoch: previous_epoch,
            root: get_block_root(state, previous_epoch)?,
        };

        state.justification_bits.set(1, true);
    }

    if is_supermajority(current_epoch_target_balance) {
        state.current_justified_checkpoint = Checkpoint {
            epoch: current_epoch,
            root: get_block_root(state, current_epoch)?,
        };

        state.justification_bits.set(0, true);
    }

    // > Process finalizations
    let bits = &state.justification_bits;

    // > The 2nd/3rd/4th most recent epochs are justified, the 2nd using the 4th as source
    if bits.all_in(1..4) && old_previous_justified_checkpoint.epoch + 3 == current_epoch {
        state.finalized_checkpoint = old_previous_justified_checkpoint;
    }

    // > The 2nd/3rd most recent epochs are justified, the 2nd using the 3rd as source
    if bits.all_in(1..3) && old_previous_justified_checkpoint.epoch + 2 == current_epoch {
        state.finalized_checkpoint = old_previous_justified_checkpoint;
    }

    // > The 1st/2nd/3rd most recent epochs are justified, the 1st using the 3rd as source
    if bits.all_in(0..3) && old_current_justified_checkpoint.epoch + 2 == current_epoch {
        state.finalized_checkpoint = old_current_justified_checkpoint;
    }

    // > The 1st/2nd most recent epochs are justified, the 1st using the 2nd as source
    if bits.all_in(0..2) && old_current_justified_checkpoint.epoch + 1 == current_epoch {
        state.finalized_checkpoint = old_current_justified_checkpoint;
    }

    if state.current_justified_checkpoint != old_current_justified_checkpoint {
        debug!(
            "justified checkpoint changed at end of epoch {current_epoch}: {:?}",
            state.current_justified_checkpoint,
        );
    }

    if state.finalized_checkpoint != old_finalized_checkpoint {
        debug!(
            "finalized checkpoint changed at end of epoch {current_epoch}: {:?}",
            state.finalized_checkpoint,
        );
    }

    Ok(())
}

pub fn should_process_justification_and_finalization<P: Preset>(state: &BeaconState<P>) -> bool {
    // > Initial FFG checkpoint values have a `0x00` stub for `root`.
    // > Skip FFG updates in the first two epochs to avoid
    // > corner cases that might result in modifying this stub.
    GENESIS_EPOCH + 1 < get_current_epoch(state)
}

pub fn should_process_rewards_and_penalties<P: Preset>(state: &BeaconState<P>) -> bool {
    // > No rewards are applied at the end of `GENESIS_EPOCH`
    // > because rewards are for work done in the previous epoch
    GENESIS_EPOCH < get_current_epoch(state)
}
