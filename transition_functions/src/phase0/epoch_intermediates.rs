use core::num::NonZeroU64;

use anyhow::Result;
use helper_functions::{
    accessors::{
        get_attesting_indices, get_block_root, get_block_root_at_slot, get_committees,
        get_current_epoch, get_finality_delay, get_previous_epoch, CommitteeAssignment,
    },
    predicates::{is_active_validator, is_in_inactivity_leak},
};
use itertools::Itertools as _;
use num_integer::Roots as _;
use rayon::iter::{IndexedParallelIterator as _, IntoParallelRefIterator as _, ParallelIterator as _};
use ssz::IndexError;
use types::{
    phase0::{
        beacon_state::BeaconState,
        consts::BASE_REWARDS_PER_EPOCH,
        containers::{PendingAttestation, Validator},
        primitives::{Epoch, Gwei, ValidatorIndex},
    },
    preset::Preset,
};

/// Attesting balances of an epoch, in Gwei.
///
/// Every balance is at least `EFFECTIVE_BALANCE_INCREMENT`.
#[expect(clippy::struct_field_names)]
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Statistics {
    pub previous_epoch_source_attesting_balance: Gwei,
    pub previous_epoch_target_attesting_balance: Gwei,
    pub previous_epoch_head_attesting_balance: Gwei,
    pub current_epoch_active_balance: Gwei,
    pub current_epoch_target_attesting_balance: Gwei,
}

impl Statistics {
    fn accumulate_previous_epoch_attestation(
        &mut self,
        performance: &mut Performance,
        inclusion: Inclusion,
        target: bool,
        head: bool,
        effective_balance: Gwei,
    ) {
        if !performance.previous_epoch_matching_source() {
            self.previous_epoch_source_attesting_balance += effective_balance;
            performance.previous_epoch_match = Match::Source;
        }

        if !performance.previous_epoch_matching_target() && target {
            self.previous_epoch_target_attesting_balance += effective_balance;
            performance.previous_epoch_match = Match::Target;
        }

        if !performance.previous_epoch_matching_head() && target && head {
            self.previous_epoch_head_attesting_balance += effective_balance;
            performance.previous_epoch_match = Match::Head;
        }

        let fastest = performance
            .previous_epoch_fastest_inclusion
            .get_or_insert(inclusion);

        if inclusion.delay < fastest.delay {
            *fastest = inclusion;
        }
    }

    fn accumulate_current_epoch_attestation(
        &mut self,
        performance: &mut Performance,
        effective_balance: Gwei,
    ) {
        if !performance.current_epoch_matching_target {
            self.current_epoch_target_attesting_balance += effective_balance;
            performance.current_epoch_matching_target = true;
        }
    }

    fn clamp_balances<P: Preset>(&mut self) {
        let minimum = P::EFFECTIVE_BALANCE_INCREMENT.get();

        for balance in [
            &mut self.previous_epoch_source_attesting_balance,
            &mut self.previous_epoch_target_attesting_balance,
            &mut self.previous_epoch_head_attesting_balance,
            &mut self.current_epoch_active_balance,
            &mut self.current_epoch_target_attesting_balance,
        ] {
            *balance = (*balance).max(minimum);
        }
    }
}

/// The fields of a [`Validator`] needed to compute rewards and penalties.
#[derive(Clone, Copy, Default, Debug)]
pub struct ValidatorSummary {
    pub effective_balance: Gwei,
    pub slashed: bool,
    pub withdrawable_epoch: Epoch,
    pub eligible_for_penalties: bool,
}

impl ValidatorSummary {
    fn new(validator: &Validator, previous_epoch: Epoch) -> Self {
        let Validator {
            effective_balance,
            slashed,
            withdrawable_epoch,
            ..
        } = *validator;

        let eligible_for_penalties = is_active_validator(validator, previous_epoch)
            || (slashed && previous_epoch + 1 < withdrawable_epoch);

        Self {
            effective_balance,
            slashed,
            withdrawable_epoch,
            eligible_for_penalties,
        }
    }
}

#[derive(Clone, Copy, Default)]
pub struct Performance {
    previous_epoch_match: Match,
    previous_epoch_fastest_inclusion: Option<Inclusion>,
    current_epoch_matching_target: bool,
}

impl Performance {
    const fn previous_epoch_matching_source(self) -> bool {
        matches!(
            self.previous_epoch_match,
            Match::Source | Match::Target | Match::Head,
        )
    }

    const fn previous_epoch_matching_target(self) -> bool {
        matches!(self.previous_epoch_match, Match::Target | Match::Head)
    }

    const fn previous_epoch_matching_head(self) -> bool {
        matches!(self.previous_epoch_match, Match::Head)
    }
}

#[derive(Clone, Copy, Default)]
enum Match {
    #[default]
    None,
    Source,
    Target,
    Head,
}

#[derive(Clone, Copy, Debug)]
pub struct Inclusion {
    pub delay: NonZeroU64,
    pub proposer_index: ValidatorIndex,
}

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct EpochDeltas {
    pub reward: Gwei,
    pub penalty: Gwei,
}

/// Summarizes the validators and pending attestations of `state`.
///
/// `state` must be in the last slot of an epoch. Attesters that have been slashed are ignored.
pub fn statistics<P: Preset>(
    state: &BeaconState<P>,
) -> Result<(Statistics, Vec<ValidatorSummary>, Vec<Performance>)> {
    let current_epoch = get_current_epoch(state);
    let previous_epoch = get_previous_epoch(state);

    let mut statistics = Statistics::default();

    let summaries = state
        .validators
        .iter()
        .map(|validator| {
            if is_active_validator(validator, current_epoch) {
                statistics.current_epoch_active_balance += validator.effective_balance;
            }

            ValidatorSummary::new(validator, previous_epoch)
        })
        .collect_vec();

    let mut performance = vec![Performance::default(); summaries.len()];

    let current_committees = get_committees(state, current_epoch)?;

    let previous_committees = if previous_epoch == current_epoch {
        None
    } else {
        Some(get_committees(state, previous_epoch)?)
    };

    let previous_epoch_target_block_root = get_block_root(state, previous_epoch)?;

    for attestation in &state.previous_epoch_attestations {
        let expected_head = get_block_root_at_slot(state, attestation.data.slot)?;
        let target = attestation.data.target.root == previous_epoch_target_block_root;
        let head = attestation.data.beacon_block_root == expected_head;

        let inclusion = Inclusion {
            delay: NonZeroU64::try_from(attestation.inclusion_delay)?,
            proposer_index: attestation.proposer_index,
        };

        let committees = previous_committees.as_ref().unwrap_or(&current_committees);

        for validator_index in attesting_indices(committees, attestation)? {
            let index = usize::try_from(validator_index)?;
            let summary = summary_at(&summaries, validator_index)?;

            if summary.slashed {
                continue;
            }

            statistics.accumulate_previous_epoch_attestation(
                &mut performance[index],
                inclusion,
                target,
                head,
                summary.effective_balance,
            );
        }
    }

    let current_epoch_target_block_root = get_block_root(state, current_epoch)?;

    for attestation in &state.current_epoch_attestations {
        if attestation.data.target.root != current_epoch_target_block_root {
            continue;
        }

        for validator_index in attesting_indices(&current_committees, attestation)? {
            let index = usize::try_from(validator_index)?;
            let summary = summary_at(&summaries, validator_index)?;

            if summary.slashed {
                continue;
            }

            statistics.accumulate_current_epoch_attestation(
                &mut performance[index],
                summary.effective_balance,
            );
        }
    }

    statistics.clamp_balances::<P>();

    Ok((statistics, summaries, performance))
}

/// Computes the reward and penalty of every validator.
///
/// The deltas of each validator are computed in parallel. Proposer rewards are credited afterwards.
pub fn epoch_deltas<P: Preset>(
    state: &BeaconState<P>,
    statistics: Statistics,
    summaries: &[ValidatorSummary],
    performance: &[Performance],
) -> Result<Vec<EpochDeltas>> {
    let finality_delay = get_finality_delay(state);
    let in_inactivity_leak = is_in_inactivity_leak(state);
    let total_active_balance_sqrt = statistics.current_epoch_active_balance.sqrt().max(1);

    let own_deltas = summaries
        .par_iter()
        .zip(performance.par_iter())
        .map(|(summary, performance)| {
            let base_reward = summary.effective_balance * P::BASE_REWARD_FACTOR
                / total_active_balance_sqrt
                / BASE_REWARDS_PER_EPOCH;

            validator_deltas::<P>(
                statistics,
                *summary,
                *performance,
                base_reward,
                finality_delay,
                in_inactivity_leak,
            )
        })
        .collect::<Vec<_>>();

    let mut deltas = Vec::with_capacity(own_deltas.len());
    let mut proposer_rewards = vec![];

    for (validator_deltas, proposer_reward) in own_deltas {
        deltas.push(validator_deltas);
        proposer_rewards.extend(proposer_reward);
    }

    for (proposer_index, proposer_reward) in proposer_rewards {
        let length = deltas.len();

        usize::try_from(proposer_index)
            .ok()
            .and_then(|index| deltas.get_mut(index))
            .ok_or(IndexError {
                index: proposer_index,
                length,
            })?
            .reward += proposer_reward;
    }

    Ok(deltas)
}

fn validator_deltas<P: Preset>(
    statistics: Statistics,
    summary: ValidatorSummary,
    performance: Performance,
    base_reward: Gwei,
    finality_delay: u64,
    in_inactivity_leak: bool,
) -> (EpochDeltas, Option<(ValidatorIndex, Gwei)>) {
    let mut deltas = EpochDeltas::default();

    let attestation_component_reward = |attesting_balance: Gwei| {
        // > Factored out from balance totals to avoid uint64 overflow
        let increment = P::EFFECTIVE_BALANCE_INCREMENT;

        if in_inactivity_leak {
            // > Since full base reward will be canceled out by inactivity penalty deltas,
            // > optimal participation receives full base reward compensation here.
            base_reward
        } else {
            let reward_numerator = base_reward * (attesting_balance / increment);
            let reward_denominator = statistics.current_epoch_active_balance / increment;
            reward_numerator / reward_denominator.max(1)
        }
    };

    let proposer_reward = base_reward / P::PROPOSER_REWARD_QUOTIENT;

    if summary.eligible_for_penalties {
        let components = [
            (
                performance.previous_epoch_matching_source(),
                statistics.previous_epoch_source_attesting_balance,
            ),
            (
                performance.previous_epoch_matching_target(),
                statistics.previous_epoch_target_attesting_balance,
            ),
            (
                performance.previous_epoch_matching_head(),
                statistics.previous_epoch_head_attesting_balance,
            ),
        ];

        for (matching, attesting_balance) in components {
            if matching {
                deltas.reward += attestation_component_reward(attesting_balance);
            } else {
                deltas.penalty += base_reward;
            }
        }

        if in_inactivity_leak {
            // > If validator is performing optimally this cancels all rewards for a neutral
            // > balance
            deltas.penalty += BASE_REWARDS_PER_EPOCH.get() * base_reward - proposer_reward;

            if !performance.previous_epoch_matching_target() {
                deltas.penalty +=
                    summary.effective_balance * finality_delay / P::INACTIVITY_PENALTY_QUOTIENT;
            }
        }
    }

    let proposer_delta = performance
        .previous_epoch_fastest_inclusion
        .map(|inclusion| {
            let max_attester_reward = base_reward - proposer_reward;
            deltas.reward += max_attester_reward / inclusion.delay;
            (inclusion.proposer_index, proposer_reward)
        });

    (deltas, proposer_delta)
}

fn attesting_indices<'all, P: Preset>(
    committees: &'all CommitteeAssignment<P>,
    attestation: &'all PendingAttestation<P>,
) -> Result<impl Iterator<Item = ValidatorIndex> + 'all> {
    let committee = committees.committee(attestation.data.slot, attestation.data.index)?;
    get_attesting_indices::<P>(committee, &attestation.aggregation_bits)
}

fn summary_at(
    summaries: &[ValidatorSummary],
    validator_index: ValidatorIndex,
) -> Result<ValidatorSummary> {
    usize::try_from(validator_index)
        .ok()
        .and_then(|index| summaries.get(index))
        .copied()
        .ok_or_else(|| {
            IndexError {
                index: validator_index,
                length: summaries.len(),
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use types::preset::Minimal;

    use super::*;

    const EFFECTIVE_BALANCE: Gwei = 32_000_000_000;

    fn summary(eligible_for_penalties: bool) -> ValidatorSummary {
        ValidatorSummary {
            effective_balance: EFFECTIVE_BALANCE,
            eligible_for_penalties,
            ..ValidatorSummary::default()
        }
    }

    fn statistics_with_full_participation(total: Gwei) -> Statistics {
        Statistics {
            previous_epoch_source_attesting_balance: total,
            previous_epoch_target_attesting_balance: total,
            previous_epoch_head_attesting_balance: total,
            current_epoch_active_balance: total,
            current_epoch_target_attesting_balance: total,
        }
    }

    fn perfect_performance(proposer_index: ValidatorIndex) -> Performance {
        Performance {
            previous_epoch_match: Match::Head,
            previous_epoch_fastest_inclusion: Some(Inclusion {
                delay: NonZeroU64::MIN,
                proposer_index,
            }),
            current_epoch_matching_target: true,
        }
    }

    #[test]
    fn matches_are_cumulative() {
        let mut statistics = Statistics::default();
        let mut performance = Performance::default();

        let inclusion = |delay| Inclusion {
            delay: NonZeroU64::new(delay).expect("delay is nonzero"),
            proposer_index: delay,
        };

        statistics.accumulate_previous_epoch_attestation(
            &mut performance,
            inclusion(3),
            false,
            true,
            EFFECTIVE_BALANCE,
        );

        assert!(performance.previous_epoch_matching_source());
        assert!(!performance.previous_epoch_matching_head());

        statistics.accumulate_previous_epoch_attestation(
            &mut performance,
            inclusion(2),
            true,
            true,
            EFFECTIVE_BALANCE,
        );

        assert!(performance.previous_epoch_matching_head());
        assert_eq!(statistics.previous_epoch_source_attesting_balance, EFFECTIVE_BALANCE);
        assert_eq!(statistics.previous_epoch_target_attesting_balance, EFFECTIVE_BALANCE);
        assert_eq!(statistics.previous_epoch_head_attesting_balance, EFFECTIVE_BALANCE);

        let fastest = performance
            .previous_epoch_fastest_inclusion
            .expect("attestations were included");

        assert_eq!(fastest.delay.get(), 2);
        assert_eq!(fastest.proposer_index, 2);
    }

    #[test]
    fn full_participation_earns_every_component() {
        let total = 64 * EFFECTIVE_BALANCE;
        let statistics = statistics_with_full_participation(total);
        let base_reward = EFFECTIVE_BALANCE * 64 / total.sqrt() / 4;

        let (deltas, proposer_delta) = validator_deltas::<Minimal>(
            statistics,
            summary(true),
            perfect_performance(7),
            base_reward,
            1,
            false,
        );

        let proposer_reward = base_reward / 8;

        assert_eq!(deltas.penalty, 0);
        assert_eq!(deltas.reward, 3 * base_reward + base_reward - proposer_reward);
        assert_eq!(proposer_delta, Some((7, proposer_reward)));
    }

    #[test]
    fn missed_attestation_is_penalized_per_component() {
        let statistics = statistics_with_full_participation(64 * EFFECTIVE_BALANCE);

        let (deltas, proposer_delta) = validator_deltas::<Minimal>(
            statistics,
            summary(true),
            Performance::default(),
            1000,
            1,
            false,
        );

        assert_eq!(deltas, EpochDeltas { reward: 0, penalty: 3000 });
        assert_eq!(proposer_delta, None);
    }

    #[test]
    fn inactivity_leak_penalizes_non_target_attesters() {
        let statistics = statistics_with_full_participation(64 * EFFECTIVE_BALANCE);
        let finality_delay = 10;

        let (deltas, _) = validator_deltas::<Minimal>(
            statistics,
            summary(true),
            Performance::default(),
            1000,
            finality_delay,
            true,
        );

        let canceling_penalty = 4 * 1000 - 1000 / 8;
        let inactivity_penalty =
            EFFECTIVE_BALANCE * finality_delay / Minimal::INACTIVITY_PENALTY_QUOTIENT;

        assert_eq!(deltas.reward, 0);
        assert_eq!(
            deltas.penalty,
            3 * 1000 + canceling_penalty + inactivity_penalty,
        );
    }

    #[test]
    fn ineligible_validators_are_not_penalized() {
        let statistics = statistics_with_full_participation(64 * EFFECTIVE_BALANCE);

        let (deltas, _) = validator_deltas::<Minimal>(
            statistics,
            summary(false),
            Performance::default(),
            1000,
            1,
            true,
        );

        assert_eq!(deltas, EpochDeltas::default());
    }

    #[test]
    fn proposer_rewards_are_credited_to_proposers() -> Result<()> {
        let state = BeaconState::<Minimal>::default();
        let statistics = statistics_with_full_participation(2 * EFFECTIVE_BALANCE);
        let summaries = [summary(true), summary(true)];
        let performance = [perfect_performance(1), perfect_performance(1)];

        let deltas = epoch_deltas(&state, statistics, &summaries, &performance)?;

        assert!(deltas[1].reward > deltas[0].reward);
        assert_eq!(deltas[0].penalty, 0);

        Ok(())
    }

    #[test]
    fn proposer_outside_registry_is_rejected() {
        let state = BeaconState::<Minimal>::default();
        let statistics = statistics_with_full_participation(EFFECTIVE_BALANCE);

        let result = epoch_deltas(
            &state,
            statistics,
            &[summary(true)],
            &[perfect_performance(5)],
        );

        assert!(result.is_err());
    }
}
