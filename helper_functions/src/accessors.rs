use core::marker::PhantomData;
use std::sync::Arc;

use anyhow::{ensure, Result};
use arithmetic::U64Ext as _;
use bls::{CachedPublicKey, PublicKeyBytes};
use derivative::Derivative;
use itertools::{EitherOrBoth, Itertools as _};
use ssz::{BitList, ContiguousList, SszHash as _};
use typenum::Unsigned as _;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        consts::{AttestationSubnetCount, DOMAIN_BEACON_ATTESTER, GENESIS_EPOCH},
        containers::{Attestation, AttesterSlashing, IndexedAttestation},
        primitives::{
            CommitteeIndex, Domain, DomainType, Epoch, Gwei, Slot, SubnetId, ValidatorIndex, H256,
        },
    },
    preset::Preset,
};

use crate::{error::Error, misc, predicates};

#[must_use]
pub fn get_current_epoch<P: Preset>(state: &BeaconState<P>) -> Epoch {
    misc::compute_epoch_at_slot::<P>(state.slot)
}

#[must_use]
pub fn get_previous_epoch<P: Preset>(state: &BeaconState<P>) -> Epoch {
    get_current_epoch(state).saturating_sub(1).max(GENESIS_EPOCH)
}

#[must_use]
pub fn get_next_epoch<P: Preset>(state: &BeaconState<P>) -> Epoch {
    get_current_epoch(state) + 1
}

#[must_use]
pub fn get_finality_delay<P: Preset>(state: &BeaconState<P>) -> u64 {
    get_previous_epoch(state) - state.finalized_checkpoint.epoch
}

pub fn get_block_root<P: Preset>(state: &BeaconState<P>, epoch: Epoch) -> Result<H256> {
    get_block_root_at_slot(state, misc::compute_start_slot_at_epoch::<P>(epoch))
}

pub fn get_block_root_at_slot<P: Preset>(state: &BeaconState<P>, slot: Slot) -> Result<H256> {
    ensure!(
        slot < state.slot && state.slot <= slot + P::SlotsPerHistoricalRoot::U64,
        Error::SlotOutOfRange {
            slot,
            state_slot: state.slot,
        },
    );

    Ok(*state.block_roots.mod_index(slot))
}

/// Root of the block most recently applied to `state`.
///
/// The header cached in the state has a zero state root until the next slot is processed.
#[must_use]
pub fn latest_block_root<P: Preset>(state: &BeaconState<P>) -> H256 {
    let mut header = state.latest_block_header;

    if header.state_root.is_zero() {
        header.state_root = state.hash_tree_root();
    }

    header.hash_tree_root()
}

#[must_use]
pub fn get_randao_mix<P: Preset>(state: &BeaconState<P>, epoch: Epoch) -> H256 {
    *state.randao_mixes.mod_index(epoch)
}

/// Derives the seed for `epoch` from the RANDAO mix `MIN_SEED_LOOKAHEAD + 1` epochs before it.
///
/// Fails if that mix has already been overwritten or has not been produced yet.
pub fn get_seed<P: Preset>(
    state: &BeaconState<P>,
    epoch: Epoch,
    domain_type: DomainType,
) -> Result<H256> {
    let current_epoch = get_current_epoch(state);
    let out_of_range = Error::EpochOutOfRange {
        epoch,
        current_epoch,
    };

    let mix_epoch_in_window = epoch
        .checked_add(P::EpochsPerHistoricalVector::U64)
        .and_then(|shifted| shifted.checked_sub(P::MIN_SEED_LOOKAHEAD + 1))
        .ok_or(out_of_range)?;

    ensure!(
        current_epoch < mix_epoch_in_window
            && mix_epoch_in_window <= current_epoch + P::EpochsPerHistoricalVector::U64,
        out_of_range,
    );

    let mix = get_randao_mix(state, mix_epoch_in_window);

    Ok(hashing::hash_32_64_256(domain_type.to_fixed_bytes(), epoch, mix))
}

#[must_use]
pub fn get_active_index_root<P: Preset>(state: &BeaconState<P>, epoch: Epoch) -> H256 {
    *state.active_index_roots.mod_index(epoch)
}

/// Root of the list of validators active at `epoch`, as stored in `active_index_roots`.
pub fn compute_active_index_root<P: Preset>(state: &BeaconState<P>, epoch: Epoch) -> Result<H256> {
    let indices = ContiguousList::<ValidatorIndex, P::ValidatorRegistryLimit>::try_from(
        get_active_validator_indices(state, epoch).collect_vec(),
    )?;

    Ok(indices.hash_tree_root())
}

pub fn get_active_validator_indices<P: Preset>(
    state: &BeaconState<P>,
    epoch: Epoch,
) -> impl Iterator<Item = ValidatorIndex> + '_ {
    (0..)
        .zip(state.validators.iter())
        .filter(move |(_, validator)| predicates::is_active_validator(validator, epoch))
        .map(|(index, _)| index)
}

/// Sums the effective balances of `indices`.
///
/// The result is at least `EFFECTIVE_BALANCE_INCREMENT` to avoid division by zero.
pub fn get_total_balance<P: Preset>(
    state: &BeaconState<P>,
    indices: impl IntoIterator<Item = ValidatorIndex>,
) -> Result<Gwei> {
    let total = indices
        .into_iter()
        .map(|index| Ok(state.validators.get(index)?.effective_balance))
        .sum::<Result<Gwei>>()?;

    Ok(total.max(P::EFFECTIVE_BALANCE_INCREMENT.get()))
}

#[must_use]
pub fn get_total_active_balance<P: Preset>(state: &BeaconState<P>) -> Gwei {
    let current_epoch = get_current_epoch(state);

    state
        .validators
        .iter()
        .filter(|validator| predicates::is_active_validator(validator, current_epoch))
        .map(|validator| validator.effective_balance)
        .sum::<Gwei>()
        .max(P::EFFECTIVE_BALANCE_INCREMENT.get())
}

#[must_use]
pub fn get_validator_churn_limit<P: Preset>(config: &Config, state: &BeaconState<P>) -> u64 {
    let active_validator_count: u64 = get_active_validator_indices(state, get_current_epoch(state))
        .count()
        .try_into()
        .unwrap_or(u64::MAX);

    (active_validator_count / config.churn_limit_quotient).max(config.min_per_epoch_churn_limit)
}

pub fn public_key<P: Preset>(
    state: &BeaconState<P>,
    validator_index: ValidatorIndex,
) -> Result<&CachedPublicKey> {
    Ok(&state.validators.get(validator_index)?.pubkey)
}

/// Looks up a validator by public key.
///
/// The registry is scanned linearly. Callers processing many deposits should build an index once.
#[must_use]
pub fn index_of_public_key<P: Preset>(
    state: &BeaconState<P>,
    public_key: PublicKeyBytes,
) -> Option<ValidatorIndex> {
    (0..)
        .zip(state.validators.iter())
        .find(|(_, validator)| validator.pubkey.to_bytes() == public_key)
        .map(|(index, _)| index)
}

/// Indices present in both attestations of an attester slashing.
///
/// Relies on attesting indices being sorted, which `validate_indexed_attestation` checks.
pub fn slashable_indices(
    attester_slashing: &AttesterSlashing<impl Preset>,
) -> impl Iterator<Item = ValidatorIndex> + '_ {
    let attesting_indices_1 = attester_slashing
        .attestation_1
        .attesting_indices
        .iter()
        .copied();

    let attesting_indices_2 = attester_slashing
        .attestation_2
        .attesting_indices
        .iter()
        .copied();

    attesting_indices_1
        .merge_join_by(attesting_indices_2, Ord::cmp)
        .filter_map(|either_or_both| match either_or_both {
            EitherOrBoth::Both(validator_index, _) => Some(validator_index),
            _ => None,
        })
}

/// Computes the signature domain for `domain_type` at `epoch`, defaulting to the current epoch.
#[must_use]
pub fn get_domain<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    domain_type: DomainType,
    epoch: Option<Epoch>,
) -> Domain {
    let epoch = epoch.unwrap_or_else(|| get_current_epoch(state));

    let fork_version = if epoch < state.fork.epoch {
        state.fork.previous_version
    } else {
        state.fork.current_version
    };

    misc::compute_domain(
        config,
        domain_type,
        Some(fork_version),
        Some(state.genesis_validators_root),
    )
}

/// Shuffled committees of a single epoch.
///
/// Computing the shuffling is expensive, so the assignment is computed once and queried for every
/// slot and committee index of the epoch.
#[derive(Derivative)]
#[derivative(Clone(bound = ""), Debug(bound = ""))]
pub struct CommitteeAssignment<P: Preset> {
    epoch: Epoch,
    seed: H256,
    committees_per_slot: u64,
    shuffled_indices: Arc<[ValidatorIndex]>,
    #[derivative(Debug = "ignore")]
    phantom: PhantomData<P>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Committee<'assignment> {
    pub slot: Slot,
    pub index: CommitteeIndex,
    pub subnet_id: SubnetId,
    pub validator_indices: &'assignment [ValidatorIndex],
}

impl<P: Preset> CommitteeAssignment<P> {
    fn new(epoch: Epoch, seed: H256, shuffled_indices: Arc<[ValidatorIndex]>) -> Result<Self> {
        let active_validator_count = shuffled_indices.len().try_into()?;

        Ok(Self {
            epoch,
            seed,
            committees_per_slot: misc::committees_per_slot::<P>(active_validator_count),
            shuffled_indices,
            phantom: PhantomData,
        })
    }

    #[must_use]
    pub const fn epoch(&self) -> Epoch {
        self.epoch
    }

    #[must_use]
    pub const fn seed(&self) -> H256 {
        self.seed
    }

    #[must_use]
    pub const fn committees_per_slot(&self) -> u64 {
        self.committees_per_slot
    }

    #[must_use]
    pub fn shuffled_indices(&self) -> &[ValidatorIndex] {
        &self.shuffled_indices
    }

    pub fn committee(&self, slot: Slot, index: CommitteeIndex) -> Result<&[ValidatorIndex]> {
        ensure!(
            misc::compute_epoch_at_slot::<P>(slot) == self.epoch,
            Error::SlotNotInEpoch {
                slot,
                epoch: self.epoch,
            },
        );

        ensure!(
            index < self.committees_per_slot,
            Error::CommitteeIndexOutOfBounds {
                index,
                committees_per_slot: self.committees_per_slot,
            },
        );

        Ok(self.committee_at(self.position(slot, index)))
    }

    /// Iterates over all committees of the epoch in (slot, committee index) order.
    pub fn iter(&self) -> impl Iterator<Item = Committee<'_>> {
        misc::slots_in_epoch::<P>(self.epoch)
            .cartesian_product(0..self.committees_per_slot)
            .map(|(slot, index)| {
                let position = self.position(slot, index);

                Committee {
                    slot,
                    index,
                    subnet_id: position.mod_typenum::<AttestationSubnetCount>(),
                    validator_indices: self.committee_at(position),
                }
            })
    }

    /// Selects the proposer for `slot` from the first committee of that slot.
    pub fn proposer_index(&self, slot: Slot) -> Result<ValidatorIndex> {
        let committee = self.committee(slot, 0)?;
        let length: u64 = committee.len().try_into()?;

        ensure!(length > 0, Error::EmptyCommittee { slot, index: 0 });

        Ok(committee[usize::try_from(slot % length)?])
    }

    // Committees are numbered consecutively across the epoch.
    fn position(&self, slot: Slot, index: CommitteeIndex) -> u64 {
        self.committees_per_slot * misc::slots_since_epoch_start::<P>(slot) + index
    }

    fn committee_at(&self, position: u64) -> &[ValidatorIndex] {
        let committee_count = self.committees_per_slot * P::SlotsPerEpoch::U64;
        let length = self.shuffled_indices.len();

        // `position < committee_count`, so both bounds are at most `length`.
        let bound = |position: u64| {
            let position = usize::try_from(position).unwrap_or(usize::MAX);
            let committee_count = usize::try_from(committee_count).unwrap_or(usize::MAX);
            length * position / committee_count
        };

        &self.shuffled_indices[bound(position)..bound(position + 1)]
    }
}

/// Shuffles the validators active at `epoch` and splits them into committees.
///
/// `epoch` may be at most one epoch ahead of the state.
pub fn get_committees<P: Preset>(
    state: &BeaconState<P>,
    epoch: Epoch,
) -> Result<CommitteeAssignment<P>> {
    let current_epoch = get_current_epoch(state);

    ensure!(
        epoch <= current_epoch + 1,
        Error::EpochOutOfRange {
            epoch,
            current_epoch,
        },
    );

    let seed = get_seed(state, epoch, DOMAIN_BEACON_ATTESTER)?;
    let mut indices = get_active_validator_indices(state, epoch).collect_vec();

    shuffling::shuffle_slice::<P, _>(&mut indices, seed)?;

    CommitteeAssignment::new(epoch, seed, indices.into())
}

pub fn get_beacon_proposer_index<P: Preset>(
    state: &BeaconState<P>,
    slot: Slot,
) -> Result<ValidatorIndex> {
    get_committees(state, misc::compute_epoch_at_slot::<P>(slot))?.proposer_index(slot)
}

/// Selects the members of `committee` whose bits are set in `aggregation_bits`.
pub fn get_attesting_indices<'all, P: Preset>(
    committee: &'all [ValidatorIndex],
    aggregation_bits: &'all BitList<P::MaxValidatorsPerCommittee>,
) -> Result<impl Iterator<Item = ValidatorIndex> + 'all> {
    ensure!(
        committee.len() == aggregation_bits.len(),
        Error::CommitteeLengthMismatch {
            aggregation_bitlist_length: aggregation_bits.len(),
            committee_length: committee.len(),
        },
    );

    Ok(committee
        .iter()
        .zip(aggregation_bits.iter().by_vals())
        .filter(|(_, bit)| *bit)
        .map(|(validator_index, _)| *validator_index))
}

pub fn get_indexed_attestation<P: Preset>(
    assignment: &CommitteeAssignment<P>,
    attestation: &Attestation<P>,
) -> Result<IndexedAttestation<P>> {
    let committee = assignment.committee(attestation.data.slot, attestation.data.index)?;

    let attesting_indices = get_attesting_indices::<P>(committee, &attestation.aggregation_bits)?
        .sorted_unstable()
        .collect_vec();

    Ok(IndexedAttestation {
        attesting_indices: attesting_indices.try_into()?,
        data: attestation.data,
        signature: attestation.signature,
    })
}

#[cfg(test)]
mod tests {
    use types::{
        phase0::containers::Validator,
        preset::{Mainnet, Minimal},
    };

    use super::*;

    fn active_validator(effective_balance: Gwei) -> Validator {
        Validator {
            effective_balance,
            exit_epoch: u64::MAX,
            withdrawable_epoch: u64::MAX,
            ..Validator::default()
        }
    }

    fn state_with_validators<P: Preset>(count: usize) -> BeaconState<P> {
        let mut state = BeaconState::<P>::default();

        for _ in 0..count {
            state
                .validators
                .push(active_validator(P::MAX_EFFECTIVE_BALANCE))
                .expect("test registries are far below the limit");

            state
                .balances
                .push(P::MAX_EFFECTIVE_BALANCE)
                .expect("test registries are far below the limit");
        }

        state
    }

    fn assignment_from(shuffled_indices: Vec<ValidatorIndex>) -> CommitteeAssignment<Minimal> {
        CommitteeAssignment::new(0, H256::zero(), shuffled_indices.into())
            .expect("test registries fit in u64")
    }

    #[test]
    fn proposer_is_selected_by_slot_from_first_committee() -> Result<()> {
        let mut shuffled_indices = (100..132).collect_vec();
        shuffled_indices[8..12].copy_from_slice(&[5, 12, 7, 30]);

        let assignment = assignment_from(shuffled_indices);

        assert_eq!(assignment.committee(2, 0)?, [5, 12, 7, 30]);
        assert_eq!(assignment.proposer_index(2)?, 7);

        Ok(())
    }

    #[test]
    fn proposer_selection_fails_on_empty_committee() {
        let assignment = assignment_from(vec![1, 2, 3]);

        assert!(assignment.committee(0, 0).is_ok_and(<[_]>::is_empty));
        assert!(assignment.proposer_index(0).is_err());
    }

    #[test]
    fn committee_lookup_rejects_other_epochs_and_indices() {
        let assignment = assignment_from((0..32).collect());

        assert!(assignment.committee(8, 0).is_err());
        assert!(assignment.committee(0, 1).is_err());
    }

    #[test]
    fn committees_partition_active_validators() -> Result<()> {
        let state = state_with_validators::<Minimal>(100);
        let assignment = get_committees(&state, 0)?;

        assert_eq!(assignment.committees_per_slot(), 3);

        let members = assignment
            .iter()
            .flat_map(|committee| committee.validator_indices)
            .copied()
            .sorted()
            .collect_vec();

        assert_eq!(members, (0..100).collect_vec());

        Ok(())
    }

    #[test]
    fn committees_are_tagged_with_consecutive_subnets() -> Result<()> {
        let state = state_with_validators::<Mainnet>(64);
        let assignment = get_committees(&state, 0)?;

        let subnets = assignment
            .iter()
            .map(|committee| committee.subnet_id)
            .collect_vec();

        assert_eq!(subnets, (0..32).collect_vec());

        Ok(())
    }

    #[test]
    fn committees_are_not_computed_too_far_ahead() {
        let state = state_with_validators::<Minimal>(8);

        assert!(get_committees(&state, 1).is_ok());
        assert!(get_committees(&state, 2).is_err());
    }

    #[test]
    fn seed_is_unavailable_once_mix_is_overwritten() {
        let mut state = BeaconState::<Minimal>::default();

        state.slot = misc::compute_start_slot_at_epoch::<Minimal>(100);

        assert!(get_seed(&state, 100, DOMAIN_BEACON_ATTESTER).is_ok());
        assert!(get_seed(&state, 101, DOMAIN_BEACON_ATTESTER).is_ok());
        assert!(get_seed(&state, 39, DOMAIN_BEACON_ATTESTER).is_ok());
        assert!(get_seed(&state, 38, DOMAIN_BEACON_ATTESTER).is_err());
        assert!(get_seed(&state, 164, DOMAIN_BEACON_ATTESTER).is_err());
    }

    #[test]
    fn seeds_differ_by_epoch_and_domain() -> Result<()> {
        let state = BeaconState::<Minimal>::default();

        let attester = get_seed(&state, 0, DOMAIN_BEACON_ATTESTER)?;
        let other_epoch = get_seed(&state, 1, DOMAIN_BEACON_ATTESTER)?;
        let other_domain = get_seed(&state, 0, DomainType::repeat_byte(9))?;

        assert_ne!(attester, other_epoch);
        assert_ne!(attester, other_domain);

        Ok(())
    }

    #[test]
    fn attesting_indices_require_matching_length() -> Result<()> {
        let committee = [4, 8, 15];
        let bits = BitList::try_from([true, false, true])?;

        assert_eq!(
            get_attesting_indices::<Minimal>(&committee, &bits)?.collect_vec(),
            [4, 15],
        );

        let short = BitList::try_from([true, false])?;

        assert!(get_attesting_indices::<Minimal>(&committee, &short).is_err());

        Ok(())
    }

    #[test]
    fn total_balance_has_a_floor() -> Result<()> {
        let state = state_with_validators::<Minimal>(2);

        assert_eq!(get_total_balance(&state, [])?, 1_000_000_000);
        assert_eq!(get_total_balance(&state, [0, 1])?, 64_000_000_000);
        assert!(get_total_balance(&state, [2]).is_err());

        Ok(())
    }

    #[test]
    fn slashable_indices_are_the_intersection() -> Result<()> {
        let attestation = |indices: [ValidatorIndex; 4]| -> Result<IndexedAttestation<Minimal>> {
            Ok(IndexedAttestation {
                attesting_indices: indices.try_into()?,
                ..IndexedAttestation::default()
            })
        };

        let attester_slashing = AttesterSlashing {
            attestation_1: attestation([1, 3, 5, 8])?,
            attestation_2: attestation([2, 3, 8, 9])?,
        };

        itertools::assert_equal(slashable_indices(&attester_slashing), [3, 8]);

        Ok(())
    }
}
