use core::{num::NonZeroU64, ops::Range};

use anyhow::{ensure, Result};
use arithmetic::U64Ext as _;
use ssz::SszHash;
use typenum::Unsigned as _;
use types::{
    config::Config,
    phase0::{
        consts::AttestationSubnetCount,
        containers::{ForkData, SigningData},
        primitives::{
            CommitteeIndex, Domain, DomainType, Epoch, Slot, SubnetId, ValidatorIndex, Version,
            H256,
        },
    },
    preset::Preset,
};

use crate::error::Error;

#[must_use]
pub fn compute_epoch_at_slot<P: Preset>(slot: Slot) -> Epoch {
    slot.div_typenum::<P::SlotsPerEpoch>()
}

#[must_use]
pub const fn compute_start_slot_at_epoch<P: Preset>(epoch: Epoch) -> Slot {
    epoch.saturating_mul(P::SlotsPerEpoch::U64)
}

#[must_use]
pub fn is_epoch_start<P: Preset>(slot: Slot) -> bool {
    slots_since_epoch_start::<P>(slot) == 0
}

#[must_use]
pub fn slots_since_epoch_start<P: Preset>(slot: Slot) -> u64 {
    slot.mod_typenum::<P::SlotsPerEpoch>()
}

#[must_use]
pub const fn slots_in_epoch<P: Preset>(epoch: Epoch) -> Range<Slot> {
    compute_start_slot_at_epoch::<P>(epoch)..compute_start_slot_at_epoch::<P>(epoch + 1)
}

#[must_use]
pub const fn compute_activation_exit_epoch<P: Preset>(epoch: Epoch) -> Epoch {
    epoch + 1 + P::MAX_SEED_LOOKAHEAD
}

#[must_use]
pub fn committee_count_from_active_validator_count<P: Preset>(active_validator_count: u64) -> u64 {
    active_validator_count
        .div_typenum::<P::SlotsPerEpoch>()
        / P::TARGET_COMMITTEE_SIZE
}

/// Number of committees per slot, clamped to `[1, MAX_COMMITTEES_PER_SLOT]`.
#[must_use]
pub fn committees_per_slot<P: Preset>(active_validator_count: u64) -> u64 {
    committee_count_from_active_validator_count::<P>(active_validator_count)
        .clamp(1, P::MAX_COMMITTEES_PER_SLOT.get())
}

pub fn compute_subnet_for_attestation<P: Preset>(
    committees_per_slot: u64,
    slot: Slot,
    committee_index: CommitteeIndex,
) -> Result<SubnetId> {
    ensure!(
        committee_index < committees_per_slot,
        Error::CommitteeIndexOutOfBounds {
            index: committee_index,
            committees_per_slot,
        },
    );

    let committees_since_epoch_start = committees_per_slot * slots_since_epoch_start::<P>(slot);

    Ok((committees_since_epoch_start + committee_index).mod_typenum::<AttestationSubnetCount>())
}

pub fn compute_shuffled_index<P: Preset>(
    index: ValidatorIndex,
    index_count: NonZeroU64,
    seed: H256,
) -> Result<ValidatorIndex> {
    shuffling::shuffle_single::<P>(index, index_count, seed)
}

fn compute_fork_data_root(current_version: Version, genesis_validators_root: H256) -> H256 {
    ForkData {
        current_version,
        genesis_validators_root,
    }
    .hash_tree_root()
}

/// Combines a domain type with a fork version.
///
/// Missing arguments default to the genesis fork version and a zero genesis validators root,
/// which is what deposits are signed with.
#[must_use]
pub fn compute_domain(
    config: &Config,
    domain_type: DomainType,
    fork_version: Option<Version>,
    genesis_validators_root: Option<H256>,
) -> Domain {
    let fork_version = fork_version.unwrap_or(config.genesis_fork_version);
    let genesis_validators_root = genesis_validators_root.unwrap_or_else(H256::zero);
    let fork_data_root = compute_fork_data_root(fork_version, genesis_validators_root);

    let mut domain = Domain::zero();
    domain[..DomainType::len_bytes()].copy_from_slice(domain_type.as_bytes());
    domain[DomainType::len_bytes()..]
        .copy_from_slice(&fork_data_root[..Domain::len_bytes() - DomainType::len_bytes()]);
    domain
}

#[must_use]
pub fn compute_signing_root(object: &(impl SszHash + ?Sized), domain: Domain) -> H256 {
    SigningData {
        object_root: object.hash_tree_root(),
        domain,
    }
    .hash_tree_root()
}

#[cfg(test)]
mod tests {
    use test_case::test_case;
    use types::{
        phase0::consts::DOMAIN_DEPOSIT,
        preset::{Mainnet, Minimal},
    };

    use super::*;

    #[test_case(0 => 0)]
    #[test_case(31 => 0)]
    #[test_case(32 => 1)]
    #[test_case(100 => 3)]
    fn epoch_at_slot_on_mainnet(slot: Slot) -> Epoch {
        compute_epoch_at_slot::<Mainnet>(slot)
    }

    #[test_case(0 => true)]
    #[test_case(7 => false)]
    #[test_case(8 => true)]
    fn epoch_start_on_minimal(slot: Slot) -> bool {
        is_epoch_start::<Minimal>(slot)
    }

    #[test_case(0 => 1; "no validators still get one committee")]
    #[test_case(32 * 128 => 1)]
    #[test_case(32 * 128 * 10 => 10)]
    #[test_case(32 * 128 * 100 => 64; "clamped to maximum")]
    fn committees_per_slot_on_mainnet(active_validator_count: u64) -> u64 {
        committees_per_slot::<Mainnet>(active_validator_count)
    }

    #[test]
    fn subnets_continue_across_slots() -> Result<()> {
        assert_eq!(compute_subnet_for_attestation::<Mainnet>(4, 0, 3)?, 3);
        assert_eq!(compute_subnet_for_attestation::<Mainnet>(4, 1, 0)?, 4);
        assert_eq!(compute_subnet_for_attestation::<Mainnet>(4, 17, 2)?, 6);
        assert!(compute_subnet_for_attestation::<Mainnet>(4, 1, 4).is_err());
        Ok(())
    }

    #[test]
    fn domain_starts_with_domain_type() {
        let domain = compute_domain(&Config::mainnet(), DOMAIN_DEPOSIT, None, None);

        assert_eq!(domain[..4], DOMAIN_DEPOSIT[..]);
        assert_ne!(domain[4..], [0; 28]);
    }
}
