use anyhow::{ensure, Error as AnyhowError, Result};
use bit_field::BitField as _;
use itertools::Itertools as _;
use types::{
    config::Config,
    phase0::{
        beacon_state::BeaconState,
        consts::FAR_FUTURE_EPOCH,
        containers::{AttestationData, IndexedAttestation, Validator},
        primitives::{Epoch, H256},
    },
    preset::Preset,
};

use crate::{
    accessors,
    error::{Error, SignatureKind},
    signing::SignForSingleFork as _,
    verifier::Verifier,
};

#[must_use]
pub const fn is_active_validator(validator: &Validator, epoch: Epoch) -> bool {
    validator.activation_epoch <= epoch && epoch < validator.exit_epoch
}

#[must_use]
pub const fn is_eligible_for_activation_queue<P: Preset>(validator: &Validator) -> bool {
    validator.activation_eligibility_epoch == FAR_FUTURE_EPOCH
        && validator.effective_balance == P::MAX_EFFECTIVE_BALANCE
}

/// Returns `true` if `validator` may be dequeued for activation.
///
/// Only validators whose eligibility has been finalized can be activated.
#[must_use]
pub fn is_eligible_for_activation<P: Preset>(
    state: &BeaconState<P>,
    validator: &Validator,
) -> bool {
    validator.activation_eligibility_epoch <= state.finalized_checkpoint.epoch
        && validator.activation_epoch == FAR_FUTURE_EPOCH
}

#[must_use]
pub const fn is_slashable_validator(validator: &Validator, epoch: Epoch) -> bool {
    !validator.slashed
        && validator.activation_epoch <= epoch
        && epoch < validator.withdrawable_epoch
}

/// Returns `true` if the two votes form a double vote or a surround vote.
#[must_use]
pub fn is_slashable_attestation_data(data_1: AttestationData, data_2: AttestationData) -> bool {
    let double_vote = data_1 != data_2 && data_1.target.epoch == data_2.target.epoch;

    let surround_vote = data_1.source.epoch < data_2.source.epoch
        && data_2.target.epoch < data_1.target.epoch;

    double_vote || surround_vote
}

pub fn validate_indexed_attestation<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    indexed_attestation: &IndexedAttestation<P>,
    mut verifier: impl Verifier,
) -> Result<()> {
    let indices = &indexed_attestation.attesting_indices;

    ensure!(!indices.is_empty(), Error::AttestationHasNoAttestingIndices);

    ensure!(
        indices.iter().tuple_windows().all(|(a, b)| a < b),
        Error::AttestingIndicesNotSortedAndUnique,
    );

    itertools::process_results(
        indices.iter().copied().map(|validator_index| {
            accessors::public_key(state, validator_index)?
                .decompress()
                .map_err(AnyhowError::new)
        }),
        |public_keys| {
            verifier.verify_aggregate(
                indexed_attestation.data.signing_root(config, state),
                indexed_attestation.signature,
                public_keys,
                SignatureKind::Attestation,
            )
        },
    )?
}

/// Checks that `leaf` is at position `index` in the tree with the given `root`.
///
/// `branch` lists sibling nodes from the bottom of the tree up.
#[must_use]
pub fn is_valid_merkle_branch(
    leaf: H256,
    branch: impl IntoIterator<Item = H256>,
    index: u64,
    root: H256,
) -> bool {
    let mut hash = leaf;

    for (height, node) in branch.into_iter().enumerate() {
        if index.get_bit(height) {
            hash = hashing::hash_256_256(node, hash);
        } else {
            hash = hashing::hash_256_256(hash, node);
        }
    }

    hash == root
}

#[must_use]
pub fn is_in_inactivity_leak<P: Preset>(state: &BeaconState<P>) -> bool {
    accessors::get_finality_delay(state) > P::MIN_EPOCHS_TO_INACTIVITY_PENALTY
}
