use anyhow::Error as AnyhowError;
use helper_functions::error::{Error as HelperError, SignatureKind};
use ssz::{IndexError, PushError, ReadError};
use thiserror::Error;
use types::phase0::{
    containers::{AttestationData, BeaconBlockHeader, Checkpoint, Deposit, Validator},
    primitives::{Epoch, Slot, ValidatorIndex, H256},
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("attestation data is not slashable (data_1: {data_1:?}, data_2: {data_2:?})")]
    AttestationDataNotSlashable {
        data_1: AttestationData,
        data_2: AttestationData,
    },
    #[error(
        "attestation in slot {attestation_slot} is outside \
         inclusion range for state at slot {state_slot}"
    )]
    AttestationOutsideInclusionRange {
        state_slot: Slot,
        attestation_slot: Slot,
    },
    #[error(
        "attestation source does not match justified checkpoint \
         (in_state: {in_state:?}, in_block: {in_block:?})"
    )]
    AttestationSourceMismatch {
        in_state: Checkpoint,
        in_block: Checkpoint,
    },
    #[error("attestation votes for a checkpoint in the wrong epoch: {data:?}")]
    AttestationTargetsWrongEpoch { data: AttestationData },
    #[error(
        "validator registry and balances differ in length \
         (validators: {validators}, balances: {balances})"
    )]
    BalancesLengthMismatch { validators: usize, balances: usize },
    #[error("block is not newer than latest block header ({block_slot} <= {block_header_slot})")]
    BlockNotNewerThanLatestBlockHeader {
        block_slot: Slot,
        block_header_slot: Slot,
    },
    #[error("deposit count is incorrect (computed: {computed}, in_block: {in_block})")]
    DepositCountMismatch { computed: u64, in_block: u64 },
    #[error("deposit proof is invalid: {deposit:?}")]
    DepositProofInvalid {
        // Boxed to pass `clippy::large_enum_variant`.
        deposit: Box<Deposit>,
    },
    #[error("epoch processing failed at the end of epoch {epoch}")]
    EpochProcessingFailed { epoch: Epoch },
    #[error("no attesters slashed")]
    NoAttestersSlashed,
    #[error("block parent root ({in_block:?}) does not match latest block header ({computed:?})")]
    ParentRootMismatch { computed: H256, in_block: H256 },
    #[error("proposer (validator {index}) is slashed")]
    ProposerSlashed { index: ValidatorIndex },
    #[error("proposer index is incorrect (in_block: {in_block}, computed: {computed})")]
    ProposerIndexMismatch {
        computed: ValidatorIndex,
        in_block: ValidatorIndex,
    },
    #[error("proposer (validator {index}) is not slashable: {proposer:?}")]
    ProposerNotSlashable {
        index: ValidatorIndex,
        proposer: Box<Validator>,
    },
    #[error("block headers in proposer slashing are identical: {header:?}")]
    ProposerSlashingHeadersIdentical { header: BeaconBlockHeader },
    #[error(
        "proposer indices in proposer slashing do not match \
         ({proposer_index_1} != {proposer_index_2})"
    )]
    ProposerSlashingProposerMismatch {
        proposer_index_1: ValidatorIndex,
        proposer_index_2: ValidatorIndex,
    },
    #[error("slots in proposer slashing do not match ({slot_1} != {slot_2})")]
    ProposerSlashingSlotMismatch { slot_1: Slot, slot_2: Slot },
    #[error("block slot ({block_slot}) does not match state slot ({state_slot})")]
    SlotMismatch { state_slot: Slot, block_slot: Slot },
    #[error("target slot ({target}) is not later than current slot ({current})")]
    SlotNotLater { current: Slot, target: Slot },
    #[error("state root in block ({in_block:?}) does not match state ({computed:?})")]
    StateRootMismatch { computed: H256, in_block: H256 },
    #[error("validator {index} exited in epoch {exit_epoch}")]
    ValidatorAlreadyExited {
        index: ValidatorIndex,
        exit_epoch: Epoch,
    },
    #[error(
        "validator {index} has not been active long enough \
         (activation_epoch: {activation_epoch}, current_epoch: {current_epoch})"
    )]
    ValidatorHasNotBeenActiveLongEnough {
        index: ValidatorIndex,
        activation_epoch: Epoch,
        current_epoch: Epoch,
    },
    #[error("validator {index} is not active in epoch {current_epoch}")]
    ValidatorNotActive {
        index: ValidatorIndex,
        current_epoch: Epoch,
    },
    #[error("voluntary exit is expired (epoch: {epoch}, current_epoch: {current_epoch})")]
    VoluntaryExitIsExpired { epoch: Epoch, current_epoch: Epoch },
}

/// Coarse classification of transition failures.
///
/// Blocks failing with [`ErrorKind::InvalidOperation`] or [`ErrorKind::InvalidBlock`] should be
/// rejected. [`ErrorKind::EpochInvariantViolation`] means the state itself is corrupt.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorKind {
    InvalidOperation,
    InvalidBlock,
    EpochInvariantViolation,
    OutOfRange,
}

impl ErrorKind {
    /// Classifies an error returned by any function in this crate.
    ///
    /// Context attached by epoch processing takes precedence over the underlying error.
    #[must_use]
    pub fn of(error: &AnyhowError) -> Self {
        if let Some(error) = error.downcast_ref::<Error>() {
            return Self::of_transition_error(error);
        }

        if let Some(error) = error.downcast_ref::<HelperError>() {
            return Self::of_helper_error(*error);
        }

        if error.is::<IndexError>() {
            return Self::OutOfRange;
        }

        if error.is::<PushError>() || error.is::<ReadError>() {
            return Self::InvalidBlock;
        }

        if error.is::<bls::Error>() {
            return Self::InvalidOperation;
        }

        Self::InvalidBlock
    }

    const fn of_transition_error(error: &Error) -> Self {
        match error {
            Error::BalancesLengthMismatch { .. } | Error::EpochProcessingFailed { .. } => {
                Self::EpochInvariantViolation
            }
            Error::BlockNotNewerThanLatestBlockHeader { .. }
            | Error::DepositCountMismatch { .. }
            | Error::ParentRootMismatch { .. }
            | Error::ProposerIndexMismatch { .. }
            | Error::ProposerSlashed { .. }
            | Error::SlotMismatch { .. }
            | Error::StateRootMismatch { .. } => Self::InvalidBlock,
            Error::SlotNotLater { .. } => Self::OutOfRange,
            _ => Self::InvalidOperation,
        }
    }

    const fn of_helper_error(error: HelperError) -> Self {
        match error {
            HelperError::EmptyCommittee { .. } => Self::EpochInvariantViolation,
            HelperError::EpochOutOfRange { .. }
            | HelperError::EpochOverflow
            | HelperError::SlotNotInEpoch { .. }
            | HelperError::SlotOutOfRange { .. } => Self::OutOfRange,
            // A failed batch cannot be attributed to a single operation.
            HelperError::SignatureInvalid(
                SignatureKind::Block | SignatureKind::Multi | SignatureKind::Randao,
            ) => Self::InvalidBlock,
            _ => Self::InvalidOperation,
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use test_case::test_case;

    use super::*;

    #[test_case(
        Error::StateRootMismatch { computed: H256::zero(), in_block: H256::repeat_byte(1) }.into()
        => ErrorKind::InvalidBlock;
        "state root mismatch"
    )]
    #[test_case(Error::NoAttestersSlashed.into() => ErrorKind::InvalidOperation; "no attesters")]
    #[test_case(
        HelperError::SignatureInvalid(SignatureKind::Attestation).into()
        => ErrorKind::InvalidOperation;
        "attestation signature"
    )]
    #[test_case(
        HelperError::SignatureInvalid(SignatureKind::Randao).into() => ErrorKind::InvalidBlock;
        "randao reveal"
    )]
    #[test_case(
        HelperError::SignatureInvalid(SignatureKind::Multi).into() => ErrorKind::InvalidBlock;
        "signature batch"
    )]
    #[test_case(
        HelperError::EpochOutOfRange { epoch: 9, current_epoch: 1 }.into()
        => ErrorKind::OutOfRange;
        "seed out of range"
    )]
    #[test_case(IndexError { index: 5, length: 2 }.into() => ErrorKind::OutOfRange; "index")]
    #[test_case(anyhow!("unexpected") => ErrorKind::InvalidBlock; "unknown error")]
    fn errors_are_classified(error: AnyhowError) -> ErrorKind {
        ErrorKind::of(&error)
    }

    #[test]
    fn epoch_context_takes_precedence() {
        let error = AnyhowError::new(IndexError {
            index: 5,
            length: 2,
        })
        .context(Error::EpochProcessingFailed { epoch: 3 });

        assert_eq!(ErrorKind::of(&error), ErrorKind::EpochInvariantViolation);
    }
}
