use parse_display::Display;
use thiserror::Error;
use types::phase0::primitives::{CommitteeIndex, Epoch, Slot};

#[derive(Clone, Copy, Debug, Error)]
pub enum Error {
    #[error("attestation has no attesting indices")]
    AttestationHasNoAttestingIndices,
    #[error("attesting indices are not sorted and unique")]
    AttestingIndicesNotSortedAndUnique,
    #[error("committee index {index} is out of bounds ({committees_per_slot} committees per slot)")]
    CommitteeIndexOutOfBounds {
        index: CommitteeIndex,
        committees_per_slot: u64,
    },
    #[error(
        "aggregation bitlist length {aggregation_bitlist_length} \
         does not match committee length {committee_length}"
    )]
    CommitteeLengthMismatch {
        aggregation_bitlist_length: usize,
        committee_length: usize,
    },
    #[error("committee {index} at slot {slot} is empty")]
    EmptyCommittee { slot: Slot, index: CommitteeIndex },
    #[error("randao mix needed for epoch {epoch} is not retained at epoch {current_epoch}")]
    EpochOutOfRange { epoch: Epoch, current_epoch: Epoch },
    #[error("epoch number overflowed")]
    EpochOverflow,
    #[error("{0} is invalid")]
    SignatureInvalid(SignatureKind),
    #[error("slot {slot} is not in epoch {epoch}")]
    SlotNotInEpoch { slot: Slot, epoch: Epoch },
    #[error("block root for slot {slot} is not available at slot {state_slot}")]
    SlotOutOfRange { slot: Slot, state_slot: Slot },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum SignatureKind {
    #[display("attestation signature")]
    Attestation,
    #[display("block signature")]
    Block,
    #[display("deposit signature")]
    Deposit,
    #[display("collection of multiple signatures")]
    Multi,
    #[display("RANDAO reveal")]
    Randao,
    #[display("voluntary exit signature")]
    VoluntaryExit,
}
