use thiserror::Error;
use types::phase0::{
    containers::Checkpoint,
    primitives::{Epoch, Slot, H256},
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("anchor block is not at the start of an epoch (slot: {slot})")]
    AnchorNotAtEpochStart { slot: Slot },
    #[error(
        "attestation is not from a past slot \
         (attestation slot: {attestation_slot}, current slot: {current_slot})"
    )]
    AttestationFromCurrentOrFutureSlot {
        attestation_slot: Slot,
        current_slot: Slot,
    },
    #[error(
        "attestation votes for a block newer than itself \
         (attestation slot: {attestation_slot}, block slot: {block_slot})"
    )]
    AttestationForFutureBlock {
        attestation_slot: Slot,
        block_slot: Slot,
    },
    #[error(
        "attestation targets a future epoch \
         (target epoch: {target_epoch}, current epoch: {current_epoch})"
    )]
    AttestationForFutureEpoch {
        target_epoch: Epoch,
        current_epoch: Epoch,
    },
    #[error(
        "attestation targets an epoch before the previous one \
         (target epoch: {target_epoch}, previous epoch: {previous_epoch})"
    )]
    AttestationFromPastEpoch {
        target_epoch: Epoch,
        previous_epoch: Epoch,
    },
    #[error("attestation target is not an ancestor of its head vote (target: {target:?})")]
    AttestationTargetNotAncestor { target: Checkpoint },
    #[error("attestation target epoch does not match its slot (slot: {slot}, target: {target:?})")]
    AttestationTargetsWrongEpoch { slot: Slot, target: Checkpoint },
    #[error("attester slashing does not contain a double vote or a surround vote")]
    AttesterSlashingNotSlashable,
    #[error("block is from the future (block slot: {block_slot}, current slot: {current_slot})")]
    BlockFromFuture { block_slot: Slot, current_slot: Slot },
    #[error("block does not descend from the finalized block (block_root: {block_root:?})")]
    BlockNotDescendantOfFinalized { block_root: H256 },
    #[error(
        "block is not later than the finalized slot \
         (block slot: {block_slot}, finalized slot: {finalized_slot})"
    )]
    BlockNotLaterThanFinalized { block_slot: Slot, finalized_slot: Slot },
    #[error("block is not later than its parent (block slot: {block_slot}, parent slot: {parent_slot})")]
    BlockNotLaterThanParent { block_slot: Slot, parent_slot: Slot },
    #[error(
        "block does not commit to its post-state \
         (block_root: {block_root:?}, in block: {in_block:?}, computed: {computed:?})"
    )]
    StateRootMismatch {
        block_root: H256,
        in_block: H256,
        computed: H256,
    },
    #[error("attestation votes for an unknown block: {beacon_block_root:?}")]
    UnknownBeaconBlockRoot { beacon_block_root: H256 },
    #[error("checkpoint refers to an unknown block: {checkpoint:?}")]
    UnknownCheckpointBlock { checkpoint: Checkpoint },
    #[error("block parent is unknown (block_root: {block_root:?}, parent_root: {parent_root:?})")]
    UnknownParent { block_root: H256, parent_root: H256 },
}
