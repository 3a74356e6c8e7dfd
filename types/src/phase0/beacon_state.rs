use ssz::BitVector;

use crate::{
    collections::{
        ActiveIndexRoots, Attestations, Balances, Eth1DataVotes, HistoricalRoots, RandaoMixes,
        RecentRoots, Slashings, Validators,
    },
    phase0::{
        consts::JustificationBitsLength,
        containers::{BeaconBlockHeader, Checkpoint, Eth1Data, Fork},
        primitives::{DepositIndex, Epoch, Slot, UnixSeconds, H256},
    },
    preset::Preset,
};

#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct BeaconState<P: Preset> {
    // > Versioning
    pub genesis_time: UnixSeconds,
    pub genesis_validators_root: H256,
    pub slot: Slot,
    pub fork: Fork,

    // > History
    pub latest_block_header: BeaconBlockHeader,
    pub block_roots: RecentRoots<P>,
    pub state_roots: RecentRoots<P>,
    pub historical_roots: HistoricalRoots<P>,

    // > Eth1
    pub eth1_data: Eth1Data,
    pub eth1_data_votes: Eth1DataVotes<P>,
    pub eth1_deposit_index: DepositIndex,

    // > Registry
    pub validators: Validators<P>,
    pub balances: Balances<P>,
    pub validator_registry_update_epoch: Epoch,

    // > Randomness
    pub randao_mixes: RandaoMixes<P>,
    pub active_index_roots: ActiveIndexRoots<P>,

    // > Shuffling
    pub previous_shuffling_epoch: Epoch,
    pub current_shuffling_epoch: Epoch,
    pub previous_shuffling_seed: H256,
    pub current_shuffling_seed: H256,

    // > Slashings
    pub slashings: Slashings<P>,

    // > Attestations
    pub previous_epoch_attestations: Attestations<P>,
    pub current_epoch_attestations: Attestations<P>,

    // > Finality
    pub justification_bits: BitVector<JustificationBitsLength>,
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
}
