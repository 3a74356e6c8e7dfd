use bls::SignatureBytes;
use ssz::{SszHash, H256};

use crate::{
    phase0::{
        beacon_state::BeaconState,
        containers::{
            Attestation, AttestationData, AttesterSlashing, BeaconBlock, BeaconBlockBody,
            BeaconBlockHeader, Checkpoint, Deposit, DepositData, DepositMessage, Eth1Data, Fork,
            ForkData, HistoricalBatch, IndexedAttestation, PendingAttestation, ProposerSlashing,
            SignedBeaconBlock, SignedBeaconBlockHeader, SignedVoluntaryExit, SigningData,
            Validator, VoluntaryExit,
        },
    },
    preset::Preset,
};

// Containers are hashed by Merkleizing the roots of their fields in declaration order.
// Field lists must be kept in sync with the struct definitions.
macro_rules! impl_ssz_hash {
    ($type: ident $(<$preset: ident>)? { $($field: ident),* $(,)? }) => {
        impl $(<$preset: Preset>)? SszHash for $type $(<$preset>)? {
            fn hash_tree_root(&self) -> H256 {
                ssz::hash_container(&[$(self.$field.hash_tree_root()),*])
            }
        }
    };
}

impl_ssz_hash!(Attestation<P> { aggregation_bits, data, signature });

impl_ssz_hash!(AttestationData {
    slot,
    index,
    beacon_block_root,
    source,
    target,
});

impl_ssz_hash!(AttesterSlashing<P> { attestation_1, attestation_2 });

impl_ssz_hash!(BeaconBlock<P> { slot, proposer_index, parent_root, state_root, body });

impl_ssz_hash!(BeaconBlockBody<P> {
    randao_reveal,
    eth1_data,
    graffiti,
    proposer_slashings,
    attester_slashings,
    attestations,
    deposits,
    voluntary_exits,
});

impl_ssz_hash!(BeaconBlockHeader {
    slot,
    proposer_index,
    parent_root,
    state_root,
    body_root,
});

impl_ssz_hash!(Checkpoint { epoch, root });

impl_ssz_hash!(Deposit { proof, data });

impl_ssz_hash!(DepositData { pubkey, withdrawal_credentials, amount, signature });

impl_ssz_hash!(DepositMessage { pubkey, withdrawal_credentials, amount });

impl_ssz_hash!(Eth1Data { deposit_root, deposit_count, block_hash });

impl_ssz_hash!(Fork { previous_version, current_version, epoch });

impl_ssz_hash!(ForkData { current_version, genesis_validators_root });

impl_ssz_hash!(HistoricalBatch<P> { block_roots, state_roots });

impl_ssz_hash!(IndexedAttestation<P> { attesting_indices, data, signature });

impl_ssz_hash!(PendingAttestation<P> {
    aggregation_bits,
    data,
    inclusion_delay,
    proposer_index,
});

impl_ssz_hash!(ProposerSlashing { signed_header_1, signed_header_2 });

impl_ssz_hash!(SignedBeaconBlock<P> { message, signature });

impl_ssz_hash!(SignedBeaconBlockHeader { message, signature });

impl_ssz_hash!(SignedVoluntaryExit { message, signature });

impl_ssz_hash!(SigningData { object_root, domain });

impl_ssz_hash!(Validator {
    pubkey,
    withdrawal_credentials,
    effective_balance,
    slashed,
    activation_eligibility_epoch,
    activation_epoch,
    exit_epoch,
    withdrawable_epoch,
});

impl_ssz_hash!(VoluntaryExit { epoch, validator_index });

impl_ssz_hash!(BeaconState<P> {
    genesis_time,
    genesis_validators_root,
    slot,
    fork,
    latest_block_header,
    block_roots,
    state_roots,
    historical_roots,
    eth1_data,
    eth1_data_votes,
    eth1_deposit_index,
    validators,
    balances,
    validator_registry_update_epoch,
    randao_mixes,
    active_index_roots,
    previous_shuffling_epoch,
    current_shuffling_epoch,
    previous_shuffling_seed,
    current_shuffling_seed,
    slashings,
    previous_epoch_attestations,
    current_epoch_attestations,
    justification_bits,
    previous_justified_checkpoint,
    current_justified_checkpoint,
    finalized_checkpoint,
});

impl BeaconBlockHeader {
    #[inline]
    #[must_use]
    pub const fn with_signature(self, signature: SignatureBytes) -> SignedBeaconBlockHeader {
        SignedBeaconBlockHeader {
            message: self,
            signature,
        }
    }
}

impl<P: Preset> BeaconBlock<P> {
    #[inline]
    #[must_use]
    pub const fn with_signature(self, signature: SignatureBytes) -> SignedBeaconBlock<P> {
        SignedBeaconBlock {
            message: self,
            signature,
        }
    }

    /// Header of the block with the body replaced by its root.
    #[must_use]
    pub fn to_header(&self) -> BeaconBlockHeader {
        BeaconBlockHeader {
            slot: self.slot,
            proposer_index: self.proposer_index,
            parent_root: self.parent_root,
            state_root: self.state_root,
            body_root: self.body.hash_tree_root(),
        }
    }
}

impl From<DepositData> for DepositMessage {
    #[inline]
    fn from(deposit_data: DepositData) -> Self {
        let DepositData {
            pubkey,
            withdrawal_credentials,
            amount,
            ..
        } = deposit_data;

        Self {
            pubkey,
            withdrawal_credentials,
            amount,
        }
    }
}
