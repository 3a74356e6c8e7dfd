//! The state transition function of the beacon chain.
//!
//! Only Phase 0 is implemented. Items that would be shared by later forks live in [`unphased`].

pub use crate::{
    phase0::{process_slots, state_transition, trusted_state_transition, untrusted_state_transition},
    unphased::{ErrorKind, ProcessSlots, StateRootPolicy},
};

pub mod unphased {
    pub use block_processing::{
        validate_attestation, validate_attestation_with_verifier, validate_attester_slashing,
        validate_attester_slashing_with_verifier, validate_deposits, validate_proposer_slashing,
        validate_proposer_slashing_with_verifier, validate_voluntary_exit,
        validate_voluntary_exit_with_verifier, CombinedDeposit,
    };
    pub use error::{Error, ErrorKind};
    pub use slot_processing::{process_slot, ProcessSlots};
    pub use state_transition::StateRootPolicy;

    pub(crate) use block_processing::{
        process_block_header, process_eth1_data, process_randao, process_voluntary_exit,
    };
    pub(crate) use epoch_processing::{
        process_effective_balance_updates, process_eth1_data_reset,
        process_historical_roots_update, process_randao_mixes_reset, process_registry_updates,
        process_slashings, process_slashings_reset, should_process_justification_and_finalization,
        should_process_rewards_and_penalties, weigh_justification_and_finalization,
    };

    mod block_processing;
    mod epoch_processing;
    mod error;
    mod slot_processing;
    mod state_transition;
}

pub mod phase0 {
    pub use block_processing::{count_required_signatures, process_block};
    pub use epoch_intermediates::{EpochDeltas, Statistics, ValidatorSummary};
    pub use epoch_processing::process_epoch;
    pub use slot_processing::process_slots;
    pub use state_transition::{
        state_transition, trusted_state_transition, untrusted_state_transition, verify_signatures,
    };

    mod block_processing;
    mod epoch_intermediates;
    mod epoch_processing;
    mod slot_processing;
    mod state_transition;
}
