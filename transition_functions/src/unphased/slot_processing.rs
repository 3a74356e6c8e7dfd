use ssz::SszHash as _;
use types::{
    phase0::{beacon_state::BeaconState, containers::BeaconBlock},
    preset::Preset,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProcessSlots {
    Always,
    IfNeeded,
    Never,
}

impl ProcessSlots {
    #[must_use]
    pub fn should_process<P: Preset>(self, state: &BeaconState<P>, block: &BeaconBlock<P>) -> bool {
        match self {
            Self::Always => true,
            // The test for equality is intentional. Blocks attempting to "rewind" the state are
            // rejected early by `process_slots` instead of failing the slot check later.
            Self::IfNeeded => state.slot != block.slot,
            Self::Never => false,
        }
    }
}

pub fn process_slot<P: Preset>(state: &mut BeaconState<P>) {
    let slot = state.slot;

    // > Cache state root
    let previous_state_root = state.hash_tree_root();
    *state.state_roots.mod_index_mut(slot) = previous_state_root;

    // > Cache latest block header state root
    if state.latest_block_header.state_root.is_zero() {
        state.latest_block_header.state_root = previous_state_root;
    }

    // > Cache block root
    let previous_block_root = state.latest_block_header.hash_tree_root();
    *state.block_roots.mod_index_mut(slot) = previous_block_root;
}

#[cfg(test)]
mod tests {
    use types::{phase0::primitives::H256, preset::Minimal};

    use super::*;

    #[test]
    fn process_slot_fills_header_and_caches_roots() {
        let mut state = BeaconState::<Minimal> {
            slot: 3,
            ..BeaconState::default()
        };

        let state_root = state.hash_tree_root();

        process_slot(&mut state);

        assert_eq!(state.latest_block_header.state_root, state_root);
        assert_eq!(*state.state_roots.mod_index(3), state_root);
        assert_eq!(
            *state.block_roots.mod_index(3),
            state.latest_block_header.hash_tree_root(),
        );
        assert_eq!(state.slot, 3);
    }

    #[test]
    fn filled_header_state_root_is_kept() {
        let mut state = BeaconState::<Minimal>::default();
        state.latest_block_header.state_root = H256::repeat_byte(7);

        process_slot(&mut state);

        assert_eq!(state.latest_block_header.state_root, H256::repeat_byte(7));
    }

    #[test]
    fn if_needed_skips_states_at_block_slot() {
        let state = BeaconState::<Minimal> {
            slot: 5,
            ..BeaconState::default()
        };

        let block = BeaconBlock {
            slot: 5,
            ..BeaconBlock::default()
        };

        assert!(!ProcessSlots::IfNeeded.should_process(&state, &block));
        assert!(ProcessSlots::Always.should_process(&state, &block));
        assert!(!ProcessSlots::Never.should_process(&state, &block));
    }
}
