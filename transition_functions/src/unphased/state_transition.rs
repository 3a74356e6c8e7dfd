use anyhow::{ensure, Result};
use ssz::SszHash as _;
use types::{
    phase0::{beacon_state::BeaconState, containers::BeaconBlock},
    preset::Preset,
};

use crate::unphased::Error;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StateRootPolicy {
    Verify,
    Trust,
}

impl StateRootPolicy {
    pub fn verify<P: Preset>(self, state: &BeaconState<P>, block: &BeaconBlock<P>) -> Result<()> {
        match self {
            Self::Verify => {
                let computed = state.hash_tree_root();
                let in_block = block.state_root;

                ensure!(
                    computed == in_block,
                    Error::StateRootMismatch { computed, in_block },
                );
            }
            Self::Trust => {}
        }

        Ok(())
    }
}
