use std::sync::Arc;

use anyhow::Result;
use derivative::Derivative;
use types::{
    phase0::{
        beacon_state::BeaconState,
        containers::SignedBeaconBlock,
        primitives::{Epoch, Slot, H256},
    },
    preset::Preset,
};

/// A block in the store together with the state it produces.
#[derive(Derivative)]
#[derivative(Clone(bound = ""), Debug(bound = ""))]
pub struct ChainLink<P: Preset> {
    pub block_root: H256,
    pub block: Arc<SignedBeaconBlock<P>>,
    #[derivative(Debug = "ignore")]
    pub state: Arc<BeaconState<P>>,
}

impl<P: Preset> ChainLink<P> {
    #[must_use]
    pub fn slot(&self) -> Slot {
        self.block.message.slot
    }

    #[must_use]
    pub fn parent_root(&self) -> H256 {
        self.block.message.parent_root
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LatestMessage {
    pub epoch: Epoch,
    // This is the LMD GHOST vote and corresponds to `AttestationData.beacon_block_root`.
    pub beacon_block_root: H256,
}

/// Persistence for blocks that leave the store when finality moves the anchor.
///
/// Methods take `&self` so implementations can be shared with readers.
pub trait Storage<P: Preset> {
    /// Called for each finalized ancestor of the new anchor, oldest first.
    fn archive_block(&self, chain_link: &ChainLink<P>) -> Result<()>;

    /// Called once per anchor change with the roots of blocks that can never become canonical.
    fn prune(&self, block_roots: &[H256]) -> Result<()>;
}
