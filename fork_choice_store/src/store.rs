use core::cmp::Reverse;
use std::sync::Arc;

use anyhow::{bail, ensure, Result};
use hash_hasher::{HashedMap, HashedSet};
use helper_functions::{accessors, misc, predicates, verifier::SingleVerifier};
use im::{HashMap, HashSet, OrdSet};
use itertools::Itertools as _;
use log::{debug, info, warn};
use ssz::SszHash as _;
use types::{
    config::Config as ChainConfig,
    phase0::{
        beacon_state::BeaconState,
        containers::{Attestation, AttesterSlashing, Checkpoint, SignedBeaconBlock},
        primitives::{Epoch, Gwei, Slot, UnixSeconds, ValidatorIndex, H256},
    },
    preset::Preset,
};

use crate::{
    error::Error,
    misc::{ChainLink, LatestMessage, Storage},
    store_config::StoreConfig,
};

/// Block tree and latest votes used to select the head with LMD GHOST.
///
/// All collections are persistent, so cloning a `Store` to compute the head on a snapshot is cheap.
#[derive(Clone)]
pub struct Store<P: Preset> {
    chain_config: Arc<ChainConfig>,
    store_config: StoreConfig,
    genesis_time: UnixSeconds,
    time: UnixSeconds,
    justified_checkpoint: Checkpoint,
    finalized_checkpoint: Checkpoint,
    best_justified_checkpoint: Checkpoint,
    anchor_root: H256,
    blocks: HashMap<H256, ChainLink<P>>,
    // Kept ordered so that iteration over siblings is deterministic.
    children: HashMap<H256, OrdSet<H256>>,
    // Effectively a cache. Every entry can be recomputed from `Store.blocks`.
    checkpoint_states: HashMap<Checkpoint, Arc<BeaconState<P>>>,
    // Effective balances of validators active in the justified checkpoint state.
    // Slashed and inactive validators have a balance of 0.
    justified_active_balances: Arc<[Gwei]>,
    latest_messages: HashMap<ValidatorIndex, LatestMessage>,
    equivocating_indices: HashSet<ValidatorIndex>,
}

impl<P: Preset> Store<P> {
    /// Creates a store anchored at `anchor_block`.
    ///
    /// The anchor is treated as both justified and finalized.
    pub fn new(
        chain_config: Arc<ChainConfig>,
        store_config: StoreConfig,
        anchor_block: Arc<SignedBeaconBlock<P>>,
        anchor_state: Arc<BeaconState<P>>,
    ) -> Result<Self> {
        let block_root = anchor_block.message.hash_tree_root();
        let state_root = anchor_state.hash_tree_root();
        let slot = anchor_block.message.slot;

        ensure!(
            misc::is_epoch_start::<P>(slot),
            Error::AnchorNotAtEpochStart { slot },
        );

        ensure!(
            anchor_block.message.state_root == state_root,
            Error::StateRootMismatch {
                block_root,
                in_block: anchor_block.message.state_root,
                computed: state_root,
            },
        );

        // Note that if `anchor_state` is the genesis state, this checkpoint will not be equal to
        // any checkpoints in it, because all checkpoints in a genesis state have a zero root.
        let checkpoint = Checkpoint {
            epoch: accessors::get_current_epoch(&anchor_state),
            root: block_root,
        };

        let genesis_time = anchor_state.genesis_time;
        let time = genesis_time + slot * chain_config.seconds_per_slot.get();
        let justified_active_balances = Self::active_balances(&anchor_state);

        let anchor = ChainLink {
            block_root,
            block: anchor_block,
            state: Arc::clone(&anchor_state),
        };

        Ok(Self {
            chain_config,
            store_config,
            genesis_time,
            time,
            justified_checkpoint: checkpoint,
            finalized_checkpoint: checkpoint,
            best_justified_checkpoint: checkpoint,
            anchor_root: block_root,
            blocks: HashMap::unit(block_root, anchor),
            children: HashMap::new(),
            checkpoint_states: HashMap::unit(checkpoint, anchor_state),
            justified_active_balances,
            latest_messages: HashMap::new(),
            equivocating_indices: HashSet::new(),
        })
    }

    #[must_use]
    pub fn chain_config(&self) -> &ChainConfig {
        &self.chain_config
    }

    #[must_use]
    pub const fn store_config(&self) -> StoreConfig {
        self.store_config
    }

    #[must_use]
    pub const fn time(&self) -> UnixSeconds {
        self.time
    }

    #[must_use]
    pub fn current_slot(&self) -> Slot {
        self.time.saturating_sub(self.genesis_time) / self.chain_config.seconds_per_slot
    }

    #[must_use]
    pub fn current_epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.current_slot())
    }

    #[must_use]
    pub const fn justified_checkpoint(&self) -> Checkpoint {
        self.justified_checkpoint
    }

    #[must_use]
    pub const fn finalized_checkpoint(&self) -> Checkpoint {
        self.finalized_checkpoint
    }

    #[must_use]
    pub const fn best_justified_checkpoint(&self) -> Checkpoint {
        self.best_justified_checkpoint
    }

    /// The oldest block in the store. Every other block descends from it.
    #[must_use]
    pub fn anchor(&self) -> &ChainLink<P> {
        &self.blocks[&self.anchor_root]
    }

    #[must_use]
    pub fn chain_link(&self, block_root: H256) -> Option<&ChainLink<P>> {
        self.blocks.get(&block_root)
    }

    #[must_use]
    pub fn contains_block(&self, block_root: H256) -> bool {
        self.blocks.contains_key(&block_root)
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn latest_message(&self, validator_index: ValidatorIndex) -> Option<LatestMessage> {
        self.latest_messages.get(&validator_index).copied()
    }

    #[must_use]
    pub fn is_equivocating(&self, validator_index: ValidatorIndex) -> bool {
        self.equivocating_indices.contains(&validator_index)
    }

    /// Iterates over `block_root` and its ancestors present in the store, newest first.
    pub fn chain_ending_with(&self, block_root: H256) -> impl Iterator<Item = &ChainLink<P>> {
        core::iter::successors(self.blocks.get(&block_root), |chain_link| {
            self.blocks.get(&chain_link.parent_root())
        })
    }

    /// Root of the block at `slot` in the chain ending with `block_root`, or of the latest block
    /// before it if `slot` was skipped.
    ///
    /// Returns `None` if `block_root` is unknown or `slot` is older than the anchor.
    #[must_use]
    pub fn ancestor(&self, block_root: H256, slot: Slot) -> Option<H256> {
        self.chain_ending_with(block_root)
            .find(|chain_link| chain_link.slot() <= slot)
            .map(|chain_link| chain_link.block_root)
    }

    /// Selects the head by descending from the justified block into the heaviest child.
    ///
    /// Ties are broken in favor of the lexicographically smallest root.
    #[must_use]
    pub fn head(&self) -> H256 {
        let weights = self.weights();
        let mut head = self.justified_root();

        while let Some(best_child) = self.children.get(&head).and_then(|children| {
            children.iter().copied().max_by_key(|child| {
                let weight = weights.get(child).copied().unwrap_or_default();
                (weight, Reverse(*child))
            })
        }) {
            head = best_child;
        }

        head
    }

    /// Attesting weight of the subtree rooted at `block_root` in units of the effective balance
    /// increment.
    #[must_use]
    pub fn weight(&self, block_root: H256) -> u64 {
        self.weights()
            .get(&block_root)
            .copied()
            .unwrap_or_default()
    }

    /// Advances the clock. At the start of an epoch the best justified checkpoint seen during the
    /// previous one is adopted.
    pub fn on_tick(&mut self, time: UnixSeconds) -> Result<()> {
        // Ticks may arrive out of order.
        if time <= self.time {
            return Ok(());
        }

        let old_epoch = self.current_epoch();

        self.time = time;

        if self.current_epoch() > old_epoch
            && self.best_justified_checkpoint.epoch > self.justified_checkpoint.epoch
        {
            self.set_justified_checkpoint(self.best_justified_checkpoint)?;
        }

        Ok(())
    }

    /// Adds a block together with its post-state.
    ///
    /// `state` must be the result of applying `block` to the state of its parent. The state
    /// transition itself is the caller's responsibility.
    pub fn on_block(
        &mut self,
        storage: &impl Storage<P>,
        block: Arc<SignedBeaconBlock<P>>,
        state: Arc<BeaconState<P>>,
    ) -> Result<()> {
        let block_root = block.message.hash_tree_root();

        if self.blocks.contains_key(&block_root) {
            return Ok(());
        }

        let block_slot = block.message.slot;
        let parent_root = block.message.parent_root;

        let Some(parent) = self.blocks.get(&parent_root) else {
            bail!(Error::UnknownParent {
                block_root,
                parent_root,
            });
        };

        ensure!(
            parent.slot() < block_slot,
            Error::BlockNotLaterThanParent {
                block_slot,
                parent_slot: parent.slot(),
            },
        );

        let current_slot = self.current_slot();

        ensure!(
            block_slot <= current_slot,
            Error::BlockFromFuture {
                block_slot,
                current_slot,
            },
        );

        let finalized_slot = misc::compute_start_slot_at_epoch::<P>(self.finalized_checkpoint.epoch);

        ensure!(
            block_slot > finalized_slot,
            Error::BlockNotLaterThanFinalized {
                block_slot,
                finalized_slot,
            },
        );

        ensure!(
            self.ancestor(parent_root, finalized_slot) == Some(self.finalized_checkpoint.root),
            Error::BlockNotDescendantOfFinalized { block_root },
        );

        let computed = state.hash_tree_root();

        ensure!(
            block.message.state_root == computed,
            Error::StateRootMismatch {
                block_root,
                in_block: block.message.state_root,
                computed,
            },
        );

        let justified_checkpoint = state.current_justified_checkpoint;
        let finalized_checkpoint = state.finalized_checkpoint;

        // Changes are made to a snapshot so that a failure leaves `self` untouched.
        let mut updated = self.clone();

        updated
            .children
            .entry(parent_root)
            .or_default()
            .insert(block_root);

        updated.blocks.insert(
            block_root,
            ChainLink {
                block_root,
                block,
                state,
            },
        );

        updated.apply_checkpoints(storage, justified_checkpoint, finalized_checkpoint)?;

        *self = updated;

        debug!("block added to fork choice (slot: {block_slot}, block_root: {block_root:?})");

        Ok(())
    }

    /// Records the votes in `attestation`. Only a vote with a later target epoch replaces the
    /// latest message of a validator.
    pub fn on_attestation(&mut self, attestation: &Attestation<P>) -> Result<()> {
        let data = attestation.data;
        let target = data.target;

        ensure!(
            target.epoch == misc::compute_epoch_at_slot::<P>(data.slot),
            Error::AttestationTargetsWrongEpoch {
                slot: data.slot,
                target,
            },
        );

        let current_epoch = self.current_epoch();

        ensure!(
            target.epoch <= current_epoch,
            Error::AttestationForFutureEpoch {
                target_epoch: target.epoch,
                current_epoch,
            },
        );

        let previous_epoch = current_epoch.saturating_sub(1);

        ensure!(
            target.epoch >= previous_epoch,
            Error::AttestationFromPastEpoch {
                target_epoch: target.epoch,
                previous_epoch,
            },
        );

        // Attestations can only affect the fork choice of subsequent slots.
        let current_slot = self.current_slot();

        ensure!(
            data.slot < current_slot,
            Error::AttestationFromCurrentOrFutureSlot {
                attestation_slot: data.slot,
                current_slot,
            },
        );

        let Some(block) = self.blocks.get(&data.beacon_block_root) else {
            bail!(Error::UnknownBeaconBlockRoot {
                beacon_block_root: data.beacon_block_root,
            });
        };

        ensure!(
            block.slot() <= data.slot,
            Error::AttestationForFutureBlock {
                attestation_slot: data.slot,
                block_slot: block.slot(),
            },
        );

        let target_slot = misc::compute_start_slot_at_epoch::<P>(target.epoch);

        ensure!(
            self.ancestor(data.beacon_block_root, target_slot) == Some(target.root),
            Error::AttestationTargetNotAncestor { target },
        );

        let target_state = self.checkpoint_state(target)?;
        let committees = accessors::get_committees(&target_state, target.epoch)?;
        let indexed_attestation = accessors::get_indexed_attestation(&committees, attestation)?;

        predicates::validate_indexed_attestation(
            &self.chain_config,
            &target_state,
            &indexed_attestation,
            SingleVerifier,
        )?;

        let latest_message = LatestMessage {
            epoch: target.epoch,
            beacon_block_root: data.beacon_block_root,
        };

        for validator_index in indexed_attestation.attesting_indices.iter().copied() {
            self.update_latest_message(validator_index, latest_message);
        }

        Ok(())
    }

    /// Excludes the votes of validators that both attestations in `attester_slashing` are signed
    /// by. Their latest messages are kept but no longer carry weight.
    pub fn on_attester_slashing(&mut self, attester_slashing: &AttesterSlashing<P>) -> Result<()> {
        let AttesterSlashing {
            attestation_1,
            attestation_2,
        } = attester_slashing;

        ensure!(
            predicates::is_slashable_attestation_data(attestation_1.data, attestation_2.data),
            Error::AttesterSlashingNotSlashable,
        );

        let state = self.checkpoint_state(self.justified_checkpoint)?;

        for attestation in [attestation_1, attestation_2] {
            predicates::validate_indexed_attestation(
                &self.chain_config,
                &state,
                attestation,
                SingleVerifier,
            )?;
        }

        let old_count = self.equivocating_indices.len();

        self.equivocating_indices
            .extend(accessors::slashable_indices(attester_slashing));

        debug!(
            "attester slashing applied to fork choice ({} new equivocating validators)",
            self.equivocating_indices.len() - old_count,
        );

        Ok(())
    }

    /// Updates the justified and finalized checkpoints from a newly seen state.
    ///
    /// A later justified checkpoint is adopted immediately only early in an epoch or if it
    /// descends from the current one. Otherwise it waits for the next epoch in
    /// `Store.best_justified_checkpoint`. A later finalized checkpoint re-anchors the store.
    ///
    /// The store is left unchanged if this fails.
    pub fn on_checkpoints(
        &mut self,
        storage: &impl Storage<P>,
        justified_checkpoint: Checkpoint,
        finalized_checkpoint: Checkpoint,
    ) -> Result<()> {
        let mut updated = self.clone();
        updated.apply_checkpoints(storage, justified_checkpoint, finalized_checkpoint)?;
        *self = updated;
        Ok(())
    }

    fn apply_checkpoints(
        &mut self,
        storage: &impl Storage<P>,
        justified_checkpoint: Checkpoint,
        finalized_checkpoint: Checkpoint,
    ) -> Result<()> {
        if justified_checkpoint.epoch > self.justified_checkpoint.epoch {
            if justified_checkpoint.epoch > self.best_justified_checkpoint.epoch {
                self.best_justified_checkpoint = justified_checkpoint;
            }

            if self.should_update_justified_checkpoint(justified_checkpoint) {
                self.set_justified_checkpoint(justified_checkpoint)?;
            }
        }

        if finalized_checkpoint.epoch > self.finalized_checkpoint.epoch {
            self.prune(storage, finalized_checkpoint)?;
            self.finalized_checkpoint = finalized_checkpoint;

            info!(
                "finalized checkpoint updated (epoch: {}, root: {:?})",
                finalized_checkpoint.epoch, finalized_checkpoint.root,
            );
        }

        Ok(())
    }

    /// Returns `true` if `new_justified_checkpoint` may replace the current one right away.
    ///
    /// This prevents a late block from switching the fork choice to a competing justified branch.
    #[must_use]
    pub fn should_update_justified_checkpoint(&self, new_justified_checkpoint: Checkpoint) -> bool {
        if misc::slots_since_epoch_start::<P>(self.current_slot())
            < self.store_config.safe_slots_to_update_justified
        {
            return true;
        }

        let justified_slot = misc::compute_start_slot_at_epoch::<P>(self.justified_checkpoint.epoch);

        self.ancestor(new_justified_checkpoint.root, justified_slot)
            == Some(self.justified_checkpoint.root)
    }

    fn justified_root(&self) -> H256 {
        // The justified block may be older than the anchor if the store was started from a
        // non-genesis state.
        if self.blocks.contains_key(&self.justified_checkpoint.root) {
            self.justified_checkpoint.root
        } else {
            self.anchor_root
        }
    }

    fn set_justified_checkpoint(&mut self, checkpoint: Checkpoint) -> Result<()> {
        let state = self.checkpoint_state(checkpoint)?;

        self.justified_active_balances = Self::active_balances(&state);
        self.justified_checkpoint = checkpoint;

        debug!(
            "justified checkpoint updated (epoch: {}, root: {:?})",
            checkpoint.epoch, checkpoint.root,
        );

        Ok(())
    }

    fn update_latest_message(&mut self, validator_index: ValidatorIndex, message: LatestMessage) {
        if let Some(old_message) = self.latest_messages.get(&validator_index) {
            if old_message.epoch >= message.epoch {
                return;
            }
        }

        self.latest_messages.insert(validator_index, message);
    }

    fn checkpoint_state(&mut self, checkpoint: Checkpoint) -> Result<Arc<BeaconState<P>>> {
        if let Some(state) = self.checkpoint_states.get(&checkpoint) {
            return Ok(Arc::clone(state));
        }

        let Some(chain_link) = self.blocks.get(&checkpoint.root) else {
            bail!(Error::UnknownCheckpointBlock { checkpoint });
        };

        let epoch_start_slot = misc::compute_start_slot_at_epoch::<P>(checkpoint.epoch);

        let state = if chain_link.state.slot < epoch_start_slot {
            let mut state = BeaconState::clone(&chain_link.state);
            transition_functions::process_slots(&self.chain_config, &mut state, epoch_start_slot)?;
            Arc::new(state)
        } else {
            Arc::clone(&chain_link.state)
        };

        self.checkpoint_states
            .insert(checkpoint, Arc::clone(&state));

        Ok(state)
    }

    // Moves the anchor to the finalized block. Its ancestors are archived and every other block
    // that does not descend from it is pruned.
    fn prune(
        &mut self,
        storage: &impl Storage<P>,
        finalized_checkpoint: Checkpoint,
    ) -> Result<()> {
        if finalized_checkpoint.root == self.anchor_root {
            return Ok(());
        }

        let Some(new_anchor) = self.blocks.get(&finalized_checkpoint.root) else {
            warn!(
                "finalized block is not in fork choice store; anchor not moved \
                 (finalized_checkpoint: {finalized_checkpoint:?})",
            );

            return Ok(());
        };

        let anchor_slot = new_anchor.slot();

        let mut archived = self
            .chain_ending_with(new_anchor.parent_root())
            .cloned()
            .collect_vec();

        archived.reverse();

        let archived_roots = archived
            .iter()
            .map(|chain_link| chain_link.block_root)
            .collect::<HashedSet<_>>();

        let orphaned = self
            .blocks
            .keys()
            .copied()
            .filter(|block_root| !archived_roots.contains(block_root))
            .filter(|block_root| {
                self.ancestor(*block_root, anchor_slot) != Some(finalized_checkpoint.root)
            })
            .sorted()
            .collect_vec();

        for chain_link in &archived {
            storage.archive_block(chain_link)?;
        }

        storage.prune(&orphaned)?;

        for block_root in archived_roots.iter().chain(&orphaned) {
            self.blocks.remove(block_root);
            self.children.remove(block_root);
        }

        self.anchor_root = finalized_checkpoint.root;

        self.checkpoint_states
            .retain(|checkpoint, _| checkpoint.epoch >= finalized_checkpoint.epoch);

        info!(
            "fork choice store re-anchored at slot {anchor_slot} \
             ({} blocks archived, {} blocks pruned)",
            archived.len(),
            orphaned.len(),
        );

        Ok(())
    }

    // Votes are added to the block they name and then propagated to ancestors.
    // Blocks are visited newest first, so every subtree is complete before it is added to its
    // parent.
    fn weights(&self) -> HashedMap<H256, u64> {
        let mut weights = HashedMap::<H256, u64>::default();

        for (validator_index, latest_message) in &self.latest_messages {
            if self.equivocating_indices.contains(validator_index) {
                continue;
            }

            if !self.blocks.contains_key(&latest_message.beacon_block_root) {
                continue;
            }

            let balance = usize::try_from(*validator_index)
                .ok()
                .and_then(|index| self.justified_active_balances.get(index).copied())
                .unwrap_or_default();

            *weights
                .entry(latest_message.beacon_block_root)
                .or_default() += balance / P::EFFECTIVE_BALANCE_INCREMENT;
        }

        let newest_first = self
            .blocks
            .values()
            .sorted_unstable_by_key(|chain_link| Reverse(chain_link.slot()));

        for chain_link in newest_first {
            let Some(weight) = weights.get(&chain_link.block_root).copied() else {
                continue;
            };

            if self.blocks.contains_key(&chain_link.parent_root()) {
                *weights.entry(chain_link.parent_root()).or_default() += weight;
            }
        }

        weights
    }

    fn active_balances(state: &BeaconState<P>) -> Arc<[Gwei]> {
        let epoch = accessors::get_current_epoch(state);

        state
            .validators
            .iter()
            .map(|validator| {
                if predicates::is_active_validator(validator, epoch) && !validator.slashed {
                    validator.effective_balance
                } else {
                    0
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use core::{cell::RefCell, num::NonZeroU64};

    use bls::SignatureBytes;
    use helper_functions::signing::SignForSingleFork as _;
    use ssz::{BitList, ContiguousList};
    use test_case::test_case;
    use types::{
        phase0::containers::{AttestationData, BeaconBlock, BeaconBlockBody, IndexedAttestation},
        preset::Minimal,
    };

    use super::*;

    #[derive(Default)]
    struct RecordingStorage {
        archived: RefCell<Vec<H256>>,
        pruned: RefCell<Vec<H256>>,
    }

    impl<P: Preset> Storage<P> for RecordingStorage {
        fn archive_block(&self, chain_link: &ChainLink<P>) -> Result<()> {
            self.archived.borrow_mut().push(chain_link.block_root);
            Ok(())
        }

        fn prune(&self, block_roots: &[H256]) -> Result<()> {
            self.pruned.borrow_mut().extend_from_slice(block_roots);
            Ok(())
        }
    }

    struct FailingStorage;

    impl<P: Preset> Storage<P> for FailingStorage {
        fn archive_block(&self, _chain_link: &ChainLink<P>) -> Result<()> {
            Ok(())
        }

        fn prune(&self, _block_roots: &[H256]) -> Result<()> {
            bail!("storage is unavailable")
        }
    }

    fn genesis_state() -> Result<(Arc<ChainConfig>, BeaconState<Minimal>)> {
        let config = ChainConfig::minimal();
        let validator_count = NonZeroU64::new(16).expect("count is nonzero");
        let state = interop::quick_start_beacon_state(&config, 0, validator_count)?;
        Ok((Arc::new(config), state))
    }

    fn new_store(config: Arc<ChainConfig>, state: BeaconState<Minimal>) -> Result<Store<Minimal>> {
        let block = interop::genesis_block(&state);
        Store::new(config, StoreConfig::minimal(), Arc::new(block), Arc::new(state))
    }

    fn tick_to_slot(store: &mut Store<Minimal>, slot: Slot) -> Result<()> {
        let seconds_per_slot = store.chain_config().seconds_per_slot.get();
        let genesis_time = store.anchor().state.genesis_time;
        store.on_tick(genesis_time + slot * seconds_per_slot)
    }

    // The store does not run the state transition, so any state with a matching root will do.
    fn child(
        store: &Store<Minimal>,
        parent_root: H256,
        slot: Slot,
        tag: u8,
    ) -> (SignedBeaconBlock<Minimal>, BeaconState<Minimal>) {
        let parent = store.chain_link(parent_root).expect("parent is in store");
        let mut state = BeaconState::clone(&parent.state);
        state.slot = slot;

        let block = BeaconBlock {
            slot,
            parent_root,
            state_root: state.hash_tree_root(),
            body: BeaconBlockBody {
                graffiti: H256::repeat_byte(tag),
                ..BeaconBlockBody::default()
            },
            ..BeaconBlock::default()
        };

        (block.with_signature(SignatureBytes::empty()), state)
    }

    fn add_child(
        store: &mut Store<Minimal>,
        storage: &RecordingStorage,
        parent_root: H256,
        slot: Slot,
        tag: u8,
    ) -> Result<H256> {
        let (block, state) = child(store, parent_root, slot, tag);
        let block_root = block.message.hash_tree_root();
        store.on_block(storage, Arc::new(block), Arc::new(state))?;
        Ok(block_root)
    }

    fn vote(store: &mut Store<Minimal>, validator_index: ValidatorIndex, block_root: H256) {
        store.update_latest_message(
            validator_index,
            LatestMessage {
                epoch: 0,
                beacon_block_root: block_root,
            },
        );
    }

    #[test]
    fn heavier_child_becomes_head() -> Result<()> {
        let (config, mut state) = genesis_state()?;
        state.validators.get_mut(0)?.effective_balance = 600_000_000_000;
        state.validators.get_mut(1)?.effective_balance = 400_000_000_000;

        let storage = RecordingStorage::default();
        let mut store = new_store(config, state)?;
        let genesis_root = store.anchor().block_root;

        tick_to_slot(&mut store, 1)?;

        let a = add_child(&mut store, &storage, genesis_root, 1, 1)?;
        let b = add_child(&mut store, &storage, genesis_root, 1, 2)?;

        vote(&mut store, 0, a);
        vote(&mut store, 1, b);

        assert_eq!(store.weight(a), 600);
        assert_eq!(store.weight(b), 400);
        assert_eq!(store.weight(genesis_root), 1000);
        assert_eq!(store.head(), a);

        Ok(())
    }

    #[test]
    fn tie_is_broken_by_smaller_root() -> Result<()> {
        let (config, state) = genesis_state()?;
        let storage = RecordingStorage::default();
        let mut store = new_store(config, state)?;
        let genesis_root = store.anchor().block_root;

        tick_to_slot(&mut store, 1)?;

        let a = add_child(&mut store, &storage, genesis_root, 1, 1)?;
        let b = add_child(&mut store, &storage, genesis_root, 1, 2)?;

        vote(&mut store, 0, a);
        vote(&mut store, 1, b);

        assert_eq!(store.weight(a), store.weight(b));
        assert_eq!(store.head(), a.min(b));
        assert_eq!(store.head(), store.head());

        Ok(())
    }

    #[test]
    fn votes_for_descendants_count_toward_ancestors() -> Result<()> {
        let (config, state) = genesis_state()?;
        let storage = RecordingStorage::default();
        let mut store = new_store(config, state)?;
        let genesis_root = store.anchor().block_root;

        tick_to_slot(&mut store, 2)?;

        let a = add_child(&mut store, &storage, genesis_root, 1, 1)?;
        let b = add_child(&mut store, &storage, genesis_root, 1, 2)?;
        let c = add_child(&mut store, &storage, a, 2, 3)?;

        vote(&mut store, 0, c);
        vote(&mut store, 1, b);
        vote(&mut store, 2, b);

        assert_eq!(store.head(), b);

        vote(&mut store, 3, c);
        vote(&mut store, 4, c);

        assert_eq!(store.weight(a), 3 * 32);
        assert_eq!(store.head(), c);

        Ok(())
    }

    #[test]
    fn later_target_epoch_replaces_latest_message() -> Result<()> {
        let (config, state) = genesis_state()?;
        let mut store = new_store(config, state)?;

        let first = LatestMessage {
            epoch: 1,
            beacon_block_root: H256::repeat_byte(1),
        };

        let same_epoch = LatestMessage {
            epoch: 1,
            beacon_block_root: H256::repeat_byte(2),
        };

        let later_epoch = LatestMessage {
            epoch: 2,
            beacon_block_root: H256::repeat_byte(3),
        };

        store.update_latest_message(7, first);
        store.update_latest_message(7, same_epoch);

        assert_eq!(store.latest_message(7), Some(first));

        store.update_latest_message(7, later_epoch);

        assert_eq!(store.latest_message(7), Some(later_epoch));

        Ok(())
    }

    #[test]
    fn ancestor_walks_parent_links() -> Result<()> {
        let (config, state) = genesis_state()?;
        let storage = RecordingStorage::default();
        let mut store = new_store(config, state)?;
        let genesis_root = store.anchor().block_root;

        tick_to_slot(&mut store, 3)?;

        let a = add_child(&mut store, &storage, genesis_root, 1, 1)?;
        let c = add_child(&mut store, &storage, a, 3, 3)?;

        assert_eq!(store.ancestor(c, 3), Some(c));
        assert_eq!(store.ancestor(c, 2), Some(a));
        assert_eq!(store.ancestor(c, 1), Some(a));
        assert_eq!(store.ancestor(c, 0), Some(genesis_root));
        assert_eq!(store.ancestor(H256::repeat_byte(0xff), 0), None);

        Ok(())
    }

    #[test_case(|block| { block.parent_root = H256::repeat_byte(0xff) } => matches Error::UnknownParent { .. }; "unknown parent")]
    #[test_case(|block| { block.slot = 0 } => matches Error::BlockNotLaterThanParent { .. }; "same slot as parent")]
    #[test_case(|block| { block.slot = 5 } => matches Error::BlockFromFuture { .. }; "future slot")]
    #[test_case(|block| { block.state_root = H256::zero() } => matches Error::StateRootMismatch { .. }; "wrong state root")]
    fn invalid_block_is_rejected(modify: fn(&mut BeaconBlock<Minimal>)) -> Error {
        let (config, state) = genesis_state().expect("genesis state can be built");
        let storage = RecordingStorage::default();
        let mut store = new_store(config, state).expect("genesis anchor is valid");
        let genesis_root = store.anchor().block_root;

        tick_to_slot(&mut store, 1).expect("no checkpoints change");

        let (mut block, state) = child(&store, genesis_root, 1, 1);

        modify(&mut block.message);

        let error = store
            .on_block(&storage, Arc::new(block), Arc::new(state))
            .expect_err("block should be rejected");

        assert_eq!(store.block_count(), 1);

        error.downcast().expect("error should come from the store")
    }

    #[test]
    fn attestation_counts_from_next_slot() -> Result<()> {
        let (config, state) = genesis_state()?;
        let mut store = new_store(Arc::clone(&config), state.clone())?;
        let genesis_root = store.anchor().block_root;

        let committees = accessors::get_committees(&state, 0)?;
        let committee = committees.committee(0, 0)?;

        let data = AttestationData {
            slot: 0,
            index: 0,
            beacon_block_root: genesis_root,
            source: Checkpoint::default(),
            target: Checkpoint {
                epoch: 0,
                root: genesis_root,
            },
        };

        let mut aggregation_bits = BitList::with_length(committee.len())?;
        let mut signatures = vec![];

        for (position, validator_index) in committee.iter().copied().enumerate() {
            aggregation_bits.set(position, true);
            signatures.push(data.sign(&config, &state, &interop::secret_key(validator_index)));
        }

        let mut signatures = signatures.into_iter();
        let mut signature = signatures.next().expect("committee is not empty");

        for other in signatures {
            signature.aggregate_in_place(other);
        }

        let attestation = Attestation {
            aggregation_bits,
            data,
            signature: signature.into(),
        };

        let error = store
            .on_attestation(&attestation)
            .expect_err("attestation is from the current slot");

        assert!(matches!(
            error.downcast_ref(),
            Some(Error::AttestationFromCurrentOrFutureSlot { .. }),
        ));

        tick_to_slot(&mut store, 1)?;
        store.on_attestation(&attestation)?;

        let expected = LatestMessage {
            epoch: 0,
            beacon_block_root: genesis_root,
        };

        for validator_index in committee.iter().copied() {
            assert_eq!(store.latest_message(validator_index), Some(expected));
        }

        Ok(())
    }

    #[test]
    fn equivocating_votes_are_ignored() -> Result<()> {
        let (config, state) = genesis_state()?;
        let storage = RecordingStorage::default();
        let mut store = new_store(Arc::clone(&config), state.clone())?;
        let genesis_root = store.anchor().block_root;

        tick_to_slot(&mut store, 1)?;

        let a = add_child(&mut store, &storage, genesis_root, 1, 1)?;
        let b = add_child(&mut store, &storage, genesis_root, 1, 2)?;

        vote(&mut store, 0, a);
        vote(&mut store, 1, b);
        vote(&mut store, 2, a.max(b));

        assert_eq!(store.head(), a.max(b));

        let indexed_vote = |beacon_block_root| -> Result<IndexedAttestation<Minimal>> {
            let data = AttestationData {
                slot: 1,
                beacon_block_root,
                target: Checkpoint {
                    epoch: 0,
                    root: genesis_root,
                },
                ..AttestationData::default()
            };

            Ok(IndexedAttestation {
                attesting_indices: ContiguousList::try_from(vec![2])?,
                data,
                signature: data.sign(&config, &state, &interop::secret_key(2)).into(),
            })
        };

        let attester_slashing = AttesterSlashing {
            attestation_1: indexed_vote(a)?,
            attestation_2: indexed_vote(b)?,
        };

        store.on_attester_slashing(&attester_slashing)?;

        assert!(store.is_equivocating(2));
        assert_eq!(store.head(), a.min(b));

        Ok(())
    }

    #[test]
    fn identical_votes_are_not_slashable() -> Result<()> {
        let (config, state) = genesis_state()?;
        let mut store = new_store(config, state)?;

        let attestation = IndexedAttestation::<Minimal> {
            attesting_indices: ContiguousList::try_from(vec![0])?,
            ..IndexedAttestation::default()
        };

        let attester_slashing = AttesterSlashing {
            attestation_1: attestation.clone(),
            attestation_2: attestation,
        };

        let error = store
            .on_attester_slashing(&attester_slashing)
            .expect_err("votes are identical");

        assert!(matches!(
            error.downcast_ref(),
            Some(Error::AttesterSlashingNotSlashable),
        ));

        Ok(())
    }

    #[test]
    fn finalization_prunes_other_branches_and_moves_anchor() -> Result<()> {
        let (config, state) = genesis_state()?;
        let storage = RecordingStorage::default();
        let mut store = new_store(config, state)?;
        let genesis_root = store.anchor().block_root;

        tick_to_slot(&mut store, 9)?;

        let a = add_child(&mut store, &storage, genesis_root, 1, 1)?;
        let b = add_child(&mut store, &storage, genesis_root, 2, 2)?;
        let c = add_child(&mut store, &storage, a, 9, 3)?;

        let checkpoint = Checkpoint { epoch: 1, root: a };

        store.on_checkpoints(&storage, checkpoint, checkpoint)?;

        assert_eq!(store.justified_checkpoint(), checkpoint);
        assert_eq!(store.finalized_checkpoint(), checkpoint);
        assert_eq!(store.anchor().block_root, a);
        assert_eq!(store.block_count(), 2);
        assert!(!store.contains_block(b));
        assert!(!store.contains_block(genesis_root));
        assert_eq!(*storage.archived.borrow(), [genesis_root]);
        assert_eq!(*storage.pruned.borrow(), [b]);
        assert_eq!(store.ancestor(c, 0), None);
        assert_eq!(store.head(), c);

        // Blocks that conflict with finality are rejected.
        let error = add_child(&mut store, &storage, a, 5, 4).expect_err("slot 5 is finalized");

        assert!(matches!(
            error.downcast_ref(),
            Some(Error::BlockNotLaterThanFinalized { .. }),
        ));

        Ok(())
    }

    #[test]
    fn justified_checkpoint_from_other_branch_waits_for_next_epoch() -> Result<()> {
        let (config, state) = genesis_state()?;
        let storage = RecordingStorage::default();
        let mut store = new_store(config, state)?;
        let genesis_root = store.anchor().block_root;
        let finalized_checkpoint = store.finalized_checkpoint();

        tick_to_slot(&mut store, 9)?;

        let a = add_child(&mut store, &storage, genesis_root, 1, 1)?;
        let b = add_child(&mut store, &storage, genesis_root, 2, 2)?;
        let early = Checkpoint { epoch: 1, root: a };

        store.on_checkpoints(&storage, early, finalized_checkpoint)?;

        assert_eq!(store.justified_checkpoint(), early);

        tick_to_slot(&mut store, 20)?;

        let e = add_child(&mut store, &storage, b, 10, 5)?;
        let late = Checkpoint { epoch: 2, root: e };

        assert!(!store.should_update_justified_checkpoint(late));

        store.on_checkpoints(&storage, late, finalized_checkpoint)?;

        assert_eq!(store.justified_checkpoint(), early);
        assert_eq!(store.best_justified_checkpoint(), late);

        tick_to_slot(&mut store, 24)?;

        assert_eq!(store.justified_checkpoint(), late);
        assert_eq!(store.head(), e);

        Ok(())
    }

    #[test]
    fn block_with_unusable_justified_checkpoint_is_not_added() -> Result<()> {
        let (config, state) = genesis_state()?;
        let storage = RecordingStorage::default();
        let mut store = new_store(config, state)?;
        let genesis_root = store.anchor().block_root;
        let justified_checkpoint = store.justified_checkpoint();

        tick_to_slot(&mut store, 1)?;

        let (mut block, mut state) = child(&store, genesis_root, 1, 1);

        state.current_justified_checkpoint = Checkpoint {
            epoch: 1,
            root: H256::repeat_byte(0xee),
        };

        block.message.state_root = state.hash_tree_root();

        let block_root = block.message.hash_tree_root();

        let error = store
            .on_block(&storage, Arc::new(block), Arc::new(state))
            .expect_err("justified block is unknown");

        assert!(matches!(
            error.downcast_ref(),
            Some(Error::UnknownCheckpointBlock { .. }),
        ));

        assert!(!store.contains_block(block_root));
        assert_eq!(store.block_count(), 1);
        assert_eq!(store.justified_checkpoint(), justified_checkpoint);
        assert_eq!(store.best_justified_checkpoint(), justified_checkpoint);

        Ok(())
    }

    #[test]
    fn failed_pruning_keeps_previous_finalized_checkpoint() -> Result<()> {
        let (config, state) = genesis_state()?;
        let storage = RecordingStorage::default();
        let mut store = new_store(config, state)?;
        let genesis_root = store.anchor().block_root;
        let genesis_checkpoint = store.finalized_checkpoint();

        tick_to_slot(&mut store, 9)?;

        let a = add_child(&mut store, &storage, genesis_root, 1, 1)?;
        add_child(&mut store, &storage, genesis_root, 2, 2)?;

        let checkpoint = Checkpoint { epoch: 1, root: a };

        store
            .on_checkpoints(&FailingStorage, checkpoint, checkpoint)
            .expect_err("storage fails to prune");

        assert_eq!(store.finalized_checkpoint(), genesis_checkpoint);
        assert_eq!(store.justified_checkpoint(), genesis_checkpoint);
        assert_eq!(store.anchor().block_root, genesis_root);
        assert_eq!(store.block_count(), 3);

        store.on_checkpoints(&storage, checkpoint, checkpoint)?;

        assert_eq!(store.finalized_checkpoint(), checkpoint);
        assert_eq!(store.anchor().block_root, a);

        Ok(())
    }

    #[test_case(8 => matches None; "target in previous epoch")]
    #[test_case(16 => matches Some(Error::AttestationFromPastEpoch { target_epoch: 0, previous_epoch: 1 }); "target two epochs old")]
    fn attestation_target_age(current_slot: Slot) -> Option<Error> {
        let (config, state) = genesis_state().expect("genesis state can be built");
        let mut store = new_store(config, state).expect("genesis anchor is valid");
        let genesis_root = store.anchor().block_root;

        tick_to_slot(&mut store, current_slot).expect("no checkpoints change");

        let attestation = Attestation {
            data: AttestationData {
                slot: 0,
                beacon_block_root: H256::repeat_byte(0xee),
                target: Checkpoint {
                    epoch: 0,
                    root: genesis_root,
                },
                ..AttestationData::default()
            },
            ..Attestation::default()
        };

        let error = store
            .on_attestation(&attestation)
            .expect_err("attestation votes for an unknown block");

        match error.downcast() {
            Ok(Error::UnknownBeaconBlockRoot { .. }) => None,
            Ok(error) => Some(error),
            Err(error) => panic!("unexpected error: {error:?}"),
        }
    }
}
