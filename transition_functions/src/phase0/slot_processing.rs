use anyhow::{ensure, Result};
use helper_functions::misc;
use types::{
    config::Config,
    phase0::{beacon_state::BeaconState, primitives::Slot},
    preset::Preset,
};

use super::epoch_processing;
use crate::unphased::{self, Error};

/// Advances `state` to `slot`, running epoch processing at every epoch boundary crossed.
pub fn process_slots<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    slot: Slot,
) -> Result<()> {
    ensure!(
        state.slot < slot,
        Error::SlotNotLater {
            current: state.slot,
            target: slot,
        },
    );

    while state.slot < slot {
        unphased::process_slot(state);

        // > Process epoch on the start slot of the next epoch
        if misc::is_epoch_start::<P>(state.slot + 1) {
            epoch_processing::process_epoch(config, state)?;
        }

        state.slot += 1;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use core::num::NonZeroU64;

    use types::preset::Minimal;

    use crate::unphased::ErrorKind;

    use super::*;

    fn genesis_state() -> Result<(Config, BeaconState<Minimal>)> {
        let config = Config::minimal();
        let validator_count = NonZeroU64::new(16).expect("count is nonzero");
        let state = interop::quick_start_beacon_state(&config, 0, validator_count)?;
        Ok((config, state))
    }

    #[test]
    fn slots_must_advance() -> Result<()> {
        let (config, mut state) = genesis_state()?;
        let original = state.clone();

        let error = process_slots(&config, &mut state, 0).expect_err("slot 0 is not later");

        assert_eq!(ErrorKind::of(&error), ErrorKind::OutOfRange);
        assert_eq!(state, original);

        Ok(())
    }

    #[test]
    fn crossing_an_epoch_boundary_caches_roots_of_every_slot() -> Result<()> {
        let (config, mut state) = genesis_state()?;

        process_slots(&config, &mut state, 10)?;

        assert_eq!(state.slot, 10);
        assert_eq!(state.previous_shuffling_epoch, 0);

        // No blocks were applied, so every cached block root is the genesis block root.
        let genesis_block_root = *state.block_roots.mod_index(0);

        assert!((1..10).all(|slot| *state.block_roots.mod_index(slot) == genesis_block_root));
        assert!(!state.latest_block_header.state_root.is_zero());

        Ok(())
    }

    #[test]
    fn processing_in_steps_matches_processing_at_once() -> Result<()> {
        let (config, mut in_steps) = genesis_state()?;
        let mut at_once = in_steps.clone();

        for slot in [3, 7, 8, 17] {
            process_slots(&config, &mut in_steps, slot)?;
        }

        process_slots(&config, &mut at_once, 17)?;

        assert_eq!(in_steps, at_once);

        Ok(())
    }
}
