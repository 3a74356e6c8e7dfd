//! Swap-or-not shuffling of validator indices.
//!
//! Each round picks a pivot and pairs every position `i` with `pivot - i` (mod `n`). A pair is
//! swapped if the bit for the higher position in a hash of the seed, the round and the position's
//! 256-wide window is set. Every round is an involution, so the whole shuffle is a bijection.

use core::num::NonZeroU64;

use anyhow::{ensure, Result};
use bit_field::BitArray as _;
use thiserror::Error;
use types::{phase0::primitives::H256, preset::Preset};

const BITS_PER_HASH: u64 = H256::len_bytes() as u64 * 8;

#[derive(Debug, Error)]
pub enum Error {
    #[error("index {index} is out of bounds for {index_count} indices")]
    IndexOutOfBounds { index: u64, index_count: u64 },
}

/// Reorders `slice` so that `slice[i]` ends up holding the element that was at
/// `shuffle_single(i, slice.len(), seed)`.
///
/// Rounds are applied in reverse so that one pass over the slice per round gives the same result
/// as shuffling every position individually.
pub fn shuffle_slice<P: Preset, T>(slice: &mut [T], seed: H256) -> Result<()> {
    let Some(index_count) = NonZeroU64::new(slice.len().try_into()?) else {
        return Ok(());
    };

    for round in (0..P::SHUFFLE_ROUND_COUNT).rev() {
        let pivot = compute_pivot(seed, round, index_count);
        let mut window = SourceWindow::new(seed, round);

        for index in 0..index_count.get() {
            let flip = (pivot + index_count.get() - index) % index_count;

            // Every pair is visited twice. Handle it from its lower end only.
            if flip <= index {
                continue;
            }

            if window.bit(flip) {
                slice.swap(usize::try_from(index)?, usize::try_from(flip)?);
            }
        }
    }

    Ok(())
}

/// Computes the position that `index` is moved to by the shuffle.
pub fn shuffle_single<P: Preset>(index: u64, index_count: NonZeroU64, seed: H256) -> Result<u64> {
    ensure!(
        index < index_count.get(),
        Error::IndexOutOfBounds {
            index,
            index_count: index_count.get(),
        },
    );

    let shuffled = (0..P::SHUFFLE_ROUND_COUNT).fold(index, |index, round| {
        let pivot = compute_pivot(seed, round, index_count);
        let flip = (pivot + index_count.get() - index) % index_count;
        let position = index.max(flip);

        if SourceWindow::new(seed, round).bit(position) {
            flip
        } else {
            index
        }
    });

    Ok(shuffled)
}

fn compute_pivot(seed: H256, round: u8, index_count: NonZeroU64) -> u64 {
    let hash = hashing::hash_256_8(seed, round);
    let mut bytes = [0; size_of::<u64>()];
    bytes.copy_from_slice(&hash[..size_of::<u64>()]);
    u64::from_le_bytes(bytes) % index_count
}

// Consecutive positions share a source hash, so the last one is kept around.
struct SourceWindow {
    seed: H256,
    round: u8,
    cached: Option<(u64, H256)>,
}

impl SourceWindow {
    const fn new(seed: H256, round: u8) -> Self {
        Self {
            seed,
            round,
            cached: None,
        }
    }

    fn bit(&mut self, position: u64) -> bool {
        let window = position / BITS_PER_HASH;

        let source = match self.cached {
            Some((cached_window, source)) if cached_window == window => source,
            _ => {
                let source = hashing::hash_256_8_32(self.seed, self.round, truncate(window));
                self.cached = Some((window, source));
                source
            }
        };

        let bit_index = usize::from(position.to_le_bytes()[0]);

        source.as_bytes().get_bit(bit_index)
    }
}

// Windows are hashed as 4 byte integers. Registries are far too small for this to lose anything.
#[expect(clippy::cast_possible_truncation)]
const fn truncate(window: u64) -> u32 {
    window as u32
}
