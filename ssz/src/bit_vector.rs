use core::marker::PhantomData;

use arithmetic::UsizeExt as _;
use bitvec::{bitbox, boxed::BitBox, order::Lsb0};
use derivative::Derivative;
use derive_more::Deref;
use ethereum_types::H256;
use typenum::{NonZero, Unsigned};

use crate::{consts::BITS_PER_CHUNK, merkle_tree, porcelain::SszHash};

/// Fixed-length bitfield, such as the justification bits of a beacon state.
#[derive(Deref, Derivative)]
#[derivative(Clone(bound = ""), PartialEq(bound = ""), Eq(bound = ""), Debug(bound = ""))]
pub struct BitVector<N> {
    #[deref]
    bits: BitBox<u8>,
    #[derivative(PartialEq = "ignore", Debug = "ignore")]
    phantom: PhantomData<N>,
}

impl<N: Unsigned + NonZero> Default for BitVector<N> {
    fn default() -> Self {
        Self {
            bits: bitbox![u8, Lsb0; 0; N::USIZE],
            phantom: PhantomData,
        }
    }
}

impl<N: Unsigned + NonZero> SszHash for BitVector<N> {
    fn hash_tree_root(&self) -> H256 {
        let depth = N::USIZE.div_ceil(BITS_PER_CHUNK).ilog2_ceil();
        merkle_tree::merkleize_bytes(self.bits.as_raw_slice(), depth)
    }
}

impl<N: Unsigned + NonZero> BitVector<N> {
    #[must_use]
    pub fn get(&self, index: usize) -> Option<bool> {
        self.bits.get(index).as_deref().copied()
    }

    pub fn set(&mut self, index: usize, value: bool) {
        assert!(index < N::USIZE);

        self.bits.set(index, value);
    }

    /// Moves every bit one position up, dropping the highest one and clearing bit 0.
    pub fn shift_up_by_1(&mut self) {
        for index in (1..N::USIZE).rev() {
            let lower = self.bits[index - 1];
            self.bits.set(index, lower);
        }

        self.bits.set(0, false);
    }

    /// Returns `true` if every bit in `range` is set.
    #[must_use]
    pub fn all_in(&self, range: core::ops::Range<usize>) -> bool {
        self.bits[range].all()
    }
}

#[cfg(test)]
mod tests {
    use typenum::U4;

    use super::*;

    #[test]
    fn shift_up_by_1_drops_highest_bit() {
        let mut bits = BitVector::<U4>::default();

        bits.set(0, true);
        bits.set(3, true);
        bits.shift_up_by_1();

        assert_eq!(bits.get(0), Some(false));
        assert_eq!(bits.get(1), Some(true));
        assert_eq!(bits.get(3), Some(false));
        assert!(bits.all_in(1..2));
        assert!(!bits.all_in(0..2));
    }

    #[test]
    fn root_is_the_raw_byte_padded_to_a_chunk() {
        let mut bits = BitVector::<U4>::default();

        bits.set(0, true);
        bits.set(2, true);

        let mut expected = H256::zero();
        expected.as_bytes_mut()[0] = 0b0101;

        assert_eq!(bits.hash_tree_root(), expected);
    }
}
