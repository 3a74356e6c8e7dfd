use core::{
    fmt::{Debug, Formatter, Result as FmtResult},
    marker::PhantomData,
};

use arithmetic::UsizeExt as _;
use bitvec::{bitbox, boxed::BitBox, order::Lsb0};
use derivative::Derivative;
use derive_more::{Deref, DerefMut};
use ethereum_types::H256;
use typenum::Unsigned;

use crate::{consts::BITS_PER_CHUNK, error::ReadError, merkle_tree, porcelain::SszHash};

/// Variable-length bitfield with a maximum length, such as attestation aggregation bits.
#[derive(Deref, DerefMut, Derivative)]
#[derivative(Clone(bound = ""), PartialEq(bound = ""), Eq(bound = ""), Default(bound = ""))]
pub struct BitList<N> {
    // The default `bitvec` ordering is `Lsb0`, which matches the byte layout the roots are
    // computed from.
    #[deref]
    #[deref_mut]
    bits: BitBox<u8>,
    #[derivative(PartialEq = "ignore")]
    phantom: PhantomData<N>,
}

impl<N> Debug for BitList<N> {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        formatter.write_str("0b")?;

        for bit in self.bits.iter().by_vals() {
            formatter.write_str(if bit { "1" } else { "0" })?;
        }

        Ok(())
    }
}

impl<N: Unsigned, const SIZE: usize> TryFrom<[bool; SIZE]> for BitList<N> {
    type Error = ReadError;

    fn try_from(bits: [bool; SIZE]) -> Result<Self, Self::Error> {
        Self::validate_length(SIZE)?;
        Ok(Self::from_bit_box(bits.into_iter().collect()))
    }
}

impl<N: Unsigned> SszHash for BitList<N> {
    fn hash_tree_root(&self) -> H256 {
        let depth = N::USIZE.div_ceil(BITS_PER_CHUNK).ilog2_ceil();
        let root = merkle_tree::merkleize_bytes(self.bits.as_raw_slice(), depth);
        merkle_tree::mix_in_length(root, self.len())
    }
}

impl<N> BitList<N> {
    pub fn with_length(length: usize) -> Result<Self, ReadError>
    where
        N: Unsigned,
    {
        Self::validate_length(length)?;
        Ok(Self::from_bit_box(bitbox![u8, Lsb0; 0; length]))
    }

    /// Returns `true` if any bit is set in both `self` and `other`.
    #[must_use]
    pub fn any_in_common(&self, other: &Self) -> bool {
        core::iter::zip(self.bits.as_raw_slice(), other.bits.as_raw_slice())
            .any(|(byte, other_byte)| byte & other_byte != 0)
    }

    fn validate_length(actual: usize) -> Result<(), ReadError>
    where
        N: Unsigned,
    {
        let maximum = N::USIZE;

        if actual > maximum {
            return Err(ReadError::BitListTooLong { maximum, actual });
        }

        Ok(())
    }

    const fn from_bit_box(bits: BitBox<u8>) -> Self {
        Self {
            bits,
            phantom: PhantomData,
        }
    }
}
