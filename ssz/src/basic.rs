use ethereum_types::{H256, H32};
use itertools::Itertools as _;

use crate::{consts::BYTES_PER_CHUNK, porcelain::SszHash};

const U64_PACKING_FACTOR: usize = BYTES_PER_CHUNK / size_of::<u64>();

impl SszHash for bool {
    fn hash_tree_root(&self) -> H256 {
        let mut chunk = H256::zero();
        chunk.as_bytes_mut()[0] = u8::from(*self);
        chunk
    }
}

impl SszHash for u64 {
    fn hash_tree_root(&self) -> H256 {
        let mut chunk = H256::zero();
        chunk[..size_of::<Self>()].copy_from_slice(&self.to_le_bytes());
        chunk
    }

    fn chunks(values: &[Self]) -> Vec<H256> {
        values
            .chunks(U64_PACKING_FACTOR)
            .map(|pack| {
                let mut chunk = H256::zero();

                for (bytes, value) in chunk
                    .as_bytes_mut()
                    .chunks_exact_mut(size_of::<Self>())
                    .zip(pack)
                {
                    bytes.copy_from_slice(&value.to_le_bytes());
                }

                chunk
            })
            .collect_vec()
    }

    fn chunk_count(length: usize) -> usize {
        length.div_ceil(U64_PACKING_FACTOR)
    }
}

impl SszHash for H256 {
    fn hash_tree_root(&self) -> H256 {
        *self
    }
}

// `H32` represents 4 byte vectors like fork versions and domain types.
impl SszHash for H32 {
    fn hash_tree_root(&self) -> H256 {
        let mut chunk = H256::zero();
        chunk[..self.as_bytes().len()].copy_from_slice(self.as_bytes());
        chunk
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn u64_hash_tree_root_is_little_endian_and_zero_padded() {
        assert_eq!(
            0x0102_u64.hash_tree_root(),
            H256(hex!(
                "0201000000000000000000000000000000000000000000000000000000000000"
            )),
        );
    }

    #[test]
    fn u64_values_are_packed_four_to_a_chunk() {
        let chunks = u64::chunks(&[1, 2, 3, 4, 5]);

        assert_eq!(chunks.len(), u64::chunk_count(5));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0][8], 2);
        assert_eq!(chunks[0][24], 4);
        assert_eq!(chunks[1], 5_u64.hash_tree_root());
    }
}
