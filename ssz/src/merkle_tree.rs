// Trees are built bottom up, one layer at a time:
// ```text
// height 2           0                   1
//               ┌────┴────┐         ┌────┴────┐
// height 1      0         1         2         Z₁
//             ┌─┴─┐     ┌─┴─┐     ┌─┴─┐
// height 0    0   1     2   3     4   Z₀
// ```
// Layers with an odd number of nodes are padded with the root of an empty subtree of the same
// height (`Zₕ` above), so the cost is linear in the number of chunks rather than in the limit.

use arithmetic::UsizeExt as _;
use ethereum_types::H256;
use hashing::ZERO_HASHES;
use itertools::Itertools as _;

use crate::consts::BYTES_PER_CHUNK;

#[must_use]
pub fn merkleize_chunks(chunks: impl IntoIterator<Item = H256>, depth: u8) -> H256 {
    let mut layer = chunks.into_iter().collect_vec();

    debug_assert!(layer.len() <= 1_usize << depth);

    for height in 0..usize::from(depth) {
        if layer.len() % 2 == 1 {
            layer.push(ZERO_HASHES[height]);
        }

        layer = layer
            .into_iter()
            .tuples()
            .map(|(left, right)| hashing::hash_256_256(left, right))
            .collect();
    }

    layer
        .first()
        .copied()
        .unwrap_or(ZERO_HASHES[usize::from(depth)])
}

#[must_use]
pub fn merkleize_bytes(bytes: impl AsRef<[u8]>, depth: u8) -> H256 {
    let chunks = bytes.as_ref().chunks(BYTES_PER_CHUNK).map(|partial_chunk| {
        let mut chunk = H256::zero();
        chunk[..partial_chunk.len()].copy_from_slice(partial_chunk);
        chunk
    });

    merkleize_chunks(chunks, depth)
}

#[must_use]
pub fn mix_in_length(root: H256, length: usize) -> H256 {
    let length = u64::try_from(length).expect("collection lengths fit in u64");

    let mut length_chunk = H256::zero();
    length_chunk[..size_of::<u64>()].copy_from_slice(&length.to_le_bytes());

    hashing::hash_256_256(root, length_chunk)
}

/// Root of a container given the roots of its fields in declaration order.
#[must_use]
pub fn hash_container(field_roots: &[H256]) -> H256 {
    merkleize_chunks(field_roots.iter().copied(), field_roots.len().ilog2_ceil())
}

/// Sibling hashes on the path from chunk `index` to the root, leaf level first.
///
/// This is the proof format expected by `is_valid_merkle_branch`.
#[must_use]
pub fn merkle_proof(chunks: &[H256], index: usize, depth: u8) -> Vec<H256> {
    let mut layer = chunks.to_vec();
    let mut position = index;
    let mut proof = Vec::with_capacity(depth.into());

    for height in 0..usize::from(depth) {
        if layer.len() % 2 == 1 {
            layer.push(ZERO_HASHES[height]);
        }

        let sibling = layer
            .get(position ^ 1)
            .copied()
            .unwrap_or(ZERO_HASHES[height]);

        proof.push(sibling);

        layer = layer
            .into_iter()
            .tuples()
            .map(|(left, right)| hashing::hash_256_256(left, right))
            .collect();

        position /= 2;
    }

    proof
}
