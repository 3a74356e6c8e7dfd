use std::sync::LazyLock;

use ethereum_types::H256;
use generic_array::GenericArray;
use sha2::{
    digest::{core_api::BlockSizeUser, generic_array::typenum::Unsigned as _},
    Digest as _, Sha256,
};

/// Deepest Merkle tree the kernel hashes. Validator lists with a limit of 2⁴⁰ need all of them.
pub const MAX_TREE_DEPTH: usize = 40;

/// Roots of perfect binary trees of zero chunks, indexed by height.
pub static ZERO_HASHES: LazyLock<[H256; MAX_TREE_DEPTH + 1]> = LazyLock::new(|| {
    let mut hashes = [H256::zero(); MAX_TREE_DEPTH + 1];

    for height in 1..=MAX_TREE_DEPTH {
        hashes[height] = hash_256_256(hashes[height - 1], hashes[height - 1]);
    }

    hashes
});

type Sha256BlockSize = <Sha256 as BlockSizeUser>::BlockSize;
type Sha256Block = GenericArray<u8, Sha256BlockSize>;

// Pair hashing dominates Merkleization. The second block holds nothing but padding for a
// 512 bit message, so it can be built once instead of going through the streaming API.
const PADDING_BLOCK_FOR_512_BITS: [u8; Sha256BlockSize::USIZE] = {
    let mut block = [0; Sha256BlockSize::USIZE];
    block[0] = 0x80;
    block[Sha256BlockSize::USIZE - 2] = 0x02;
    block
};

#[rustfmt::skip]
const SHA256_INITIAL_STATE: [u32; 8] = [
    0x6a09_e667, 0xbb67_ae85, 0x3c6e_f372, 0xa54f_f53a,
    0x510e_527f, 0x9b05_688c, 0x1f83_d9ab, 0x5be0_cd19,
];

/// Hashes arbitrary bytes.
#[inline]
#[must_use]
pub fn hash(bytes: impl AsRef<[u8]>) -> H256 {
    H256::from_slice(Sha256::digest(bytes.as_ref()).as_slice())
}

#[inline]
#[must_use]
pub fn hash_256_256(left: H256, right: H256) -> H256 {
    let mut block = Sha256Block::default();
    block[..32].copy_from_slice(left.as_bytes());
    block[32..].copy_from_slice(right.as_bytes());

    let padding_block = *Sha256Block::from_slice(&PADDING_BLOCK_FOR_512_BITS);

    let mut state = SHA256_INITIAL_STATE;
    sha2::compress256(&mut state, &[block, padding_block]);

    let mut output = H256::zero();

    for (bytes, word) in output.as_bytes_mut().chunks_exact_mut(4).zip(state) {
        bytes.copy_from_slice(&word.to_be_bytes());
    }

    output
}

/// Used to compute shuffling pivots.
#[inline]
#[must_use]
pub fn hash_256_8(seed: H256, round: u8) -> H256 {
    let mut input = [0; 32 + 1];
    input[..32].copy_from_slice(seed.as_bytes());
    input[32] = round;
    hash(input)
}

/// Used to compute the source of shuffling flip bits.
#[inline]
#[must_use]
pub fn hash_256_8_32(seed: H256, round: u8, position_window: u32) -> H256 {
    let mut input = [0; 32 + 1 + 4];
    input[..32].copy_from_slice(seed.as_bytes());
    input[32] = round;
    input[33..].copy_from_slice(&position_window.to_le_bytes());
    hash(input)
}

/// Used to compute seeds from a domain type, an epoch and a randao mix.
#[inline]
#[must_use]
pub fn hash_32_64_256(domain_type: [u8; 4], epoch: u64, mix: H256) -> H256 {
    let mut input = [0; 4 + 8 + 32];
    input[..4].copy_from_slice(&domain_type);
    input[4..12].copy_from_slice(&epoch.to_le_bytes());
    input[12..].copy_from_slice(mix.as_bytes());
    hash(input)
}

/// Used to hash randao reveals, which are compressed BLS signatures.
#[inline]
#[must_use]
pub fn hash_768(bytes: impl AsRef<[u8; 96]>) -> H256 {
    hash(bytes.as_ref())
}
