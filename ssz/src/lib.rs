//! Structural hashing of the containers and collections used by the consensus kernel.
//!
//! Only `hash_tree_root` is provided. Byte-level serialization is done by the surrounding layers,
//! which hand the kernel fully deserialized values.

pub use ethereum_types::H256;
pub use hashing;

pub use crate::{
    bit_list::BitList,
    bit_vector::BitVector,
    contiguous_list::ContiguousList,
    contiguous_vector::ContiguousVector,
    error::{IndexError, PushError, ReadError},
    merkle_tree::{
        hash_container, merkle_proof, merkleize_bytes, merkleize_chunks, mix_in_length,
    },
    porcelain::SszHash,
    try_from_iterator::TryFromIterator,
};

mod basic;
mod bit_list;
mod bit_vector;
mod consts;
mod contiguous_list;
mod contiguous_vector;
mod error;
mod merkle_tree;
mod porcelain;
mod try_from_iterator;
