use derive_more::AsRef;
use fixed_hash::construct_fixed_hash;
use ssz::{SszHash, H256};

use crate::{consts::PUBLIC_KEY_COMPRESSED_SIZE, public_key::PublicKey};

construct_fixed_hash! {
    #[derive(AsRef)]
    pub struct PublicKeyBytes(PUBLIC_KEY_COMPRESSED_SIZE);
}

impl From<PublicKey> for PublicKeyBytes {
    #[inline]
    fn from(public_key: PublicKey) -> Self {
        Self(public_key.as_raw().compress())
    }
}

// 48 bytes span 2 chunks.
impl SszHash for PublicKeyBytes {
    #[inline]
    fn hash_tree_root(&self) -> H256 {
        ssz::merkleize_bytes(self, 1)
    }
}
