use derive_more::AsRef;
use fixed_hash::construct_fixed_hash;
use ssz::{SszHash, H256};

use crate::{consts::SIGNATURE_COMPRESSED_SIZE, signature::Signature};

construct_fixed_hash! {
    #[derive(AsRef)]
    pub struct SignatureBytes(SIGNATURE_COMPRESSED_SIZE);
}

impl From<Signature> for SignatureBytes {
    #[inline]
    fn from(signature: Signature) -> Self {
        Self(signature.as_raw().compress())
    }
}

// 96 bytes span 3 chunks, padded to 4.
impl SszHash for SignatureBytes {
    #[inline]
    fn hash_tree_root(&self) -> H256 {
        ssz::merkleize_bytes(self, 2)
    }
}

impl SignatureBytes {
    /// Compressed point at infinity.
    #[must_use]
    pub fn empty() -> Self {
        let mut bytes = Self::zero();
        bytes.0[0] = 0xc0;
        bytes
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self == Self::empty()
    }
}
