use core::fmt::{Debug, Formatter, Result as FmtResult};

use derivative::Derivative;
use once_cell::race::OnceBox;
use ssz::{SszHash, H256};

use crate::{error::Error, public_key::PublicKey, public_key_bytes::PublicKeyBytes};

/// Compressed public key that remembers its decompressed form once it has been needed.
#[derive(Default, Derivative)]
#[derivative(PartialEq, Eq)]
pub struct CachedPublicKey {
    bytes: PublicKeyBytes,
    #[derivative(PartialEq = "ignore")]
    decompressed: OnceBox<PublicKey>,
}

// `OnceBox` does not implement `Clone`.
impl Clone for CachedPublicKey {
    fn clone(&self) -> Self {
        match self.decompressed.get().copied() {
            Some(public_key) => Self::new(self.bytes, public_key),
            None => self.bytes.into(),
        }
    }
}

impl Debug for CachedPublicKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        formatter
            .debug_struct("CachedPublicKey")
            .field("bytes", &self.bytes)
            .finish()
    }
}

impl From<PublicKeyBytes> for CachedPublicKey {
    #[inline]
    fn from(bytes: PublicKeyBytes) -> Self {
        Self {
            bytes,
            decompressed: OnceBox::new(),
        }
    }
}

impl From<PublicKey> for CachedPublicKey {
    #[inline]
    fn from(public_key: PublicKey) -> Self {
        Self::new(public_key.into(), public_key)
    }
}

impl SszHash for CachedPublicKey {
    #[inline]
    fn hash_tree_root(&self) -> H256 {
        self.bytes.hash_tree_root()
    }
}

impl CachedPublicKey {
    fn new(bytes: PublicKeyBytes, public_key: PublicKey) -> Self {
        let decompressed = OnceBox::new();
        decompressed
            .set(Box::new(public_key))
            .expect("decompressed is empty because OnceBox::new returns an empty cell");

        Self {
            bytes,
            decompressed,
        }
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &PublicKeyBytes {
        &self.bytes
    }

    #[must_use]
    pub const fn to_bytes(&self) -> PublicKeyBytes {
        self.bytes
    }

    #[inline]
    pub fn decompress(&self) -> Result<&PublicKey, Error> {
        self.decompressed
            .get_or_try_init(|| self.bytes.try_into().map(Box::new))
    }
}

#[cfg(test)]
mod tests {
    use crate::SecretKey;

    use super::*;

    #[test]
    fn decompressing_garbage_fails() {
        let cached = CachedPublicKey::from(PublicKeyBytes::repeat_byte(0xff));

        assert_eq!(cached.decompress(), Err(Error::InvalidPublicKey));
    }

    #[test]
    fn decompressed_key_matches_original() -> Result<(), Error> {
        let public_key = SecretKey::from_seed([1; 32])?.to_public_key();
        let cached = CachedPublicKey::from(PublicKeyBytes::from(public_key));

        assert_eq!(cached.decompress()?, &public_key);
        assert_eq!(cached.clone(), cached);

        Ok(())
    }
}
