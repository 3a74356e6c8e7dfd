use blst::min_pk::SecretKey as RawSecretKey;

use crate::{
    consts::DOMAIN_SEPARATION_TAG, error::Error, public_key::PublicKey, signature::Signature,
};

pub struct SecretKey(RawSecretKey);

impl SecretKey {
    /// Derives a secret key from input keying material as described in EIP-2333.
    pub fn from_seed(seed: [u8; 32]) -> Result<Self, Error> {
        RawSecretKey::key_gen(&seed, &[])
            .map(Self)
            .map_err(|_| Error::InvalidSecretKey)
    }

    /// Interprets `bytes` as a big-endian scalar. Fails if it is zero or not below the curve order.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, Error> {
        RawSecretKey::from_bytes(&bytes)
            .map(Self)
            .map_err(|_| Error::InvalidSecretKey)
    }

    #[must_use]
    pub fn to_public_key(&self) -> PublicKey {
        self.0.sk_to_pk().into()
    }

    #[must_use]
    pub fn sign(&self, message: impl AsRef<[u8]>) -> Signature {
        self.0
            .sign(message.as_ref(), DOMAIN_SEPARATION_TAG, &[])
            .into()
    }
}
