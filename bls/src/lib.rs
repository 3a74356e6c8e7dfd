//! BLS12-381 signatures in the minimal-public-key-size variant used by the beacon chain.
//!
//! Public keys and signatures are stored in their compressed forms and only decompressed when a
//! signature has to be checked.

pub use crate::{
    cached_public_key::CachedPublicKey,
    error::Error,
    public_key::PublicKey,
    public_key_bytes::PublicKeyBytes,
    secret_key::SecretKey,
    signature::Signature,
    signature_bytes::SignatureBytes,
};

mod cached_public_key;
mod consts;
mod error;
mod public_key;
mod public_key_bytes;
mod secret_key;
mod signature;
mod signature_bytes;
