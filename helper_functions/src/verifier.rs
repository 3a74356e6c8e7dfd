#![expect(clippy::module_name_repetitions)]

use anyhow::{ensure, Result};
use bls::{CachedPublicKey, PublicKey, Signature, SignatureBytes};
use derive_more::Constructor;
use rayon::iter::{IntoParallelRefIterator as _, ParallelIterator as _};
use static_assertions::assert_not_impl_any;
use types::phase0::primitives::H256;

use crate::error::{Error, SignatureKind};

/// Strategy for checking signatures encountered during a state transition.
///
/// Implementations may check signatures immediately, defer them to [`Verifier::finish`], or skip
/// them entirely.
pub trait Verifier {
    const IS_NULL: bool;

    fn reserve(&mut self, additional: usize);

    fn verify_singular(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        cached_public_key: &CachedPublicKey,
        signature_kind: SignatureKind,
    ) -> Result<()>;

    fn verify_aggregate<'keys>(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_keys: impl IntoIterator<Item = &'keys PublicKey>,
        signature_kind: SignatureKind,
    ) -> Result<()>;

    fn extend(
        &mut self,
        triples: impl IntoIterator<Item = Triple>,
        signature_kind: SignatureKind,
    ) -> Result<()>;

    fn finish(&self) -> Result<()>;
}

impl<V: Verifier> Verifier for &mut V {
    const IS_NULL: bool = V::IS_NULL;

    #[inline]
    fn reserve(&mut self, additional: usize) {
        (*self).reserve(additional);
    }

    #[inline]
    fn verify_singular(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        cached_public_key: &CachedPublicKey,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        (*self).verify_singular(message, signature_bytes, cached_public_key, signature_kind)
    }

    #[inline]
    fn verify_aggregate<'keys>(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_keys: impl IntoIterator<Item = &'keys PublicKey>,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        (*self).verify_aggregate(message, signature_bytes, public_keys, signature_kind)
    }

    #[inline]
    fn extend(
        &mut self,
        triples: impl IntoIterator<Item = Triple>,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        (*self).extend(triples, signature_kind)
    }

    #[inline]
    fn finish(&self) -> Result<()> {
        (**self).finish()
    }
}

/// Accepts every signature. Used for trusted blocks.
pub struct NullVerifier;

impl Verifier for NullVerifier {
    const IS_NULL: bool = true;

    #[inline]
    fn reserve(&mut self, _additional: usize) {}

    #[inline]
    fn verify_singular(
        &mut self,
        _message: H256,
        _signature_bytes: SignatureBytes,
        _cached_public_key: &CachedPublicKey,
        _signature_kind: SignatureKind,
    ) -> Result<()> {
        Ok(())
    }

    #[inline]
    fn verify_aggregate<'keys>(
        &mut self,
        _message: H256,
        _signature_bytes: SignatureBytes,
        _public_keys: impl IntoIterator<Item = &'keys PublicKey>,
        _signature_kind: SignatureKind,
    ) -> Result<()> {
        Ok(())
    }

    #[inline]
    fn extend(
        &mut self,
        _triples: impl IntoIterator<Item = Triple>,
        _signature_kind: SignatureKind,
    ) -> Result<()> {
        Ok(())
    }

    #[inline]
    fn finish(&self) -> Result<()> {
        Ok(())
    }
}

/// Checks every signature as soon as it is encountered.
pub struct SingleVerifier;

impl Verifier for SingleVerifier {
    const IS_NULL: bool = false;

    #[inline]
    fn reserve(&mut self, _additional: usize) {}

    #[inline]
    fn verify_singular(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        cached_public_key: &CachedPublicKey,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        let public_key = *cached_public_key.decompress()?;
        let triple = Triple::new(message, signature_bytes, public_key);
        self.extend(core::iter::once(triple), signature_kind)
    }

    #[inline]
    fn verify_aggregate<'keys>(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_keys: impl IntoIterator<Item = &'keys PublicKey>,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        let signature = Signature::try_from(signature_bytes)?;

        ensure!(
            signature.fast_aggregate_verify(message, public_keys),
            Error::SignatureInvalid(signature_kind),
        );

        Ok(())
    }

    #[inline]
    fn extend(
        &mut self,
        triples: impl IntoIterator<Item = Triple>,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        for triple in triples {
            let Triple {
                message,
                signature_bytes,
                public_key,
            } = triple;

            let signature = Signature::try_from(signature_bytes)?;

            ensure!(
                signature.verify(message, &public_key),
                Error::SignatureInvalid(signature_kind),
            );
        }

        Ok(())
    }

    #[inline]
    fn finish(&self) -> Result<()> {
        Ok(())
    }
}

/// Collects signatures and checks all of them at once in [`Verifier::finish`].
///
/// Aggregate signatures are reduced to a single triple by aggregating their public keys.
#[derive(Default)]
pub struct MultiVerifier {
    triples: Vec<Triple>,
}

impl Verifier for MultiVerifier {
    const IS_NULL: bool = false;

    #[inline]
    fn reserve(&mut self, additional: usize) {
        self.triples.reserve_exact(additional);
    }

    #[inline]
    fn verify_singular(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        cached_public_key: &CachedPublicKey,
        _signature_kind: SignatureKind,
    ) -> Result<()> {
        let public_key = *cached_public_key.decompress()?;
        let triple = Triple::new(message, signature_bytes, public_key);
        self.triples.push(triple);
        Ok(())
    }

    #[inline]
    fn verify_aggregate<'keys>(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_keys: impl IntoIterator<Item = &'keys PublicKey>,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        let public_key =
            PublicKey::aggregate(public_keys).ok_or(Error::SignatureInvalid(signature_kind))?;

        self.triples
            .push(Triple::new(message, signature_bytes, public_key));

        Ok(())
    }

    #[inline]
    fn extend(
        &mut self,
        triples: impl IntoIterator<Item = Triple>,
        _signature_kind: SignatureKind,
    ) -> Result<()> {
        self.triples.extend(triples);
        Ok(())
    }

    #[inline]
    fn finish(&self) -> Result<()> {
        if self.triples.is_empty() {
            return Ok(());
        }

        let messages = self.triples.iter().map(|triple| triple.message.as_bytes());

        let signatures = self
            .triples
            .par_iter()
            .map(|triple| Signature::try_from(triple.signature_bytes))
            .collect::<Result<Vec<_>, _>>()?;

        let public_keys = self.triples.iter().map(|triple| &triple.public_key);

        ensure!(
            Signature::multi_verify(messages, &signatures, public_keys),
            Error::SignatureInvalid(SignatureKind::Multi),
        );

        Ok(())
    }
}

impl From<Vec<Triple>> for MultiVerifier {
    fn from(triples: Vec<Triple>) -> Self {
        Self { triples }
    }
}

#[derive(Default, Constructor)]
pub struct Triple {
    message: H256,
    signature_bytes: SignatureBytes,
    public_key: PublicKey,
}

// Copying a triple by accident would let a caller keep using it after handing it to a verifier.
assert_not_impl_any!(Triple: Copy);
