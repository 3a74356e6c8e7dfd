use core::{fmt::Debug, marker::PhantomData};

use arithmetic::UsizeExt as _;
use derivative::Derivative;
use derive_more::{Deref, DerefMut};
use ethereum_types::H256;
use typenum::Unsigned;

use crate::{
    error::ReadError, merkle_tree, porcelain::SszHash, try_from_iterator::TryFromIterator,
};

/// Fixed-length vector, used for ring buffers indexed modulo their length.
#[derive(Deref, DerefMut, Derivative)]
#[derivative(
    Clone(bound = "T: Clone"),
    PartialEq(bound = "T: PartialEq"),
    Eq(bound = "T: Eq"),
    Debug(bound = "T: Debug", transparent = "true")
)]
pub struct ContiguousVector<T, N> {
    #[deref(forward)]
    #[deref_mut(forward)]
    elements: Box<[T]>,
    #[derivative(Debug = "ignore")]
    phantom: PhantomData<N>,
}

impl<T: Default, N: Unsigned> Default for ContiguousVector<T, N> {
    fn default() -> Self {
        Self::new_unchecked(core::iter::repeat_with(T::default).take(N::USIZE).collect())
    }
}

impl<T, N: Unsigned> TryFromIterator<T> for ContiguousVector<T, N> {
    type Error = ReadError;

    fn try_from_iter(items: impl IntoIterator<Item = T>) -> Result<Self, Self::Error> {
        let elements = items.into_iter().collect::<Box<_>>();
        let expected = N::USIZE;
        let actual = elements.len();

        if actual != expected {
            return Err(ReadError::VectorSizeMismatch { expected, actual });
        }

        Ok(Self::new_unchecked(elements))
    }
}

impl<'vector, T, N> IntoIterator for &'vector ContiguousVector<T, N> {
    type Item = &'vector T;
    type IntoIter = core::slice::Iter<'vector, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

impl<T: SszHash, N: Unsigned> SszHash for ContiguousVector<T, N> {
    fn hash_tree_root(&self) -> H256 {
        let depth = T::chunk_count(N::USIZE).ilog2_ceil();
        merkle_tree::merkleize_chunks(T::chunks(&self.elements), depth)
    }
}

impl<T, N: Unsigned> ContiguousVector<T, N> {
    #[must_use]
    pub fn repeat_element(element: T) -> Self
    where
        T: Clone,
    {
        Self::new_unchecked(vec![element; N::USIZE].into())
    }

    /// Looks up the element at `index mod N`.
    #[must_use]
    pub fn mod_index(&self, index: u64) -> &T {
        &self.elements[Self::reduce(index)]
    }

    pub fn mod_index_mut(&mut self, index: u64) -> &mut T {
        &mut self.elements[Self::reduce(index)]
    }

    fn reduce(index: u64) -> usize {
        (index % N::U64)
            .try_into()
            .expect("N fits in usize because the vector has N elements in memory")
    }

    const fn new_unchecked(elements: Box<[T]>) -> Self {
        Self {
            elements,
            phantom: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use typenum::{U4, U8};

    use super::*;

    #[test]
    fn mod_index_wraps_around() {
        let mut vector = ContiguousVector::<u64, U4>::default();

        *vector.mod_index_mut(6) = 9;

        assert_eq!(vector[2], 9);
        assert_eq!(*vector.mod_index(10), 9);
    }

    #[test]
    fn try_from_iter_rejects_wrong_length() {
        assert_eq!(
            ContiguousVector::<u64, U8>::try_from_iter([1, 2, 3]),
            Err(ReadError::VectorSizeMismatch {
                expected: 8,
                actual: 3,
            }),
        );
    }

    #[test]
    fn packed_vector_root_matches_manual_merkleization() {
        let vector = ContiguousVector::<u64, U8>::try_from_iter(1..=8).expect("length matches");

        let expected = merkle_tree::merkleize_chunks(u64::chunks(&[1, 2, 3, 4, 5, 6, 7, 8]), 1);

        assert_eq!(vector.hash_tree_root(), expected);
    }
}
