use core::{fmt::Debug, marker::PhantomData};

use arithmetic::UsizeExt as _;
use derivative::Derivative;
use derive_more::{Deref, DerefMut};
use ethereum_types::H256;
use typenum::Unsigned;

use crate::{
    error::{IndexError, PushError, ReadError},
    merkle_tree,
    porcelain::SszHash,
    try_from_iterator::TryFromIterator,
};

/// List with a maximum length known at compile time.
///
/// Elements can be mutated in place through `DerefMut`, but the length only changes through
/// [`ContiguousList::push`], which enforces the maximum.
#[derive(Deref, DerefMut, Derivative)]
#[derivative(
    Clone(bound = "T: Clone"),
    PartialEq(bound = "T: PartialEq"),
    Eq(bound = "T: Eq"),
    Default(bound = ""),
    Debug(bound = "T: Debug", transparent = "true")
)]
pub struct ContiguousList<T, N> {
    #[deref(forward)]
    #[deref_mut(forward)]
    elements: Vec<T>,
    #[derivative(Debug = "ignore")]
    phantom: PhantomData<N>,
}

impl<T, N: Unsigned> TryFrom<Vec<T>> for ContiguousList<T, N> {
    type Error = ReadError;

    fn try_from(elements: Vec<T>) -> Result<Self, Self::Error> {
        Self::validate_length(elements.len())?;
        Ok(Self::new_unchecked(elements))
    }
}

impl<T, N: Unsigned, const SIZE: usize> TryFrom<[T; SIZE]> for ContiguousList<T, N> {
    type Error = ReadError;

    fn try_from(array: [T; SIZE]) -> Result<Self, Self::Error> {
        Self::try_from_iter(array)
    }
}

impl<T, N: Unsigned> TryFromIterator<T> for ContiguousList<T, N> {
    type Error = ReadError;

    fn try_from_iter(items: impl IntoIterator<Item = T>) -> Result<Self, Self::Error> {
        items.into_iter().collect::<Vec<_>>().try_into()
    }
}

impl<T, N> IntoIterator for ContiguousList<T, N> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.into_iter()
    }
}

impl<'list, T, N> IntoIterator for &'list ContiguousList<T, N> {
    type Item = &'list T;
    type IntoIter = core::slice::Iter<'list, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

impl<T: SszHash, N: Unsigned> SszHash for ContiguousList<T, N> {
    fn hash_tree_root(&self) -> H256 {
        let depth = T::chunk_count(N::USIZE).ilog2_ceil();
        let root = merkle_tree::merkleize_chunks(T::chunks(&self.elements), depth);
        merkle_tree::mix_in_length(root, self.len())
    }
}

impl<T, N> ContiguousList<T, N> {
    pub fn get(&self, index: u64) -> Result<&T, IndexError> {
        let length = self.len();

        usize::try_from(index)
            .ok()
            .and_then(|position| self.elements.get(position))
            .ok_or(IndexError { index, length })
    }

    pub fn get_mut(&mut self, index: u64) -> Result<&mut T, IndexError> {
        let length = self.len();

        usize::try_from(index)
            .ok()
            .and_then(|position| self.elements.get_mut(position))
            .ok_or(IndexError { index, length })
    }

    pub fn push(&mut self, element: T) -> Result<(), PushError>
    where
        N: Unsigned,
    {
        let maximum = N::USIZE;

        if self.len() >= maximum {
            return Err(PushError { maximum });
        }

        self.elements.push(element);

        Ok(())
    }

    #[must_use]
    pub fn len_u64(&self) -> u64 {
        self.len()
            .try_into()
            .expect("list lengths fit in u64")
    }

    /// Removes all elements, keeping the allocation.
    pub fn clear(&mut self) {
        self.elements.clear();
    }

    fn validate_length(actual: usize) -> Result<(), ReadError>
    where
        N: Unsigned,
    {
        let maximum = N::USIZE;

        if actual > maximum {
            return Err(ReadError::ListTooLong { maximum, actual });
        }

        Ok(())
    }

    const fn new_unchecked(elements: Vec<T>) -> Self {
        Self {
            elements,
            phantom: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use typenum::U2;

    use super::*;

    #[test]
    fn push_respects_maximum_length() {
        let mut list = ContiguousList::<u64, U2>::default();

        assert_eq!(list.push(1), Ok(()));
        assert_eq!(list.push(2), Ok(()));
        assert_eq!(list.push(3), Err(PushError { maximum: 2 }));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn get_reports_out_of_bounds_index() {
        let list = ContiguousList::<u64, U2>::try_from([7]).expect("list is short enough");

        assert_eq!(list.get(0), Ok(&7));
        assert_eq!(list.get(1), Err(IndexError { index: 1, length: 1 }));
    }

    #[test]
    fn try_from_rejects_overlong_input() {
        assert_eq!(
            ContiguousList::<u64, U2>::try_from(vec![1, 2, 3]),
            Err(ReadError::ListTooLong {
                maximum: 2,
                actual: 3,
            }),
        );
    }

    #[test]
    fn root_mixes_in_length() {
        let empty = ContiguousList::<u64, U2>::default();
        let zero = ContiguousList::<u64, U2>::try_from([0]).expect("list is short enough");

        assert_ne!(empty.hash_tree_root(), zero.hash_tree_root());
    }
}
