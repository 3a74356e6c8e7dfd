use core::num::NonZeroU64;

use easy_ext::ext;
use typenum::{NonZero, Unsigned};

#[ext(NonZeroExt)]
pub impl<N: Unsigned + NonZero> N {
    #[inline]
    #[must_use]
    fn non_zero() -> NonZeroU64 {
        Self::U64
            .try_into()
            .expect("the bound on N ensures that it is nonzero")
    }
}

#[ext(UsizeExt)]
pub impl usize {
    /// Depth of the smallest perfect binary tree with at least `self` leaves.
    #[inline]
    #[must_use]
    fn ilog2_ceil(self) -> u8 {
        self.checked_next_power_of_two()
            .map_or(Self::BITS, Self::trailing_zeros)
            .try_into()
            .expect("number of bits in usize should fit in u8")
    }
}

#[ext(U64Ext)]
pub impl u64 {
    #[inline]
    #[must_use]
    fn prev_multiple_of(self, factor: NonZeroU64) -> Self {
        self - self % factor
    }

    #[inline]
    #[must_use]
    fn div_typenum<N: Unsigned + NonZero>(self) -> Self {
        self / N::U64
    }

    #[inline]
    #[must_use]
    fn mod_typenum<N: Unsigned + NonZero>(self) -> Self {
        self % N::U64
    }

    /// Computes `self * numerator / denominator` without overflowing the intermediate product.
    ///
    /// Callers must ensure `numerator <= denominator`.
    #[inline]
    #[must_use]
    fn mul_div(self, numerator: Self, denominator: NonZeroU64) -> Self {
        let product = u128::from(self) * u128::from(numerator);
        let quotient = product / u128::from(denominator.get());

        quotient
            .try_into()
            .expect("quotient does not exceed self when numerator does not exceed denominator")
    }
}
