use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const KZT_CURRENCY_CODE: &str = "KZT";
pub const KZT_CURRENCY_CODE_LOWER: &str = "kzt";

//--------------------------------------      Tenge        -----------------------------------------------------------
/// An amount of Kazakhstani tenge, stored as a whole number of tenge.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Tenge(i64);

op!(binary Tenge, Add, add);
op!(binary Tenge, Sub, sub);
op!(inplace Tenge, SubAssign, sub_assign);
op!(unary Tenge, Neg, neg);

impl Mul<i64> for Tenge {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Tenge {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in tenge: {0}")]
pub struct TengeConversionError(String);

impl From<i64> for Tenge {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Tenge {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Tenge {}

impl TryFrom<u64> for Tenge {
    type Error = TengeConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(TengeConversionError(format!("Value {} is too large to convert to Tenge", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Tenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}₸", self.0)
    }
}

impl Tenge {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// `pct` percent of this amount, rounded half-up to the nearest tenge.
    pub fn percent(&self, pct: i64) -> Self {
        Self((self.0 * pct + 50).div_euclid(100))
    }

    /// Clamps negative amounts to zero.
    pub fn or_zero(&self) -> Self {
        if self.0 < 0 {
            Self(0)
        } else {
            *self
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn commission_rounding_is_half_up() {
        assert_eq!(Tenge::from(5000).percent(10), Tenge::from(500));
        assert_eq!(Tenge::from(255).percent(10), Tenge::from(26));
        assert_eq!(Tenge::from(254).percent(10), Tenge::from(25));
        assert_eq!(Tenge::from(0).percent(10), Tenge::from(0));
    }

    #[test]
    fn arithmetic() {
        let a = Tenge::from(1000);
        let b = Tenge::from(300);
        assert_eq!(a + b, Tenge::from(1300));
        assert_eq!(a - b, Tenge::from(700));
        assert_eq!(-b, Tenge::from(-300));
        assert_eq!((b - a).or_zero(), Tenge::from(0));
        let total: Tenge = vec![a, b, b].into_iter().sum();
        assert_eq!(total, Tenge::from(1600));
    }
}
