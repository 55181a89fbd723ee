use crate::{Address, Sign, Size};
use serde::{Deserialize, Serialize};
use std::{cmp, fmt};

/// A signed distance between two addresses.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Offset {
    #[serde(default, skip_serializing_if = "Sign::is_none")]
    sign: Sign,
    offset: Size,
}

impl Offset {
    /// Construct a new offset.
    #[inline]
    pub fn new(sign: Sign, offset: Size) -> Self {
        #[cfg(debug_assertions)]
        {
            match sign {
                Sign::NoSign => assert_eq!(offset, Size::new(0)),
                _ => assert_ne!(offset, Size::new(0)),
            }
        }

        Offset { sign, offset }
    }

    /// Construct a zero offset.
    #[inline]
    pub fn zero() -> Self {
        Offset {
            sign: Sign::NoSign,
            offset: Size::new(0),
        }
    }

    /// Apply to the specified address in a checked manner.
    pub fn checked_apply(self, address: Address) -> Option<Address> {
        use self::Sign::*;

        Some(match self {
            Offset { sign: NoSign, .. } => address,
            Offset { sign: Plus, offset } => Address(address.0.checked_add(offset.0)?),
            Offset {
                sign: Minus,
                offset,
            } => Address(address.0.checked_sub(offset.0)?),
        })
    }

    /// Apply to the specified address in a saturating manner.
    pub fn saturating_apply(self, address: Address) -> Address {
        use self::Sign::*;

        match self {
            Offset { sign: NoSign, .. } => address,
            Offset { sign: Plus, offset } => Address(address.0.saturating_add(offset.0)),
            Offset {
                sign: Minus,
                offset,
            } => Address(address.0.saturating_sub(offset.0)),
        }
    }

    /// Return the sign of this offset.
    pub fn sign(self) -> Sign {
        self.sign
    }

    /// Return the absolute distance of this offset.
    pub fn abs(self) -> Size {
        self.offset
    }

    /// Check if the offset is within the given distance.
    pub fn is_within(self, size: Size) -> bool {
        self.offset <= size
    }

    fn as_i128(self) -> i128 {
        match self.sign {
            Sign::Minus => -(self.offset.0 as i128),
            _ => self.offset.0 as i128,
        }
    }
}

impl PartialOrd for Offset {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Offset {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.as_i128().cmp(&other.as_i128())
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Offset {
                sign: Sign::Plus,
                offset,
            }
            | Offset {
                sign: Sign::NoSign,
                offset,
            } => write!(fmt, "0x{}", offset),
            Offset {
                sign: Sign::Minus,
                offset,
            } => write!(fmt, "-0x{}", offset),
        }
    }
}

impl fmt::Debug for Offset {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, fmt)
    }
}

#[cfg(test)]
mod tests {
    use super::Offset;
    use crate::{Address, Sign, Size};

    #[test]
    fn test_apply() {
        use self::Sign::*;

        let base = Address::new(0x1000);

        assert_eq!(
            Offset::new(Plus, Size::new(0x10)).checked_apply(base),
            Some(Address::new(0x1010))
        );
        assert_eq!(
            Offset::new(Minus, Size::new(0x10)).checked_apply(base),
            Some(Address::new(0xFF0))
        );
        assert_eq!(
            Offset::new(Minus, Size::new(0x2000)).checked_apply(base),
            None
        );
        assert_eq!(Offset::zero().checked_apply(base), Some(base));
    }

    #[test]
    fn test_signed_ordering() {
        use self::Sign::*;

        let neg = Offset::new(Minus, Size::new(0x10));
        let zero = Offset::zero();
        let small = Offset::new(Plus, Size::new(0x8));
        let large = Offset::new(Plus, Size::new(0x10));

        let mut offsets = vec![large, neg, small, zero];
        offsets.sort();

        assert_eq!(offsets, vec![neg, zero, small, large]);
    }
}
