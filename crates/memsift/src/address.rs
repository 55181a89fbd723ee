//! Abstraction to help deal with virtual addresses.

use crate::{error::Error, Offset, Sign, Size};
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt, str};

#[derive(Clone, Default, Copy, PartialOrd, Ord, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub(crate) u64);

impl Address {
    /// Construct a new address.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Construct a null pointer.
    pub const fn null() -> Self {
        Self(0)
    }

    /// If the address is null.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Access the raw address.
    pub fn get(self) -> u64 {
        self.0
    }

    /// Add an offset in a checked manner.
    pub fn checked_offset(self, offset: Offset) -> Option<Address> {
        offset.checked_apply(self)
    }

    /// Add the given size in a saturating manner.
    pub fn saturating_add(self, rhs: Size) -> Address {
        Address(self.0.saturating_add(rhs.0))
    }

    /// Subtract the given size in a saturating manner.
    pub fn saturating_sub(self, rhs: Size) -> Address {
        Address(self.0.saturating_sub(rhs.0))
    }

    /// Performed a checked add with an address and a size.
    pub fn add(self, rhs: Size) -> Result<Address, Error> {
        let sum = self
            .0
            .checked_add(rhs.0)
            .ok_or_else(|| Error::AddressAdd(self, rhs))?;

        Ok(Address(sum))
    }

    /// Find how far this address offsets another one.
    pub fn offset_of(self, base: Address) -> Offset {
        if self.0 > base.0 {
            Offset::new(Sign::Plus, Size(self.0 - base.0))
        } else if self.0 < base.0 {
            Offset::new(Sign::Minus, Size(base.0 - self.0))
        } else {
            Offset::zero()
        }
    }

    /// Safely convert two addresses into a non-negative size.
    pub fn size_from(self, base: Address) -> Result<Size, Error> {
        if self.0 < base.0 {
            return Err(Error::SizeFrom(self, base));
        }

        Ok(Size(self.0 - base.0))
    }

    /// Test if the current address is aligned with the given size.
    pub fn is_aligned(self, size: Size) -> bool {
        if size.0 == 0 {
            return false;
        }

        (self.0 % size.0) == 0
    }
}

impl str::FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = if s.starts_with("0x") || s.starts_with("0X") {
            &s[2..]
        } else {
            s
        };

        Ok(Address(u64::from_str_radix(s, 16).map_err(|_| {
            Error::MalformedExpression(s.to_string())
        })?))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "0x{:X}", self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, fmt)
    }
}

impl TryFrom<usize> for Address {
    type Error = Error;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Ok(Address(
            u64::try_from(value).map_err(|_| Error::AddressConversion)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::Address;
    use crate::{Sign, Size};

    #[test]
    fn test_offset_of() {
        let a = Address::new(0x2000);
        let b = Address::new(0x1000);

        let offset = a.offset_of(b);
        assert_eq!(offset.sign(), Sign::Plus);
        assert_eq!(offset.abs(), Size::new(0x1000));

        let offset = b.offset_of(a);
        assert_eq!(offset.sign(), Sign::Minus);
        assert_eq!(offset.checked_apply(a), Some(b));

        assert_eq!(a.offset_of(a), crate::Offset::zero());
    }

    #[test]
    fn test_parse() {
        assert_eq!(str::parse::<Address>("0x1234").unwrap(), Address::new(0x1234));
        assert_eq!(str::parse::<Address>("FF").unwrap(), Address::new(0xFF));
        assert!(str::parse::<Address>("zz").is_err());
    }
}
