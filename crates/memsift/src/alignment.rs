use crate::{error::Error, Address};
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt};

/// The address stride between candidate scan offsets.
///
/// Only strides of 1, 2, 4, 8 or 16 bytes are representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct Alignment(usize);

impl Alignment {
    pub const DEFAULT: Alignment = Alignment(4);

    /// Construct a new alignment, validating the stride.
    pub fn new(step: usize) -> Result<Alignment, Error> {
        match step {
            1 | 2 | 4 | 8 | 16 => Ok(Alignment(step)),
            other => Err(Error::BadAlignment(other)),
        }
    }

    /// The first offset from `base` at which an absolute address is aligned.
    pub fn first_offset(self, base: Address) -> usize {
        let rem = (base.get() % self.0 as u64) as usize;

        if rem == 0 {
            0
        } else {
            self.0 - rem
        }
    }

    /// Get the step for the current alignment.
    pub fn step(self) -> usize {
        self.0
    }
}

impl Default for Alignment {
    fn default() -> Self {
        Alignment::DEFAULT
    }
}

impl From<Alignment> for usize {
    fn from(alignment: Alignment) -> usize {
        alignment.0
    }
}

impl TryFrom<usize> for Alignment {
    type Error = Error;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Alignment::new(value)
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(fmt)
    }
}

#[cfg(test)]
mod tests {
    use super::Alignment;
    use crate::Address;

    #[test]
    fn test_first_offset() {
        let alignment = Alignment::new(4).unwrap();

        assert_eq!(alignment.first_offset(Address::new(0x1000)), 0);
        assert_eq!(alignment.first_offset(Address::new(0x1001)), 3);
        assert_eq!(alignment.first_offset(Address::new(0x1003)), 1);
    }

    #[test]
    fn test_validation() {
        assert!(Alignment::new(8).is_ok());
        assert!(Alignment::new(3).is_err());
        assert!(Alignment::new(0).is_err());
        assert!(Alignment::new(32).is_err());
    }
}
