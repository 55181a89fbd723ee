use serde::{Deserialize, Serialize};

/// The sign of a number or offset.
#[derive(Debug, Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sign {
    #[serde(rename = "plus")]
    Plus,
    #[serde(rename = "minus")]
    Minus,
    #[serde(rename = "nosign")]
    NoSign,
}

impl Sign {
    /// Test if the sign is absent.
    pub fn is_none(&self) -> bool {
        matches!(self, Sign::NoSign)
    }
}

impl Default for Sign {
    fn default() -> Self {
        Sign::NoSign
    }
}
