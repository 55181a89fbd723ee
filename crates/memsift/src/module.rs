use crate::{Address, AddressRange, Size};
use serde::{Deserialize, Serialize};

/// A module loaded into the remote process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub name: String,
    pub path: String,
    pub base: Address,
    pub size: Size,
}

impl ModuleDescriptor {
    /// The range of addresses owned by the module.
    pub fn range(&self) -> AddressRange {
        AddressRange::new(self.base, self.size)
    }

    /// The file name component of the module path.
    pub fn short_name(&self) -> &str {
        self.path
            .rsplit(|c| c == '/' || c == '\\')
            .next()
            .unwrap_or(self.path.as_str())
    }

    /// Test if a query names this module, either by its registered name, its
    /// full path, or the file name of its path. Case-insensitive.
    pub fn matches_name(&self, query: &str) -> bool {
        self.name.eq_ignore_ascii_case(query)
            || self.path.eq_ignore_ascii_case(query)
            || self.short_name().eq_ignore_ascii_case(query)
    }
}

#[cfg(test)]
mod tests {
    use super::ModuleDescriptor;
    use crate::{Address, Size};

    fn module() -> ModuleDescriptor {
        ModuleDescriptor {
            name: String::from("game"),
            path: String::from("/opt/game/libgame-2.so"),
            base: Address::new(0x7F0000000000),
            size: Size::new(0x10000),
        }
    }

    #[test]
    fn test_short_name() {
        assert_eq!(module().short_name(), "libgame-2.so");
    }

    #[test]
    fn test_matches_name() {
        let m = module();

        assert!(m.matches_name("game"));
        assert!(m.matches_name("GAME"));
        assert!(m.matches_name("libgame-2.so"));
        assert!(m.matches_name("/opt/game/libgame-2.so"));
        assert!(!m.matches_name("other"));
    }
}
