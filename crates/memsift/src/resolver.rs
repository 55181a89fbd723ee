//! Translation between absolute addresses and `module+0xOFF` expressions.

use crate::{error::Error, Address, ModuleDescriptor, Offset, Sign, Size};

/// Resolves symbolic address expressions against a module snapshot.
///
/// Expressions are either plain literals (`0x1234`, `4096`, `DEADBEEF`) or a
/// module anchor with an offset (`libgame.so+0x10`, `game.exe-0x8`). Encoding
/// picks the module owning an address and renders `<name>+0x<OFF>`, so
/// `resolve(encode(a))` round-trips for any address owned by a module.
pub struct AddressResolver {
    modules: Vec<ModuleDescriptor>,
}

impl AddressResolver {
    /// Construct a new resolver over the given module snapshot.
    pub fn new(mut modules: Vec<ModuleDescriptor>) -> AddressResolver {
        modules.sort_by_key(|m| m.base);
        AddressResolver { modules }
    }

    /// Access the module snapshot, sorted by base address.
    pub fn modules(&self) -> &[ModuleDescriptor] {
        &self.modules
    }

    /// Parse an address expression.
    pub fn resolve(&self, expr: &str) -> Result<Address, Error> {
        let expr = expr.trim();

        if expr.is_empty() {
            return Err(Error::MalformedExpression(expr.to_string()));
        }

        let (name, sign, literal) = match split_anchor(expr) {
            Some(parts) => parts,
            None => {
                return parse_literal(expr)
                    .map(Address::new)
                    .ok_or_else(|| Error::MalformedExpression(expr.to_string()));
            }
        };

        let value = parse_literal(literal)
            .ok_or_else(|| Error::MalformedExpression(expr.to_string()))?;

        let module = self
            .modules
            .iter()
            .find(|m| m.matches_name(name))
            .ok_or_else(|| Error::UnknownModule(name.to_string()))?;

        let offset = match (sign, value) {
            (_, 0) => Offset::zero(),
            (Sign::Minus, value) => Offset::new(Sign::Minus, Size::new(value)),
            (_, value) => Offset::new(Sign::Plus, Size::new(value)),
        };

        offset
            .checked_apply(module.base)
            .ok_or_else(|| Error::MalformedExpression(expr.to_string()))
    }

    /// Encode an address relative to the module which owns it.
    ///
    /// Returns `None` when no module owns the address; callers fall back to
    /// the raw hex form.
    pub fn encode(&self, address: Address, prefer_short_name: bool) -> Option<String> {
        let module = self.find_module(address)?;

        let offset = address.get() - module.base.get();

        let name = if prefer_short_name {
            module.short_name()
        } else {
            module.path.as_str()
        };

        Some(format!("{}+0x{:X}", name, offset))
    }

    /// Find the module owning the given address.
    pub fn find_module(&self, address: Address) -> Option<&ModuleDescriptor> {
        let index = match self.modules.binary_search_by(|m| m.base.cmp(&address)) {
            Ok(index) => index,
            Err(0) => return None,
            Err(index) => index - 1,
        };

        let module = &self.modules[index];

        if module.range().contains(address) {
            Some(module)
        } else {
            None
        }
    }
}

/// Split a `module+offset` expression at its last sign, if any.
fn split_anchor(expr: &str) -> Option<(&str, Sign, &str)> {
    let index = expr.rfind(|c| c == '+' || c == '-')?;

    if index == 0 || index + 1 == expr.len() {
        return None;
    }

    let sign = if expr[index..].starts_with('-') {
        Sign::Minus
    } else {
        Sign::Plus
    };

    Some((
        expr[..index].trim(),
        sign,
        expr[index + 1..].trim(),
    ))
}

/// Parse an address or offset literal.
///
/// `0x` forces hex; a run of decimal digits is decimal; any other run of hex
/// digits is hex.
fn parse_literal(s: &str) -> Option<u64> {
    if s.is_empty() {
        return None;
    }

    if s.starts_with("0x") || s.starts_with("0X") {
        return u64::from_str_radix(&s[2..], 16).ok();
    }

    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse::<u64>().ok();
    }

    if s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return u64::from_str_radix(s, 16).ok();
    }

    None
}

#[cfg(test)]
mod tests {
    use super::AddressResolver;
    use crate::{Address, Error, ModuleDescriptor, Size};

    fn resolver() -> AddressResolver {
        AddressResolver::new(vec![
            ModuleDescriptor {
                name: String::from("game"),
                path: String::from("C:\\game\\game.exe"),
                base: Address::new(0x400000),
                size: Size::new(0x100000),
            },
            ModuleDescriptor {
                name: String::from("engine"),
                path: String::from("C:\\game\\libengine-2.dll"),
                base: Address::new(0x7FF000000000),
                size: Size::new(0x20000),
            },
        ])
    }

    #[test]
    fn test_resolve_literals() {
        let resolver = resolver();

        assert_eq!(resolver.resolve("0x1234").unwrap(), Address::new(0x1234));
        assert_eq!(resolver.resolve("4096").unwrap(), Address::new(4096));
        assert_eq!(resolver.resolve("DEADBEEF").unwrap(), Address::new(0xDEAD_BEEF));
    }

    #[test]
    fn test_resolve_module_offsets() {
        let resolver = resolver();

        assert_eq!(
            resolver.resolve("game.exe+0x10").unwrap(),
            Address::new(0x400010)
        );
        assert_eq!(
            resolver.resolve("game.exe-0x10").unwrap(),
            Address::new(0x3FFFF0)
        );
        // dashes inside the module name do not confuse the split
        assert_eq!(
            resolver.resolve("libengine-2.dll+0x100").unwrap(),
            Address::new(0x7FF000000100)
        );
    }

    #[test]
    fn test_resolve_errors() {
        let resolver = resolver();

        match resolver.resolve("missing.dll+0x10") {
            Err(Error::UnknownModule(name)) => assert_eq!(name, "missing.dll"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }

        assert!(matches!(
            resolver.resolve("game.exe+zz"),
            Err(Error::MalformedExpression(..))
        ));
        assert!(matches!(resolver.resolve(""), Err(Error::MalformedExpression(..))));
    }

    #[test]
    fn test_encode_round_trip() {
        let resolver = resolver();

        for address in &[0x400000u64, 0x400010, 0x4FFFFF, 0x7FF000000100] {
            let address = Address::new(*address);
            let expr = resolver.encode(address, true).unwrap();
            assert_eq!(resolver.resolve(&expr).unwrap(), address);

            let expr = resolver.encode(address, false).unwrap();
            assert_eq!(resolver.resolve(&expr).unwrap(), address);
        }

        assert!(resolver.encode(Address::new(0x10), true).is_none());
        assert!(resolver.encode(Address::new(0x500000), true).is_none());
    }
}
