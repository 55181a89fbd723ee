//! Watch expressions re-read for display.

use crate::{cache::ReadCache, error::Error, ProcessHandle, Type, Value};

/// A single watched location.
#[derive(Debug, Clone)]
pub struct Watch {
    /// The expression the watch was created from, symbolic or absolute.
    pub expr: String,
    /// The type the location is being treated as.
    pub ty: Type,
    /// The most recently observed value, if the location was readable.
    pub value: Option<Value>,
}

/// A list of watches refreshed together through one read cache.
#[derive(Default)]
pub struct WatchList {
    watches: Vec<Watch>,
}

impl WatchList {
    pub fn new() -> WatchList {
        WatchList {
            watches: Vec::new(),
        }
    }

    /// Add a watch over the given expression.
    pub fn push(&mut self, expr: impl Into<String>, ty: Type) -> Result<(), Error> {
        if ty.size().is_none() {
            return Err(Error::InvalidOperatorForType("watch", ty));
        }

        self.watches.push(Watch {
            expr: expr.into(),
            ty,
            value: None,
        });

        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Option<Watch> {
        if index < self.watches.len() {
            Some(self.watches.remove(index))
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Watch> {
        self.watches.iter()
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Re-evaluate every watch through the cache.
    ///
    /// The cache is invalidated first so the tick observes fresh memory;
    /// duplicate locations within the tick still share a single read.
    /// Expressions which fail to resolve, or whose location is unreadable,
    /// surface as a `None` value rather than an error.
    pub fn refresh(&mut self, handle: &ProcessHandle, cache: &mut ReadCache) {
        cache.invalidate();
        let resolver = handle.resolver();

        for watch in &mut self.watches {
            watch.value = resolver.resolve(&watch.expr).ok().and_then(|address| {
                let size = watch.ty.size()?;
                let data = cache.read(handle.rpc(), address, size)?;
                watch.ty.decode(&data)
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::WatchList;
    use crate::{
        cache::ReadCache, Address, AddressRange, Error, MemoryRegion, MemoryRpc,
        ModuleDescriptor, ProcessHandle, Protection, Size, Type, Value,
    };

    struct TestProcess;

    const BASE: u64 = 0x4000;

    impl MemoryRpc for TestProcess {
        fn read_memory(&self, address: Address, buf: &mut [u8]) -> Result<usize, Error> {
            if address.get() < BASE || address.get() >= BASE + 0x100 {
                return Err(Error::UnreadableMemory(address));
            }

            for (i, b) in buf.iter_mut().enumerate() {
                *b = (address.get() - BASE) as u8 + i as u8;
            }

            Ok(buf.len())
        }

        fn write_memory(&self, _: Address, _: &[u8]) -> Result<usize, Error> {
            Ok(0)
        }

        fn virtual_memory_regions(&self) -> Result<Vec<MemoryRegion>, Error> {
            Ok(vec![MemoryRegion::new(
                AddressRange::new(Address::new(BASE), Size::new(0x100)),
                Protection::new(true, false, false),
            )])
        }

        fn modules(&self) -> Result<Vec<ModuleDescriptor>, Error> {
            Ok(vec![ModuleDescriptor {
                name: String::from("game"),
                path: String::from("/opt/game/game.bin"),
                base: Address::new(BASE),
                size: Size::new(0x100),
            }])
        }
    }

    #[test]
    fn test_refresh_resolves_symbolic_watches() {
        let handle = ProcessHandle::open(Box::new(TestProcess)).unwrap();
        let mut cache = ReadCache::new(16);
        let mut watches = WatchList::new();

        watches.push("game.bin+0x4", Type::U8).unwrap();
        watches.push("0x4004", Type::U8).unwrap();
        watches.push("missing.so+0x4", Type::U8).unwrap();
        watches.push("game.bin+0x200", Type::U8).unwrap();

        watches.refresh(&handle, &mut cache);

        let values: Vec<_> = watches.iter().map(|w| w.value.clone()).collect();
        assert_eq!(values[0], Some(Value::U8(4)));
        assert_eq!(values[1], Some(Value::U8(4)));
        assert_eq!(values[2], None);
        assert_eq!(values[3], None);
    }

    #[test]
    fn test_rejects_undecodable_type() {
        let mut watches = WatchList::new();

        assert!(matches!(
            watches.push("0x1000", Type::Regex),
            Err(Error::InvalidOperatorForType(..))
        ));
    }
}
