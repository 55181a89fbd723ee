//! The narrow interface to the remote debug service, and a handle combining
//! it with a module snapshot.

use crate::{
    error::Error, Address, AddressResolver, ModuleDescriptor, RegionCatalog, MemoryRegion, Type,
    Value,
};

/// The debug/memory RPC surface of the remote process.
///
/// Reads and writes are bounded; a short or failed read means "this address
/// is unreadable right now", never a fatal condition. Implementations report
/// the full region list on every call, there is no delta interface.
pub trait MemoryRpc: Send + Sync {
    /// Read up to `buf.len()` bytes at `address`, returning how many bytes
    /// were actually read.
    fn read_memory(&self, address: Address, buf: &mut [u8]) -> Result<usize, Error>;

    /// Write the given bytes at `address`, returning how many were written.
    fn write_memory(&self, address: Address, data: &[u8]) -> Result<usize, Error>;

    /// Enumerate the current memory mappings of the process.
    fn virtual_memory_regions(&self) -> Result<Vec<MemoryRegion>, Error>;

    /// Enumerate the modules loaded into the process.
    fn modules(&self) -> Result<Vec<ModuleDescriptor>, Error>;
}

/// A handle to the remote process.
///
/// Owns the RPC connection and a module snapshot taken when the handle was
/// opened. The snapshot only changes on an explicit refresh, so symbolic
/// round-trips stay stable within one view.
pub struct ProcessHandle {
    rpc: Box<dyn MemoryRpc>,
    modules: Vec<ModuleDescriptor>,
}

impl ProcessHandle {
    /// Open a handle over the given RPC connection, snapshotting modules.
    pub fn open(rpc: Box<dyn MemoryRpc>) -> Result<ProcessHandle, Error> {
        let mut modules = rpc.modules()?;
        modules.sort_by_key(|m| m.base);

        Ok(ProcessHandle { rpc, modules })
    }

    pub fn rpc(&self) -> &dyn MemoryRpc {
        &*self.rpc
    }

    /// The module snapshot, sorted by base address.
    pub fn modules(&self) -> &[ModuleDescriptor] {
        &self.modules
    }

    /// Re-fetch the module snapshot.
    pub fn refresh_modules(&mut self) -> Result<(), Error> {
        let mut modules = self.rpc.modules()?;
        modules.sort_by_key(|m| m.base);
        self.modules = modules;
        Ok(())
    }

    /// Construct an address resolver over the current module snapshot.
    pub fn resolver(&self) -> AddressResolver {
        AddressResolver::new(self.modules.clone())
    }

    /// Find the module owning the given address.
    pub fn find_module(&self, address: Address) -> Option<&ModuleDescriptor> {
        crate::AddressRange::find_in_range(&self.modules, |m| m.range(), address)
    }

    /// Snapshot the current region list.
    pub fn region_catalog(&self) -> Result<RegionCatalog, Error> {
        Ok(RegionCatalog::new(self.rpc.virtual_memory_regions()?))
    }

    /// Read and decode a single value.
    ///
    /// Returns `None` when the location is unreadable or the type has no
    /// decodable size.
    pub fn read_value(&self, ty: Type, address: Address) -> Option<Value> {
        let size = ty.size()?;
        let mut buf = vec![0u8; size];

        match self.rpc.read_memory(address, &mut buf) {
            Ok(len) if len == size => ty.decode(&buf),
            _ => None,
        }
    }

    /// Encode and write a single value.
    pub fn write_value(&self, address: Address, value: &Value) -> Result<(), Error> {
        let mut buf = vec![0u8; value.size()];
        value.encode(&mut buf);

        let len = self.rpc.write_memory(address, &buf)?;

        if len != buf.len() {
            return Err(Error::IncompleteWrite(address));
        }

        Ok(())
    }
}
