//! Progressive typed memory scanning and pointer chain discovery over a
//! remote process.
//!
//! The remote side is consumed through the narrow [`MemoryRpc`] interface:
//! bounded reads and writes, region enumeration, and the module list. On top
//! of that, a [`ScanSession`] sweeps the filtered address space and narrows
//! its candidate set across generations, and a [`ChainResolver`] correlates
//! independently captured [`PointerMap`] snapshots into offset chains which
//! hold in every snapshot.
//!
//! Unless an external collaborator suspends the target, the process keeps
//! running while a pass reads it. Results are therefore best-effort
//! snapshots; the scanner only guarantees that every generation's address
//! set is a subset of the previous generation's.

mod address;
mod address_range;
mod alignment;
pub mod cache;
pub mod config;
mod error;
mod module;
mod offset;
pub mod pattern;
mod pointer_map;
mod pointer_scan;
pub mod predicate;
mod process_handle;
mod region;
mod resolver;
pub mod scan;
mod sign;
mod size;
pub mod task;
mod token;
mod ty;
mod value;
pub mod watch;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use self::address::Address;
pub use self::address_range::AddressRange;
pub use self::alignment::Alignment;
pub use self::cache::ReadCache;
pub use self::config::{ScanConfig, ScanKind, SearchMode, ValueInputFormat};
pub use self::error::Error;
pub use self::module::ModuleDescriptor;
pub use self::offset::Offset;
pub use self::pattern::PatternRule;
pub use self::pointer_map::{PointerBase, PointerMap, PointerMapEntry};
pub use self::pointer_scan::{ChainResolver, ChainScan, PointerChain};
pub use self::predicate::{Predicate, ScanOp};
pub use self::process_handle::{MemoryRpc, ProcessHandle};
pub use self::region::{MemoryRegion, Protection, RegionCatalog, RegionFilter};
pub use self::resolver::AddressResolver;
pub use self::scan::{MatchEntry, MatchSet, NoProgress, ScanProgress, ScanSession};
pub use self::sign::Sign;
pub use self::size::Size;
pub use self::task::PeriodicTask;
pub use self::token::Token;
pub use self::ty::{ParseTypeError, Type, ValueParseError};
pub use self::value::Value;
pub use self::watch::{Watch, WatchList};
