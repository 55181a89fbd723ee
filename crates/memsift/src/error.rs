use crate::{Address, Size, Type};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("system error: {0}")]
    System(#[source] io::Error),
    #[error("add operation `{0} + {1}` overflowed")]
    Add(u64, u64),
    #[error("sub operation `{0} - {1}` underflowed")]
    Sub(u64, u64),
    #[error("address add operation `{0} + {1}` overflowed")]
    AddressAdd(Address, Size),
    #[error("address {0} is not based on {1}")]
    SizeFrom(Address, Address),
    #[error("failed to convert number to address")]
    AddressConversion,
    #[error("failed to convert number to size")]
    SizeConversion,
    #[error("malformed address expression: {0}")]
    MalformedExpression(String),
    #[error("no loaded module matches `{0}`")]
    UnknownModule(String),
    #[error("memory at {0} is not readable")]
    UnreadableMemory(Address),
    #[error("write at {0} was not completed")]
    IncompleteWrite(Address),
    #[error("operator `{0}` cannot be used with type {1}")]
    InvalidOperatorForType(&'static str, Type),
    #[error("value of type {0} does not match scanned type {1}")]
    TypeMismatch(Type, Type),
    #[error("bad alignment: {0}")]
    BadAlignment(usize),
    #[error("an initial scan requires an idle session")]
    NotIdle,
    #[error("no scan to filter")]
    NoScan,
    #[error("pattern rules cannot refine an existing scan")]
    PatternRefine,
    #[error("operator `{0}` requires a previous scan generation")]
    MissingPrior(&'static str),
    #[error("scan configuration is missing a `{0}` field")]
    MissingScanValue(&'static str),
    #[error("pointer search mode does not compile to a scan predicate")]
    PointerSearchMode,
    #[error("pointer resolution requires at least 2 maps, got {0}")]
    InsufficientPointerMaps(usize),
    #[error("failed to compile pattern rule: {0}")]
    RuleCompile(String),
    #[error("failed to encode pointer map artifact")]
    ArtifactEncode(#[source] serde_cbor::Error),
    #[error("failed to decode pointer map artifact")]
    ArtifactDecode(#[source] serde_cbor::Error),
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Self::System(error)
    }
}
