//! Captured snapshots of the remote object graph's pointer fields.

use crate::{
    error::Error, Address, Offset, ProcessHandle, RegionFilter, Size, Token,
};
use byteorder::{ByteOrder as _, LittleEndian};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::convert::TryFrom;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

/// Size of the windows a region is read in while capturing.
const CAPTURE_BUFFER_SIZE: usize = 0x100_000;

/// Pointer fields are machine words.
const POINTER_SIZE: usize = 8;

/// Where a capture is anchored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointerBase {
    /// An offset from a named module.
    Module { name: String, offset: Offset },
    /// A fixed static address.
    Address(Address),
}

impl fmt::Display for PointerBase {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointerBase::Module { name, offset } => write!(fmt, "\"{}\"+{}", name, offset),
            PointerBase::Address(address) => address.fmt(fmt),
        }
    }
}

/// One observed pointer field at capture time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerMapEntry {
    /// The object the field was attributed to.
    pub object: Address,
    /// Where inside the object the field lives.
    pub field_offset: Offset,
    /// The pointer stored in the field.
    pub value: Address,
}

impl PointerMapEntry {
    /// The absolute address of the field itself.
    pub fn field_address(&self) -> Option<Address> {
        self.field_offset.checked_apply(self.object)
    }
}

/// An immutable snapshot of every pointer field observed in the process,
/// together with the address the value of interest lived at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointerMap {
    pub base: PointerBase,
    /// The absolute address the base had at capture time.
    pub base_address: Address,
    /// The address of the value of interest at capture time.
    pub target: Address,
    pub entries: Vec<PointerMapEntry>,
}

impl PointerMap {
    /// Capture a pointer map from the live process.
    ///
    /// Walks every readable region collecting aligned machine words whose
    /// value lands inside some mapped region. Each field is attributed to
    /// the closest pointed-to address at most `max_offset` below it; fields
    /// with no such neighbor anchor an object of their own.
    pub fn capture(
        handle: &ProcessHandle,
        base_address: Address,
        target: Address,
        max_offset: Size,
        cancel: Option<&Token>,
    ) -> anyhow::Result<PointerMap> {
        let mut local_cancel = None;
        let cancel = match cancel {
            Some(cancel) => cancel,
            None => local_cancel.get_or_insert(Token::new()),
        };

        let catalog = handle.region_catalog()?;
        let regions = catalog.enumerate(&RegionFilter::readable());

        // overlapping regions may surface the same field twice; key by the
        // field address so each is recorded once.
        let mut fields = HashMap::new();
        let mut buf = vec![0u8; CAPTURE_BUFFER_SIZE];

        for region in &regions {
            if cancel.is_set() {
                break;
            }

            let region_size = region.range.size.as_usize();
            let mut offset = 0usize;

            while offset < region_size {
                if cancel.is_set() {
                    break;
                }

                let len = usize::min(buf.len(), region_size - offset);
                let window = &mut buf[..len];
                let base = region.range.base.add(Size::try_from(offset)?)?;

                let read = match handle.rpc().read_memory(base, window) {
                    Ok(read) => read,
                    Err(..) => 0,
                };

                if read > 0 {
                    let data = &window[..read];
                    let mut inner = align_up(base, POINTER_SIZE);

                    while inner + POINTER_SIZE <= data.len() {
                        let value = Address::new(LittleEndian::read_u64(&data[inner..]));

                        if !value.is_null() && catalog.find(value).is_some() {
                            let field = base.add(Size::try_from(inner)?)?;
                            fields.insert(field, value);
                        }

                        inner += POINTER_SIZE;
                    }
                }

                let advance = if read < len {
                    len
                } else if offset + len >= region_size {
                    len
                } else {
                    usize::max(len.saturating_sub(POINTER_SIZE - 1), 1)
                };

                offset += advance;
            }
        }

        // pointed-to addresses double as candidate object bases.
        let bases: BTreeSet<Address> = fields.values().copied().collect();

        let mut entries = Vec::with_capacity(fields.len());

        for (field, value) in fields {
            let object = bases
                .range(..=field)
                .next_back()
                .copied()
                .filter(|b| {
                    field
                        .size_from(*b)
                        .map(|d| d <= max_offset)
                        .unwrap_or(false)
                })
                .unwrap_or(field);

            entries.push(PointerMapEntry {
                object,
                field_offset: field.offset_of(object),
                value,
            });
        }

        entries.sort_by_key(|e| (e.object, e.field_offset));

        let base = match handle.find_module(base_address) {
            Some(module) => PointerBase::Module {
                name: module.short_name().to_string(),
                offset: base_address.offset_of(module.base),
            },
            None => PointerBase::Address(base_address),
        };

        log::info!("captured {} pointer field(s)", entries.len());

        Ok(PointerMap {
            base,
            base_address,
            target,
            entries,
        })
    }

    /// Serialize the map to the given writer.
    pub fn save<W>(&self, writer: W) -> Result<(), Error>
    where
        W: Write,
    {
        serde_cbor::to_writer(writer, self).map_err(Error::ArtifactEncode)
    }

    /// Deserialize a map from the given reader.
    pub fn load<R>(reader: R) -> Result<PointerMap, Error>
    where
        R: Read,
    {
        serde_cbor::from_reader(reader).map_err(Error::ArtifactDecode)
    }

    /// The conventional artifact file name for this map.
    pub fn file_name(&self, timestamp: u64) -> String {
        format!("pointermap_{:X}_{}.ptm", self.target.get(), timestamp)
    }

    /// Parse the target address embedded in a conventional file name.
    pub fn target_from_file_name(name: &str) -> Option<Address> {
        let rest = name.strip_prefix("pointermap_")?;
        let hex = rest.split('_').next()?;
        u64::from_str_radix(hex, 16).ok().map(Address::new)
    }

    /// Save the map next to the given directory using the conventional name.
    pub fn save_to_dir(&self, dir: &Path, timestamp: u64) -> Result<std::path::PathBuf, Error> {
        let path = dir.join(self.file_name(timestamp));
        let file = File::create(&path)?;
        self.save(io::BufWriter::new(file))?;
        Ok(path)
    }

    /// Load a map from a file.
    ///
    /// The target address embedded in the file name is the default target;
    /// an explicit `target` argument overrides it.
    pub fn load_from_path(path: &Path, target: Option<Address>) -> Result<PointerMap, Error> {
        let file = File::open(path)?;
        let mut map = Self::load(io::BufReader::new(file))?;

        let from_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(Self::target_from_file_name);

        if let Some(target) = target.or(from_name) {
            map.target = target;
        }

        Ok(map)
    }
}

/// First offset at which `base + offset` is aligned to `align`.
fn align_up(base: Address, align: usize) -> usize {
    let rem = (base.get() % align as u64) as usize;

    if rem == 0 {
        0
    } else {
        align - rem
    }
}
