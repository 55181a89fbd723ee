//! Progressive scan passes over the remote address space.
//!
//! A session narrows a candidate set across generations: the initial scan
//! sweeps the filtered region list, every later filter re-reads only the
//! surviving addresses. The target process may keep mutating memory while a
//! pass runs unless an external collaborator suspends it, so a match set is
//! a best-effort snapshot; the strict guarantee is that each generation's
//! addresses are a subset of the previous generation's.

use crate::{
    error::Error, predicate::ScanOp, Address, Alignment, MemoryRegion, Predicate, ProcessHandle,
    RegionFilter, Size, Token, Type, Value,
};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::io;
use std::sync::{mpsc, Arc};

/// Size of the windows a region is read in.
const SCAN_BUFFER_SIZE: usize = 0x100_000;

/// A single matched address and the value captured for it.
///
/// The address is fixed for the lifetime of the entry; the value is replaced
/// by every later pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchEntry {
    pub address: Address,
    pub value: Value,
}

/// An ordered collection of matches belonging to one scan generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSet {
    generation: u32,
    ty: Type,
    entries: Vec<MatchEntry>,
}

impl MatchSet {
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn ty(&self) -> Type {
        self.ty
    }

    /// Entries in ascending address order.
    pub fn entries(&self) -> &[MatchEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.entries.iter().map(|e| e.address)
    }

    /// Serialize the match set to the given writer.
    pub fn save<W>(&self, writer: W) -> Result<(), Error>
    where
        W: io::Write,
    {
        serde_cbor::to_writer(writer, self).map_err(Error::ArtifactEncode)
    }

    /// Deserialize a match set from the given reader.
    pub fn load<R>(reader: R) -> Result<MatchSet, Error>
    where
        R: io::Read,
    {
        serde_cbor::from_reader(reader).map_err(Error::ArtifactDecode)
    }
}

/// A trait to track the progress of scan passes.
pub trait ScanProgress {
    /// Report the total number of bytes to process.
    fn report_bytes(&mut self, bytes: Size) -> anyhow::Result<()>;

    /// Report that the pass has progressed to the given percentage.
    fn report(&mut self, percentage: usize, results: u64) -> anyhow::Result<()>;
}

/// Progress sink which discards all reports.
pub struct NoProgress;

impl ScanProgress for NoProgress {
    fn report_bytes(&mut self, _: Size) -> anyhow::Result<()> {
        Ok(())
    }

    fn report(&mut self, _: usize, _: u64) -> anyhow::Result<()> {
        Ok(())
    }
}

enum SessionState {
    Idle,
    Ready(MatchSet),
}

/// Orchestrates initial and filter passes and owns the narrowing match set.
pub struct ScanSession {
    thread_pool: Arc<rayon::ThreadPool>,
    state: SessionState,
    alignment: Option<Alignment>,
    dropped: u64,
}

impl ScanSession {
    /// Construct a new session associated with a thread pool.
    pub fn new(thread_pool: &Arc<rayon::ThreadPool>) -> ScanSession {
        ScanSession {
            thread_pool: Arc::clone(thread_pool),
            state: SessionState::Idle,
            alignment: None,
            dropped: 0,
        }
    }

    /// Restore a session around a previously saved match set.
    pub fn from_match_set(thread_pool: &Arc<rayon::ThreadPool>, set: MatchSet) -> ScanSession {
        ScanSession {
            thread_pool: Arc::clone(thread_pool),
            state: SessionState::Ready(set),
            alignment: None,
            dropped: 0,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, SessionState::Idle)
    }

    /// The current match set, if a scan has completed.
    pub fn match_set(&self) -> Option<&MatchSet> {
        match &self.state {
            SessionState::Ready(set) => Some(set),
            SessionState::Idle => None,
        }
    }

    pub fn generation(&self) -> Option<u32> {
        self.match_set().map(|s| s.generation)
    }

    /// Unreadable spans or entries skipped by the most recent pass.
    pub fn last_dropped(&self) -> u64 {
        self.dropped
    }

    /// Discard the match set and return to idle.
    pub fn clear(&mut self) {
        self.state = SessionState::Idle;
        self.alignment = None;
    }

    /// Run the initial sweep over the filtered region list.
    ///
    /// Only valid from idle, except that a change of value type or alignment
    /// relative to the current match set forces an implicit [`clear`].
    /// Operators comparing against a previous generation are rejected before
    /// any memory I/O. Cancellation leaves the session idle.
    ///
    /// [`clear`]: ScanSession::clear
    pub fn first_scan(
        &mut self,
        handle: &ProcessHandle,
        predicate: &Predicate,
        filter: &RegionFilter,
        cancel: Option<&Token>,
        progress: impl ScanProgress + Send,
    ) -> anyhow::Result<()> {
        if predicate.requires_prior() {
            return Err(Error::MissingPrior(predicate.op().name()).into());
        }

        if let SessionState::Ready(set) = &self.state {
            if set.ty == predicate.ty() && self.alignment == Some(predicate.alignment()) {
                return Err(Error::NotIdle.into());
            }

            // the value type or alignment changed; generations of different
            // byte widths are not comparable.
            self.clear();
        }

        let mut local_cancel = None;
        let cancel = match cancel {
            Some(cancel) => cancel,
            None => local_cancel.get_or_insert(Token::new()),
        };

        let catalog = handle.region_catalog()?;
        let regions = catalog.enumerate(filter);

        let ty = predicate.ty();

        let total = regions
            .iter()
            .map(|r| r.range.size.as_usize())
            .sum::<usize>();

        let tasks = self.thread_pool.current_num_threads().max(1);
        let chunk = ((regions.len() + tasks - 1) / tasks).max(1);

        let mut entries = Vec::new();
        let mut dropped = 0u64;
        let mut last_error = None;

        self.thread_pool.install(|| {
            rayon::scope(|s| {
                let (tx, rx) = mpsc::channel::<Task>();
                let mut task_count = 0;

                for chunk_regions in regions.chunks(chunk) {
                    task_count += 1;
                    let tx = tx.clone();

                    s.spawn(move |_| {
                        let result = scan_regions(handle, &tx, chunk_regions, predicate, cancel);
                        tx.send(Task::Done(result)).expect("send done failed");
                    });
                }

                drop(tx);

                let mut reporter = Reporter::new(progress, total, cancel, &mut last_error);
                reporter.report_bytes(Size::new(total as u64));

                let mut hits = 0u64;

                while task_count > 0 {
                    match rx.recv().expect("channel closed") {
                        Task::Done(result) => {
                            if let Some((mut chunk_entries, chunk_dropped)) = reporter.eval(result)
                            {
                                entries.append(&mut chunk_entries);
                                dropped += chunk_dropped;
                            }

                            task_count -= 1;
                        }
                        Task::Tick(count, c) => {
                            hits += c;
                            reporter.tick_n(count, hits);
                        }
                    }
                }
            });
        });

        if let Some(e) = last_error {
            return Err(e);
        }

        self.dropped = dropped;

        if cancel.is_set() {
            log::info!("initial scan cancelled");
            return Ok(());
        }

        entries.sort_by_key(|e| e.address);
        entries.dedup_by_key(|e| e.address);

        log::info!(
            "initial scan: {} match(es), {} unreadable span(s)",
            entries.len(),
            dropped
        );

        self.alignment = Some(predicate.alignment());
        self.state = SessionState::Ready(MatchSet {
            generation: 0,
            ty,
            entries,
        });

        Ok(())
    }

    /// Narrow the current match set by re-reading only its addresses.
    ///
    /// For operators comparing against a previous generation, the basis is
    /// the value captured by the immediately preceding pass. Entries whose
    /// address is no longer readable are dropped, not errored. A cancelled
    /// filter is a no-op: the previous generation stays committed.
    pub fn filter(
        &mut self,
        handle: &ProcessHandle,
        predicate: &Predicate,
        cancel: Option<&Token>,
        progress: impl ScanProgress + Send,
    ) -> anyhow::Result<()> {
        if predicate.is_pattern() {
            return Err(Error::PatternRefine.into());
        }

        let set = match &self.state {
            SessionState::Ready(set) => set,
            SessionState::Idle => return Err(Error::NoScan.into()),
        };

        if predicate.ty() != set.ty {
            return Err(Error::TypeMismatch(predicate.ty(), set.ty).into());
        }

        let ty = set.ty;
        let value_size = match ty.size() {
            Some(size) => size,
            None => return Err(Error::InvalidOperatorForType(predicate.op().name(), ty).into()),
        };

        let mut local_cancel = None;
        let cancel = match cancel {
            Some(cancel) => cancel,
            None => local_cancel.get_or_insert(Token::new()),
        };

        let runs = contiguous_runs(&set.entries, value_size);
        let total = set.entries.len();

        let tasks = self.thread_pool.current_num_threads().max(1);
        let chunk = ((runs.len() + tasks - 1) / tasks).max(1);

        let mut survivors = Vec::new();
        let mut dropped = 0u64;
        let mut last_error = None;

        self.thread_pool.install(|| {
            rayon::scope(|s| {
                let (tx, rx) = mpsc::channel::<Task>();
                let mut task_count = 0;

                for chunk_runs in runs.chunks(chunk) {
                    task_count += 1;
                    let tx = tx.clone();
                    let entries = &set.entries;

                    s.spawn(move |_| {
                        let result =
                            filter_runs(handle, &tx, entries, chunk_runs, predicate, value_size, cancel);
                        tx.send(Task::Done(result)).expect("send done failed");
                    });
                }

                drop(tx);

                let mut reporter = Reporter::new(progress, total, cancel, &mut last_error);
                reporter.report_bytes(Size::new((total * value_size) as u64));

                let mut hits = 0u64;

                while task_count > 0 {
                    match rx.recv().expect("channel closed") {
                        Task::Done(result) => {
                            if let Some((mut chunk_entries, chunk_dropped)) = reporter.eval(result)
                            {
                                survivors.append(&mut chunk_entries);
                                dropped += chunk_dropped;
                            }

                            task_count -= 1;
                        }
                        Task::Tick(count, c) => {
                            hits += c;
                            reporter.tick_n(count, hits);
                        }
                    }
                }
            });
        });

        if let Some(e) = last_error {
            return Err(e);
        }

        self.dropped = dropped;

        if cancel.is_set() {
            log::info!("filter cancelled; keeping generation {}", set.generation);
            return Ok(());
        }

        survivors.sort_by_key(|e| e.address);
        let generation = set.generation + 1;

        log::info!(
            "filter: generation {} has {} match(es), {} dropped as unreadable",
            generation,
            survivors.len(),
            dropped
        );

        self.state = SessionState::Ready(MatchSet {
            generation,
            ty,
            entries: survivors,
        });

        Ok(())
    }

    /// Re-read the captured value of every entry in the live generation.
    ///
    /// Does not narrow and does not advance the generation; unreadable
    /// entries are dropped. The re-read values become the comparison basis
    /// for the next filter.
    pub fn refresh(&mut self, handle: &ProcessHandle) -> Result<(), Error> {
        let set = match &mut self.state {
            SessionState::Ready(set) => set,
            SessionState::Idle => return Err(Error::NoScan),
        };

        let set_ty = set.ty;
        let mut dropped = 0u64;
        let entries = std::mem::replace(&mut set.entries, Vec::new());
        let mut kept = Vec::with_capacity(entries.len());

        for mut entry in entries {
            // pattern generations have no decodable set type; re-read each
            // entry at its captured width instead.
            let ty = match set_ty.size() {
                Some(..) => set_ty,
                None => entry.value.ty(),
            };

            match handle.read_value(ty, entry.address) {
                Some(value) => {
                    entry.value = value;
                    kept.push(entry);
                }
                None => dropped += 1,
            }
        }

        set.entries = kept;
        self.dropped = dropped;

        log::debug!("refresh: {} dropped as unreadable", dropped);
        Ok(())
    }
}

enum Task {
    Done(anyhow::Result<(Vec<MatchEntry>, u64)>),
    Tick(usize, u64),
}

fn scan_regions(
    handle: &ProcessHandle,
    tx: &mpsc::Sender<Task>,
    regions: &[MemoryRegion],
    predicate: &Predicate,
    cancel: &Token,
) -> anyhow::Result<(Vec<MatchEntry>, u64)> {
    let ty = predicate.ty();
    let alignment = predicate.alignment();
    let value_size = ty.size().unwrap_or(0);

    let overlap = match predicate.op() {
        ScanOp::Pattern(rule) => rule.window_overlap(),
        _ => value_size.saturating_sub(1),
    };

    let mut entries = Vec::new();
    let mut dropped = 0u64;
    let mut buf = vec![0u8; SCAN_BUFFER_SIZE];

    for region in regions {
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

            let mut hits = 0u64;

            if read == 0 {
                dropped += 1;
            } else {
                if read < len {
                    dropped += 1;
                }

                let data = &window[..read];

                match predicate.op() {
                    ScanOp::Pattern(rule) => {
                        for (hit, hit_len) in rule.scan(data) {
                            hits += 1;
                            entries.push(MatchEntry {
                                address: base.add(Size::try_from(hit)?)?,
                                value: Value::Bytes(data[hit..hit + hit_len].to_vec()),
                            });
                        }
                    }
                    _ => {
                        let mut inner = alignment.first_offset(base);

                        while inner + value_size <= data.len() {
                            if let Some(value) = ty.decode(&data[inner..]) {
                                if predicate.test(None, &value) {
                                    hits += 1;
                                    entries.push(MatchEntry {
                                        address: base.add(Size::try_from(inner)?)?,
                                        value,
                                    });
                                }
                            }

                            inner += alignment.step();
                        }
                    }
                }
            }

            // overlap windows so values crossing a boundary are still seen.
            // the final window of a region has nothing to overlap into.
            let advance = if read < len || offset + len >= region_size {
                len
            } else {
                usize::max(len.saturating_sub(overlap), 1)
            };

            offset += advance;
            tx.send(Task::Tick(advance, hits)).expect("send tick failed");
        }
    }

    Ok((entries, dropped))
}

fn filter_runs(
    handle: &ProcessHandle,
    tx: &mpsc::Sender<Task>,
    entries: &[MatchEntry],
    runs: &[(usize, usize)],
    predicate: &Predicate,
    value_size: usize,
    cancel: &Token,
) -> anyhow::Result<(Vec<MatchEntry>, u64)> {
    let ty = predicate.ty();
    let mut survivors = Vec::new();
    let mut dropped = 0u64;
    let mut buf = vec![0u8; SCAN_BUFFER_SIZE];

    for (start, count) in runs.iter().copied() {
        if cancel.is_set() {
            break;
        }

        let run = &entries[start..start + count];
        let span = count * value_size;
        let base = run[0].address;

        let read = match handle.rpc().read_memory(base, &mut buf[..span]) {
            Ok(read) => read,
            Err(..) => 0,
        };

        let mut hits = 0u64;

        for (i, entry) in run.iter().enumerate() {
            let at = i * value_size;

            if at + value_size > read {
                dropped += 1;
                continue;
            }

            if let Some(value) = ty.decode(&buf[at..at + value_size]) {
                if predicate.test(Some(&entry.value), &value) {
                    hits += 1;
                    survivors.push(MatchEntry {
                        address: entry.address,
                        value,
                    });
                }
            }
        }

        tx.send(Task::Tick(count, hits)).expect("send tick failed");
    }

    Ok((survivors, dropped))
}

/// Group entries into `(start, count)` runs of contiguous addresses, so each
/// run can be served by a single read without touching any address outside
/// the match set.
fn contiguous_runs(entries: &[MatchEntry], value_size: usize) -> Vec<(usize, usize)> {
    let step = Size::new(value_size as u64);
    let max = (SCAN_BUFFER_SIZE / value_size.max(1)).max(1);
    let mut out = Vec::new();
    let mut start = 0usize;

    while start < entries.len() {
        let mut count = 1usize;

        while count < max
            && start + count < entries.len()
            && entries[start + count].address
                == entries[start + count - 1].address.saturating_add(step)
        {
            count += 1;
        }

        out.push((start, count));
        start += count;
    }

    out
}

struct Reporter<'token, 'err, P> {
    progress: P,
    /// Current progress.
    current: usize,
    /// Last percentage reported.
    last_percentage: usize,
    /// Total.
    total: usize,
    /// Set to stop the pass when the progress sink fails.
    token: &'token Token,
    /// Last error captured from a worker or the progress sink.
    last_err: &'err mut Option<anyhow::Error>,
}

impl<'token, 'err, P> Reporter<'token, 'err, P> {
    fn new(
        progress: P,
        total: usize,
        token: &'token Token,
        last_err: &'err mut Option<anyhow::Error>,
    ) -> Reporter<'token, 'err, P> {
        Reporter {
            progress,
            current: 0,
            last_percentage: 0,
            total,
            token,
            last_err,
        }
    }

    /// Evaluate the given result.
    fn eval<T>(&mut self, result: anyhow::Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.token.set();
                *self.last_err = Some(e);
                None
            }
        }
    }

    fn report_bytes(&mut self, bytes: Size)
    where
        P: ScanProgress,
    {
        if let Err(e) = self.progress.report_bytes(bytes) {
            *self.last_err = Some(e);
            self.token.set();
        }
    }

    fn tick_n(&mut self, count: usize, results: u64)
    where
        P: ScanProgress,
    {
        if self.total == 0 {
            return;
        }

        self.current += count;
        let p = usize::min((self.current * 100) / self.total, 100);

        if p > self.last_percentage {
            if let Err(e) = self.progress.report(p, results) {
                *self.last_err = Some(e);
                self.token.set();
            }

            self.last_percentage = p;
        }
    }
}
