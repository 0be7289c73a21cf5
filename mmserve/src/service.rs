//! The query service.
//!
//! Each document (the database source files as one logical document,
//! plus any number of proof worksheets) runs through the phases
//! `Unparsed → Parsing → Ready → Stale → Parsing → … → Closed`.
//! `Ready` snapshots are immutable and published atomically; readers
//! are served from the last published snapshot while workers rebuild.
//! An edit bumps the document's generation and cancels the in-flight
//! job by dropping its cancel channel; a canceled job never publishes.

use crate::config::Workspace;
use crate::query::{self, DocDiag, HoverInfo, Location};
use crate::{CondvarExt, Error, MutexExt};
use fnv::FnvHashMap;
use metamath_parse::{Loader, SourceMap};
use mmdb::{verify, Builder, Db, Interrupt, ProofEntry, StepUnification, UnifyFailure, VerifyError, Worksheet};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

/// Lifecycle phase of a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Unparsed,
    Parsing,
    Ready,
    Stale,
    Closed,
}

/// Published result of building the database document.
pub struct DbSnapshot {
    pub db: Db,
    pub sources: Arc<SourceMap>,
}

/// Published result of parsing one worksheet document.
pub struct SheetSnapshot {
    pub text: Arc<str>,
    pub sheet: Worksheet,
}

struct Slot<T> {
    phase: Phase,
    /// Generation of the latest edit.
    gen: u64,
    /// Generation whose result was last published.
    published: u64,
    ready: Option<Arc<T>>,
    cancel: Option<flume::Sender<()>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            phase: Phase::Unparsed,
            gen: 0,
            published: 0,
            ready: None,
            cancel: None,
        }
    }
}

impl<T> Slot<T> {
    /// Supersede any in-flight job and return the next generation.
    fn invalidate(&mut self) -> u64 {
        // dropping the sender interrupts the running job
        self.cancel = None;
        self.gen += 1;
        self.phase = if self.ready.is_some() {
            Phase::Stale
        } else {
            Phase::Parsing
        };
        self.gen
    }

    fn is_fresh(&self) -> bool {
        self.published >= self.gen
    }
}

struct State {
    db: Slot<DbSnapshot>,
    sheets: FnvHashMap<PathBuf, Slot<SheetSnapshot>>,
    /// Unsaved document contents, consulted before the file system.
    overlay: FnvHashMap<PathBuf, Arc<str>>,
}

enum Job {
    Rebuild {
        gen: u64,
        cancel: flume::Receiver<()>,
    },
    Sheet {
        path: PathBuf,
        gen: u64,
        cancel: flume::Receiver<()>,
        text: Arc<str>,
    },
    Shutdown,
}

/// Diagnostics pushed after every publication.
pub struct DiagnosticsEvent {
    pub doc: PathBuf,
    pub diagnostics: Vec<DocDiag>,
}

struct Shared {
    ws: Workspace,
    loader: Box<dyn Loader + Send + Sync>,
    state: Mutex<State>,
    ready: Condvar,
    jobs: flume::Sender<Job>,
    events_tx: flume::Sender<DiagnosticsEvent>,
    events_rx: flume::Receiver<DiagnosticsEvent>,
    dv_hints: AtomicBool,
}

pub struct Service {
    shared: Arc<Shared>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl Service {
    /// Start the worker pool and schedule the initial build.
    ///
    /// The only fatal startup condition is an unreadable root file.
    pub fn new(ws: Workspace, loader: Box<dyn Loader + Send + Sync>) -> Result<Self, Error> {
        loader
            .load(&ws.main_file)
            .map_err(|e| metamath_parse::Error::Io(ws.main_file.clone(), e))?;

        let (jobs_tx, jobs_rx) = flume::unbounded();
        let (events_tx, events_rx) = flume::unbounded();
        let shared = Arc::new(Shared {
            ws,
            loader,
            state: Mutex::new(State {
                db: Slot::default(),
                sheets: Default::default(),
                overlay: Default::default(),
            }),
            ready: Condvar::new(),
            jobs: jobs_tx,
            events_tx,
            events_rx,
            dv_hints: AtomicBool::new(false),
        });

        let workers = (0..shared.ws.jobs.max(1))
            .map(|i| {
                let shared = shared.clone();
                let rx = jobs_rx.clone();
                thread::Builder::new()
                    .name(format!("mmserve-worker-{}", i))
                    .spawn(move || worker(shared, rx))
                    .expect("spawning a worker thread")
            })
            .collect();

        let service = Self { shared, workers };
        service.schedule_rebuild();
        Ok(service)
    }

    fn schedule_rebuild(&self) {
        let gen;
        let crx;
        {
            let mut st = self.shared.state.ulock();
            gen = st.db.invalidate();
            let (ctx, rx) = flume::bounded(1);
            st.db.cancel = Some(ctx);
            crx = rx;
        }
        let _ = self.shared.jobs.send(Job::Rebuild { gen, cancel: crx });
    }

    fn schedule_sheet(&self, path: PathBuf, text: Arc<str>) {
        let gen;
        let crx;
        {
            let mut st = self.shared.state.ulock();
            let slot = st.sheets.entry(path.clone()).or_default();
            gen = slot.invalidate();
            let (ctx, rx) = flume::bounded(1);
            slot.cancel = Some(ctx);
            crx = rx;
        }
        let _ = self.shared.jobs.send(Job::Sheet {
            path,
            gen,
            cancel: crx,
            text,
        });
    }

    /// Whether a path belongs to the database document.
    fn is_db_file(&self, path: &Path) -> bool {
        if *path == self.shared.ws.main_file {
            return true;
        }
        let st = self.shared.state.ulock();
        st.db
            .ready
            .as_ref()
            .map_or(false, |snap| snap.sources.file_id(path).is_some())
    }

    pub fn open(&self, path: impl Into<PathBuf>, text: impl Into<Arc<str>>) {
        self.edit(path, text)
    }

    /// Replace a document's contents. The affected document goes
    /// `Stale` and a reparse job supersedes any in-flight one.
    pub fn edit(&self, path: impl Into<PathBuf>, text: impl Into<Arc<str>>) {
        let path = path.into();
        let text = text.into();
        self.shared
            .state
            .ulock()
            .overlay
            .insert(path.clone(), text.clone());
        if self.is_db_file(&path) {
            self.schedule_rebuild()
        } else {
            self.schedule_sheet(path, text)
        }
    }

    /// Forget a document's overlay, reverting to the file system.
    pub fn close(&self, path: &Path) {
        {
            let mut st = self.shared.state.ulock();
            st.overlay.remove(path);
            if let Some(slot) = st.sheets.get_mut(path) {
                slot.cancel = None;
                slot.phase = Phase::Closed;
            }
        }
        if self.is_db_file(path) {
            self.schedule_rebuild()
        }
    }

    pub fn phase(&self, path: &Path) -> Phase {
        let st = self.shared.state.ulock();
        let in_db = *path == self.shared.ws.main_file
            || st
                .db
                .ready
                .as_ref()
                .map_or(false, |s| s.sources.file_id(path).is_some());
        if in_db {
            st.db.phase
        } else {
            st.sheets.get(path).map_or(Phase::Unparsed, |s| s.phase)
        }
    }

    /// The last published database snapshot, stale or not.
    pub fn snapshot(&self) -> Option<Arc<DbSnapshot>> {
        self.shared.state.ulock().db.ready.clone()
    }

    /// Block until the latest edit's rebuild has published.
    pub fn snapshot_fresh(&self) -> Option<Arc<DbSnapshot>> {
        let mut st = self.shared.state.ulock();
        while !st.db.is_fresh() {
            st = self.shared.ready.uwait(st);
        }
        st.db.ready.clone()
    }

    pub fn sheet(&self, path: &Path) -> Option<Arc<SheetSnapshot>> {
        self.shared.state.ulock().sheets.get(path)?.ready.clone()
    }

    pub fn sheet_fresh(&self, path: &Path) -> Option<Arc<SheetSnapshot>> {
        let mut st = self.shared.state.ulock();
        loop {
            let slot = st.sheets.get(path)?;
            if slot.is_fresh() {
                return slot.ready.clone();
            }
            st = self.shared.ready.uwait(st);
        }
    }

    pub fn definition(&self, label: &str) -> Option<Location> {
        query::definition(&*self.snapshot()?, label)
    }

    pub fn hover(&self, label: &str) -> Option<HoverInfo> {
        query::hover(&*self.snapshot()?, label)
    }

    /// Render the stored proof of a theorem as a worksheet.
    /// `None` when the label does not name a theorem.
    pub fn show_proof(&self, label: &str) -> Option<Result<String, VerifyError>> {
        query::show_proof(&*self.snapshot()?, label)
    }

    /// All diagnostics for a document. With `fresh`, waits for the
    /// in-flight reparse instead of answering from the stale snapshot.
    pub fn diagnostics(&self, path: &Path, fresh: bool) -> Vec<DocDiag> {
        if self.is_db_file(path) {
            let snap = if fresh {
                self.snapshot_fresh()
            } else {
                self.snapshot()
            };
            return snap.map_or(Vec::new(), |s| query::db_diagnostics(&s, path));
        }
        let sheet = if fresh {
            self.sheet_fresh(path)
        } else {
            self.sheet(path)
        };
        let (sheet, db) = match (sheet, self.snapshot()) {
            (Some(sheet), Some(db)) => (sheet, db),
            _ => return Vec::new(),
        };
        let dv = self.shared.dv_hints.load(Ordering::Relaxed);
        query::sheet_diagnostics(&sheet.sheet, &db.db, dv)
    }

    /// Unify the worksheet step at a line against the database.
    pub fn unify_step(&self, path: &Path, line: usize) -> Result<StepUnification, UnifyFailure> {
        let sheet = self.sheet(path).ok_or(UnifyFailure::NoCandidate)?;
        let db = self.snapshot().ok_or(UnifyFailure::NoCandidate)?;
        sheet.sheet.unify_step(&db.db, line)
    }

    /// Toggle distinct-variable hints; open worksheets re-diagnose.
    pub fn toggle_dv_hints(&self) -> bool {
        let on = !self.shared.dv_hints.load(Ordering::Relaxed);
        self.shared.dv_hints.store(on, Ordering::Relaxed);
        let sheets: Vec<(PathBuf, Arc<str>)> = {
            let st = self.shared.state.ulock();
            st.sheets
                .iter()
                .filter(|(_, s)| s.phase != Phase::Closed)
                .filter_map(|(p, _)| Some((p.clone(), st.overlay.get(p)?.clone())))
                .collect()
        };
        for (path, text) in sheets {
            self.schedule_sheet(path, text);
        }
        on
    }

    /// Receive a [`DiagnosticsEvent`] after every publication.
    /// Events are consumed by whichever subscriber receives first.
    pub fn subscribe(&self) -> flume::Receiver<DiagnosticsEvent> {
        self.shared.events_rx.clone()
    }

    pub fn dv_hints(&self) -> bool {
        self.shared.dv_hints.load(Ordering::Relaxed)
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        for _ in 0..self.workers.len() {
            let _ = self.shared.jobs.send(Job::Shutdown);
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

struct CancelToken(flume::Receiver<()>);

impl Interrupt for CancelToken {
    fn interrupted(&self) -> bool {
        // a message or a dropped sender both mean "superseded"
        !matches!(self.0.try_recv(), Err(flume::TryRecvError::Empty))
    }
}

/// Loader that prefers unsaved overlay contents over the base loader.
struct OverlayLoader<'a> {
    overlay: FnvHashMap<PathBuf, Arc<str>>,
    inner: &'a (dyn Loader + Send + Sync),
}

impl Loader for OverlayLoader<'_> {
    fn load(&self, path: &Path) -> io::Result<String> {
        match self.overlay.get(path) {
            Some(text) => Ok(text.to_string()),
            None => self.inner.load(path),
        }
    }

    fn resolve(&self, from: &Path, include: &str) -> PathBuf {
        self.inner.resolve(from, include)
    }
}

fn worker(shared: Arc<Shared>, rx: flume::Receiver<Job>) {
    for job in rx.iter() {
        match job {
            Job::Rebuild { gen, cancel } => rebuild(&shared, gen, cancel),
            Job::Sheet {
                path,
                gen,
                cancel,
                text,
            } => sheet_job(&shared, path, gen, cancel, text),
            Job::Shutdown => break,
        }
    }
}

/// Wake fresh-waiters for a generation whose job produced nothing to
/// publish (load failure, discarded snapshot).
fn give_up(shared: &Shared, gen: u64) {
    let mut st = shared.state.ulock();
    if st.db.gen == gen {
        st.db.published = gen;
        st.db.phase = if st.db.ready.is_some() {
            Phase::Ready
        } else {
            Phase::Unparsed
        };
        st.db.cancel = None;
    }
    shared.ready.notify_all();
}

fn rebuild(shared: &Arc<Shared>, gen: u64, cancel: flume::Receiver<()>) {
    let (overlay, prev) = {
        let mut st = shared.state.ulock();
        if st.db.gen != gen {
            return;
        }
        st.db.phase = Phase::Parsing;
        (st.overlay.clone(), st.db.ready.clone())
    };

    let loader = OverlayLoader {
        overlay,
        inner: &*shared.loader,
    };
    let sources = match SourceMap::load(&shared.ws.main_file, &loader) {
        Ok(sm) => Arc::new(sm),
        Err(err) => {
            log::error!("database root unavailable: {}", err);
            return give_up(shared, gen);
        }
    };

    let mut db = match &prev {
        Some(prev) => Builder::new(&sources).with_previous(&prev.db).build(),
        None => Builder::new(&sources).build(),
    };

    let intr = CancelToken(cancel);
    verify::prune_orphans(&mut db);
    let keys = verify::proof_keys(&db);
    let stale = verify::stale(&db, &keys);
    log::info!("verifying {} theorems", stale.len());
    let results: Vec<_> = stale
        .par_iter()
        .map(|&idx| (idx, verify::verify(&db, idx, &intr)))
        .collect();
    for (idx, result) in results {
        if matches!(result, Err(VerifyError::Canceled)) {
            log::debug!("rebuild superseded, discarding");
            return;
        }
        let label = db.stmt(idx).and_then(|s| s.label).expect("theorems are labeled");
        db.set_proof_entry(
            label,
            ProofEntry {
                key: keys[idx],
                result: result.map(Arc::new),
            },
        );
    }
    if intr.interrupted() {
        return;
    }

    // label uniqueness is re-asserted at the single merge point; a
    // violation here means the snapshot is discarded, never published
    if let Err(err) = db.check_labels() {
        log::error!("snapshot discarded: {}", err);
        return give_up(shared, gen);
    }

    let snap = Arc::new(DbSnapshot { db, sources });
    publish_db(shared, gen, snap);
}

fn publish_db(shared: &Arc<Shared>, gen: u64, snap: Arc<DbSnapshot>) {
    let mut resched = Vec::new();
    {
        let mut st = shared.state.ulock();
        if st.db.gen != gen {
            // a newer edit exists; its job will publish instead
            return;
        }
        st.db.ready = Some(snap.clone());
        st.db.published = gen;
        st.db.phase = Phase::Ready;
        st.db.cancel = None;

        // worksheet diagnostics depend on the database: reparse them
        let paths: Vec<PathBuf> = st
            .sheets
            .iter()
            .filter(|(_, s)| s.phase != Phase::Closed)
            .map(|(p, _)| p.clone())
            .collect();
        for path in paths {
            let text = match st.overlay.get(&path) {
                Some(text) => text.clone(),
                None => continue,
            };
            let slot = st.sheets.get_mut(&path).expect("listed above");
            let sgen = slot.invalidate();
            let (ctx, crx) = flume::bounded(1);
            slot.cancel = Some(ctx);
            resched.push((path, sgen, crx, text));
        }
        shared.ready.notify_all();
    }

    for (_, file) in snap.sources.files() {
        let _ = shared.events_tx.send(DiagnosticsEvent {
            doc: file.path.clone(),
            diagnostics: query::db_diagnostics(&snap, &file.path),
        });
    }
    for (path, gen, cancel, text) in resched {
        let _ = shared.jobs.send(Job::Sheet {
            path,
            gen,
            cancel,
            text,
        });
    }
}

fn sheet_job(
    shared: &Arc<Shared>,
    path: PathBuf,
    gen: u64,
    cancel: flume::Receiver<()>,
    text: Arc<str>,
) {
    let db = {
        let mut st = shared.state.ulock();
        match st.sheets.get_mut(&path) {
            Some(slot) if slot.gen == gen => slot.phase = Phase::Parsing,
            _ => return,
        }
        st.db.ready.clone()
    };

    let intr = CancelToken(cancel);
    let sheet = match &db {
        Some(snap) => Worksheet::parse(&text, &snap.db),
        None => Worksheet::parse(&text, &Db::new()),
    };
    if intr.interrupted() {
        return;
    }

    let snap = Arc::new(SheetSnapshot { text, sheet });
    {
        let mut st = shared.state.ulock();
        let slot = match st.sheets.get_mut(&path) {
            Some(slot) if slot.gen == gen => slot,
            _ => return,
        };
        slot.ready = Some(snap.clone());
        slot.published = gen;
        slot.phase = Phase::Ready;
        slot.cancel = None;
        shared.ready.notify_all();
    }

    let diagnostics = match &db {
        Some(dbs) => query::sheet_diagnostics(
            &snap.sheet,
            &dbs.db,
            shared.dv_hints.load(Ordering::Relaxed),
        ),
        None => Vec::new(),
    };
    let _ = shared.events_tx.send(DiagnosticsEvent {
        doc: path,
        diagnostics,
    });
}
