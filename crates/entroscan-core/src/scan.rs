//! Scan orchestrator with progress tracking and cooperative cancellation.
//!
//! Per file: signature check first (authoritative), otherwise feature
//! extraction followed by the classifier. Cancellation is polled between
//! files, so a file already being processed always finishes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use anyhow::{anyhow, Result};
use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::classifier::Classifier;
use crate::digest::sha256_file;
use crate::features::extract_features;
use crate::outcome::DegradedReason;
use crate::report::{DegradedFile, Detection, DetectionSource, ScanReport, Verdict};
use crate::signature::file_matches_signature;

/// Configuration for a scan run.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub root: PathBuf,
    /// Classify files on the rayon pool. Report order is unaffected.
    pub parallel: bool,
}

impl ScanConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            parallel: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Running,
    Completed,
    Stopped,
}

/// Emitted after every processed file. `index` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanProgress {
    pub index: usize,
    pub total: usize,
}

/// State shared between the scan worker and its controller.
///
/// The worker is the only writer of progress and state; the controller is
/// the only writer of the cancel flag.
pub struct ScanSession {
    cancel: AtomicBool,
    processed: AtomicUsize,
    total: AtomicUsize,
    state: Mutex<ScanState>,
}

impl ScanSession {
    pub fn new() -> Self {
        Self {
            cancel: AtomicBool::new(false),
            processed: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            state: Mutex::new(ScanState::Idle),
        }
    }

    /// Clear cancellation and progress ahead of a new scan request. Called
    /// on the controller side before the worker starts so an early stop
    /// request is never lost.
    pub fn reset(&self) {
        self.cancel.store(false, Ordering::Release);
        self.processed.store(0, Ordering::Release);
        self.total.store(0, Ordering::Release);
        self.set_state(ScanState::Idle);
    }

    /// Request a stop. Takes effect before the next file.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ScanState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enter `Running`. A session coming out of a finished scan also has its
    /// cancel flag cleared; an `Idle` session keeps it, so a stop requested
    /// between [`ScanSession::reset`] and the worker starting still applies.
    fn begin(&self, total: usize) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, ScanState::Completed | ScanState::Stopped) {
            self.cancel.store(false, Ordering::Release);
        }
        *state = ScanState::Running;
        drop(state);

        self.processed.store(0, Ordering::Release);
        self.total.store(total, Ordering::Release);
    }

    fn advance(&self) -> usize {
        self.processed.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn set_state(&self, state: ScanState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Collect every regular file under `root`, sorted by file name at each
/// level so the order is stable for a given tree. Symlinks are not followed.
pub fn collect_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(err) => debug!(error = %err, "skipping unreadable entry"),
        }
    }

    files
}

/// Make the scan root absolute so every reported path is absolute too.
/// Symlinks are left as given.
fn resolve_root(root: &Path) -> PathBuf {
    match std::path::absolute(root) {
        Ok(abs) => abs,
        Err(err) => {
            debug!(root = %root.display(), error = %err, "cannot make scan root absolute");
            root.to_path_buf()
        }
    }
}

struct FileResult {
    path: PathBuf,
    detection: Option<Detection>,
    degraded: Vec<DegradedReason>,
}

fn malicious_detection(path: &Path, source: DetectionSource) -> Detection {
    Detection {
        path: path.to_path_buf(),
        verdict: Verdict::Malicious,
        source,
        sha256: sha256_file(path).ok(),
    }
}

/// Run one file through the pipeline.
fn scan_file(path: &Path, classifier: &Classifier) -> FileResult {
    let mut degraded = Vec::new();

    let (matched, reason) = file_matches_signature(path).into_parts();
    degraded.extend(reason);
    if matched {
        debug!(path = %path.display(), "signature match");
        return FileResult {
            path: path.to_path_buf(),
            detection: Some(malicious_detection(path, DetectionSource::Signature)),
            degraded,
        };
    }

    let (features, reason) = extract_features(path).into_parts();
    degraded.extend(reason);

    let (verdict, reason) = classifier.classify(&features).into_parts();
    degraded.extend(reason.filter(|r| *r != DegradedReason::ClassifierUnavailable));

    let detection = verdict.is_malicious().then(|| {
        debug!(path = %path.display(), ?features, "classifier flagged file");
        malicious_detection(path, DetectionSource::Classifier)
    });

    FileResult {
        path: path.to_path_buf(),
        detection,
        degraded,
    }
}

/// Run a full scan. Blocking; call from a worker thread, or use
/// [`spawn_scan`].
///
/// `on_progress` is invoked once per processed file. In parallel mode it
/// may be called from several pool threads.
pub fn run_scan(
    config: &ScanConfig,
    classifier: &Classifier,
    session: &ScanSession,
    on_progress: &(dyn Fn(ScanProgress) + Sync),
) -> ScanReport {
    let root = resolve_root(&config.root);
    if !root.exists() {
        warn!(root = %root.display(), "scan root does not exist");
    }

    let files = collect_files(&root);
    let total = files.len();
    session.begin(total);
    info!(
        root = %root.display(),
        files = total,
        classifier = classifier.is_present(),
        parallel = config.parallel,
        "scan started"
    );

    let process = |path: &PathBuf| -> Option<FileResult> {
        if session.is_cancelled() {
            return None;
        }
        let result = scan_file(path, classifier);
        let index = session.advance();
        on_progress(ScanProgress { index, total });
        Some(result)
    };

    let (results, stopped): (Vec<FileResult>, bool) = if config.parallel {
        let results: Vec<Option<FileResult>> = files.par_iter().map(process).collect();
        let stopped = results.iter().any(Option::is_none);
        (results.into_iter().flatten().collect(), stopped)
    } else {
        let mut results = Vec::with_capacity(total);
        let mut stopped = false;
        for path in &files {
            match process(path) {
                Some(result) => results.push(result),
                None => {
                    stopped = true;
                    break;
                }
            }
        }
        (results, stopped)
    };

    let files_examined = results.len();
    let mut detections = Vec::new();
    let mut degraded = Vec::new();
    for result in results {
        if !result.degraded.is_empty() {
            degraded.push(DegradedFile {
                path: result.path,
                reasons: result.degraded,
            });
        }
        detections.extend(result.detection);
    }

    session.set_state(if stopped {
        ScanState::Stopped
    } else {
        ScanState::Completed
    });
    info!(
        examined = files_examined,
        total,
        malicious = detections.len(),
        degraded = degraded.len(),
        stopped,
        "scan finished"
    );

    ScanReport {
        root,
        detections,
        files_examined,
        total_files: total,
        stopped,
        classifier_available: classifier.is_present(),
        degraded,
    }
}

/// Messages sent from the worker to the controller.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    Progress(ScanProgress),
    Finished(ScanReport),
}

/// Controller side of a scan running on its own thread.
pub struct ScanHandle {
    session: Arc<ScanSession>,
    events: mpsc::Receiver<ScanEvent>,
    worker: JoinHandle<ScanReport>,
}

impl ScanHandle {
    pub fn cancel(&self) {
        self.session.cancel();
    }

    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    pub fn events(&self) -> &mpsc::Receiver<ScanEvent> {
        &self.events
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the worker and return its report.
    pub fn join(self) -> Result<ScanReport> {
        self.worker
            .join()
            .map_err(|_| anyhow!("scan worker panicked"))
    }
}

/// Start a scan on a dedicated worker thread.
pub fn spawn_scan(config: ScanConfig, classifier: Classifier) -> ScanHandle {
    let session = Arc::new(ScanSession::new());
    session.reset();

    let (tx, rx) = mpsc::channel();
    let worker_session = Arc::clone(&session);

    let worker = std::thread::spawn(move || {
        let progress_tx = tx.clone();
        let report = run_scan(&config, &classifier, &worker_session, &move |p| {
            let _ = progress_tx.send(ScanEvent::Progress(p));
        });
        let _ = tx.send(ScanEvent::Finished(report.clone()));
        report
    });

    ScanHandle {
        session,
        events: rx,
        worker,
    }
}
