use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use entroscan_core::classifier::Classify;
use entroscan_core::error::{ClassifierError, ClassifierResult};
use entroscan_core::report::DetectionSource;
use entroscan_core::scan::{collect_files, ScanProgress};
use entroscan_core::signature::EICAR_SIGNATURE;
use entroscan_core::{
    run_scan, spawn_scan, Classifier, DegradedReason, FeatureVector, FileType, ScanConfig,
    ScanEvent, ScanSession, ScanState, Verdict,
};

/// Flags every executable and counts how often it was asked.
struct FlagExecutables {
    calls: Arc<AtomicUsize>,
}

impl Classify for FlagExecutables {
    fn backend(&self) -> &'static str {
        "flag-executables"
    }

    fn predict(&self, features: &FeatureVector) -> ClassifierResult<Verdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(if features.file_type == FileType::Executable {
            Verdict::Malicious
        } else {
            Verdict::Benign
        })
    }
}

struct AlwaysBenign;

impl Classify for AlwaysBenign {
    fn backend(&self) -> &'static str {
        "always-benign"
    }

    fn predict(&self, _features: &FeatureVector) -> ClassifierResult<Verdict> {
        Ok(Verdict::Benign)
    }
}

struct Broken;

impl Classify for Broken {
    fn backend(&self) -> &'static str {
        "broken"
    }

    fn predict(&self, _features: &FeatureVector) -> ClassifierResult<Verdict> {
        Err(ClassifierError::InvalidInput("shape mismatch".into()))
    }
}

fn write(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

fn eicar_file(dir: &Path, name: &str) -> PathBuf {
    let mut content = b"prefix bytes ".to_vec();
    content.extend_from_slice(EICAR_SIGNATURE);
    write(dir, name, &content)
}

fn no_progress(_: ScanProgress) {}

#[test]
fn signature_match_takes_precedence_over_classifier() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "readme.txt", b"plain text");
    write(dir.path(), "photo.png", &[0x89, b'P', b'N', b'G']);
    let infected = eicar_file(dir.path(), "notes.txt");

    let calls = Arc::new(AtomicUsize::new(0));
    let classifier = Classifier::new(FlagExecutables {
        calls: Arc::clone(&calls),
    });
    let session = ScanSession::new();
    let report = run_scan(&ScanConfig::new(dir.path()), &classifier, &session, &no_progress);

    assert_eq!(report.infected_count(), 1);
    let detection = &report.detections[0];
    assert_eq!(detection.path, infected);
    assert_eq!(detection.source, DetectionSource::Signature);
    assert_eq!(detection.verdict, Verdict::Malicious);
    assert_eq!(detection.sha256.as_ref().map(String::len), Some(64));
    // Classifier only ran for the two files without the signature.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn signature_wins_even_when_classifier_disagrees() {
    let dir = tempfile::tempdir().unwrap();
    eicar_file(dir.path(), "eicar.com");

    let report = run_scan(
        &ScanConfig::new(dir.path()),
        &Classifier::new(AlwaysBenign),
        &ScanSession::new(),
        &no_progress,
    );
    assert_eq!(report.infected_count(), 1);
    assert_eq!(report.detections[0].source, DetectionSource::Signature);
}

#[test]
fn progress_reaches_total_on_completion() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..7 {
        write(dir.path(), &format!("sub{}/file{i}.bin", i % 3), &[i as u8; 32]);
    }
    eicar_file(dir.path(), "eicar.com");

    let seen = Mutex::new(Vec::new());
    let session = ScanSession::new();
    let report = run_scan(
        &ScanConfig::new(dir.path()),
        &Classifier::absent("none"),
        &session,
        &|p| seen.lock().unwrap().push(p),
    );

    let seen = seen.into_inner().unwrap();
    assert_eq!(report.total_files, 8);
    assert_eq!(report.files_examined, 8);
    assert_eq!(session.processed(), 8);
    assert_eq!(seen.len(), 8);
    assert_eq!(seen.last(), Some(&ScanProgress { index: 8, total: 8 }));
    assert!(seen.iter().enumerate().all(|(i, p)| p.index == i + 1));
    assert_eq!(report.state(), ScanState::Completed);
}

#[test]
fn cancellation_stops_before_next_file() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..10 {
        eicar_file(dir.path(), &format!("f{i:02}.com"));
    }
    let order = collect_files(dir.path());

    let session = ScanSession::new();
    let k = 4;
    let report = run_scan(
        &ScanConfig::new(dir.path()),
        &Classifier::absent("none"),
        &session,
        &|p| {
            if p.index == k {
                session.cancel();
            }
        },
    );

    assert!(report.stopped);
    assert_eq!(report.state(), ScanState::Stopped);
    assert_eq!(session.state(), ScanState::Stopped);
    assert_eq!(report.files_examined, k);
    assert!(report.files_examined < report.total_files);
    let flagged: Vec<_> = report.detections.iter().map(|d| d.path.clone()).collect();
    assert_eq!(flagged, order[..k].to_vec());
}

#[test]
fn cancel_after_last_file_is_completed() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", b"a");
    write(dir.path(), "b.txt", b"b");

    let session = ScanSession::new();
    let report = run_scan(
        &ScanConfig::new(dir.path()),
        &Classifier::absent("none"),
        &session,
        &|p| {
            if p.index == p.total {
                session.cancel();
            }
        },
    );
    assert!(!report.stopped);
    assert_eq!(report.files_examined, 2);
}

#[test]
fn absent_classifier_yields_no_statistical_verdicts() {
    let dir = tempfile::tempdir().unwrap();
    let random: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
    write(dir.path(), "packed.exe", &random);
    write(dir.path(), "driver.sys", &random);
    write(dir.path(), "notes.txt", b"hello");

    let report = run_scan(
        &ScanConfig::new(dir.path()),
        &Classifier::load(Path::new("/nonexistent/svm_model.onnx")),
        &ScanSession::new(),
        &no_progress,
    );
    assert_eq!(report.infected_count(), 0);
    assert_eq!(report.files_examined, 3);
    assert!(!report.classifier_available);
    assert!(report.degraded.is_empty());
}

#[test]
fn empty_directory_completes_with_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let session = ScanSession::new();
    let report = run_scan(
        &ScanConfig::new(dir.path()),
        &Classifier::new(AlwaysBenign),
        &session,
        &no_progress,
    );
    assert_eq!(report.infected_count(), 0);
    assert_eq!(report.total_files, 0);
    assert_eq!(report.files_examined, 0);
    assert!(!report.stopped);
    assert_eq!(session.state(), ScanState::Completed);
}

#[test]
fn prediction_failure_is_benign_and_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "tool.exe", b"MZ....");

    let report = run_scan(
        &ScanConfig::new(dir.path()),
        &Classifier::new(Broken),
        &ScanSession::new(),
        &no_progress,
    );
    assert_eq!(report.infected_count(), 0);
    assert_eq!(report.files_examined, 1);
    assert_eq!(report.degraded.len(), 1);
    assert_eq!(report.degraded[0].path, path);
    assert!(matches!(
        &report.degraded[0].reasons[..],
        [DegradedReason::PredictionFailed { message }] if message.contains("shape mismatch")
    ));
}

#[test]
fn parallel_scan_keeps_enumeration_order() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..40 {
        let ext = if i % 3 == 0 { "exe" } else { "txt" };
        write(dir.path(), &format!("d{}/f{i:02}.{ext}", i % 4), &[i as u8; 128]);
    }
    let expected: Vec<PathBuf> = collect_files(dir.path())
        .into_iter()
        .filter(|p| p.extension().is_some_and(|e| e == "exe"))
        .collect();

    let classifier = Classifier::new(FlagExecutables {
        calls: Arc::new(AtomicUsize::new(0)),
    });
    let mut config = ScanConfig::new(dir.path());
    config.parallel = true;
    let report = run_scan(&config, &classifier, &ScanSession::new(), &no_progress);

    let flagged: Vec<PathBuf> = report.detections.iter().map(|d| d.path.clone()).collect();
    assert_eq!(flagged, expected);
    assert!(report
        .detections
        .iter()
        .all(|d| d.source == DetectionSource::Classifier));
    assert_eq!(report.files_examined, 40);
}

#[test]
fn svm_model_from_json_flags_high_entropy_executable() {
    let dir = tempfile::tempdir().unwrap();
    let model_dir = tempfile::tempdir().unwrap();
    let model_path = model_dir.path().join("svm_model.json");
    // Support vectors sit exactly on the two files written below.
    fs::write(
        &model_path,
        r#"{
            "kernel": {"type": "rbf", "gamma": 0.5},
            "support_vectors": [[256.0, 8.0, 1.0], [16.0, 2.0, 3.0]],
            "dual_coef": [1.0, -1.0],
            "intercept": 0.0
        }"#,
    )
    .unwrap();

    let packed: Vec<u8> = (0..=255u8).collect();
    let packed_path = write(dir.path(), "packed.exe", &packed);
    write(dir.path(), "letter.txt", b"aaaabbbbccccdddd");

    let classifier = Classifier::load(&model_path);
    assert!(classifier.is_present());

    let report = run_scan(
        &ScanConfig::new(dir.path()),
        &classifier,
        &ScanSession::new(),
        &no_progress,
    );
    assert!(report.classifier_available);
    assert_eq!(report.infected_count(), 1);
    assert_eq!(report.detections[0].path, packed_path);
    assert_eq!(report.detections[0].source, DetectionSource::Classifier);
}

#[test]
fn spawned_scan_reports_progress_and_result() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", b"a");
    write(dir.path(), "b.txt", b"b");
    eicar_file(dir.path(), "c.com");

    let handle = spawn_scan(ScanConfig::new(dir.path()), Classifier::absent("none"));

    let mut progress = Vec::new();
    let mut finished = None;
    for event in handle.events() {
        match event {
            ScanEvent::Progress(p) => progress.push(p),
            ScanEvent::Finished(report) => {
                finished = Some(report);
                break;
            }
        }
    }
    let report = handle.join().unwrap();

    assert_eq!(progress.len(), 3);
    assert_eq!(finished.as_ref(), Some(&report));
    assert_eq!(report.infected_count(), 1);
    assert_eq!(report.state(), ScanState::Completed);
}

/// Benign classifier slow enough that a stop request always lands mid-scan.
struct Slow;

impl Classify for Slow {
    fn backend(&self) -> &'static str {
        "slow"
    }

    fn predict(&self, _features: &FeatureVector) -> ClassifierResult<Verdict> {
        std::thread::sleep(Duration::from_millis(50));
        Ok(Verdict::Benign)
    }
}

#[test]
fn spawned_scan_stops_on_cancel() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..20 {
        write(dir.path(), &format!("{i:02}.txt"), b"benign");
    }

    let handle = spawn_scan(ScanConfig::new(dir.path()), Classifier::new(Slow));
    handle.cancel();
    let report = handle.join().unwrap();

    assert!(report.stopped);
    assert_eq!(report.total_files, 20);
    assert!(report.files_examined < report.total_files);
    assert!(report.detections.is_empty());
}

#[test]
fn session_reused_after_stop_scans_again() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a.txt", "b.txt", "c.txt"] {
        write(dir.path(), name, b"benign");
    }
    let config = ScanConfig::new(dir.path());
    let classifier = Classifier::absent("none");
    let session = ScanSession::new();

    let first = run_scan(&config, &classifier, &session, &|_| session.cancel());
    assert!(first.stopped);
    assert_eq!(first.files_examined, 1);

    let second = run_scan(&config, &classifier, &session, &no_progress);
    assert!(!second.stopped);
    assert_eq!(second.files_examined, 3);
    assert_eq!(second.total_files, 3);
    assert_eq!(session.state(), ScanState::Completed);
}

#[test]
fn relative_root_reports_absolute_paths() {
    // Created under the working directory so its path stays relative.
    let dir = tempfile::tempdir_in(".").unwrap();
    assert!(dir.path().is_relative());
    eicar_file(dir.path(), "eicar.com");

    let report = run_scan(
        &ScanConfig::new(dir.path()),
        &Classifier::absent("none"),
        &ScanSession::new(),
        &no_progress,
    );
    assert!(report.root.is_absolute());
    assert_eq!(report.infected_count(), 1);
    let detection = &report.detections[0];
    assert!(detection.path.is_absolute());
    assert!(detection.path.ends_with("eicar.com"));
    assert_eq!(detection.sha256.as_ref().map(String::len), Some(64));
}

/// True if every element of `sub` appears in `full` in the same order.
fn is_subsequence(sub: &[PathBuf], full: &[PathBuf]) -> bool {
    let mut rest = full.iter();
    sub.iter().all(|item| rest.any(|candidate| candidate == item))
}

#[test]
fn parallel_scan_cancellation_keeps_order() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..400 {
        eicar_file(dir.path(), &format!("d{}/f{i:03}.com", i % 8));
    }
    let order = collect_files(dir.path());

    let session = ScanSession::new();
    let mut config = ScanConfig::new(dir.path());
    config.parallel = true;
    let report = run_scan(&config, &Classifier::absent("none"), &session, &|p| {
        if p.index == 4 {
            session.cancel();
        }
    });

    assert!(report.stopped);
    assert_eq!(session.state(), ScanState::Stopped);
    assert_eq!(report.total_files, 400);
    assert!(report.files_examined >= 4);
    assert!(report.files_examined < report.total_files);
    let flagged: Vec<PathBuf> = report.detections.iter().map(|d| d.path.clone()).collect();
    assert_eq!(flagged.len(), report.files_examined);
    assert!(is_subsequence(&flagged, &order));
}
