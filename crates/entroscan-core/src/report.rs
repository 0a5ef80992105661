//! Verdicts, scan reports and their text/JSON rendering.

use std::fmt::Write as _;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::{ClassifierError, ClassifierResult};
use crate::outcome::DegradedReason;
use crate::scan::ScanState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Benign,
    Malicious,
}

impl Verdict {
    /// Map a binary classifier label (0 benign, 1 malicious).
    pub fn from_label(label: i64) -> ClassifierResult<Self> {
        match label {
            0 => Ok(Self::Benign),
            1 => Ok(Self::Malicious),
            other => Err(ClassifierError::InvalidLabel(other)),
        }
    }

    pub fn is_malicious(self) -> bool {
        self == Self::Malicious
    }
}

/// Which stage produced a malicious verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    Signature,
    Classifier,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub path: PathBuf,
    pub verdict: Verdict,
    pub source: DetectionSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// A file that was still counted but for which some stage fell back to a
/// default value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradedFile {
    pub path: PathBuf,
    pub reasons: Vec<DegradedReason>,
}

/// Result of one scan run. Only malicious files are listed, in enumeration
/// order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanReport {
    pub root: PathBuf,
    pub detections: Vec<Detection>,
    pub files_examined: usize,
    pub total_files: usize,
    pub stopped: bool,
    pub classifier_available: bool,
    /// Classifier absence is reported once through `classifier_available`
    /// and never repeated here.
    pub degraded: Vec<DegradedFile>,
}

impl ScanReport {
    pub fn infected_count(&self) -> usize {
        self.detections.len()
    }

    pub fn state(&self) -> ScanState {
        if self.stopped {
            ScanState::Stopped
        } else {
            ScanState::Completed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("text") {
            Ok(OutputFormat::Text)
        } else if s.eq_ignore_ascii_case("json") {
            Ok(OutputFormat::Json)
        } else {
            Err(format!("report format must be text or json, got {s:?}"))
        }
    }
}

pub fn print_report(report: &ScanReport, format: OutputFormat) {
    match format {
        OutputFormat::Text => print!("{}", render_text(report)),
        OutputFormat::Json => println!("{}", render_json(report)),
    }
}

pub fn render_text(report: &ScanReport) -> String {
    let mut out = String::new();
    let rule = "=".repeat(70);

    let _ = writeln!(out, "\n{rule}");
    let _ = writeln!(out, "SCAN RESULTS: {}", report.root.display());
    let _ = writeln!(out, "{rule}");

    if report.detections.is_empty() {
        let _ = writeln!(out, "\nNo threats detected.");
    } else {
        let _ = writeln!(out, "\nMALICIOUS FILES ({}):", report.infected_count());
        for d in &report.detections {
            let tag = match d.source {
                DetectionSource::Signature => "SIG",
                DetectionSource::Classifier => "SVM",
            };
            let _ = write!(out, "  [{tag}] {}", d.path.display());
            if let Some(hash) = &d.sha256 {
                let _ = write!(out, "  sha256:{hash}");
            }
            let _ = writeln!(out);
        }
    }

    let _ = writeln!(out, "\nSUMMARY:");
    let state = match report.state() {
        ScanState::Stopped => "stopped",
        _ => "completed",
    };
    let _ = writeln!(out, "  Status:              {state}");
    let _ = writeln!(
        out,
        "  Files examined:      {} / {}",
        report.files_examined, report.total_files
    );
    let _ = writeln!(out, "  Malicious:           {}", report.infected_count());
    let _ = writeln!(out, "  Degraded:            {}", report.degraded.len());
    if !report.classifier_available {
        let _ = writeln!(out, "  Classifier:          unavailable (signature check only)");
    }
    let _ = writeln!(out, "{rule}");
    out
}

pub fn render_json(report: &ScanReport) -> String {
    let output = serde_json::json!({
        "root": report.root,
        "detections": report.detections,
        "summary": {
            "status": if report.stopped { "stopped" } else { "completed" },
            "total": report.total_files,
            "examined": report.files_examined,
            "malicious": report.infected_count(),
            "degraded": report.degraded.len(),
            "classifier_available": report.classifier_available,
        },
        "degraded": report.degraded,
    });
    serde_json::to_string_pretty(&output).unwrap_or_default()
}
