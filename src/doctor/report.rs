//! Diagnostic results and their aggregation

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Check passed
    Pass,
    /// Degraded but usable
    Warn,
    /// Broken
    Fail,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Pass => "PASS",
            Severity::Warn => "WARN",
            Severity::Fail => "FAIL",
        })
    }
}

/// One diagnostic finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Check identifier, e.g. `kernel_modules`
    pub check: String,
    /// Outcome
    pub severity: Severity,
    /// Human readable detail
    pub message: String,
    /// PCI address for device scoped checks, `None` for host scoped ones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl CheckResult {
    /// Result about the host as a whole
    pub fn host(check: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            severity,
            message: message.into(),
            device: None,
        }
    }

    /// Result about one device
    pub fn device(
        check: &str,
        severity: Severity,
        message: impl Into<String>,
        pci_address: &str,
    ) -> Self {
        Self {
            device: Some(pci_address.to_string()),
            ..Self::host(check, severity, message)
        }
    }
}

/// Ordered list of results plus aggregate flags.
///
/// Only the results are serialized, as `{"results": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    results: Vec<CheckResult>,
    #[serde(skip)]
    has_warn: bool,
    #[serde(skip)]
    has_fail: bool,
}

impl Report {
    /// Empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a result and update the flags
    pub fn add(&mut self, result: CheckResult) {
        match result.severity {
            Severity::Warn => self.has_warn = true,
            Severity::Fail => self.has_fail = true,
            Severity::Pass => {}
        }
        self.results.push(result);
    }

    /// Results in insertion order
    pub fn results(&self) -> &[CheckResult] {
        &self.results
    }

    /// Any result is `Warn`
    pub fn has_warn(&self) -> bool {
        self.has_warn
    }

    /// Any result is `Fail`
    pub fn has_fail(&self) -> bool {
        self.has_fail
    }

    /// Copy of the report, dropping `Pass` results unless `show_pass` is set
    pub fn filtered(&self, show_pass: bool) -> Report {
        if show_pass {
            return self.clone();
        }
        let mut out = Report::new();
        for result in self.results.iter().filter(|r| r.severity != Severity::Pass) {
            out.add(result.clone());
        }
        out
    }
}

/// Concatenate reports in order, OR-ing their flags
pub fn merge_reports(reports: &[Report]) -> Report {
    let mut merged = Report::new();
    for report in reports {
        merged.results.extend(report.results.iter().cloned());
        merged.has_warn |= report.has_warn;
        merged.has_fail |= report.has_fail;
    }
    merged
}
