// 📊 Drift Reporter - Issue taxonomy + run summary
//
// Everything non-fatal lands here: counters, warnings, errors and the
// mismatch lists, aggregated across all groups and rendered with a cap
// per category so a drifted import stays readable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reconciliation::{GroupStatus, MismatchRecord, ReconciliationOutcome};

/// How many entries of each mismatch/warning category the rendered
/// summary shows. Full counts are always printed.
pub const REPORT_CAP: usize = 10;

// ============================================================================
// ISSUE TAXONOMY
// ============================================================================

/// Every non-fatal condition the import can record.
///
/// Row- and member-local issues skip only their own scope; group-fatal
/// ones mark the whole group Errored. None of them stops the run.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ImportIssue {
    /// Row-local: dropped with a warning, siblings continue.
    #[error("line {line}: malformed row ({reason})")]
    MalformedRow { line: usize, reason: String },

    /// Lookup returned more than one record; first was taken.
    #[error("ambiguous {kind} match for '{query}': {count} records, using first")]
    AmbiguousMatch {
        kind: String,
        query: String,
        count: usize,
    },

    /// Group-fatal: no role record, nothing in the group can be created.
    #[error("device role '{role}' not found for group {group}")]
    UnresolvedRole { group: String, role: String },

    /// Member-fatal: only this member is skipped.
    #[error("device type '{model}' not found for {entity}")]
    UnresolvedDeviceType { entity: String, model: String },

    /// No site resolved for the group's facility code.
    #[error("no site found for facility code {facility:?} (group {group})")]
    MissingSite {
        group: String,
        facility: Option<String>,
    },

    /// No member was tagged master; the lowest position was promoted.
    #[error("group {group}: no master-tagged member, using position {position}")]
    ImplicitMaster { group: String, position: u32 },

    /// A store create/save failed; caught at the group boundary.
    #[error("store operation failed for group {group}: {message}")]
    StoreFailure { group: String, message: String },
}

// ============================================================================
// RUN SUMMARY
// ============================================================================

/// Aggregated result of one import run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub devices_created: usize,
    pub devices_updated: usize,
    pub devices_skipped: usize,
    pub composites_created: usize,
    pub composites_updated: usize,

    pub groups_created: usize,
    pub groups_validated: usize,
    pub groups_errored: usize,

    pub errors: Vec<ImportIssue>,
    pub warnings: Vec<ImportIssue>,
    pub serial_mismatches: Vec<MismatchRecord>,
    pub structural_mismatches: Vec<MismatchRecord>,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    pub fn new() -> Self {
        RunSummary {
            devices_created: 0,
            devices_updated: 0,
            devices_skipped: 0,
            composites_created: 0,
            composites_updated: 0,
            groups_created: 0,
            groups_validated: 0,
            groups_errored: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            serial_mismatches: Vec::new(),
            structural_mismatches: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Record row-level warnings from the grouper.
    pub fn record_warnings(&mut self, warnings: &[ImportIssue]) {
        self.warnings.extend_from_slice(warnings);
    }

    /// Fold one group outcome into the totals. Purely additive.
    pub fn absorb(&mut self, outcome: &ReconciliationOutcome) {
        self.devices_created += outcome.devices_created;
        self.devices_updated += outcome.devices_updated;
        self.devices_skipped += outcome.devices_skipped;
        if outcome.composite_created {
            self.composites_created += 1;
        }
        if outcome.composite_updated {
            self.composites_updated += 1;
        }

        match outcome.status {
            GroupStatus::Created => self.groups_created += 1,
            GroupStatus::Validated => self.groups_validated += 1,
            GroupStatus::Errored => self.groups_errored += 1,
            GroupStatus::Skipped => {}
        }

        self.warnings.extend_from_slice(&outcome.warnings);
        self.errors.extend_from_slice(&outcome.errors);

        for mismatch in &outcome.mismatches {
            match mismatch {
                MismatchRecord::Serial { .. } => self.serial_mismatches.push(mismatch.clone()),
                MismatchRecord::Position { .. } | MismatchRecord::MemberCount { .. } => {
                    self.structural_mismatches.push(mismatch.clone())
                }
            }
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn has_drift(&self) -> bool {
        !self.serial_mismatches.is_empty() || !self.structural_mismatches.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// One-line digest of the counters.
    pub fn digest(&self) -> String {
        format!(
            "{} created, {} updated, {} skipped, {} composites created, {} verified, {} errors, {} warnings",
            self.devices_created,
            self.devices_updated,
            self.devices_skipped,
            self.composites_created,
            self.composites_updated,
            self.errors.len(),
            self.warnings.len()
        )
    }

    /// Human-readable report, first `REPORT_CAP` entries per category.
    pub fn render(&self) -> String {
        self.render_with_cap(REPORT_CAP)
    }

    pub fn render_with_cap(&self, cap: usize) -> String {
        let mut out = String::new();
        let line = "=".repeat(60);

        out.push_str(&line);
        out.push_str("\nIMPORT SUMMARY\n");
        out.push_str(&line);
        out.push('\n');
        out.push_str(&format!("Devices Created:    {}\n", self.devices_created));
        out.push_str(&format!("Devices Updated:    {}\n", self.devices_updated));
        out.push_str(&format!("Devices Skipped:    {}\n", self.devices_skipped));
        out.push_str(&format!("Composites Created: {}\n", self.composites_created));
        out.push_str(&format!("Composites Updated: {}\n", self.composites_updated));
        out.push_str(&format!(
            "Groups: {} created, {} validated, {} errored\n",
            self.groups_created, self.groups_validated, self.groups_errored
        ));

        Self::render_section(
            &mut out,
            "Serial Number Mismatches",
            &self.serial_mismatches,
            cap,
            |m| m.describe(),
        );
        Self::render_section(
            &mut out,
            "Structural Mismatches",
            &self.structural_mismatches,
            cap,
            |m| m.describe(),
        );
        Self::render_section(&mut out, "Warnings", &self.warnings, cap, |w| w.to_string());
        Self::render_section(&mut out, "Errors", &self.errors, cap, |e| e.to_string());

        out
    }

    fn render_section<T>(
        out: &mut String,
        title: &str,
        items: &[T],
        cap: usize,
        describe: impl Fn(&T) -> String,
    ) {
        if items.is_empty() {
            return;
        }
        out.push_str(&format!("\n{} {}:\n", items.len(), title));
        for item in items.iter().take(cap) {
            out.push_str(&format!("  {}\n", describe(item)));
        }
        if items.len() > cap {
            out.push_str(&format!("  ... and {} more\n", items.len() - cap));
        }
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
