// 📥 Row Grouper - Flat export rows → ordered stack member groups
//
// The AKIPS export is one row per physical switch. Rows sharing a Device
// name are one logical stack; the ID column is the stack position.
// Malformed rows are dropped with a warning, never fatal.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::report::ImportIssue;

/// Required CSV columns. `Location` is optional and defaults to empty.
pub const REQUIRED_COLUMNS: [&str; 7] =
    ["Device", "ID", "Model", "Software", "Serial", "MAC Addr", "Role"];

// ============================================================================
// ROLE TAG
// ============================================================================

/// Stack-member role as reported by the export (not the device role).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleTag {
    Master,
    Backup,
    Linecard,
    Other,
}

impl RoleTag {
    /// Parse the export's Role column. Unknown values map to Other.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "master" => RoleTag::Master,
            "backup" => RoleTag::Backup,
            "linecard" => RoleTag::Linecard,
            _ => RoleTag::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleTag::Master => "master",
            RoleTag::Backup => "backup",
            RoleTag::Linecard => "linecard",
            RoleTag::Other => "other",
        }
    }
}

// ============================================================================
// MEMBER RECORD
// ============================================================================

/// One row of the export, trimmed and typed. Immutable once parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRecord {
    pub group_identifier: String,
    /// Stack position. Unique within a group, defines member order.
    pub member_position: u32,
    pub model: String,
    pub software_version: String,
    pub serial_number: String,
    pub mac_address: String,
    pub role_tag: RoleTag,
    pub location_text: String,
}

// ============================================================================
// DEVICE GROUP
// ============================================================================

/// All members of one stack, sorted ascending by position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceGroup {
    pub identifier: String,
    pub members: Vec<MemberRecord>,
}

impl DeviceGroup {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// The member that should anchor the composite: the first one tagged
    /// master, else the first in position order. The bool reports whether
    /// the fallback was taken so callers can surface the decision.
    pub fn designated_master(&self) -> (&MemberRecord, bool) {
        match self
            .members
            .iter()
            .find(|m| m.role_tag == RoleTag::Master)
        {
            Some(m) => (m, false),
            None => (&self.members[0], true),
        }
    }
}

/// Output of row parsing: groups in first-seen order plus row-level warnings.
#[derive(Debug)]
pub struct ParsedRows {
    pub groups: Vec<DeviceGroup>,
    pub warnings: Vec<ImportIssue>,
    /// Data rows seen in the input, including dropped ones.
    pub total_rows: usize,
}

// ============================================================================
// PARSING
// ============================================================================

/// Parse CSV text into stack groups.
///
/// Groups keep first-seen order; members are stable-sorted by position.
/// Rows missing a required column or with a non-integer ID are skipped
/// with a `MalformedRow` warning. Only an unreadable header is fatal.
pub fn parse_rows(csv_text: &str) -> Result<ParsedRows> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let headers = reader
        .headers()
        .context("Failed to read CSV header row")?
        .clone();

    let column = |name: &str| headers.iter().position(|h| h.trim() == name);
    let location_idx = column("Location");

    let mut groups: Vec<DeviceGroup> = Vec::new();
    let mut warnings = Vec::new();
    let mut total_rows = 0usize;

    for (row_idx, record) in reader.records().enumerate() {
        // Header is line 1, first data row is line 2.
        let line = row_idx + 2;
        total_rows += 1;

        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warnings.push(ImportIssue::MalformedRow {
                    line,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let field = |name: &str| -> Option<&str> {
            column(name).and_then(|i| record.get(i)).map(str::trim)
        };

        let mut missing = None;
        for name in REQUIRED_COLUMNS {
            if field(name).is_none() {
                missing = Some(name);
                break;
            }
        }
        if let Some(name) = missing {
            warnings.push(ImportIssue::MalformedRow {
                line,
                reason: format!("missing required column '{}'", name),
            });
            continue;
        }

        let raw_id = field("ID").unwrap_or_default();
        let member_position: u32 = match raw_id.parse() {
            Ok(v) => v,
            Err(_) => {
                warnings.push(ImportIssue::MalformedRow {
                    line,
                    reason: format!("ID '{}' is not an integer", raw_id),
                });
                continue;
            }
        };

        let group_identifier = field("Device").unwrap_or_default().to_string();
        if group_identifier.is_empty() {
            warnings.push(ImportIssue::MalformedRow {
                line,
                reason: "empty Device column".to_string(),
            });
            continue;
        }

        let member = MemberRecord {
            group_identifier: group_identifier.clone(),
            member_position,
            model: field("Model").unwrap_or_default().to_string(),
            software_version: field("Software").unwrap_or_default().to_string(),
            serial_number: field("Serial").unwrap_or_default().to_string(),
            mac_address: field("MAC Addr").unwrap_or_default().to_string(),
            role_tag: RoleTag::parse(field("Role").unwrap_or_default()),
            location_text: location_idx
                .and_then(|i| record.get(i))
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
        };

        match groups.iter_mut().find(|g| g.identifier == group_identifier) {
            Some(group) => group.members.push(member),
            None => groups.push(DeviceGroup {
                identifier: group_identifier,
                members: vec![member],
            }),
        }
    }

    for group in &mut groups {
        group.members.sort_by_key(|m| m.member_position);
    }

    Ok(ParsedRows {
        groups,
        warnings,
        total_rows,
    })
}

/// Extract a rack name from the export's free-text location column.
///
/// The convention is `"<rack-name> RU<unit>"`, e.g. "RR-VA-1550-R1R2 RU27".
pub fn rack_name_from_location(location_text: &str) -> Option<String> {
    let name = location_text.split(" RU").next().unwrap_or("").trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
