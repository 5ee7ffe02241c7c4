// ⚖️ Reconciliation Engine - Converge the store to the export, report drift
//
// Per-group state machine:
//   nothing exists            → create (single entity, or composite + members)
//   bare entity, no composite → convert to composite / validate single
//   composite exists          → verify members, report mismatches
//
// Existing serial/model/software values are never corrected, only compared.
// Each group is an independent unit of work: a failure marks that group
// Errored and the run moves on.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::identifier::{IdentifierParser, ParserStrategy, RoleClass};
use crate::report::ImportIssue;
use crate::rows::{DeviceGroup, MemberRecord, RoleTag};
use crate::sites::{SiteMatch, SiteResolver};
use crate::store::{
    DeviceTypeRecord, EntityPatch, InventoryStore, NewCompositeEntity, NewMemberEntity,
    PlatformRecord, RoleRecord,
};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Import behavior knobs. Fixed tables are injectable, not global state.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Create missing device types and roles instead of warning.
    pub create_missing: bool,
    /// Facility-code extraction strategy.
    pub strategy: ParserStrategy,
    /// Treat an unresolvable site as a group error instead of a warning.
    pub require_site: bool,
    /// Manufacturer prefix used in device-type naming conventions.
    pub manufacturer: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig {
            create_missing: false,
            strategy: ParserStrategy::Structural,
            require_site: false,
            manufacturer: "Juniper".to_string(),
        }
    }
}

// ============================================================================
// OUTCOMES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupStatus {
    /// New entities were created for this group.
    Created,
    /// The group already existed and was verified/converted in place.
    Validated,
    /// Nothing could be done for the group (e.g. its only member failed).
    Skipped,
    /// A group-fatal condition; members counted skipped.
    Errored,
}

/// A detected discrepancy between the export and the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MismatchRecord {
    Serial {
        entity: String,
        expected: String,
        actual: String,
    },
    Position {
        entity: String,
        expected: u32,
        actual: Option<u32>,
    },
    MemberCount {
        group: String,
        expected: usize,
        actual: usize,
    },
}

impl MismatchRecord {
    pub fn describe(&self) -> String {
        match self {
            MismatchRecord::Serial {
                entity,
                expected,
                actual,
            } => format!(
                "{}: serial mismatch - expected {}, found {}",
                entity, expected, actual
            ),
            MismatchRecord::Position {
                entity,
                expected,
                actual,
            } => match actual {
                Some(actual) => format!(
                    "{}: position mismatch - expected {}, found {}",
                    entity, expected, actual
                ),
                None => format!(
                    "{}: position mismatch - expected {}, found none",
                    entity, expected
                ),
            },
            MismatchRecord::MemberCount {
                group,
                expected,
                actual,
            } => format!(
                "{}: member count mismatch - expected {}, found {}",
                group, expected, actual
            ),
        }
    }
}

/// Per-group result. One of these per input group, no matter what.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    pub group_identifier: String,
    pub status: GroupStatus,
    pub mismatches: Vec<MismatchRecord>,
    pub warnings: Vec<ImportIssue>,
    pub errors: Vec<ImportIssue>,
    pub devices_created: usize,
    pub devices_updated: usize,
    pub devices_skipped: usize,
    pub composite_created: bool,
    pub composite_updated: bool,
}

impl ReconciliationOutcome {
    pub fn new(group_identifier: &str) -> Self {
        ReconciliationOutcome {
            group_identifier: group_identifier.to_string(),
            status: GroupStatus::Skipped,
            mismatches: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
            devices_created: 0,
            devices_updated: 0,
            devices_skipped: 0,
            composite_created: false,
            composite_updated: false,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty() && self.errors.is_empty()
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct ReconciliationEngine<'a, S: InventoryStore> {
    store: &'a S,
    config: ImportConfig,
    parser: IdentifierParser,
}

/// Common records resolved once per group.
struct GroupContext {
    role: RoleRecord,
    platform: PlatformRecord,
    site: SiteMatch,
}

impl<'a, S: InventoryStore> ReconciliationEngine<'a, S> {
    pub fn new(store: &'a S, config: ImportConfig) -> Self {
        let parser = IdentifierParser::new(config.strategy);
        ReconciliationEngine {
            store,
            config,
            parser,
        }
    }

    /// Process every group sequentially. A group's failure never aborts
    /// its siblings; store errors become an Errored outcome for that
    /// group only.
    pub fn run(&self, groups: &[DeviceGroup]) -> Vec<ReconciliationOutcome> {
        groups
            .iter()
            .map(|group| match self.reconcile_group(group) {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(group = %group.identifier, error = %e, "group failed");
                    let mut outcome = ReconciliationOutcome::new(&group.identifier);
                    outcome.status = GroupStatus::Errored;
                    outcome.devices_skipped = group.size();
                    outcome.errors.push(ImportIssue::StoreFailure {
                        group: group.identifier.clone(),
                        message: format!("{:#}", e),
                    });
                    outcome
                }
            })
            .collect()
    }

    fn reconcile_group(&self, group: &DeviceGroup) -> Result<ReconciliationOutcome> {
        let mut outcome = ReconciliationOutcome::new(&group.identifier);
        let resolver = SiteResolver::new(self.store);

        let parsed = self.parser.parse(&group.identifier, &resolver);
        let site = resolver.resolve(parsed.facility_code.as_deref())?;

        if site.ambiguous {
            outcome.warnings.push(ImportIssue::AmbiguousMatch {
                kind: "site".to_string(),
                query: parsed.facility_code.clone().unwrap_or_default(),
                count: site.matches,
            });
        }
        if !site.is_resolved() {
            let issue = ImportIssue::MissingSite {
                group: group.identifier.clone(),
                facility: parsed.facility_code.clone(),
            };
            warn!(group = %group.identifier, facility = ?parsed.facility_code, "no site resolved");
            if self.config.require_site {
                outcome.errors.push(issue);
                outcome.status = GroupStatus::Errored;
                outcome.devices_skipped = group.size();
                return Ok(outcome);
            }
            outcome.warnings.push(issue);
        }

        // Role is a hard dependency: without it no member can be created
        // consistently, so the whole group is errored.
        let role = match self.resolve_role(parsed.role_class)? {
            Some(role) => role,
            None => {
                outcome.errors.push(ImportIssue::UnresolvedRole {
                    group: group.identifier.clone(),
                    role: parsed.role_class.as_str().to_string(),
                });
                outcome.status = GroupStatus::Errored;
                outcome.devices_skipped = group.size();
                return Ok(outcome);
            }
        };

        let platform = self.store.find_or_create_platform()?;
        let ctx = GroupContext {
            role,
            platform,
            site,
        };

        let (master, fallback) = group.designated_master();
        if fallback {
            warn!(
                group = %group.identifier,
                position = master.member_position,
                "no master-tagged member, promoting lowest position"
            );
            outcome.warnings.push(ImportIssue::ImplicitMaster {
                group: group.identifier.clone(),
                position: master.member_position,
            });
        }

        if let Some(composite) = self.store.find_composite(&group.identifier)? {
            self.verify_composite(group, &composite, &ctx, &mut outcome)?;
        } else if let Some(existing) = self.store.find_entity_by_name(&group.identifier)? {
            self.convert_bare_entity(group, existing, master, &ctx, &mut outcome)?;
        } else {
            self.create_group(group, master, &ctx, &mut outcome)?;
        }

        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // State: composite exists → verify
    // ------------------------------------------------------------------

    fn verify_composite(
        &self,
        group: &DeviceGroup,
        composite: &crate::store::CompositeEntity,
        ctx: &GroupContext,
        outcome: &mut ReconciliationOutcome,
    ) -> Result<()> {
        info!(group = %group.identifier, "composite exists, verifying");
        outcome.composite_updated = true;
        outcome.status = GroupStatus::Validated;

        for member in &group.members {
            let member_name = member_entity_name(&group.identifier, member.member_position);

            match self.store.find_entity_by_name(&member_name)? {
                Some(entity) => {
                    if entity.serial_number != member.serial_number {
                        outcome.mismatches.push(MismatchRecord::Serial {
                            entity: member_name.clone(),
                            expected: member.serial_number.clone(),
                            actual: entity.serial_number.clone(),
                        });
                    }
                    if entity.position != Some(member.member_position) {
                        outcome.mismatches.push(MismatchRecord::Position {
                            entity: member_name.clone(),
                            expected: member.member_position,
                            actual: entity.position,
                        });
                    }
                }
                None => {
                    // Missing member: create and attach, never rename others
                    let Some(device_type) =
                        self.resolve_device_type(&member.model, &member_name, outcome)?
                    else {
                        continue;
                    };
                    self.store.create_member_entity(self.new_member(
                        &member_name,
                        member,
                        &device_type,
                        ctx,
                        Some(composite.id.clone()),
                    ))?;
                    info!(entity = %member_name, "created missing composite member");
                    outcome.devices_created += 1;
                }
            }
        }

        // Count after backfill: a member the export has and the store lacked
        // was just created, so only members the export no longer lists show
        // up here as a count mismatch.
        let attached = self.store.composite_members(&composite.id)?.len();
        if attached != group.size() {
            outcome.mismatches.push(MismatchRecord::MemberCount {
                group: group.identifier.clone(),
                expected: group.size(),
                actual: attached,
            });
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // State: bare entity exists → convert to composite / validate single
    // ------------------------------------------------------------------

    fn convert_bare_entity(
        &self,
        group: &DeviceGroup,
        existing: crate::store::MemberEntity,
        master: &MemberRecord,
        ctx: &GroupContext,
        outcome: &mut ReconciliationOutcome,
    ) -> Result<()> {
        info!(group = %group.identifier, "entity exists without composite");

        if existing.serial_number != master.serial_number {
            outcome.mismatches.push(MismatchRecord::Serial {
                entity: existing.name.clone(),
                expected: master.serial_number.clone(),
                actual: existing.serial_number.clone(),
            });
        }

        if group.size() == 1 {
            // Single-member stack: no composite needed, nothing to restructure
            outcome.status = GroupStatus::Validated;
            outcome.devices_updated += 1;
            return Ok(());
        }

        let composite = self.store.create_composite_entity(NewCompositeEntity {
            name: group.identifier.clone(),
            domain: group.identifier.clone(),
            master_ref: None,
        })?;
        outcome.composite_created = true;

        for member in &group.members {
            let member_name = member_entity_name(&group.identifier, member.member_position);

            if member.member_position == master.member_position {
                // The bare entity becomes this member: rename + attach
                self.store.update_entity(
                    &existing.id,
                    EntityPatch {
                        name: Some(member_name),
                        composite_ref: Some(composite.id.clone()),
                        position: Some(member.member_position),
                        priority: member_priority(member.role_tag),
                    },
                )?;
                outcome.devices_updated += 1;
                continue;
            }

            match self.store.find_entity_by_name(&member_name)? {
                Some(entity) => {
                    self.store.update_entity(
                        &entity.id,
                        EntityPatch {
                            name: None,
                            composite_ref: Some(composite.id.clone()),
                            position: Some(member.member_position),
                            priority: member_priority(member.role_tag),
                        },
                    )?;
                    outcome.devices_updated += 1;
                }
                None => {
                    let Some(device_type) =
                        self.resolve_device_type(&member.model, &member_name, outcome)?
                    else {
                        continue;
                    };
                    self.store.create_member_entity(self.new_member(
                        &member_name,
                        member,
                        &device_type,
                        ctx,
                        Some(composite.id.clone()),
                    ))?;
                    outcome.devices_created += 1;
                }
            }
        }

        self.point_master_at_first_member(group, &composite.id)?;
        outcome.status = GroupStatus::Validated;
        Ok(())
    }

    // ------------------------------------------------------------------
    // State: nothing exists → create
    // ------------------------------------------------------------------

    fn create_group(
        &self,
        group: &DeviceGroup,
        master: &MemberRecord,
        ctx: &GroupContext,
        outcome: &mut ReconciliationOutcome,
    ) -> Result<()> {
        info!(group = %group.identifier, members = group.size(), "creating new group");

        if group.size() == 1 {
            let Some(device_type) =
                self.resolve_device_type(&master.model, &group.identifier, outcome)?
            else {
                outcome.status = GroupStatus::Skipped;
                return Ok(());
            };
            self.store.create_member_entity(self.new_member(
                &group.identifier,
                master,
                &device_type,
                ctx,
                None,
            ))?;
            outcome.devices_created += 1;
            outcome.status = GroupStatus::Created;
            return Ok(());
        }

        let composite = self.store.create_composite_entity(NewCompositeEntity {
            name: group.identifier.clone(),
            domain: group.identifier.clone(),
            master_ref: None,
        })?;
        outcome.composite_created = true;

        for member in &group.members {
            let member_name = member_entity_name(&group.identifier, member.member_position);
            let Some(device_type) =
                self.resolve_device_type(&member.model, &member_name, outcome)?
            else {
                continue;
            };
            self.store.create_member_entity(self.new_member(
                &member_name,
                member,
                &device_type,
                ctx,
                Some(composite.id.clone()),
            ))?;
            outcome.devices_created += 1;
        }

        self.point_master_at_first_member(group, &composite.id)?;
        outcome.status = if outcome.devices_created > 0 {
            GroupStatus::Created
        } else {
            GroupStatus::Skipped
        };
        Ok(())
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    /// The composite's master reference always ends up on the entity at
    /// the minimum stack position, whatever record was tagged master.
    fn point_master_at_first_member(&self, group: &DeviceGroup, composite_id: &str) -> Result<()> {
        let first_name = member_entity_name(&group.identifier, group.members[0].member_position);
        if let Some(first) = self.store.find_entity_by_name(&first_name)? {
            self.store.set_composite_master(composite_id, &first.id)?;
        }
        Ok(())
    }

    fn resolve_role(&self, role_class: RoleClass) -> Result<Option<RoleRecord>> {
        let name = role_class.as_str();
        if let Some(role) = self.store.find_role(name)? {
            return Ok(Some(role));
        }
        if self.config.create_missing {
            return Ok(Some(self.store.create_role(name)?));
        }
        Ok(None)
    }

    /// Resolve a device type through the candidate chain: raw model,
    /// uppercased, both prefixed with the manufacturer; exact matches
    /// first, then case-insensitive. Unresolved is member-fatal.
    fn resolve_device_type(
        &self,
        model: &str,
        entity_name: &str,
        outcome: &mut ReconciliationOutcome,
    ) -> Result<Option<DeviceTypeRecord>> {
        let model = model.trim();
        let upper = model.to_uppercase();
        let prefixed = format!("{} {}", self.config.manufacturer, model);
        let prefixed_upper = format!("{} {}", self.config.manufacturer, upper);
        let candidates = [
            model,
            upper.as_str(),
            prefixed.as_str(),
            prefixed_upper.as_str(),
        ];

        for candidate in candidates {
            if let Some(dt) = self.store.find_device_type(candidate)? {
                return Ok(Some(dt));
            }
        }

        for candidate in candidates {
            let hits = self.store.find_device_type_ci(candidate)?;
            if hits.len() > 1 {
                outcome.warnings.push(ImportIssue::AmbiguousMatch {
                    kind: "device type".to_string(),
                    query: candidate.to_string(),
                    count: hits.len(),
                });
            }
            if let Some(dt) = hits.into_iter().next() {
                return Ok(Some(dt));
            }
        }

        if self.config.create_missing {
            let dt = self
                .store
                .create_device_type(&prefixed_upper, &self.config.manufacturer)?;
            info!(model = %prefixed_upper, "created device type");
            return Ok(Some(dt));
        }

        warn!(entity = %entity_name, model = %model, "unresolved device type, member skipped");
        outcome.errors.push(ImportIssue::UnresolvedDeviceType {
            entity: entity_name.to_string(),
            model: model.to_string(),
        });
        outcome.devices_skipped += 1;
        Ok(None)
    }

    fn new_member(
        &self,
        name: &str,
        member: &MemberRecord,
        device_type: &DeviceTypeRecord,
        ctx: &GroupContext,
        composite_ref: Option<String>,
    ) -> NewMemberEntity {
        let position = composite_ref.is_some().then_some(member.member_position);
        let priority = if composite_ref.is_some() {
            member_priority(member.role_tag)
        } else {
            None
        };

        NewMemberEntity {
            name: name.to_string(),
            role_id: ctx.role.id.clone(),
            device_type_id: device_type.id.clone(),
            platform_id: ctx.platform.id.clone(),
            serial_number: member.serial_number.clone(),
            site_id: ctx.site.site.as_ref().map(|s| s.id.clone()),
            region_id: ctx.site.region.as_ref().map(|r| r.id.clone()),
            composite_ref,
            position,
            priority,
            comments: format!(
                "Software: {}\nMAC: {}\nLocation: {}",
                member.software_version, member.mac_address, member.location_text
            ),
        }
    }
}

/// Stack members live in the store as `{group}-{position}`; a lone device
/// keeps the bare group identifier.
pub fn member_entity_name(group_identifier: &str, position: u32) -> String {
    format!("{}-{}", group_identifier, position)
}

/// Routing-engine members (master/backup) get priority 1, linecards none.
fn member_priority(role_tag: RoleTag) -> Option<u32> {
    match role_tag {
        RoleTag::Master | RoleTag::Backup => Some(1),
        RoleTag::Linecard | RoleTag::Other => None,
    }
}

// ============================================================================
// TESTS
// ============================================================================
