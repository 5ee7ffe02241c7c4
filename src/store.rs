// 🗂️ Inventory Store - Record types + the narrow store interface
//
// The reconciliation engine only ever talks to `InventoryStore`, so it can
// run against the SQLite backend (db.rs) or the in-memory store below.
// Entities are created if absent and structurally re-linked when attaching
// to a composite; serial/model/software of existing entities are never
// mutated here - drift there is reported, not corrected.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Fixed platform for every imported device.
pub const PLATFORM_NAME: &str = "Juniper_junos";

// ============================================================================
// STORE RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub name: String,
    /// Short facility code matched against parsed device names.
    pub facility: String,
    pub region: Option<Region>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceTypeRecord {
    pub id: String,
    pub model: String,
    pub manufacturer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformRecord {
    pub id: String,
    pub name: String,
}

/// A device record. Owned by the store; the engine reads and upserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberEntity {
    pub id: String,
    pub name: String,
    pub role_id: String,
    pub device_type_id: String,
    pub platform_id: String,
    pub serial_number: String,
    pub site_id: Option<String>,
    pub region_id: Option<String>,
    /// Back-reference to the composite this member belongs to.
    pub composite_ref: Option<String>,
    pub position: Option<u32>,
    pub priority: Option<u32>,
    pub comments: String,
}

/// A virtual-chassis grouping of member entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeEntity {
    pub id: String,
    pub name: String,
    pub domain: String,
    /// Entity id of the designated master member.
    pub master_ref: Option<String>,
}

/// Fields for a new member entity. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewMemberEntity {
    pub name: String,
    pub role_id: String,
    pub device_type_id: String,
    pub platform_id: String,
    pub serial_number: String,
    pub site_id: Option<String>,
    pub region_id: Option<String>,
    pub composite_ref: Option<String>,
    pub position: Option<u32>,
    pub priority: Option<u32>,
    pub comments: String,
}

#[derive(Debug, Clone)]
pub struct NewCompositeEntity {
    pub name: String,
    pub domain: String,
    pub master_ref: Option<String>,
}

/// Structural-linkage update for an existing entity. `None` leaves the
/// field unchanged. Deliberately has no serial/model fields.
#[derive(Debug, Clone, Default)]
pub struct EntityPatch {
    pub name: Option<String>,
    pub composite_ref: Option<String>,
    pub position: Option<u32>,
    pub priority: Option<u32>,
}

// ============================================================================
// STORE INTERFACE
// ============================================================================

/// The operations the reconciliation engine needs, nothing more.
pub trait InventoryStore {
    fn find_entity_by_name(&self, name: &str) -> Result<Option<MemberEntity>>;

    /// Find a composite by its own name, falling back to its master's
    /// name. The by-name match is what keeps repeated imports idempotent
    /// once members have been renamed to `{group}-{position}`.
    fn find_composite(&self, name: &str) -> Result<Option<CompositeEntity>>;

    /// Members attached to a composite, ordered by position.
    fn composite_members(&self, composite_id: &str) -> Result<Vec<MemberEntity>>;

    /// Exact facility-code match, stable name order.
    fn find_sites(&self, facility: &str) -> Result<Vec<Site>>;

    /// Case-insensitive facility-code match, stable name order.
    fn find_sites_ci(&self, facility: &str) -> Result<Vec<Site>>;

    fn find_role(&self, name: &str) -> Result<Option<RoleRecord>>;
    fn create_role(&self, name: &str) -> Result<RoleRecord>;

    fn find_device_type(&self, model: &str) -> Result<Option<DeviceTypeRecord>>;
    fn find_device_type_ci(&self, model: &str) -> Result<Vec<DeviceTypeRecord>>;
    fn create_device_type(&self, model: &str, manufacturer: &str) -> Result<DeviceTypeRecord>;

    fn find_or_create_platform(&self) -> Result<PlatformRecord>;

    /// Atomic create-if-absent: fails when the name is already taken.
    fn create_member_entity(&self, new: NewMemberEntity) -> Result<MemberEntity>;
    fn create_composite_entity(&self, new: NewCompositeEntity) -> Result<CompositeEntity>;

    fn update_entity(&self, entity_id: &str, patch: EntityPatch) -> Result<()>;
    fn set_composite_master(&self, composite_id: &str, entity_id: &str) -> Result<()>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Debug, Default)]
struct MemoryInner {
    sites: Vec<Site>,
    roles: Vec<RoleRecord>,
    device_types: Vec<DeviceTypeRecord>,
    platforms: Vec<PlatformRecord>,
    entities: HashMap<String, MemberEntity>,
    composites: HashMap<String, CompositeEntity>,
}

/// In-memory `InventoryStore`. Used by the engine tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn next_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    // ------------------------------------------------------------------
    // Seeding helpers (the authoritative records normally pre-exist)
    // ------------------------------------------------------------------

    pub fn add_region(&self, name: &str) -> Region {
        Region {
            id: Self::next_id(),
            name: name.to_string(),
        }
    }

    pub fn add_site(&self, name: &str, facility: &str, region: Option<Region>) -> Site {
        let site = Site {
            id: Self::next_id(),
            name: name.to_string(),
            facility: facility.to_string(),
            region,
        };
        self.inner.write().unwrap().sites.push(site.clone());
        site
    }

    pub fn add_role(&self, name: &str) -> RoleRecord {
        let role = RoleRecord {
            id: Self::next_id(),
            name: name.to_string(),
        };
        self.inner.write().unwrap().roles.push(role.clone());
        role
    }

    pub fn add_device_type(&self, model: &str, manufacturer: &str) -> DeviceTypeRecord {
        let dt = DeviceTypeRecord {
            id: Self::next_id(),
            model: model.to_string(),
            manufacturer: manufacturer.to_string(),
        };
        self.inner.write().unwrap().device_types.push(dt.clone());
        dt
    }

    /// Direct entity access for test assertions.
    pub fn entity_by_name(&self, name: &str) -> Option<MemberEntity> {
        self.inner
            .read()
            .unwrap()
            .entities
            .values()
            .find(|e| e.name == name)
            .cloned()
    }

    pub fn entity_count(&self) -> usize {
        self.inner.read().unwrap().entities.len()
    }

    pub fn composite_count(&self) -> usize {
        self.inner.read().unwrap().composites.len()
    }
}

impl InventoryStore for MemoryStore {
    fn find_entity_by_name(&self, name: &str) -> Result<Option<MemberEntity>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .entities
            .values()
            .find(|e| e.name == name)
            .cloned())
    }

    fn find_composite(&self, name: &str) -> Result<Option<CompositeEntity>> {
        let inner = self.inner.read().unwrap();

        if let Some(vc) = inner.composites.values().find(|c| c.name == name) {
            return Ok(Some(vc.clone()));
        }

        // Fallback: composite whose master entity carries this name
        for vc in inner.composites.values() {
            if let Some(master_id) = &vc.master_ref {
                if inner
                    .entities
                    .get(master_id)
                    .is_some_and(|e| e.name == name)
                {
                    return Ok(Some(vc.clone()));
                }
            }
        }

        Ok(None)
    }

    fn composite_members(&self, composite_id: &str) -> Result<Vec<MemberEntity>> {
        let inner = self.inner.read().unwrap();
        let mut members: Vec<MemberEntity> = inner
            .entities
            .values()
            .filter(|e| e.composite_ref.as_deref() == Some(composite_id))
            .cloned()
            .collect();
        members.sort_by_key(|m| m.position);
        Ok(members)
    }

    fn find_sites(&self, facility: &str) -> Result<Vec<Site>> {
        let inner = self.inner.read().unwrap();
        let mut sites: Vec<Site> = inner
            .sites
            .iter()
            .filter(|s| s.facility == facility)
            .cloned()
            .collect();
        sites.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sites)
    }

    fn find_sites_ci(&self, facility: &str) -> Result<Vec<Site>> {
        let needle = facility.to_lowercase();
        let inner = self.inner.read().unwrap();
        let mut sites: Vec<Site> = inner
            .sites
            .iter()
            .filter(|s| s.facility.to_lowercase() == needle)
            .cloned()
            .collect();
        sites.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sites)
    }

    fn find_role(&self, name: &str) -> Result<Option<RoleRecord>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .roles
            .iter()
            .find(|r| r.name == name)
            .cloned())
    }

    fn create_role(&self, name: &str) -> Result<RoleRecord> {
        Ok(self.add_role(name))
    }

    fn find_device_type(&self, model: &str) -> Result<Option<DeviceTypeRecord>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .device_types
            .iter()
            .find(|d| d.model == model)
            .cloned())
    }

    fn find_device_type_ci(&self, model: &str) -> Result<Vec<DeviceTypeRecord>> {
        let needle = model.to_lowercase();
        let inner = self.inner.read().unwrap();
        let mut hits: Vec<DeviceTypeRecord> = inner
            .device_types
            .iter()
            .filter(|d| d.model.to_lowercase() == needle)
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.model.cmp(&b.model));
        Ok(hits)
    }

    fn create_device_type(&self, model: &str, manufacturer: &str) -> Result<DeviceTypeRecord> {
        Ok(self.add_device_type(model, manufacturer))
    }

    fn find_or_create_platform(&self) -> Result<PlatformRecord> {
        let mut inner = self.inner.write().unwrap();
        if let Some(p) = inner.platforms.iter().find(|p| p.name == PLATFORM_NAME) {
            return Ok(p.clone());
        }
        let platform = PlatformRecord {
            id: Self::next_id(),
            name: PLATFORM_NAME.to_string(),
        };
        inner.platforms.push(platform.clone());
        Ok(platform)
    }

    fn create_member_entity(&self, new: NewMemberEntity) -> Result<MemberEntity> {
        let mut inner = self.inner.write().unwrap();
        if inner.entities.values().any(|e| e.name == new.name) {
            bail!("entity '{}' already exists", new.name);
        }
        let entity = MemberEntity {
            id: Self::next_id(),
            name: new.name,
            role_id: new.role_id,
            device_type_id: new.device_type_id,
            platform_id: new.platform_id,
            serial_number: new.serial_number,
            site_id: new.site_id,
            region_id: new.region_id,
            composite_ref: new.composite_ref,
            position: new.position,
            priority: new.priority,
            comments: new.comments,
        };
        inner.entities.insert(entity.id.clone(), entity.clone());
        Ok(entity)
    }

    fn create_composite_entity(&self, new: NewCompositeEntity) -> Result<CompositeEntity> {
        let mut inner = self.inner.write().unwrap();
        if inner.composites.values().any(|c| c.name == new.name) {
            bail!("composite '{}' already exists", new.name);
        }
        let vc = CompositeEntity {
            id: Self::next_id(),
            name: new.name,
            domain: new.domain,
            master_ref: new.master_ref,
        };
        inner.composites.insert(vc.id.clone(), vc.clone());
        Ok(vc)
    }

    fn update_entity(&self, entity_id: &str, patch: EntityPatch) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let entity = match inner.entities.get_mut(entity_id) {
            Some(e) => e,
            None => bail!("no entity with id '{}'", entity_id),
        };
        if let Some(name) = patch.name {
            entity.name = name;
        }
        if let Some(composite_ref) = patch.composite_ref {
            entity.composite_ref = Some(composite_ref);
        }
        if let Some(position) = patch.position {
            entity.position = Some(position);
        }
        if let Some(priority) = patch.priority {
            entity.priority = Some(priority);
        }
        Ok(())
    }

    fn set_composite_master(&self, composite_id: &str, entity_id: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        match inner.composites.get_mut(composite_id) {
            Some(vc) => {
                vc.master_ref = Some(entity_id.to_string());
                Ok(())
            }
            None => bail!("no composite with id '{}'", composite_id),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn new_entity(name: &str) -> NewMemberEntity {
        NewMemberEntity {
            name: name.to_string(),
            role_id: "role".to_string(),
            device_type_id: "dt".to_string(),
            platform_id: "plat".to_string(),
            serial_number: "PE0001".to_string(),
            site_id: None,
            region_id: None,
            composite_ref: None,
            position: None,
            priority: None,
            comments: String::new(),
        }
    }

    #[test]
    fn test_create_member_entity_is_create_if_absent() {
        let store = MemoryStore::new();
        store.create_member_entity(new_entity("accs-ho-414-1")).unwrap();

        // Second create under the same name must fail, not overwrite
        assert!(store.create_member_entity(new_entity("accs-ho-414-1")).is_err());
        assert_eq!(store.entity_count(), 1);
    }

    #[test]
    fn test_find_composite_by_name_and_by_master() {
        let store = MemoryStore::new();
        let master = store
            .create_member_entity(new_entity("accs-ho-414-1-0"))
            .unwrap();
        let vc = store
            .create_composite_entity(NewCompositeEntity {
                name: "accs-ho-414-1".to_string(),
                domain: "accs-ho-414-1".to_string(),
                master_ref: Some(master.id.clone()),
            })
            .unwrap();

        // By composite name
        assert_eq!(store.find_composite("accs-ho-414-1").unwrap().unwrap().id, vc.id);
        // By master entity name
        assert_eq!(
            store.find_composite("accs-ho-414-1-0").unwrap().unwrap().id,
            vc.id
        );
        assert!(store.find_composite("dist-ho-414-1").unwrap().is_none());
    }

    #[test]
    fn test_composite_members_sorted_by_position() {
        let store = MemoryStore::new();
        let vc = store
            .create_composite_entity(NewCompositeEntity {
                name: "stack".to_string(),
                domain: "stack".to_string(),
                master_ref: None,
            })
            .unwrap();

        for pos in [2u32, 0, 1] {
            let mut e = new_entity(&format!("stack-{}", pos));
            e.composite_ref = Some(vc.id.clone());
            e.position = Some(pos);
            store.create_member_entity(e).unwrap();
        }

        let members = store.composite_members(&vc.id).unwrap();
        let positions: Vec<Option<u32>> = members.iter().map(|m| m.position).collect();
        assert_eq!(positions, vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn test_site_lookup_exact_and_case_insensitive() {
        let store = MemoryStore::new();
        let region = store.add_region("Campus East");
        store.add_site("Arlington Tower", "ARL-ART", Some(region));

        assert_eq!(store.find_sites("ARL-ART").unwrap().len(), 1);
        assert!(store.find_sites("arl-art").unwrap().is_empty());
        assert_eq!(store.find_sites_ci("arl-art").unwrap().len(), 1);
    }

    #[test]
    fn test_update_entity_patches_structural_fields_only() {
        let store = MemoryStore::new();
        let entity = store.create_member_entity(new_entity("accs-ho-414-1")).unwrap();

        store
            .update_entity(
                &entity.id,
                EntityPatch {
                    name: Some("accs-ho-414-1-0".to_string()),
                    composite_ref: Some("vc-id".to_string()),
                    position: Some(0),
                    priority: Some(1),
                },
            )
            .unwrap();

        let updated = store.entity_by_name("accs-ho-414-1-0").unwrap();
        assert_eq!(updated.composite_ref.as_deref(), Some("vc-id"));
        assert_eq!(updated.position, Some(0));
        assert_eq!(updated.priority, Some(1));
        // Serial untouched by structural patches
        assert_eq!(updated.serial_number, "PE0001");
    }
}
