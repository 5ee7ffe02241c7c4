// 💾 SQLite Store - rusqlite-backed InventoryStore
//
// WAL mode for crash recovery; unique indexes on entity and composite
// names make create_member_entity / create_composite_entity atomic
// create-if-absent operations, so concurrent imports against the same
// identifier cannot double-create.

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::store::{
    CompositeEntity, DeviceTypeRecord, EntityPatch, InventoryStore, MemberEntity,
    NewCompositeEntity, NewMemberEntity, PlatformRecord, Region, RoleRecord, Site, PLATFORM_NAME,
};

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {:?}", db_path))?;
        let store = SqliteStore { conn };
        store.setup_schema()?;
        Ok(store)
    }

    /// In-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = SqliteStore { conn };
        store.setup_schema()?;
        Ok(store)
    }

    fn setup_schema(&self) -> Result<()> {
        // WAL for crash recovery
        self.conn.pragma_update(None, "journal_mode", "WAL")?;

        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS regions (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sites (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                facility TEXT NOT NULL,
                region_id TEXT REFERENCES regions(id)
            );

            CREATE TABLE IF NOT EXISTS roles (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL
            );

            CREATE TABLE IF NOT EXISTS device_types (
                id TEXT PRIMARY KEY,
                model TEXT UNIQUE NOT NULL,
                manufacturer TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS platforms (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL
            );

            CREATE TABLE IF NOT EXISTS composites (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                domain TEXT NOT NULL,
                master_ref TEXT
            );

            CREATE TABLE IF NOT EXISTS entities (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                role_id TEXT NOT NULL,
                device_type_id TEXT NOT NULL,
                platform_id TEXT NOT NULL,
                serial_number TEXT NOT NULL,
                site_id TEXT,
                region_id TEXT,
                composite_ref TEXT REFERENCES composites(id),
                position INTEGER,
                priority INTEGER,
                comments TEXT NOT NULL DEFAULT '',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_sites_facility ON sites(facility);
            CREATE INDEX IF NOT EXISTS idx_entities_composite ON entities(composite_ref);",
        )?;

        Ok(())
    }

    fn next_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    // ------------------------------------------------------------------
    // Bootstrap helpers (sites/regions/roles normally pre-exist)
    // ------------------------------------------------------------------

    pub fn insert_region(&self, name: &str) -> Result<Region> {
        let region = Region {
            id: Self::next_id(),
            name: name.to_string(),
        };
        self.conn.execute(
            "INSERT INTO regions (id, name) VALUES (?1, ?2)",
            params![region.id, region.name],
        )?;
        Ok(region)
    }

    pub fn insert_site(&self, name: &str, facility: &str, region: Option<&Region>) -> Result<Site> {
        let site = Site {
            id: Self::next_id(),
            name: name.to_string(),
            facility: facility.to_string(),
            region: region.cloned(),
        };
        self.conn.execute(
            "INSERT INTO sites (id, name, facility, region_id) VALUES (?1, ?2, ?3, ?4)",
            params![site.id, site.name, site.facility, region.map(|r| r.id.clone())],
        )?;
        Ok(site)
    }

    pub fn insert_role(&self, name: &str) -> Result<RoleRecord> {
        let role = RoleRecord {
            id: Self::next_id(),
            name: name.to_string(),
        };
        self.conn.execute(
            "INSERT INTO roles (id, name) VALUES (?1, ?2)",
            params![role.id, role.name],
        )?;
        Ok(role)
    }

    pub fn insert_device_type(&self, model: &str, manufacturer: &str) -> Result<DeviceTypeRecord> {
        let dt = DeviceTypeRecord {
            id: Self::next_id(),
            model: model.to_string(),
            manufacturer: manufacturer.to_string(),
        };
        self.conn.execute(
            "INSERT INTO device_types (id, model, manufacturer) VALUES (?1, ?2, ?3)",
            params![dt.id, dt.model, dt.manufacturer],
        )?;
        Ok(dt)
    }

    // ------------------------------------------------------------------
    // Row mapping
    // ------------------------------------------------------------------

    fn site_rows(&self, sql: &str, needle: &str) -> Result<Vec<Site>> {
        let mut stmt = self.conn.prepare(sql)?;
        let sites = stmt
            .query_map(params![needle], |row| {
                let region = match (
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ) {
                    (Some(id), Some(name)) => Some(Region { id, name }),
                    _ => None,
                };
                Ok(Site {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    facility: row.get(2)?,
                    region,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sites)
    }

    fn entity_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemberEntity> {
        Ok(MemberEntity {
            id: row.get(0)?,
            name: row.get(1)?,
            role_id: row.get(2)?,
            device_type_id: row.get(3)?,
            platform_id: row.get(4)?,
            serial_number: row.get(5)?,
            site_id: row.get(6)?,
            region_id: row.get(7)?,
            composite_ref: row.get(8)?,
            position: row.get::<_, Option<i64>>(9)?.map(|v| v as u32),
            priority: row.get::<_, Option<i64>>(10)?.map(|v| v as u32),
            comments: row.get(11)?,
        })
    }

    const ENTITY_COLUMNS: &'static str = "id, name, role_id, device_type_id, platform_id, \
         serial_number, site_id, region_id, composite_ref, position, priority, comments";
}

impl InventoryStore for SqliteStore {
    fn find_entity_by_name(&self, name: &str) -> Result<Option<MemberEntity>> {
        let sql = format!(
            "SELECT {} FROM entities WHERE name = ?1",
            Self::ENTITY_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![name], Self::entity_from_row)
            .optional()?)
    }

    fn find_composite(&self, name: &str) -> Result<Option<CompositeEntity>> {
        // By composite name first, then by the master entity's name
        let by_name = self
            .conn
            .query_row(
                "SELECT id, name, domain, master_ref FROM composites WHERE name = ?1",
                params![name],
                |row| {
                    Ok(CompositeEntity {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        domain: row.get(2)?,
                        master_ref: row.get(3)?,
                    })
                },
            )
            .optional()?;
        if by_name.is_some() {
            return Ok(by_name);
        }

        Ok(self
            .conn
            .query_row(
                "SELECT c.id, c.name, c.domain, c.master_ref
                 FROM composites c JOIN entities e ON e.id = c.master_ref
                 WHERE e.name = ?1",
                params![name],
                |row| {
                    Ok(CompositeEntity {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        domain: row.get(2)?,
                        master_ref: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    fn composite_members(&self, composite_id: &str) -> Result<Vec<MemberEntity>> {
        let sql = format!(
            "SELECT {} FROM entities WHERE composite_ref = ?1 ORDER BY position",
            Self::ENTITY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let members = stmt
            .query_map(params![composite_id], Self::entity_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(members)
    }

    fn find_sites(&self, facility: &str) -> Result<Vec<Site>> {
        self.site_rows(
            "SELECT s.id, s.name, s.facility, r.id, r.name
             FROM sites s LEFT JOIN regions r ON r.id = s.region_id
             WHERE s.facility = ?1 ORDER BY s.name",
            facility,
        )
    }

    fn find_sites_ci(&self, facility: &str) -> Result<Vec<Site>> {
        self.site_rows(
            "SELECT s.id, s.name, s.facility, r.id, r.name
             FROM sites s LEFT JOIN regions r ON r.id = s.region_id
             WHERE LOWER(s.facility) = LOWER(?1) ORDER BY s.name",
            facility,
        )
    }

    fn find_role(&self, name: &str) -> Result<Option<RoleRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name FROM roles WHERE name = ?1",
                params![name],
                |row| {
                    Ok(RoleRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?)
    }

    fn create_role(&self, name: &str) -> Result<RoleRecord> {
        self.insert_role(name)
    }

    fn find_device_type(&self, model: &str) -> Result<Option<DeviceTypeRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, model, manufacturer FROM device_types WHERE model = ?1",
                params![model],
                |row| {
                    Ok(DeviceTypeRecord {
                        id: row.get(0)?,
                        model: row.get(1)?,
                        manufacturer: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    fn find_device_type_ci(&self, model: &str) -> Result<Vec<DeviceTypeRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, model, manufacturer FROM device_types
             WHERE LOWER(model) = LOWER(?1) ORDER BY model",
        )?;
        let hits = stmt
            .query_map(params![model], |row| {
                Ok(DeviceTypeRecord {
                    id: row.get(0)?,
                    model: row.get(1)?,
                    manufacturer: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    fn create_device_type(&self, model: &str, manufacturer: &str) -> Result<DeviceTypeRecord> {
        self.insert_device_type(model, manufacturer)
    }

    fn find_or_create_platform(&self) -> Result<PlatformRecord> {
        let existing = self
            .conn
            .query_row(
                "SELECT id, name FROM platforms WHERE name = ?1",
                params![PLATFORM_NAME],
                |row| {
                    Ok(PlatformRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        if let Some(platform) = existing {
            return Ok(platform);
        }

        let platform = PlatformRecord {
            id: Self::next_id(),
            name: PLATFORM_NAME.to_string(),
        };
        self.conn.execute(
            "INSERT INTO platforms (id, name) VALUES (?1, ?2)",
            params![platform.id, platform.name],
        )?;
        Ok(platform)
    }

    fn create_member_entity(&self, new: NewMemberEntity) -> Result<MemberEntity> {
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

        let result = self.conn.execute(
            "INSERT INTO entities (
                id, name, role_id, device_type_id, platform_id, serial_number,
                site_id, region_id, composite_ref, position, priority, comments
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                entity.id,
                entity.name,
                entity.role_id,
                entity.device_type_id,
                entity.platform_id,
                entity.serial_number,
                entity.site_id,
                entity.region_id,
                entity.composite_ref,
                entity.position.map(|v| v as i64),
                entity.priority.map(|v| v as i64),
                entity.comments,
            ],
        );

        match result {
            Ok(_) => Ok(entity),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                bail!("entity '{}' already exists", entity.name)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn create_composite_entity(&self, new: NewCompositeEntity) -> Result<CompositeEntity> {
        let vc = CompositeEntity {
            id: Self::next_id(),
            name: new.name,
            domain: new.domain,
            master_ref: new.master_ref,
        };

        let result = self.conn.execute(
            "INSERT INTO composites (id, name, domain, master_ref) VALUES (?1, ?2, ?3, ?4)",
            params![vc.id, vc.name, vc.domain, vc.master_ref],
        );

        match result {
            Ok(_) => Ok(vc),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                bail!("composite '{}' already exists", vc.name)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn update_entity(&self, entity_id: &str, patch: EntityPatch) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE entities SET
                name = COALESCE(?2, name),
                composite_ref = COALESCE(?3, composite_ref),
                position = COALESCE(?4, position),
                priority = COALESCE(?5, priority)
             WHERE id = ?1",
            params![
                entity_id,
                patch.name,
                patch.composite_ref,
                patch.position.map(|v| v as i64),
                patch.priority.map(|v| v as i64),
            ],
        )?;
        if changed == 0 {
            bail!("no entity with id '{}'", entity_id);
        }
        Ok(())
    }

    fn set_composite_master(&self, composite_id: &str, entity_id: &str) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE composites SET master_ref = ?2 WHERE id = ?1",
            params![composite_id, entity_id],
        )?;
        if changed == 0 {
            bail!("no composite with id '{}'", composite_id);
        }
        Ok(())
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
            position: Some(0),
            priority: Some(1),
            comments: "Software: 21.4R3".to_string(),
        }
    }

    #[test]
    fn test_open_on_disk_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.create_member_entity(new_entity("accs-ho-414-1")).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.find_entity_by_name("accs-ho-414-1").unwrap().is_some());
    }

    #[test]
    fn test_entity_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let created = store.create_member_entity(new_entity("accs-ho-414-1")).unwrap();

        let found = store.find_entity_by_name("accs-ho-414-1").unwrap().unwrap();
        assert_eq!(found, created);
        assert_eq!(found.position, Some(0));
        assert_eq!(found.priority, Some(1));
        assert!(store.find_entity_by_name("nope").unwrap().is_none());
    }

    #[test]
    fn test_unique_name_is_atomic_create_if_absent() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_member_entity(new_entity("accs-ho-414-1")).unwrap();
        assert!(store.create_member_entity(new_entity("accs-ho-414-1")).is_err());
    }

    #[test]
    fn test_site_lookup_with_region() {
        let store = SqliteStore::open_in_memory().unwrap();
        let region = store.insert_region("Campus East").unwrap();
        store
            .insert_site("Arlington Tower", "ARL-ART", Some(&region))
            .unwrap();
        store.insert_site("Hoover Hall", "HO", None).unwrap();

        let hits = store.find_sites("ARL-ART").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].region.as_ref().unwrap().name, "Campus East");

        assert!(store.find_sites("arl-art").unwrap().is_empty());
        assert_eq!(store.find_sites_ci("arl-art").unwrap().len(), 1);
        assert!(store.find_sites_ci("HO").unwrap()[0].region.is_none());
    }

    #[test]
    fn test_composite_lookup_by_name_and_master() {
        let store = SqliteStore::open_in_memory().unwrap();
        let master = store.create_member_entity(new_entity("stack-0")).unwrap();
        let vc = store
            .create_composite_entity(NewCompositeEntity {
                name: "stack".to_string(),
                domain: "stack".to_string(),
                master_ref: Some(master.id.clone()),
            })
            .unwrap();

        assert_eq!(store.find_composite("stack").unwrap().unwrap().id, vc.id);
        assert_eq!(store.find_composite("stack-0").unwrap().unwrap().id, vc.id);
        assert!(store.find_composite("other").unwrap().is_none());
    }

    #[test]
    fn test_composite_members_ordered_by_position() {
        let store = SqliteStore::open_in_memory().unwrap();
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
    fn test_update_entity_patches_only_given_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        let entity = store.create_member_entity(new_entity("stack")).unwrap();

        store
            .update_entity(
                &entity.id,
                EntityPatch {
                    name: Some("stack-0".to_string()),
                    composite_ref: Some("vc-1".to_string()),
                    position: Some(0),
                    priority: None,
                },
            )
            .unwrap();

        let updated = store.find_entity_by_name("stack-0").unwrap().unwrap();
        assert_eq!(updated.composite_ref.as_deref(), Some("vc-1"));
        // Untouched fields keep their values
        assert_eq!(updated.priority, Some(1));
        assert_eq!(updated.serial_number, "PE0001");
    }

    #[test]
    fn test_roles_device_types_platform() {
        let store = SqliteStore::open_in_memory().unwrap();

        assert!(store.find_role("Access").unwrap().is_none());
        store.create_role("Access").unwrap();
        assert!(store.find_role("Access").unwrap().is_some());

        store.create_device_type("Juniper EX4300-48P", "Juniper").unwrap();
        assert!(store.find_device_type("Juniper EX4300-48P").unwrap().is_some());
        assert_eq!(store.find_device_type_ci("juniper ex4300-48p").unwrap().len(), 1);

        let p1 = store.find_or_create_platform().unwrap();
        let p2 = store.find_or_create_platform().unwrap();
        assert_eq!(p1, p2);
    }
}
