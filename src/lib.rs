// StackSync - Network Device Inventory Reconciliation
// Exposes all modules for use in the CLI and tests

pub mod db;
pub mod identifier; // Device-name → role/facility inference
pub mod reconciliation; // Three-state group reconciliation engine
pub mod report; // Issue taxonomy + run summary
pub mod rows; // Monitoring CSV export parsing + grouping
pub mod sites; // Facility-code → site/region resolution
pub mod store; // Inventory store trait + in-memory impl

// Re-export commonly used types
pub use db::SqliteStore;
pub use identifier::{
    default_role_table, FacilityLookup, IdentifierParser, NoLookup, ParsedIdentifier,
    ParserStrategy, RoleClass,
};
pub use reconciliation::{
    GroupStatus, ImportConfig, MismatchRecord, ReconciliationEngine, ReconciliationOutcome,
};
pub use report::{ImportIssue, RunSummary, REPORT_CAP};
pub use rows::{
    parse_rows, rack_name_from_location, DeviceGroup, MemberRecord, ParsedRows, RoleTag,
    REQUIRED_COLUMNS,
};
pub use sites::{SiteMatch, SiteResolver};
pub use store::{
    CompositeEntity, DeviceTypeRecord, EntityPatch, InventoryStore, MemberEntity, MemoryStore,
    NewCompositeEntity, NewMemberEntity, PlatformRecord, Region, RoleRecord, Site, PLATFORM_NAME,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
