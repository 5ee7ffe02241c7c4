// 📍 Site Resolver - Facility code → site/region record
//
// Exact match first, then case-insensitive. Multiple hits pick the first
// under stable name order and flag the ambiguity; no hit is not an error,
// the device just goes in siteless.

use anyhow::Result;

use crate::identifier::FacilityLookup;
use crate::store::{InventoryStore, Region, Site};

/// Outcome of a facility-code lookup.
#[derive(Debug, Clone, Default)]
pub struct SiteMatch {
    pub site: Option<Site>,
    pub region: Option<Region>,
    /// More than one site carried the facility code; the first was taken.
    pub ambiguous: bool,
    /// How many sites matched.
    pub matches: usize,
}

impl SiteMatch {
    pub fn is_resolved(&self) -> bool {
        self.site.is_some()
    }
}

pub struct SiteResolver<'a, S: InventoryStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: InventoryStore + ?Sized> SiteResolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        SiteResolver { store }
    }

    /// Resolve a facility code to (site, region). Never fails the group:
    /// no match returns an empty `SiteMatch`.
    pub fn resolve(&self, facility_code: Option<&str>) -> Result<SiteMatch> {
        let code = match facility_code {
            Some(c) if !c.is_empty() => c,
            _ => return Ok(SiteMatch::default()),
        };

        let mut hits = self.store.find_sites(code)?;
        if hits.is_empty() {
            hits = self.store.find_sites_ci(code)?;
        }

        let matches = hits.len();
        match hits.into_iter().next() {
            Some(site) => {
                let region = site.region.clone();
                Ok(SiteMatch {
                    site: Some(site),
                    region,
                    ambiguous: matches > 1,
                    matches,
                })
            }
            None => Ok(SiteMatch::default()),
        }
    }
}

impl<S: InventoryStore + ?Sized> FacilityLookup for SiteResolver<'_, S> {
    /// A facility is "known" when any site resolves to it. Store errors
    /// surface later in the actual resolve; here they read as unknown.
    fn knows_facility(&self, code: &str) -> bool {
        self.store
            .find_sites(code)
            .map(|s| !s.is_empty())
            .unwrap_or(false)
            || self
                .store
                .find_sites_ci(code)
                .map(|s| !s.is_empty())
                .unwrap_or(false)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_exact_match_wins() {
        let store = MemoryStore::new();
        let region = store.add_region("Campus East");
        store.add_site("Arlington Tower", "ARL-ART", Some(region));

        let resolver = SiteResolver::new(&store);
        let matched = resolver.resolve(Some("ARL-ART")).unwrap();

        assert!(matched.is_resolved());
        assert!(!matched.ambiguous);
        assert_eq!(matched.site.unwrap().name, "Arlington Tower");
        assert_eq!(matched.region.unwrap().name, "Campus East");
    }

    #[test]
    fn test_case_insensitive_fallback() {
        let store = MemoryStore::new();
        store.add_site("Hoover Hall", "HO", None);

        let resolver = SiteResolver::new(&store);
        let matched = resolver.resolve(Some("ho")).unwrap();

        assert!(matched.is_resolved());
        assert!(matched.region.is_none());
    }

    #[test]
    fn test_ambiguous_picks_first_by_name() {
        let store = MemoryStore::new();
        store.add_site("West Annex", "HO", None);
        store.add_site("East Annex", "HO", None);

        let resolver = SiteResolver::new(&store);
        let matched = resolver.resolve(Some("HO")).unwrap();

        assert!(matched.ambiguous);
        // Stable ordering: alphabetical by site name
        assert_eq!(matched.site.unwrap().name, "East Annex");
    }

    #[test]
    fn test_no_match_is_not_an_error() {
        let store = MemoryStore::new();
        let resolver = SiteResolver::new(&store);

        let matched = resolver.resolve(Some("ZZZ")).unwrap();
        assert!(!matched.is_resolved());
        assert!(matched.region.is_none());

        let absent = resolver.resolve(None).unwrap();
        assert!(!absent.is_resolved());
    }

    #[test]
    fn test_knows_facility() {
        let store = MemoryStore::new();
        store.add_site("Hoover Hall", "HO", None);

        let resolver = SiteResolver::new(&store);
        assert!(resolver.knows_facility("HO"));
        assert!(resolver.knows_facility("ho"));
        assert!(!resolver.knows_facility("ART"));
    }
}
