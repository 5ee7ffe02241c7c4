// 🔤 Identifier Parser - Device naming convention → role class + facility code
//
// Device names encode role and site: `accs-arl-art-1550-1` is an Access
// switch at facility ARL-ART. Two parsing strategies coexist because the
// naming scheme is ambiguous for some sites; both are kept and selected
// by configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Token separator in device names.
const DELIMITER: char = '-';

// ============================================================================
// ROLE CLASS
// ============================================================================

/// Network role inferred from the first name token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleClass {
    Access,
    Distribution,
    Core,
    Edge,
    Aggregation,
}

impl RoleClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleClass::Access => "Access",
            RoleClass::Distribution => "Distribution",
            RoleClass::Core => "Core",
            RoleClass::Edge => "Edge",
            RoleClass::Aggregation => "Aggregation",
        }
    }
}

/// The fixed role-token table. Unknown tokens default to Access.
pub fn default_role_table() -> HashMap<String, RoleClass> {
    let mut table = HashMap::new();
    table.insert("accs".to_string(), RoleClass::Access);
    table.insert("dist".to_string(), RoleClass::Distribution);
    table.insert("core".to_string(), RoleClass::Core);
    table.insert("edge".to_string(), RoleClass::Edge);
    table.insert("aggr".to_string(), RoleClass::Aggregation);
    table
}

// ============================================================================
// PARSED IDENTIFIER
// ============================================================================

/// Semantic components of a device name. Derived per group, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedIdentifier {
    pub role_class: RoleClass,
    /// Absent is expected for some naming schemes, not an error.
    pub facility_code: Option<String>,
}

// ============================================================================
// STRATEGIES
// ============================================================================

/// Facility-code extraction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParserStrategy {
    /// Walk tokens after the role token, accumulating until one starts
    /// with a digit; join the run uppercased.
    Structural,
    /// Test each token individually against the site resolver and take
    /// the first token it recognizes as a facility.
    LookupConfirmed,
}

/// Lookup capability the LookupConfirmed strategy needs.
/// Implemented by the site resolver; tests use a set-backed fake.
pub trait FacilityLookup {
    fn knows_facility(&self, code: &str) -> bool;
}

/// No-op lookup for contexts where only the structural strategy runs.
pub struct NoLookup;

impl FacilityLookup for NoLookup {
    fn knows_facility(&self, _code: &str) -> bool {
        false
    }
}

// ============================================================================
// IDENTIFIER PARSER
// ============================================================================

pub struct IdentifierParser {
    strategy: ParserStrategy,
    role_table: HashMap<String, RoleClass>,
}

impl IdentifierParser {
    pub fn new(strategy: ParserStrategy) -> Self {
        IdentifierParser {
            strategy,
            role_table: default_role_table(),
        }
    }

    /// Inject a custom role table (tests, alternate naming schemes).
    pub fn with_role_table(mut self, table: HashMap<String, RoleClass>) -> Self {
        self.role_table = table;
        self
    }

    pub fn strategy(&self) -> ParserStrategy {
        self.strategy
    }

    /// Classify the role from the first token. Unknown → Access.
    pub fn role_class(&self, identifier: &str) -> RoleClass {
        let first = identifier
            .split(DELIMITER)
            .next()
            .unwrap_or("")
            .to_lowercase();
        self.role_table
            .get(&first)
            .copied()
            .unwrap_or(RoleClass::Access)
    }

    /// Parse a device identifier into role class and facility code.
    pub fn parse(&self, identifier: &str, lookup: &dyn FacilityLookup) -> ParsedIdentifier {
        let facility_code = match self.strategy {
            ParserStrategy::Structural => structural_facility(identifier),
            ParserStrategy::LookupConfirmed => lookup_facility(identifier, lookup),
        };

        ParsedIdentifier {
            role_class: self.role_class(identifier),
            facility_code,
        }
    }
}

/// Structural mode: `accs-arl-art-1550-1` → `ARL-ART`, `accs-ho-414-1` → `HO`.
fn structural_facility(identifier: &str) -> Option<String> {
    let tokens: Vec<&str> = identifier.split(DELIMITER).collect();
    if tokens.len() < 3 {
        return None;
    }

    let mut run = Vec::new();
    for token in &tokens[1..] {
        if token.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            break;
        }
        run.push(*token);
    }

    if run.is_empty() {
        None
    } else {
        Some(run.join("-").to_uppercase())
    }
}

/// Lookup-confirmed mode: the first token (after the role token) that the
/// resolver recognizes wins; a digit-leading token before any match stops
/// the walk.
fn lookup_facility(identifier: &str, lookup: &dyn FacilityLookup) -> Option<String> {
    let tokens: Vec<&str> = identifier.split(DELIMITER).collect();

    for token in tokens.iter().skip(1) {
        if token.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            return None;
        }
        let candidate = token.to_uppercase();
        if lookup.knows_facility(&candidate) {
            return Some(candidate);
        }
    }

    None
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct SetLookup(HashSet<String>);

    impl SetLookup {
        fn of(codes: &[&str]) -> Self {
            SetLookup(codes.iter().map(|c| c.to_string()).collect())
        }
    }

    impl FacilityLookup for SetLookup {
        fn knows_facility(&self, code: &str) -> bool {
            self.0.contains(code)
        }
    }

    #[test]
    fn test_structural_multi_token_facility() {
        let parser = IdentifierParser::new(ParserStrategy::Structural);
        let parsed = parser.parse("accs-arl-art-1550-1", &NoLookup);

        assert_eq!(parsed.role_class, RoleClass::Access);
        assert_eq!(parsed.facility_code.as_deref(), Some("ARL-ART"));
    }

    #[test]
    fn test_structural_single_token_facility() {
        let parser = IdentifierParser::new(ParserStrategy::Structural);
        let parsed = parser.parse("accs-ho-414-1", &NoLookup);
        assert_eq!(parsed.facility_code.as_deref(), Some("HO"));
    }

    #[test]
    fn test_structural_too_few_tokens() {
        let parser = IdentifierParser::new(ParserStrategy::Structural);
        assert_eq!(parser.parse("accs-ho", &NoLookup).facility_code, None);
        assert_eq!(parser.parse("switch", &NoLookup).facility_code, None);
    }

    #[test]
    fn test_structural_digit_right_after_role_token() {
        let parser = IdentifierParser::new(ParserStrategy::Structural);
        // No facility run before the numeric token: absent, not an error
        assert_eq!(parser.parse("accs-414-1", &NoLookup).facility_code, None);
    }

    #[test]
    fn test_role_classification_table() {
        let parser = IdentifierParser::new(ParserStrategy::Structural);
        assert_eq!(parser.role_class("dist-ho-414-1"), RoleClass::Distribution);
        assert_eq!(parser.role_class("core-ho-414-1"), RoleClass::Core);
        assert_eq!(parser.role_class("edge-bo-1-1"), RoleClass::Edge);
        assert_eq!(parser.role_class("aggr-bo-1-1"), RoleClass::Aggregation);
    }

    #[test]
    fn test_unknown_role_token_defaults_to_access() {
        let parser = IdentifierParser::new(ParserStrategy::Structural);
        assert_eq!(parser.role_class("sw-x-1"), RoleClass::Access);
    }

    #[test]
    fn test_lookup_confirmed_picks_known_token() {
        let parser = IdentifierParser::new(ParserStrategy::LookupConfirmed);
        let lookup = SetLookup::of(&["ART"]);

        // Structural mode would join ARL-ART; lookup mode confirms only ART
        let parsed = parser.parse("accs-arl-art-1550-1", &lookup);
        assert_eq!(parsed.facility_code.as_deref(), Some("ART"));
    }

    #[test]
    fn test_lookup_confirmed_stops_at_digit_token() {
        let parser = IdentifierParser::new(ParserStrategy::LookupConfirmed);
        let lookup = SetLookup::of(&["414"]);

        // The digit token ends the walk before it could ever match
        let parsed = parser.parse("accs-ho-414-1", &lookup);
        assert_eq!(parsed.facility_code, None);
    }

    #[test]
    fn test_lookup_confirmed_no_match() {
        let parser = IdentifierParser::new(ParserStrategy::LookupConfirmed);
        let lookup = SetLookup::of(&["ISE"]);
        let parsed = parser.parse("accs-ho-bldg-a", &lookup);
        assert_eq!(parsed.facility_code, None);
    }
}
