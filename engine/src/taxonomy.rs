//! Taxonomy resolver
//!
//! Canonicalizes cost-category (rubro) identifiers against the canonical
//! taxonomy table and the one-way legacy alias map. A [`Taxonomy`] is an
//! immutable value built once at startup and passed by reference to every
//! boundary that ingests ids: baseline ingestion, spend import, forecast read.
//! Ids that have already been canonicalized are never passed through again.

use crate::errors::{FinzError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Curated table shipped with the engine.
const EMBEDDED_TAXONOMY_TOML: &str = include_str!("../taxonomy.toml");

/// One canonical cost category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyEntry {
    pub canonical_id: String,
    pub category: String,
    #[serde(alias = "display_description")]
    pub description: String,
}

/// On-disk shape of a taxonomy document.
#[derive(Debug, Deserialize)]
struct TaxonomyDocument {
    #[serde(default)]
    entries: Vec<TaxonomyEntry>,
    #[serde(default)]
    legacy_aliases: BTreeMap<String, String>,
}

/// How a raw id was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// The raw id already was a canonical id
    Canonical,
    /// The raw id was a legacy alias
    LegacyAlias,
    /// Nothing matched; the raw id is passed through
    Unresolved,
}

/// Result of canonicalizing one raw id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Canonical spelling, or the trimmed raw id when unresolved
    pub canonical_id: String,
    pub found: bool,
    pub matched: MatchKind,
}

/// A legacy alias whose target is missing from the canonical table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenAlias {
    pub legacy_id: String,
    pub target: String,
}

/// Immutable canonical taxonomy plus legacy alias map.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    /// Keyed by normalized canonical id
    entries: BTreeMap<String, TaxonomyEntry>,
    /// Normalized legacy id -> (legacy id as written, target as written)
    aliases: BTreeMap<String, (String, String)>,
}

/// Normalize an id for lookup: trim, fold case, and collapse runs of
/// whitespace, underscores and hyphens into a single `-`.
pub fn normalize_id(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for ch in raw.trim().chars() {
        if ch.is_whitespace() || ch == '_' || ch == '-' {
            pending_sep = true;
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('-');
        }
        pending_sep = false;
        out.extend(ch.to_lowercase());
    }
    out
}

impl Taxonomy {
    /// The curated table embedded in the engine.
    pub fn embedded() -> Result<Self> {
        Self::from_toml_str(EMBEDDED_TAXONOMY_TOML)
    }

    /// Load a taxonomy document from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            FinzError::taxonomy_with_source(
                format!("failed to read taxonomy at {}", path.display()),
                e,
            )
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse a taxonomy document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let doc: TaxonomyDocument = toml::from_str(contents)
            .map_err(|e| FinzError::taxonomy_with_source("failed to parse taxonomy", e))?;
        Self::from_parts(doc.entries, doc.legacy_aliases)
    }

    /// Build a taxonomy from entries and a `legacy -> canonical` map.
    ///
    /// Rejects duplicate canonical ids, duplicate aliases after
    /// normalization, and aliases that shadow a canonical id. Alias targets
    /// are not checked here; see [`Taxonomy::check_closure`].
    pub fn from_parts(
        entries: impl IntoIterator<Item = TaxonomyEntry>,
        legacy_aliases: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self> {
        let mut by_id = BTreeMap::new();
        for entry in entries {
            let key = normalize_id(&entry.canonical_id);
            if key.is_empty() {
                return Err(FinzError::taxonomy("taxonomy entry with empty canonical_id"));
            }
            if let Some(prev) = by_id.insert(key, entry) {
                return Err(FinzError::taxonomy(format!(
                    "duplicate canonical id {}",
                    prev.canonical_id
                )));
            }
        }

        let mut aliases = BTreeMap::new();
        for (legacy, target) in legacy_aliases {
            let key = normalize_id(&legacy);
            if key.is_empty() {
                return Err(FinzError::taxonomy(format!(
                    "empty legacy alias for target {target}"
                )));
            }
            if by_id.contains_key(&key) {
                return Err(FinzError::taxonomy(format!(
                    "legacy alias {legacy} shadows a canonical id"
                )));
            }
            if let Some((prev, _)) = aliases.insert(key, (legacy.clone(), target)) {
                return Err(FinzError::taxonomy(format!(
                    "legacy aliases {prev} and {legacy} collide after normalization"
                )));
            }
        }

        Ok(Self {
            entries: by_id,
            aliases,
        })
    }

    /// Resolve a raw id to its canonical id.
    ///
    /// Order: canonical id, then legacy alias, then pass-through with
    /// `found = false` and a warning. Never fabricates an id.
    pub fn canonicalize(&self, raw_id: &str) -> Resolution {
        let key = normalize_id(raw_id);

        if let Some(entry) = self.entries.get(&key) {
            return Resolution {
                canonical_id: entry.canonical_id.clone(),
                found: true,
                matched: MatchKind::Canonical,
            };
        }

        if let Some((legacy, target)) = self.aliases.get(&key) {
            if let Some(entry) = self.entries.get(&normalize_id(target)) {
                return Resolution {
                    canonical_id: entry.canonical_id.clone(),
                    found: true,
                    matched: MatchKind::LegacyAlias,
                };
            }
            tracing::warn!(
                legacy_id = %legacy,
                target = %target,
                "legacy alias points at a missing canonical id"
            );
        } else {
            tracing::warn!(raw_id = %raw_id.trim(), "unknown taxonomy id");
        }

        Resolution {
            canonical_id: raw_id.trim().to_string(),
            found: false,
            matched: MatchKind::Unresolved,
        }
    }

    /// Metadata for a canonical id.
    pub fn entry(&self, canonical_id: &str) -> Option<&TaxonomyEntry> {
        self.entries.get(&normalize_id(canonical_id))
    }

    /// Aliases whose target does not resolve to a canonical entry.
    pub fn check_closure(&self) -> Vec<BrokenAlias> {
        self.aliases
            .values()
            .filter(|(_, target)| !self.entries.contains_key(&normalize_id(target)))
            .map(|(legacy, target)| BrokenAlias {
                legacy_id: legacy.clone(),
                target: target.clone(),
            })
            .collect()
    }

    /// All canonical entries, ordered by normalized id.
    pub fn entries(&self) -> impl Iterator<Item = &TaxonomyEntry> {
        self.entries.values()
    }

    /// `(legacy_id, target)` pairs as written in the source table.
    pub fn legacy_aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases
            .values()
            .map(|(legacy, target)| (legacy.as_str(), target.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Taxonomy {
        Taxonomy::from_parts(
            vec![
                TaxonomyEntry {
                    canonical_id: "MOD-ING".to_string(),
                    category: "MOD".to_string(),
                    description: "Ingenieros".to_string(),
                },
                TaxonomyEntry {
                    canonical_id: "TEC-LIC-MON".to_string(),
                    category: "TEC".to_string(),
                    description: "Licencias".to_string(),
                },
            ],
            vec![
                ("RB0001".to_string(), "MOD-ING".to_string()),
                ("Ingeniero Soporte".to_string(), "mod-ing".to_string()),
            ],
        )
        .expect("fixture")
    }

    #[test]
    fn test_normalize_id() {
        assert_eq!(normalize_id("  MOD-ING "), "mod-ing");
        assert_eq!(normalize_id("Service  Delivery\tManager"), "service-delivery-manager");
        assert_eq!(normalize_id("tec_lic__mon"), "tec-lic-mon");
        assert_eq!(normalize_id("--x--"), "x");
        assert_eq!(normalize_id("   "), "");
    }

    #[test]
    fn test_canonical_passthrough() {
        let tax = fixture();
        let res = tax.canonicalize("mod-ing");
        assert_eq!(res.canonical_id, "MOD-ING");
        assert!(res.found);
        assert_eq!(res.matched, MatchKind::Canonical);
    }

    #[test]
    fn test_legacy_alias() {
        let tax = fixture();
        let res = tax.canonicalize(" rb0001 ");
        assert_eq!(res.canonical_id, "MOD-ING");
        assert_eq!(res.matched, MatchKind::LegacyAlias);

        let res = tax.canonicalize("INGENIERO_SOPORTE");
        assert_eq!(res.canonical_id, "MOD-ING");
        assert!(res.found);
    }

    #[test]
    fn test_unknown_id_is_not_fabricated() {
        let tax = fixture();
        let res = tax.canonicalize("  XYZ-999 ");
        assert_eq!(res.canonical_id, "XYZ-999");
        assert!(!res.found);
        assert_eq!(res.matched, MatchKind::Unresolved);
    }

    #[test]
    fn test_single_pass() {
        let tax = fixture();
        for raw in ["MOD-ING", "rb0001", "ingeniero soporte", "XYZ-999", "tec lic mon"] {
            let once = tax.canonicalize(raw);
            let twice = tax.canonicalize(&once.canonical_id);
            assert_eq!(twice.canonical_id, once.canonical_id, "raw id {raw}");
        }
    }

    #[test]
    fn test_broken_alias_reported_and_not_resolved() {
        let tax = Taxonomy::from_parts(
            vec![TaxonomyEntry {
                canonical_id: "MOD-ING".to_string(),
                category: "MOD".to_string(),
                description: "Ingenieros".to_string(),
            }],
            vec![("RB9999".to_string(), "GONE-01".to_string())],
        )
        .expect("loads");
        let broken = tax.check_closure();
        assert_eq!(
            broken,
            vec![BrokenAlias {
                legacy_id: "RB9999".to_string(),
                target: "GONE-01".to_string(),
            }]
        );
        let res = tax.canonicalize("RB9999");
        assert!(!res.found);
        assert_eq!(res.canonical_id, "RB9999");
    }

    #[test]
    fn test_rejects_inconsistent_tables() {
        let entry = TaxonomyEntry {
            canonical_id: "MOD-ING".to_string(),
            category: "MOD".to_string(),
            description: "Ingenieros".to_string(),
        };
        assert!(Taxonomy::from_parts(vec![entry.clone(), entry.clone()], vec![]).is_err());
        assert!(
            Taxonomy::from_parts(
                vec![entry.clone()],
                vec![("mod_ing".to_string(), "MOD-ING".to_string())]
            )
            .is_err()
        );
        assert!(
            Taxonomy::from_parts(
                vec![entry],
                vec![
                    ("RB 1".to_string(), "MOD-ING".to_string()),
                    ("rb-1".to_string(), "MOD-ING".to_string()),
                ]
            )
            .is_err()
        );
    }

    #[test]
    fn test_embedded_table_is_closed() {
        let tax = Taxonomy::embedded().expect("embedded taxonomy parses");
        assert!(tax.len() > 40);
        assert_eq!(tax.check_closure(), Vec::new());
        for (legacy, _) in tax.legacy_aliases() {
            assert!(tax.canonicalize(legacy).found, "alias {legacy} must resolve");
        }
    }

    #[test]
    fn test_embedded_role_names_resolve() {
        let tax = Taxonomy::embedded().expect("embedded taxonomy parses");
        assert_eq!(
            tax.canonicalize("Service Delivery Manager").canonical_id,
            "MOD-SDM"
        );
        assert_eq!(
            tax.canonicalize("Ingeniero Soporte N1").canonical_id,
            "MOD-ING"
        );
        let entry = tax.entry("tec-lic-mon").expect("entry");
        assert_eq!(entry.category, "TEC");
    }
}
