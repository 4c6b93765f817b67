//! Policy document schema (the severity mapping).
//!
//! Shape, as YAML:
//!
//! ```yaml
//! severity_levels:
//!   critical:
//!     description: Blocks merge
//!     rules:
//!       - rule_id: Rule 21
//!         description: Prevent buffer overflows
//!         checks: [clang-analyzer-security.insecureAPI.strcpy]
//!   major:
//!     rules: []
//!   minor:
//!     rules: []
//! ```
//!
//! A level may also be written directly as a list of rules. Every field is
//! optional at this layer so `RuleCatalog` validation can report all defects
//! at once instead of failing on the first serde error. Keys this schema does
//! not know are kept in `extra` and reported by validation, so a misspelled
//! `rules` cannot silently empty a level.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
/// Root policy document.
pub struct PolicyDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_levels: Option<BTreeMap<String, Option<LevelSpec>>>,
}

/// Keys present in the document but not in the schema.
pub type ExtraKeys = BTreeMap<String, serde_yaml::Value>;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
/// One severity level: either a bare rule list or a table with `rules`.
pub enum LevelSpec {
    Rules(Vec<RuleSpec>),
    Table(LevelTable),
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct LevelTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<RuleSpec>>,
    #[serde(flatten)]
    pub extra: ExtraKeys,
}

impl LevelSpec {
    pub fn rules(&self) -> &[RuleSpec] {
        match self {
            LevelSpec::Rules(rules) => rules,
            LevelSpec::Table(table) => table.rules.as_deref().unwrap_or(&[]),
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            LevelSpec::Rules(_) => None,
            LevelSpec::Table(table) => table.description.as_deref(),
        }
    }

    /// Unrecognized keys of the level table, in key order.
    pub fn unknown_keys(&self) -> impl Iterator<Item = &str> + '_ {
        let extra = match self {
            LevelSpec::Rules(_) => None,
            LevelSpec::Table(table) => Some(&table.extra),
        };
        extra.into_iter().flat_map(|e| e.keys().map(String::as_str))
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
/// A rule entry as written in the document.
pub struct RuleSpec {
    #[serde(default, alias = "id", skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checks: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: ExtraKeys,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_and_list_level_forms() {
        let doc: PolicyDocument = serde_yaml::from_str(
            r#"
severity_levels:
  critical:
    description: blocks merge
    rules:
      - rule_id: Rule 21
        checks: [bugprone-use-after-move]
  major:
    - id: Rule 30
      checks: [bugprone-narrowing-conversions]
  minor:
"#,
        )
        .unwrap();
        let levels = doc.severity_levels.unwrap();
        let critical = levels["critical"].as_ref().unwrap();
        assert_eq!(critical.description(), Some("blocks merge"));
        assert_eq!(critical.rules()[0].rule_id.as_deref(), Some("Rule 21"));
        let major = levels["major"].as_ref().unwrap();
        assert_eq!(major.rules()[0].rule_id.as_deref(), Some("Rule 30"));
        assert!(levels["minor"].is_none());
    }

    #[test]
    fn test_unrecognized_keys_are_kept() {
        let doc: PolicyDocument = serde_yaml::from_str(
            r#"
severity_levels:
  critical:
    rule:
      - rule_id: Rule 21
        check: [bugprone-use-after-move]
  major:
    - rule_id: Rule 30
      chekcs: [bugprone-narrowing-conversions]
"#,
        )
        .unwrap();
        let levels = doc.severity_levels.unwrap();
        let critical = levels["critical"].as_ref().unwrap();
        assert!(critical.rules().is_empty());
        assert_eq!(critical.unknown_keys().collect::<Vec<_>>(), vec!["rule"]);
        let major = levels["major"].as_ref().unwrap();
        assert!(major.rules()[0].checks.is_none());
        assert!(major.rules()[0].extra.contains_key("chekcs"));
    }

    #[test]
    fn test_missing_top_level_key_is_none() {
        let doc: PolicyDocument = serde_yaml::from_str("levels: {}\n").unwrap();
        assert!(doc.severity_levels.is_none());
    }
}
