//! Rule catalog: the validated, immutable severity policy.
//!
//! Built once from a policy document and never mutated afterwards. Workers
//! share it by reference. Validation is exhaustive: every defect in the
//! document is collected into a single `ConfigError::Invalid`.

use crate::error::{CatalogViolation, ConfigError, Result};
use crate::models::policy::{LevelSpec, LevelTable, PolicyDocument, RuleSpec};
use crate::models::SeverityLevel;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// A named policy entry binding tool check ids to a severity.
pub struct Rule {
    pub rule_id: String,
    pub checks: BTreeSet<String>,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Serialization format of a policy document, chosen by file extension.
pub enum DocumentFormat {
    Yaml,
    Toml,
    Json,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("toml") => DocumentFormat::Toml,
            Some("json") => DocumentFormat::Json,
            _ => DocumentFormat::Yaml,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleCatalog {
    levels: [Vec<Rule>; 3],
    descriptions: [Option<String>; 3],
    // check id -> (level, index into levels[level])
    by_check: HashMap<String, (SeverityLevel, usize)>,
}

impl RuleCatalog {
    /// Read and validate the policy document at `path`.
    pub fn load(path: &Path) -> Result<RuleCatalog> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let doc = parse_document(&text, DocumentFormat::from_path(path), path)?;
        let catalog = Self::from_document(&doc)?;
        tracing::info!(
            path = %path.display(),
            rules = catalog.len(),
            checks = catalog.check_count(),
            "policy loaded"
        );
        Ok(catalog)
    }

    /// Parse and validate a policy document held in memory.
    pub fn parse(text: &str, format: DocumentFormat) -> Result<RuleCatalog> {
        let doc = parse_document(text, format, Path::new("<inline>"))?;
        Self::from_document(&doc)
    }

    /// Validate a parsed document and build the catalog.
    pub fn from_document(doc: &PolicyDocument) -> Result<RuleCatalog> {
        let Some(levels) = doc.severity_levels.as_ref() else {
            return Err(ConfigError::Invalid(vec![
                CatalogViolation::MissingSeverityLevels,
            ]));
        };

        let mut violations = Vec::new();
        for name in levels.keys() {
            if name.parse::<SeverityLevel>().is_err() {
                violations.push(CatalogViolation::UnknownLevel { name: name.clone() });
            }
        }

        let mut builder = Builder::default();
        for level in SeverityLevel::ALL {
            match levels.get(level.as_str()) {
                None => violations.push(CatalogViolation::MissingLevel { level }),
                Some(None) => {}
                Some(Some(spec)) => {
                    for key in spec.unknown_keys() {
                        violations.push(CatalogViolation::UnknownKey {
                            level,
                            rule_id: None,
                            key: key.to_string(),
                        });
                    }
                    builder.descriptions[level.slot()] = spec.description().map(str::to_string);
                    for (position, raw) in spec.rules().iter().enumerate() {
                        builder.add_rule(level, position, raw, &mut violations);
                    }
                }
            }
        }

        if !violations.is_empty() {
            return Err(ConfigError::Invalid(violations));
        }
        if builder.levels[SeverityLevel::Critical.slot()].is_empty() {
            tracing::warn!("policy defines no critical rules");
        }
        Ok(RuleCatalog {
            levels: builder.levels,
            descriptions: builder.descriptions,
            by_check: builder.by_check,
        })
    }

    /// Resolve a check id to its severity and owning rule id.
    pub fn lookup(&self, check_id: &str) -> Option<(SeverityLevel, &str)> {
        let (level, idx) = *self.by_check.get(check_id)?;
        Some((level, self.levels[level.slot()][idx].rule_id.as_str()))
    }

    pub fn rules(&self, level: SeverityLevel) -> &[Rule] {
        &self.levels[level.slot()]
    }

    pub fn level_description(&self, level: SeverityLevel) -> Option<&str> {
        self.descriptions[level.slot()].as_deref()
    }

    /// All rules, most severe level first, document order within a level.
    pub fn iter(&self) -> impl Iterator<Item = (SeverityLevel, &Rule)> + '_ {
        SeverityLevel::ALL
            .into_iter()
            .flat_map(move |level| self.rules(level).iter().map(move |r| (level, r)))
    }

    pub fn len(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn check_count(&self) -> usize {
        self.by_check.len()
    }

    /// Rebuild a document equivalent to the one this catalog was loaded from.
    pub fn to_document(&self) -> PolicyDocument {
        let mut levels = BTreeMap::new();
        for level in SeverityLevel::ALL {
            let rules = self
                .rules(level)
                .iter()
                .map(|r| RuleSpec {
                    rule_id: Some(r.rule_id.clone()),
                    description: if r.description.is_empty() {
                        None
                    } else {
                        Some(r.description.clone())
                    },
                    checks: Some(r.checks.iter().cloned().collect()),
                    extra: Default::default(),
                })
                .collect();
            levels.insert(
                level.as_str().to_string(),
                Some(LevelSpec::Table(LevelTable {
                    description: self.descriptions[level.slot()].clone(),
                    rules: Some(rules),
                    extra: Default::default(),
                })),
            );
        }
        PolicyDocument {
            severity_levels: Some(levels),
        }
    }

    pub fn to_yaml(&self) -> std::result::Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.to_document())
    }
}

#[derive(Default)]
struct Builder {
    levels: [Vec<Rule>; 3],
    descriptions: [Option<String>; 3],
    by_check: HashMap<String, (SeverityLevel, usize)>,
    rule_owner: HashMap<String, SeverityLevel>,
    // check id -> label of the first rule claiming it
    check_owner: HashMap<String, String>,
}

impl Builder {
    fn add_rule(
        &mut self,
        level: SeverityLevel,
        position: usize,
        raw: &RuleSpec,
        violations: &mut Vec<CatalogViolation>,
    ) {
        let before = violations.len();
        let rule_id = raw
            .rule_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());
        let label = match rule_id {
            Some(id) => {
                if let Some(first) = self.rule_owner.get(id) {
                    violations.push(CatalogViolation::DuplicateRuleId {
                        rule_id: id.to_string(),
                        first: *first,
                        second: level,
                    });
                } else {
                    self.rule_owner.insert(id.to_string(), level);
                }
                id.to_string()
            }
            None => {
                violations.push(CatalogViolation::MissingRuleId { level, position });
                format!("{} #{}", level, position + 1)
            }
        };

        for key in raw.extra.keys() {
            violations.push(CatalogViolation::UnknownKey {
                level,
                rule_id: Some(label.clone()),
                key: key.clone(),
            });
        }

        let mut checks = BTreeSet::new();
        match raw.checks.as_deref() {
            None => violations.push(CatalogViolation::MissingChecks {
                level,
                rule_id: label.clone(),
            }),
            Some([]) => violations.push(CatalogViolation::EmptyChecks {
                level,
                rule_id: label.clone(),
            }),
            Some(list) => {
                let mut blank = false;
                for check in list {
                    let check = check.trim();
                    if check.is_empty() {
                        blank = true;
                    } else {
                        checks.insert(check.to_string());
                    }
                }
                if blank {
                    violations.push(CatalogViolation::BlankCheckId {
                        level,
                        rule_id: label.clone(),
                    });
                }
            }
        }

        // `checks` is a set, so any existing owner is a different rule.
        for check in &checks {
            match self.check_owner.get(check) {
                Some(owner) => violations.push(CatalogViolation::DuplicateCheck {
                    check_id: check.clone(),
                    first_rule: owner.clone(),
                    second_rule: label.clone(),
                }),
                None => {
                    self.check_owner.insert(check.clone(), label.clone());
                }
            }
        }

        if violations.len() != before {
            return;
        }
        let slot = level.slot();
        let idx = self.levels[slot].len();
        for check in &checks {
            self.by_check.insert(check.clone(), (level, idx));
        }
        self.levels[slot].push(Rule {
            rule_id: label,
            checks,
            description: raw.description.clone().unwrap_or_default(),
        });
    }
}

fn parse_document(text: &str, format: DocumentFormat, origin: &Path) -> Result<PolicyDocument> {
    let parsed = match format {
        DocumentFormat::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
        DocumentFormat::Toml => toml::from_str(text).map_err(|e| e.to_string()),
        DocumentFormat::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
    };
    parsed.map_err(|message| ConfigError::Parse {
        path: PathBuf::from(origin),
        message,
    })
}
