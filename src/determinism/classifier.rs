//! Static Determinism Classifier
//!
//! Pattern-based classification of fully qualified type names. The pattern
//! tables are data-driven so a host can extend them; the built-in tables
//! cover the usual suspects (network, clocks, randomness, file and database
//! I/O) plus observable state holders and pure-data primitives.
//!
//! Classification never invokes a source's capture operation. It looks only
//! at the declared descriptor, so analyzing the same type twice always
//! yields identical results.

use serde::{Deserialize, Serialize};

use crate::sources::{TypeDescriptor, TypeShape};
use crate::timeline::DeterminismClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskSeverity {
    Info,
    Warning,
    Critical,
}

/// One determinism risk found during type analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Risk {
    pub description: String,
    pub severity: RiskSeverity,
    /// Field that triggered the risk, when the risk came from a member.
    pub field: Option<String>,
}

/// A single pattern table entry: case-insensitive substring match against a
/// fully qualified type name, with the label used in risk descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    pub pattern: String,
    pub label: String,
}

impl PatternRule {
    pub fn new(pattern: &str, label: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            label: label.to_string(),
        }
    }

    fn matches(&self, lowered_type_name: &str) -> bool {
        lowered_type_name.contains(&self.pattern)
    }
}

/// Result of analyzing one declared type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeAnalysis {
    pub type_name: String,
    pub class: DeterminismClass,
    /// 0..=100; starts at 100 and decreases per risk severity.
    pub score: u8,
    pub risks: Vec<Risk>,
}

/// Type-pattern-based mapping from declared types to determinism classes.
pub struct StaticClassifier {
    critical_unsafe: Vec<PatternRule>,
    verifiable: Vec<PatternRule>,
    guaranteed_safe: Vec<String>,
}

impl StaticClassifier {
    /// Classifier with the built-in pattern tables.
    pub fn new() -> Self {
        Self::with_tables(
            default_critical_rules(),
            default_verifiable_rules(),
            default_guaranteed_names(),
        )
    }

    /// Classifier with caller-supplied tables. `guaranteed_safe` entries are
    /// matched exactly against the base name (generics stripped, last path
    /// segment, lowercase); the other tables match as substrings.
    pub fn with_tables(
        critical_unsafe: Vec<PatternRule>,
        verifiable: Vec<PatternRule>,
        guaranteed_safe: Vec<String>,
    ) -> Self {
        Self {
            critical_unsafe,
            verifiable,
            guaranteed_safe: guaranteed_safe
                .into_iter()
                .map(|n| n.to_lowercase())
                .collect(),
        }
    }

    /// Classify a fully qualified type name against the pattern tables and
    /// the structural shape. Rule order: critical-unsafe, verifiable,
    /// guaranteed-safe, structural, default Conditional.
    pub fn classify(&self, descriptor: &TypeDescriptor) -> DeterminismClass {
        let lowered = descriptor.type_name.to_lowercase();

        if self.critical_unsafe.iter().any(|r| r.matches(&lowered)) {
            return DeterminismClass::Unsafe;
        }
        if self.verifiable.iter().any(|r| r.matches(&lowered)) {
            return DeterminismClass::Verifiable;
        }
        if self.is_guaranteed_name(&descriptor.type_name) {
            return DeterminismClass::Guaranteed;
        }
        match descriptor.shape {
            TypeShape::TaggedUnion | TypeShape::PureData => DeterminismClass::Guaranteed,
            TypeShape::Opaque => DeterminismClass::Conditional,
        }
    }

    /// Analyze a declared type: classify it and walk its member fields
    /// against the same tables, producing risks and a numeric score.
    pub fn analyze_type(&self, descriptor: &TypeDescriptor) -> TypeAnalysis {
        let mut risks = Vec::new();

        let lowered = descriptor.type_name.to_lowercase();
        for rule in &self.critical_unsafe {
            if rule.matches(&lowered) {
                risks.push(Risk {
                    description: format!("type {}: {}", descriptor.type_name, rule.label),
                    severity: RiskSeverity::Critical,
                    field: None,
                });
            }
        }

        for field in &descriptor.fields {
            let field_lowered = field.type_name.to_lowercase();
            if let Some(rule) = self.critical_unsafe.iter().find(|r| r.matches(&field_lowered)) {
                risks.push(Risk {
                    description: format!("field {}: {}", field.name, rule.label),
                    severity: RiskSeverity::Critical,
                    field: Some(field.name.clone()),
                });
            } else if let Some(rule) = self.verifiable.iter().find(|r| r.matches(&field_lowered)) {
                risks.push(Risk {
                    description: format!("field {}: {}", field.name, rule.label),
                    severity: RiskSeverity::Info,
                    field: Some(field.name.clone()),
                });
            } else if !self.is_guaranteed_name(&field.type_name) {
                risks.push(Risk {
                    description: format!(
                        "field {}: unclassified type {}",
                        field.name, field.type_name
                    ),
                    severity: RiskSeverity::Warning,
                    field: Some(field.name.clone()),
                });
            }
        }

        let base_class = self.classify(descriptor);
        let has_critical = risks.iter().any(|r| r.severity == RiskSeverity::Critical);
        let has_warning = risks.iter().any(|r| r.severity == RiskSeverity::Warning);

        let class = if has_critical {
            DeterminismClass::Unsafe
        } else if has_warning && base_class < DeterminismClass::Conditional {
            DeterminismClass::Conditional
        } else {
            base_class
        };

        let mut score: i32 = 100;
        for risk in &risks {
            score -= match risk.severity {
                RiskSeverity::Critical => 50,
                RiskSeverity::Warning => 20,
                RiskSeverity::Info => 5,
            };
        }

        TypeAnalysis {
            type_name: descriptor.type_name.clone(),
            class,
            score: score.clamp(0, 100) as u8,
            risks,
        }
    }

    fn is_guaranteed_name(&self, type_name: &str) -> bool {
        self.guaranteed_safe
            .iter()
            .any(|n| n == &base_name(type_name))
    }
}

impl Default for StaticClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Base name of a possibly generic, possibly qualified type: generics
/// stripped, last path segment, lowercase. `std::vec::Vec<u8>` -> `vec`.
fn base_name(type_name: &str) -> String {
    let without_generics = type_name.split('<').next().unwrap_or(type_name);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
        .trim()
        .to_lowercase()
}

fn default_critical_rules() -> Vec<PatternRule> {
    vec![
        // Network
        PatternRule::new("tcpstream", "network I/O"),
        PatternRule::new("udpsocket", "network I/O"),
        PatternRule::new("unixstream", "network I/O"),
        PatternRule::new("socket", "network I/O"),
        PatternRule::new("reqwest", "network I/O"),
        PatternRule::new("hyper", "network I/O"),
        PatternRule::new("httpclient", "network I/O"),
        // Time
        PatternRule::new("systemtime", "reads the system time"),
        PatternRule::new("instant", "reads the system time"),
        PatternRule::new("chrono::", "reads the system time"),
        PatternRule::new("clock", "reads the system time"),
        // Randomness
        PatternRule::new("rand", "random number generation"),
        PatternRule::new("rng", "random number generation"),
        PatternRule::new("random", "random number generation"),
        // File I/O
        PatternRule::new("std::fs", "file system access"),
        PatternRule::new("file", "file system access"),
        PatternRule::new("tempdir", "file system access"),
        // Database
        PatternRule::new("rusqlite", "database access"),
        PatternRule::new("sqlite", "database access"),
        PatternRule::new("sqlx", "database access"),
        PatternRule::new("postgres", "database access"),
        PatternRule::new("database", "database access"),
        // Preferences / settings stores
        PatternRule::new("preferences", "preferences storage"),
        PatternRule::new("keyring", "preferences storage"),
    ]
}

fn default_verifiable_rules() -> Vec<PatternRule> {
    vec![
        PatternRule::new("atomicbool", "observable state holder"),
        PatternRule::new("atomicu", "observable state holder"),
        PatternRule::new("atomici", "observable state holder"),
        PatternRule::new("atomicusize", "observable state holder"),
        PatternRule::new("mutex", "observable state holder"),
        PatternRule::new("rwlock", "observable state holder"),
        PatternRule::new("refcell", "observable state holder"),
        PatternRule::new("watch::", "observable state holder"),
        PatternRule::new("observable", "observable state holder"),
    ]
}

fn default_guaranteed_names() -> Vec<String> {
    [
        "bool", "char", "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32", "u64",
        "u128", "usize", "f32", "f64", "string", "str", "option", "result", "vec", "vecdeque",
        "btreemap", "btreeset", "hashmap", "hashset",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
