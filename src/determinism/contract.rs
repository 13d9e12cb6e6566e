//! Developer Contract
//!
//! Consumes the declared tags attached to a source's value type, stores
//! process-wide class overrides, and holds the runtime assertions that must
//! all pass before a replay is allowed to start.

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::sources::{DeveloperTag, TypeDescriptor};
use crate::timeline::{now_ms, DeterminismClass};

/// Where a contract decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DecisionOrigin {
    Tag,
    Override,
    Assertion,
    None,
}

/// Outcome of checking a type's declared annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractDecision {
    pub class: Option<DeterminismClass>,
    pub origin: DecisionOrigin,
    pub reason: Option<String>,
}

impl ContractDecision {
    fn none() -> Self {
        Self {
            class: None,
            origin: DecisionOrigin::None,
            reason: None,
        }
    }
}

/// A process-wide registered class override, acknowledged by a developer.
#[derive(Debug, Clone, Serialize)]
pub struct ClassOverride {
    pub type_name: String,
    pub declared_class: DeterminismClass,
    pub reason: String,
    pub acknowledged_at_ms: i64,
}

struct NamedAssertion {
    name: String,
    predicate: Box<dyn Fn() -> bool + Send + Sync>,
}

/// Declared-tag reader plus override and assertion stores.
#[derive(Default)]
pub struct DeveloperContract {
    overrides: DashMap<String, ClassOverride>,
    assertions: RwLock<Vec<NamedAssertion>>,
}

impl DeveloperContract {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the declared tags (and any registered override) for a type.
    ///
    /// Overrides beat tags. Tag precedence: explicit `Unsafe` over
    /// `Deterministic` over `Verifiable` over `ConditionalSafe`.
    pub fn check_annotations(&self, descriptor: &TypeDescriptor) -> ContractDecision {
        if let Some(entry) = self.overrides.get(&descriptor.type_name) {
            return ContractDecision {
                class: Some(entry.declared_class),
                origin: DecisionOrigin::Override,
                reason: Some(entry.reason.clone()),
            };
        }

        let mut unsafe_reason = None;
        let mut conditional = None;
        let mut deterministic = false;
        let mut verifiable = false;

        for tag in &descriptor.tags {
            match tag {
                DeveloperTag::Unsafe { reason } => unsafe_reason = Some(reason.clone()),
                DeveloperTag::Deterministic => deterministic = true,
                DeveloperTag::Verifiable => verifiable = true,
                DeveloperTag::ConditionalSafe { reason, .. } => {
                    conditional = Some(reason.clone());
                }
            }
        }

        if let Some(reason) = unsafe_reason {
            return ContractDecision {
                class: Some(DeterminismClass::Unsafe),
                origin: DecisionOrigin::Tag,
                reason: Some(reason),
            };
        }
        if deterministic {
            return ContractDecision {
                class: Some(DeterminismClass::Guaranteed),
                origin: DecisionOrigin::Tag,
                reason: None,
            };
        }
        if verifiable {
            return ContractDecision {
                class: Some(DeterminismClass::Verifiable),
                origin: DecisionOrigin::Tag,
                reason: None,
            };
        }
        if let Some(reason) = conditional {
            return ContractDecision {
                class: Some(DeterminismClass::Conditional),
                origin: DecisionOrigin::Tag,
                reason: Some(reason),
            };
        }

        ContractDecision::none()
    }

    /// Register a process-wide override for a type name.
    pub fn register_override(
        &self,
        type_name: impl Into<String>,
        declared_class: DeterminismClass,
        reason: impl Into<String>,
    ) {
        let type_name = type_name.into();
        debug!(class = %declared_class, "class override registered");
        self.overrides.insert(
            type_name.clone(),
            ClassOverride {
                type_name,
                declared_class,
                reason: reason.into(),
                acknowledged_at_ms: now_ms(),
            },
        );
    }

    pub fn get_override(&self, type_name: &str) -> Option<ClassOverride> {
        self.overrides.get(type_name).map(|e| e.value().clone())
    }

    /// Register a named predicate evaluated before replay.
    pub fn add_assertion(
        &self,
        name: impl Into<String>,
        predicate: impl Fn() -> bool + Send + Sync + 'static,
    ) {
        self.assertions.write().push(NamedAssertion {
            name: name.into(),
            predicate: Box::new(predicate),
        });
    }

    pub fn assertion_count(&self) -> usize {
        self.assertions.read().len()
    }

    /// Evaluate every registered assertion. Returns the names of those that
    /// failed; replay requires all of them to pass.
    pub fn evaluate_assertions(&self) -> Vec<String> {
        self.assertions
            .read()
            .iter()
            .filter(|a| !(a.predicate)())
            .map(|a| a.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::TypeShape;

    fn descriptor_with(tags: Vec<DeveloperTag>) -> TypeDescriptor {
        let mut d = TypeDescriptor::new("app::session::SessionState", TypeShape::PureData);
        for tag in tags {
            d = d.with_tag(tag);
        }
        d
    }

    #[test]
    fn test_no_tags_yields_no_decision() {
        let contract = DeveloperContract::new();
        let decision = contract.check_annotations(&descriptor_with(vec![]));
        assert_eq!(decision.class, None);
        assert_eq!(decision.origin, DecisionOrigin::None);
    }

    #[test]
    fn test_unsafe_beats_deterministic() {
        let contract = DeveloperContract::new();
        let decision = contract.check_annotations(&descriptor_with(vec![
            DeveloperTag::Deterministic,
            DeveloperTag::Unsafe {
                reason: "talks to the network".to_string(),
            },
        ]));
        assert_eq!(decision.class, Some(DeterminismClass::Unsafe));
        assert_eq!(decision.origin, DecisionOrigin::Tag);
        assert_eq!(decision.reason.as_deref(), Some("talks to the network"));
    }

    #[test]
    fn test_deterministic_beats_conditional() {
        let contract = DeveloperContract::new();
        let decision = contract.check_annotations(&descriptor_with(vec![
            DeveloperTag::ConditionalSafe {
                reason: "isolated".to_string(),
                author: "dev".to_string(),
                review_date: "2026-01-15".to_string(),
            },
            DeveloperTag::Deterministic,
        ]));
        assert_eq!(decision.class, Some(DeterminismClass::Guaranteed));
    }

    #[test]
    fn test_conditional_tag_carries_reason() {
        let contract = DeveloperContract::new();
        let decision =
            contract.check_annotations(&descriptor_with(vec![DeveloperTag::ConditionalSafe {
                reason: "subsystem isolated behind a queue".to_string(),
                author: "dev".to_string(),
                review_date: "2026-01-15".to_string(),
            }]));
        assert_eq!(decision.class, Some(DeterminismClass::Conditional));
        assert!(decision.reason.unwrap().contains("isolated"));
    }

    #[test]
    fn test_override_beats_tags() {
        let contract = DeveloperContract::new();
        contract.register_override(
            "app::session::SessionState",
            DeterminismClass::Conditional,
            "audited 2026-01",
        );
        let decision = contract.check_annotations(&descriptor_with(vec![DeveloperTag::Unsafe {
            reason: "old tag".to_string(),
        }]));
        assert_eq!(decision.class, Some(DeterminismClass::Conditional));
        assert_eq!(decision.origin, DecisionOrigin::Override);
        assert_eq!(decision.reason.as_deref(), Some("audited 2026-01"));
    }

    #[test]
    fn test_assertions_report_failures_by_name() {
        let contract = DeveloperContract::new();
        contract.add_assertion("seed-fixed", || true);
        contract.add_assertion("cache-warm", || false);
        contract.add_assertion("no-live-connections", || false);

        let failed = contract.evaluate_assertions();
        assert_eq!(failed, vec!["cache-warm", "no-live-connections"]);
        assert_eq!(contract.assertion_count(), 3);
    }
}
