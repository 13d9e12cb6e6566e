//! Refusal Engine
//!
//! Pre-flight gate for replay. Collects every unsafe source with its static
//! analysis risks, proposes mitigations keyed off the risk descriptions, and
//! produces the report the replay controller consults before starting.
//!
//! The log line emitted here is deliberately generic: source ids belong in
//! the report, not in unauthenticated logs.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

use super::classifier::{Risk, StaticClassifier};
use super::contract::DeveloperContract;
use super::scorer::DeterminismScorer;
use crate::sources::SourceRegistry;
use crate::timeline::DeterminismClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MitigationEffort {
    Low,
    Medium,
    High,
}

/// A suggested remediation, classified by effort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mitigation {
    pub action: String,
    pub effort: MitigationEffort,
}

/// One source blocking replay, with the risks that make it unsafe.
#[derive(Debug, Clone, Serialize)]
pub struct BlockingReason {
    pub source_id: String,
    pub display_name: String,
    pub class: DeterminismClass,
    pub risks: Vec<Risk>,
    pub reason: String,
}

/// Eligibility verdict for the current session.
#[derive(Debug, Clone, Serialize)]
pub struct RefusalReport {
    pub is_allowed: bool,
    pub score: u8,
    pub blocking_reasons: Vec<BlockingReason>,
    pub mitigations: Vec<Mitigation>,
}

/// Evaluates session eligibility and produces refusal reports.
pub struct RefusalEngine {
    registry: Arc<SourceRegistry>,
    classifier: Arc<StaticClassifier>,
    contract: Arc<DeveloperContract>,
    scorer: DeterminismScorer,
    last_report: RwLock<Option<RefusalReport>>,
}

impl RefusalEngine {
    pub fn new(
        registry: Arc<SourceRegistry>,
        classifier: Arc<StaticClassifier>,
        contract: Arc<DeveloperContract>,
    ) -> Self {
        Self {
            registry,
            classifier,
            contract,
            scorer: DeterminismScorer::new(),
            last_report: RwLock::new(None),
        }
    }

    /// Evaluate the session: session score, blocking reasons for every
    /// unsafe source, and deduplicated mitigations.
    pub fn evaluate(&self) -> RefusalReport {
        let session = self
            .scorer
            .score_session(&self.registry, &self.classifier, &self.contract);

        let mut blocking_reasons = Vec::new();
        let mut mitigations: Vec<Mitigation> = Vec::new();

        for source in self.registry.get_all() {
            let descriptor = source.descriptor();
            let class = self.scorer.effective_class(source.as_ref(), &self.contract);
            if class != DeterminismClass::Unsafe {
                continue;
            }

            let analysis = self.classifier.analyze_type(&descriptor);
            let decision = self.contract.check_annotations(&descriptor);
            let reason = decision
                .reason
                .unwrap_or_else(|| "declared unsafe: external effects at capture".to_string());

            let mut matched_any = false;
            for risk in &analysis.risks {
                if let Some(mitigation) = mitigation_for(&risk.description) {
                    matched_any = true;
                    push_unique(&mut mitigations, mitigation);
                }
            }
            if !matched_any {
                push_unique(
                    &mut mitigations,
                    Mitigation {
                        action: "Use snapshot mode instead of replay".to_string(),
                        effort: MitigationEffort::Low,
                    },
                );
            }

            blocking_reasons.push(BlockingReason {
                source_id: source.source_id().to_string(),
                display_name: source.display_name().to_string(),
                class,
                risks: analysis.risks,
                reason,
            });
        }

        let report = RefusalReport {
            is_allowed: blocking_reasons.is_empty() && session.replay_eligible,
            score: session.score,
            blocking_reasons,
            mitigations,
        };

        info!(
            allowed = report.is_allowed,
            score = report.score,
            blocking = report.blocking_reasons.len(),
            "replay eligibility evaluated"
        );

        *self.last_report.write() = Some(report.clone());
        report
    }

    /// Full details of the most recent evaluation, including source ids.
    pub fn get_report(&self) -> Option<RefusalReport> {
        self.last_report.read().clone()
    }
}

fn mitigation_for(risk_description: &str) -> Option<Mitigation> {
    let lowered = risk_description.to_lowercase();
    if lowered.contains("random") {
        return Some(Mitigation {
            action: "Inject a fixed seed for random number generation".to_string(),
            effort: MitigationEffort::Medium,
        });
    }
    if lowered.contains("time") {
        return Some(Mitigation {
            action: "Inject a controllable time provider".to_string(),
            effort: MitigationEffort::Medium,
        });
    }
    if lowered.contains("network") {
        return Some(Mitigation {
            action: "Exclude the source and replay against cached data".to_string(),
            effort: MitigationEffort::Low,
        });
    }
    if lowered.contains("database") {
        return Some(Mitigation {
            action: "Use an in-memory database during replay".to_string(),
            effort: MitigationEffort::High,
        });
    }
    None
}

fn push_unique(mitigations: &mut Vec<Mitigation>, candidate: Mitigation) {
    if !mitigations.iter().any(|m| m.action == candidate.action) {
        mitigations.push(candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{FieldDescriptor, StateSource, TypeDescriptor, TypeShape};

    struct RiskySource {
        id: String,
        class: DeterminismClass,
        field_type: String,
    }

    impl StateSource for RiskySource {
        fn source_id(&self) -> &str {
            &self.id
        }
        fn display_name(&self) -> &str {
            &self.id
        }
        fn declared_class(&self) -> DeterminismClass {
            self.class
        }
        fn descriptor(&self) -> TypeDescriptor {
            TypeDescriptor::new(format!("app::{}", self.id), TypeShape::PureData)
                .with_field(FieldDescriptor::new("inner", self.field_type.clone()))
        }
        fn capture_state(&self) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::json!({}))
        }
    }

    fn engine(registry: Arc<SourceRegistry>) -> RefusalEngine {
        RefusalEngine::new(
            registry,
            Arc::new(StaticClassifier::new()),
            Arc::new(DeveloperContract::new()),
        )
    }

    #[test]
    fn test_clean_session_is_allowed() {
        let registry = Arc::new(SourceRegistry::new());
        registry
            .register(Arc::new(RiskySource {
                id: "counter".to_string(),
                class: DeterminismClass::Guaranteed,
                field_type: "u64".to_string(),
            }))
            .unwrap();

        let report = engine(registry).evaluate();
        assert!(report.is_allowed);
        assert!(report.blocking_reasons.is_empty());
        assert!(report.mitigations.is_empty());
    }

    #[test]
    fn test_unsafe_source_blocks_with_mitigations() {
        let registry = Arc::new(SourceRegistry::new());
        registry
            .register(Arc::new(RiskySource {
                id: "seeder".to_string(),
                class: DeterminismClass::Unsafe,
                field_type: "rand::rngs::StdRng".to_string(),
            }))
            .unwrap();

        let report = engine(registry).evaluate();
        assert!(!report.is_allowed);
        assert_eq!(report.score, 0);
        assert_eq!(report.blocking_reasons.len(), 1);
        assert_eq!(report.blocking_reasons[0].source_id, "seeder");
        assert_eq!(report.mitigations.len(), 1);
        assert!(report.mitigations[0].action.contains("fixed seed"));
        assert_eq!(report.mitigations[0].effort, MitigationEffort::Medium);
    }

    #[test]
    fn test_mitigations_deduplicated_by_action() {
        let registry = Arc::new(SourceRegistry::new());
        for id in ["seeder-a", "seeder-b"] {
            registry
                .register(Arc::new(RiskySource {
                    id: id.to_string(),
                    class: DeterminismClass::Unsafe,
                    field_type: "rand::rngs::StdRng".to_string(),
                }))
                .unwrap();
        }

        let report = engine(registry).evaluate();
        assert_eq!(report.blocking_reasons.len(), 2);
        assert_eq!(report.mitigations.len(), 1);
    }

    #[test]
    fn test_unmatched_risks_fall_back_to_snapshot_mode() {
        let registry = Arc::new(SourceRegistry::new());
        registry
            .register(Arc::new(RiskySource {
                id: "mystery".to_string(),
                class: DeterminismClass::Unsafe,
                field_type: "u64".to_string(),
            }))
            .unwrap();

        let report = engine(registry).evaluate();
        assert!(!report.is_allowed);
        assert_eq!(report.mitigations.len(), 1);
        assert!(report.mitigations[0].action.contains("snapshot mode"));
        assert_eq!(report.mitigations[0].effort, MitigationEffort::Low);
    }

    #[test]
    fn test_report_is_cached() {
        let registry = Arc::new(SourceRegistry::new());
        let engine = engine(registry);
        assert!(engine.get_report().is_none());
        engine.evaluate();
        assert!(engine.get_report().is_some());
    }
}
