//! Determinism Scorer
//!
//! Combines the static classifier, the developer contract, and the declared
//! class into per-source and per-session scores. A score of 80 is the replay
//! eligibility line.

use serde::Serialize;

use super::classifier::{StaticClassifier, TypeAnalysis};
use super::contract::DeveloperContract;
use crate::sources::{SourceRegistry, StateSource};
use crate::timeline::DeterminismClass;

/// Replay eligibility threshold.
pub const REPLAY_ELIGIBLE_SCORE: u8 = 80;

/// Qualitative level derived from a numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeterminismLevel {
    Perfect,
    High,
    Conditional,
    Unsafe,
}

impl DeterminismLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            100 => Self::Perfect,
            80..=99 => Self::High,
            50..=79 => Self::Conditional,
            _ => Self::Unsafe,
        }
    }
}

/// Score for one registered source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceScore {
    pub source_id: String,
    pub class: DeterminismClass,
    pub score: u8,
    pub level: DeterminismLevel,
    pub replay_eligible: bool,
}

/// Score for the whole session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionScore {
    pub score: u8,
    pub replay_eligible: bool,
    pub source_count: usize,
    pub unsafe_count: usize,
}

fn class_weight(class: DeterminismClass) -> u8 {
    match class {
        DeterminismClass::Guaranteed => 100,
        DeterminismClass::Verifiable => 85,
        DeterminismClass::Conditional => 60,
        DeterminismClass::Unsafe => 0,
    }
}

/// Combines classifier, contract, and static score into final scores.
#[derive(Default)]
pub struct DeterminismScorer;

impl DeterminismScorer {
    pub fn new() -> Self {
        Self
    }

    /// Effective class of a source: a contract decision (tag or override)
    /// beats the declared class.
    pub fn effective_class(
        &self,
        source: &dyn StateSource,
        contract: &DeveloperContract,
    ) -> DeterminismClass {
        let descriptor = source.descriptor();
        contract
            .check_annotations(&descriptor)
            .class
            .unwrap_or_else(|| source.declared_class())
    }

    /// Per-source score: class base intersected (min) with the static
    /// analyzer score, plus a +10 bonus for an explicit deterministic tag.
    /// The bonus is clamped to 100, so a source already at 100 stays there.
    pub fn score_source(
        &self,
        source: &dyn StateSource,
        analysis: &TypeAnalysis,
        contract: &DeveloperContract,
    ) -> SourceScore {
        let descriptor = source.descriptor();
        let class = self.effective_class(source, contract);

        let base = class_weight(class);
        let mut score = base.min(analysis.score);
        if descriptor.has_deterministic_tag() {
            score = (score + 10).min(100);
        }

        SourceScore {
            source_id: source.source_id().to_string(),
            class,
            score,
            level: DeterminismLevel::from_score(score),
            replay_eligible: score >= REPLAY_ELIGIBLE_SCORE,
        }
    }

    /// Session score over all registered sources. Any unsafe source forces
    /// the session to zero; otherwise the score is the mean of the average
    /// static score and the class-weighted average.
    pub fn score_session(
        &self,
        registry: &SourceRegistry,
        classifier: &StaticClassifier,
        contract: &DeveloperContract,
    ) -> SessionScore {
        let sources = registry.get_all();
        if sources.is_empty() {
            return SessionScore {
                score: 100,
                replay_eligible: true,
                source_count: 0,
                unsafe_count: 0,
            };
        }

        let mut static_total: u32 = 0;
        let mut weight_total: u32 = 0;
        let mut unsafe_count = 0usize;

        for source in &sources {
            let descriptor = source.descriptor();
            let analysis = classifier.analyze_type(&descriptor);
            let class = self.effective_class(source.as_ref(), contract);
            if class == DeterminismClass::Unsafe {
                unsafe_count += 1;
            }
            static_total += u32::from(analysis.score);
            weight_total += u32::from(class_weight(class));
        }

        if unsafe_count > 0 {
            return SessionScore {
                score: 0,
                replay_eligible: false,
                source_count: sources.len(),
                unsafe_count,
            };
        }

        let n = sources.len() as u32;
        let avg_static = static_total / n;
        let class_weighted_avg = weight_total / n;
        let score = ((avg_static + class_weighted_avg) / 2).min(100) as u8;

        SessionScore {
            score,
            replay_eligible: score >= REPLAY_ELIGIBLE_SCORE,
            source_count: sources.len(),
            unsafe_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{DeveloperTag, TypeDescriptor, TypeShape};
    use std::sync::Arc;

    struct TaggedSource {
        id: String,
        class: DeterminismClass,
        tags: Vec<DeveloperTag>,
    }

    impl StateSource for TaggedSource {
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
            let mut d = TypeDescriptor::new(format!("app::{}", self.id), TypeShape::PureData);
            for tag in &self.tags {
                d = d.with_tag(tag.clone());
            }
            d
        }
        fn capture_state(&self) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::json!({"id": self.id}))
        }
    }

    fn source(id: &str, class: DeterminismClass) -> TaggedSource {
        TaggedSource {
            id: id.to_string(),
            class,
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_level_thresholds() {
        assert_eq!(DeterminismLevel::from_score(100), DeterminismLevel::Perfect);
        assert_eq!(DeterminismLevel::from_score(80), DeterminismLevel::High);
        assert_eq!(DeterminismLevel::from_score(99), DeterminismLevel::High);
        assert_eq!(
            DeterminismLevel::from_score(50),
            DeterminismLevel::Conditional
        );
        assert_eq!(DeterminismLevel::from_score(49), DeterminismLevel::Unsafe);
    }

    #[test]
    fn test_source_score_intersects_static_score() {
        let scorer = DeterminismScorer::new();
        let classifier = StaticClassifier::new();
        let contract = DeveloperContract::new();

        let s = source("counter", DeterminismClass::Guaranteed);
        let analysis = classifier.analyze_type(&s.descriptor());
        let score = scorer.score_source(&s, &analysis, &contract);
        assert_eq!(score.score, 100);
        assert_eq!(score.level, DeterminismLevel::Perfect);
        assert!(score.replay_eligible);

        let conditional = source("cache", DeterminismClass::Conditional);
        let analysis = classifier.analyze_type(&conditional.descriptor());
        let score = scorer.score_source(&conditional, &analysis, &contract);
        assert_eq!(score.score, 60);
        assert!(!score.replay_eligible);
    }

    #[test]
    fn test_deterministic_tag_bonus_is_clamped() {
        let scorer = DeterminismScorer::new();
        let classifier = StaticClassifier::new();
        let contract = DeveloperContract::new();

        let tagged = TaggedSource {
            id: "counter".to_string(),
            class: DeterminismClass::Guaranteed,
            tags: vec![DeveloperTag::Deterministic],
        };
        let analysis = classifier.analyze_type(&tagged.descriptor());
        let score = scorer.score_source(&tagged, &analysis, &contract);
        assert_eq!(score.score, 100);

        // The bonus lifts a verifiable source from 85 to 95.
        let verifiable = TaggedSource {
            id: "gauge".to_string(),
            class: DeterminismClass::Verifiable,
            tags: vec![DeveloperTag::Deterministic],
        };
        let analysis = classifier.analyze_type(&verifiable.descriptor());
        let score = scorer.score_source(&verifiable, &analysis, &contract);
        assert_eq!(score.score, 95);
    }

    #[test]
    fn test_unsafe_source_zeroes_session() {
        let scorer = DeterminismScorer::new();
        let classifier = StaticClassifier::new();
        let contract = DeveloperContract::new();
        let registry = SourceRegistry::new();

        registry
            .register(Arc::new(source("counter", DeterminismClass::Guaranteed)))
            .unwrap();
        registry
            .register(Arc::new(source("network", DeterminismClass::Unsafe)))
            .unwrap();

        let session = scorer.score_session(&registry, &classifier, &contract);
        assert_eq!(session.score, 0);
        assert!(!session.replay_eligible);
        assert_eq!(session.unsafe_count, 1);
    }

    #[test]
    fn test_guaranteed_only_session_is_eligible() {
        let scorer = DeterminismScorer::new();
        let classifier = StaticClassifier::new();
        let contract = DeveloperContract::new();
        let registry = SourceRegistry::new();

        registry
            .register(Arc::new(source("a", DeterminismClass::Guaranteed)))
            .unwrap();
        registry
            .register(Arc::new(source("b", DeterminismClass::Guaranteed)))
            .unwrap();

        let session = scorer.score_session(&registry, &classifier, &contract);
        assert_eq!(session.score, 100);
        assert!(session.replay_eligible);
    }

    #[test]
    fn test_empty_session_is_eligible() {
        let scorer = DeterminismScorer::new();
        let session = scorer.score_session(
            &SourceRegistry::new(),
            &StaticClassifier::new(),
            &DeveloperContract::new(),
        );
        assert_eq!(session.score, 100);
        assert!(session.replay_eligible);
    }

    #[test]
    fn test_contract_override_changes_effective_class() {
        let scorer = DeterminismScorer::new();
        let contract = DeveloperContract::new();
        contract.register_override(
            "app::legacy",
            DeterminismClass::Conditional,
            "audited: no external I/O on this path",
        );

        let s = source("legacy", DeterminismClass::Unsafe);
        assert_eq!(
            scorer.effective_class(&s, &contract),
            DeterminismClass::Conditional
        );
    }
}
