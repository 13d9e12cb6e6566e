//! Determinism classification pipeline: static classifier, developer
//! contract, runtime verifier, scorer, and the refusal engine that gates
//! replay on all of them.

mod classifier;
mod contract;
mod divergence;
mod refusal;
mod scorer;
mod verifier;

pub use classifier::{PatternRule, Risk, RiskSeverity, StaticClassifier, TypeAnalysis};
pub use contract::{ClassOverride, ContractDecision, DecisionOrigin, DeveloperContract};
pub use divergence::{DivergenceKind, DivergenceRecord, DivergenceReport};
pub use refusal::{
    BlockingReason, Mitigation, MitigationEffort, RefusalEngine, RefusalReport,
};
pub use scorer::{
    DeterminismLevel, DeterminismScorer, SessionScore, SourceScore, REPLAY_ELIGIBLE_SCORE,
};
pub use verifier::{
    canonical_form, capture_is_repeatable, hash_state, RuntimeVerifier, StoredCheckpoint,
    VerificationOutcome,
};
