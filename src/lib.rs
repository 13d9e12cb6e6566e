//! Chronos Agent
//!
//! Trust-first state-recording debugger agent. A recording can be
//! faithfully replayed, or the agent refuses to replay and explains why:
//! every registered state source is classified for determinism, recording
//! degrades instead of distorting under load, and replay runs inside a
//! hermetic sandbox behind a pre-flight refusal check.
//!
//! The crate is a library embedded in the host process (debug builds
//! only). The host constructs one [`ChronosRuntime`], registers its state
//! sources, and attaches a debugger UI over the authenticated, encrypted
//! IPC stream.

pub mod config;
pub mod coord;
pub mod determinism;
pub mod errors;
pub mod header;
pub mod ipc;
pub mod logging;
pub mod metrics;
pub mod recording;
pub mod replay;
pub mod runtime;
pub mod sources;
pub mod timeline;

// The types a host touches day to day, re-exported at the crate root.
pub use config::AgentConfig;
pub use errors::ChronosError;
pub use recording::RecordingLevel;
pub use runtime::ChronosRuntime;
pub use sources::{StateSource, TypeDescriptor, TypeShape};
pub use timeline::{DeterminismClass, TimelineEvent};
