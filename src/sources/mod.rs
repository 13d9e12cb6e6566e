//! State Sources
//!
//! A state source is a named, side-effect-free value producer registered with
//! the agent. Determinism metadata is supplied through explicit capability
//! registration: each source describes its own type shape, fields, and
//! developer tags instead of relying on runtime reflection.

mod registry;

pub use registry::{RegistryListener, SourceRegistry, SourceRegistryEvent};

use serde::{Deserialize, Serialize};

use crate::timeline::DeterminismClass;

/// Structural shape of a source's value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeShape {
    /// Closed set of variants carrying pure data.
    TaggedUnion,
    /// Plain record of fields with no hidden state.
    PureData,
    /// Anything the agent cannot see inside.
    Opaque,
}

/// Developer tag attached to a source's value type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeveloperTag {
    Deterministic,
    Verifiable,
    ConditionalSafe {
        reason: String,
        author: String,
        review_date: String,
    },
    Unsafe {
        reason: String,
    },
}

/// Per-field tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldTag {
    /// Value is replaced by a redaction marker before recording.
    Redact,
    /// Field is dropped from the captured value entirely.
    Ignore,
}

/// A declared member field of a source's value type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub type_name: String,
    pub tags: Vec<FieldTag>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: FieldTag) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn has_tag(&self, tag: FieldTag) -> bool {
        self.tags.contains(&tag)
    }
}

/// Declared description of a source's value type: the unit the static
/// classifier and the developer contract operate on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Fully qualified type name, e.g. `app::session::SessionState`.
    pub type_name: String,
    pub shape: TypeShape,
    pub fields: Vec<FieldDescriptor>,
    pub tags: Vec<DeveloperTag>,
}

impl TypeDescriptor {
    pub fn new(type_name: impl Into<String>, shape: TypeShape) -> Self {
        Self {
            type_name: type_name.into(),
            shape,
            fields: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_tag(mut self, tag: DeveloperTag) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn has_deterministic_tag(&self) -> bool {
        self.tags.contains(&DeveloperTag::Deterministic)
    }
}

/// A registered value producer.
///
/// `capture_state` must be side-effect-free for sources declared
/// `Guaranteed` or `Verifiable`; it is treated as fast and non-blocking and
/// is wrapped in defensive error handling by the recorder.
pub trait StateSource: Send + Sync {
    /// Unique id. Registering an already-present id fails.
    fn source_id(&self) -> &str;

    fn display_name(&self) -> &str;

    fn declared_class(&self) -> DeterminismClass;

    fn descriptor(&self) -> TypeDescriptor;

    /// Produce the current value as an opaque JSON document.
    fn capture_state(&self) -> anyhow::Result<serde_json::Value>;
}
