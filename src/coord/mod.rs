//! Cross-process coordination with HMAC-authenticated state updates and
//! signed events.

mod coordinator;

pub use coordinator::{
    CrossProcessEvent, ProcessCoordinator, ProcessState, MAX_SEQUENCE_LAG,
};
