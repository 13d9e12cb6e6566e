//! Secure IPC transport: session-authenticated handshake, AES-256-GCM
//! framing, and the event stream server.

mod client;
mod crypto;
mod server;
mod wire;

pub use client::IpcClient;
pub use crypto::{
    constant_time_eq, derive_key_from_token, FrameCipher, SessionCredentials, SESSION_KEY_LEN,
};
pub use server::{EventStreamBridge, IpcServer};
pub use wire::{WireError, IV_LEN, MAX_PLAINTEXT_LEN, MAX_TOKEN_LEN, TAG_LEN};
