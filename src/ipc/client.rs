//! IPC Client
//!
//! Client side of the handshake and framed transport. The debugger UI uses
//! this to attach to a running agent; the crate's own tests use it to
//! exercise the server end to end.

use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use super::crypto::{derive_key_from_token, FrameCipher, SESSION_KEY_LEN};
use super::wire;
use crate::errors::ChronosError;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// An authenticated, encrypted connection to an agent's IPC server.
pub struct IpcClient {
    stream: UnixStream,
    session_key: [u8; SESSION_KEY_LEN],
    cipher: FrameCipher,
}

impl IpcClient {
    /// Connect and run the handshake. Fails when the server rejects the
    /// token (the connection closes before any key material arrives).
    pub fn connect(path: &Path, token: &str) -> Result<Self> {
        let mut stream = UnixStream::connect(path).context("connect to agent socket")?;
        stream
            .set_read_timeout(Some(RECV_TIMEOUT))
            .context("set read timeout")?;

        wire::write_token(&mut stream, token).context("send session token")?;

        // On a token mismatch the server closes without replying, so this
        // read fails instead of yielding a key frame.
        let (iv, wrapped_key) = wire::read_frame(&mut stream)
            .map_err(|_| ChronosError::AuthenticationFailed {
                context: "ipc handshake",
            })?;
        let handshake_cipher = FrameCipher::new(&derive_key_from_token(token.as_bytes()));
        let key_bytes = handshake_cipher
            .open(&iv, &wrapped_key)
            .context("unwrap session key")?;
        let session_key: [u8; SESSION_KEY_LEN] = key_bytes
            .as_slice()
            .try_into()
            .context("session key length")?;

        wire::read_ack(&mut stream).context("handshake acknowledgment")?;

        Ok(Self {
            stream,
            session_key,
            cipher: FrameCipher::new(&session_key),
        })
    }

    pub fn session_key(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.session_key
    }

    /// Encrypt and send one message.
    pub fn send(&mut self, plaintext: &[u8]) -> Result<()> {
        let (iv, ciphertext) = self.cipher.seal(plaintext)?;
        wire::write_frame(&mut self.stream, &iv, &ciphertext).context("write frame")?;
        Ok(())
    }

    /// Receive and decrypt one message.
    pub fn recv(&mut self) -> Result<Vec<u8>> {
        let (iv, ciphertext) = wire::read_frame(&mut self.stream).context("read frame")?;
        Ok(self.cipher.open(&iv, &ciphertext)?)
    }
}
