//! IPC Wire Format
//!
//! Length-prefixed frames over a local stream socket, big-endian length
//! fields. Three phases:
//!
//! ```text
//! 1. client -> server   len(u16) || token_utf8
//! 2. server -> client   len(u32) || iv(12) || enc(session_key)+tag
//!    server -> client   len(u16) || "OK"
//! 3. both directions    len(u32) || iv(12) || ciphertext+tag
//! ```
//!
//! Maximum plaintext per frame is 1 MiB; the GCM tag adds 16 bytes.

use std::io::{self, Read, Write};

/// Maximum plaintext message size.
pub const MAX_PLAINTEXT_LEN: usize = 1024 * 1024;

pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Largest frame body (iv + ciphertext + tag) we will accept.
pub const MAX_FRAME_LEN: u32 = (IV_LEN + MAX_PLAINTEXT_LEN + TAG_LEN) as u32;

/// Longest session token accepted during the handshake.
pub const MAX_TOKEN_LEN: u16 = 256;

const ACK: &[u8] = b"OK";

/// Errors while parsing or validating frames.
#[derive(Debug)]
pub enum WireError {
    FrameTooLarge(u32),
    FrameTooShort(u32),
    TokenTooLong(u16),
    BadAck,
    Io(io::Error),
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FrameTooLarge(n) => {
                write!(f, "frame length {n} exceeds maximum {MAX_FRAME_LEN}")
            }
            Self::FrameTooShort(n) => write!(f, "frame length {n} below iv+tag minimum"),
            Self::TokenTooLong(n) => write!(f, "token length {n} exceeds {MAX_TOKEN_LEN}"),
            Self::BadAck => write!(f, "handshake acknowledgment missing or malformed"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for WireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WireError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Phase 1: client sends the session token.
pub fn write_token<W: Write>(w: &mut W, token: &str) -> Result<(), WireError> {
    let bytes = token.as_bytes();
    if bytes.len() > MAX_TOKEN_LEN as usize {
        return Err(WireError::TokenTooLong(bytes.len() as u16));
    }
    w.write_all(&(bytes.len() as u16).to_be_bytes())?;
    w.write_all(bytes)?;
    w.flush()?;
    Ok(())
}

/// Phase 1: server reads the session token.
pub fn read_token<R: Read>(r: &mut R) -> Result<Vec<u8>, WireError> {
    let mut len_buf = [0u8; 2];
    r.read_exact(&mut len_buf)?;
    let len = u16::from_be_bytes(len_buf);
    if len > MAX_TOKEN_LEN {
        return Err(WireError::TokenTooLong(len));
    }
    let mut token = vec![0u8; len as usize];
    r.read_exact(&mut token)?;
    Ok(token)
}

/// Phases 2 and 3: write `len(u32) || iv || ciphertext+tag`.
pub fn write_frame<W: Write>(w: &mut W, iv: &[u8], ciphertext: &[u8]) -> Result<(), WireError> {
    debug_assert_eq!(iv.len(), IV_LEN);
    let len = (iv.len() + ciphertext.len()) as u32;
    if len > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(len));
    }
    w.write_all(&len.to_be_bytes())?;
    w.write_all(iv)?;
    w.write_all(ciphertext)?;
    w.flush()?;
    Ok(())
}

/// Phases 2 and 3: read one frame, returning `(iv, ciphertext+tag)`.
pub fn read_frame<R: Read>(r: &mut R) -> Result<(Vec<u8>, Vec<u8>), WireError> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(len));
    }
    if (len as usize) < IV_LEN + TAG_LEN {
        return Err(WireError::FrameTooShort(len));
    }
    let mut body = vec![0u8; len as usize];
    r.read_exact(&mut body)?;
    let ciphertext = body.split_off(IV_LEN);
    Ok((body, ciphertext))
}

/// Phase 2: server confirms the handshake.
pub fn write_ack<W: Write>(w: &mut W) -> Result<(), WireError> {
    w.write_all(&(ACK.len() as u16).to_be_bytes())?;
    w.write_all(ACK)?;
    w.flush()?;
    Ok(())
}

/// Phase 2: client consumes the handshake acknowledgment.
pub fn read_ack<R: Read>(r: &mut R) -> Result<(), WireError> {
    let mut len_buf = [0u8; 2];
    r.read_exact(&mut len_buf)?;
    let len = u16::from_be_bytes(len_buf);
    if len as usize != ACK.len() {
        return Err(WireError::BadAck);
    }
    let mut ack = [0u8; 2];
    r.read_exact(&mut ack)?;
    if ack != ACK {
        return Err(WireError::BadAck);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_token_round_trip() {
        let mut buf = Vec::new();
        write_token(&mut buf, "0123456789abcdef0123456789abcdef").unwrap();
        let token = read_token(&mut Cursor::new(buf)).unwrap();
        assert_eq!(token, b"0123456789abcdef0123456789abcdef");
    }

    #[test]
    fn test_frame_round_trip() {
        let iv = [7u8; IV_LEN];
        let ciphertext = vec![1u8; 64];
        let mut buf = Vec::new();
        write_frame(&mut buf, &iv, &ciphertext).unwrap();

        let (read_iv, read_ct) = read_frame(&mut Cursor::new(buf)).unwrap();
        assert_eq!(read_iv, iv);
        assert_eq!(read_ct, ciphertext);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_LEN + 1).to_be_bytes());
        assert!(matches!(
            read_frame(&mut Cursor::new(buf)),
            Err(WireError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn test_undersized_frame_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&8u32.to_be_bytes());
        buf.extend_from_slice(&[0u8; 8]);
        assert!(matches!(
            read_frame(&mut Cursor::new(buf)),
            Err(WireError::FrameTooShort(8))
        ));
    }

    #[test]
    fn test_ack_round_trip() {
        let mut buf = Vec::new();
        write_ack(&mut buf).unwrap();
        read_ack(&mut Cursor::new(buf)).unwrap();
    }

    #[test]
    fn test_bad_ack_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&2u16.to_be_bytes());
        buf.extend_from_slice(b"NO");
        assert!(matches!(
            read_ack(&mut Cursor::new(buf)),
            Err(WireError::BadAck)
        ));
    }
}
