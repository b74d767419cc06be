//! RTMP handshake (server side)
//!
//! The simple, non-digest variant:
//!
//! ```text
//! Client                                   Server
//!   |------- C0 (1 byte: version) --------->|
//!   |<------ S0 (1 byte: version) ----------|
//!   |<------ S1 (1536 bytes: time+random) --|
//!   |------- C1 (1536 bytes) -------------->|
//!   |<------ S2 (echo of C1) ---------------|
//!   |------- C2 (1536 bytes) -------------->|
//! ```
//!
//! C2 content is not verified in this profile. Any failure is fatal for
//! the connection.

use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{HandshakeError, Result};
use crate::protocol::constants::{HANDSHAKE_SIZE, RTMP_VERSION};

/// Drive the server side of the handshake to completion.
pub async fn accept<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // C0: version byte
    let mut c0 = [0u8; 1];
    stream.read_exact(&mut c0).await?;
    if c0[0] != RTMP_VERSION {
        return Err(HandshakeError::UnsupportedVersion(c0[0]).into());
    }

    // S0: echo the version
    stream.write_all(&c0).await?;

    // S1: 4 bytes time (zero), 4 bytes zero, 1528 random
    let mut s1 = [0u8; HANDSHAKE_SIZE];
    rand::thread_rng().fill_bytes(&mut s1[8..]);
    stream.write_all(&s1).await?;

    // C1
    let mut c1 = vec![0u8; HANDSHAKE_SIZE];
    stream.read_exact(&mut c1).await?;

    // S2: C1 echoed verbatim
    stream.write_all(&c1).await?;

    // C2: read and discard
    let mut c2 = vec![0u8; HANDSHAKE_SIZE];
    stream.read_exact(&mut c2).await?;

    Ok(())
}
