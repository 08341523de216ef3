//! Shared-secret challenge/response authentication.
//!
//! The challenger sends `#CHALLENGE#` followed by a random nonce; the other
//! side answers with HMAC-SHA256(authkey, nonce) and is told `#WELCOME#` or
//! `#FAILURE#`. Both directions run, so each side proves it holds the key.

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use tokio::io::{AsyncRead, AsyncWrite};

use super::codec::{read_frame, write_frame, ReadOutcome};
use super::{IpcError, Result};

type HmacSha256 = Hmac<Sha256>;

const CHALLENGE: &[u8] = b"#CHALLENGE#";
const WELCOME: &[u8] = b"#WELCOME#";
const FAILURE: &[u8] = b"#FAILURE#";
const NONCE_LEN: usize = 32;

fn keyed_mac(key: &[u8]) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(key).map_err(|_| IpcError::InvalidKey)
}

async fn expect_frame<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Vec<u8>> {
    match read_frame(stream).await? {
        ReadOutcome::Frame(body) => Ok(body),
        ReadOutcome::Closed => Err(IpcError::AuthenticationFailed(
            "peer closed during handshake".to_string(),
        )),
    }
}

/// Challenge the peer and verify its answer.
pub async fn deliver_challenge<S>(stream: &mut S, key: &[u8]) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill(&mut nonce);

    let mut challenge = CHALLENGE.to_vec();
    challenge.extend_from_slice(&nonce);
    write_frame(stream, &challenge).await?;

    let response = expect_frame(stream).await?;
    let mut mac = keyed_mac(key)?;
    mac.update(&nonce);

    if mac.verify_slice(&response).is_ok() {
        write_frame(stream, WELCOME).await
    } else {
        write_frame(stream, FAILURE).await?;
        Err(IpcError::AuthenticationFailed("digest mismatch".to_string()))
    }
}

/// Answer a challenge from the peer.
pub async fn answer_challenge<S>(stream: &mut S, key: &[u8]) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let challenge = expect_frame(stream).await?;
    let nonce = challenge
        .strip_prefix(CHALLENGE)
        .ok_or_else(|| IpcError::AuthenticationFailed("malformed challenge".to_string()))?;

    let mut mac = keyed_mac(key)?;
    mac.update(nonce);
    write_frame(stream, &mac.finalize().into_bytes()).await?;

    let verdict = expect_frame(stream).await?;
    if verdict == WELCOME {
        Ok(())
    } else {
        Err(IpcError::AuthenticationFailed(
            "key rejected by peer".to_string(),
        ))
    }
}

/// Listener side of the mutual handshake.
pub async fn authenticate_server<S>(stream: &mut S, key: &[u8]) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    deliver_challenge(stream, key).await?;
    answer_challenge(stream, key).await
}

/// Producer side of the mutual handshake.
pub async fn authenticate_client<S>(stream: &mut S, key: &[u8]) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    answer_challenge(stream, key).await?;
    deliver_challenge(stream, key).await
}
