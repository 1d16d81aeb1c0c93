//! Network Module
//!
//! Peer-to-peer TCP plumbing: newline-delimited JSON control messages and
//! the length-prefixed snapshot transfer protocol.
//!
//! A snapshot transfer runs over an already established connection: the
//! sender writes the byte length as a text line, waits for a literal
//! `READY` line from the receiver, then writes the raw bytes. The receiver
//! reads exactly that many bytes before touching its local copy.

mod client;
mod server;

pub use client::NetworkClient;
pub use server::{MessageHandler, NetworkServer};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Acknowledgment line sent by the transfer receiver
const READY: &str = "READY";

/// Upper bound on an announced transfer, guarding against garbage length lines
const MAX_TRANSFER_BYTES: u64 = 1 << 30;

/// Write a JSON value as a single line
pub async fn write_json<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a single JSON line into a value
pub async fn read_json<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let line = read_line(reader).await?;
    Ok(serde_json::from_str(&line)?)
}

/// Sender side of the snapshot transfer
pub async fn send_blob<R, W>(reader: &mut R, writer: &mut W, data: &[u8]) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer.write_all(format!("{}\n", data.len()).as_bytes()).await?;
    writer.flush().await?;

    let ack = read_line(reader).await?;
    if ack != READY {
        return Err(Error::Protocol(format!(
            "expected {} acknowledgment, got {:?}",
            READY, ack
        )));
    }

    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Receiver side of the snapshot transfer
pub async fn recv_blob<R, W>(reader: &mut R, writer: &mut W) -> Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let line = read_line(reader).await?;
    let len: u64 = line
        .parse()
        .map_err(|_| Error::Protocol(format!("invalid transfer length: {:?}", line)))?;
    if len > MAX_TRANSFER_BYTES {
        return Err(Error::Protocol(format!(
            "transfer of {} bytes exceeds the {} byte limit",
            len, MAX_TRANSFER_BYTES
        )));
    }

    writer.write_all(format!("{}\n", READY).as_bytes()).await?;
    writer.flush().await?;

    let mut data = vec![0u8; len as usize];
    reader.read_exact(&mut data).await?;
    Ok(data)
}

/// Read one line, stripping the terminator. EOF before any data is an error.
async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(Error::Network("connection closed by peer".into()));
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}
