//! Per-connection handler.
//!
//! Reads RESP frames from the TCP stream, routes them through the
//! dispatcher, and writes replies back. Pipelining works by draining
//! every complete frame from a read before responding. Pub/sub pushes
//! arrive asynchronously on the client handle's outbound queue and are
//! interleaved with replies.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use cinder_protocol::{parse_frame, Frame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::client::{ClientHandle, Session};
use crate::dispatch::Server;

/// Initial read buffer capacity; covers most commands without
/// over-allocating for PING/SET/GET workloads.
const BUF_CAPACITY: usize = 4096;

/// Maximum read buffer size before the client is disconnected. Bounds
/// the memory a client can pin with an incomplete frame.
const MAX_BUF_SIZE: usize = 64 * 1024 * 1024;

/// Drives a single client connection to completion.
///
/// The loop exits when the client disconnects, stays idle past the
/// configured keepalive, or commits a protocol error.
pub async fn handle(
    mut stream: TcpStream,
    server: Arc<Server>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (handle, mut pushes) = ClientHandle::new();
    let client = Arc::new(handle);
    let mut session = Session::default();

    let idle_timeout = Duration::from_secs(server.config.keepalive.max(1));
    let mut buf = BytesMut::with_capacity(BUF_CAPACITY);
    let mut out = BytesMut::with_capacity(BUF_CAPACITY);

    let result = drive(
        &mut stream,
        &server,
        &client,
        &mut session,
        &mut pushes,
        idle_timeout,
        &mut buf,
        &mut out,
    )
    .await;

    server.after_client_close(&client);
    result
}

#[allow(clippy::too_many_arguments)]
async fn drive(
    stream: &mut TcpStream,
    server: &Arc<Server>,
    client: &Arc<ClientHandle>,
    session: &mut Session,
    pushes: &mut UnboundedReceiver<Bytes>,
    idle_timeout: Duration,
    buf: &mut BytesMut,
    out: &mut BytesMut,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        if buf.len() > MAX_BUF_SIZE {
            let mut err_buf = BytesMut::new();
            Frame::err("ERR max buffer size exceeded, closing connection").serialize(&mut err_buf);
            let _ = stream.write_all(&err_buf).await;
            return Ok(());
        }

        tokio::select! {
            // pub/sub pushes and subscription acks
            Some(push) = pushes.recv() => {
                stream.write_all(&push).await?;
                continue;
            }

            read = tokio::time::timeout(idle_timeout, stream.read_buf(buf)) => {
                match read {
                    Ok(Ok(0)) => return Ok(()),
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => return Ok(()), // idle timeout, close silently
                }
            }
        }

        // drain every complete frame in the buffer (pipelining),
        // batching the replies into one write
        out.clear();
        loop {
            match parse_frame(buf) {
                Ok(Some((frame, consumed))) => {
                    let _ = buf.split_to(consumed);
                    let Some(cmdline) = frame.into_cmdline() else {
                        Frame::err("ERR protocol error: expected an array of bulk strings")
                            .serialize(out);
                        stream.write_all(out).await?;
                        return Ok(());
                    };
                    if let Some(reply) = server.exec(client, session, cmdline).await {
                        reply.serialize(out);
                    }
                }
                Ok(None) => break, // need more data
                Err(e) => {
                    Frame::err(format!("ERR protocol error: {e}")).serialize(out);
                    stream.write_all(out).await?;
                    return Ok(());
                }
            }
        }

        if !out.is_empty() {
            stream.write_all(out).await?;
        }
    }
}
