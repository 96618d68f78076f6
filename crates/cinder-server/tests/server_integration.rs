//! End-to-end tests: dispatcher + persistence + a real TCP client.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use cinder_protocol::{parse_frame, CmdLine, Frame};
use cinder_server::client::{ClientHandle, Session};
use cinder_server::config::ServerConfig;
use cinder_server::dispatch::Server;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn cmd(parts: &[&str]) -> CmdLine {
    parts
        .iter()
        .map(|p| Bytes::copy_from_slice(p.as_bytes()))
        .collect()
}

fn new_client() -> Arc<ClientHandle> {
    let (handle, _rx) = ClientHandle::new();
    Arc::new(handle)
}

async fn run(server: &Arc<Server>, session: &mut Session, parts: &[&str]) -> Frame {
    let client = new_client();
    server
        .exec(&client, session, cmd(parts))
        .await
        .expect("direct reply")
}

/// Logical dump of every database: key → reproducing command text.
fn snapshot(server: &Arc<Server>) -> BTreeMap<(usize, String), String> {
    let mut out = BTreeMap::new();
    for i in 0..server.store.db_count() {
        let db = server.store.db(i).unwrap();
        db.for_each_entity(|key, entity, _expire| {
            let mut line: Vec<String> = cinder_core::marshal::entity_to_cmdline(key, entity)
                .iter()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .collect();
            line.sort();
            out.insert((i, key.to_owned()), line.join(" "));
            true
        });
    }
    out
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rewrite_under_load_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let aof = dir.path().join("dump.aof");

    let config = ServerConfig {
        append_only: true,
        aof_filename: aof.to_string_lossy().into_owned(),
        aof_fsync: "no".into(),
        ..Default::default()
    };
    let server = Server::new(config.clone()).unwrap();

    // seed 10k keys across 3 databases with a mix of types
    for i in 0..10_000u32 {
        let db = server.store.db((i % 3) as usize).unwrap();
        let key = format!("seed:{i}");
        match i % 4 {
            0 => {
                db.exec_normal(&cmd(&["SET", &key, &format!("v{i}")]));
            }
            1 => {
                db.exec_normal(&cmd(&["RPUSH", &key, "a", "b", "c"]));
            }
            2 => {
                db.exec_normal(&cmd(&["HSET", &key, "f", &i.to_string()]));
            }
            _ => {
                db.exec_normal(&cmd(&["ZADD", &key, "1", "m1", "2", "m2"]));
            }
        }
    }
    let persister = server.persister.clone().unwrap();
    persister.flush();

    // issue BGREWRITEAOF while 5k writes land concurrently
    let mut session = Session::default();
    let status = run(&server, &mut session, &["BGREWRITEAOF"]).await;
    assert!(matches!(status, Frame::Simple(_)), "got {status:?}");

    let write_server = Arc::clone(&server);
    let writer = tokio::task::spawn_blocking(move || {
        for i in 0..5_000u32 {
            let db = write_server.store.db((i % 3) as usize).unwrap();
            db.exec_normal(&cmd(&["SET", &format!("live:{i}"), &format!("w{i}")]));
        }
    });
    writer.await.unwrap();

    // wait out the background rewrite, then drain the append queue
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    while persister.is_rewriting() {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    persister.flush();

    // "restart": a fresh server loads the rewritten file
    let restarted = Server::new(config).unwrap();
    assert_eq!(snapshot(&server), snapshot(&restarted));
}

#[tokio::test]
async fn tcp_round_trip_with_golden_bytes() {
    let config = ServerConfig {
        port: 0, // pick a free port
        ..Default::default()
    };
    let server = Server::new(config).unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accept_server = Arc::clone(&server);
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let server = Arc::clone(&accept_server);
            tokio::spawn(async move {
                let _ = cinder_server::connection::handle(stream, server).await;
            });
        }
    });

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();

    // HSET h f1 v1 -> :1
    stream
        .write_all(b"*4\r\n$4\r\nHSET\r\n$1\r\nh\r\n$2\r\nf1\r\n$2\r\nv1\r\n")
        .await
        .unwrap();
    assert_eq!(read_reply(&mut stream).await, b":1\r\n");

    // HSET h f1 v2 f2 v3 -> :1 (only f2 is new)
    stream
        .write_all(b"*6\r\n$4\r\nHSET\r\n$1\r\nh\r\n$2\r\nf1\r\n$2\r\nv2\r\n$2\r\nf2\r\n$2\r\nv3\r\n")
        .await
        .unwrap();
    assert_eq!(read_reply(&mut stream).await, b":1\r\n");

    // HGET h f1 -> $2 v2
    stream
        .write_all(b"*3\r\n$4\r\nHGET\r\n$1\r\nh\r\n$2\r\nf1\r\n")
        .await
        .unwrap();
    assert_eq!(read_reply(&mut stream).await, b"$2\r\nv2\r\n");

    // HLEN h -> :2
    stream
        .write_all(b"*2\r\n$4\r\nHLEN\r\n$1\r\nh\r\n")
        .await
        .unwrap();
    assert_eq!(read_reply(&mut stream).await, b":2\r\n");

    // pipelined PING + unknown command
    stream
        .write_all(b"*1\r\n$4\r\nPING\r\n*1\r\n$5\r\nBOGUS\r\n")
        .await
        .unwrap();
    let mut combined = Vec::new();
    while !combined.ends_with(b"-ERR unknown command 'bogus'\r\n") {
        let mut chunk = [0u8; 256];
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed early");
        combined.extend_from_slice(&chunk[..n]);
    }
    assert!(combined.starts_with(b"+PONG\r\n"));
}

/// Reads one complete RESP reply from the stream.
async fn read_reply(stream: &mut tokio::net::TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    loop {
        let mut chunk = [0u8; 1024];
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed early");
        buf.extend_from_slice(&chunk[..n]);
        if let Ok(Some((_, consumed))) = parse_frame(&buf) {
            assert_eq!(consumed, buf.len(), "unexpected trailing bytes");
            return buf;
        }
    }
}
