//! Command dispatcher: system verbs and keyspace routing.
//!
//! System verbs (auth, database selection, transactions, pub/sub, AOF
//! control) are handled here against per-connection state; everything
//! else routes to the client's selected database. Cluster configuration
//! is accepted but the dispatch path is always the standalone one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use cinder_core::Store;
use cinder_persistence::Persister;
use cinder_protocol::{CmdLine, Frame};
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

use crate::client::{ClientHandle, Session};
use crate::config::ServerConfig;
use crate::pubsub::PubSub;

/// Shared server state: the store, the optional persister, the pub/sub
/// hub, and the configuration.
pub struct Server {
    pub config: ServerConfig,
    pub store: Arc<Store>,
    pub persister: Option<Arc<Persister>>,
    pub pubsub: PubSub,
    /// File size after the last rewrite; the auto-rewrite baseline.
    aof_baseline: AtomicU64,
}

impl Server {
    /// Builds the store, replays and wires the AOF when enabled, and
    /// starts the auto-rewrite ticker if configured.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, Box<dyn std::error::Error>> {
        let store = Arc::new(Store::new(config.databases, config.open_atomic_tx));

        let mut persister = None;
        if config.append_only {
            let fsync = config.fsync_policy()?;
            let p = Persister::new(Arc::clone(&store), &config.aof_filename, true, fsync)?;
            let sink = Arc::downgrade(&p);
            store.set_add_aof(move |db_index, line| {
                if let Some(p) = sink.upgrade() {
                    p.save_cmdline(db_index, line);
                }
            });
            persister = Some(p);
        }

        let baseline = std::fs::metadata(&config.aof_filename)
            .map(|m| m.len())
            .unwrap_or(0);

        let server = Arc::new(Self {
            config,
            store,
            persister,
            pubsub: PubSub::new(),
            aof_baseline: AtomicU64::new(baseline),
        });

        if server.persister.is_some() && server.config.auto_aof_rewrite {
            server.spawn_auto_rewrite();
        }
        Ok(server)
    }

    /// Routes one command line. `None` means the reply (if any) was
    /// already pushed through the client handle (pub/sub acks).
    pub async fn exec(
        self: &Arc<Self>,
        client: &Arc<ClientHandle>,
        session: &mut Session,
        cmdline: CmdLine,
    ) -> Option<Frame> {
        let name = String::from_utf8_lossy(&cmdline[0]).to_lowercase();
        let args = &cmdline[1..];

        if name == "ping" {
            return Some(match args.first() {
                None => Frame::pong(),
                Some(msg) => Frame::Bulk(msg.clone()),
            });
        }
        if name == "auth" {
            return Some(self.auth(session, args));
        }
        if !self.is_authenticated(session) {
            return Some(Frame::err("NOAUTH Authentication required"));
        }

        match name.as_str() {
            "select" => Some(self.select_db(session, args)),
            "multi" => Some(start_multi(session, args)),
            "exec" => Some(self.exec_multi(session, args)),
            "discard" => Some(discard_multi(session, args)),
            "watch" => Some(self.watch(session, args)),
            "unwatch" => Some(unwatch(session, args)),
            "subscribe" => self.subscribe(client, args),
            "unsubscribe" => self.unsubscribe(client, args),
            "publish" => Some(self.publish(args).await),
            "pubsub" => Some(self.pubsub_info(args)),
            "bgrewriteaof" => Some(self.bg_rewrite_aof()),
            "rewriteaof" => Some(self.rewrite_aof().await),
            _ => {
                let db = match self.store.db(session.db_index) {
                    Ok(db) => db,
                    Err(e) => return Some(Frame::err(e.to_string())),
                };
                Some(db.exec(&mut session.tx, cmdline))
            }
        }
    }

    /// Tears down connection-scoped state on disconnect.
    pub fn after_client_close(&self, client: &Arc<ClientHandle>) {
        self.pubsub.unsubscribe(client, &[]);
    }

    fn is_authenticated(&self, session: &Session) -> bool {
        self.config.password.is_empty() || session.authenticated
    }

    fn auth(&self, session: &mut Session, args: &[Bytes]) -> Frame {
        if args.len() != 1 {
            return Frame::arg_num_err("auth");
        }
        if self.config.password.is_empty() {
            return Frame::err("ERR Client sent AUTH, but no password is set");
        }
        if args[0] != self.config.password.as_bytes() {
            session.authenticated = false;
            return Frame::err("ERR invalid password");
        }
        session.authenticated = true;
        Frame::ok()
    }

    fn select_db(&self, session: &mut Session, args: &[Bytes]) -> Frame {
        if session.tx.multi {
            let err = Frame::err("cannot select database within multi");
            session.tx.syntax_errs.push(err.clone());
            return err;
        }
        if !session.tx.watching.is_empty() {
            return Frame::err("cannot select database when watching");
        }
        if args.len() != 1 {
            return Frame::arg_num_err("select");
        }
        let Some(index) = std::str::from_utf8(&args[0])
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        else {
            return Frame::err("ERR select db index is not an integer");
        };
        if index >= self.store.db_count() {
            return Frame::err("ERR index is invalid");
        }
        session.db_index = index;
        Frame::ok()
    }

    fn exec_multi(self: &Arc<Self>, session: &mut Session, args: &[Bytes]) -> Frame {
        if !session.tx.multi {
            return Frame::err("ERR EXEC without MULTI");
        }
        if !args.is_empty() {
            return Frame::arg_num_err("exec");
        }

        let reply = if !session.tx.syntax_errs.is_empty() {
            Frame::err("EXECABORT Transaction discarded because of previous errors.")
        } else {
            match self.store.db(session.db_index) {
                Ok(db) => db.exec_multi(&session.tx),
                Err(e) => Frame::err(e.to_string()),
            }
        };

        session.tx.reset_multi();
        session.tx.cancel_watching();
        reply
    }

    fn watch(&self, session: &mut Session, args: &[Bytes]) -> Frame {
        if session.tx.multi {
            return Frame::err("ERR WATCH inside MULTI is not allowed");
        }
        if args.is_empty() {
            return Frame::arg_num_err("watch");
        }
        let db = match self.store.db(session.db_index) {
            Ok(db) => db,
            Err(e) => return Frame::err(e.to_string()),
        };
        for raw in args {
            let key = String::from_utf8_lossy(raw).into_owned();
            let version = db.get_version(&key);
            session.tx.watching.insert(key, version);
        }
        Frame::ok()
    }

    fn subscribe(&self, client: &Arc<ClientHandle>, args: &[Bytes]) -> Option<Frame> {
        if args.is_empty() {
            return Some(Frame::arg_num_err("subscribe"));
        }
        let names: Vec<String> = args
            .iter()
            .map(|raw| String::from_utf8_lossy(raw).into_owned())
            .collect();
        self.pubsub.subscribe(client, &names);
        None
    }

    fn unsubscribe(&self, client: &Arc<ClientHandle>, args: &[Bytes]) -> Option<Frame> {
        let names: Vec<String> = args
            .iter()
            .map(|raw| String::from_utf8_lossy(raw).into_owned())
            .collect();
        self.pubsub.unsubscribe(client, &names);
        None
    }

    async fn publish(&self, args: &[Bytes]) -> Frame {
        if args.len() != 2 {
            return Frame::arg_num_err("publish");
        }
        let topic = String::from_utf8_lossy(&args[0]).into_owned();
        let received = self.pubsub.publish(&topic, args[1].clone()).await;
        Frame::Integer(received as i64)
    }

    fn pubsub_info(&self, args: &[Bytes]) -> Frame {
        if args.is_empty() {
            return Frame::arg_num_err("pubsub");
        }
        let sub = String::from_utf8_lossy(&args[0]).to_lowercase();
        match sub.as_str() {
            "channels" => {
                let pattern = args.get(1).map(|raw| String::from_utf8_lossy(raw).into_owned());
                let names = self.pubsub.channel_names(pattern.as_deref());
                Frame::Array(
                    names
                        .into_iter()
                        .map(|n| Frame::Bulk(Bytes::from(n)))
                        .collect(),
                )
            }
            "numsub" => {
                let names: Vec<String> = args[1..]
                    .iter()
                    .map(|raw| String::from_utf8_lossy(raw).into_owned())
                    .collect();
                let mut out = Vec::with_capacity(names.len() * 2);
                for (name, count) in self.pubsub.numsub(&names) {
                    out.push(Frame::Bulk(Bytes::from(name)));
                    out.push(Frame::Integer(count as i64));
                }
                Frame::Array(out)
            }
            // exact-name channels only; no pattern subscriptions exist
            "numpat" => Frame::Integer(0),
            other => Frame::err(format!("ERR Unknown PUBSUB subcommand '{other}'")),
        }
    }

    fn bg_rewrite_aof(self: &Arc<Self>) -> Frame {
        let Some(persister) = self.persister.clone() else {
            return Frame::err("ERR append only file is disabled");
        };
        if persister.is_rewriting() {
            return Frame::Simple("Background append only file rewriting doing".into());
        }

        let server = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            match persister.try_rewrite() {
                Ok(true) => server.reset_aof_baseline(),
                Ok(false) => {}
                Err(e) => error!("background rewrite failed: {e}"),
            }
        });
        Frame::Simple("Background append only file rewriting started".into())
    }

    async fn rewrite_aof(self: &Arc<Self>) -> Frame {
        let Some(persister) = self.persister.clone() else {
            return Frame::err("ERR append only file is disabled");
        };
        let server = Arc::clone(self);
        let result = tokio::task::spawn_blocking(move || {
            let result = persister.try_rewrite();
            if matches!(result, Ok(true)) {
                server.reset_aof_baseline();
            }
            result
        })
        .await;

        match result {
            Ok(Ok(_)) => Frame::ok(),
            Ok(Err(e)) => Frame::err(format!("ERR {e}")),
            Err(e) => Frame::err(format!("ERR rewrite task failed: {e}")),
        }
    }

    fn reset_aof_baseline(&self) {
        let size = std::fs::metadata(&self.config.aof_filename)
            .map(|m| m.len())
            .unwrap_or(0);
        self.aof_baseline.store(size, Ordering::Release);
    }

    /// Every 10 seconds, triggers a rewrite once the file has grown past
    /// `max(baseline * percentage / 100, min_size)`.
    fn spawn_auto_rewrite(self: &Arc<Self>) {
        let server = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(10));
            loop {
                ticker.tick().await;
                let Some(server) = server.upgrade() else { return };
                let Some(persister) = server.persister.clone() else { return };
                if persister.is_rewriting() {
                    continue;
                }

                let size = std::fs::metadata(&server.config.aof_filename)
                    .map(|m| m.len())
                    .unwrap_or(0);
                let baseline = server.aof_baseline.load(Ordering::Acquire);
                let threshold = (baseline * server.config.auto_aof_rewrite_percentage / 100)
                    .max(server.config.rewrite_min_bytes());
                if size <= threshold {
                    continue;
                }

                info!("auto aof rewrite triggered at {size} bytes (threshold {threshold})");
                let result =
                    tokio::task::spawn_blocking(move || persister.try_rewrite()).await;
                match result {
                    Ok(Ok(true)) => server.reset_aof_baseline(),
                    Ok(Ok(false)) => {}
                    Ok(Err(e)) => warn!("auto rewrite failed: {e}"),
                    Err(e) => warn!("auto rewrite task failed: {e}"),
                }
            }
        });
    }
}

fn start_multi(session: &mut Session, args: &[Bytes]) -> Frame {
    if !args.is_empty() {
        return Frame::arg_num_err("multi");
    }
    if session.tx.multi {
        return Frame::err("ERR MULTI calls can not be nested");
    }
    session.tx.multi = true;
    Frame::ok()
}

fn discard_multi(session: &mut Session, args: &[Bytes]) -> Frame {
    if !args.is_empty() {
        return Frame::arg_num_err("discard");
    }
    if !session.tx.multi {
        return Frame::err("ERR DISCARD without MULTI");
    }
    session.tx.reset_multi();
    session.tx.cancel_watching();
    Frame::ok()
}

fn unwatch(session: &mut Session, args: &[Bytes]) -> Frame {
    if session.tx.multi {
        return Frame::err("ERR UNWATCH inside MULTI is not allowed");
    }
    if !args.is_empty() {
        return Frame::arg_num_err("unwatch");
    }
    session.tx.cancel_watching();
    Frame::ok()
}
