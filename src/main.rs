//! odds-hub: WS ingest for broker extraction sources + snapshot fan-out
//!
//! Extraction bridges (browser extension, in-page scrapers) push per-broker
//! odds samples; display surfaces (dashboard, detachable board, stats panel)
//! subscribe to snapshots. The primary hub runs on its own thread and derives
//! mid / arbitrage after every mutation.
//!
//! Run:
//!   $env:ODDS_HUB_BIND="0.0.0.0:9988"; cargo run --bin odds-hub
//!
//! Extension (example):
//!   const ws = new WebSocket('ws://127.0.0.1:9988');
//!   ws.send(JSON.stringify({type:'oddsUpdate', brokerId:'bet365', odds:['1.91','1.95'], frozen:false}))

use anyhow::{Context, Result};
use arb_detector::{ArbDetector, ArbSignal};
use chrono::Utc;
use dotenv::dotenv;
use futures_util::{SinkExt, StreamExt};
use logger::{now_iso, BrokerRemovedEvent, EventLogger, HubHeartbeatEvent, OddsIngestEvent, SwapChangedEvent};
use odds_core::{
    classify, HubEvent, HubSnapshot, Ingest, OddsHub, RawSample, SwapOverlay, UpstreamBus,
    EXCEL_BROKER,
};
use std::fs::File;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod config;
mod odds_db;
mod owners;
mod protocol;

use config::HubConfig;
use odds_db::{
    spawn_db_writer,
    DbArbRow,
    DbBrokerRemovedRow,
    DbConfig,
    DbHeartbeatRow,
    DbIngestRow,
    DbMsg,
    DbRecordRow,
    SqliteSwapStore,
};
use owners::{BrokerOwners, ConnId};
use protocol::{encode, ClientMessage, ServerMessage};

#[derive(Clone)]
struct HubState {
    bus:         UpstreamBus,
    /// Pre-encoded snapshot frames for subscribed WS clients.
    frames:      broadcast::Sender<Arc<str>>,
    latest:      watch::Receiver<Arc<HubSnapshot>>,
    /// Process-wide persisted swap list; hubs only see broadcast copies.
    swaps:       Arc<Mutex<SwapOverlay>>,
    connections: Arc<RwLock<usize>>,
    /// Broker -> connection that sent its latest sample.
    owners:      Arc<Mutex<BrokerOwners>>,
    next_conn:   Arc<AtomicU64>,
    logger:      Arc<EventLogger>,
    db_tx:       mpsc::Sender<DbMsg>,
}

/// Per-connection bookkeeping.
struct ConnState {
    id:     ConnId,
    peer:   SocketAddr,
    frames: Option<broadcast::Receiver<Arc<str>>>,
}

impl ConnState {
    fn open(state: &HubState, peer: SocketAddr) -> Self {
        let id = state.next_conn.fetch_add(1, Ordering::Relaxed);
        Self { id, peer, frames: None }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn arb_row(signal: &ArbSignal) -> DbArbRow {
    let (name, opp) = match signal {
        ArbSignal::Opened(o) => ("opened", o),
        ArbSignal::Changed(o) => ("changed", o),
        ArbSignal::Closed { last, .. } => ("closed", last),
    };
    DbArbRow {
        ts: Utc::now(),
        signal: name.to_string(),
        profit_pct: opp.profit_pct,
        side1_broker: opp.side1.broker.clone(),
        side1_odds: opp.side1.price,
        side2_broker: opp.side2.broker.clone(),
        side2_odds: opp.side2.price,
    }
}

struct PrimaryHub {
    rx:            broadcast::Receiver<HubEvent>,
    initial_swaps: Vec<String>,
    excluded:      Vec<String>,
    log_dir:       String,
    arb_min_pct:   f64,
    frames:        broadcast::Sender<Arc<str>>,
    latest:        watch::Sender<Arc<HubSnapshot>>,
    db_tx:         mpsc::Sender<DbMsg>,
}

/// The hub is `!Send`; it is built and driven entirely on its own thread.
fn spawn_primary_hub(ctx: PrimaryHub) -> Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("odds-hub-primary".to_string())
        .spawn(move || {
            let PrimaryHub { rx, initial_swaps, excluded, log_dir, arb_min_pct, frames, latest, db_tx } = ctx;

            let mut swaps = SwapOverlay::in_memory();
            if let Err(e) = swaps.replace_all(&initial_swaps) {
                warn!("initial swap list not applied: {e}");
            }
            let mut hub = OddsHub::new("primary").with_swaps(swaps).with_excluded(&excluded);

            let mut arb = ArbDetector::new(log_dir, arb_min_pct);
            let _arb = hub.subscribe("arb", move |snap| {
                if let Some(signal) = arb.observe(snap) {
                    let _ = db_tx.try_send(DbMsg::Arb(arb_row(&signal)));
                }
                Ok(())
            });

            let _publish = hub.subscribe("publish", move |snap| {
                latest.send_replace(Arc::new(snap.clone()));
                // no subscribed client is not an error
                let _ = frames.send(Arc::from(encode(&ServerMessage::Snapshot(snap))));
                Ok(())
            });

            hub.attach(rx);
            let handled = hub.run_blocking();
            info!("primary hub stopped after {} event(s)", handled);
        })
        .context("spawn hub thread")
}

// ── HTTP (read-only) ─────────────────────────────────────────────────────────

async fn handle_http_connection(mut stream: TcpStream, state: HubState) -> Result<()> {
    let mut buf = vec![0u8; 8192];
    let n = stream.read(&mut buf).await.context("http read")?;
    if n == 0 {
        return Ok(());
    }

    let req = String::from_utf8_lossy(&buf[..n]);
    let first_line = req.lines().next().unwrap_or_default();
    let mut parts = first_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("");

    let (status_line, content_type, body) = match (method, path) {
        ("GET", "/health") => ("HTTP/1.1 200 OK", "text/plain; charset=utf-8", "ok".to_string()),
        ("GET", "/state") => {
            let snap = state.latest.borrow().clone();
            let json = serde_json::to_string_pretty(&*snap).unwrap_or_else(|_| "{}".to_string());
            ("HTTP/1.1 200 OK", "application/json; charset=utf-8", json)
        }
        ("GET", "/swaps") => {
            let list = state.swaps.lock().await.list();
            let json = serde_json::to_string(&list).unwrap_or_else(|_| "[]".to_string());
            ("HTTP/1.1 200 OK", "application/json; charset=utf-8", json)
        }
        _ => (
            "HTTP/1.1 404 Not Found",
            "text/plain; charset=utf-8",
            "not found".to_string(),
        ),
    };

    let resp = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.as_bytes().len(),
        body
    );
    stream.write_all(resp.as_bytes()).await.context("http write")?;
    Ok(())
}

async fn start_http_server(state: HubState, bind: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(bind).await.context("http bind")?;
    info!("odds-hub http listening on http://{} (GET /health, /state, /swaps)", bind);

    loop {
        let (stream, peer) = listener.accept().await.context("http accept")?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_http_connection(stream, state).await {
                debug!("http handler err {}: {}", peer, e);
            }
        });
    }
}

// ── WS ───────────────────────────────────────────────────────────────────────

async fn next_frame(rx: &mut Option<broadcast::Receiver<Arc<str>>>) -> Result<Arc<str>, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn broker_removed(state: &HubState, broker: &str, reason: &'static str) {
    state.bus.publish(HubEvent::BrokerRemoved(broker.to_string()));
    let _ = state.logger.log(&BrokerRemovedEvent {
        ts: now_iso(),
        event: "BROKER_REMOVED",
        broker: broker.to_string(),
        reason,
    });
    let _ = state.db_tx.try_send(DbMsg::BrokerRemoved(DbBrokerRemovedRow {
        ts: Utc::now(),
        broker: broker.to_string(),
        reason: reason.to_string(),
    }));
}

/// Resolve a swap command against the persisted list, then broadcast the
/// full list to every hub.
async fn apply_swap(state: &HubState, broker: &str, want: Option<bool>) -> Result<Vec<String>> {
    let (now, list) = {
        let mut swaps = state.swaps.lock().await;
        let now = match want {
            Some(w) => {
                swaps.set(broker, w)?;
                swaps.is_swapped(broker)
            }
            None => swaps.toggle(broker)?,
        };
        (now, swaps.list())
    };

    state.bus.publish(HubEvent::SwapsUpdated(list.clone()));
    let _ = state.logger.log(&SwapChangedEvent {
        ts: now_iso(),
        event: "SWAP_CHANGED",
        broker: broker.to_string(),
        swapped: now,
        list: list.clone(),
    });
    info!("swap {} -> {} ({} swapped)", broker, now, list.len());
    Ok(list)
}

/// Outcome of one inbound text frame.
struct Reply {
    kind:  &'static str,
    ok:    bool,
    note:  String,
    /// Sent instead of the plain ack.
    frame: Option<String>,
}

impl Reply {
    fn ack(kind: &'static str, ok: bool, note: impl Into<String>) -> Self {
        Self { kind, ok, note: note.into(), frame: None }
    }

    fn with_frame(mut self, frame: String) -> Self {
        self.frame = Some(frame);
        self
    }
}

async fn handle_text(txt: &str, state: &HubState, conn: &mut ConnState) -> Reply {
    let msg: ClientMessage = match serde_json::from_str(txt) {
        Ok(m) => m,
        Err(e) => return Reply::ack("invalid", false, format!("parse_error:{}", e)),
    };
    let kind = msg.kind();

    match msg {
        ClientMessage::Handshake { extension, version } => {
            info!("handshake from {}: extension={:?} version={:?}", conn.peer, extension, version);
            Reply::ack(kind, true, "handshake")
                .with_frame(encode(&ServerMessage::HandshakeAck { timestamp: now_ms() }))
        }
        ClientMessage::OddsUpdate(raw) => match classify(&raw) {
            Some(Ingest::Upsert(rec)) => {
                state.owners.lock().await.claim(&rec.broker, conn.id);
                let _ = state
                    .db_tx
                    .try_send(DbMsg::RecordUpsert(DbRecordRow::from_record(&rec, &conn.peer.to_string())));
                state.bus.publish(HubEvent::Sample(raw));
                Reply::ack(kind, true, format!("odds_ingested:{}", rec.broker))
            }
            Some(Ingest::Remove(broker)) => {
                state.owners.lock().await.forget(&broker);
                broker_removed(state, &broker, "closed");
                Reply::ack(kind, true, format!("broker_removed:{}", broker))
            }
            None => Reply::ack(kind, false, "odds_rejected:no_broker"),
        },
        ClientMessage::BrokerClosed { id } => {
            let id = id.trim().to_string();
            if id.is_empty() {
                return Reply::ack(kind, false, "broker_closed:empty_id");
            }
            state.owners.lock().await.forget(&id);
            broker_removed(state, &id, "closed");
            Reply::ack(kind, true, format!("broker_removed:{}", id))
        }
        ClientMessage::BrokersSync { ids } => {
            let released = state.owners.lock().await.sync(&ids);
            debug!("{} brokersSync: {} id(s), {} claim(s) released", conn.peer, ids.len(), released);
            let n = ids.len();
            state.bus.publish(HubEvent::BrokersKnown(ids));
            Reply::ack(kind, true, format!("brokers_synced:{}", n))
        }
        ClientMessage::SwapGet => {
            let list = state.swaps.lock().await.list();
            Reply::ack(kind, true, "swap_list").with_frame(encode(&ServerMessage::SwapList { brokers: &list }))
        }
        ClientMessage::SwapSet { broker, swapped } => match apply_swap(state, &broker, Some(swapped)).await {
            Ok(list) => Reply::ack(kind, true, "swap_set").with_frame(encode(&ServerMessage::SwapList { brokers: &list })),
            Err(e) => Reply::ack(kind, false, format!("swap_failed:{e:#}")),
        },
        ClientMessage::SwapToggle { broker } => match apply_swap(state, &broker, None).await {
            Ok(list) => Reply::ack(kind, true, "swap_toggled").with_frame(encode(&ServerMessage::SwapList { brokers: &list })),
            Err(e) => Reply::ack(kind, false, format!("swap_failed:{e:#}")),
        },
        ClientMessage::Subscribe => {
            // subscribe before reading the current snapshot: a duplicate is
            // possible, a gap is not
            conn.frames = Some(state.frames.subscribe());
            let snap = state.latest.borrow().clone();
            Reply::ack(kind, true, "subscribed").with_frame(encode(&ServerMessage::Snapshot(&snap)))
        }
        ClientMessage::Ping => {
            Reply::ack(kind, true, "ping").with_frame(encode(&ServerMessage::Pong { timestamp: now_ms() }))
        }
        ClientMessage::Pong => Reply::ack(kind, true, "pong"),
    }
}

/// A dead source must not leave ghost rows behind: every broker this
/// connection still owns is removed. Brokers another connection has since
/// fed are left alone.
async fn release_connection(state: &HubState, conn: &ConnState) -> Vec<String> {
    let orphaned = state.owners.lock().await.disconnect(conn.id);
    for broker in &orphaned {
        broker_removed(state, broker, "disconnect");
    }
    orphaned
}

async fn handle_socket(peer: SocketAddr, stream: TcpStream, state: HubState) -> Result<()> {
    let ws_stream = accept_async(stream).await.context("WS handshake failed")?;

    {
        let mut c = state.connections.write().await;
        *c += 1;
    }

    let mut conn = ConnState::open(&state, peer);
    info!("WS client connected: {} (conn #{})", peer, conn.id);

    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    let welcome = encode(&ServerMessage::Welcome {
        message: "Connected to OddsMoni odds-hub",
        timestamp: now_ms(),
    });
    let _ = ws_sink.send(Message::Text(welcome.into())).await;

    loop {
        let msg = tokio::select! {
            incoming = ws_stream.next() => match incoming {
                Some(Ok(m)) => m,
                Some(Err(e)) => {
                    warn!("WS recv err from {}: {}", peer, e);
                    break;
                }
                None => break,
            },
            pushed = next_frame(&mut conn.frames) => {
                match pushed {
                    Ok(frame) => {
                        if ws_sink.send(Message::Text(frame.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => debug!("{} skipped {} snapshot(s)", peer, n),
                    Err(RecvError::Closed) => conn.frames = None,
                }
                continue;
            }
        };

        match msg {
            Message::Text(txt) => {
                let txt = txt.to_string();
                let reply = handle_text(&txt, &state, &mut conn).await;

                let ingest = OddsIngestEvent {
                    ts: now_iso(),
                    event: "FEED_INGEST",
                    peer: peer.to_string(),
                    msg_type: reply.kind.to_string(),
                    ok: reply.ok,
                    note: reply.note.clone(),
                };
                let _ = state.logger.log(&ingest);

                let _ = state.db_tx.try_send(DbMsg::Ingest(DbIngestRow {
                    ts: Utc::now(),
                    peer: peer.to_string(),
                    msg_type: reply.kind.to_string(),
                    ok: reply.ok,
                    note: reply.note.clone(),
                    raw_json: Some(txt.clone()),
                }));

                let out = match reply.frame {
                    Some(frame) => frame,
                    None => encode(&ServerMessage::Ack { ok: reply.ok, note: &reply.note }),
                };
                let _ = ws_sink.send(Message::Text(out.into())).await;
            }
            Message::Ping(payload) => {
                let _ = ws_sink.send(Message::Pong(payload)).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    let orphaned = release_connection(&state, &conn).await;
    info!("WS client disconnected: {} ({} broker(s) released)", peer, orphaned.len());
    {
        let mut c = state.connections.write().await;
        *c = c.saturating_sub(1);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = HubConfig::from_env()?;

    // Single instance lock
    let lock_file_path = std::env::temp_dir().join("oddsmoni_hub.lock");
    let lock_file = File::create(&lock_file_path)
        .with_context(|| format!("create lock file {:?}", lock_file_path))?;
    let mut lock = fd_lock::RwLock::new(lock_file);
    let _write_guard = match lock.try_write() {
        Ok(guard) => guard,
        Err(_) => {
            warn!("Another odds-hub instance is already running! Exiting.");
            return Ok(());
        }
    };

    let logger = Arc::new(EventLogger::new(&cfg.log_dir));
    info!("odds-hub DB: {}, logs: {}", cfg.db_path, cfg.log_dir);
    let db_tx = spawn_db_writer(DbConfig { path: cfg.db_path.clone() });

    let swaps = SwapOverlay::with_store(Box::new(SqliteSwapStore::open(&cfg.db_path)?))
        .context("load swap list")?;
    let initial_swaps = swaps.list();
    info!("swapped brokers: {:?}", initial_swaps);

    let cached = odds_db::open_db(&cfg.db_path)
        .and_then(|conn| odds_db::load_cached_records(&conn))
        .unwrap_or_else(|e| {
            warn!("record cache unavailable: {e:#}");
            Vec::new()
        });

    let bus = UpstreamBus::default();
    let (frames_tx, _) = broadcast::channel::<Arc<str>>(256);
    let (latest_tx, latest_rx) = watch::channel(Arc::new(HubSnapshot::default()));

    spawn_primary_hub(PrimaryHub {
        rx:            bus.subscribe(),
        initial_swaps,
        excluded:      cfg.excluded.clone(),
        log_dir:       cfg.log_dir.clone(),
        arb_min_pct:   cfg.arb_min_pct,
        frames:        frames_tx.clone(),
        latest:        latest_tx,
        db_tx:         db_tx.clone(),
    })?;

    // Reference odds survive restarts; everything else must be re-scraped
    for rec in cached.iter().filter(|r| r.broker == EXCEL_BROKER) {
        info!("replaying cached {} odds {:?}", rec.broker, rec.odds);
        bus.publish(HubEvent::Sample(RawSample::from(rec)));
    }

    let state = HubState {
        bus,
        frames: frames_tx,
        latest: latest_rx,
        swaps: Arc::new(Mutex::new(swaps)),
        connections: Arc::new(RwLock::new(0)),
        owners: Arc::new(Mutex::new(BrokerOwners::default())),
        next_conn: Arc::new(AtomicU64::new(1)),
        logger: Arc::clone(&logger),
        db_tx: db_tx.clone(),
    };

    // Read-only HTTP state endpoint
    {
        let state = state.clone();
        let http_addr = cfg.http_bind;
        tokio::spawn(async move {
            if let Err(e) = start_http_server(state, http_addr).await {
                warn!("http server stopped: {e}");
            }
        });
    }

    // Heartbeat summary
    {
        let state = state.clone();
        let every = Duration::from_secs(cfg.heartbeat_secs);
        let stale_ms = cfg.stale_secs * 1000;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(every).await;

                let connections = *state.connections.read().await;
                let owned = state.owners.lock().await.len();
                let snap = state.latest.borrow().clone();
                let cutoff = now_ms() - stale_ms;
                let stale = snap.records.iter().filter(|r| r.ts < cutoff).count();

                let hb = HubHeartbeatEvent {
                    ts: now_iso(),
                    event: "ODDS_HUB_HEARTBEAT",
                    connections,
                    records: snap.records.len(),
                    live_records: snap.live_count(),
                    stale,
                    arb_open: snap.derived.has_arb(),
                };

                let _ = state.logger.log(&hb);
                let _ = state.db_tx.try_send(DbMsg::Heartbeat(DbHeartbeatRow {
                    ts: Utc::now(),
                    connections: hb.connections as i64,
                    records: hb.records as i64,
                    live_records: hb.live_records as i64,
                    stale: hb.stale as i64,
                }));
                info!(
                    "HB: conns={}, records={}, live={}, stale={}, arb_open={}, fed={}",
                    hb.connections, hb.records, hb.live_records, hb.stale, hb.arb_open, owned
                );
            }
        });
    }

    let listener = TcpListener::bind(cfg.ws_bind).await.context("bind failed")?;
    info!("odds-hub listening on ws://{}", cfg.ws_bind);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(a) => a,
                    Err(e) => {
                        warn!("accept failed: {}", e);
                        continue;
                    }
                };
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_socket(peer, stream, state).await {
                        debug!("socket handler err {}: {}", peer, e);
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c, shutting down");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    struct Harness {
        state:  HubState,
        events: broadcast::Receiver<HubEvent>,
        db_rx:  mpsc::Receiver<DbMsg>,
        _dir:   tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let bus = UpstreamBus::new(64);
        let events = bus.subscribe();
        let (frames, _) = broadcast::channel(8);
        let (_latest_tx, latest) = watch::channel(Arc::new(HubSnapshot::default()));
        let (db_tx, db_rx) = mpsc::channel(256);
        let state = HubState {
            bus,
            frames,
            latest,
            swaps: Arc::new(Mutex::new(SwapOverlay::in_memory())),
            connections: Arc::new(RwLock::new(0)),
            owners: Arc::new(Mutex::new(BrokerOwners::default())),
            next_conn: Arc::new(AtomicU64::new(1)),
            logger: Arc::new(EventLogger::new(dir.path())),
            db_tx,
        };
        Harness { state, events, db_rx, _dir: dir }
    }

    fn connect(state: &HubState) -> ConnState {
        ConnState::open(state, "127.0.0.1:40000".parse().unwrap())
    }

    fn odds(broker: &str) -> String {
        format!(r#"{{"type":"oddsUpdate","brokerId":"{broker}","odds":["1.9","2.0"],"frozen":false}}"#)
    }

    fn removed(rx: &mut broadcast::Receiver<HubEvent>) -> Vec<String> {
        let mut out = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(HubEvent::BrokerRemoved(b)) => out.push(b),
                Ok(_) => {}
                Err(TryRecvError::Lagged(_)) => {}
                Err(_) => return out,
            }
        }
    }

    #[tokio::test]
    async fn disconnect_removes_every_broker_the_connection_fed() {
        let mut h = harness();
        let mut conn = connect(&h.state);
        for b in ["gg", "bet365"] {
            let reply = handle_text(&odds(b), &h.state, &mut conn).await;
            assert!(reply.ok);
            assert_eq!(reply.kind, "oddsUpdate");
        }
        assert!(removed(&mut h.events).is_empty());

        let orphaned = release_connection(&h.state, &conn).await;
        assert_eq!(orphaned, vec!["bet365".to_string(), "gg".to_string()]);
        assert_eq!(removed(&mut h.events), orphaned);

        let mut reasons = Vec::new();
        while let Ok(msg) = h.db_rx.try_recv() {
            if let DbMsg::BrokerRemoved(r) = msg {
                reasons.push(r.reason);
            }
        }
        assert_eq!(reasons, vec!["disconnect".to_string(), "disconnect".to_string()]);
    }

    #[tokio::test]
    async fn late_close_of_old_socket_spares_reconnected_feed() {
        let mut h = harness();
        let mut old = connect(&h.state);
        let mut new = connect(&h.state);
        assert_ne!(old.id, new.id);

        handle_text(&odds("bet365"), &h.state, &mut old).await;
        handle_text(&odds("bet365"), &h.state, &mut new).await;

        assert!(release_connection(&h.state, &old).await.is_empty());
        assert!(removed(&mut h.events).is_empty());

        assert_eq!(release_connection(&h.state, &new).await, vec!["bet365".to_string()]);
        assert_eq!(removed(&mut h.events), vec!["bet365".to_string()]);
    }

    #[tokio::test]
    async fn close_and_sync_update_what_a_disconnect_releases() {
        let mut h = harness();
        let mut conn = connect(&h.state);
        for b in ["a", "b", "c"] {
            handle_text(&odds(b), &h.state, &mut conn).await;
        }

        let reply = handle_text(r#"{"type":"brokerClosed","id":" a "}"#, &h.state, &mut conn).await;
        assert_eq!(reply.note, "broker_removed:a");
        assert_eq!(removed(&mut h.events), vec!["a".to_string()]);

        let reply = handle_text(r#"{"type":"brokersSync","ids":["b"]}"#, &h.state, &mut conn).await;
        assert_eq!(reply.kind, "brokersSync");
        assert!(reply.ok);

        assert_eq!(release_connection(&h.state, &conn).await, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn bad_frames_are_acked_with_their_kind() {
        let h = harness();
        let mut conn = connect(&h.state);

        let reply = handle_text("not json", &h.state, &mut conn).await;
        assert_eq!(reply.kind, "invalid");
        assert!(!reply.ok);
        assert!(reply.note.starts_with("parse_error:"));

        let reply = handle_text(r#"{"type":"oddsUpdate","odds":["1","2"]}"#, &h.state, &mut conn).await;
        assert_eq!((reply.kind, reply.ok), ("oddsUpdate", false));
        assert!(release_connection(&h.state, &conn).await.is_empty());

        let reply = handle_text(r#"{"type":"ping"}"#, &h.state, &mut conn).await;
        assert_eq!(reply.kind, "ping");
        assert!(reply.frame.unwrap().contains(r#""type":"pong""#));
    }
}
