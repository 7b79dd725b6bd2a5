use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use odds_core::{OddsRecord, SwapStore, RESERVED_BROKERS};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

/// Settings key of the persisted swap list.
pub const SWAP_KEY: &str = "swappedBrokers";

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct DbIngestRow {
    pub ts: DateTime<Utc>,
    pub peer: String,
    pub msg_type: String,
    pub ok: bool,
    pub note: String,
    pub raw_json: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DbRecordRow {
    pub ts: DateTime<Utc>,
    pub peer: String,
    pub broker: String,
    pub odds1: String,
    pub odds2: String,
    pub frozen: bool,
    pub map: Option<i64>,
    pub source_ts: i64,
}

impl DbRecordRow {
    pub fn from_record(rec: &OddsRecord, peer: &str) -> Self {
        Self {
            ts: Utc::now(),
            peer: peer.to_string(),
            broker: rec.broker.clone(),
            odds1: rec.odds[0].clone(),
            odds2: rec.odds[1].clone(),
            frozen: rec.frozen,
            map: rec.map,
            source_ts: rec.ts,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DbBrokerRemovedRow {
    pub ts: DateTime<Utc>,
    pub broker: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct DbArbRow {
    pub ts: DateTime<Utc>,
    pub signal: String,
    pub profit_pct: f64,
    pub side1_broker: String,
    pub side1_odds: f64,
    pub side2_broker: String,
    pub side2_odds: f64,
}

#[derive(Debug, Clone)]
pub struct DbHeartbeatRow {
    pub ts: DateTime<Utc>,
    pub connections: i64,
    pub records: i64,
    pub live_records: i64,
    pub stale: i64,
}

#[derive(Debug)]
pub enum DbMsg {
    Ingest(DbIngestRow),
    RecordUpsert(DbRecordRow),
    BrokerRemoved(DbBrokerRemovedRow),
    Arb(DbArbRow),
    Heartbeat(DbHeartbeatRow),
}

pub fn open_db(path: &str) -> Result<Connection> {
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let conn = Connection::open(db_path).context("open sqlite db")?;
    conn.pragma_update(None, "journal_mode", "WAL").ok();
    conn.pragma_update(None, "synchronous", "NORMAL").ok();
    conn.busy_timeout(Duration::from_secs(5)).ok();

    init_schema(&conn)?;
    Ok(conn)
}

pub fn spawn_db_writer(cfg: DbConfig) -> mpsc::Sender<DbMsg> {
    let (tx, mut rx) = mpsc::channel::<DbMsg>(10_000);

    std::thread::spawn(move || {
        let result: Result<()> = (|| {
            let conn = open_db(&cfg.path)?;

            while let Some(msg) = rx.blocking_recv() {
                if let Err(e) = apply_msg(&conn, msg) {
                    // DB must not kill the ingest pipeline
                    warn!("[odds-db] write failed: {e}");
                }
            }

            Ok(())
        })();

        if let Err(e) = result {
            warn!("[odds-db] fatal: {e:#}");
        }
    });

    tx
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS ingest_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ts TEXT NOT NULL,
            peer TEXT NOT NULL,
            msg_type TEXT NOT NULL,
            ok INTEGER NOT NULL,
            note TEXT NOT NULL,
            raw_json TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_ingest_ts ON ingest_events(ts);

        CREATE TABLE IF NOT EXISTS odds_state (
            broker TEXT PRIMARY KEY,
            ts TEXT NOT NULL,
            peer TEXT NOT NULL,
            odds1 TEXT NOT NULL,
            odds2 TEXT NOT NULL,
            frozen INTEGER NOT NULL,
            map INTEGER,
            source_ts INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS broker_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ts TEXT NOT NULL,
            broker TEXT NOT NULL,
            reason TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_broker_events_ts ON broker_events(ts);

        CREATE TABLE IF NOT EXISTS arb_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ts TEXT NOT NULL,
            signal TEXT NOT NULL,
            profit_pct REAL NOT NULL,
            side1_broker TEXT NOT NULL,
            side1_odds REAL NOT NULL,
            side2_broker TEXT NOT NULL,
            side2_odds REAL NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_arb_ts ON arb_events(ts);

        CREATE TABLE IF NOT EXISTS hub_heartbeat (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ts TEXT NOT NULL,
            connections INTEGER NOT NULL,
            records INTEGER NOT NULL,
            live_records INTEGER NOT NULL,
            stale INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_hb_ts ON hub_heartbeat(ts);

        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    ).context("init schema")?;

    Ok(())
}

fn apply_msg(conn: &Connection, msg: DbMsg) -> Result<()> {
    match msg {
        DbMsg::Ingest(r) => {
            conn.execute(
                "INSERT INTO ingest_events(ts, peer, msg_type, ok, note, raw_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![r.ts.to_rfc3339(), r.peer, r.msg_type, if r.ok { 1 } else { 0 }, r.note, r.raw_json],
            )?;
        }
        DbMsg::RecordUpsert(r) => {
            conn.execute(
                r#"
                INSERT INTO odds_state(broker, ts, peer, odds1, odds2, frozen, map, source_ts)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(broker) DO UPDATE SET
                    ts=excluded.ts,
                    peer=excluded.peer,
                    odds1=excluded.odds1,
                    odds2=excluded.odds2,
                    frozen=excluded.frozen,
                    map=excluded.map,
                    source_ts=excluded.source_ts
                "#,
                params![
                    r.broker,
                    r.ts.to_rfc3339(),
                    r.peer,
                    r.odds1,
                    r.odds2,
                    if r.frozen { 1 } else { 0 },
                    r.map,
                    r.source_ts,
                ],
            )?;
        }
        DbMsg::BrokerRemoved(r) => {
            // reference feeds are replayed from here at startup; only an
            // explicit close drops their row
            if !keeps_cached_row(&r) {
                conn.execute("DELETE FROM odds_state WHERE broker = ?1", params![r.broker])?;
            }
            conn.execute(
                "INSERT INTO broker_events(ts, broker, reason) VALUES (?1, ?2, ?3)",
                params![r.ts.to_rfc3339(), r.broker, r.reason],
            )?;
        }
        DbMsg::Arb(r) => {
            conn.execute(
                "INSERT INTO arb_events(ts, signal, profit_pct, side1_broker, side1_odds, side2_broker, side2_odds) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    r.ts.to_rfc3339(),
                    r.signal,
                    r.profit_pct,
                    r.side1_broker,
                    r.side1_odds,
                    r.side2_broker,
                    r.side2_odds,
                ],
            )?;
        }
        DbMsg::Heartbeat(r) => {
            conn.execute(
                "INSERT INTO hub_heartbeat(ts, connections, records, live_records, stale) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![r.ts.to_rfc3339(), r.connections, r.records, r.live_records, r.stale],
            )?;
        }
    }

    Ok(())
}

fn keeps_cached_row(r: &DbBrokerRemovedRow) -> bool {
    r.reason == "disconnect" && RESERVED_BROKERS.contains(&r.broker.as_str())
}

/// Last-known records from a previous run.
pub fn load_cached_records(conn: &Connection) -> Result<Vec<OddsRecord>> {
    let mut stmt = conn
        .prepare("SELECT broker, odds1, odds2, frozen, map, source_ts FROM odds_state ORDER BY broker")
        .context("prepare odds_state read")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(OddsRecord {
                broker: r.get(0)?,
                odds: [r.get(1)?, r.get(2)?],
                frozen: r.get::<_, i64>(3)? != 0,
                map: r.get(4)?,
                ts: r.get(5)?,
            })
        })
        .context("read odds_state")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Swap list kept under `settings[SWAP_KEY]` as a JSON array. Writes are
/// synchronous so a restart never reverts a confirmed correction.
pub struct SqliteSwapStore {
    conn: Connection,
}

impl SqliteSwapStore {
    pub fn open(path: &str) -> Result<Self> {
        Ok(Self { conn: open_db(path)? })
    }
}

impl SwapStore for SqliteSwapStore {
    fn load(&self) -> Result<Vec<String>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value_json FROM settings WHERE key = ?1",
                params![SWAP_KEY],
                |r| r.get(0),
            )
            .optional()
            .context("read swap list")?;

        match raw {
            Some(json) => serde_json::from_str(&json).context("decode swap list"),
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, brokers: &[String]) -> Result<()> {
        let json = serde_json::to_string(brokers)?;
        self.conn
            .execute(
                r#"
                INSERT INTO settings(key, value_json, updated_at) VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET value_json=excluded.value_json, updated_at=excluded.updated_at
                "#,
                params![SWAP_KEY, json, Utc::now().to_rfc3339()],
            )
            .context("write swap list")?;
        Ok(())
    }
}
