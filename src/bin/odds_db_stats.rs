use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

fn main() -> Result<()> {
    let db_path = std::env::var("ODDS_DB_PATH").unwrap_or_else(|_| "data/odds.db".to_string());
    let conn = Connection::open(&db_path).with_context(|| format!("open db at {db_path}"))?;

    let tables = [
        "ingest_events",
        "odds_state",
        "broker_events",
        "arb_events",
        "hub_heartbeat",
    ];

    println!("db_path={db_path}");
    for t in tables {
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(1) FROM {t}"), [], |r| r.get(0))
            .with_context(|| format!("count {t}"))?;
        println!("{t}: {count}");
    }

    let last_hb: Option<(String, i64, i64, i64, i64)> = conn
        .query_row(
            "SELECT ts, connections, records, live_records, stale FROM hub_heartbeat ORDER BY ts DESC LIMIT 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )
        .optional()
        .context("read last heartbeat")?;

    if let Some((ts, connections, records, live_records, stale)) = last_hb {
        println!(
            "last_heartbeat: ts={ts} connections={connections} records={records} live_records={live_records} stale={stale}"
        );
    } else {
        println!("last_heartbeat: <none>");
    }

    let last_arb: Option<(String, String, f64, String, String)> = conn
        .query_row(
            "SELECT ts, signal, profit_pct, side1_broker, side2_broker FROM arb_events ORDER BY ts DESC LIMIT 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )
        .optional()
        .context("read last arb")?;

    match last_arb {
        Some((ts, signal, pct, b1, b2)) => println!("last_arb: ts={ts} {signal} {pct:.3}% ({b1} / {b2})"),
        None => println!("last_arb: <none>"),
    }

    let swaps: Option<String> = conn
        .query_row("SELECT value_json FROM settings WHERE key = 'swappedBrokers'", [], |r| r.get(0))
        .optional()
        .context("read swap list")?;
    println!("swapped: {}", swaps.as_deref().unwrap_or("[]"));

    Ok(())
}
