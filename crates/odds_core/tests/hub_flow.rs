use std::cell::RefCell;
use std::rc::Rc;
use std::thread;

use odds_core::{
    HubEvent, HubSnapshot, MemorySwapStore, OddsHub, OddsRecord, OddsRegistry, RawSample,
    SwapOverlay, UpstreamBus,
};

fn sample(broker: &str, odds: [&str; 2], frozen: bool) -> HubEvent {
    let mut raw = RawSample::new(broker, odds, frozen);
    // fixed source time so hubs normalizing at different moments agree
    raw.ts = Some(serde_json::Value::from(1_700_000_000_000_i64));
    HubEvent::Sample(raw)
}

fn last_seen(hub: &mut OddsHub, name: &str) -> Rc<RefCell<Option<HubSnapshot>>> {
    let slot: Rc<RefCell<Option<HubSnapshot>>> = Rc::default();
    let sink = Rc::clone(&slot);
    let _sub = hub.subscribe(name, move |snap| {
        *sink.borrow_mut() = Some(snap.clone());
        Ok(())
    });
    slot
}

#[test]
fn registry_replaces_without_merging() {
    let mut reg = OddsRegistry::new();
    let first = OddsRecord::new("a", ["2.0", "1.9"], false).with_map(Some(1));
    let second = OddsRecord::new("a", ["1.5", "-"], true).with_ts(first.ts + 10);
    reg.upsert(first);
    reg.upsert(second.clone());
    assert_eq!(reg.get("a"), Some(&second));
}

#[test]
fn exclusion_and_last_live_record() {
    let mut hub = OddsHub::new("dash");
    hub.upsert(OddsRecord::new("frozen", ["9.0", "9.0"], true));
    hub.upsert(OddsRecord::new("dash", ["-", "7.1"], false));
    assert!(!hub.derived().has_mid);

    hub.upsert(OddsRecord::new("a", ["2.0", "1.9"], false));
    assert_eq!(hub.derived().mid, Some([2.0, 1.9]));
    assert_eq!(hub.derived().arb_profit_pct, None);

    hub.remove("a");
    assert!(!hub.derived().has_mid);
    assert_eq!(hub.derived().mid, None);
}

#[test]
fn independent_hubs_converge_on_same_state() {
    let bus = UpstreamBus::new(64);
    let mut dashboard = OddsHub::new("dashboard");
    let mut board = OddsHub::new("board");
    dashboard.start(&bus);

    let early = last_seen(&mut dashboard, "early");

    bus.publish(sample("a", ["2.0", "1.9"], false));
    board.start(&bus);
    bus.publish(sample("a", ["2.0", "1.9"], false));
    bus.publish(sample("b", ["1.95", "2.05"], false));
    bus.publish(sample("c", ["1.5", "2.5"], true));
    bus.publish(HubEvent::BrokersKnown(vec!["a".into(), "b".into()]));

    dashboard.pump();
    board.pump();
    let late = last_seen(&mut board, "late");

    let early = early.borrow().clone().unwrap();
    let late = late.borrow().clone().unwrap();
    assert_eq!(early.records, late.records);
    assert_eq!(early.derived, late.derived);

    let [m0, m1] = late.derived.mid.unwrap();
    assert!((m0 - 1.975).abs() < 1e-9);
    assert!((m1 - 1.975).abs() < 1e-9);
    assert!(late.record("c").is_none());
}

#[test]
fn persisted_swaps_reach_every_hub() {
    let bus = UpstreamBus::default();
    let store = MemorySwapStore::new(&[]);
    let mut owner = SwapOverlay::with_store(Box::new(store.clone())).unwrap();

    let mut panel = OddsHub::new("panel");
    panel.start(&bus);
    bus.publish(sample("a", ["2.0", "1.6"], false));

    assert!(owner.toggle("a").unwrap());
    bus.publish(HubEvent::SwapsUpdated(owner.list()));
    panel.pump();

    assert_eq!(store.saved(), vec!["a".to_string()]);
    assert_eq!(panel.snapshot().record("a").unwrap().odds[0], "1.6");

    // restart: a fresh overlay over the same store sees the correction
    let reloaded = SwapOverlay::with_store(Box::new(store)).unwrap();
    assert!(reloaded.is_swapped("a"));
}

#[test]
fn blocking_loop_ends_when_bus_is_dropped() {
    let bus = UpstreamBus::new(16);
    let rx = bus.subscribe();

    bus.publish(sample("a", ["2.0", "1.9"], false));
    bus.publish(HubEvent::BrokerRemoved("a".into()));
    bus.publish(sample("b", ["2.0", "1.9"], false));

    let worker = thread::spawn(move || {
        let mut hub = OddsHub::new("worker");
        hub.attach(rx);
        let handled = hub.run_blocking();
        let brokers: Vec<String> = hub.registry().brokers().map(str::to_string).collect();
        (handled, brokers)
    });
    drop(bus);

    let (handled, brokers) = worker.join().unwrap();
    assert_eq!(handled, 3);
    assert_eq!(brokers, vec!["b".to_string()]);
}
