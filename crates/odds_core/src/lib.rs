//! OddsMoni: odds aggregation core
//!
//! Per-broker samples come in from heterogeneous extraction sources (in-page
//! scrapers, extension WebSocket bridges), get normalized into one record per
//! broker, and every mutation republishes a snapshot with mid-price and
//! cross-broker arbitrage derived from the live subset.
//!
//! Flow: `UpstreamBus` → `normalize` → `OddsRegistry` → `derive` → subscribers.
//! Each display surface owns its own `OddsHub`; the bus is the only thing
//! they share.

pub mod derive;
pub mod error;
pub mod hub;
pub mod normalize;
pub mod record;
pub mod registry;
pub mod swap;
pub mod upstream;

pub use derive::{derive, BestQuote, DerivedSnapshot};
pub use error::OddsError;
pub use hub::{HubSnapshot, OddsHub, Subscription};
pub use normalize::{classify, normalize, normalize_at, Ingest, RawSample};
pub use record::{
    default_excluded, parse_price, OddsRecord, DS_BROKER, EXCEL_BROKER, RESERVED_BROKERS,
    UNKNOWN_ODDS,
};
pub use registry::OddsRegistry;
pub use swap::{MemorySwapStore, SwapOverlay, SwapStore};
pub use upstream::{HubEvent, UpstreamBus};
