//! Application state shared across handlers.

use std::sync::Arc;

use time::{Date, OffsetDateTime, UtcOffset};
use weatherstation_store::Store;

use crate::config::Config;

/// Source of "now" for ingestion defaults and today-relative ranges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Clock {
    /// The system clock.
    #[default]
    System,
    /// A frozen instant.
    Fixed(OffsetDateTime),
}

impl Clock {
    /// Current instant, expressed in `offset`.
    pub fn now(&self, offset: UtcOffset) -> OffsetDateTime {
        let now = match self {
            Clock::System => OffsetDateTime::now_utc(),
            Clock::Fixed(instant) => *instant,
        };
        now.to_offset(offset)
    }

    /// Current calendar date in `offset`.
    pub fn today(&self, offset: UtcOffset) -> Date {
        self.now(offset).date()
    }
}

/// Shared application state.
///
/// The store opens a connection per operation, so it is shared without a
/// lock and handed to blocking tasks as an `Arc`.
pub struct AppState {
    /// The data store.
    pub store: Arc<Store>,
    /// Configuration the server was started with.
    pub config: Config,
    /// Clock used for defaults.
    pub clock: Clock,
}

impl AppState {
    /// Create new application state on the system clock.
    pub fn new(store: Store, config: Config) -> Arc<Self> {
        Self::with_clock(store, config, Clock::System)
    }

    /// Create new application state with an explicit clock.
    pub fn with_clock(store: Store, config: Config, clock: Clock) -> Arc<Self> {
        Arc::new(Self {
            store: Arc::new(store),
            config,
            clock,
        })
    }

    /// Current instant in the store's offset.
    pub fn now(&self) -> OffsetDateTime {
        self.clock.now(self.store.offset())
    }

    /// Current calendar date in the store's offset.
    pub fn today(&self) -> Date {
        self.clock.today(self.store.offset())
    }
}
