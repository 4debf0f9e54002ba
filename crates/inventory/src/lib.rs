//! Multi-warehouse inventory engine.
//!
//! Owns stock rows, time-bounded reservations, the append-only movement
//! ledger, the single-warehouse-first allocation policy, and the expiration
//! reaper. All counter changes go through conditional store primitives and
//! all status changes through compare-and-swap transitions, so lost races
//! surface as a `false` return instead of a lost update.

pub mod engine;
pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use engine::{
    AllocationStrategy, EngineConfig, ReaperOutcome, ReservationEngine, ReserveItem,
    ReserveOutcome, ReservedLine, ShipItem, UnavailableLine, ACTION_BACKORDER_OR_REDUCE,
};
pub use error::{InventoryError, Result};
pub use memory::InMemoryInventoryStore;
pub use model::{InventoryRow, Movement, MovementKind, Reservation, ReservationStatus};
pub use postgres::PostgresInventoryStore;
pub use store::{InsertOutcome, InventoryStore};
