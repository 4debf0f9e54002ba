//! Persistence seam for orders and idempotency records.
//!
//! Defines the [`OrderStore`] and [`IdempotencyStore`] traits together with
//! an in-memory implementation (default backend, also used by tests) and a
//! PostgreSQL implementation.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryIdempotencyStore, InMemoryOrderStore};
pub use postgres::{PostgresIdempotencyStore, PostgresOrderStore};
pub use store::{AcquireOutcome, IdempotencyRecord, IdempotencyStore, OrderStore, RecordState};
