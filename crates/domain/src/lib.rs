//! Order domain model.
//!
//! Holds the order aggregate and its line items, the status state machines,
//! request validation, and the totals calculator that produces the
//! tamper-evident signature stored on every order.

pub mod error;
pub mod order;
pub mod status;
pub mod totals;

pub use error::DomainError;
pub use order::{Order, OrderItem, OrderLine, validate_lines};
pub use status::{LineStatus, OrderStatus, PaymentStatus};
pub use totals::{PricedLine, TotalsBreakdown, TotalsConfig};
