//! # Repository Module
//!
//! Database repository implementations for the inventory schema.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Who Writes What                                      │
//! │                                                                         │
//! │  Collaborator                                                          │
//! │       │                                                                 │
//! │       ├── db.parts().search("brake", 20)       catalog reads/edits     │
//! │       ├── db.warehouses().create_bin(..)       topology                │
//! │       ├── db.batches().list_for_part(7)        ledger reads            │
//! │       │                                                                 │
//! │       └── db.ledger().allocate(..)             quantity changes        │
//! │                  │                                                      │
//! │                  │ holds the part lock + one SQLite transaction         │
//! │                  ▼                                                      │
//! │           crate-private writers on the repositories:                   │
//! │           PartRepository::touch_for_update / write_stock_totals        │
//! │           BatchRepository::insert / decrement / increment              │
//! │           UsageRepository::insert / credit_return                      │
//! │           StockTransactionRepository::append                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Public methods run against the pool. Crate-private functions take an
//! executor or a `&mut SqliteConnection` so the ledger can run them inside
//! its transaction.
//!
//! ## Available Repositories
//!
//! - [`PartRepository`] - Catalog CRUD, search, units of measure
//! - [`WarehouseRepository`] - Warehouses, zones, bins, defaults
//! - [`BatchRepository`] - Inventory batches
//! - [`UsageRepository`] - Batch usages against service orders
//! - [`StockTransactionRepository`] - Append-only transaction log
//! - [`StockCheckRepository`] - Counting sessions and recorded counts

pub mod batch;
pub mod part;
pub mod stock_check;
pub mod stock_transaction;
pub mod usage;
pub mod warehouse;

pub use batch::BatchRepository;
pub use part::PartRepository;
pub use stock_check::StockCheckRepository;
pub use stock_transaction::StockTransactionRepository;
pub use usage::UsageRepository;
pub use warehouse::WarehouseRepository;

/// Escapes `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
pub(crate) fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("brake"), "%brake%");
        assert_eq!(like_pattern("10%_off"), "%10\\%\\_off%");
    }
}
