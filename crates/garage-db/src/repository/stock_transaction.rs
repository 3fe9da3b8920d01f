//! # Stock Transaction Repository
//!
//! Reads over the append-only quantity ledger. The only write is
//! [`StockTransactionRepository::append`], private to the crate and called
//! from inside ledger units of work; the schema triggers reject UPDATE and
//! DELETE on `stock_transactions` outright.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::ledger::history::HistoryPosition;
use garage_core::transaction::generate_transaction_number;
use garage_core::{NewStockTransaction, StockTransaction};

/// Repository for stock transactions.
#[derive(Debug, Clone)]
pub struct StockTransactionRepository {
    pool: SqlitePool,
}

impl StockTransactionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StockTransactionRepository { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<StockTransaction>> {
        let tx = sqlx::query_as::<_, StockTransaction>(
            "SELECT * FROM stock_transactions WHERE id = ? AND is_deleted = 0",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tx)
    }

    pub async fn get_by_number(&self, transaction_number: &str) -> DbResult<Option<StockTransaction>> {
        let tx = sqlx::query_as::<_, StockTransaction>(
            "SELECT * FROM stock_transactions WHERE transaction_number = ? AND is_deleted = 0",
        )
        .bind(transaction_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tx)
    }

    /// Transactions recorded against a service order, in ledger order.
    pub async fn for_order(&self, service_order_id: i64) -> DbResult<Vec<StockTransaction>> {
        let txs = sqlx::query_as::<_, StockTransaction>(
            r#"
            SELECT * FROM stock_transactions
            WHERE service_order_id = ? AND is_deleted = 0
            ORDER BY transaction_date, id
            "#,
        )
        .bind(service_order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(txs)
    }

    /// The part's most recent transaction.
    pub async fn last_for_part(&self, part_id: i64) -> DbResult<Option<StockTransaction>> {
        Self::fetch_last(&self.pool, part_id).await
    }

    pub async fn count_for_part(&self, part_id: i64) -> DbResult<i64> {
        let (count, _) = Self::chain_summary(&self.pool, part_id).await?;
        Ok(count)
    }

    // =========================================================================
    // Ledger-only access
    // =========================================================================

    pub(crate) async fn fetch_last<'e, E>(
        executor: E,
        part_id: i64,
    ) -> DbResult<Option<StockTransaction>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let tx = sqlx::query_as::<_, StockTransaction>(
            r#"
            SELECT * FROM stock_transactions
            WHERE part_id = ? AND is_deleted = 0
            ORDER BY transaction_date DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(part_id)
        .fetch_optional(executor)
        .await?;
        Ok(tx)
    }

    /// `(row count, Σ quantity_delta)` over the part's chain.
    pub(crate) async fn chain_summary<'e, E>(executor: E, part_id: i64) -> DbResult<(i64, i64)>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let summary = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*), COALESCE(SUM(quantity_delta), 0)
            FROM stock_transactions
            WHERE part_id = ? AND is_deleted = 0
            "#,
        )
        .bind(part_id)
        .fetch_one(executor)
        .await?;
        Ok(summary)
    }

    /// One keyset page of a part's history, ordered by `(transaction_date, id)`.
    ///
    /// `from` and `to` are inclusive bounds; `after` resumes strictly past a
    /// previously seen row.
    pub(crate) async fn fetch_page<'e, E>(
        executor: E,
        part_id: i64,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        after: Option<&HistoryPosition>,
        limit: u32,
    ) -> DbResult<Vec<StockTransaction>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, StockTransaction>(
            r#"
            SELECT * FROM stock_transactions
            WHERE part_id = ?1 AND is_deleted = 0
              AND (?2 IS NULL OR transaction_date >= ?2)
              AND (?3 IS NULL OR transaction_date <= ?3)
              AND (?4 IS NULL OR transaction_date > ?4 OR (transaction_date = ?4 AND id > ?5))
            ORDER BY transaction_date, id
            LIMIT ?6
            "#,
        )
        .bind(part_id)
        .bind(from)
        .bind(to)
        .bind(after.map(|p| p.transaction_date))
        .bind(after.map(|p| p.id))
        .bind(limit)
        .fetch_all(executor)
        .await?;
        Ok(rows)
    }

    /// Appends one ledger row. The only write path into the table.
    pub(crate) async fn append(
        conn: &mut SqliteConnection,
        new: &NewStockTransaction,
        now: DateTime<Utc>,
    ) -> DbResult<StockTransaction> {
        if !new.transaction_type.accepts_delta(new.quantity_delta) {
            return Err(DbError::Internal(format!(
                "{:?} transaction cannot carry delta {}",
                new.transaction_type, new.quantity_delta
            )));
        }

        let number = generate_transaction_number(new.transaction_date);
        let tx = sqlx::query_as::<_, StockTransaction>(
            r#"
            INSERT INTO stock_transactions (
                transaction_number, part_id, batch_id, transaction_type,
                quantity_delta, quantity_before, quantity_after,
                unit_cost_cents, unit_price_cents, transaction_date,
                supplier_id, service_order_id, reference_number, performed_by, notes,
                created_at, created_by
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&number)
        .bind(new.part_id)
        .bind(new.batch_id)
        .bind(new.transaction_type)
        .bind(new.quantity_delta)
        .bind(new.quantity_before)
        .bind(new.quantity_after())
        .bind(new.unit_cost_cents)
        .bind(new.unit_price_cents)
        .bind(new.transaction_date)
        .bind(new.supplier_id)
        .bind(new.service_order_id)
        .bind(&new.reference_number)
        .bind(&new.performed_by)
        .bind(&new.notes)
        .bind(now)
        .bind(&new.performed_by)
        .fetch_one(&mut *conn)
        .await?;

        debug!(
            transaction_number = %tx.transaction_number,
            part_id = tx.part_id,
            kind = ?tx.transaction_type,
            delta = tx.quantity_delta,
            after = tx.quantity_after,
            "Stock transaction appended"
        );
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_db, seed_part};
    use garage_core::{AllocationRequest, BatchSource, ReceiveBatch, TransactionType};

    #[tokio::test]
    async fn test_append_rejects_wrong_sign() {
        let db = memory_db().await;
        let part = seed_part(&db, "BLT-001").await;
        let mut conn = db.pool().acquire().await.unwrap();

        let bad = NewStockTransaction {
            part_id: part.id,
            batch_id: None,
            transaction_type: TransactionType::Issue,
            quantity_delta: 3,
            quantity_before: 0,
            unit_cost_cents: 0,
            unit_price_cents: None,
            transaction_date: Utc::now(),
            supplier_id: None,
            service_order_id: None,
            reference_number: None,
            performed_by: None,
            notes: None,
        };
        let err = StockTransactionRepository::append(&mut conn, &bad, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Internal(_)));
    }

    #[tokio::test]
    async fn test_reads_follow_ledger_order() {
        let db = memory_db().await;
        let part = seed_part(&db, "BLT-002").await;
        let ledger = db.ledger();
        ledger
            .receive_batch(ReceiveBatch::new(part.id, 6, 300, BatchSource::Purchase))
            .await
            .unwrap();
        ledger
            .allocate(AllocationRequest::new(part.id, 4, 42))
            .await
            .unwrap();

        let repo = db.transactions();
        assert_eq!(repo.count_for_part(part.id).await.unwrap(), 2);

        let last = repo.last_for_part(part.id).await.unwrap().unwrap();
        assert_eq!(last.transaction_type, TransactionType::Issue);
        assert_eq!((last.quantity_before, last.quantity_after), (6, 2));
        assert!(last.is_chain_consistent());

        let by_number = repo.get_by_number(&last.transaction_number).await.unwrap();
        assert_eq!(by_number.map(|t| t.id), Some(last.id));

        let order_txs = repo.for_order(42).await.unwrap();
        assert_eq!(order_txs.len(), 1);
        assert_eq!(order_txs[0].unit_cost_cents, 300);
    }
}
