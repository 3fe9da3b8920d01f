//! # Stock History
//!
//! Lazy, restartable walk over a part's transaction log.
//!
//! ```text
//! history(part 7, from, to)          nothing fetched yet
//!   .next() ──► page 1 (page_size rows, keyset after nothing)
//!   .next() ──► served from buffer
//!   ...
//!   .next() ──► page 2 (keyset after last yielded (date, id))
//!   .position() ──► HistoryPosition { transaction_date, id }   ── persist it
//!
//! later: history(part 7, from, to).resume(position)   continues exactly
//!        where the previous walk stopped, even if rows were appended since
//! ```
//! Pages are keyed on `(transaction_date, id)`, never on offsets, so rows
//! appended between pages neither shift nor duplicate what a walk yields.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use crate::repository::stock_transaction::StockTransactionRepository;
use garage_core::StockTransaction;

/// Resume token: the last transaction a walk yielded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPosition {
    pub transaction_date: DateTime<Utc>,
    pub id: i64,
}

impl From<&StockTransaction> for HistoryPosition {
    fn from(tx: &StockTransaction) -> Self {
        HistoryPosition {
            transaction_date: tx.transaction_date,
            id: tx.id,
        }
    }
}

/// A part's transactions ordered by `(transaction_date, id)`, fetched a page
/// at a time.
#[derive(Debug)]
pub struct StockHistory {
    pool: SqlitePool,
    part_id: i64,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    page_size: u32,
    buffer: VecDeque<StockTransaction>,
    position: Option<HistoryPosition>,
    exhausted: bool,
}

impl StockHistory {
    pub(crate) fn new(
        pool: SqlitePool,
        part_id: i64,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        page_size: u32,
    ) -> Self {
        StockHistory {
            pool,
            part_id,
            from,
            to,
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            position: None,
            exhausted: false,
        }
    }

    /// Restarts the walk strictly after `position`.
    pub fn resume(mut self, position: HistoryPosition) -> Self {
        self.position = Some(position);
        self.buffer.clear();
        self.exhausted = false;
        self
    }

    pub fn part_id(&self) -> i64 {
        self.part_id
    }

    /// The last yielded transaction, as a resume token.
    pub fn position(&self) -> Option<&HistoryPosition> {
        self.position.as_ref()
    }

    /// Yields the next transaction, fetching a page when the buffer is empty.
    pub async fn next(&mut self) -> DbResult<Option<StockTransaction>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_page().await?;
        }

        let next = self.buffer.pop_front();
        if let Some(tx) = &next {
            self.position = Some(HistoryPosition::from(tx));
        }
        Ok(next)
    }

    /// Drains the rest of the walk.
    pub async fn collect_all(mut self) -> DbResult<Vec<StockTransaction>> {
        let mut all = Vec::new();
        while let Some(tx) = self.next().await? {
            all.push(tx);
        }
        Ok(all)
    }

    async fn fetch_page(&mut self) -> DbResult<()> {
        let page = StockTransactionRepository::fetch_page(
            &self.pool,
            self.part_id,
            self.from,
            self.to,
            self.position.as_ref(),
            self.page_size,
        )
        .await?;

        debug!(
            part_id = self.part_id,
            rows = page.len(),
            after = ?self.position.as_ref().map(|p| p.id),
            "Fetched history page"
        );

        if page.len() < self.page_size as usize {
            self.exhausted = true;
        }
        self.buffer.extend(page);
        Ok(())
    }
}
