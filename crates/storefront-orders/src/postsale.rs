//! # Post-Sale Adjusters
//!
//! Cancellations before delivery, returns after it. Both restore stock on
//! their final transition and never touch the order lines they reference.
//!
//! ## Lifecycles
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CANCELLATION                                                           │
//! │    pending ──approve──► approved   delivery → cancelled, stock restored │
//! │       │                            (one transaction)                    │
//! │       └────reject────► rejected    no side effects                      │
//! │                                                                         │
//! │  RETURN                                                                 │
//! │    pending ──approve──► approved ──(delay, worker)──► returned          │
//! │       │                    │                          stock restored    │
//! │       │                    └─ restock task written in the same tx       │
//! │       └────reject────► rejected                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Requested quantities are checked up front for a readable rejection, and
//! again by the bounded insert so concurrent requests cannot over-claim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use storefront_core::postsale::{
    ensure_cancellable, ensure_cancellation_quantity, ensure_committed, ensure_return_quantity,
    ensure_returnable, remaining_quantity,
};
use storefront_core::validation::{validate_id, validate_quantity, validate_reason};
use storefront_core::{
    Cancellation, CancellationStatus, Order, OrderLine, Rejection, ReturnRequest, ReturnStatus, TaskKind,
};
use storefront_db::repository::task::new_task;
use storefront_db::{CancellationApproval, Claim, Database, NewClaim};

use crate::error::{ServiceError, ServiceResult};

/// Payload of a [`TaskKind::ReturnRestock`] task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockPayload {
    pub return_id: i64,
}

async fn load_order(db: &Database, order_id: i64) -> ServiceResult<Order> {
    db.orders()
        .get_by_id(order_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Order", order_id))
}

async fn load_line(db: &Database, order_id: i64, book_id: i64) -> ServiceResult<OrderLine> {
    db.orders()
        .line(order_id, book_id)
        .await?
        .ok_or_else(|| Rejection::LineNotInOrder { order_id, book_id }.into())
}

// =============================================================================
// Cancellations
// =============================================================================

#[derive(Debug, Clone)]
pub struct CancellationService {
    db: Database,
}

impl CancellationService {
    pub fn new(db: Database) -> Self {
        CancellationService { db }
    }

    pub async fn request_cancellation(
        &self,
        order_id: i64,
        book_id: i64,
        quantity: i64,
        reason: &str,
        other_reason: Option<&str>,
    ) -> ServiceResult<Cancellation> {
        validate_id("order_id", order_id)?;
        validate_quantity(quantity)?;
        validate_reason(reason, other_reason)?;

        let order = load_order(&self.db, order_id).await?;
        ensure_committed(&order)?;

        let delivery = self
            .db
            .deliveries()
            .get(order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Delivery", order_id))?;
        ensure_cancellable(order_id, delivery.state)?;

        let line = load_line(&self.db, order_id, book_id).await?;
        let claimed = self.db.cancellations().claimed_quantity(order_id, book_id).await?;
        ensure_cancellation_quantity(quantity, line.quantity, claimed)?;

        let claim = NewClaim {
            order_id,
            book_id,
            quantity,
            reason,
            other_reason,
            ordered: line.quantity,
            at: Utc::now(),
        };

        match self.db.cancellations().insert_bounded(&claim).await? {
            Claim::Created(cancellation) => {
                info!(cancellation_id = cancellation.id, order_id, book_id, quantity, "Cancellation requested");
                Ok(cancellation)
            }
            Claim::Exceeded { remaining } => Err(Rejection::CancellationQuantityExceeded {
                requested: quantity,
                remaining,
            }
            .into()),
        }
    }

    /// Approves a pending cancellation: delivery cancelled and stock restored.
    pub async fn approve(&self, cancellation_id: i64) -> ServiceResult<Cancellation> {
        let existing = self
            .db
            .cancellations()
            .get_by_id(cancellation_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Cancellation", cancellation_id))?;

        match self.db.cancellations().approve(cancellation_id, Utc::now()).await? {
            CancellationApproval::Approved(cancellation) => {
                info!(
                    cancellation_id,
                    order_id = cancellation.order_id,
                    book_id = cancellation.book_id,
                    quantity = cancellation.quantity,
                    "Cancellation approved"
                );
                Ok(cancellation)
            }
            CancellationApproval::OrderDelivered => Err(Rejection::OrderAlreadyDelivered {
                order_id: existing.order_id,
            }
            .into()),
            CancellationApproval::NotPending => {
                let current = self.current(cancellation_id).await?;
                Err(
                    Rejection::invalid_transition("cancellation", current.status, CancellationStatus::Approved)
                        .into(),
                )
            }
        }
    }

    pub async fn reject(&self, cancellation_id: i64) -> ServiceResult<Cancellation> {
        let current = self.current(cancellation_id).await?;

        if !self.db.cancellations().reject(cancellation_id, Utc::now()).await? {
            let current = self.current(cancellation_id).await?;
            return Err(
                Rejection::invalid_transition("cancellation", current.status, CancellationStatus::Rejected).into(),
            );
        }

        info!(cancellation_id, order_id = current.order_id, "Cancellation rejected");
        self.current(cancellation_id).await
    }

    pub async fn pending_cancellations(&self) -> ServiceResult<Vec<Cancellation>> {
        Ok(self.db.cancellations().pending().await?)
    }

    pub async fn cancellations_for_order(&self, order_id: i64) -> ServiceResult<Vec<Cancellation>> {
        Ok(self.db.cancellations().for_order(order_id).await?)
    }

    async fn current(&self, cancellation_id: i64) -> ServiceResult<Cancellation> {
        self.db
            .cancellations()
            .get_by_id(cancellation_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Cancellation", cancellation_id))
    }
}

// =============================================================================
// Returns
// =============================================================================

#[derive(Debug, Clone)]
pub struct ReturnService {
    db: Database,
    window_days: i64,
    restock_delay: Duration,
}

impl ReturnService {
    pub fn new(db: Database, window_days: i64, restock_delay: Duration) -> Self {
        ReturnService {
            db,
            window_days,
            restock_delay,
        }
    }

    pub async fn request_return(
        &self,
        order_id: i64,
        book_id: i64,
        quantity: i64,
        reason: &str,
        other_reason: Option<&str>,
    ) -> ServiceResult<ReturnRequest> {
        self.request_return_at(order_id, book_id, quantity, reason, other_reason, Utc::now())
            .await
    }

    /// [`request_return`](Self::request_return) with an explicit clock.
    pub async fn request_return_at(
        &self,
        order_id: i64,
        book_id: i64,
        quantity: i64,
        reason: &str,
        other_reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> ServiceResult<ReturnRequest> {
        validate_id("order_id", order_id)?;
        validate_quantity(quantity)?;
        validate_reason(reason, other_reason)?;

        let order = load_order(&self.db, order_id).await?;
        ensure_committed(&order)?;

        let state = self
            .db
            .deliveries()
            .get(order_id)
            .await?
            .map(|d| d.state)
            .ok_or(Rejection::OrderNotDelivered { order_id })?;
        ensure_returnable(&order, state, now, self.window_days)?;

        let line = load_line(&self.db, order_id, book_id).await?;
        let claimed = self.db.returns().claimed_quantity(order_id, book_id).await?;
        ensure_return_quantity(quantity, line.quantity, claimed)?;

        let claim = NewClaim {
            order_id,
            book_id,
            quantity,
            reason,
            other_reason,
            ordered: line.quantity,
            at: now,
        };

        match self.db.returns().insert_bounded(&claim, line.item_price_cents).await? {
            Claim::Created(request) => {
                info!(return_id = request.id, order_id, book_id, quantity, "Return requested");
                Ok(request)
            }
            Claim::Exceeded { remaining } => Err(Rejection::ReturnQuantityExceeded {
                requested: quantity,
                remaining,
            }
            .into()),
        }
    }

    pub async fn approve(&self, return_id: i64) -> ServiceResult<ReturnRequest> {
        self.approve_at(return_id, Utc::now()).await
    }

    /// Approves and schedules the restock `restock_delay` after `now`.
    pub async fn approve_at(&self, return_id: i64, now: DateTime<Utc>) -> ServiceResult<ReturnRequest> {
        let payload = serde_json::to_string(&RestockPayload { return_id })?;
        let delay_ms = i64::try_from(self.restock_delay.as_millis()).unwrap_or(i64::MAX);
        let due_at_ms = now.timestamp_millis().saturating_add(delay_ms);
        let task = new_task(TaskKind::ReturnRestock, payload, due_at_ms);

        if !self.db.returns().approve_and_schedule(return_id, now, &task).await? {
            let current = self.current(return_id).await?;
            return Err(Rejection::invalid_transition("return", current.status, ReturnStatus::Approved).into());
        }

        info!(return_id, task_id = %task.id, due_at_ms, "Return approved");
        self.current(return_id).await
    }

    pub async fn reject(&self, return_id: i64) -> ServiceResult<ReturnRequest> {
        if !self.db.returns().reject(return_id, Utc::now()).await? {
            let current = self.current(return_id).await?;
            return Err(Rejection::invalid_transition("return", current.status, ReturnStatus::Rejected).into());
        }

        info!(return_id, "Return rejected");
        self.current(return_id).await
    }

    /// `approved → returned` with the stock restore.
    ///
    /// `None` when the return is not approved, which covers a task that
    /// already ran.
    pub async fn complete(&self, return_id: i64) -> ServiceResult<Option<ReturnRequest>> {
        let completed = self.db.returns().complete(return_id, Utc::now()).await?;

        if let Some(request) = &completed {
            info!(
                return_id,
                book_id = request.book_id,
                quantity = request.quantity,
                refund = %request.refund_amount(),
                "Return completed"
            );
        }

        Ok(completed)
    }

    pub async fn returns_for_order(&self, order_id: i64) -> ServiceResult<Vec<ReturnRequest>> {
        Ok(self.db.returns().for_order(order_id).await?)
    }

    pub async fn pending_returns(&self) -> ServiceResult<Vec<ReturnRequest>> {
        Ok(self.db.returns().pending().await?)
    }

    /// Copies of the line that can still be requested for return.
    pub async fn remaining_returnable(&self, order_id: i64, book_id: i64) -> ServiceResult<i64> {
        let line = load_line(&self.db, order_id, book_id).await?;
        let claimed = self.db.returns().claimed_quantity(order_id, book_id).await?;
        Ok(remaining_quantity(line.quantity, claimed))
    }

    async fn current(&self, return_id: i64) -> ServiceResult<ReturnRequest> {
        self.db
            .returns()
            .get_by_id(return_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Return", return_id))
    }
}
