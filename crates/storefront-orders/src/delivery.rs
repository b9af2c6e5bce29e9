//! Delivery progress for committed orders.

use tracing::info;

use storefront_core::{DeliveryState, DeliveryStatus, Rejection};
use storefront_db::Database;

use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone)]
pub struct DeliveryService {
    db: Database,
}

impl DeliveryService {
    pub fn new(db: Database) -> Self {
        DeliveryService { db }
    }

    pub async fn status(&self, order_id: i64) -> ServiceResult<DeliveryStatus> {
        self.db
            .deliveries()
            .get(order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Delivery", order_id))
    }

    /// Moves the delivery one step along its state machine.
    ///
    /// The write is a compare-and-set on the current state, so two
    /// concurrent callers cannot both move it out of the same state.
    pub async fn advance(&self, order_id: i64, to: DeliveryState) -> ServiceResult<DeliveryStatus> {
        let current = self.status(order_id).await?;

        if !current.state.can_transition_to(to) {
            return Err(Rejection::invalid_transition("delivery", current.state, to).into());
        }

        if !self.db.deliveries().transition(order_id, current.state, to).await? {
            // Lost the race; report against whatever won
            let now = self.status(order_id).await?;
            return Err(Rejection::invalid_transition("delivery", now.state, to).into());
        }

        info!(order_id, from = current.state.as_str(), to = to.as_str(), "Delivery advanced");
        self.status(order_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use storefront_core::money::Money;
    use storefront_core::pricing::{OrderQuote, PricedLine};
    use storefront_core::NewBook;
    use storefront_db::DbConfig;

    async fn open_order(db: &Database) -> i64 {
        let book = db
            .books()
            .insert(&NewBook {
                title: "Nostromo".to_string(),
                price_cents: 1200,
                cost_cents: 500,
                available_quantity: 4,
            })
            .await
            .unwrap();
        let quote = OrderQuote::new(
            vec![PricedLine::new(book.id, 1, Money::from_cents(1200), Default::default())],
            Money::from_cents(0),
        );
        let (order, _) = db.orders().create_pending(1, 1, Utc::now(), &quote).await.unwrap();
        db.deliveries().open(order.id).await.unwrap();
        order.id
    }

    #[tokio::test]
    async fn test_walks_the_state_machine() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let service = DeliveryService::new(db.clone());
        let order_id = open_order(&db).await;

        let status = service.advance(order_id, DeliveryState::InTransit).await.unwrap();
        assert_eq!(status.state, DeliveryState::InTransit);
        let status = service.advance(order_id, DeliveryState::Delivered).await.unwrap();
        assert_eq!(status.state, DeliveryState::Delivered);

        let err = service.advance(order_id, DeliveryState::Cancelled).await.unwrap_err();
        assert_eq!(err.code(), Some("invalid_transition"));
    }

    #[tokio::test]
    async fn test_cannot_skip_or_find_missing() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let service = DeliveryService::new(db.clone());
        let order_id = open_order(&db).await;

        assert!(service.advance(order_id, DeliveryState::Delivered).await.is_err());
        assert!(matches!(
            service.advance(9999, DeliveryState::InTransit).await.unwrap_err(),
            ServiceError::NotFound { .. }
        ));
    }
}
