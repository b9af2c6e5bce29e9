//! End-to-end flows through `Storefront` against a file-backed database.

use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;
use tempfile::TempDir;

use storefront_core::{
    CartLine, CartOwner, DeliveryState, DiscountRate, NewBook, OrderStatus, ReturnStatus,
};
use storefront_orders::{CheckoutError, Storefront, StorefrontConfig};

async fn storefront() -> (Storefront, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = StorefrontConfig::default();
    config.database.path = dir.path().join("storefront.db");
    config.guest_cart.path = Some(dir.path().join("guest_cart.json"));
    config.checkout.shipping_cents = 1000;
    config.returns.restock_delay_secs = 30;

    let store = Storefront::open(config).await.unwrap();
    (store, dir)
}

async fn add_book(store: &Storefront, title: &str, price_cents: i64, stock: i64) -> i64 {
    store
        .catalog()
        .add_book(NewBook {
            title: title.to_string(),
            price_cents,
            cost_cents: price_cents / 2,
            available_quantity: stock,
        })
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn test_forty_dollar_order() {
    let (store, _dir) = storefront().await;
    let book_id = add_book(&store, "Persuasion", 2000, 10).await;
    store
        .discounts()
        .apply_bulk_discount_at(
            &[book_id],
            "Quarter off",
            DiscountRate::from_percent(25),
            Utc::now() - ChronoDuration::hours(1),
            None,
        )
        .await
        .unwrap();

    let user = CartOwner::Account(7);
    store.carts().add(user, book_id, 2, None).await.unwrap();

    let placed = store.checkout().place_order(7, 3).await.unwrap();

    assert_eq!(placed.order.total_price_cents, 4000);
    assert_eq!(placed.order.status, OrderStatus::Committed);
    assert_eq!(placed.lines.len(), 1);
    assert_eq!(placed.lines[0].item_price_cents, 1500);
    assert_eq!(placed.lines[0].quantity, 2);
    assert_eq!(placed.delivery.state, DeliveryState::Processing);
    assert_eq!(store.stock().available(book_id).await.unwrap(), 8);
    assert!(store.carts().get(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_insufficient_stock_writes_nothing() {
    let (store, _dir) = storefront().await;
    let scarce = add_book(&store, "Vathek", 900, 2).await;
    let plenty = add_book(&store, "Rasselas", 900, 50).await;

    let err = store
        .checkout()
        .place_order_with(
            7,
            3,
            vec![CartLine::new(scarce, 5), CartLine::new(plenty, 1)],
            Utc::now(),
        )
        .await
        .unwrap_err();

    match err {
        CheckoutError::InsufficientStock(short) => {
            assert_eq!(short.len(), 1);
            assert_eq!(short[0].book_id, scarce);
            assert_eq!(short[0].requested, 5);
            assert_eq!(short[0].available, 2);
        }
        other => panic!("unexpected {other:?}"),
    }

    assert!(store.checkout().orders_for_user(7).await.unwrap().is_empty());
    assert_eq!(store.stock().available(scarce).await.unwrap(), 2);
    assert_eq!(store.stock().available(plenty).await.unwrap(), 50);
}

#[tokio::test]
async fn test_prices_are_frozen_on_order_lines() {
    let (store, _dir) = storefront().await;
    let book_id = add_book(&store, "Waverley", 2000, 10).await;
    let discount = store
        .discounts()
        .apply_bulk_discount_at(
            &[book_id],
            "Tenth off",
            DiscountRate::from_percent(10),
            Utc::now() - ChronoDuration::hours(1),
            None,
        )
        .await
        .unwrap();

    let placed = store
        .checkout()
        .place_order_with(7, 3, vec![CartLine::new(book_id, 1)], Utc::now())
        .await
        .unwrap();

    store.catalog().update_price(book_id, 5000).await.unwrap();
    store.discounts().expire(discount.id).await.unwrap();

    let details = store.checkout().order_details(placed.order.id).await.unwrap();
    assert_eq!(details.lines[0].item_price_cents, 1800);
    assert_eq!(details.lines[0].base_price_cents, 2000);
    assert_eq!(details.order.total_price_cents, placed.order.total_price_cents);
}

#[tokio::test]
async fn test_newest_discount_always_wins() {
    let (store, _dir) = storefront().await;
    let book_id = add_book(&store, "Shirley", 1000, 1).await;
    let d1 = Utc::now() - ChronoDuration::days(5);
    let d2 = Utc::now() - ChronoDuration::days(1);

    let discounts = store.discounts();
    discounts
        .apply_bulk_discount_at(&[book_id], "Old", DiscountRate::from_percent(10), d1, None)
        .await
        .unwrap();
    discounts
        .apply_bulk_discount_at(&[book_id], "New", DiscountRate::from_percent(40), d2, None)
        .await
        .unwrap();

    for offset in [0, 1, 12, 36] {
        let at = d2 + ChronoDuration::hours(offset);
        assert_eq!(discounts.resolve(book_id, at).await.unwrap().bps(), 4000);
    }
}

#[tokio::test]
async fn test_guest_cart_merges_on_login() {
    let (store, _dir) = storefront().await;
    let a = add_book(&store, "Cranford", 800, 10).await;
    let b = add_book(&store, "Sybil", 800, 10).await;
    let carts = store.carts();

    carts.add(CartOwner::Guest, a, 2, None).await.unwrap();
    carts.add(CartOwner::Account(7), a, 1, None).await.unwrap();
    carts.add(CartOwner::Account(7), b, 3, None).await.unwrap();

    let report = carts.merge_on_login(7).await.unwrap();
    assert!(report.is_complete());

    let mut lines: Vec<(i64, i64)> = carts
        .get(CartOwner::Account(7))
        .await
        .unwrap()
        .into_iter()
        .map(|l| (l.book_id, l.quantity))
        .collect();
    lines.sort();
    assert_eq!(lines, vec![(a, 3), (b, 3)]);
    assert!(carts.get(CartOwner::Guest).await.unwrap().is_empty());

    // A second merge with an empty guest cart changes nothing
    carts.merge_on_login(7).await.unwrap();
    assert_eq!(carts.get(CartOwner::Account(7)).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_concurrent_orders_never_oversell() {
    let (store, _dir) = storefront().await;
    let book_id = add_book(&store, "Hard Times", 1500, 3).await;

    let mut handles = Vec::new();
    for user_id in 1..=8 {
        let checkout = store.checkout();
        handles.push(tokio::spawn(async move {
            checkout
                .place_order_with(user_id, 1, vec![CartLine::new(book_id, 1)], Utc::now())
                .await
        }));
    }

    let mut committed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => committed += 1,
            Err(e) => assert!(!e.needs_reconciliation(), "left inconsistent: {e}"),
        }
    }

    let remaining = store.stock().available(book_id).await.unwrap();
    assert!(committed >= 1, "no order went through");
    assert!(committed <= 3);
    assert!(remaining >= 0);
    assert_eq!(remaining, 3 - committed);
}

#[tokio::test]
async fn test_cancellation_returns_copies() {
    let (store, _dir) = storefront().await;
    let book_id = add_book(&store, "Pamela", 1000, 5).await;

    let placed = store
        .checkout()
        .place_order_with(7, 3, vec![CartLine::new(book_id, 2)], Utc::now())
        .await
        .unwrap();
    assert_eq!(store.stock().available(book_id).await.unwrap(), 3);

    let cancellations = store.cancellations();
    let request = cancellations
        .request_cancellation(placed.order.id, book_id, 2, "Ordered by mistake", None)
        .await
        .unwrap();
    cancellations.approve(request.id).await.unwrap();

    assert_eq!(store.stock().available(book_id).await.unwrap(), 5);
    let delivery = store.deliveries().status(placed.order.id).await.unwrap();
    assert_eq!(delivery.state, DeliveryState::Cancelled);
}

#[tokio::test]
async fn test_return_restocks_after_delay() {
    let (store, _dir) = storefront().await;
    let book_id = add_book(&store, "Clarissa", 1000, 5).await;

    let placed = store
        .checkout()
        .place_order_with(7, 3, vec![CartLine::new(book_id, 3)], Utc::now())
        .await
        .unwrap();
    let order_id = placed.order.id;
    store.deliveries().advance(order_id, DeliveryState::InTransit).await.unwrap();
    store.deliveries().advance(order_id, DeliveryState::Delivered).await.unwrap();
    assert_eq!(store.checkout().delivered_books(7).await.unwrap().len(), 1);

    let returns = store.returns();
    let request = returns
        .request_return(order_id, book_id, 2, "Damaged", None)
        .await
        .unwrap();

    let err = returns
        .request_return(order_id, book_id, 2, "Damaged", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("return_quantity_exceeded"));

    let approved_at = Utc::now();
    returns.approve_at(request.id, approved_at).await.unwrap();

    let (worker, _handle) = store.restock_worker();

    // Not due yet
    let pass = worker.process_due(approved_at + ChronoDuration::seconds(5)).await.unwrap();
    assert_eq!(pass.completed, 0);
    assert_eq!(store.stock().available(book_id).await.unwrap(), 2);

    let pass = worker.process_due(approved_at + ChronoDuration::seconds(31)).await.unwrap();
    assert_eq!(pass.completed, 1);
    assert_eq!(store.stock().available(book_id).await.unwrap(), 4);

    let returned = returns.returns_for_order(order_id).await.unwrap();
    assert_eq!(returned[0].status, ReturnStatus::Returned);
    assert_eq!(returns.remaining_returnable(order_id, book_id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_restock_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = StorefrontConfig::default();
    config.database.path = dir.path().join("storefront.db");
    config.guest_cart.path = Some(dir.path().join("guest_cart.json"));

    let (order_id, book_id, request_id, approved_at) = {
        let store = Storefront::open(config.clone()).await.unwrap();
        let book_id = add_book(&store, "Evelina", 1000, 5).await;
        let placed = store
            .checkout()
            .place_order_with(7, 3, vec![CartLine::new(book_id, 1)], Utc::now())
            .await
            .unwrap();
        store.deliveries().advance(placed.order.id, DeliveryState::InTransit).await.unwrap();
        store.deliveries().advance(placed.order.id, DeliveryState::Delivered).await.unwrap();

        let request = store
            .returns()
            .request_return(placed.order.id, book_id, 1, "Wrong edition", None)
            .await
            .unwrap();
        let approved_at = Utc::now();
        store.returns().approve_at(request.id, approved_at).await.unwrap();
        store.db().close().await;

        (placed.order.id, book_id, request.id, approved_at)
    };

    // A fresh process over the same file
    let store = Storefront::open(config).await.unwrap();
    let (worker, _handle) = store.restock_worker();
    let due = approved_at + ChronoDuration::from_std(Duration::from_secs(31)).unwrap();
    assert_eq!(worker.process_due(due).await.unwrap().completed, 1);

    assert_eq!(store.stock().available(book_id).await.unwrap(), 5);
    let returns = store.returns().returns_for_order(order_id).await.unwrap();
    assert_eq!(returns[0].id, request_id);
    assert_eq!(returns[0].status, ReturnStatus::Returned);
}
