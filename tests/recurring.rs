#![cfg(feature = "inmem-store")]

mod common;

use chrono::{DateTime, Duration, Utc};
use freshpick::models::*;
use freshpick::recurring::{process_due, MAX_CONSECUTIVE_FAILURES};
use freshpick::repo::{OrderRepo, ProductRepo, RecurringAction, RecurringRepo, UserRepo};
use freshpick::AppState;

use common::{account, address, product, state};

async fn subscribe(state: &AppState, user_id: Id, product_id: Id, quantity: i64, next_run_at: DateTime<Utc>) -> RecurringOrder {
    state
        .repo
        .create_recurring(NewRecurringOrder {
            user_id,
            items: vec![BagItem { product_id, quantity }],
            frequency: Frequency::Weekly,
            shipping_address: address(),
            payment_method: PaymentMethod::CashOnDelivery,
            next_run_at,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn due_subscription_becomes_an_order() {
    let state = state(&[]);
    let (ada, _) = account(&state, "ada@shop.test", ROLE_CUSTOMER).await;
    let eggs = product(&state, "eggs", 400, 10, None).await;
    let now = Utc::now();
    let due_at = now - Duration::hours(2);
    let rec = subscribe(&state, ada.id, eggs.id, 3, due_at).await;

    let report = process_due(state.repo.as_ref(), &state.config.pricing, now).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.created.len(), 1);

    let order = state.repo.get_order(report.created[0]).await.unwrap();
    assert_eq!(order.user_id, ada.id);
    assert_eq!(order.recurring_order_id, Some(rec.id));
    assert_eq!(order.subtotal_cents, 1200);
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(state.repo.get_product(eggs.id).await.unwrap().stock, 7);

    let rec = state.repo.get_recurring(rec.id).await.unwrap();
    assert_eq!(rec.next_run_at, due_at + Duration::days(7));
    assert_eq!(rec.last_order_id, Some(order.id));
    assert_eq!(rec.last_run_at, Some(now));
    assert_eq!(rec.failure_count, 0);
}

#[tokio::test]
async fn repeated_failures_pause_the_subscription() {
    let state = state(&[]);
    let (ada, _) = account(&state, "ada@shop.test", ROLE_CUSTOMER).await;
    let eggs = product(&state, "eggs", 400, 1, None).await;
    let start = Utc::now();
    let rec = subscribe(&state, ada.id, eggs.id, 5, start - Duration::hours(1)).await;

    for week in 0..MAX_CONSECUTIVE_FAILURES {
        let now = start + Duration::days(7 * week as i64);
        let report = process_due(state.repo.as_ref(), &state.config.pricing, now).await.unwrap();
        assert_eq!(report.processed, 1, "week {week}");
        assert!(report.created.is_empty());
        assert_eq!(report.failed[0].recurring_order_id, rec.id);
    }

    let rec = state.repo.get_recurring(rec.id).await.unwrap();
    assert_eq!(rec.status, RecurringStatus::Paused);
    assert_eq!(rec.failure_count, MAX_CONSECUTIVE_FAILURES);
    assert!(rec.last_error.is_some());
    assert!(rec.last_order_id.is_none());
    // stock is untouched by failed runs
    assert_eq!(state.repo.get_product(eggs.id).await.unwrap().stock, 1);

    let later = start + Duration::days(60);
    let report = process_due(state.repo.as_ref(), &state.config.pricing, later).await.unwrap();
    assert_eq!(report.processed, 0);
}

#[tokio::test]
async fn one_failure_does_not_stop_the_batch() {
    let state = state(&[]);
    let (ada, _) = account(&state, "ada@shop.test", ROLE_CUSTOMER).await;
    let (bob, _) = account(&state, "bob@shop.test", ROLE_CUSTOMER).await;
    let milk = product(&state, "milk", 150, 10, None).await;
    let now = Utc::now();
    let gone = subscribe(&state, bob.id, milk.id, 1, now - Duration::hours(3)).await;
    let fine = subscribe(&state, ada.id, milk.id, 2, now - Duration::hours(1)).await;
    state.repo.update_user(bob.id, UpdateUser { active: Some(false), ..Default::default() }).await.unwrap();

    let report = process_due(state.repo.as_ref(), &state.config.pricing, now).await.unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.created.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].recurring_order_id, gone.id);

    let gone = state.repo.get_recurring(gone.id).await.unwrap();
    assert_eq!(gone.failure_count, 1);
    assert_eq!(gone.status, RecurringStatus::Active);
    assert!(gone.next_run_at > now);
    assert!(state.repo.get_recurring(fine.id).await.unwrap().last_order_id.is_some());
}

#[tokio::test]
async fn paused_and_future_subscriptions_are_left_alone() {
    let state = state(&[]);
    let (ada, _) = account(&state, "ada@shop.test", ROLE_CUSTOMER).await;
    let milk = product(&state, "milk", 150, 10, None).await;
    let now = Utc::now();
    let future = subscribe(&state, ada.id, milk.id, 1, now + Duration::days(2)).await;
    let paused = subscribe(&state, ada.id, milk.id, 1, now - Duration::days(1)).await;
    state.repo.change_recurring(paused.id, RecurringAction::Pause, now).await.unwrap();

    let report = process_due(state.repo.as_ref(), &state.config.pricing, now).await.unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(state.repo.get_recurring(future.id).await.unwrap().next_run_at, future.next_run_at);
    assert_eq!(state.repo.get_recurring(paused.id).await.unwrap().next_run_at, paused.next_run_at);
    assert!(state.repo.list_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn stale_listing_does_not_order_twice_or_revive_a_cancellation() {
    let state = state(&[]);
    let (ada, _) = account(&state, "ada@shop.test", ROLE_CUSTOMER).await;
    let eggs = product(&state, "eggs", 400, 10, None).await;
    let now = Utc::now();
    let kept = subscribe(&state, ada.id, eggs.id, 1, now - Duration::hours(1)).await;
    let cancelled = subscribe(&state, ada.id, eggs.id, 1, now - Duration::hours(1)).await;

    // a slower batch listed both before anything changed
    let stale = state.repo.list_due_recurring(now).await.unwrap();
    assert_eq!(stale.len(), 2);
    state.repo.change_recurring(cancelled.id, RecurringAction::Cancel, now).await.unwrap();

    let first = process_due(state.repo.as_ref(), &state.config.pricing, now).await.unwrap();
    assert_eq!(first.created.len(), 1);
    assert_eq!(state.repo.get_recurring(kept.id).await.unwrap().last_order_id, Some(first.created[0]));

    // the slower batch tries to claim from what it listed
    for rec in &stale {
        let claim = state.repo.claim_recurring(rec.id, rec.next_run_at, rec.next_run_at + Duration::days(7)).await.unwrap();
        assert!(claim.is_none(), "subscription {} claimed twice", rec.id);
    }
    let second = process_due(state.repo.as_ref(), &state.config.pricing, now).await.unwrap();
    assert_eq!(second.processed, 0);

    assert_eq!(state.repo.list_orders().await.unwrap().len(), 1);
    assert_eq!(state.repo.get_recurring(cancelled.id).await.unwrap().status, RecurringStatus::Cancelled);
    assert_eq!(state.repo.get_product(eggs.id).await.unwrap().stock, 9);
}
