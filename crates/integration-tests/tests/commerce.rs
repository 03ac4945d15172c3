//! Purchases, top-ups and the order lifecycle, driven through the dispatcher.

use crewstore_bot::testing::Harness;
use crewstore_core::Role;

const ENTERPRISE: i64 = 11047;

async fn latest_order(harness: &Harness) -> (i64, String) {
    sqlx::query_as::<_, (i64, String)>("SELECT id, status FROM orders ORDER BY id DESC LIMIT 1")
        .fetch_one(harness.store.pool())
        .await
        .unwrap()
}

async fn order_count(harness: &Harness) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders")
        .fetch_one(harness.store.pool())
        .await
        .unwrap()
}

// =============================================================================
// Purchase
// =============================================================================

#[tokio::test]
async fn test_purchase_debits_and_decrements_together() {
    let h = Harness::new(900).await;
    let admin = h.store.seed_user(1, ENTERPRISE, Role::Admin, "1", 0).await;
    let buyer = h.store.seed_user(2, ENTERPRISE, Role::Worker, "2", 10).await;
    let mug = h.store.seed_product(ENTERPRISE, "Mug", 4, 3).await;

    let toast = h.press(buyer, &format!("buy_product:{mug}")).await;

    assert_eq!(toast.as_deref(), Some("Purchase placed!"));
    assert_eq!(h.store.balance(buyer).await, 6);
    assert_eq!(h.store.remaining(mug).await, 2);
    assert_eq!(latest_order(&h).await.1, "pending");

    assert!(h.last_text(buyer).contains("You bought: Mug"));
    let notice = h.gateway.last_to(admin).unwrap();
    assert!(notice.text.contains("New order"));
    assert!(notice.text.contains("2 User 2"));
}

#[tokio::test]
async fn test_insufficient_funds_changes_nothing() {
    let h = Harness::new(900).await;
    h.store.seed_user(1, ENTERPRISE, Role::Admin, "1", 0).await;
    let buyer = h.store.seed_user(2, ENTERPRISE, Role::Worker, "2", 3).await;
    let mug = h.store.seed_product(ENTERPRISE, "Mug", 4, 3).await;

    let toast = h.press(buyer, &format!("buy_product:{mug}")).await;

    assert_eq!(toast, None);
    assert_eq!(h.store.balance(buyer).await, 3);
    assert_eq!(h.store.remaining(mug).await, 3);
    assert_eq!(order_count(&h).await, 0);
    assert_eq!(h.last_text(buyer), "Not enough points on your balance.");
}

#[tokio::test]
async fn test_sold_out_product_is_rejected() {
    let h = Harness::new(900).await;
    let buyer = h.store.seed_user(2, ENTERPRISE, Role::Worker, "2", 10).await;
    let mug = h.store.seed_product(ENTERPRISE, "Mug", 4, 0).await;

    h.press(buyer, &format!("buy_product:{mug}")).await;

    assert_eq!(h.store.balance(buyer).await, 10);
    assert_eq!(h.last_text(buyer), "❗ This product is sold out.");
}

#[tokio::test]
async fn test_product_of_another_enterprise_is_rejected() {
    let h = Harness::new(900).await;
    let buyer = h.store.seed_user(2, ENTERPRISE, Role::Worker, "2", 10).await;
    let foreign = h.store.seed_product(999, "Mug", 4, 3).await;

    h.press(buyer, &format!("buy_product:{foreign}")).await;

    assert_eq!(h.store.balance(buyer).await, 10);
    assert_eq!(h.store.remaining(foreign).await, 3);
    assert_eq!(h.last_text(buyer), "⛔ That belongs to another enterprise.");
}

#[tokio::test]
async fn test_concurrent_purchases_of_last_unit() {
    let h = Harness::new(900).await;
    h.store.seed_user(1, ENTERPRISE, Role::Admin, "1", 0).await;
    let first = h.store.seed_user(2, ENTERPRISE, Role::Worker, "2", 10).await;
    let second = h.store.seed_user(3, ENTERPRISE, Role::Worker, "3", 10).await;
    let mug = h.store.seed_product(ENTERPRISE, "Mug", 4, 1).await;
    let payload = format!("buy_product:{mug}");

    let (a, b) = tokio::join!(h.press(first, &payload), h.press(second, &payload));

    let successes = [a, b].iter().filter(|t| t.is_some()).count();
    assert_eq!(successes, 1);
    assert_eq!(h.store.remaining(mug).await, 0);
    assert_eq!(order_count(&h).await, 1);
    assert_eq!(
        h.store.balance(first).await + h.store.balance(second).await,
        16
    );

    let loser = if h.store.balance(first).await == 10 { first } else { second };
    assert_eq!(h.last_text(loser), "❗ This product is sold out.");
}

#[tokio::test]
async fn test_failed_notification_keeps_purchase() {
    let h = Harness::new(900).await;
    h.store.seed_user(1, ENTERPRISE, Role::Admin, "1", 0).await;
    let buyer = h.store.seed_user(2, ENTERPRISE, Role::Worker, "2", 10).await;
    let mug = h.store.seed_product(ENTERPRISE, "Mug", 4, 3).await;
    h.gateway.fail_deliveries(true);

    h.press(buyer, &format!("buy_product:{mug}")).await;

    assert_eq!(h.store.balance(buyer).await, 6);
    assert_eq!(order_count(&h).await, 1);
}

#[tokio::test]
async fn test_market_lists_only_in_stock_products() {
    let h = Harness::new(900).await;
    let buyer = h.store.seed_user(2, ENTERPRISE, Role::Worker, "2", 10).await;
    let mug = h.store.seed_product(ENTERPRISE, "Mug", 4, 3).await;
    h.store.seed_product(ENTERPRISE, "Cap", 2, 0).await;

    h.press(buyer, "menu_market").await;

    let market = h.gateway.last_to(buyer).unwrap();
    let payloads: Vec<&str> = market.payloads().collect();
    assert_eq!(payloads, [format!("buy_product:{mug}").as_str()]);
}

// =============================================================================
// Top-up
// =============================================================================

#[tokio::test]
async fn test_top_up_respects_cooldown() {
    let h = Harness::new(900).await;
    let manager = h.store.seed_user(1, ENTERPRISE, Role::Manager, "1", 0).await;
    let worker = h.store.seed_user(2, ENTERPRISE, Role::Worker, "2", 0).await;

    assert_eq!(
        h.press(manager, "topup_amount:2:2").await.as_deref(),
        Some("Done!")
    );
    assert_eq!(h.store.balance(worker).await, 2);
    assert!(h.last_text(worker).contains("topped up by 2"));

    h.clock.advance(60 * 60);
    assert_eq!(h.press(manager, "topup_amount:2:2").await, None);
    assert_eq!(h.store.balance(worker).await, 2);
    assert_eq!(h.last_text(manager), "❗ Cooldown: 11h 0m left.");

    h.clock.advance(11 * 60 * 60);
    assert_eq!(
        h.press(manager, "topup_amount:1:2").await.as_deref(),
        Some("Done!")
    );
    assert_eq!(h.store.balance(worker).await, 3);
}

#[tokio::test]
async fn test_top_up_other_enterprise_is_rejected() {
    let h = Harness::new(900).await;
    let manager = h.store.seed_user(1, ENTERPRISE, Role::Manager, "1", 0).await;
    let outsider = h.store.seed_user(2, 5, Role::Worker, "2", 0).await;

    h.press(manager, "topup_amount:2:2").await;

    assert_eq!(h.store.balance(outsider).await, 0);
    assert_eq!(h.last_text(manager), "⛔ That belongs to another enterprise.");
}

#[tokio::test]
async fn test_worker_picker_pages() {
    let h = Harness::new(900).await;
    let manager = h.store.seed_user(1, ENTERPRISE, Role::Manager, "1", 0).await;
    for i in 0..17 {
        h.store
            .seed_user(100 + i, ENTERPRISE, Role::Worker, &(10 + i).to_string(), 0)
            .await;
    }

    h.press(manager, "topup_").await;
    let first_page = h.gateway.last_to(manager).unwrap();
    let payloads: Vec<&str> = first_page.payloads().collect();
    assert_eq!(payloads.len(), 16);
    assert_eq!(payloads[0], "topup_select_worker:100");
    assert_eq!(payloads[15], "select_worker:1:topup");

    h.press(manager, "select_worker:1:topup").await;
    let second_page = h.gateway.last_to(manager).unwrap();
    let payloads: Vec<&str> = second_page.payloads().collect();
    assert_eq!(
        payloads,
        [
            "topup_select_worker:115",
            "topup_select_worker:116",
            "select_worker:0:topup"
        ]
    );
}

// =============================================================================
// Order lifecycle
// =============================================================================

#[tokio::test]
async fn test_deny_refunds_once() {
    let h = Harness::new(900).await;
    let admin = h.store.seed_user(1, ENTERPRISE, Role::Admin, "1", 0).await;
    let buyer = h.store.seed_user(2, ENTERPRISE, Role::Worker, "2", 10).await;
    let mug = h.store.seed_product(ENTERPRISE, "Mug", 4, 3).await;
    h.press(buyer, &format!("buy_product:{mug}")).await;
    let (order, _) = latest_order(&h).await;

    let toast = h.press(admin, &format!("orders_order:{order}:deny")).await;
    assert_eq!(toast.as_deref(), Some("Order denied."));
    assert_eq!(h.store.balance(buyer).await, 10);
    assert_eq!(latest_order(&h).await.1, "denied");
    assert!(h.last_text(buyer).contains("was cancelled"));

    let toast = h.press(admin, &format!("orders_order:{order}:deny")).await;
    assert_eq!(toast, None);
    assert_eq!(h.store.balance(buyer).await, 10);
    assert_eq!(h.last_text(admin), "The order was already processed! ⛔️");
}

#[tokio::test]
async fn test_accept_notifies_buyer_and_is_terminal() {
    let h = Harness::new(900).await;
    let admin = h.store.seed_user(1, ENTERPRISE, Role::Admin, "1", 0).await;
    let buyer = h.store.seed_user(2, ENTERPRISE, Role::Worker, "2", 10).await;
    let mug = h.store.seed_product(ENTERPRISE, "Mug", 4, 3).await;
    h.press(buyer, &format!("buy_product:{mug}")).await;
    let (order, _) = latest_order(&h).await;

    h.press(admin, "orders").await;
    let listing = h.gateway.last_to(admin).unwrap();
    assert!(listing.payloads().any(|p| p == format!("orders_order:{order}")));

    h.press(admin, &format!("orders_order:{order}:accept")).await;
    assert_eq!(latest_order(&h).await.1, "accepted");
    assert!(h.last_text(buyer).contains("pick it up"));
    assert_eq!(h.store.balance(buyer).await, 6);

    h.press(admin, &format!("orders_order:{order}:deny")).await;
    assert_eq!(latest_order(&h).await.1, "accepted");
    assert_eq!(h.store.balance(buyer).await, 6);
}

#[tokio::test]
async fn test_admin_cannot_decide_foreign_order() {
    let h = Harness::new(900).await;
    let foreign_admin = h.store.seed_user(1, 5, Role::Admin, "1", 0).await;
    h.store.seed_user(3, ENTERPRISE, Role::Admin, "3", 0).await;
    let buyer = h.store.seed_user(2, ENTERPRISE, Role::Worker, "2", 10).await;
    let mug = h.store.seed_product(ENTERPRISE, "Mug", 4, 3).await;
    h.press(buyer, &format!("buy_product:{mug}")).await;
    let (order, _) = latest_order(&h).await;

    h.press(foreign_admin, &format!("orders_order:{order}:deny")).await;

    assert_eq!(latest_order(&h).await.1, "pending");
    assert_eq!(h.store.balance(buyer).await, 6);
}

#[tokio::test]
async fn test_history_lists_orders() {
    let h = Harness::new(900).await;
    let buyer = h.store.seed_user(2, ENTERPRISE, Role::Worker, "2", 10).await;
    let mug = h.store.seed_product(ENTERPRISE, "Mug", 4, 3).await;

    h.press(buyer, "history_orders").await;
    assert_eq!(h.last_text(buyer), "You have no orders yet.");

    h.press(buyer, &format!("buy_product:{mug}")).await;
    h.press(buyer, "history_orders").await;
    let history = h.last_text(buyer);
    assert!(history.contains("| Mug | Being packed 🚚 | 4🌟"), "{history}");

    h.press(buyer, "show_balance").await;
    assert_eq!(h.last_text(buyer), "Your current balance: 6🌟");
}
