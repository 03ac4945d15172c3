//! Role gate, admin hand-over, corrections, shop editor and super user.

use crewstore_bot::testing::Harness;
use crewstore_core::{EnterpriseId, Role, UserId};
use crewstore_integration_tests::user;

const ENTERPRISE: i64 = 11047;
const SUPER_USER: i64 = 900;

async fn pending_status(h: &Harness) -> String {
    sqlx::query_scalar::<_, String>("SELECT status FROM orders ORDER BY id DESC LIMIT 1")
        .fetch_one(h.store.pool())
        .await
        .unwrap()
}

// =============================================================================
// Role gate
// =============================================================================

#[tokio::test]
async fn test_gate_rejects_before_payload_parsing() {
    let h = Harness::new(SUPER_USER).await;
    let worker = h.store.seed_user(2, ENTERPRISE, Role::Worker, "2", 0).await;

    for payload in ["topup_amount:abc:zzz", "topup_amount:2:2", "orders", "shop_editdel:x"] {
        let toast = h.press(worker, payload).await;
        assert_eq!(toast, None);
        assert_eq!(h.last_text(worker), "⛔ Access denied. Your role: worker");
    }
    assert_eq!(h.store.balance(worker).await, 0);
}

#[tokio::test]
async fn test_gate_never_mutates() {
    let h = Harness::new(SUPER_USER).await;
    h.store.seed_user(1, ENTERPRISE, Role::Admin, "1", 0).await;
    let manager = h.store.seed_user(3, ENTERPRISE, Role::Manager, "3", 0).await;
    let buyer = h.store.seed_user(2, ENTERPRISE, Role::Worker, "2", 10).await;
    let mug = h.store.seed_product(ENTERPRISE, "Mug", 4, 3).await;
    h.press(buyer, &format!("buy_product:{mug}")).await;

    h.press(manager, "orders_order:1:deny").await;
    h.press(manager, &format!("shop_editdel:{mug}")).await;
    h.press(buyer, "orders_order:1:deny").await;

    assert_eq!(pending_status(&h).await, "pending");
    assert_eq!(h.store.balance(buyer).await, 6);
    assert_eq!(h.store.remaining(mug).await, 2);
    assert_eq!(h.last_text(manager), "⛔ Access denied. Your role: manager");
}

#[tokio::test]
async fn test_unknown_identity_and_token() {
    let h = Harness::new(SUPER_USER).await;
    let stranger = UserId::new(77);

    h.press(stranger, "show_balance").await;
    assert_eq!(h.last_text(stranger), "⛔ Access denied. Your role: unset");

    let worker = h.store.seed_user(2, ENTERPRISE, Role::Worker, "2", 0).await;
    h.press(worker, "drop_everything").await;
    assert_eq!(h.last_text(worker), "⛔ Access denied. Your role: worker");
}

#[tokio::test]
async fn test_manager_cannot_page_corrections() {
    let h = Harness::new(SUPER_USER).await;
    let manager = h.store.seed_user(3, ENTERPRISE, Role::Manager, "3", 0).await;
    h.store.seed_user(2, ENTERPRISE, Role::Worker, "2", 0).await;

    h.press(manager, "select_worker:0:correction").await;
    assert_eq!(h.last_text(manager), "⛔ Access denied. Your role: manager");

    h.press(manager, "select_worker:0:topup").await;
    assert!(h.last_text(manager).starts_with("Choose a worker"));
}

// =============================================================================
// Role changes
// =============================================================================

#[tokio::test]
async fn test_admin_hand_over_demotes_caller() {
    let h = Harness::new(SUPER_USER).await;
    let admin = h.store.seed_user(1, ENTERPRISE, Role::Admin, "1", 0).await;
    let heir = h.store.seed_user(2, ENTERPRISE, Role::Worker, "7", 0).await;

    h.press(admin, "accesslevel").await;
    h.press(admin, "changeRole:admin").await;
    h.say(admin, "7").await;
    let confirm = h.gateway.last_to(admin).unwrap();
    let payloads: Vec<&str> = confirm.payloads().collect();
    assert_eq!(payloads, ["confirmAdmin:7", "cancelAdmin"]);
    assert_eq!(user(&h, heir).await.unwrap().role, Role::Worker);

    h.press(admin, "confirmAdmin:7").await;

    assert_eq!(user(&h, heir).await.unwrap().role, Role::Admin);
    assert_eq!(user(&h, admin).await.unwrap().role, Role::Manager);
    assert!(h.last_text(admin).contains("You are now a manager"));

    h.press(admin, "orders").await;
    assert_eq!(h.last_text(admin), "⛔ Access denied. Your role: manager");
}

#[tokio::test]
async fn test_admin_hand_over_can_be_cancelled() {
    let h = Harness::new(SUPER_USER).await;
    let admin = h.store.seed_user(1, ENTERPRISE, Role::Admin, "1", 0).await;
    let heir = h.store.seed_user(2, ENTERPRISE, Role::Worker, "7", 0).await;

    h.press(admin, "changeRole:admin").await;
    h.say(admin, "7").await;
    h.press(admin, "cancelAdmin").await;
    h.press(admin, "confirmAdmin:7").await;

    assert_eq!(user(&h, heir).await.unwrap().role, Role::Worker);
    assert_eq!(user(&h, admin).await.unwrap().role, Role::Admin);
}

#[tokio::test]
async fn test_role_change_to_manager() {
    let h = Harness::new(SUPER_USER).await;
    let admin = h.store.seed_user(1, ENTERPRISE, Role::Admin, "1", 0).await;
    let worker = h.store.seed_user(2, ENTERPRISE, Role::Worker, "7", 0).await;
    h.store.seed_user(3, 5, Role::Worker, "8", 0).await;

    h.press(admin, "changeRole:manager").await;
    h.say(admin, "8").await;
    assert_eq!(h.last_text(admin), "❌ Nothing found. Please start over.");

    h.press(admin, "changeRole:manager").await;
    h.say(admin, "7").await;
    assert_eq!(user(&h, worker).await.unwrap().role, Role::Manager);
    assert!(h.last_text(worker).contains("manager"));
}

// =============================================================================
// Corrections
// =============================================================================

#[tokio::test]
async fn test_correct_balance_and_delete() {
    let h = Harness::new(SUPER_USER).await;
    let admin = h.store.seed_user(1, ENTERPRISE, Role::Admin, "1", 0).await;
    let worker = h.store.seed_user(2, ENTERPRISE, Role::Worker, "2", 5).await;

    h.press(admin, "setfield:balance").await;
    assert_eq!(h.last_text(admin), "❗ Pick a worker first.");

    h.press(admin, "correction:2").await;
    h.press(admin, "setfield:balance").await;
    h.say(admin, "ten").await;
    assert_eq!(h.store.balance(worker).await, 5);

    // Bad input ends the flow; the field must be picked again.
    h.say(admin, "40").await;
    assert_eq!(h.store.balance(worker).await, 5);

    h.press(admin, "correction:2").await;
    h.press(admin, "setfield:balance").await;
    h.say(admin, "40").await;
    assert_eq!(h.store.balance(worker).await, 40);
    assert_eq!(h.last_text(admin), "✅ Field updated!");

    h.press(admin, "correction:2").await;
    h.press(admin, "setfield:delete").await;
    assert!(user(&h, worker).await.is_none());
}

#[tokio::test]
async fn test_correct_schedule_conflict() {
    let h = Harness::new(SUPER_USER).await;
    let admin = h.store.seed_user(1, ENTERPRISE, Role::Admin, "1", 0).await;
    let worker = h.store.seed_user(2, ENTERPRISE, Role::Worker, "2", 0).await;
    h.store.seed_user(3, ENTERPRISE, Role::Worker, "3", 0).await;

    h.press(admin, "correction:2").await;
    h.press(admin, "setfield:schedule").await;
    h.say(admin, "3").await;

    assert!(h.last_text(admin).contains("already registered"));
    assert_eq!(user(&h, worker).await.unwrap().schedule_number, "2");
}

// =============================================================================
// Shop editor
// =============================================================================

#[tokio::test]
async fn test_add_product_reprompts_on_bad_numbers() {
    let h = Harness::new(SUPER_USER).await;
    let admin = h.store.seed_user(1, ENTERPRISE, Role::Admin, "1", 0).await;

    h.press(admin, "shop_edit:shop_add").await;
    h.say(admin, "  Travel   mug ").await;
    h.say(admin, "abc").await;
    assert_eq!(h.last_text(admin), "❗ Numbers only, please! ⛔️");
    h.say(admin, "-1").await;
    assert_eq!(h.last_text(admin), "❗ The value can't be negative! ⛔️");
    h.say(admin, "3").await;
    h.say(admin, "5").await;

    let (name, price, remaining, enterprise) =
        sqlx::query_as::<_, (String, i64, i64, i64)>(
            "SELECT name, price, remaining, enterprise_id FROM shop",
        )
        .fetch_one(h.store.pool())
        .await
        .unwrap();
    assert_eq!(name, "Travel mug");
    assert_eq!((price, remaining, enterprise), (3, 5, ENTERPRISE));
}

#[tokio::test]
async fn test_edit_price_and_stock() {
    let h = Harness::new(SUPER_USER).await;
    let admin = h.store.seed_user(1, ENTERPRISE, Role::Admin, "1", 0).await;
    let mug = h.store.seed_product(ENTERPRISE, "Mug", 4, 0).await;

    h.press(admin, "shop_edit:choose").await;
    let listing = h.gateway.last_to(admin).unwrap();
    assert_eq!(listing.buttons[0][0].label, "Mug (4🌟, 0 pcs)");

    h.press(admin, &format!("shop_editfield:remains:{mug}")).await;
    h.say(admin, "x").await;
    h.say(admin, "12").await;
    assert_eq!(h.store.remaining(mug).await, 12);

    h.press(admin, &format!("shop_editdel:{mug}")).await;
    let left = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM shop")
        .fetch_one(h.store.pool())
        .await
        .unwrap();
    assert_eq!(left, 0);
}

#[tokio::test]
async fn test_demoted_admin_loses_open_flow() {
    let h = Harness::new(SUPER_USER).await;
    let admin = h.store.seed_user(1, ENTERPRISE, Role::Admin, "1", 0).await;
    let mug = h.store.seed_product(ENTERPRISE, "Mug", 4, 3).await;

    h.press(admin, &format!("shop_editfield:price:{mug}")).await;
    sqlx::query("UPDATE users SET role = 'manager' WHERE id = 1")
        .execute(h.store.pool())
        .await
        .unwrap();
    h.say(admin, "99").await;

    assert_eq!(h.last_text(admin), "⛔ Access denied. Your role: manager");
    let price = sqlx::query_scalar::<_, i64>("SELECT price FROM shop")
        .fetch_one(h.store.pool())
        .await
        .unwrap();
    assert_eq!(price, 4);
}

// =============================================================================
// Super user
// =============================================================================

#[tokio::test]
async fn test_super_user_moves_and_changes_role() {
    let h = Harness::new(SUPER_USER).await;
    let root = h.store.seed_user(SUPER_USER, ENTERPRISE, Role::Worker, "99", 0).await;

    h.say(root, "/menu").await;
    let menu = h.gateway.last_to(root).unwrap();
    assert!(menu.payloads().any(|p| p == "super_user:transition"));

    h.press(root, "super_user:transition").await;
    h.say(root, "nope").await;
    h.say(root, "12").await;
    assert_eq!(
        user(&h, root).await.unwrap().enterprise_id,
        Some(EnterpriseId::new(12))
    );

    h.press(root, "super_user:access").await;
    h.say(root, "Admin").await;
    assert_eq!(user(&h, root).await.unwrap().role, Role::Admin);

    let other = h.store.seed_user(5, ENTERPRISE, Role::Admin, "5", 0).await;
    h.press(other, "super_user:access").await;
    assert_eq!(h.last_text(other), "⛔ Access denied. Your role: admin");
}
