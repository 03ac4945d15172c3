//! Main menu keyboard, composed from the caller's role.

use crewstore_core::Role;

use crate::gateway::{Button, Reply};

/// The `/menu` reply for a caller.
#[must_use]
pub fn main_menu(role: Role, is_super: bool) -> Reply {
    let mut reply = Reply::text("Your menu:");

    match role {
        Role::Worker => {
            reply = reply
                .with_row(vec![
                    Button::new("💰 Balance", "show_balance"),
                    Button::new("🛍️ Shop", "menu_market"),
                ])
                .with_row(vec![Button::new("📜 Order history", "history_orders")]);
        }
        Role::Manager | Role::Admin => {
            reply = reply.with_row(vec![
                Button::new("➕ Top up", "topup_"),
                Button::new("👥 Staff", "menu_list"),
            ]);
            if role == Role::Admin {
                reply = reply
                    .with_row(vec![
                        Button::new("✏️ Corrections", "menu_admin_setbal"),
                        Button::new("🏪 Shop editor", "shop_edit"),
                    ])
                    .with_row(vec![
                        Button::new("🔑 Access levels", "accesslevel"),
                        Button::new("📦 Orders", "orders"),
                    ]);
            }
        }
        Role::Unset => {}
    }

    if is_super {
        reply = reply.with_row(vec![
            Button::new("🏢 Change enterprise", "super_user:transition"),
            Button::new("🎭 Change role", "super_user:access"),
        ]);
    }

    if reply.buttons.is_empty() {
        return Reply::text(
            "Your registration is not approved yet. Send /start to register.",
        );
    }
    reply
}
