//! Role/access dispatcher.
//!
//! Every inbound event is routed here. Callback payloads are action tokens,
//! optionally followed by colon-separated arguments (`topup_amount:2:42`).
//! The caller's role is re-read from the store on every dispatch and checked
//! against the action's [`Gate`] before any argument is parsed, so a caller
//! without the role is turned away whatever the payload holds.

use std::str::FromStr;

use tracing::{info, instrument};

use crewstore_core::{Role, UserId};

use crate::conversation::ConversationState;
use crate::error::{AppError, set_sentry_user};
use crate::gateway::{CallbackAction, Gateway, InboundEvent, Reply, TextMessage};
use crate::menu::main_menu;
use crate::models::ProductField;
use crate::services::{
    CatalogService, Caller, CommerceService, PickerPurpose, RegistrationService, StaffService,
};
use crate::state::BotState;

const HINT: &str = "Send /menu to open your menu.";

/// Who may invoke an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Worker,
    /// Managers and admins.
    Staff,
    Admin,
    /// The configured super user, whatever its role.
    SuperUser,
}

impl Gate {
    #[must_use]
    pub const fn admits(self, caller: &Caller) -> bool {
        match self {
            Self::Worker => matches!(caller.role, Role::Worker),
            Self::Staff => caller.role.can_top_up(),
            Self::Admin => matches!(caller.role, Role::Admin),
            Self::SuperUser => caller.is_super,
        }
    }
}

/// Every action a button can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    ShowBalance,
    Market,
    Buy,
    History,
    TopUpStart,
    TopUpSelectWorker,
    TopUpAmount,
    Roster,
    SelectWorkerPage,
    Approve,
    Reject,
    CorrectionMenu,
    Correction,
    SetField,
    AccessLevel,
    ChangeRole,
    ConfirmAdmin,
    CancelAdmin,
    ShopEdit,
    ShopChoose,
    ShopAdd,
    ShopEditItem,
    ShopEditField,
    ShopDelete,
    Orders,
    Order,
    SuperTransition,
    SuperAccess,
}

/// Tokens without arguments.
const EXACT: &[(&str, ActionKind)] = &[
    ("show_balance", ActionKind::ShowBalance),
    ("menu_market", ActionKind::Market),
    ("history_orders", ActionKind::History),
    ("topup_", ActionKind::TopUpStart),
    ("menu_list", ActionKind::Roster),
    ("menu_admin_setbal", ActionKind::CorrectionMenu),
    ("accesslevel", ActionKind::AccessLevel),
    ("cancelAdmin", ActionKind::CancelAdmin),
    ("shop_edit", ActionKind::ShopEdit),
    ("shop_edit:choose", ActionKind::ShopChoose),
    ("shop_edit:shop_add", ActionKind::ShopAdd),
    ("orders", ActionKind::Orders),
    ("super_user:transition", ActionKind::SuperTransition),
    ("super_user:access", ActionKind::SuperAccess),
];

/// Tokens followed by arguments.
const PREFIXED: &[(&str, ActionKind)] = &[
    ("buy_product:", ActionKind::Buy),
    ("topup_select_worker:", ActionKind::TopUpSelectWorker),
    ("topup_amount:", ActionKind::TopUpAmount),
    ("select_worker:", ActionKind::SelectWorkerPage),
    ("approve:", ActionKind::Approve),
    ("reject:", ActionKind::Reject),
    ("correction:", ActionKind::Correction),
    ("setfield:", ActionKind::SetField),
    ("changeRole:", ActionKind::ChangeRole),
    ("confirmAdmin:", ActionKind::ConfirmAdmin),
    ("shop_edititem:", ActionKind::ShopEditItem),
    ("shop_editfield:", ActionKind::ShopEditField),
    ("shop_editdel:", ActionKind::ShopDelete),
    ("orders_order:", ActionKind::Order),
];

impl ActionKind {
    /// Split a payload into its action and the raw argument string.
    #[must_use]
    pub fn classify(payload: &str) -> Option<(Self, &str)> {
        if let Some((_, kind)) = EXACT.iter().find(|(token, _)| *token == payload) {
            return Some((*kind, ""));
        }
        PREFIXED.iter().find_map(|(prefix, kind)| {
            payload.strip_prefix(prefix).map(|args| (*kind, args))
        })
    }

    /// Who may invoke the action. Only the picker purpose is looked at, so
    /// correction pages stay admin-only.
    #[must_use]
    pub fn gate(self, args: &str) -> Gate {
        match self {
            Self::ShowBalance | Self::Market | Self::Buy | Self::History => Gate::Worker,
            Self::TopUpStart | Self::TopUpSelectWorker | Self::TopUpAmount | Self::Roster => {
                Gate::Staff
            }
            Self::SelectWorkerPage if args.ends_with(":correction") => Gate::Admin,
            Self::SelectWorkerPage => Gate::Staff,
            Self::SuperTransition | Self::SuperAccess => Gate::SuperUser,
            _ => Gate::Admin,
        }
    }
}

fn arg<T: FromStr>(raw: &str) -> Result<T, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Validation("Malformed action.".to_string()))
}

fn two_args(raw: &str) -> Result<(&str, &str), AppError> {
    raw.split_once(':')
        .ok_or_else(|| AppError::Validation("Malformed action.".to_string()))
}

/// Routes inbound events to the services.
pub struct Dispatcher<G> {
    state: BotState<G>,
}

impl<G> Clone for Dispatcher<G> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<G: Gateway> Dispatcher<G> {
    #[must_use]
    pub const fn new(state: BotState<G>) -> Self {
        Self { state }
    }

    #[must_use]
    pub const fn state(&self) -> &BotState<G> {
        &self.state
    }

    /// Handle one inbound event. Returns the toast for callback events.
    #[instrument(skip(self, event), fields(user_id = %event.sender()))]
    pub async fn handle(&self, event: InboundEvent) -> Option<String> {
        match event {
            InboundEvent::Message(message) => {
                set_sentry_user(message.sender.as_i64(), Some(message.username.as_str()));
                self.handle_message(&message).await;
                None
            }
            InboundEvent::Callback(action) => {
                set_sentry_user(action.sender.as_i64(), None);
                self.handle_callback(&action).await
            }
        }
    }

    /// Free text: registration, then `/menu`, then the conversation in progress.
    pub async fn handle_message(&self, message: &TextMessage) {
        let registration = RegistrationService::new(&self.state);
        let result = match registration.handle_message(message).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => self.route_text(message).await,
            Err(e) => Err(e),
        };
        self.respond(message.sender, result).await;
    }

    async fn route_text(&self, message: &TextMessage) -> Result<Reply, AppError> {
        let caller =
            Caller::resolve(self.state.pool(), message.sender, self.state.super_user()).await?;

        let wants_menu = message.command.as_deref() == Some("menu")
            || message.text.trim().eq_ignore_ascii_case("menu");
        if wants_menu {
            return Ok(main_menu(caller.role, caller.is_super));
        }
        if message.command.is_some() {
            return Ok(Reply::text(HINT));
        }

        self.continue_conversation(&caller, &message.text).await
    }

    async fn continue_conversation(&self, caller: &Caller, text: &str) -> Result<Reply, AppError> {
        let conversations = self.state.conversations();
        let Some(state) = conversations.get(caller.id).await else {
            return Ok(Reply::text(HINT));
        };

        let gate = match state {
            ConversationState::SuperEnterprise | ConversationState::SuperRole => Gate::SuperUser,
            _ => Gate::Admin,
        };
        if !gate.admits(caller) {
            conversations.clear(caller.id).await;
            return Err(AppError::AccessDenied(caller.role));
        }

        let staff = StaffService::new(&self.state);
        let catalog = CatalogService::new(&self.state);

        match state {
            ConversationState::AwaitingFieldValue { target, field } => {
                conversations.clear(caller.id).await;
                staff.apply_field(caller, target, field, text).await
            }
            ConversationState::AwaitingRoleTarget { role } => {
                conversations.clear(caller.id).await;
                staff.role_target(caller, role, text).await
            }
            ConversationState::ConfirmAdmin { .. } => Ok(Reply::text(
                "Please confirm or cancel with the buttons above.",
            )),
            ConversationState::ProductPrice { product } => {
                catalog
                    .submit_field(caller, ProductField::Price, product, text)
                    .await
            }
            ConversationState::ProductRemaining { product } => {
                catalog
                    .submit_field(caller, ProductField::Remaining, product, text)
                    .await
            }
            ConversationState::NewProductName => catalog.submit_name(caller, text).await,
            ConversationState::NewProductPrice { name } => {
                catalog.submit_price(caller, name, text).await
            }
            ConversationState::NewProductRemaining { name, price } => {
                catalog.submit_remaining(caller, name, price, text).await
            }
            ConversationState::SuperEnterprise => staff.set_super_enterprise(caller, text).await,
            ConversationState::SuperRole => staff.set_super_role(caller, text).await,
        }
    }

    /// Button press: gate, then route. Returns the toast to show.
    pub async fn handle_callback(&self, action: &CallbackAction) -> Option<String> {
        let result = self.route_callback(action).await;
        self.respond(action.sender, result).await
    }

    async fn route_callback(&self, action: &CallbackAction) -> Result<Reply, AppError> {
        let caller =
            Caller::resolve(self.state.pool(), action.sender, self.state.super_user()).await?;

        let Some((kind, args)) = ActionKind::classify(&action.payload) else {
            info!(user_id = %caller.id, payload = %action.payload, "Unknown action");
            return Err(AppError::AccessDenied(caller.role));
        };
        if !kind.gate(args).admits(&caller) {
            info!(
                user_id = %caller.id,
                role = %caller.role,
                action = ?kind,
                "Access denied"
            );
            return Err(AppError::AccessDenied(caller.role));
        }

        self.run(kind, args, &caller).await
    }

    async fn run(&self, kind: ActionKind, args: &str, caller: &Caller) -> Result<Reply, AppError> {
        let commerce = CommerceService::new(&self.state);
        let staff = StaffService::new(&self.state);
        let catalog = CatalogService::new(&self.state);
        let registration = RegistrationService::new(&self.state);

        match kind {
            ActionKind::ShowBalance => commerce.balance(caller).await,
            ActionKind::Market => commerce.market(caller).await,
            ActionKind::Buy => commerce.purchase(caller, arg(args)?).await,
            ActionKind::History => commerce.history(caller).await,
            ActionKind::TopUpStart => staff.worker_picker(caller, PickerPurpose::TopUp, 0).await,
            ActionKind::TopUpSelectWorker => commerce.top_up_amounts(caller, arg(args)?).await,
            ActionKind::TopUpAmount => {
                let (amount, worker) = two_args(args)?;
                commerce.top_up(caller, arg(worker)?, arg(amount)?).await
            }
            ActionKind::Roster => staff.roster(caller).await,
            ActionKind::SelectWorkerPage => {
                let (page, purpose) = two_args(args)?;
                staff.worker_picker(caller, arg(purpose)?, arg(page)?).await
            }
            ActionKind::Approve => {
                let (role, applicant) = two_args(args)?;
                registration.approve(caller, arg(applicant)?, arg(role)?).await
            }
            ActionKind::Reject => registration.reject(caller, arg(args)?).await,
            ActionKind::CorrectionMenu => {
                staff.worker_picker(caller, PickerPurpose::Correction, 0).await
            }
            ActionKind::Correction => staff.begin_correction(caller, arg(args)?).await,
            ActionKind::SetField => staff.choose_field(caller, arg(args)?).await,
            ActionKind::AccessLevel => Ok(StaffService::<G>::role_picker()),
            ActionKind::ChangeRole => {
                let role: Role = arg(args)?;
                if !Role::ASSIGNABLE.contains(&role) {
                    return Err(AppError::Validation("Unknown role.".to_string()));
                }
                Ok(staff.begin_role_change(caller, role).await)
            }
            ActionKind::ConfirmAdmin => staff.confirm_admin(caller, args).await,
            ActionKind::CancelAdmin => Ok(staff.cancel_admin(caller).await),
            ActionKind::ShopEdit => Ok(CatalogService::<G>::editor_menu()),
            ActionKind::ShopChoose => catalog.choose(caller).await,
            ActionKind::ShopAdd => Ok(catalog.begin_add(caller).await),
            ActionKind::ShopEditItem => catalog.item_menu(caller, arg(args)?).await,
            ActionKind::ShopEditField => {
                let (field, product) = two_args(args)?;
                catalog.begin_edit(caller, arg(field)?, arg(product)?).await
            }
            ActionKind::ShopDelete => catalog.delete(caller, arg(args)?).await,
            ActionKind::Orders => commerce.pending_orders(caller).await,
            ActionKind::Order => match args.split_once(':') {
                None => commerce.order_card(caller, arg(args)?).await,
                Some((order, decision)) => {
                    commerce
                        .resolve_order(caller, arg(order)?, arg(decision)?)
                        .await
                }
            },
            ActionKind::SuperTransition => Ok(staff.begin_super_enterprise(caller).await),
            ActionKind::SuperAccess => Ok(staff.begin_super_role(caller).await),
        }
    }

    /// Deliver the outcome to the caller and hand back the toast, if any.
    async fn respond(&self, to: UserId, result: Result<Reply, AppError>) -> Option<String> {
        match result {
            Ok(mut reply) => {
                let toast = reply.toast.take();
                if !reply.text.is_empty() {
                    self.state.notifier().reply(to, reply).await;
                }
                toast
            }
            Err(e) => {
                e.report();
                self.state.notifier().text(to, e.user_message()).await;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crewstore_core::EnterpriseId;

    fn caller(role: Role, is_super: bool) -> Caller {
        Caller {
            id: UserId::new(1),
            role,
            enterprise: Some(EnterpriseId::new(10)),
            is_super,
        }
    }

    #[test]
    fn test_classify_exact_before_prefix() {
        assert_eq!(
            ActionKind::classify("topup_"),
            Some((ActionKind::TopUpStart, ""))
        );
        assert_eq!(
            ActionKind::classify("shop_edit:choose"),
            Some((ActionKind::ShopChoose, ""))
        );
        assert_eq!(
            ActionKind::classify("topup_amount:2:42"),
            Some((ActionKind::TopUpAmount, "2:42"))
        );
        assert_eq!(
            ActionKind::classify("orders_order:7:deny"),
            Some((ActionKind::Order, "7:deny"))
        );
        assert_eq!(ActionKind::classify("drop_tables"), None);
        assert_eq!(ActionKind::classify(""), None);
    }

    #[test]
    fn test_every_action_is_reachable() {
        let tokens = EXACT.iter().chain(PREFIXED.iter());
        for (token, kind) in tokens {
            let (classified, _) = ActionKind::classify(token).unwrap();
            assert_eq!(classified, *kind, "token {token}");
        }
    }

    #[test]
    fn test_gates() {
        let worker = caller(Role::Worker, false);
        let manager = caller(Role::Manager, false);
        let admin = caller(Role::Admin, false);

        assert!(ActionKind::Buy.gate("3").admits(&worker));
        assert!(!ActionKind::Buy.gate("3").admits(&admin));

        assert!(ActionKind::TopUpAmount.gate("1:2").admits(&manager));
        assert!(ActionKind::TopUpAmount.gate("1:2").admits(&admin));
        assert!(!ActionKind::TopUpAmount.gate("1:2").admits(&worker));

        assert!(ActionKind::SelectWorkerPage.gate("1:topup").admits(&manager));
        assert!(!ActionKind::SelectWorkerPage.gate("1:correction").admits(&manager));
        assert!(ActionKind::SelectWorkerPage.gate("1:correction").admits(&admin));

        assert!(!ActionKind::Order.gate("1:accept").admits(&manager));
        assert!(!ActionKind::SuperAccess.gate("").admits(&admin));
        assert!(ActionKind::SuperAccess.gate("").admits(&caller(Role::Unset, true)));
    }

    #[test]
    fn test_arg_parsing() {
        assert_eq!(two_args("2:42").unwrap(), ("2", "42"));
        assert!(two_args("42").is_err());
        let id: UserId = arg(" 42 ").unwrap();
        assert_eq!(id, UserId::new(42));
        assert!(arg::<UserId>("x").is_err());
    }
}
