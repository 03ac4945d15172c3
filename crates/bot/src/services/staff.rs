//! Staff administration: worker pickers, roster, role changes, profile
//! corrections and super-user self-service.

use tracing::{info, instrument};

use crewstore_core::{EnterpriseId, Role, UserId};

use super::Caller;
use crate::conversation::ConversationState;
use crate::db::{RepositoryError, UserRepository};
use crate::error::AppError;
use crate::gateway::{Button, Gateway, Reply};
use crate::models::user::parse_non_negative;
use crate::models::{Correction, CorrectionField, User};
use crate::state::BotState;

/// Workers per picker page.
pub const WORKER_PAGE_SIZE: u32 = 15;

/// What picking a worker leads to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerPurpose {
    /// Top-up amount picker.
    TopUp,
    /// Field correction menu.
    Correction,
}

impl PickerPurpose {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TopUp => "topup",
            Self::Correction => "correction",
        }
    }

    /// Payload prefix of the button that selects one worker.
    const fn select_action(self) -> &'static str {
        match self {
            Self::TopUp => "topup_select_worker",
            Self::Correction => "correction",
        }
    }
}

impl std::str::FromStr for PickerPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "topup" => Ok(Self::TopUp),
            "correction" => Ok(Self::Correction),
            other => Err(format!("unknown picker purpose: {other}")),
        }
    }
}

fn profile_card(user: &User) -> String {
    format!(
        "{}\nRole: {}\nBalance: {}🌟",
        user.label(),
        user.role,
        user.balance
    )
}

/// Admin and manager tooling over identities.
pub struct StaffService<'a, G> {
    state: &'a BotState<G>,
}

impl<'a, G: Gateway> StaffService<'a, G> {
    #[must_use]
    pub const fn new(state: &'a BotState<G>) -> Self {
        Self { state }
    }

    fn users(&self) -> UserRepository<'_> {
        UserRepository::new(self.state.pool())
    }

    /// Load `target` and check it shares the caller's enterprise.
    async fn colleague(&self, caller: &Caller, target: UserId) -> Result<User, AppError> {
        let user = self
            .users()
            .get(target)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {target}")))?;
        caller.same_enterprise(user.enterprise_id)?;
        Ok(user)
    }

    // =========================================================================
    // Pickers and views
    // =========================================================================

    /// One page of verified workers with back/next navigation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the caller has no enterprise.
    pub async fn worker_picker(
        &self,
        caller: &Caller,
        purpose: PickerPurpose,
        page: u32,
    ) -> Result<Reply, AppError> {
        let enterprise = caller.enterprise()?;
        let listing = self
            .users()
            .list_workers_page(enterprise, page, WORKER_PAGE_SIZE)
            .await?;

        if listing.total == 0 {
            return Ok(Reply::text("❌ There are no workers in your enterprise."));
        }
        if listing.workers.is_empty() {
            return Err(AppError::Validation("That page doesn't exist.".to_string()));
        }

        let mut reply = Reply::text(format!("Choose a worker (page {}):", page + 1));
        for worker in &listing.workers {
            reply = reply.with_row(vec![Button::new(
                worker.label(),
                format!("{}:{}", purpose.select_action(), worker.id),
            )]);
        }

        let mut nav = Vec::new();
        if page > 0 {
            nav.push(Button::new(
                "⬅️ Back",
                format!("select_worker:{}:{}", page - 1, purpose.as_str()),
            ));
        }
        let shown = i64::from(page + 1) * i64::from(WORKER_PAGE_SIZE);
        if shown < listing.total {
            nav.push(Button::new(
                "➡️ Next",
                format!("select_worker:{}:{}", page + 1, purpose.as_str()),
            ));
        }
        Ok(reply.with_row(nav))
    }

    /// Everyone in the caller's enterprise with role and balance.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the caller has no enterprise.
    pub async fn roster(&self, caller: &Caller) -> Result<Reply, AppError> {
        let staff = self.users().roster(caller.enterprise()?).await?;
        if staff.is_empty() {
            return Ok(Reply::text("Nobody is registered yet."));
        }

        let lines: Vec<String> = staff
            .iter()
            .map(|u| format!("{}|{}|{}🌟", u.label(), u.role, u.balance))
            .collect();
        Ok(Reply::text(format!("Current staff:\n{}", lines.join("\n"))))
    }

    // =========================================================================
    // Corrections
    // =========================================================================

    /// Select `target` for correction and offer the editable fields.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` or `AppError::CrossTenant`.
    #[instrument(skip(self, caller), fields(admin_id = %caller.id, target = %target))]
    pub async fn begin_correction(&self, caller: &Caller, target: UserId) -> Result<Reply, AppError> {
        let user = self.colleague(caller, target).await?;
        self.users()
            .set_scratch(caller.id, Some(target.as_i64()))
            .await?;

        Ok(Reply::text(format!(
            "You selected:\n{}\n\nWhat do you want to correct?",
            profile_card(&user)
        ))
        .with_row(vec![
            Button::new("💰 Balance", "setfield:balance"),
            Button::new("✏️ Name", "setfield:name"),
        ])
        .with_row(vec![
            Button::new("🔢 Schedule number", "setfield:schedule"),
            Button::new("🗑️ Delete", "setfield:delete"),
        ]))
    }

    /// Pick the field to correct on the stashed target; `delete` acts at once.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if no target was selected first.
    #[instrument(skip(self, caller), fields(admin_id = %caller.id, %field))]
    pub async fn choose_field(
        &self,
        caller: &Caller,
        field: CorrectionField,
    ) -> Result<Reply, AppError> {
        let target = self
            .users()
            .scratch(caller.id)
            .await?
            .map(UserId::new)
            .ok_or_else(|| AppError::Validation("Pick a worker first.".to_string()))?;
        let user = self.colleague(caller, target).await?;

        if field == CorrectionField::Delete {
            self.users().delete(target).await?;
            self.users().set_scratch(caller.id, None).await?;
            self.state.conversations().clear(caller.id).await;
            info!(target = %target, "User deleted");
            return Ok(Reply::text(format!("✅ {} deleted.", user.label())));
        }

        self.state
            .conversations()
            .begin(
                caller.id,
                ConversationState::AwaitingFieldValue { target, field },
            )
            .await;
        Ok(Reply::text(format!("Enter the new value ({field}):")))
    }

    /// Validate and apply the collected value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for bad input and `AppError::Conflict`
    /// for a schedule number already in use.
    #[instrument(skip(self, caller, raw), fields(admin_id = %caller.id, target = %target, %field))]
    pub async fn apply_field(
        &self,
        caller: &Caller,
        target: UserId,
        field: CorrectionField,
        raw: &str,
    ) -> Result<Reply, AppError> {
        let correction = Correction::parse(field, raw).map_err(AppError::Validation)?;
        self.colleague(caller, target).await?;

        self.users().apply_correction(target, &correction).await?;
        self.users().set_scratch(caller.id, None).await?;
        info!(target = %target, %field, "Profile corrected");

        Ok(Reply::text("✅ Field updated!"))
    }

    // =========================================================================
    // Role changes
    // =========================================================================

    /// Role picker for `accesslevel`.
    #[must_use]
    pub fn role_picker() -> Reply {
        Reply::text("Choose the role to assign:").with_row(
            Role::ASSIGNABLE
                .iter()
                .map(|role| Button::new(role.to_string(), format!("changeRole:{role}")))
                .collect(),
        )
    }

    /// Start collecting the schedule number that receives `role`.
    pub async fn begin_role_change(&self, caller: &Caller, role: Role) -> Reply {
        self.state
            .conversations()
            .begin(caller.id, ConversationState::AwaitingRoleTarget { role })
            .await;
        Reply::text(format!(
            "Enter the schedule number of the person who should become {role}:"
        ))
    }

    /// Apply a role to the identity with the given schedule number. Handing
    /// over the admin role asks for confirmation first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for a malformed schedule number and
    /// `AppError::NotFound` if nobody in the enterprise has it.
    #[instrument(skip(self, caller, raw), fields(admin_id = %caller.id, %role))]
    pub async fn role_target(&self, caller: &Caller, role: Role, raw: &str) -> Result<Reply, AppError> {
        let schedule = parse_non_negative(raw)
            .map_err(AppError::Validation)?
            .to_string();

        if role == Role::Admin {
            self.state
                .conversations()
                .begin(
                    caller.id,
                    ConversationState::ConfirmAdmin {
                        schedule_number: schedule.clone(),
                    },
                )
                .await;
            return Ok(Reply::text(format!(
                "You selected schedule number {schedule}.\n\
                 Make this person the administrator? You will become a manager."
            ))
            .with_row(vec![
                Button::new("✅ Yes", format!("confirmAdmin:{schedule}")),
                Button::new("❌ No", "cancelAdmin"),
            ]));
        }

        self.change_role(caller, &schedule, role).await
    }

    /// Confirm an admin hand-over started with [`Self::role_target`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if no matching hand-over is pending.
    pub async fn confirm_admin(&self, caller: &Caller, schedule: &str) -> Result<Reply, AppError> {
        match self.state.conversations().take(caller.id).await {
            Some(ConversationState::ConfirmAdmin { schedule_number }) if schedule_number == schedule => {
                self.change_role(caller, schedule, Role::Admin).await
            }
            _ => Err(AppError::Validation(
                "Nothing to confirm. Please start over.".to_string(),
            )),
        }
    }

    /// Abandon a pending admin hand-over.
    pub async fn cancel_admin(&self, caller: &Caller) -> Reply {
        self.state.conversations().clear(caller.id).await;
        Reply::text("✅ Operation cancelled!")
    }

    async fn change_role(&self, caller: &Caller, schedule: &str, role: Role) -> Result<Reply, AppError> {
        let enterprise = caller.enterprise()?;
        let user = self
            .users()
            .change_role_by_schedule(caller.id, enterprise, schedule, role)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => {
                    AppError::NotFound(format!("schedule number {schedule}"))
                }
                other => other.into(),
            })?;

        info!(target = %user.id, %role, "Role changed");
        self.state
            .notifier()
            .text(user.id, format!("Your role is now: {role}.\nSend /menu to open your menu."))
            .await;

        let demoted = role == Role::Admin && user.id != caller.id;
        let text = if demoted {
            format!("✅ {} is now the admin. You are now a manager.", user.label())
        } else {
            format!("✅ {} is now {role}.", user.label())
        };
        Ok(Reply::text(text))
    }

    // =========================================================================
    // Super user
    // =========================================================================

    /// Ask the super user for the enterprise to move to.
    pub async fn begin_super_enterprise(&self, caller: &Caller) -> Reply {
        self.state
            .conversations()
            .begin(caller.id, ConversationState::SuperEnterprise)
            .await;
        Reply::text("Enter the enterprise number:")
    }

    /// Ask the super user for the role to take.
    pub async fn begin_super_role(&self, caller: &Caller) -> Reply {
        self.state
            .conversations()
            .begin(caller.id, ConversationState::SuperRole)
            .await;
        Reply::text("Enter the role (worker, manager or admin):")
    }

    /// Move the super user to another enterprise. Bad input keeps the prompt open.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for a malformed number and
    /// `AppError::NotFound` if the super user has no record yet.
    #[instrument(skip(self, caller, raw), fields(user_id = %caller.id))]
    pub async fn set_super_enterprise(&self, caller: &Caller, raw: &str) -> Result<Reply, AppError> {
        let enterprise = parse_non_negative(raw)
            .ok()
            .filter(|n| *n > 0)
            .map(EnterpriseId::new)
            .ok_or_else(|| {
                AppError::Validation("Enter a positive enterprise number.".to_string())
            })?;

        self.state.conversations().clear(caller.id).await;
        self.users().set_enterprise(caller.id, enterprise).await?;
        info!(%enterprise, "Super user changed enterprise");
        Ok(Reply::text(format!("New enterprise number: {enterprise}")))
    }

    /// Give the super user a role.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for unknown roles.
    #[instrument(skip(self, caller, raw), fields(user_id = %caller.id))]
    pub async fn set_super_role(&self, caller: &Caller, raw: &str) -> Result<Reply, AppError> {
        self.state.conversations().clear(caller.id).await;
        let role = raw
            .trim()
            .to_ascii_lowercase()
            .parse::<Role>()
            .ok()
            .filter(|r| Role::ASSIGNABLE.contains(r))
            .ok_or_else(|| {
                AppError::Validation("Unknown role; use worker, manager or admin.".to_string())
            })?;

        self.users().set_role(caller.id, role).await?;
        info!(%role, "Super user changed role");
        Ok(Reply::text(format!("New role: {role}")))
    }
}
