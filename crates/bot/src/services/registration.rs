//! Registration state machine.
//!
//! `/start` puts an identity into `waiting_registration_data`; the next
//! message must be the profile line `<schedule> <name…> <enterprise>`. Any
//! failure drops the identity back to no state and asks for `/start` again.

use tracing::{info, instrument};

use crewstore_core::{EnterpriseId, RegistrationState, Role, UserId};

use super::Caller;
use crate::db::{RepositoryError, UserRepository};
use crate::error::AppError;
use crate::gateway::{Button, Gateway, Reply, TextMessage};
use crate::models::RegistrationProfile;
use crate::state::BotState;

const PROFILE_PROMPT: &str = "Send your details in one message:\n\
    [schedule number] [first and last name] [enterprise number]\n\
    For example: 15 Petr Ivanov 11047";

const RESTART_HINT: &str = "Send /start to register again.";

/// Stale approve/reject buttons land here once the applicant was decided.
fn already_decided(err: RepositoryError) -> AppError {
    match err {
        RepositoryError::AlreadyProcessed => {
            AppError::Validation("This application was already processed.".to_string())
        }
        err => err.into(),
    }
}

/// Parse a profile line.
///
/// The first token is the schedule number, the last the enterprise number,
/// and everything between them is the name.
///
/// # Errors
///
/// Returns a user-facing reason when the line does not match.
pub fn parse_profile(text: &str) -> Result<RegistrationProfile, String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();

    let [schedule, name @ .., enterprise] = tokens.as_slice() else {
        return Err("Expected: schedule number, name, enterprise number.".to_string());
    };
    if name.is_empty() {
        return Err("The name is missing.".to_string());
    }

    let schedule: i64 = schedule
        .parse()
        .ok()
        .filter(|n| *n >= 0)
        .ok_or_else(|| "The schedule number must be a number.".to_string())?;
    let enterprise: i64 = enterprise
        .parse()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| "The enterprise number must be a number.".to_string())?;

    Ok(RegistrationProfile {
        schedule_number: schedule.to_string(),
        name: name.join(" "),
        enterprise_id: EnterpriseId::new(enterprise),
    })
}

/// Drives identities through registration and admin approval.
pub struct RegistrationService<'a, G> {
    state: &'a BotState<G>,
}

impl<'a, G: Gateway> RegistrationService<'a, G> {
    #[must_use]
    pub const fn new(state: &'a BotState<G>) -> Self {
        Self { state }
    }

    fn users(&self) -> UserRepository<'_> {
        UserRepository::new(self.state.pool())
    }

    /// `/start`: create or reset the identity and ask for the profile line.
    ///
    /// # Errors
    ///
    /// Returns `AppError::StoreUnavailable` if the store write fails.
    #[instrument(skip(self, username), fields(user_id = %user))]
    pub async fn start(&self, user: UserId, username: &str) -> Result<Reply, AppError> {
        self.users()
            .start_registration(user, username, self.state.now())
            .await?;
        self.state.conversations().clear(user).await;

        info!(user_id = %user, "Registration started");
        Ok(Reply::text(format!(
            "Welcome! Let's get you registered.\n{PROFILE_PROMPT}"
        )))
    }

    /// Handle a message if it belongs to registration.
    ///
    /// Returns `Ok(None)` when the sender is not registering or sent a command
    /// other than `/start`, so routing continues with the next handler.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` or `AppError::Conflict` when the profile
    /// line is rejected (the registration is reset first), and
    /// `AppError::StoreUnavailable` on store failures.
    pub async fn handle_message(&self, message: &TextMessage) -> Result<Option<Reply>, AppError> {
        if message.command.as_deref() == Some("start") {
            return self.start(message.sender, &message.username).await.map(Some);
        }
        if message.command.is_some() {
            return Ok(None);
        }

        let Some(user) = self.users().get(message.sender).await? else {
            return Ok(None);
        };
        if user.reg_state != RegistrationState::WaitingRegistrationData {
            return Ok(None);
        }

        let timeout = self.state.rules().registration_timeout_secs;
        let expired = user
            .reg_started_at
            .is_some_and(|started| self.state.now() - started > timeout);
        if expired {
            self.users().reset_registration(user.id).await?;
            info!(user_id = %user.id, "Registration timed out");
            return Ok(Some(Reply::text(format!(
                "⌛ Time for registration is up. {RESTART_HINT}"
            ))));
        }

        self.complete(user.id, &message.text).await.map(Some)
    }

    #[instrument(skip(self, text), fields(user_id = %user))]
    async fn complete(&self, user: UserId, text: &str) -> Result<Reply, AppError> {
        let profile = match parse_profile(text) {
            Ok(profile) => profile,
            Err(reason) => {
                self.users().reset_registration(user).await?;
                return Err(AppError::Validation(format!("{reason} {RESTART_HINT}")));
            }
        };

        let admin = match self.users().complete_registration(user, &profile).await {
            Ok(Some(admin)) => admin,
            Ok(None) => {
                self.users().reset_registration(user).await?;
                return Err(AppError::Validation(format!(
                    "Enterprise {} has no administrator. {RESTART_HINT}",
                    profile.enterprise_id
                )));
            }
            Err(RepositoryError::Conflict(what)) => {
                self.users().reset_registration(user).await?;
                return Err(AppError::Conflict(format!(
                    "{what}. Send /start to register again"
                )));
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            user_id = %user,
            admin_id = %admin,
            enterprise_id = %profile.enterprise_id,
            "Registration submitted"
        );

        let request = Reply::text(format!(
            "🆕 New registration request:\n\
             Schedule number: {}\nName: {}\nEnterprise: {}",
            profile.schedule_number, profile.name, profile.enterprise_id
        ))
        .with_row(vec![
            Button::new("✅ Worker", format!("approve:worker:{user}")),
            Button::new("✅ Manager", format!("approve:manager:{user}")),
        ])
        .with_row(vec![Button::new("❌ Reject", format!("reject:{user}"))]);
        self.state.notifier().reply(admin, request).await;

        Ok(Reply::text(
            "✅ Thank you! Your request was sent to the enterprise administrator. \
             You will be notified once it is reviewed.",
        ))
    }

    /// Approve an applicant of the caller's enterprise as worker or manager.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for roles other than worker/manager,
    /// `AppError::NotFound` for unknown applicants and `AppError::CrossTenant`
    /// for applicants of another enterprise. An applicant that was already
    /// decided yields `AppError::Validation`.
    #[instrument(skip(self, caller), fields(admin_id = %caller.id, applicant = %applicant))]
    pub async fn approve(
        &self,
        caller: &Caller,
        applicant: UserId,
        role: Role,
    ) -> Result<Reply, AppError> {
        if !matches!(role, Role::Worker | Role::Manager) {
            return Err(AppError::Validation(format!(
                "Applicants can't be approved as {role}."
            )));
        }

        let user = self
            .users()
            .get(applicant)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("applicant {applicant}")))?;
        caller.same_enterprise(user.enterprise_id)?;

        self.users()
            .approve(applicant, role)
            .await
            .map_err(already_decided)?;
        info!(applicant = %applicant, %role, "Registration approved");

        self.state
            .notifier()
            .text(
                applicant,
                format!("✅ Your registration was approved! Your role: {role}.\nSend /menu to open your menu."),
            )
            .await;

        Ok(Reply::text(format!("{} approved as {role}.", user.label())).with_toast("User approved."))
    }

    /// Reject an applicant of the caller's enterprise.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown applicants and
    /// `AppError::CrossTenant` for applicants of another enterprise.
    #[instrument(skip(self, caller), fields(admin_id = %caller.id, applicant = %applicant))]
    pub async fn reject(&self, caller: &Caller, applicant: UserId) -> Result<Reply, AppError> {
        let user = self
            .users()
            .get(applicant)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("applicant {applicant}")))?;
        caller.same_enterprise(user.enterprise_id)?;

        self.users()
            .reject(applicant)
            .await
            .map_err(already_decided)?;
        info!(applicant = %applicant, "Registration rejected");

        self.state
            .notifier()
            .text(
                applicant,
                format!("❌ Your registration was rejected. {RESTART_HINT}"),
            )
            .await;

        Ok(Reply::text(format!("{}: application rejected.", user.label()))
            .with_toast("Application rejected."))
    }
}
