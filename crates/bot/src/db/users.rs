//! User repository: identities, roles, balances and registration progress.

use sqlx::SqlitePool;

use crewstore_core::{EnterpriseId, RegistrationState, Role, UserId};

use super::{RepositoryError, with_busy_retry};
use crate::models::{Correction, RegistrationProfile, TopUpOutcome, User};

const SCHEDULE_TAKEN: &str = "This schedule number is already registered in the enterprise";

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for user queries.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    name: String,
    schedule_number: String,
    enterprise_id: Option<i64>,
    role: String,
    verified: bool,
    balance: i64,
    last_topup_at: i64,
    reg_state: String,
    reg_started_at: Option<i64>,
    scratch: Option<i64>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row.role.parse::<Role>().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid role for user {}: {e}", row.id))
        })?;
        let reg_state = row.reg_state.parse::<RegistrationState>().map_err(|e| {
            RepositoryError::DataCorruption(format!(
                "invalid registration state for user {}: {e}",
                row.id
            ))
        })?;

        Ok(Self {
            id: UserId::new(row.id),
            username: row.username,
            name: row.name,
            schedule_number: row.schedule_number,
            enterprise_id: row.enterprise_id.map(EnterpriseId::new),
            role,
            verified: row.verified,
            balance: row.balance,
            last_topup_at: row.last_topup_at,
            reg_state,
            reg_started_at: row.reg_started_at,
            scratch: row.scratch,
        })
    }
}

/// One page of the verified-worker picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPage {
    pub workers: Vec<User>,
    /// Verified workers in the enterprise across all pages.
    pub total: i64,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for identity records.
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a user by chat identity.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored row is invalid.
    pub async fn get(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, username, name, schedule_number, enterprise_id, role, verified,
                   balance, last_topup_at, reg_state, reg_started_at, scratch
            FROM users
            WHERE id = ?
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Current balance of a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn balance(&self, id: UserId) -> Result<i64, RepositoryError> {
        sqlx::query_scalar::<_, i64>("SELECT balance FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Create the identity if needed and (re)enter the waiting state.
    ///
    /// Clears any previously collected profile so the next message is parsed
    /// as a fresh registration line. Role, verification and the ledger are
    /// dropped too: a re-registered identity is an applicant again until an
    /// admin approves it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    #[tracing::instrument(skip(self, username), fields(user_id = %id))]
    pub async fn start_registration(
        &self,
        id: UserId,
        username: &str,
        now: i64,
    ) -> Result<(), RepositoryError> {
        with_busy_retry("start_registration", || async move {
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                r"
                INSERT INTO users (id, username) VALUES (?, ?)
                ON CONFLICT (id) DO UPDATE SET username = excluded.username
                ",
            )
            .bind(id)
            .bind(username)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r"
                UPDATE users
                SET reg_state = ?, name = '', schedule_number = '', enterprise_id = NULL,
                    reg_started_at = ?, role = ?, verified = 0, balance = 0,
                    last_topup_at = 0, scratch = NULL
                WHERE id = ?
                ",
            )
            .bind(RegistrationState::WaitingRegistrationData.as_str())
            .bind(now)
            .bind(Role::Unset)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok::<_, RepositoryError>(())
        })
        .await
    }

    /// Drop any registration progress and the partially collected profile.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn reset_registration(&self, id: UserId) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE users
            SET reg_state = '', name = '', schedule_number = '', enterprise_id = NULL,
                reg_started_at = NULL
            WHERE id = ?
            ",
        )
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Persist a parsed profile and resolve the enterprise admin, atomically.
    ///
    /// Returns `Ok(None)` without writing anything when the enterprise has no
    /// admin. The admin is the lowest identity holding the role.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the schedule number is taken.
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    /// Returns `RepositoryError::Database` for other database errors.
    #[tracing::instrument(skip(self, profile), fields(user_id = %id, enterprise_id = %profile.enterprise_id))]
    pub async fn complete_registration(
        &self,
        id: UserId,
        profile: &RegistrationProfile,
    ) -> Result<Option<UserId>, RepositoryError> {
        with_busy_retry("complete_registration", || async move {
            let mut tx = self.pool.begin().await?;

            let admin = sqlx::query_scalar::<_, UserId>(
                r"
                SELECT id FROM users
                WHERE enterprise_id = ? AND role = ? AND id <> ?
                ORDER BY id
                LIMIT 1
                ",
            )
            .bind(profile.enterprise_id)
            .bind(Role::Admin)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(admin) = admin else {
                return Ok(None);
            };

            let updated = sqlx::query(
                r"
                UPDATE users
                SET name = ?, schedule_number = ?, enterprise_id = ?,
                    reg_state = '', reg_started_at = NULL
                WHERE id = ?
                ",
            )
            .bind(&profile.name)
            .bind(&profile.schedule_number)
            .bind(profile.enterprise_id)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::conflict_on_unique(e, SCHEDULE_TAKEN))?;

            if updated.rows_affected() == 0 {
                return Err(RepositoryError::NotFound);
            }

            tx.commit().await?;
            Ok::<_, RepositoryError>(Some(admin))
        })
        .await
    }

    /// Approve a pending applicant with `role`, starting it from a clean ledger.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::AlreadyProcessed` if the user is already verified.
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn approve(&self, id: UserId, role: Role) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE users
            SET role = ?, verified = 1, balance = 0, last_topup_at = 0
            WHERE id = ? AND verified = 0
            ",
        )
        .bind(role)
        .bind(id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(if self.get(id).await?.is_some() {
                RepositoryError::AlreadyProcessed
            } else {
                RepositoryError::NotFound
            });
        }
        Ok(())
    }

    /// Reject a pending applicant: clear verification and role.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::AlreadyProcessed` if the user is already verified.
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn reject(&self, id: UserId) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE users SET verified = 0, role = ? WHERE id = ? AND verified = 0")
                .bind(Role::Unset)
                .bind(id)
                .execute(self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(if self.get(id).await?.is_some() {
                RepositoryError::AlreadyProcessed
            } else {
                RepositoryError::NotFound
            });
        }
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The admin of an enterprise, lowest identity first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_admin(
        &self,
        enterprise: EnterpriseId,
    ) -> Result<Option<UserId>, RepositoryError> {
        let admin = sqlx::query_scalar::<_, UserId>(
            "SELECT id FROM users WHERE enterprise_id = ? AND role = ? ORDER BY id LIMIT 1",
        )
        .bind(enterprise)
        .bind(Role::Admin)
        .fetch_optional(self.pool)
        .await?;

        Ok(admin)
    }

    /// One page of verified workers, ordered by schedule number.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a stored row is invalid.
    pub async fn list_workers_page(
        &self,
        enterprise: EnterpriseId,
        page: u32,
        page_size: u32,
    ) -> Result<WorkerPage, RepositoryError> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE enterprise_id = ? AND role = ? AND verified = 1",
        )
        .bind(enterprise)
        .bind(Role::Worker)
        .fetch_one(self.pool)
        .await?;

        let rows = sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, username, name, schedule_number, enterprise_id, role, verified,
                   balance, last_topup_at, reg_state, reg_started_at, scratch
            FROM users
            WHERE enterprise_id = ? AND role = ? AND verified = 1
            ORDER BY CAST(schedule_number AS INTEGER), id
            LIMIT ? OFFSET ?
            ",
        )
        .bind(enterprise)
        .bind(Role::Worker)
        .bind(i64::from(page_size))
        .bind(i64::from(page) * i64::from(page_size))
        .fetch_all(self.pool)
        .await?;

        let workers = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(WorkerPage { workers, total })
    }

    /// Every identity of an enterprise, ordered by schedule number.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a stored row is invalid.
    pub async fn roster(&self, enterprise: EnterpriseId) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, username, name, schedule_number, enterprise_id, role, verified,
                   balance, last_topup_at, reg_state, reg_started_at, scratch
            FROM users
            WHERE enterprise_id = ?
            ORDER BY CAST(schedule_number AS INTEGER), id
            ",
        )
        .bind(enterprise)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    // =========================================================================
    // Balance
    // =========================================================================

    /// Unconditionally add `amount` to a balance.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn credit(&self, id: UserId, amount: i64) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE users SET balance = balance + ? WHERE id = ?")
            .bind(amount)
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Credit `amount` and stamp the top-up time, only if the cooldown elapsed.
    ///
    /// The cooldown check and the credit are one conditional statement, so two
    /// managers racing on the same worker cannot both succeed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    /// Returns `RepositoryError::Database` if the update fails.
    #[tracing::instrument(skip(self), fields(user_id = %id))]
    pub async fn credit_with_cooldown(
        &self,
        id: UserId,
        amount: i64,
        now: i64,
        cooldown_secs: i64,
    ) -> Result<TopUpOutcome, RepositoryError> {
        let balance = with_busy_retry("credit_with_cooldown", || async move {
            let balance = sqlx::query_scalar::<_, i64>(
                r"
                UPDATE users
                SET balance = balance + ?, last_topup_at = ?
                WHERE id = ? AND (last_topup_at = 0 OR ? - last_topup_at >= ?)
                RETURNING balance
                ",
            )
            .bind(amount)
            .bind(now)
            .bind(id)
            .bind(now)
            .bind(cooldown_secs)
            .fetch_optional(self.pool)
            .await?;
            Ok::<_, RepositoryError>(balance)
        })
        .await?;

        if let Some(balance) = balance {
            return Ok(TopUpOutcome::Credited { balance });
        }

        let last_topup_at =
            sqlx::query_scalar::<_, i64>("SELECT last_topup_at FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(self.pool)
                .await?
                .ok_or(RepositoryError::NotFound)?;

        Ok(TopUpOutcome::Cooldown { last_topup_at })
    }

    // =========================================================================
    // Staff administration
    // =========================================================================

    /// Give `role` to the identity with `schedule_number` in `enterprise`.
    ///
    /// Promoting someone else to admin demotes `caller` to manager in the
    /// same transaction, keeping one admin per enterprise.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no identity has that schedule number.
    /// Returns `RepositoryError::Database` if the transaction fails.
    #[tracing::instrument(skip(self), fields(caller = %caller, enterprise_id = %enterprise))]
    pub async fn change_role_by_schedule(
        &self,
        caller: UserId,
        enterprise: EnterpriseId,
        schedule_number: &str,
        role: Role,
    ) -> Result<User, RepositoryError> {
        with_busy_retry("change_role", || async move {
            let mut tx = self.pool.begin().await?;

            let row = sqlx::query_as::<_, UserRow>(
                r"
                UPDATE users SET role = ?
                WHERE enterprise_id = ? AND schedule_number = ?
                RETURNING id, username, name, schedule_number, enterprise_id, role, verified,
                          balance, last_topup_at, reg_state, reg_started_at, scratch
                ",
            )
            .bind(role)
            .bind(enterprise)
            .bind(schedule_number)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RepositoryError::NotFound)?;

            if role == Role::Admin && row.id != caller.as_i64() {
                sqlx::query("UPDATE users SET role = ? WHERE id = ?")
                    .bind(Role::Manager)
                    .bind(caller)
                    .execute(&mut *tx)
                    .await?;
            }

            tx.commit().await?;
            User::try_from(row)
        })
        .await
    }

    /// Apply a validated profile correction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    /// Returns `RepositoryError::Conflict` if a schedule number is already taken.
    pub async fn apply_correction(
        &self,
        id: UserId,
        correction: &Correction,
    ) -> Result<(), RepositoryError> {
        let query = match correction {
            Correction::Balance(balance) => {
                sqlx::query("UPDATE users SET balance = ? WHERE id = ?").bind(*balance)
            }
            Correction::Name(name) => {
                sqlx::query("UPDATE users SET name = ? WHERE id = ?").bind(name.as_str())
            }
            Correction::Schedule(number) => {
                sqlx::query("UPDATE users SET schedule_number = ? WHERE id = ?")
                    .bind(number.as_str())
            }
        };

        let result = query
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| RepositoryError::conflict_on_unique(e, SCHEDULE_TAKEN))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Remove an identity.
    ///
    /// Orders keep referencing the removed buyer by identity.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn delete(&self, id: UserId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Move an identity to another enterprise.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    /// Returns `RepositoryError::Conflict` if its schedule number is taken there.
    pub async fn set_enterprise(
        &self,
        id: UserId,
        enterprise: EnterpriseId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE users SET enterprise_id = ? WHERE id = ?")
            .bind(enterprise)
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| RepositoryError::conflict_on_unique(e, SCHEDULE_TAKEN))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Set an identity's role directly.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn set_role(&self, id: UserId, role: Role) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role)
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    // =========================================================================
    // Scratch field
    // =========================================================================

    /// Stash (or clear, with `None`) a value carried to the caller's next turn.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn set_scratch(&self, id: UserId, value: Option<i64>) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE users SET scratch = ? WHERE id = ?")
            .bind(value)
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Read the stashed value.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn scratch(&self, id: UserId) -> Result<Option<i64>, RepositoryError> {
        sqlx::query_scalar::<_, Option<i64>>("SELECT scratch FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestStore;

    fn profile(schedule: &str, enterprise: i64) -> RegistrationProfile {
        RegistrationProfile {
            schedule_number: schedule.to_string(),
            name: "Anna".to_string(),
            enterprise_id: EnterpriseId::new(enterprise),
        }
    }

    #[tokio::test]
    async fn test_start_registration_creates_waiting_identity() {
        let store = TestStore::new().await;
        let users = UserRepository::new(store.pool());

        users
            .start_registration(UserId::new(5), "anna", 1_000)
            .await
            .expect("start");

        let user = users.get(UserId::new(5)).await.expect("get").expect("exists");
        assert_eq!(user.username, "anna");
        assert_eq!(user.reg_state, RegistrationState::WaitingRegistrationData);
        assert_eq!(user.reg_started_at, Some(1_000));
        assert_eq!(user.role, Role::Unset);
        assert!(!user.verified);
    }

    #[tokio::test]
    async fn test_complete_registration_without_admin_writes_nothing() {
        let store = TestStore::new().await;
        let users = UserRepository::new(store.pool());
        users
            .start_registration(UserId::new(5), "anna", 1_000)
            .await
            .expect("start");

        let admin = users
            .complete_registration(UserId::new(5), &profile("15", 77))
            .await
            .expect("complete");

        assert_eq!(admin, None);
        let user = users.get(UserId::new(5)).await.expect("get").expect("exists");
        assert_eq!(user.enterprise_id, None);
        assert_eq!(user.reg_state, RegistrationState::WaitingRegistrationData);
    }

    #[tokio::test]
    async fn test_start_registration_drops_role_and_ledger() {
        let store = TestStore::new().await;
        let admin = store.seed_user(1, 100, Role::Admin, "1", 40).await;
        let users = UserRepository::new(store.pool());
        users.set_scratch(admin, Some(9)).await.expect("scratch");

        users.start_registration(admin, "user1", 1_000).await.expect("start");

        let user = users.get(admin).await.expect("get").expect("exists");
        assert_eq!(user.role, Role::Unset);
        assert!(!user.verified);
        assert_eq!(user.balance, 0);
        assert_eq!(user.last_topup_at, 0);
        assert_eq!(user.scratch, None);
        assert_eq!(user.enterprise_id, None);
    }

    #[tokio::test]
    async fn test_decided_applicant_is_not_decided_again() {
        let store = TestStore::new().await;
        let worker = store.seed_user(10, 1, Role::Worker, "1", 7).await;
        let users = UserRepository::new(store.pool());

        let approve = users.approve(worker, Role::Manager).await;
        assert!(matches!(approve, Err(RepositoryError::AlreadyProcessed)));
        let reject = users.reject(worker).await;
        assert!(matches!(reject, Err(RepositoryError::AlreadyProcessed)));
        let missing = users.approve(UserId::new(404), Role::Worker).await;
        assert!(matches!(missing, Err(RepositoryError::NotFound)));

        let user = users.get(worker).await.expect("get").expect("exists");
        assert_eq!(user.role, Role::Worker);
        assert_eq!(user.balance, 7);
    }

    #[tokio::test]
    async fn test_credit_with_cooldown() {
        let store = TestStore::new().await;
        let worker = store.seed_user(10, 1, Role::Worker, "1", 0).await;
        let users = UserRepository::new(store.pool());

        let first = users
            .credit_with_cooldown(worker, 2, 100_000, 43_200)
            .await
            .expect("first");
        assert_eq!(first, TopUpOutcome::Credited { balance: 2 });

        let second = users
            .credit_with_cooldown(worker, 2, 100_060, 43_200)
            .await
            .expect("second");
        assert_eq!(second, TopUpOutcome::Cooldown { last_topup_at: 100_000 });
        assert_eq!(users.balance(worker).await.expect("balance"), 2);

        let missing = users
            .credit_with_cooldown(UserId::new(404), 2, 100_000, 43_200)
            .await;
        assert!(matches!(missing, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn test_schedule_correction_conflict() {
        let store = TestStore::new().await;
        store.seed_user(10, 1, Role::Worker, "1", 0).await;
        let second = store.seed_user(11, 1, Role::Worker, "2", 0).await;
        let users = UserRepository::new(store.pool());

        let result = users
            .apply_correction(second, &Correction::Schedule("1".to_string()))
            .await;

        assert!(matches!(result, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_scratch_round_trip() {
        let store = TestStore::new().await;
        let admin = store.seed_user(1, 1, Role::Admin, "1", 0).await;
        let users = UserRepository::new(store.pool());

        users.set_scratch(admin, Some(42)).await.expect("set");
        assert_eq!(users.scratch(admin).await.expect("get"), Some(42));
        users.set_scratch(admin, None).await.expect("clear");
        assert_eq!(users.scratch(admin).await.expect("get"), None);
    }
}
