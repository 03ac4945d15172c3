//! Business logic services.
//!
//! This module contains the engines the dispatcher routes to:
//! - Registration: `/start`, profile line parsing, approval and rejection
//! - Commerce: purchases, top-ups with cooldown, order lifecycle and views
//! - Staff: worker pickers, roster, role changes, corrections, super user
//! - Catalog: shop view for admins, product editing and creation
//! - Notifier: best-effort delivery to third parties
//!
//! Services return the [`Reply`](crate::gateway::Reply) for the caller and
//! notify everyone else themselves.

mod catalog;
mod commerce;
mod notifier;
mod registration;
mod staff;

pub use catalog::CatalogService;
pub use commerce::{CommerceService, TOP_UP_AMOUNTS};
pub use notifier::Notifier;
pub use registration::{RegistrationService, parse_profile};
pub use staff::{PickerPurpose, StaffService, WORKER_PAGE_SIZE};

use sqlx::SqlitePool;

use crewstore_core::{EnterpriseId, Role, UserId};

use crate::db::UserRepository;
use crate::error::AppError;

/// The identity an action is performed for, resolved from the store on
/// every dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: UserId,
    pub role: Role,
    pub enterprise: Option<EnterpriseId>,
    /// Whether this is the configured super user.
    pub is_super: bool,
}

impl Caller {
    /// Resolve the caller's current role and enterprise.
    ///
    /// Unknown identities resolve to an unset role without an enterprise.
    ///
    /// # Errors
    ///
    /// Returns `AppError::StoreUnavailable` if the lookup fails.
    pub async fn resolve(
        pool: &SqlitePool,
        id: UserId,
        super_user: UserId,
    ) -> Result<Self, AppError> {
        let user = UserRepository::new(pool).get(id).await?;
        let (role, enterprise) = user.map_or((Role::Unset, None), |u| (u.role, u.enterprise_id));

        Ok(Self {
            id,
            role,
            enterprise,
            is_super: id == super_user,
        })
    }

    /// The caller's enterprise.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the caller has none.
    pub fn enterprise(&self) -> Result<EnterpriseId, AppError> {
        self.enterprise
            .ok_or_else(|| AppError::NotFound("caller enterprise".to_string()))
    }

    /// Fail with `CrossTenant` unless `other` is the caller's enterprise.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CrossTenant` when the enterprises differ or the
    /// caller has none.
    pub fn same_enterprise(&self, other: Option<EnterpriseId>) -> Result<(), AppError> {
        if self.enterprise.is_some() && self.enterprise == other {
            Ok(())
        } else {
            Err(AppError::CrossTenant)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestStore;

    #[tokio::test]
    async fn test_resolve_known_and_unknown() {
        let store = TestStore::new().await;
        let admin = store.seed_user(10, 500, Role::Admin, "1", 0).await;

        let caller = Caller::resolve(store.pool(), admin, UserId::new(99))
            .await
            .unwrap();
        assert_eq!(caller.role, Role::Admin);
        assert_eq!(caller.enterprise, Some(EnterpriseId::new(500)));
        assert!(!caller.is_super);

        let stranger = Caller::resolve(store.pool(), UserId::new(99), UserId::new(99))
            .await
            .unwrap();
        assert_eq!(stranger.role, Role::Unset);
        assert_eq!(stranger.enterprise, None);
        assert!(stranger.is_super);
    }

    #[test]
    fn test_same_enterprise() {
        let caller = Caller {
            id: UserId::new(1),
            role: Role::Admin,
            enterprise: Some(EnterpriseId::new(5)),
            is_super: false,
        };
        assert!(caller.same_enterprise(Some(EnterpriseId::new(5))).is_ok());
        assert!(matches!(
            caller.same_enterprise(Some(EnterpriseId::new(6))),
            Err(AppError::CrossTenant)
        ));
        assert!(matches!(
            caller.same_enterprise(None),
            Err(AppError::CrossTenant)
        ));
    }
}
