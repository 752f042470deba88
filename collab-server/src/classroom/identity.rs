use collab_shared::api::UserDto;
use collab_shared::auth::Role;
use collab_shared::domain::{student_id, teacher_id};
use tracing::info;

use super::{ClassroomResult, require_name, store_failure};
use crate::storage::Store;

/// Users keyed by derived or external id, with their point balances.
#[derive(Clone)]
pub struct IdentityLedger {
    store: Store,
}

impl IdentityLedger {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Idempotent; the latest raw name becomes the display name.
    pub async fn upsert_student(&self, name: &str) -> ClassroomResult<UserDto> {
        let name = require_name(name, "name")?;
        let user = self
            .store
            .upsert_user(&student_id(name), name, Role::Student, None)
            .await
            .map_err(store_failure("upsert student"))?;
        Ok(user.into())
    }

    pub async fn upsert_teacher(
        &self,
        name: &str,
        external_id: Option<&str>,
        email: Option<&str>,
    ) -> ClassroomResult<UserDto> {
        let name = require_name(name, "display name")?;
        let id = teacher_id(external_id, email, name);
        let email = email.map(str::trim).filter(|s| !s.is_empty());
        let user = self
            .store
            .upsert_user(&id, name, Role::Teacher, email)
            .await
            .map_err(store_failure("upsert teacher"))?;
        Ok(user.into())
    }

    pub async fn touch(&self, name: &str) -> ClassroomResult<()> {
        let name = require_name(name, "name")?;
        self.store
            .touch_student(name)
            .await
            .map_err(store_failure("touch student"))
    }

    pub async fn get_points(&self, name: &str) -> ClassroomResult<i64> {
        self.store
            .points_for(name)
            .await
            .map_err(store_failure("read points"))
    }

    pub async fn increment_points(&self, name: &str) -> ClassroomResult<()> {
        let name = require_name(name, "name")?;
        self.store
            .increment_points(name)
            .await
            .map_err(store_failure("increment points"))
    }

    pub async fn list(&self) -> ClassroomResult<Vec<UserDto>> {
        let rows = self
            .store
            .list_users()
            .await
            .map_err(store_failure("list users"))?;
        Ok(rows.into_iter().map(UserDto::from).collect())
    }

    pub async fn remove_all(&self) -> ClassroomResult<usize> {
        let n = self
            .store
            .delete_all_users()
            .await
            .map_err(store_failure("remove users"))?;
        info!(deleted = n, "removed all users");
        Ok(n)
    }

    pub async fn remove_by_role(&self, role: Role) -> ClassroomResult<usize> {
        let n = self
            .store
            .delete_users_by_role(role)
            .await
            .map_err(store_failure("remove users"))?;
        info!(deleted = n, %role, "removed users by role");
        Ok(n)
    }

    pub async fn remove_by_name(&self, name: &str) -> ClassroomResult<usize> {
        let name = require_name(name, "userName")?;
        let n = self
            .store
            .delete_user_by_name(name)
            .await
            .map_err(store_failure("remove user"))?;
        info!(deleted = n, name, "removed user by name");
        Ok(n)
    }
}
