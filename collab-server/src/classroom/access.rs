use collab_shared::api::UserDto;
use collab_shared::domain::MIN_ACCESS_CODE_LEN;
use tracing::{info, warn};

use super::{ClassroomError, ClassroomResult, IdentityLedger, store_failure};
use crate::storage::Store;

const ACCESS_CODE_KEY: &str = "access_code";

/// Single shared code students present at login.
#[derive(Clone)]
pub struct AccessGate {
    store: Store,
    identity: IdentityLedger,
    default_code: String,
}

impl AccessGate {
    pub fn new(store: Store, identity: IdentityLedger, default_code: String) -> Self {
        Self {
            store,
            identity,
            default_code,
        }
    }

    /// Current code; the default is stored on first read.
    pub async fn get_code(&self) -> ClassroomResult<String> {
        self.store
            .get_or_init_setting(ACCESS_CODE_KEY, &self.default_code)
            .await
            .map_err(store_failure("read access code"))
    }

    /// Replaces the code. The previous one stops working immediately.
    pub async fn set_code(&self, new_code: &str) -> ClassroomResult<()> {
        let code = new_code.trim();
        if code.is_empty() {
            return Err(ClassroomError::validation("access code cannot be empty"));
        }
        if code.chars().count() < MIN_ACCESS_CODE_LEN {
            return Err(ClassroomError::validation(format!(
                "access code must be at least {MIN_ACCESS_CODE_LEN} characters"
            )));
        }
        self.store
            .put_setting(ACCESS_CODE_KEY, code)
            .await
            .map_err(store_failure("update access code"))?;
        info!("access code updated");
        Ok(())
    }

    /// Exact, case-sensitive comparison; on success the student is upserted.
    pub async fn authenticate(&self, code: &str, name: &str) -> ClassroomResult<UserDto> {
        let current = self.get_code().await?;
        if code != current {
            warn!(name, "login: invalid access code");
            return Err(ClassroomError::InvalidCode);
        }
        self.identity.upsert_student(name).await
    }
}
