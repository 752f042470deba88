use collab_shared::api::RewardResp;
use collab_shared::domain::normalize_name;
use tracing::info;

use super::{ClassroomError, ClassroomResult, require_name, store_failure};
use crate::storage::{RewardKey, Store};

/// At most one point per (rewarder, sender, content) triple.
#[derive(Clone)]
pub struct RewardLedger {
    store: Store,
}

fn non_empty(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

impl RewardLedger {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Awards the sender one point. Without both a rewarder and a content id
    /// there is no dedup key and every call awards.
    pub async fn try_reward(
        &self,
        rewarder_name: Option<&str>,
        sender_name: &str,
        content_id: Option<&str>,
    ) -> ClassroomResult<RewardResp> {
        let sender_name = require_name(sender_name, "sender name")?.trim();
        let rewarder_name = non_empty(rewarder_name);
        if let Some(rewarder) = rewarder_name
            && normalize_name(rewarder) == normalize_name(sender_name)
        {
            return Err(ClassroomError::validation("cannot reward your own content"));
        }
        let key = match (rewarder_name, non_empty(content_id)) {
            (Some(rewarder), Some(content_id)) => Some(RewardKey {
                rewarder: normalize_name(rewarder),
                content_id: content_id.to_string(),
            }),
            _ => None,
        };
        let already_rewarded = self
            .store
            .apply_reward(key, sender_name)
            .await
            .map_err(store_failure("apply reward"))?;
        if already_rewarded {
            info!(sender = sender_name, rewarder = ?rewarder_name, "reward already given");
        } else {
            info!(sender = sender_name, rewarder = ?rewarder_name, "reward applied");
        }
        Ok(RewardResp { already_rewarded })
    }

    /// Advisory; the authoritative check happens inside `try_reward`.
    pub async fn has_rewarded(&self, rewarder_name: &str, content_id: &str) -> ClassroomResult<bool> {
        self.store
            .has_rewarded(&normalize_name(rewarder_name), content_id.trim())
            .await
            .map_err(store_failure("check reward"))
    }
}
