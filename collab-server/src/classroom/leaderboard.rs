use collab_shared::api::{LeaderboardDto, UserDto};
use collab_shared::auth::Role;

use super::{ClassroomResult, store_failure};
use crate::storage::Store;

#[derive(Clone)]
pub struct Leaderboard {
    store: Store,
}

impl Leaderboard {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn compute(&self) -> ClassroomResult<LeaderboardDto> {
        let users = self
            .store
            .list_users()
            .await
            .map_err(store_failure("list users"))?;
        Ok(rank(users.into_iter().map(UserDto::from).collect()))
    }
}

/// Splits users by role and orders each side by points, highest first.
/// Ties keep the input order.
pub fn rank(users: Vec<UserDto>) -> LeaderboardDto {
    let (mut teachers, mut students): (Vec<_>, Vec<_>) =
        users.into_iter().partition(|u| u.role == Role::Teacher);
    teachers.sort_by(|a, b| b.points.cmp(&a.points));
    students.sort_by(|a, b| b.points.cmp(&a.points));
    LeaderboardDto { teachers, students }
}
