use std::sync::Arc;

use axum::extract::FromRef;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{PageInfo, UserPage},
    repo::UserStore,
    repo_types::{PublicUser, Status, UserChanges},
};
use crate::{error::AppError, state::AppState};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

/// Read access to user records and admin status changes.
#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn UserStore>,
}

impl FromRef<AppState> for UserDirectory {
    fn from_ref(state: &AppState) -> Self {
        UserDirectory::new(state.store.clone())
    }
}

impl UserDirectory {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<PublicUser, AppError> {
        self.store
            .find_by_id(user_id)
            .await?
            .map(PublicUser::from)
            .ok_or(AppError::NotFound)
    }

    /// `page` is 1-based; callers pass values already defaulted and clamped.
    #[instrument(skip(self))]
    pub async fn list(&self, page: i64, limit: i64) -> Result<UserPage, AppError> {
        let offset = (page - 1).saturating_mul(limit);
        let users = self.store.list(offset, limit).await?;
        let total = self.store.count().await?;
        let pages = (total + limit - 1) / limit;

        Ok(UserPage {
            users: users.into_iter().map(PublicUser::from).collect(),
            pagination: PageInfo {
                page,
                limit,
                total,
                pages,
            },
        })
    }

    #[instrument(skip(self))]
    pub async fn set_status(&self, user_id: Uuid, status: Status) -> Result<PublicUser, AppError> {
        let user = self
            .store
            .update(
                user_id,
                UserChanges {
                    status: Some(status),
                    ..Default::default()
                },
            )
            .await?;
        info!(user_id = %user.id, status = ?user.status, "user status changed");
        Ok(user.into())
    }
}

/// Lenient query parsing: absent, unparsable or non-positive values fall back.
pub(crate) fn page_params(page: Option<&str>, limit: Option<&str>) -> (i64, i64) {
    fn positive(raw: Option<&str>) -> Option<i64> {
        raw.and_then(|v| v.trim().parse::<i64>().ok()).filter(|v| *v > 0)
    }
    let page = positive(page).unwrap_or(DEFAULT_PAGE);
    let limit = positive(limit).unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    (page, limit)
}
