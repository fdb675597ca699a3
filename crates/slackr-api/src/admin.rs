use axum::{Form, Json, extract::State};
use serde_json::{Value, json};
use tracing::info;

use slackr_types::api::PermissionChangeRequest;
use slackr_types::models::UserRecord;

use crate::auth::{AppState, AppStateInner};
use crate::error::{ApiError, ApiResult};

/// Slackr-wide permission levels, by `permission_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Owner = 1,
    Admin = 2,
    Member = 3,
}

impl TryFrom<u8> for Permission {
    type Error = ApiError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            1 => Ok(Permission::Owner),
            2 => Ok(Permission::Admin),
            3 => Ok(Permission::Member),
            _ => Err(ApiError::invalid("permission_id does not refer to a valid permission.")),
        }
    }
}

impl Permission {
    /// `(is_slackr_owner, is_admin)` flags for this level.
    fn flags(self) -> (bool, bool) {
        match self {
            Permission::Owner => (true, false),
            Permission::Admin => (false, true),
            Permission::Member => (false, false),
        }
    }

    pub fn of(user: &UserRecord) -> Self {
        if user.is_slackr_owner {
            Permission::Owner
        } else if user.is_admin {
            Permission::Admin
        } else {
            Permission::Member
        }
    }
}

impl AppStateInner {
    /// Sets a user's slackr-wide permission. Admins may move users between
    /// member and admin; only owners may touch owners or create them.
    pub fn admin_userpermission_change(
        &self,
        token: &str,
        u_id: u64,
        permission_id: u8,
    ) -> ApiResult<()> {
        let caller = self.authenticate(token)?;
        let target = self
            .db
            .get_user(u_id)?
            .ok_or_else(|| ApiError::invalid("u_id does not refer to a valid user."))?;
        let permission = Permission::try_from(permission_id)?;

        if !caller.is_privileged() {
            return Err(ApiError::unauthorized(
                "The authorised user is not an admin or owner.",
            ));
        }
        let touches_owner =
            Permission::of(&target) == Permission::Owner || permission == Permission::Owner;
        if touches_owner && !caller.is_slackr_owner {
            return Err(ApiError::unauthorized(
                "Admins cannot change owner permissions or make other users owners.",
            ));
        }

        let (is_owner, is_admin) = permission.flags();
        self.db.users.with_table(|users| {
            users.set_field(u_id, "is_slackr_owner", json!(is_owner))?;
            users.set_field(u_id, "is_admin", json!(is_admin))
        })?;
        info!(u_id, by = caller.u_id, ?permission, "Permission changed");
        Ok(())
    }
}

pub async fn userpermission_change(
    State(state): State<AppState>,
    Form(req): Form<PermissionChangeRequest>,
) -> ApiResult<Json<Value>> {
    state.admin_userpermission_change(&req.token, req.u_id, req.permission_id)?;
    Ok(Json(json!({})))
}
