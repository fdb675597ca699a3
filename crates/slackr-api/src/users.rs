use axum::{
    Form, Json,
    extract::{Query, State},
};
use serde_json::{Value, json};
use tracing::info;

use slackr_db::Operator;
use slackr_db::views::profile_of;
use slackr_types::api::{
    SetEmailRequest, SetHandleRequest, SetNameRequest, TokenRequest, UploadPhotoRequest,
    UserProfile, UserProfileQuery, UsersResponse,
};

use crate::auth::{AppState, AppStateInner, check_email, check_names};
use crate::error::{ApiError, ApiResult};
use crate::photo::{CropBox, crop_to_jpeg};

pub const HANDLE_LEN: std::ops::RangeInclusive<usize> = 3..=20;

/// Public path profile photos are served under.
pub const IMG_ROUTE: &str = "/imgs";

impl AppStateInner {
    pub fn user_profile(&self, token: &str, u_id: u64) -> ApiResult<UserProfile> {
        self.authenticate(token)?;
        let user = self
            .db
            .get_user(u_id)?
            .ok_or_else(|| ApiError::invalid("u_id does not exist."))?;
        Ok(profile_of(user))
    }

    pub fn user_profile_setname(
        &self,
        token: &str,
        name_first: &str,
        name_last: &str,
    ) -> ApiResult<()> {
        let caller = self.authenticate(token)?;
        check_names(name_first, name_last)?;
        self.db.users.with_table(|users| {
            users.set_field(caller.u_id, "first_name", json!(name_first))?;
            users.set_field(caller.u_id, "last_name", json!(name_last))
        })?;
        Ok(())
    }

    pub fn user_profile_setemail(&self, token: &str, email: &str) -> ApiResult<()> {
        let caller = self.authenticate(token)?;
        self.set_unique(caller.u_id, "email", email, || {
            ApiError::invalid(format!("'{email}' is already in use."))
        }, || check_email(email))
    }

    pub fn user_profile_sethandle(&self, token: &str, handle_str: &str) -> ApiResult<()> {
        let caller = self.authenticate(token)?;
        self.set_unique(caller.u_id, "handle_str", handle_str, || {
            ApiError::invalid(format!("Handle '{handle_str}' is already in use."))
        }, || {
            if HANDLE_LEN.contains(&handle_str.chars().count()) {
                Ok(())
            } else {
                Err(ApiError::invalid("Handle should be between 3 and 20 characters."))
            }
        })
    }

    /// Sets a field no other user may share. The uniqueness check and the
    /// write happen under one lock; `in_use` is reported before `validate`.
    fn set_unique(
        &self,
        u_id: u64,
        field: &str,
        value: &str,
        in_use: impl FnOnce() -> ApiError,
        validate: impl FnOnce() -> ApiResult<()>,
    ) -> ApiResult<()> {
        self.db.users.with_table(|users| {
            if !users.query(field, Operator::Eq, &json!(value)).is_empty() {
                return Err(in_use());
            }
            validate()?;
            users.set_field(u_id, field, json!(value))?;
            Ok(())
        })
    }

    /// Fetches an image, crops it and makes it the caller's profile photo.
    pub async fn user_profiles_uploadphoto(
        &self,
        token: &str,
        img_url: &str,
        crop: CropBox,
    ) -> ApiResult<()> {
        let caller = self.authenticate(token)?;
        let bytes = self.images.fetch(img_url).await?;
        let jpeg = crop_to_jpeg(&bytes, crop)?;

        let file_name = format!("{}.jpg", caller.u_id);
        tokio::fs::create_dir_all(&self.config.img_dir)
            .await
            .map_err(|e| ApiError::Internal(format!("creating image dir failed: {e}")))?;
        tokio::fs::write(self.config.img_dir.join(&file_name), jpeg)
            .await
            .map_err(|e| ApiError::Internal(format!("writing profile photo failed: {e}")))?;

        let url = format!("{IMG_ROUTE}/{file_name}");
        self.db
            .users
            .set_field(caller.u_id, "img_url", json!(url))?;
        info!(u_id = caller.u_id, "Profile photo updated");
        Ok(())
    }

    pub fn users_all(&self, token: &str) -> ApiResult<UsersResponse> {
        self.authenticate(token)?;
        Ok(UsersResponse {
            users: self.db.list_users()?.into_iter().map(profile_of).collect(),
        })
    }
}

// -- Handlers --

pub async fn profile(
    State(state): State<AppState>,
    Query(req): Query<UserProfileQuery>,
) -> ApiResult<Json<UserProfile>> {
    state.user_profile(&req.token, req.u_id).map(Json)
}

pub async fn setname(
    State(state): State<AppState>,
    Form(req): Form<SetNameRequest>,
) -> ApiResult<Json<Value>> {
    state.user_profile_setname(&req.token, &req.name_first, &req.name_last)?;
    Ok(Json(json!({})))
}

pub async fn setemail(
    State(state): State<AppState>,
    Form(req): Form<SetEmailRequest>,
) -> ApiResult<Json<Value>> {
    state.user_profile_setemail(&req.token, &req.email)?;
    Ok(Json(json!({})))
}

pub async fn sethandle(
    State(state): State<AppState>,
    Form(req): Form<SetHandleRequest>,
) -> ApiResult<Json<Value>> {
    state.user_profile_sethandle(&req.token, &req.handle_str)?;
    Ok(Json(json!({})))
}

pub async fn uploadphoto(
    State(state): State<AppState>,
    Form(req): Form<UploadPhotoRequest>,
) -> ApiResult<Json<Value>> {
    let crop = CropBox {
        x_start: req.x_start,
        y_start: req.y_start,
        x_end: req.x_end,
        y_end: req.y_end,
    };
    state
        .user_profiles_uploadphoto(&req.token, &req.img_url, crop)
        .await?;
    Ok(Json(json!({})))
}

pub async fn all(
    State(state): State<AppState>,
    Query(req): Query<TokenRequest>,
) -> ApiResult<Json<UsersResponse>> {
    state.users_all(&req.token).map(Json)
}
