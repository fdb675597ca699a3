use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Form, Json, extract::State};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use once_cell::sync::Lazy;
use rand::Rng;
use rand::distr::Alphanumeric;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use slackr_db::{Database, Operator};
use slackr_types::api::{
    AuthResponse, LoginRequest, LogoutResponse, PasswordResetRequest, PasswordResetReset,
    RegisterRequest, TokenRequest,
};
use slackr_types::models::UserRecord;

use crate::error::{ApiError, ApiResult};
use crate::mail::{LogMailer, Mailer};
use crate::photo::{HttpImageSource, ImageSource};
use crate::scheduler::Scheduler;

pub type AppState = Arc<AppStateInner>;

/// Settings the operations need at run time.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub token_expiry_days: i64,
    /// Where cropped profile photos are written; served under `/imgs`.
    pub img_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dev-secret-change-me".to_string(),
            token_expiry_days: 30,
            img_dir: PathBuf::from("./imgs"),
        }
    }
}

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub sessions: Sessions,
    pub scheduler: Scheduler,
    pub mailer: Arc<dyn Mailer>,
    pub images: Arc<dyn ImageSource>,
    pub config: AppConfig,
}

impl AppStateInner {
    pub fn new(db: Database, config: AppConfig) -> Self {
        Self {
            db: Arc::new(db),
            sessions: Sessions::new(&config.jwt_secret, config.token_expiry_days),
            scheduler: Scheduler::new(),
            mailer: Arc::new(LogMailer),
            images: Arc::new(HttpImageSource::new()),
            config,
        }
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn with_images(mut self, images: Arc<dyn ImageSource>) -> Self {
        self.images = images;
        self
    }

    /// The user a token belongs to. Revoked, expired or forged tokens and
    /// tokens of users that no longer exist are all `Unauthorized`.
    pub fn authenticate(&self, token: &str) -> ApiResult<UserRecord> {
        let u_id = self.sessions.resolve(token)?;
        self.db
            .get_user(u_id)?
            .ok_or_else(|| ApiError::unauthorized("Invalid token."))
    }
}

// -- Sessions --

/// Maps a session token to the user it was issued to.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, token: &str) -> ApiResult<u64>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub u_id: u64,
    /// Distinguishes tokens issued to one user in the same second.
    pub jti: String,
    pub exp: usize,
}

/// Signed, expiring session tokens plus the ones revoked by logout.
///
/// Revocations are kept by `jti` until the token would have expired anyway.
pub struct Sessions {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry: chrono::Duration,
    revoked: RwLock<HashMap<String, usize>>,
}

impl Sessions {
    pub fn new(secret: &str, expiry_days: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiry: chrono::Duration::days(expiry_days),
            revoked: RwLock::new(HashMap::new()),
        }
    }

    pub fn issue(&self, u_id: u64) -> ApiResult<String> {
        let claims = Claims {
            u_id,
            jti: random_code(16),
            exp: (chrono::Utc::now() + self.expiry).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("token signing failed: {e}")))
    }

    /// Revokes a token. Returns false if it wasn't a live token.
    pub fn revoke(&self, token: &str) -> bool {
        let Ok(claims) = self.claims(token) else {
            return false;
        };
        let Ok(mut revoked) = self.revoked.write() else {
            return false;
        };
        let now = chrono::Utc::now().timestamp() as usize;
        revoked.retain(|_, exp| *exp > now);
        revoked.insert(claims.jti, claims.exp).is_none()
    }

    /// Decoded claims of a live token.
    fn claims(&self, token: &str) -> ApiResult<Claims> {
        let claims = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| ApiError::unauthorized("Invalid token."))?;
        if self.is_revoked(&claims.jti) {
            return Err(ApiError::unauthorized("Invalid token."));
        }
        Ok(claims)
    }

    fn is_revoked(&self, jti: &str) -> bool {
        // A poisoned set fails closed.
        self.revoked
            .read()
            .map(|revoked| revoked.contains_key(jti))
            .unwrap_or(true)
    }
}

impl IdentityResolver for Sessions {
    fn resolve(&self, token: &str) -> ApiResult<u64> {
        self.claims(token).map(|claims| claims.u_id)
    }
}

// -- Validation --

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+$").expect("valid email regex")
});

pub const NAME_MAX_LEN: usize = 50;
pub const PASSWORD_MIN_LEN: usize = 6;
pub const RESET_CODE_LEN: usize = 64;

pub fn valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub(crate) fn check_email(email: &str) -> ApiResult<()> {
    if valid_email(email) {
        Ok(())
    } else {
        Err(ApiError::invalid("Email is not valid."))
    }
}

pub(crate) fn check_names(name_first: &str, name_last: &str) -> ApiResult<()> {
    if !(1..=NAME_MAX_LEN).contains(&name_first.chars().count()) {
        return Err(ApiError::invalid(
            "First Name should be between 1 and 50 characters.",
        ));
    }
    if !(1..=NAME_MAX_LEN).contains(&name_last.chars().count()) {
        return Err(ApiError::invalid(
            "Last Name should be between 1 and 50 characters.",
        ));
    }
    Ok(())
}

fn check_password(password: &str) -> ApiResult<()> {
    if password.chars().count() <= PASSWORD_MIN_LEN {
        return Err(ApiError::invalid(
            "Password should be more than 6 characters.",
        ));
    }
    Ok(())
}

fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
}

fn verify_password(password: &str, stored: &str) -> ApiResult<bool> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| ApiError::Internal(format!("stored password hash unreadable: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

pub(crate) fn random_code(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

// -- Operations --

impl AppStateInner {
    /// Creates an account and logs it in. The first account created is the
    /// slackr owner.
    pub fn auth_register(
        &self,
        email: &str,
        password: &str,
        name_first: &str,
        name_last: &str,
    ) -> ApiResult<AuthResponse> {
        check_email(email)?;
        check_password(password)?;
        check_names(name_first, name_last)?;
        let password_hash = hash_password(password)?;

        let mut user = UserRecord {
            u_id: 0,
            email: email.to_string(),
            first_name: name_first.to_string(),
            last_name: name_last.to_string(),
            handle_str: format!("{name_first}{name_last}"),
            img_url: None,
            password_hash,
            reset_codes: Vec::new(),
            is_admin: false,
            is_slackr_owner: false,
        };

        // Uniqueness check and insert under one lock.
        let u_id = self.db.users.with_table(|users| {
            if !users.query("email", Operator::Eq, &json!(email)).is_empty() {
                return Err(ApiError::invalid(format!("'{email}' is already in use.")));
            }
            user.is_slackr_owner = users.is_empty();
            Ok(users.add(slackr_db::queries::encode(&user)?))
        })?;

        info!(u_id, owner = user.is_slackr_owner, "Registered user");
        Ok(AuthResponse {
            u_id,
            token: self.sessions.issue(u_id)?,
        })
    }

    pub fn auth_login(&self, email: &str, password: &str) -> ApiResult<AuthResponse> {
        check_email(email)?;
        let user = self
            .db
            .find_user_by_email(email)?
            .ok_or_else(|| ApiError::invalid("Email entered does not belong to a user."))?;
        if !verify_password(password, &user.password_hash)? {
            return Err(ApiError::invalid("Password is not correct."));
        }
        Ok(AuthResponse {
            u_id: user.u_id,
            token: self.sessions.issue(user.u_id)?,
        })
    }

    /// Invalidates a token. `is_success` is false if it was already dead.
    pub fn auth_logout(&self, token: &str) -> LogoutResponse {
        LogoutResponse {
            is_success: self.sessions.revoke(token),
        }
    }

    /// Generates a reset code for the account and mails it to its owner.
    pub fn auth_passwordreset_request(&self, email: &str) -> ApiResult<()> {
        check_email(email)?;
        let user = self
            .db
            .find_user_by_email(email)?
            .ok_or_else(|| ApiError::invalid("Email entered does not belong to a user."))?;

        let code = random_code(RESET_CODE_LEN);
        self.db
            .users
            .append_to_field(user.u_id, "reset_codes", json!(code))?;

        self.mailer
            .send(
                &user.email,
                "Slackr Password Reset",
                &format!("Here is your password reset code: {code}."),
            )
            .map_err(|e| ApiError::Internal(format!("sending reset mail failed: {e:#}")))
    }

    /// Sets a new password and consumes the reset code.
    pub fn auth_passwordreset_reset(&self, reset_code: &str, new_password: &str) -> ApiResult<()> {
        check_password(new_password)?;
        let password_hash = hash_password(new_password)?;
        let code = json!(reset_code);

        self.db.users.with_table(|users| -> ApiResult<()> {
            let u_id = users
                .query("reset_codes", Operator::Contains, &code)
                .first()
                .and_then(|user| user.get("u_id"))
                .and_then(|id| id.as_u64())
                .ok_or_else(|| ApiError::invalid("reset_code is not a valid reset code."))?;
            users.remove(u_id, "reset_codes", &code)?;
            users.set_field(u_id, "password_hash", json!(password_hash))?;
            Ok(())
        })?;
        info!("Password reset completed");
        Ok(())
    }
}

// -- Handlers --

pub async fn register(
    State(state): State<AppState>,
    Form(req): Form<RegisterRequest>,
) -> ApiResult<Json<AuthResponse>> {
    state
        .auth_register(&req.email, &req.password, &req.name_first, &req.name_last)
        .map(Json)
}

pub async fn login(
    State(state): State<AppState>,
    Form(req): Form<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    state.auth_login(&req.email, &req.password).map(Json)
}

pub async fn logout(
    State(state): State<AppState>,
    Form(req): Form<TokenRequest>,
) -> Json<LogoutResponse> {
    Json(state.auth_logout(&req.token))
}

pub async fn passwordreset_request(
    State(state): State<AppState>,
    Form(req): Form<PasswordResetRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    state.auth_passwordreset_request(&req.email)?;
    Ok(Json(json!({})))
}

pub async fn passwordreset_reset(
    State(state): State<AppState>,
    Form(req): Form<PasswordResetReset>,
) -> ApiResult<Json<serde_json::Value>> {
    state.auth_passwordreset_reset(&req.reset_code, &req.new_password)?;
    Ok(Json(json!({})))
}
