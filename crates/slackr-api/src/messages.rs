use std::sync::Arc;

use axum::{Form, Json, extract::State};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::info;

use slackr_db::Database;
use slackr_types::api::{
    MessageEditRequest, MessageIdResponse, MessageRequest, MessageSendLaterRequest,
    MessageSendRequest,
};
use slackr_types::models::{ChannelRecord, MESSAGE_MAX_LEN, MessageRecord};

use crate::auth::{AppState, AppStateInner};
use crate::error::{ApiError, ApiResult};
use crate::scheduler::{DeferredAction, Fired};

/// Current time as fractional Unix seconds.
pub fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// A new message authored by `u_id`, stamped with the current time.
pub fn new_message(u_id: u64, channel_id: u64, text: &str) -> MessageRecord {
    MessageRecord {
        message_id: 0,
        channel_id,
        u_id,
        message: text.to_string(),
        is_pinned: false,
        time_created: unix_now(),
    }
}

pub fn post_message(db: &Database, u_id: u64, channel_id: u64, text: &str) -> slackr_db::Result<u64> {
    db.insert_message(&new_message(u_id, channel_id, text))
}

fn check_length(text: &str) -> ApiResult<()> {
    if text.chars().count() > MESSAGE_MAX_LEN {
        return Err(ApiError::invalid("Message exceeds 1000 characters."));
    }
    Ok(())
}

impl AppStateInner {
    pub(crate) fn require_message(&self, message_id: u64) -> ApiResult<MessageRecord> {
        self.db
            .get_message(message_id)?
            .ok_or_else(|| ApiError::invalid("Message does not exist."))
    }

    pub fn message_send(
        &self,
        token: &str,
        channel_id: u64,
        message: &str,
    ) -> ApiResult<MessageIdResponse> {
        let caller = self.authenticate(token)?;
        let channel = self.require_channel(channel_id)?;
        if !channel.is_member(caller.u_id) {
            return Err(ApiError::unauthorized(
                "Authorised user is not a member of the channel.",
            ));
        }
        check_length(message)?;

        let message_id = post_message(&self.db, caller.u_id, channel_id, message)?;
        Ok(MessageIdResponse { message_id })
    }

    /// Queues a message to be posted at `time_sent`. Membership and the
    /// channel are checked again when it is posted.
    pub fn message_sendlater(
        &self,
        token: &str,
        channel_id: u64,
        message: &str,
        time_sent: DateTime<Utc>,
    ) -> ApiResult<()> {
        let caller = self.authenticate(token)?;
        let channel = self.require_channel(channel_id)?;
        check_length(message)?;
        if time_sent < Utc::now() {
            return Err(ApiError::invalid("Time sent is a time in the past."));
        }
        if !channel.is_member(caller.u_id) {
            return Err(ApiError::unauthorized(
                "Authorised user is not a member of the channel.",
            ));
        }

        self.scheduler.schedule(
            time_sent,
            DelayedSend {
                db: Arc::clone(&self.db),
                u_id: caller.u_id,
                channel_id,
                message: message.to_string(),
            },
        );
        info!(channel_id, u_id = caller.u_id, at = %time_sent, "Message scheduled");
        Ok(())
    }

    /// Deletes a message. Allowed for its author, owners of its channel and
    /// admins.
    pub fn message_remove(&self, token: &str, message_id: u64) -> ApiResult<()> {
        let caller = self.authenticate(token)?;
        let message = self.require_message(message_id)?;
        let is_channel_owner = self
            .db
            .get_channel(message.channel_id)?
            .is_some_and(|channel| channel.is_owner(caller.u_id));

        if !(caller.is_privileged() || message.u_id == caller.u_id || is_channel_owner) {
            return Err(ApiError::unauthorized("User does not have the correct permissions."));
        }
        self.db.delete_message(message_id)?;
        Ok(())
    }

    /// Replaces a message's text. Empty text deletes the message.
    pub fn message_edit(&self, token: &str, message_id: u64, message: &str) -> ApiResult<()> {
        let caller = self.authenticate(token)?;
        let existing = self.require_message(message_id)?;
        if !(caller.is_privileged() || existing.u_id == caller.u_id) {
            return Err(ApiError::unauthorized("User does not have the correct permissions."));
        }
        if message.is_empty() {
            return self.message_remove(token, message_id);
        }
        check_length(message)?;
        self.db
            .messages
            .set_field(message_id, "message", json!(message))?;
        Ok(())
    }
}

/// A `message/sendlater` waiting for its time.
pub struct DelayedSend {
    pub db: Arc<Database>,
    pub u_id: u64,
    pub channel_id: u64,
    pub message: String,
}

impl DeferredAction for DelayedSend {
    fn label(&self) -> &'static str {
        "sendlater"
    }

    fn fire(self) -> anyhow::Result<Fired> {
        // Membership is checked under the same locks the insert runs under.
        let posted = self.db.post_to_channel(|channels| {
            let member = channels
                .get_row::<ChannelRecord>(self.channel_id)?
                .is_some_and(|channel| channel.is_member(self.u_id));
            Ok(member.then(|| new_message(self.u_id, self.channel_id, &self.message)))
        })?;
        Ok(match posted {
            Some(_) => Fired::Applied,
            None => Fired::Skipped(format!(
                "user {} is no longer in channel {}",
                self.u_id, self.channel_id
            )),
        })
    }
}

// -- Handlers --

pub async fn send(
    State(state): State<AppState>,
    Form(req): Form<MessageSendRequest>,
) -> ApiResult<Json<MessageIdResponse>> {
    state
        .message_send(&req.token, req.channel_id, &req.message)
        .map(Json)
}

pub async fn sendlater(
    State(state): State<AppState>,
    Form(req): Form<MessageSendLaterRequest>,
) -> ApiResult<Json<Value>> {
    let time_sent = DateTime::from_timestamp(req.time_sent, 0)
        .ok_or_else(|| ApiError::invalid("time_sent is out of range."))?;
    state.message_sendlater(&req.token, req.channel_id, &req.message, time_sent)?;
    Ok(Json(json!({})))
}

pub async fn remove(
    State(state): State<AppState>,
    Form(req): Form<MessageRequest>,
) -> ApiResult<Json<Value>> {
    state.message_remove(&req.token, req.message_id)?;
    Ok(Json(json!({})))
}

pub async fn edit(
    State(state): State<AppState>,
    Form(req): Form<MessageEditRequest>,
) -> ApiResult<Json<Value>> {
    state.message_edit(&req.token, req.message_id, &req.message)?;
    Ok(Json(json!({})))
}
