//! Standups: a timed window during which members queue short updates that
//! are posted as one message when the window closes.

use std::sync::Arc;

use axum::{
    Form, Json,
    extract::{Query, State},
};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::info;

use slackr_db::Database;
use slackr_types::api::{
    ChannelRequest, MessageSendRequest, StandupActiveResponse, StandupStartRequest,
    StandupStartResponse,
};
use slackr_types::models::{ChannelRecord, MESSAGE_MAX_LEN};

use crate::auth::{AppState, AppStateInner};
use crate::channels::channel_in;
use crate::error::{ApiError, ApiResult};
use crate::messages::{new_message, unix_now};
use crate::scheduler::{DeferredAction, Fired};

/// Grace period after `time_finish` before the window is closed.
pub const FINALIZE_GRACE_SECS: i64 = 1;

fn member_channel(channel: ChannelRecord, u_id: u64) -> ApiResult<ChannelRecord> {
    if channel.is_member(u_id) {
        Ok(channel)
    } else {
        Err(ApiError::unauthorized(
            "The authorised user is not a member of the channel.",
        ))
    }
}

impl AppStateInner {
    /// Opens a standup window of `length` seconds.
    pub fn standup_start(
        &self,
        token: &str,
        channel_id: u64,
        length: u64,
    ) -> ApiResult<StandupStartResponse> {
        let caller = self.authenticate(token)?;
        let length = i64::try_from(length)
            .ok()
            .filter(|&secs| secs > 0)
            .ok_or_else(|| ApiError::invalid("Standup length must be a positive number of seconds."))?;

        let time_finish = unix_now() + length as f64;
        self.db.channels.with_table(|channels| {
            let channel = member_channel(channel_in(channels, channel_id)?, caller.u_id)?;
            if channel.is_standup_active {
                return Err(ApiError::invalid(
                    "An active standup is currently running in this channel.",
                ));
            }
            channels.set_field(channel_id, "is_standup_active", json!(true))?;
            channels.set_field(channel_id, "time_finish", json!(time_finish))?;
            channels.set_field(channel_id, "standup_queue", json!([]))?;
            Ok(())
        })?;

        let fire_at = finish_instant(time_finish) + chrono::Duration::seconds(FINALIZE_GRACE_SECS);
        self.scheduler.schedule(
            fire_at,
            StandupFinalize {
                db: Arc::clone(&self.db),
                channel_id,
                initiator: caller.u_id,
                time_finish,
            },
        );
        info!(channel_id, u_id = caller.u_id, length, "Standup started");
        Ok(StandupStartResponse { time_finish })
    }

    pub fn standup_active(&self, token: &str, channel_id: u64) -> ApiResult<StandupActiveResponse> {
        self.authenticate(token)?;
        let channel = self.require_channel(channel_id)?;
        Ok(StandupActiveResponse {
            is_active: channel.is_standup_active,
            time_finish: channel.time_finish,
        })
    }

    /// Queues `"<handle>: <message>"` on the running standup.
    pub fn standup_send(&self, token: &str, channel_id: u64, message: &str) -> ApiResult<()> {
        let caller = self.authenticate(token)?;
        if message.chars().count() > MESSAGE_MAX_LEN {
            return Err(ApiError::invalid("Message is more than 1000 characters."));
        }
        let entry = format!("{}: {}", caller.handle_str, message);

        self.db.channels.with_table(|channels| {
            let channel = member_channel(channel_in(channels, channel_id)?, caller.u_id)?;
            if !channel.is_standup_active {
                return Err(ApiError::invalid(
                    "An active standup is not currently running in this channel.",
                ));
            }
            channels.append_to_field(channel_id, "standup_queue", json!(entry))?;
            Ok(())
        })
    }
}

fn finish_instant(time_finish: f64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros((time_finish * 1_000_000.0) as i64).unwrap_or_else(Utc::now)
}

/// Closes a standup window and posts its queue as one message authored by
/// whoever started it.
///
/// Only the window it was scheduled for is closed: if that window has
/// already been finalized, or a new one has started since, firing does
/// nothing.
pub struct StandupFinalize {
    pub db: Arc<Database>,
    pub channel_id: u64,
    pub initiator: u64,
    pub time_finish: f64,
}

impl DeferredAction for StandupFinalize {
    fn label(&self) -> &'static str {
        "standup"
    }

    /// Closes the window and posts its queue in one step, so a failed post
    /// leaves the window and its queue as they were.
    fn fire(self) -> anyhow::Result<Fired> {
        let mut outcome = None;
        let posted = self.db.post_to_channel(|channels| {
            let Some(channel) = channels.get_row::<ChannelRecord>(self.channel_id)? else {
                return Ok(None);
            };
            if !channel.is_standup_active || channel.time_finish != Some(self.time_finish) {
                return Ok(None);
            }
            channels.set_field(self.channel_id, "standup_queue", json!([]))?;
            channels.set_field(self.channel_id, "is_standup_active", json!(false))?;
            channels.set_field(self.channel_id, "time_finish", Value::Null)?;
            outcome = Some(channel.standup_queue.len());
            Ok((!channel.standup_queue.is_empty()).then(|| {
                new_message(self.initiator, self.channel_id, &channel.standup_queue.join("\n"))
            }))
        })?;

        match (outcome, posted) {
            (None, _) => Ok(Fired::Skipped(format!(
                "standup in channel {} already closed",
                self.channel_id
            ))),
            (Some(entries), Some(message_id)) => {
                info!(channel_id = self.channel_id, message_id, entries, "Standup posted");
                Ok(Fired::Applied)
            }
            (Some(_), None) => {
                info!(channel_id = self.channel_id, "Standup closed with nothing queued");
                Ok(Fired::Applied)
            }
        }
    }
}

// -- Handlers --

pub async fn start(
    State(state): State<AppState>,
    Form(req): Form<StandupStartRequest>,
) -> ApiResult<Json<StandupStartResponse>> {
    state
        .standup_start(&req.token, req.channel_id, req.length)
        .map(Json)
}

pub async fn active(
    State(state): State<AppState>,
    Query(req): Query<ChannelRequest>,
) -> ApiResult<Json<StandupActiveResponse>> {
    state.standup_active(&req.token, req.channel_id).map(Json)
}

pub async fn send(
    State(state): State<AppState>,
    Form(req): Form<MessageSendRequest>,
) -> ApiResult<Json<Value>> {
    state.standup_send(&req.token, req.channel_id, &req.message)?;
    Ok(Json(json!({})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{harness, register};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_standup_lifecycle() {
        let h = harness();
        let alice = register(&h.state, "alice@example.com");
        let bob = register(&h.state, "bob@example.com");
        let channel = h.state.channels_create(&alice.token, "general", true).unwrap().channel_id;
        h.state.channel_join(&bob.token, channel).unwrap();

        let started = h.state.standup_start(&alice.token, channel, 60).unwrap();
        let active = h.state.standup_active(&bob.token, channel).unwrap();
        assert!(active.is_active);
        assert_eq!(active.time_finish, Some(started.time_finish));
        assert!(matches!(
            h.state.standup_start(&bob.token, channel, 60),
            Err(ApiError::InvalidInput(_))
        ));

        h.state.standup_send(&alice.token, channel, "shipped the parser").unwrap();
        h.state.standup_send(&bob.token, channel, "fixed CI").unwrap();
        assert_eq!(h.state.db.messages.size().unwrap(), 0);

        tokio::time::sleep(Duration::from_secs(62)).await;

        let page = h.state.channel_messages(&alice.token, channel, 0).unwrap();
        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.messages[0].u_id, alice.u_id);
        assert_eq!(
            page.messages[0].message,
            "JohnSmith: shipped the parser\nJohnSmith: fixed CI"
        );

        let after = h.state.standup_active(&alice.token, channel).unwrap();
        assert!(!after.is_active);
        assert_eq!(after.time_finish, None);
        assert!(matches!(
            h.state.standup_send(&alice.token, channel, "late"),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_standup_posts_nothing() {
        let h = harness();
        let alice = register(&h.state, "alice@example.com");
        let channel = h.state.channels_create(&alice.token, "general", true).unwrap().channel_id;

        h.state.standup_start(&alice.token, channel, 5).unwrap();
        tokio::time::sleep(Duration::from_secs(7)).await;

        assert!(!h.state.standup_active(&alice.token, channel).unwrap().is_active);
        assert_eq!(h.state.db.messages.size().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_finalize_is_idempotent() {
        let h = harness();
        let alice = register(&h.state, "alice@example.com");
        let channel = h.state.channels_create(&alice.token, "general", true).unwrap().channel_id;
        let started = h.state.standup_start(&alice.token, channel, 600).unwrap();
        h.state.standup_send(&alice.token, channel, "one").unwrap();

        let finalize = || StandupFinalize {
            db: Arc::clone(&h.state.db),
            channel_id: channel,
            initiator: alice.u_id,
            time_finish: started.time_finish,
        };
        assert_eq!(finalize().fire().unwrap(), Fired::Applied);
        assert!(matches!(finalize().fire().unwrap(), Fired::Skipped(_)));
        assert_eq!(h.state.db.messages.size().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stale_finalize_leaves_new_window_open() {
        let h = harness();
        let alice = register(&h.state, "alice@example.com");
        let channel = h.state.channels_create(&alice.token, "general", true).unwrap().channel_id;
        let started = h.state.standup_start(&alice.token, channel, 600).unwrap();

        let stale = StandupFinalize {
            db: Arc::clone(&h.state.db),
            channel_id: channel,
            initiator: alice.u_id,
            time_finish: started.time_finish - 1000.0,
        };
        assert!(matches!(stale.fire().unwrap(), Fired::Skipped(_)));
        assert!(h.state.standup_active(&alice.token, channel).unwrap().is_active);
    }

    #[tokio::test]
    async fn test_non_member_can_check_active() {
        let h = harness();
        let alice = register(&h.state, "alice@example.com");
        let bob = register(&h.state, "bob@example.com");
        let channel = h.state.channels_create(&alice.token, "general", true).unwrap().channel_id;

        assert!(!h.state.standup_active(&bob.token, channel).unwrap().is_active);
        h.state.standup_start(&alice.token, channel, 60).unwrap();
        assert!(h.state.standup_active(&bob.token, channel).unwrap().is_active);
        assert!(matches!(
            h.state.standup_active(&bob.token, 404),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_post_keeps_window_open() {
        let h = harness();
        let alice = register(&h.state, "alice@example.com");
        let channel = h.state.channels_create(&alice.token, "general", true).unwrap().channel_id;
        let started = h.state.standup_start(&alice.token, channel, 600).unwrap();
        h.state.standup_send(&alice.token, channel, "kept").unwrap();

        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = h.state.db.messages.with_table(|_| -> slackr_db::Result<()> {
                panic!("poison messages");
            });
        }));

        let finalize = StandupFinalize {
            db: Arc::clone(&h.state.db),
            channel_id: channel,
            initiator: alice.u_id,
            time_finish: started.time_finish,
        };
        assert!(finalize.fire().is_err());

        let after = h.state.db.require_channel(channel).unwrap();
        assert!(after.is_standup_active);
        assert_eq!(after.time_finish, Some(started.time_finish));
        assert_eq!(after.standup_queue, vec!["JohnSmith: kept".to_string()]);
    }

    #[tokio::test]
    async fn test_standup_validation() {
        let h = harness();
        let alice = register(&h.state, "alice@example.com");
        let bob = register(&h.state, "bob@example.com");
        let channel = h.state.channels_create(&alice.token, "general", true).unwrap().channel_id;

        assert!(matches!(
            h.state.standup_start(&bob.token, channel, 10),
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            h.state.standup_start(&alice.token, 404, 10),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            h.state.standup_start(&alice.token, channel, 0),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            h.state.standup_send(&alice.token, channel, "nobody listening"),
            Err(ApiError::InvalidInput(_))
        ));

        h.state.standup_start(&alice.token, channel, 10).unwrap();
        assert!(matches!(
            h.state.standup_send(&alice.token, channel, &"x".repeat(1001)),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            h.state.standup_send(&bob.token, channel, "hi"),
            Err(ApiError::Unauthorized(_))
        ));
    }
}
