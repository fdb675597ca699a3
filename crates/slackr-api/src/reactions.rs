use axum::{Form, Json, extract::State};
use serde_json::{Value, json};

use slackr_types::api::{MessageReactRequest, MessageRequest};
use slackr_types::models::{MessageRecord, REACT_IDS, UserRecord};

use crate::auth::{AppState, AppStateInner};
use crate::error::{ApiError, ApiResult};

impl AppStateInner {
    /// The message, provided the caller is in its channel.
    fn message_for_member(
        &self,
        caller: &UserRecord,
        message_id: u64,
    ) -> ApiResult<MessageRecord> {
        let message = self
            .db
            .get_message(message_id)?
            .ok_or_else(|| ApiError::invalid("message_id is invalid."))?;
        let in_channel = self
            .db
            .get_channel(message.channel_id)?
            .is_some_and(|channel| channel.is_member(caller.u_id));
        if !in_channel {
            return Err(ApiError::invalid(
                "Message is not within a channel the user has joined.",
            ));
        }
        Ok(message)
    }

    /// Adds the caller's reaction. A user holds at most one reaction per
    /// message across all types.
    pub fn message_react(&self, token: &str, message_id: u64, react_id: u8) -> ApiResult<()> {
        let caller = self.authenticate(token)?;
        let message = self.message_for_member(&caller, message_id)?;
        check_react_id(react_id)?;

        let u_id = json!(caller.u_id);
        self.db.reacts.with_table(|reacts| {
            let record = reacts
                .get(message.message_id)
                .ok_or_else(|| reacts.not_found(message.message_id))?;
            let already = REACT_IDS.clone().any(|id| {
                record
                    .get(&id.to_string())
                    .and_then(Value::as_array)
                    .is_some_and(|u_ids| u_ids.contains(&u_id))
            });
            if already {
                return Err(ApiError::invalid("You have already reacted to this message."));
            }
            reacts.append_to_field(message.message_id, &react_id.to_string(), u_id.clone())?;
            Ok(())
        })
    }

    pub fn message_unreact(&self, token: &str, message_id: u64, react_id: u8) -> ApiResult<()> {
        let caller = self.authenticate(token)?;
        let message = self.message_for_member(&caller, message_id)?;
        check_react_id(react_id)?;

        let u_id = json!(caller.u_id);
        let field = react_id.to_string();
        self.db.reacts.with_table(|reacts| {
            let reacted = reacts
                .get(message.message_id)
                .ok_or_else(|| reacts.not_found(message.message_id))?
                .get(&field)
                .and_then(Value::as_array)
                .is_some_and(|u_ids| u_ids.contains(&u_id));
            if !reacted {
                return Err(ApiError::invalid("You have not reacted to this message yet."));
            }
            reacts.remove(message.message_id, &field, &u_id)?;
            Ok(())
        })
    }

    pub fn message_pin(&self, token: &str, message_id: u64) -> ApiResult<()> {
        self.set_pinned(token, message_id, true)
    }

    pub fn message_unpin(&self, token: &str, message_id: u64) -> ApiResult<()> {
        self.set_pinned(token, message_id, false)
    }

    fn set_pinned(&self, token: &str, message_id: u64, pinned: bool) -> ApiResult<()> {
        let caller = self.authenticate(token)?;
        let message = self.require_message(message_id)?;
        let channel = self.require_channel(message.channel_id)?;
        if !channel.is_member(caller.u_id) {
            return Err(ApiError::unauthorized(
                "User is not a member of the channel the message is in.",
            ));
        }

        self.db.messages.with_table(|messages| {
            let current: MessageRecord = messages
                .get_row(message_id)?
                .ok_or_else(|| ApiError::invalid("Message does not exist."))?;
            if current.is_pinned == pinned {
                return Err(ApiError::invalid(if pinned {
                    "Message is already pinned."
                } else {
                    "Message is already unpinned."
                }));
            }
            messages.set_field(message_id, "is_pinned", json!(pinned))?;
            Ok(())
        })
    }
}

fn check_react_id(react_id: u8) -> ApiResult<()> {
    if REACT_IDS.contains(&react_id) {
        Ok(())
    } else {
        Err(ApiError::invalid("react_id is not a valid react ID."))
    }
}

// -- Handlers --

pub async fn react(
    State(state): State<AppState>,
    Form(req): Form<MessageReactRequest>,
) -> ApiResult<Json<Value>> {
    state.message_react(&req.token, req.message_id, req.react_id)?;
    Ok(Json(json!({})))
}

pub async fn unreact(
    State(state): State<AppState>,
    Form(req): Form<MessageReactRequest>,
) -> ApiResult<Json<Value>> {
    state.message_unreact(&req.token, req.message_id, req.react_id)?;
    Ok(Json(json!({})))
}

pub async fn pin(
    State(state): State<AppState>,
    Form(req): Form<MessageRequest>,
) -> ApiResult<Json<Value>> {
    state.message_pin(&req.token, req.message_id)?;
    Ok(Json(json!({})))
}

pub async fn unpin(
    State(state): State<AppState>,
    Form(req): Form<MessageRequest>,
) -> ApiResult<Json<Value>> {
    state.message_unpin(&req.token, req.message_id)?;
    Ok(Json(json!({})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{harness, register};
    use slackr_db::views::ReactFilter;
    use slackr_types::api::ReactSummary;

    #[tokio::test]
    async fn test_react_unreact() {
        let h = harness();
        let alice = register(&h.state, "alice@example.com");
        let bob = register(&h.state, "bob@example.com");
        let channel = h.state.channels_create(&alice.token, "general", true).unwrap().channel_id;
        h.state.channel_join(&bob.token, channel).unwrap();
        let id = h.state.message_send(&alice.token, channel, "hi").unwrap().message_id;

        h.state.message_react(&bob.token, id, 1).unwrap();
        // One reaction per user per message, whatever the type.
        assert!(matches!(
            h.state.message_react(&bob.token, id, 2),
            Err(ApiError::InvalidInput(_))
        ));
        h.state.message_react(&alice.token, id, 1).unwrap();

        let page = h.state.channel_messages(&bob.token, channel, 0).unwrap();
        let first = &page.messages[0].reacts[0];
        assert_eq!(first.react_id, 1);
        assert_eq!(first.u_ids, vec![bob.u_id, alice.u_id]);
        assert!(first.is_this_user_reacted);

        assert!(matches!(
            h.state.message_unreact(&bob.token, id, 2),
            Err(ApiError::InvalidInput(_))
        ));
        h.state.message_unreact(&bob.token, id, 1).unwrap();
        h.state.message_react(&bob.token, id, 2).unwrap();
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let h = harness();
        let a = register(&h.state, "a@example.com");
        assert!(h.state.db.require_user(a.u_id).unwrap().is_slackr_owner);

        let general = h.state.channels_create(&a.token, "general", true).unwrap().channel_id;
        let hi = h.state.message_send(&a.token, general, "hi").unwrap().message_id;
        assert_eq!(h.state.db.messages_in_channel(general).unwrap().len(), 1);

        let b = register(&h.state, "b@example.com");
        h.state.channel_join(&b.token, general).unwrap();
        h.state.message_react(&b.token, hi, 1).unwrap();

        let seen_by_a = h.state.db.full_message(a.u_id, hi, ReactFilter::NonEmpty).unwrap();
        assert_eq!(
            seen_by_a.reacts,
            vec![ReactSummary {
                react_id: 1,
                u_ids: vec![b.u_id],
                is_this_user_reacted: false,
            }]
        );
        let seen_by_b = h.state.db.full_message(b.u_id, hi, ReactFilter::NonEmpty).unwrap();
        assert!(seen_by_b.reacts[0].is_this_user_reacted);
    }

    #[tokio::test]
    async fn test_react_validation() {
        let h = harness();
        let alice = register(&h.state, "alice@example.com");
        let bob = register(&h.state, "bob@example.com");
        let channel = h.state.channels_create(&alice.token, "general", true).unwrap().channel_id;
        let id = h.state.message_send(&alice.token, channel, "hi").unwrap().message_id;

        for react_id in [0, 8] {
            assert!(matches!(
                h.state.message_react(&alice.token, id, react_id),
                Err(ApiError::InvalidInput(_))
            ));
        }
        assert!(matches!(
            h.state.message_react(&alice.token, 999, 1),
            Err(ApiError::InvalidInput(_))
        ));
        // Not in the channel.
        assert!(matches!(
            h.state.message_react(&bob.token, id, 1),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_pin_unpin() {
        let h = harness();
        let alice = register(&h.state, "alice@example.com");
        let bob = register(&h.state, "bob@example.com");
        let channel = h.state.channels_create(&alice.token, "general", true).unwrap().channel_id;
        let id = h.state.message_send(&alice.token, channel, "hi").unwrap().message_id;

        assert!(matches!(
            h.state.message_pin(&bob.token, id),
            Err(ApiError::Unauthorized(_))
        ));
        h.state.message_pin(&alice.token, id).unwrap();
        assert!(h.state.db.require_message(id).unwrap().is_pinned);
        assert!(matches!(
            h.state.message_pin(&alice.token, id),
            Err(ApiError::InvalidInput(m)) if m == "Message is already pinned."
        ));

        h.state.message_unpin(&alice.token, id).unwrap();
        assert!(matches!(
            h.state.message_unpin(&alice.token, id),
            Err(ApiError::InvalidInput(_))
        ));
    }
}
