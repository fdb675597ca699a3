use axum::{
    Form, Json,
    extract::{Query, State},
};
use serde_json::{Value, json};
use tracing::info;

use slackr_db::{Table, views::ReactFilter};
use slackr_types::api::{
    ChannelCreateRequest, ChannelDetails, ChannelIdResponse, ChannelMemberRequest,
    ChannelMessages, ChannelMessagesQuery, ChannelRequest, ChannelSummary, ChannelsResponse,
    MemberSummary, TokenRequest,
};
use slackr_types::models::{CHANNEL_NAME_MAX_LEN, ChannelRecord, PAGE_SIZE, UserRecord};

use crate::auth::{AppState, AppStateInner};
use crate::error::{ApiError, ApiResult};

/// Reads a channel inside a locked channels table.
pub(crate) fn channel_in(channels: &Table, channel_id: u64) -> ApiResult<ChannelRecord> {
    channels
        .get_row(channel_id)?
        .ok_or_else(|| ApiError::invalid("channel_id does not exist."))
}

/// Page bounds for `channel_messages`: the slice to return and the `end`
/// reported to the client (-1 once the oldest message is included).
pub fn page_bounds(total: usize, start: usize) -> (usize, usize, i64) {
    let stop = (start + PAGE_SIZE).min(total);
    let end = if stop == total { -1 } else { stop as i64 };
    (start, stop, end)
}

impl AppStateInner {
    pub(crate) fn require_channel(&self, channel_id: u64) -> ApiResult<ChannelRecord> {
        self.db
            .get_channel(channel_id)?
            .ok_or_else(|| ApiError::invalid("channel_id does not exist."))
    }

    pub fn channels_create(
        &self,
        token: &str,
        name: &str,
        is_public: bool,
    ) -> ApiResult<ChannelIdResponse> {
        let user = self.authenticate(token)?;
        if name.chars().count() > CHANNEL_NAME_MAX_LEN {
            return Err(ApiError::invalid("Name is more than 20 characters long."));
        }
        let channel = ChannelRecord {
            channel_id: 0,
            name: name.to_string(),
            all_members: vec![user.u_id],
            owners: vec![user.u_id],
            is_public,
            is_standup_active: false,
            time_finish: None,
            standup_queue: Vec::new(),
        };
        let channel_id = self.db.create_channel(&channel)?;
        info!(channel_id, owner = user.u_id, "Channel created");
        Ok(ChannelIdResponse { channel_id })
    }

    /// Channels the caller belongs to.
    pub fn channels_list(&self, token: &str) -> ApiResult<ChannelsResponse> {
        let user = self.authenticate(token)?;
        Ok(summaries(self.db.channels_with_member(user.u_id)?))
    }

    /// Every channel, public or not.
    pub fn channels_listall(&self, token: &str) -> ApiResult<ChannelsResponse> {
        self.authenticate(token)?;
        Ok(summaries(self.db.list_channels()?))
    }

    /// Adds `u_id` to a channel the caller belongs to.
    pub fn channel_invite(&self, token: &str, channel_id: u64, u_id: u64) -> ApiResult<()> {
        let caller = self.authenticate(token)?;
        if self.db.get_user(u_id)?.is_none() {
            return Err(ApiError::invalid("u_id does not exist."));
        }
        self.db.channels.with_table(|channels| {
            let channel = channel_in(channels, channel_id)?;
            if !channel.is_member(caller.u_id) {
                return Err(ApiError::unauthorized(
                    "The authorised user is not a member of the channel.",
                ));
            }
            if channel.is_member(u_id) {
                return Err(ApiError::invalid("User is already a member of the channel."));
            }
            channels.append_to_field(channel_id, "all_members", json!(u_id))?;
            Ok(())
        })
    }

    pub fn channel_details(&self, token: &str, channel_id: u64) -> ApiResult<ChannelDetails> {
        let caller = self.authenticate(token)?;
        let channel = self.require_channel(channel_id)?;
        if !channel.is_member(caller.u_id) {
            return Err(ApiError::unauthorized(
                "The authorised user is not a member of the channel.",
            ));
        }
        Ok(ChannelDetails {
            name: channel.name,
            owner_members: self.members(&channel.owners)?,
            all_members: self.members(&channel.all_members)?,
        })
    }

    /// Up to fifty messages, newest first, starting `start` messages back.
    pub fn channel_messages(
        &self,
        token: &str,
        channel_id: u64,
        start: i64,
    ) -> ApiResult<ChannelMessages> {
        let caller = self.authenticate(token)?;
        let channel = self.require_channel(channel_id)?;
        if !channel.is_member(caller.u_id) {
            return Err(ApiError::unauthorized(
                "The authorised user is not a member of the channel.",
            ));
        }

        let mut messages = self
            .db
            .channel_message_views(caller.u_id, channel_id, ReactFilter::All)?;
        if start > messages.len() as i64 {
            return Err(ApiError::invalid(
                "start is greater than the total number of messages in the channel.",
            ));
        }
        if start < 0 {
            return Err(ApiError::invalid("Invalid value for start."));
        }

        messages.sort_by(|a, b| {
            b.time_created
                .total_cmp(&a.time_created)
                .then(b.message_id.cmp(&a.message_id))
        });
        let (from, to, end) = page_bounds(messages.len(), start as usize);
        Ok(ChannelMessages {
            messages: messages.drain(from..to).collect(),
            start,
            end,
        })
    }

    pub fn channel_leave(&self, token: &str, channel_id: u64) -> ApiResult<()> {
        let caller = self.authenticate(token)?;
        self.db.channels.with_table(|channels| {
            let channel = channel_in(channels, channel_id)?;
            if !channel.is_member(caller.u_id) {
                return Err(ApiError::unauthorized(
                    "The authorised user is not a member of the channel.",
                ));
            }
            channels.remove(channel_id, "all_members", &json!(caller.u_id))?;
            Ok(())
        })
    }

    /// Joins a public channel. Admins and slackr owners may join private ones.
    pub fn channel_join(&self, token: &str, channel_id: u64) -> ApiResult<()> {
        let caller = self.authenticate(token)?;
        self.db.channels.with_table(|channels| {
            let channel = channel_in(channels, channel_id)?;
            if !channel.is_public && !caller.is_privileged() {
                return Err(ApiError::unauthorized("Channel is not public."));
            }
            if channel.is_member(caller.u_id) {
                return Err(ApiError::invalid("User is already a member of the channel."));
            }
            channels.append_to_field(channel_id, "all_members", json!(caller.u_id))?;
            Ok(())
        })
    }

    pub fn channel_addowner(&self, token: &str, channel_id: u64, u_id: u64) -> ApiResult<()> {
        let caller = self.authenticate(token)?;
        if self.db.get_user(u_id)?.is_none() {
            return Err(ApiError::invalid("u_id does not exist."));
        }
        self.db.channels.with_table(|channels| {
            let channel = channel_in(channels, channel_id)?;
            if channel.is_owner(u_id) {
                return Err(ApiError::invalid("User is already an owner of the channel."));
            }
            check_can_manage(&caller, &channel, "You do not have permission to add owners.")?;
            channels.append_to_field(channel_id, "owners", json!(u_id))?;
            Ok(())
        })
    }

    pub fn channel_removeowner(&self, token: &str, channel_id: u64, u_id: u64) -> ApiResult<()> {
        let caller = self.authenticate(token)?;
        self.db.channels.with_table(|channels| {
            let channel = channel_in(channels, channel_id)?;
            if !channel.is_owner(u_id) {
                return Err(ApiError::invalid("User is not an owner of the channel."));
            }
            check_can_manage(&caller, &channel, "You do not have permission to remove owners.")?;
            channels.remove(channel_id, "owners", &json!(u_id))?;
            Ok(())
        })
    }

    fn members(&self, u_ids: &[u64]) -> ApiResult<Vec<MemberSummary>> {
        u_ids
            .iter()
            .map(|&u_id| self.db.member_summary(u_id).map_err(ApiError::from))
            .collect()
    }
}

fn check_can_manage(caller: &UserRecord, channel: &ChannelRecord, denied: &str) -> ApiResult<()> {
    if channel.is_owner(caller.u_id) || caller.is_privileged() {
        Ok(())
    } else {
        Err(ApiError::unauthorized(denied))
    }
}

fn summaries(channels: Vec<ChannelRecord>) -> ChannelsResponse {
    ChannelsResponse {
        channels: channels
            .into_iter()
            .map(|channel| ChannelSummary {
                channel_id: channel.channel_id,
                name: channel.name,
            })
            .collect(),
    }
}

// -- Handlers --

pub async fn create(
    State(state): State<AppState>,
    Form(req): Form<ChannelCreateRequest>,
) -> ApiResult<Json<ChannelIdResponse>> {
    state
        .channels_create(&req.token, &req.name, req.is_public())
        .map(Json)
}

pub async fn list(
    State(state): State<AppState>,
    Query(req): Query<TokenRequest>,
) -> ApiResult<Json<ChannelsResponse>> {
    state.channels_list(&req.token).map(Json)
}

pub async fn listall(
    State(state): State<AppState>,
    Query(req): Query<TokenRequest>,
) -> ApiResult<Json<ChannelsResponse>> {
    state.channels_listall(&req.token).map(Json)
}

pub async fn invite(
    State(state): State<AppState>,
    Form(req): Form<ChannelMemberRequest>,
) -> ApiResult<Json<Value>> {
    state.channel_invite(&req.token, req.channel_id, req.u_id)?;
    Ok(Json(json!({})))
}

pub async fn details(
    State(state): State<AppState>,
    Query(req): Query<ChannelRequest>,
) -> ApiResult<Json<ChannelDetails>> {
    state.channel_details(&req.token, req.channel_id).map(Json)
}

pub async fn messages(
    State(state): State<AppState>,
    Query(req): Query<ChannelMessagesQuery>,
) -> ApiResult<Json<ChannelMessages>> {
    state
        .channel_messages(&req.token, req.channel_id, req.start)
        .map(Json)
}

pub async fn leave(
    State(state): State<AppState>,
    Form(req): Form<ChannelRequest>,
) -> ApiResult<Json<Value>> {
    state.channel_leave(&req.token, req.channel_id)?;
    Ok(Json(json!({})))
}

pub async fn join(
    State(state): State<AppState>,
    Form(req): Form<ChannelRequest>,
) -> ApiResult<Json<Value>> {
    state.channel_join(&req.token, req.channel_id)?;
    Ok(Json(json!({})))
}

pub async fn addowner(
    State(state): State<AppState>,
    Form(req): Form<ChannelMemberRequest>,
) -> ApiResult<Json<Value>> {
    state.channel_addowner(&req.token, req.channel_id, req.u_id)?;
    Ok(Json(json!({})))
}

pub async fn removeowner(
    State(state): State<AppState>,
    Form(req): Form<ChannelMemberRequest>,
) -> ApiResult<Json<Value>> {
    state.channel_removeowner(&req.token, req.channel_id, req.u_id)?;
    Ok(Json(json!({})))
}
