use serde::{Deserialize, Serialize};

// -- Auth --

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name_first: String,
    pub name_last: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub u_id: u64,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub is_success: bool,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetReset {
    pub reset_code: String,
    pub new_password: String,
}

/// Requests that carry nothing but the caller's token.
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

// -- Channels --

#[derive(Debug, Deserialize)]
pub struct ChannelCreateRequest {
    pub token: String,
    pub name: String,
    /// Forms send "true"/"True"; anything else is a private channel.
    #[serde(default)]
    pub is_public: String,
}

impl ChannelCreateRequest {
    pub fn is_public(&self) -> bool {
        matches!(self.is_public.as_str(), "true" | "True")
    }
}

#[derive(Debug, Deserialize)]
pub struct ChannelRequest {
    pub token: String,
    pub channel_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct ChannelMemberRequest {
    pub token: String,
    pub channel_id: u64,
    pub u_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct ChannelMessagesQuery {
    pub token: String,
    pub channel_id: u64,
    #[serde(default)]
    pub start: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelIdResponse {
    pub channel_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub channel_id: u64,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelsResponse {
    pub channels: Vec<ChannelSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSummary {
    pub u_id: u64,
    pub name_first: String,
    pub name_last: String,
    pub profile_img_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelDetails {
    pub name: String,
    pub owner_members: Vec<MemberSummary>,
    pub all_members: Vec<MemberSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelMessages {
    pub messages: Vec<FullMessage>,
    pub start: i64,
    /// `start + 50`, or -1 once the oldest message has been returned.
    pub end: i64,
}

// -- Messages --

#[derive(Debug, Deserialize)]
pub struct MessageSendRequest {
    pub token: String,
    pub channel_id: u64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageSendLaterRequest {
    pub token: String,
    pub channel_id: u64,
    pub message: String,
    /// Unix seconds.
    pub time_sent: i64,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub token: String,
    pub message_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct MessageEditRequest {
    pub token: String,
    pub message_id: u64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageReactRequest {
    pub token: String,
    pub message_id: u64,
    pub react_id: u8,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageIdResponse {
    pub message_id: u64,
}

/// One reaction type on a message and who used it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactSummary {
    pub react_id: u8,
    pub u_ids: Vec<u64>,
    pub is_this_user_reacted: bool,
}

/// A message joined with its reactions, as seen by one viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullMessage {
    pub message_id: u64,
    pub u_id: u64,
    pub message: String,
    pub time_created: f64,
    pub is_pinned: bool,
    pub reacts: Vec<ReactSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<FullMessage>,
}

// -- Standup --

#[derive(Debug, Deserialize)]
pub struct StandupStartRequest {
    pub token: String,
    pub channel_id: u64,
    /// Window length in seconds.
    pub length: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StandupStartResponse {
    pub time_finish: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StandupActiveResponse {
    pub is_active: bool,
    pub time_finish: Option<f64>,
}

// -- Users --

#[derive(Debug, Deserialize)]
pub struct UserProfileQuery {
    pub token: String,
    pub u_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct SetNameRequest {
    pub token: String,
    pub name_first: String,
    pub name_last: String,
}

#[derive(Debug, Deserialize)]
pub struct SetEmailRequest {
    pub token: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct SetHandleRequest {
    pub token: String,
    pub handle_str: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadPhotoRequest {
    pub token: String,
    pub img_url: String,
    pub x_start: i64,
    pub y_start: i64,
    pub x_end: i64,
    pub y_end: i64,
}

/// Public projection of a user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub email: String,
    pub name_first: String,
    pub name_last: String,
    pub handle_str: String,
    pub profile_img_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsersResponse {
    pub users: Vec<UserProfile>,
}

// -- Search / admin --

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub token: String,
    #[serde(default)]
    pub query_str: String,
}

#[derive(Debug, Deserialize)]
pub struct PermissionChangeRequest {
    pub token: String,
    pub u_id: u64,
    pub permission_id: u8,
}

/// Body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub name: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_public_accepts_both_spellings() {
        for (raw, expected) in [("true", true), ("True", true), ("false", false), ("", false)] {
            let req = ChannelCreateRequest {
                token: String::new(),
                name: "general".into(),
                is_public: raw.into(),
            };
            assert_eq!(req.is_public(), expected, "{raw:?}");
        }
    }

    #[test]
    fn test_missing_start_defaults_to_zero() {
        let query: ChannelMessagesQuery =
            serde_json::from_value(json!({"token": "t", "channel_id": 3})).unwrap();
        assert_eq!(query.start, 0);
    }

    #[test]
    fn test_member_summary_field_names() {
        let summary = MemberSummary {
            u_id: 1,
            name_first: "Ada".into(),
            name_last: "Lovelace".into(),
            profile_img_url: None,
        };
        assert_eq!(
            serde_json::to_value(summary).unwrap(),
            json!({"u_id": 1, "name_first": "Ada", "name_last": "Lovelace", "profile_img_url": null})
        );
    }
}
