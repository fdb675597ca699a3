use serde::{Deserialize, Serialize};

/// Reaction type ids accepted by `message/react`. Each one is a list-valued
/// field on the reacts record that shares its key with a message.
pub const REACT_IDS: std::ops::RangeInclusive<u8> = 1..=7;

/// Maximum length of a message body and of a standup entry.
pub const MESSAGE_MAX_LEN: usize = 1000;

/// Maximum length of a channel name.
pub const CHANNEL_NAME_MAX_LEN: usize = 20;

/// Number of messages returned per `channel/messages` page.
pub const PAGE_SIZE: usize = 50;

/// Row stored in the `users` collection, keyed by `u_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub u_id: u64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub handle_str: String,
    pub img_url: Option<String>,
    pub password_hash: String,
    /// Outstanding password reset codes.
    pub reset_codes: Vec<String>,
    pub is_admin: bool,
    pub is_slackr_owner: bool,
}

impl UserRecord {
    /// Admins and slackr owners may act on channels they don't own.
    pub fn is_privileged(&self) -> bool {
        self.is_admin || self.is_slackr_owner
    }
}

/// Row stored in the `channels` collection, keyed by `channel_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    #[serde(default)]
    pub channel_id: u64,
    pub name: String,
    /// Every member, owners included.
    pub all_members: Vec<u64>,
    pub owners: Vec<u64>,
    pub is_public: bool,
    pub is_standup_active: bool,
    /// Unix seconds; `None` when no standup is running.
    pub time_finish: Option<f64>,
    pub standup_queue: Vec<String>,
}

impl ChannelRecord {
    pub fn is_member(&self, u_id: u64) -> bool {
        self.all_members.contains(&u_id)
    }

    pub fn is_owner(&self, u_id: u64) -> bool {
        self.owners.contains(&u_id)
    }
}

/// Row stored in the `messages` collection, keyed by `message_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(default)]
    pub message_id: u64,
    pub channel_id: u64,
    pub u_id: u64,
    pub message: String,
    pub is_pinned: bool,
    /// Unix seconds.
    pub time_created: f64,
}
