//! Read-side joins producing response payloads.

use serde_json::{Value, json};

use slackr_types::api::{FullMessage, MemberSummary, ReactSummary, UserProfile};
use slackr_types::models::{MessageRecord, REACT_IDS, UserRecord};

use crate::error::Result;
use crate::query::Operator;
use crate::queries::decode;
use crate::store::Record;
use crate::{Database, MESSAGES};

/// Which reaction types a [`FullMessage`] lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactFilter {
    /// Only types somebody has used.
    NonEmpty,
    /// All seven types, empty ones included.
    All,
}

impl Database {
    /// A message joined with its reacts record, as seen by `viewer`.
    ///
    /// Fails with `NotFound` if either record is missing.
    pub fn full_message(
        &self,
        viewer: u64,
        message_id: u64,
        filter: ReactFilter,
    ) -> Result<FullMessage> {
        let messages = self.messages.lock()?;
        let reacts = self.reacts.lock()?;

        let message = messages
            .get(message_id)
            .cloned()
            .ok_or_else(|| messages.not_found(message_id))?;
        let message_reacts = reacts
            .get(message_id)
            .ok_or_else(|| reacts.not_found(message_id))?;

        let message: MessageRecord = decode(MESSAGES, message_id, message)?;
        Ok(build_full_message(viewer, message, message_reacts, filter))
    }

    /// Every message in a channel joined with its reacts, in insertion
    /// order. Messages and reacts are read under one pair of locks so a
    /// concurrent delete can't split a message from its reacts.
    pub fn channel_message_views(
        &self,
        viewer: u64,
        channel_id: u64,
        filter: ReactFilter,
    ) -> Result<Vec<FullMessage>> {
        let messages = self.messages.lock()?;
        let reacts = self.reacts.lock()?;

        let mut views = Vec::new();
        for record in messages.query("channel_id", Operator::Eq, &json!(channel_id)) {
            let message: MessageRecord = decode_message(record)?;
            let message_reacts = reacts
                .get(message.message_id)
                .ok_or_else(|| reacts.not_found(message.message_id))?;
            views.push(build_full_message(viewer, message, message_reacts, filter));
        }
        Ok(views)
    }

    pub fn user_profile(&self, u_id: u64) -> Result<UserProfile> {
        Ok(profile_of(self.require_user(u_id)?))
    }

    pub fn member_summary(&self, u_id: u64) -> Result<MemberSummary> {
        let user = self.require_user(u_id)?;
        Ok(MemberSummary {
            u_id: user.u_id,
            name_first: user.first_name,
            name_last: user.last_name,
            profile_img_url: user.img_url,
        })
    }
}

/// Joins an already-fetched message with its reacts record.
pub fn build_full_message(
    viewer: u64,
    message: MessageRecord,
    reacts: &Record,
    filter: ReactFilter,
) -> FullMessage {
    let reacts = REACT_IDS
        .filter_map(|react_id| {
            let u_ids: Vec<u64> = reacts
                .get(&react_id.to_string())
                .and_then(Value::as_array)
                .map(|ids| ids.iter().filter_map(Value::as_u64).collect())
                .unwrap_or_default();
            if filter == ReactFilter::NonEmpty && u_ids.is_empty() {
                return None;
            }
            Some(ReactSummary {
                react_id,
                is_this_user_reacted: u_ids.contains(&viewer),
                u_ids,
            })
        })
        .collect();

    FullMessage {
        message_id: message.message_id,
        u_id: message.u_id,
        message: message.message,
        time_created: message.time_created,
        is_pinned: message.is_pinned,
        reacts,
    }
}

fn decode_message(record: Record) -> Result<MessageRecord> {
    let key = record
        .get("message_id")
        .and_then(Value::as_u64)
        .unwrap_or_default();
    decode(MESSAGES, key, record)
}

pub fn profile_of(user: UserRecord) -> UserProfile {
    UserProfile {
        email: user.email,
        name_first: user.first_name,
        name_last: user.last_name,
        handle_str: user.handle_str,
        profile_img_url: user.img_url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreError;

    fn db_with_message() -> (tempfile::TempDir, Database, u64) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let id = db
            .insert_message(&MessageRecord {
                message_id: 0,
                channel_id: 1,
                u_id: 1,
                message: "hi".into(),
                is_pinned: false,
                time_created: 10.0,
            })
            .unwrap();
        (dir, db, id)
    }

    #[test]
    fn test_non_empty_filter_hides_unused_reacts() {
        let (_dir, db, id) = db_with_message();
        db.reacts.append_to_field(id, "3", json!(2)).unwrap();

        let view = db.full_message(1, id, ReactFilter::NonEmpty).unwrap();
        assert_eq!(
            view.reacts,
            vec![ReactSummary {
                react_id: 3,
                u_ids: vec![2],
                is_this_user_reacted: false,
            }]
        );
        assert!(db.full_message(2, id, ReactFilter::NonEmpty).unwrap().reacts[0].is_this_user_reacted);
    }

    #[test]
    fn test_all_filter_lists_every_type_in_order() {
        let (_dir, db, id) = db_with_message();
        let view = db.full_message(1, id, ReactFilter::All).unwrap();
        let ids: Vec<u8> = view.reacts.iter().map(|r| r.react_id).collect();
        assert_eq!(ids, (1..=7).collect::<Vec<u8>>());
        assert_eq!(view.message, "hi");
    }

    #[test]
    fn test_missing_reacts_is_not_found() {
        let (_dir, db, id) = db_with_message();
        db.reacts.delete_record(id).unwrap();
        assert!(matches!(
            db.full_message(1, id, ReactFilter::NonEmpty),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_channel_views_only_cover_that_channel() {
        let (_dir, db, first) = db_with_message();
        db.insert_message(&MessageRecord {
            message_id: 0,
            channel_id: 2,
            u_id: 1,
            message: "elsewhere".into(),
            is_pinned: false,
            time_created: 11.0,
        })
        .unwrap();
        db.reacts.append_to_field(first, "1", json!(1)).unwrap();

        let views = db.channel_message_views(1, 1, ReactFilter::NonEmpty).unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].message_id, first);
        assert!(views[0].reacts[0].is_this_user_reacted);
    }

    #[test]
    fn test_missing_user_profile_is_not_found() {
        let (_dir, db, _) = db_with_message();
        assert!(matches!(db.user_profile(77), Err(StoreError::NotFound { .. })));
    }
}
