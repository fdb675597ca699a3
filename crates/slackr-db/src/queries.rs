use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use slackr_types::models::{ChannelRecord, MessageRecord, REACT_IDS, UserRecord};

use crate::error::{Result, StoreError};
use crate::query::Operator;
use crate::store::{Record, RecordStore, Table};
use crate::{Database, MESSAGES};

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &UserRecord) -> Result<u64> {
        self.users.add(encode(user)?)
    }

    pub fn get_user(&self, u_id: u64) -> Result<Option<UserRecord>> {
        fetch(&self.users, u_id)
    }

    /// Like [`Database::get_user`] but a missing user is an error.
    pub fn require_user(&self, u_id: u64) -> Result<UserRecord> {
        require(&self.users, u_id)
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        first(&self.users, "email", Operator::Eq, &json!(email))
    }

    pub fn find_user_by_handle(&self, handle: &str) -> Result<Option<UserRecord>> {
        first(&self.users, "handle_str", Operator::Eq, &json!(handle))
    }

    pub fn find_user_by_reset_code(&self, code: &str) -> Result<Option<UserRecord>> {
        first(&self.users, "reset_codes", Operator::Contains, &json!(code))
    }

    pub fn list_users(&self) -> Result<Vec<UserRecord>> {
        decode_all(&self.users, self.users.list()?)
    }

    // -- Channels --

    pub fn create_channel(&self, channel: &ChannelRecord) -> Result<u64> {
        self.channels.add(encode(channel)?)
    }

    pub fn get_channel(&self, channel_id: u64) -> Result<Option<ChannelRecord>> {
        fetch(&self.channels, channel_id)
    }

    pub fn require_channel(&self, channel_id: u64) -> Result<ChannelRecord> {
        require(&self.channels, channel_id)
    }

    /// Channels whose `all_members` includes `u_id`.
    pub fn channels_with_member(&self, u_id: u64) -> Result<Vec<ChannelRecord>> {
        let records = self
            .channels
            .query("all_members", Operator::Contains, &json!(u_id))?;
        decode_all(&self.channels, records)
    }

    pub fn list_channels(&self) -> Result<Vec<ChannelRecord>> {
        decode_all(&self.channels, self.channels.list()?)
    }

    // -- Messages --

    pub fn get_message(&self, message_id: u64) -> Result<Option<MessageRecord>> {
        fetch(&self.messages, message_id)
    }

    pub fn require_message(&self, message_id: u64) -> Result<MessageRecord> {
        require(&self.messages, message_id)
    }

    /// Messages posted to a channel, in insertion order.
    pub fn messages_in_channel(&self, channel_id: u64) -> Result<Vec<MessageRecord>> {
        let records = self
            .messages
            .query("channel_id", Operator::Eq, &json!(channel_id))?;
        decode_all(&self.messages, records)
    }

    /// Creates a message and its reacts record under one key.
    ///
    /// Both collections are locked for the whole insert, so no reader sees a
    /// message without its reacts record.
    pub fn insert_message(&self, message: &MessageRecord) -> Result<u64> {
        let payload = encode(message)?;
        let mut messages = self.messages.lock()?;
        let mut reacts = self.reacts.lock()?;

        let message_id = messages.add(payload);
        reacts.add_with_id(empty_reacts(), message_id);
        Ok(message_id)
    }

    /// Inserts the message `decide` returns, if any, while the channels,
    /// messages and reacts collections are all held (in that order).
    ///
    /// `decide` sees the channels table and may update it. Every lock is
    /// taken before `decide` runs, so a failure to lock leaves the channels
    /// table untouched.
    pub fn post_to_channel<F>(&self, decide: F) -> Result<Option<u64>>
    where
        F: FnOnce(&mut Table) -> Result<Option<MessageRecord>>,
    {
        let mut channels = self.channels.lock()?;
        let mut messages = self.messages.lock()?;
        let mut reacts = self.reacts.lock()?;

        let Some(message) = decide(&mut channels)? else {
            return Ok(None);
        };
        let message_id = messages.add(encode(&message)?);
        reacts.add_with_id(empty_reacts(), message_id);
        Ok(Some(message_id))
    }

    /// Deletes a message together with its reacts record.
    pub fn delete_message(&self, message_id: u64) -> Result<MessageRecord> {
        let mut messages = self.messages.lock()?;
        let mut reacts = self.reacts.lock()?;

        if !messages.contains(message_id) {
            return Err(messages.not_found(message_id));
        }
        if reacts.contains(message_id) {
            reacts.delete_record(message_id)?;
        }
        let removed = messages.delete_record(message_id)?;
        decode(MESSAGES, message_id, removed)
    }

    /// The reacts record for a message.
    pub fn get_reacts(&self, message_id: u64) -> Result<Option<Record>> {
        self.reacts.get(message_id)
    }
}

impl Table {
    /// The record under `key` decoded as `T`.
    pub fn get_row<T: DeserializeOwned>(&self, key: u64) -> Result<Option<T>> {
        self.get(key)
            .cloned()
            .map(|record| decode(self.collection(), key, record))
            .transpose()
    }
}

/// A reacts record with every reaction type present and empty.
pub fn empty_reacts() -> Record {
    REACT_IDS
        .map(|react_id| (react_id.to_string(), Value::Array(Vec::new())))
        .collect()
}

/// Serializes a typed row into a record payload.
pub fn encode<T: Serialize>(row: &T) -> Result<Record> {
    Ok(serde_json::from_value(serde_json::to_value(row)?)?)
}

/// Deserializes a record into its typed row.
pub fn decode<T: DeserializeOwned>(collection: &str, key: u64, record: Record) -> Result<T> {
    serde_json::from_value(Value::Object(record)).map_err(|source| StoreError::Schema {
        collection: collection.to_string(),
        key,
        source,
    })
}

fn fetch<T: DeserializeOwned>(store: &RecordStore, key: u64) -> Result<Option<T>> {
    store
        .get(key)?
        .map(|record| decode(store.name(), key, record))
        .transpose()
}

fn require<T: DeserializeOwned>(store: &RecordStore, key: u64) -> Result<T> {
    fetch(store, key)?.ok_or_else(|| StoreError::NotFound {
        collection: store.name().to_string(),
        key,
    })
}

fn first<T: DeserializeOwned>(
    store: &RecordStore,
    field: &str,
    op: Operator,
    value: &Value,
) -> Result<Option<T>> {
    store
        .query(field, op, value)?
        .into_iter()
        .next()
        .map(|record| decode_keyed(store, record))
        .transpose()
}

fn decode_all<T: DeserializeOwned>(store: &RecordStore, records: Vec<Record>) -> Result<Vec<T>> {
    records
        .into_iter()
        .map(|record| decode_keyed(store, record))
        .collect()
}

fn decode_keyed<T: DeserializeOwned>(store: &RecordStore, record: Record) -> Result<T> {
    let key = record
        .get(store.primary_key())
        .and_then(Value::as_u64)
        .unwrap_or_default();
    decode(store.name(), key, record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::REACTS;

    fn db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        (dir, db)
    }

    fn user(email: &str) -> UserRecord {
        UserRecord {
            u_id: 0,
            email: email.to_string(),
            first_name: "John".into(),
            last_name: "Doe".into(),
            handle_str: format!("handle-{email}"),
            img_url: None,
            password_hash: "hash".into(),
            reset_codes: vec![],
            is_admin: false,
            is_slackr_owner: false,
        }
    }

    fn message(channel_id: u64, text: &str) -> MessageRecord {
        MessageRecord {
            message_id: 0,
            channel_id,
            u_id: 1,
            message: text.to_string(),
            is_pinned: false,
            time_created: 1.0,
        }
    }

    #[test]
    fn test_typed_round_trip_stamps_key() {
        let (_dir, db) = db();
        let u_id = db.create_user(&user("a@example.com")).unwrap();
        let stored = db.require_user(u_id).unwrap();
        assert_eq!(stored.u_id, u_id);
        assert_eq!(stored.email, "a@example.com");
    }

    #[test]
    fn test_find_by_email_and_reset_code() {
        let (_dir, db) = db();
        db.create_user(&user("a@example.com")).unwrap();
        let b = db.create_user(&user("b@example.com")).unwrap();
        db.users.append_to_field(b, "reset_codes", json!("code-1")).unwrap();

        assert_eq!(db.find_user_by_email("b@example.com").unwrap().unwrap().u_id, b);
        assert!(db.find_user_by_email("c@example.com").unwrap().is_none());
        assert_eq!(db.find_user_by_reset_code("code-1").unwrap().unwrap().u_id, b);
    }

    #[test]
    fn test_require_missing_is_not_found() {
        let (_dir, db) = db();
        assert!(matches!(
            db.require_channel(9),
            Err(StoreError::NotFound { key: 9, .. })
        ));
    }

    #[test]
    fn test_insert_message_creates_companion() {
        let (_dir, db) = db();
        let id = db.insert_message(&message(1, "hi")).unwrap();
        let reacts = db.get_reacts(id).unwrap().unwrap();
        assert_eq!(reacts["message_id"], json!(id));
        for react_id in REACT_IDS {
            assert_eq!(reacts[&react_id.to_string()], json!([]));
        }
    }

    #[test]
    fn test_delete_message_removes_companion() {
        let (_dir, db) = db();
        let keep = db.insert_message(&message(1, "keep")).unwrap();
        let gone = db.insert_message(&message(1, "gone")).unwrap();

        let removed = db.delete_message(gone).unwrap();
        assert_eq!(removed.message, "gone");
        assert!(db.get_message(gone).unwrap().is_none());
        assert!(db.get_reacts(gone).unwrap().is_none());
        assert!(db.get_reacts(keep).unwrap().is_some());
        assert_eq!(db.reacts.size().unwrap(), db.messages.size().unwrap());
        assert_eq!(db.reacts.name(), REACTS);
    }

    #[test]
    fn test_delete_missing_message_leaves_reacts_alone() {
        let (_dir, db) = db();
        db.reacts.add_with_id(empty_reacts(), 4).unwrap();
        assert!(matches!(
            db.delete_message(4),
            Err(StoreError::NotFound { .. })
        ));
        assert!(db.get_reacts(4).unwrap().is_some());
    }

    fn flagged_channel(db: &Database) -> u64 {
        let mut record = Record::new();
        record.insert("open".into(), json!(true));
        db.channels.add(record).unwrap()
    }

    #[test]
    fn test_post_to_channel_updates_and_inserts_together() {
        let (_dir, db) = db();
        let channel = flagged_channel(&db);

        let posted = db
            .post_to_channel(|channels| {
                channels.set_field(channel, "open", json!(false))?;
                Ok(Some(message(channel, "closing")))
            })
            .unwrap()
            .unwrap();
        assert_eq!(db.require_message(posted).unwrap().message, "closing");
        assert!(db.get_reacts(posted).unwrap().is_some());
        assert_eq!(db.channels.get(channel).unwrap().unwrap()["open"], json!(false));

        assert_eq!(db.post_to_channel(|_| Ok(None)).unwrap(), None);
        assert_eq!(db.messages.size().unwrap(), 1);
    }

    #[test]
    fn test_post_to_channel_poisoned_leaves_channels_untouched() {
        let (_dir, db) = db();
        let channel = flagged_channel(&db);
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = db.messages.lock().unwrap();
            panic!("poison messages");
        }));

        let mut ran = false;
        let result = db.post_to_channel(|channels| {
            ran = true;
            channels.set_field(channel, "open", json!(false))?;
            Ok(Some(message(channel, "lost")))
        });
        assert!(matches!(result, Err(StoreError::Poisoned(_))));
        assert!(!ran);
        assert_eq!(db.channels.get(channel).unwrap().unwrap()["open"], json!(true));
    }

    #[test]
    fn test_messages_in_channel_filters() {
        let (_dir, db) = db();
        db.insert_message(&message(1, "a")).unwrap();
        db.insert_message(&message(2, "b")).unwrap();
        db.insert_message(&message(1, "c")).unwrap();
        let texts: Vec<_> = db
            .messages_in_channel(1)
            .unwrap()
            .into_iter()
            .map(|m| m.message)
            .collect();
        assert_eq!(texts, vec!["a", "c"]);
    }

    #[test]
    fn test_schema_mismatch_reported() {
        let (_dir, db) = db();
        let mut bad = Record::new();
        bad.insert("email".into(), json!(5));
        let key = db.users.add(bad).unwrap();
        assert!(matches!(
            db.get_user(key),
            Err(StoreError::Schema { key: k, .. }) if k == key
        ));
    }
}
