//! # slackr-db
//!
//! In-memory record store backing the slackr server. Each collection is a
//! [`RecordStore`]: integer-keyed JSON records with auto-increment keys,
//! linear-scan predicate queries, field-level mutation and whole-collection
//! JSON snapshots. [`Database`] owns the four collections the server uses.

pub mod error;
pub mod query;
pub mod queries;
pub mod snapshot;
pub mod store;
pub mod views;

use std::path::{Path, PathBuf};

use tracing::{info, warn};

pub use error::{Result, StoreError};
pub use query::{Dialect, Operator};
pub use store::{Record, RecordStore, START_ID, Table};

pub const USERS: &str = "users";
pub const CHANNELS: &str = "channels";
pub const MESSAGES: &str = "messages";
pub const REACTS: &str = "reacts";

/// The four collections, each loaded from its snapshot under one data
/// directory.
///
/// Code that locks more than one collection takes the locks in declaration
/// order: users, channels, messages, reacts.
pub struct Database {
    pub users: RecordStore,
    pub channels: RecordStore,
    pub messages: RecordStore,
    /// Keyed by the message id of the message each record belongs to.
    pub reacts: RecordStore,
    data_dir: PathBuf,
}

impl Database {
    pub fn open(data_dir: &Path) -> Result<Self> {
        let db = Self {
            users: RecordStore::open(data_dir, USERS, "u_id")?,
            channels: RecordStore::open(data_dir, CHANNELS, "channel_id")?,
            messages: RecordStore::open(data_dir, MESSAGES, "message_id")?,
            reacts: RecordStore::open(data_dir, REACTS, "message_id")?,
            data_dir: data_dir.to_path_buf(),
        };
        db.reconcile_reacts()?;

        info!("Database opened at {}", data_dir.display());
        Ok(db)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Snapshots every collection.
    pub fn save_all(&self) -> Result<Vec<PathBuf>> {
        [&self.users, &self.channels, &self.messages, &self.reacts]
            .into_iter()
            .map(RecordStore::save_snapshot)
            .collect()
    }

    /// Clears every collection.
    pub fn drop_all(&self) -> Result<()> {
        self.users.drop()?;
        self.channels.drop()?;
        self.messages.drop()?;
        self.reacts.drop()
    }

    /// Snapshots written at different times can disagree about which
    /// messages exist. Give every message a reacts record and drop reacts
    /// records whose message is gone.
    fn reconcile_reacts(&self) -> Result<()> {
        let messages = self.messages.lock()?;
        let mut reacts = self.reacts.lock()?;

        let mut created = 0;
        for key in messages.keys() {
            if !reacts.contains(key) {
                reacts.add_with_id(queries::empty_reacts(), key);
                created += 1;
            }
        }
        let mut removed = 0;
        for key in reacts.keys() {
            if !messages.contains(key) {
                reacts.delete_record(key)?;
                removed += 1;
            }
        }
        if created + removed > 0 {
            warn!(
                "Reconciled reacts with messages: {} created, {} orphans removed",
                created, removed
            );
        }
        Ok(())
    }
}
