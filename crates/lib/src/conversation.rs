//! Per-sender conversation history with a rolling retention cap.
//!
//! A conversation is an ordered list of turn strings. Each sender's history is
//! persisted as one pretty-printed JSON array in a file under the store
//! directory, written via temp file + rename so a reader never observes a
//! partial write.

use std::io;
use std::path::{Path, PathBuf};

/// Once a conversation reaches this many turns, it is cut back on save.
pub const RETENTION_TRIGGER: usize = 40;

/// Number of most-recent turns kept when the retention cap triggers.
pub const RETENTION_KEEP: usize = 30;

/// Ordered dialogue turns for one sender, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    turns: Vec<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: impl Into<String>) {
        self.turns.push(turn.into());
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[String] {
        &self.turns
    }

    /// Turns joined with a single space, in order. Used for prompt assembly.
    pub fn joined(&self) -> String {
        self.turns.join(" ")
    }

    /// The turns that survive the retention cap: everything until the
    /// conversation reaches `RETENTION_TRIGGER`, then only the most recent
    /// `RETENTION_KEEP`, order preserved.
    pub fn retained(&self) -> &[String] {
        if self.turns.len() >= RETENTION_TRIGGER {
            &self.turns[self.turns.len() - RETENTION_KEEP..]
        } else {
            &self.turns
        }
    }
}

impl From<Vec<String>> for Conversation {
    fn from(turns: Vec<String>) -> Self {
        Self { turns }
    }
}

/// File-backed store of conversations, one JSON file per sender id.
pub struct ConversationStore {
    dir: PathBuf,
}

impl ConversationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, sender_id: &str) -> PathBuf {
        let safe: String = sender_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }

    /// Load the sender's conversation. A missing file is the expected cold
    /// start; an unreadable or corrupt file is logged and treated the same.
    pub async fn load(&self, sender_id: &str) -> Conversation {
        let path = self.path_for(sender_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(s) => match serde_json::from_str::<Vec<String>>(&s) {
                Ok(turns) => Conversation::from(turns),
                Err(e) => {
                    log::warn!(
                        "conversation file {} is corrupt, starting fresh: {}",
                        path.display(),
                        e
                    );
                    Conversation::new()
                }
            },
            Err(_) => Conversation::new(),
        }
    }

    /// Persist the retained turns for the sender, overwriting the file.
    /// Writes to a temp file in the store directory and renames it over the
    /// target.
    pub async fn save(&self, sender_id: &str, conversation: &Conversation) -> io::Result<()> {
        let json = serde_json::to_string_pretty(conversation.retained())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(sender_id);
        let tmp = self.dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, json).await?;
        match tokio::fs::rename(&tmp, &path).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                Err(e)
            }
        }
    }

    /// Delete the sender's backing file. Missing file is not an error.
    pub async fn reset(&self, sender_id: &str) -> io::Result<()> {
        match tokio::fs::remove_file(self.path_for(sender_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> ConversationStore {
        let dir = std::env::temp_dir().join(format!("simon-store-test-{}", uuid::Uuid::new_v4()));
        ConversationStore::new(dir)
    }

    #[test]
    fn retained_is_everything_below_the_trigger() {
        let mut c = Conversation::new();
        for i in 0..RETENTION_TRIGGER - 1 {
            c.push(format!("turn {}", i));
        }
        assert_eq!(c.retained().len(), RETENTION_TRIGGER - 1);
    }

    #[test]
    fn retained_keeps_most_recent_at_the_trigger() {
        let mut c = Conversation::new();
        for i in 0..RETENTION_TRIGGER {
            c.push(format!("turn {}", i));
        }
        let retained = c.retained();
        assert_eq!(retained.len(), RETENTION_KEEP);
        assert_eq!(retained[0], format!("turn {}", RETENTION_TRIGGER - RETENTION_KEEP));
        assert_eq!(retained[RETENTION_KEEP - 1], format!("turn {}", RETENTION_TRIGGER - 1));
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = temp_store();
        let mut c = Conversation::new();
        c.push("\nHuman: Hello!");
        c.push("\nSimon: Hey.");
        store.save("123", &c).await.expect("save");
        let loaded = store.load("123").await;
        assert_eq!(loaded, c);
    }

    #[tokio::test]
    async fn save_persists_only_the_retained_tail() {
        let store = temp_store();
        let mut c = Conversation::new();
        for i in 0..RETENTION_TRIGGER + 1 {
            c.push(format!("turn {}", i));
        }
        store.save("123", &c).await.expect("save");
        let loaded = store.load("123").await;
        assert_eq!(loaded.len(), RETENTION_KEEP);
        assert_eq!(loaded.turns()[0], format!("turn {}", RETENTION_TRIGGER + 1 - RETENTION_KEEP));
    }

    #[tokio::test]
    async fn load_missing_file_is_empty() {
        let store = temp_store();
        assert!(store.load("nobody").await.is_empty());
    }

    #[tokio::test]
    async fn load_corrupt_file_is_empty() {
        let store = temp_store();
        tokio::fs::create_dir_all(store.dir()).await.expect("mkdir");
        tokio::fs::write(store.dir().join("123.json"), b"not json")
            .await
            .expect("write");
        assert!(store.load("123").await.is_empty());
    }

    #[tokio::test]
    async fn reset_removes_the_backing_file() {
        let store = temp_store();
        let mut c = Conversation::new();
        c.push("\nHuman: hi");
        store.save("123", &c).await.expect("save");
        store.reset("123").await.expect("reset");
        assert!(store.load("123").await.is_empty());
        store.reset("123").await.expect("reset of missing file");
    }

    #[tokio::test]
    async fn senders_are_partitioned() {
        let store = temp_store();
        let mut a = Conversation::new();
        a.push("\nHuman: from a");
        let mut b = Conversation::new();
        b.push("\nHuman: from b");
        store.save("111", &a).await.expect("save a");
        store.save("222", &b).await.expect("save b");
        assert_eq!(store.load("111").await, a);
        assert_eq!(store.load("222").await, b);
        store.reset("111").await.expect("reset a");
        assert!(store.load("111").await.is_empty());
        assert_eq!(store.load("222").await, b);
    }
}
