use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use thutalk_types::Message;

use crate::db::DbPool;

pub struct MessageRepository {
    pool: DbPool,
}

impl MessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
        let parent: Option<String> = row.get(7)?;
        Ok(Message {
            id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
            sender_id: Uuid::parse_str(&row.get::<_, String>(1)?).unwrap(),
            receiver_id: Uuid::parse_str(&row.get::<_, String>(2)?).unwrap(),
            sender_username: row.get(3)?,
            content: row.get(4)?,
            image: row.get(5)?,
            voice_note: row.get(6)?,
            parent_id: parent.and_then(|s| Uuid::parse_str(&s).ok()),
            is_read: row.get::<_, i32>(8)? == 1,
            is_edited: row.get::<_, i32>(9)? == 1,
            created_at: row.get::<_, String>(10)?.parse::<DateTime<Utc>>().unwrap(),
        })
    }

    const MESSAGE_SELECT: &'static str = "SELECT m.id, m.sender_id, m.receiver_id, u.username, m.content, m.image,
                    m.voice_note, m.parent_id, m.is_read, m.is_edited, m.created_at
             FROM messages m
             JOIN users u ON m.sender_id = u.id";

    /// Store a new message
    pub fn create(&self, message: &Message) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO messages (id, sender_id, receiver_id, content, image, voice_note, parent_id, is_read, is_edited, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?)",
            (
                message.id.to_string(),
                message.sender_id.to_string(),
                message.receiver_id.to_string(),
                message.content.as_deref(),
                message.image.as_deref(),
                message.voice_note.as_deref(),
                message.parent_id.map(|id| id.to_string()),
                if message.is_read { 1 } else { 0 },
                message.created_at.to_rfc3339(),
            ),
        )
        .context("Failed to create message")?;
        Ok(())
    }

    /// Get a message by ID
    pub fn get_by_id(&self, message_id: &Uuid) -> Result<Option<Message>> {
        let conn = self.pool.get()?;
        let query = format!("{} WHERE m.id = ?", Self::MESSAGE_SELECT);
        let mut stmt = conn.prepare(&query)?;

        let message = stmt
            .query_row([message_id.to_string()], Self::row_to_message)
            .optional()?;
        Ok(message)
    }

    /// Full conversation between two users, oldest first
    pub fn get_conversation(&self, user_id: &Uuid, other_id: &Uuid) -> Result<Vec<Message>> {
        let conn = self.pool.get()?;
        let query = format!(
            "{}
             WHERE (m.sender_id = ?1 AND m.receiver_id = ?2)
                OR (m.sender_id = ?2 AND m.receiver_id = ?1)
             ORDER BY m.created_at ASC",
            Self::MESSAGE_SELECT
        );
        let mut stmt = conn.prepare(&query)?;

        let messages = stmt
            .query_map(
                rusqlite::params![user_id.to_string(), other_id.to_string()],
                Self::row_to_message,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    /// Substring search within one conversation
    pub fn search_conversation(
        &self,
        user_id: &Uuid,
        other_id: &Uuid,
        query_text: &str,
    ) -> Result<Vec<Message>> {
        let conn = self.pool.get()?;
        let query = format!(
            "{}
             WHERE ((m.sender_id = ?1 AND m.receiver_id = ?2)
                 OR (m.sender_id = ?2 AND m.receiver_id = ?1))
               AND m.content LIKE ?3
             ORDER BY m.created_at ASC",
            Self::MESSAGE_SELECT
        );
        let mut stmt = conn.prepare(&query)?;

        let pattern = format!("%{}%", query_text);
        let messages = stmt
            .query_map(
                rusqlite::params![user_id.to_string(), other_id.to_string(), pattern],
                Self::row_to_message,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    /// Users the given user has a conversation with, most recent first,
    /// hiding partners with a block in either direction
    pub fn get_partners(&self, user_id: &Uuid) -> Result<Vec<Uuid>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT other_id FROM (
                 SELECT CASE WHEN sender_id = ?1 THEN receiver_id ELSE sender_id END AS other_id,
                        MAX(created_at) AS last_time
                 FROM messages
                 WHERE sender_id = ?1 OR receiver_id = ?1
                 GROUP BY other_id
             )
             WHERE NOT EXISTS (
                 SELECT 1 FROM blocked_users b
                 WHERE (b.blocker_id = ?1 AND b.blocked_id = other_id)
                    OR (b.blocker_id = other_id AND b.blocked_id = ?1)
             )
             ORDER BY last_time DESC",
        )?;

        let partners = stmt
            .query_map(rusqlite::params![user_id.to_string()], |row| {
                let id: String = row.get(0)?;
                Ok(Uuid::parse_str(&id).unwrap())
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(partners)
    }

    /// Mark everything the other user sent as read
    pub fn mark_read(&self, user_id: &Uuid, other_id: &Uuid) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE messages SET is_read = 1 WHERE receiver_id = ? AND sender_id = ?",
            (user_id.to_string(), other_id.to_string()),
        )
        .context("Failed to mark messages as read")?;
        Ok(())
    }

    /// Total unread messages for the chat icon badge
    pub fn unread_total(&self, user_id: &Uuid) -> Result<i64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE receiver_id = ? AND is_read = 0",
            [user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Edit a message's text, flagging it as edited
    pub fn update_content(&self, message_id: &Uuid, content: &str) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE messages SET content = ?, is_edited = 1 WHERE id = ?",
            (content, message_id.to_string()),
        )
        .context("Failed to edit message")?;
        Ok(())
    }

    /// Delete a message
    pub fn delete(&self, message_id: &Uuid) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute("DELETE FROM messages WHERE id = ?", [message_id.to_string()])
            .context("Failed to delete message")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn setup() -> (Database, MessageRepository) {
        let db = Database::in_memory().expect("Failed to create test database");
        let repo = MessageRepository::new(db.pool.clone());
        (db, repo)
    }

    fn insert_user(db: &Database, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        let conn = db.connection().unwrap();
        conn.execute(
            "INSERT INTO users (id, username, email, password_hash, is_staff, is_bot, created_at)
             VALUES (?, ?, NULL, 'x', 0, 0, ?)",
            (id.to_string(), username, Utc::now().to_rfc3339()),
        )
        .unwrap();
        id
    }

    fn send(repo: &MessageRepository, from: Uuid, to: Uuid, text: &str) -> Message {
        let message = Message {
            id: Uuid::new_v4(),
            sender_id: from,
            receiver_id: to,
            sender_username: String::new(),
            content: Some(text.to_string()),
            image: None,
            voice_note: None,
            parent_id: None,
            is_read: false,
            is_edited: false,
            created_at: Utc::now(),
        };
        repo.create(&message).unwrap();
        message
    }

    #[test]
    fn test_conversation_round_trip() {
        let (db, repo) = setup();
        let aung = insert_user(&db, "aung");
        let mya = insert_user(&db, "mya");

        send(&repo, aung, mya, "hello");
        send(&repo, mya, aung, "hi there");

        let conversation = repo.get_conversation(&aung, &mya).unwrap();
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation[0].sender_username, "aung");
        assert_eq!(conversation[1].sender_username, "mya");
    }

    #[test]
    fn test_mark_read_and_unread_total() {
        let (db, repo) = setup();
        let aung = insert_user(&db, "aung");
        let mya = insert_user(&db, "mya");

        send(&repo, aung, mya, "one");
        send(&repo, aung, mya, "two");
        assert_eq!(repo.unread_total(&mya).unwrap(), 2);

        repo.mark_read(&mya, &aung).unwrap();
        assert_eq!(repo.unread_total(&mya).unwrap(), 0);
    }

    #[test]
    fn test_partners_ordered_by_recency_and_block_filtered() {
        let (db, repo) = setup();
        let me = insert_user(&db, "me");
        let first = insert_user(&db, "first");
        let second = insert_user(&db, "second");
        let enemy = insert_user(&db, "enemy");

        let conn = db.connection().unwrap();
        let base = Utc::now();
        for (other, minutes) in [(first, 10i64), (second, 5), (enemy, 1)] {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, content, is_read, is_edited, created_at)
                 VALUES (?, ?, ?, 'hey', 0, 0, ?)",
                (
                    Uuid::new_v4().to_string(),
                    other.to_string(),
                    me.to_string(),
                    (base - chrono::Duration::minutes(minutes)).to_rfc3339(),
                ),
            )
            .unwrap();
        }
        conn.execute(
            "INSERT INTO blocked_users (blocker_id, blocked_id, created_at) VALUES (?, ?, ?)",
            (me.to_string(), enemy.to_string(), base.to_rfc3339()),
        )
        .unwrap();
        drop(conn);

        let partners = repo.get_partners(&me).unwrap();
        assert_eq!(partners, vec![second, first]);
    }

    #[test]
    fn test_edit_sets_flag() {
        let (db, repo) = setup();
        let aung = insert_user(&db, "aung");
        let mya = insert_user(&db, "mya");
        let message = send(&repo, aung, mya, "typo");

        repo.update_content(&message.id, "fixed").unwrap();
        let fetched = repo.get_by_id(&message.id).unwrap().unwrap();
        assert_eq!(fetched.content.as_deref(), Some("fixed"));
        assert!(fetched.is_edited);
    }

    #[test]
    fn test_search_conversation() {
        let (db, repo) = setup();
        let aung = insert_user(&db, "aung");
        let mya = insert_user(&db, "mya");

        send(&repo, aung, mya, "see you at the tea shop");
        send(&repo, mya, aung, "which shop?");
        send(&repo, aung, mya, "the usual one");

        let hits = repo.search_conversation(&aung, &mya, "shop").unwrap();
        assert_eq!(hits.len(), 2);
    }
}
