use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use thutalk_types::AdminBroadcast;

use crate::db::DbPool;

pub struct BroadcastRepository {
    pool: DbPool,
}

impl BroadcastRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Persist the broadcast record itself
    pub fn create(&self, broadcast: &AdminBroadcast) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO admin_broadcasts (id, subject, message, created_at)
             VALUES (?, ?, ?, ?)",
            (
                broadcast.id.to_string(),
                &broadcast.subject,
                &broadcast.message,
                broadcast.created_at.to_rfc3339(),
            ),
        )
        .context("Failed to create broadcast")?;
        Ok(())
    }

    /// Past broadcasts, newest first
    pub fn list(&self) -> Result<Vec<AdminBroadcast>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, subject, message, created_at
             FROM admin_broadcasts
             ORDER BY created_at DESC",
        )?;

        let broadcasts = stmt
            .query_map([], |row| {
                Ok(AdminBroadcast {
                    id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
                    subject: row.get(1)?,
                    message: row.get(2)?,
                    created_at: row.get::<_, String>(3)?.parse::<DateTime<Utc>>().unwrap(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(broadcasts)
    }

    /// Fan a broadcast out as one DM plus one notification per recipient,
    /// all in a single transaction (the bulk insert of the original)
    pub fn fan_out(
        &self,
        bot_id: &Uuid,
        recipients: &[Uuid],
        message_body: &str,
        notification_text: &str,
    ) -> Result<usize> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        for recipient in recipients {
            tx.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, content, is_read, is_edited, created_at)
                 VALUES (?, ?, ?, ?, 0, 0, ?)",
                (
                    Uuid::new_v4().to_string(),
                    bot_id.to_string(),
                    recipient.to_string(),
                    message_body,
                    &now,
                ),
            )?;
            tx.execute(
                "INSERT INTO notifications (id, recipient_id, sender_id, kind, content, is_seen, created_at)
                 VALUES (?, ?, ?, 'message', ?, 0, ?)",
                (
                    Uuid::new_v4().to_string(),
                    recipient.to_string(),
                    bot_id.to_string(),
                    notification_text,
                    &now,
                ),
            )?;
        }

        tx.commit().context("Failed to fan out broadcast")?;
        Ok(recipients.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn setup() -> (Database, BroadcastRepository) {
        let db = Database::in_memory().expect("Failed to create test database");
        let repo = BroadcastRepository::new(db.pool.clone());
        (db, repo)
    }

    fn insert_user(db: &Database, username: &str, is_bot: bool) -> Uuid {
        let id = Uuid::new_v4();
        let conn = db.connection().unwrap();
        conn.execute(
            "INSERT INTO users (id, username, email, password_hash, is_staff, is_bot, created_at)
             VALUES (?, ?, NULL, 'x', 0, ?, ?)",
            (
                id.to_string(),
                username,
                if is_bot { 1 } else { 0 },
                Utc::now().to_rfc3339(),
            ),
        )
        .unwrap();
        id
    }

    #[test]
    fn test_fan_out_reaches_every_recipient() {
        let (db, repo) = setup();
        let bot = insert_user(&db, "official-bot", true);
        let a = insert_user(&db, "a", false);
        let b = insert_user(&db, "b", false);

        let sent = repo
            .fan_out(&bot, &[a, b], "📢 *News*\n\nBody", "Official News: News")
            .unwrap();
        assert_eq!(sent, 2);

        let conn = db.connection().unwrap();
        let messages: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM messages WHERE sender_id = ?",
                [bot.to_string()],
                |row| row.get(0),
            )
            .unwrap();
        let notifications: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM notifications WHERE sender_id = ? AND kind = 'message'",
                [bot.to_string()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(messages, 2);
        assert_eq!(notifications, 2);
    }

    #[test]
    fn test_broadcast_record_round_trip() {
        let (_db, repo) = setup();
        let broadcast = AdminBroadcast {
            id: Uuid::new_v4(),
            subject: "Maintenance".to_string(),
            message: "Downtime tonight".to_string(),
            created_at: Utc::now(),
        };
        repo.create(&broadcast).unwrap();

        let listed = repo.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].subject, "Maintenance");
    }
}
