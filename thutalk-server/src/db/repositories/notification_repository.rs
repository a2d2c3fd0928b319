use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use thutalk_types::{Notification, NotificationKind};

use crate::db::DbPool;

pub struct NotificationRepository {
    pool: DbPool,
}

impl NotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a notification
    pub fn create(&self, notification: &Notification) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO notifications (id, recipient_id, sender_id, kind, content, post_id, is_seen, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            (
                notification.id.to_string(),
                notification.recipient_id.to_string(),
                notification.sender_id.to_string(),
                notification.kind.as_str(),
                notification.content.as_deref(),
                notification.post_id.map(|id| id.to_string()),
                if notification.is_seen { 1 } else { 0 },
                notification.created_at.to_rfc3339(),
            ),
        )
        .context("Failed to create notification")?;
        Ok(())
    }

    /// A user's notifications, newest first
    pub fn list_for_user(&self, user_id: &Uuid) -> Result<Vec<Notification>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT n.id, n.recipient_id, n.sender_id, u.username, n.kind, n.content,
                    n.post_id, n.is_seen, n.created_at
             FROM notifications n
             JOIN users u ON n.sender_id = u.id
             WHERE n.recipient_id = ?
             ORDER BY n.created_at DESC",
        )?;

        let notifications = stmt
            .query_map([user_id.to_string()], |row| {
                let post: Option<String> = row.get(6)?;
                Ok(Notification {
                    id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
                    recipient_id: Uuid::parse_str(&row.get::<_, String>(1)?).unwrap(),
                    sender_id: Uuid::parse_str(&row.get::<_, String>(2)?).unwrap(),
                    sender_username: row.get(3)?,
                    kind: NotificationKind::parse(&row.get::<_, String>(4)?)
                        .unwrap_or(NotificationKind::Message),
                    content: row.get(5)?,
                    post_id: post.and_then(|s| Uuid::parse_str(&s).ok()),
                    is_seen: row.get::<_, i32>(7)? == 1,
                    created_at: row.get::<_, String>(8)?.parse::<DateTime<Utc>>().unwrap(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(notifications)
    }

    /// Mark every notification for the user as seen
    pub fn mark_all_seen(&self, user_id: &Uuid) -> Result<usize> {
        let conn = self.pool.get()?;
        let updated = conn
            .execute(
                "UPDATE notifications SET is_seen = 1 WHERE recipient_id = ? AND is_seen = 0",
                [user_id.to_string()],
            )
            .context("Failed to mark notifications seen")?;
        Ok(updated)
    }

    /// Unseen notifications for the bell badge. Message notifications are
    /// excluded; those surface through the chat badge instead.
    pub fn unseen_general_count(&self, user_id: &Uuid) -> Result<i64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notifications
             WHERE recipient_id = ? AND is_seen = 0 AND kind != 'message'",
            [user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn setup() -> (Database, NotificationRepository) {
        let db = Database::in_memory().expect("Failed to create test database");
        let repo = NotificationRepository::new(db.pool.clone());
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

    fn notify(repo: &NotificationRepository, to: Uuid, from: Uuid, kind: NotificationKind) {
        repo.create(&Notification {
            id: Uuid::new_v4(),
            recipient_id: to,
            sender_id: from,
            sender_username: String::new(),
            kind,
            content: None,
            post_id: None,
            is_seen: false,
            created_at: Utc::now(),
        })
        .unwrap();
    }

    #[test]
    fn test_bell_badge_excludes_message_kind() {
        let (db, repo) = setup();
        let me = insert_user(&db, "me");
        let other = insert_user(&db, "other");

        notify(&repo, me, other, NotificationKind::Like);
        notify(&repo, me, other, NotificationKind::Comment);
        notify(&repo, me, other, NotificationKind::Message);

        assert_eq!(repo.unseen_general_count(&me).unwrap(), 2);
        assert_eq!(repo.list_for_user(&me).unwrap().len(), 3);
    }

    #[test]
    fn test_mark_all_seen() {
        let (db, repo) = setup();
        let me = insert_user(&db, "me");
        let other = insert_user(&db, "other");

        notify(&repo, me, other, NotificationKind::Like);
        notify(&repo, me, other, NotificationKind::FriendAccept);

        assert_eq!(repo.mark_all_seen(&me).unwrap(), 2);
        assert_eq!(repo.unseen_general_count(&me).unwrap(), 0);
        assert!(repo.list_for_user(&me).unwrap().iter().all(|n| n.is_seen));
    }
}
