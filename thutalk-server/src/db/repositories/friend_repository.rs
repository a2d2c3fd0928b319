use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use thutalk_types::FriendRequest;

use crate::db::DbPool;

pub struct FriendRepository {
    pool: DbPool,
}

impl FriendRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    // ===== Friend requests =====

    /// Create a pending request
    pub fn create_request(&self, request: &FriendRequest) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO friend_requests (id, from_user_id, to_user_id, created_at)
             VALUES (?, ?, ?, ?)",
            (
                request.id.to_string(),
                request.from_user_id.to_string(),
                request.to_user_id.to_string(),
                request.created_at.to_rfc3339(),
            ),
        )
        .context("Failed to create friend request")?;
        Ok(())
    }

    pub fn get_request_by_id(&self, request_id: &Uuid) -> Result<Option<FriendRequest>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.from_user_id, r.to_user_id, u.username, r.created_at
             FROM friend_requests r
             JOIN users u ON r.from_user_id = u.id
             WHERE r.id = ?",
        )?;

        let request = stmt
            .query_row([request_id.to_string()], |row| {
                Ok(FriendRequest {
                    id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
                    from_user_id: Uuid::parse_str(&row.get::<_, String>(1)?).unwrap(),
                    to_user_id: Uuid::parse_str(&row.get::<_, String>(2)?).unwrap(),
                    from_username: row.get(3)?,
                    created_at: row.get::<_, String>(4)?.parse::<DateTime<Utc>>().unwrap(),
                })
            })
            .optional()?;

        Ok(request)
    }

    /// Pending request in one specific direction
    pub fn get_request_between(&self, from: &Uuid, to: &Uuid) -> Result<Option<Uuid>> {
        let conn = self.pool.get()?;
        let id: Option<String> = conn
            .query_row(
                "SELECT id FROM friend_requests WHERE from_user_id = ? AND to_user_id = ?",
                (from.to_string(), to.to_string()),
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(|s| Uuid::parse_str(&s).unwrap()))
    }

    /// Incoming requests for the notifications page
    pub fn incoming_requests(&self, user_id: &Uuid) -> Result<Vec<FriendRequest>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.from_user_id, r.to_user_id, u.username, r.created_at
             FROM friend_requests r
             JOIN users u ON r.from_user_id = u.id
             WHERE r.to_user_id = ?
             ORDER BY r.created_at DESC",
        )?;

        let requests = stmt
            .query_map([user_id.to_string()], |row| {
                Ok(FriendRequest {
                    id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
                    from_user_id: Uuid::parse_str(&row.get::<_, String>(1)?).unwrap(),
                    to_user_id: Uuid::parse_str(&row.get::<_, String>(2)?).unwrap(),
                    from_username: row.get(3)?,
                    created_at: row.get::<_, String>(4)?.parse::<DateTime<Utc>>().unwrap(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(requests)
    }

    /// Count of pending incoming requests (part of the bell badge)
    pub fn incoming_count(&self, user_id: &Uuid) -> Result<i64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM friend_requests WHERE to_user_id = ?",
            [user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn delete_request(&self, request_id: &Uuid) -> Result<usize> {
        let conn = self.pool.get()?;
        let deleted = conn
            .execute(
                "DELETE FROM friend_requests WHERE id = ?",
                [request_id.to_string()],
            )
            .context("Failed to delete friend request")?;
        Ok(deleted)
    }

    /// Remove any pending requests between two users, both directions
    pub fn delete_requests_between(&self, a: &Uuid, b: &Uuid) -> Result<usize> {
        let conn = self.pool.get()?;
        let deleted = conn
            .execute(
                "DELETE FROM friend_requests
                 WHERE (from_user_id = ?1 AND to_user_id = ?2)
                    OR (from_user_id = ?2 AND to_user_id = ?1)",
                rusqlite::params![a.to_string(), b.to_string()],
            )
            .context("Failed to delete friend requests")?;
        Ok(deleted)
    }

    // ===== Friendships (symmetric, stored as two directed rows) =====

    /// Make two users friends. Both directed rows go in together.
    pub fn add_friendship(&self, a: &Uuid, b: &Uuid) -> Result<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT OR IGNORE INTO friendships (user_id, friend_id, created_at) VALUES (?, ?, ?)",
            (a.to_string(), b.to_string(), &now),
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO friendships (user_id, friend_id, created_at) VALUES (?, ?, ?)",
            (b.to_string(), a.to_string(), &now),
        )?;
        tx.commit().context("Failed to add friendship")?;
        Ok(())
    }

    /// Remove a friendship, both directed rows together
    pub fn remove_friendship(&self, a: &Uuid, b: &Uuid) -> Result<usize> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let mut removed = tx.execute(
            "DELETE FROM friendships WHERE user_id = ? AND friend_id = ?",
            (a.to_string(), b.to_string()),
        )?;
        removed += tx.execute(
            "DELETE FROM friendships WHERE user_id = ? AND friend_id = ?",
            (b.to_string(), a.to_string()),
        )?;
        tx.commit().context("Failed to remove friendship")?;
        Ok(removed)
    }

    pub fn are_friends(&self, a: &Uuid, b: &Uuid) -> Result<bool> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM friendships WHERE user_id = ? AND friend_id = ?",
            (a.to_string(), b.to_string()),
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// A user's friends, most recent first
    pub fn get_friends(&self, user_id: &Uuid) -> Result<Vec<Uuid>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT friend_id FROM friendships WHERE user_id = ? ORDER BY created_at DESC",
        )?;

        let friends = stmt
            .query_map([user_id.to_string()], |row| {
                let id: String = row.get(0)?;
                Ok(Uuid::parse_str(&id).unwrap())
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(friends)
    }

    pub fn friend_count(&self, user_id: &Uuid) -> Result<usize> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM friendships WHERE user_id = ?",
            [user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn setup() -> (Database, FriendRepository) {
        let db = Database::in_memory().expect("Failed to create test database");
        let repo = FriendRepository::new(db.pool.clone());
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

    fn make_request(from: Uuid, to: Uuid) -> FriendRequest {
        FriendRequest {
            id: Uuid::new_v4(),
            from_user_id: from,
            to_user_id: to,
            from_username: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_duplicate_request_rejected() {
        let (db, repo) = setup();
        let a = insert_user(&db, "a");
        let b = insert_user(&db, "b");

        repo.create_request(&make_request(a, b)).unwrap();
        assert!(repo.create_request(&make_request(a, b)).is_err());
        // The reverse direction is a distinct pair and allowed by schema
        repo.create_request(&make_request(b, a)).unwrap();
    }

    #[test]
    fn test_friendship_is_mutual() {
        let (db, repo) = setup();
        let a = insert_user(&db, "a");
        let b = insert_user(&db, "b");

        repo.add_friendship(&a, &b).unwrap();
        assert!(repo.are_friends(&a, &b).unwrap());
        assert!(repo.are_friends(&b, &a).unwrap());
        assert_eq!(repo.friend_count(&a).unwrap(), 1);
        assert_eq!(repo.get_friends(&b).unwrap(), vec![a]);

        assert_eq!(repo.remove_friendship(&b, &a).unwrap(), 2);
        assert!(!repo.are_friends(&a, &b).unwrap());
        assert!(!repo.are_friends(&b, &a).unwrap());
    }

    #[test]
    fn test_request_lookup_and_cleanup() {
        let (db, repo) = setup();
        let a = insert_user(&db, "a");
        let b = insert_user(&db, "b");

        let request = make_request(a, b);
        repo.create_request(&request).unwrap();

        assert_eq!(repo.get_request_between(&a, &b).unwrap(), Some(request.id));
        assert_eq!(repo.get_request_between(&b, &a).unwrap(), None);
        assert_eq!(repo.incoming_count(&b).unwrap(), 1);

        let incoming = repo.incoming_requests(&b).unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].from_username, "a");

        repo.create_request(&make_request(b, a)).unwrap();
        assert_eq!(repo.delete_requests_between(&a, &b).unwrap(), 2);
        assert_eq!(repo.incoming_count(&b).unwrap(), 0);
    }
}
