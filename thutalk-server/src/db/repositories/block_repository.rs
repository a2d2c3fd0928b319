use anyhow::{Context, Result};
use chrono::Utc;
use uuid::Uuid;

use crate::db::DbPool;

pub struct BlockRepository {
    pool: DbPool,
}

impl BlockRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Block a user. Any friendship and pending requests between the pair
    /// are removed in the same transaction.
    pub fn block(&self, blocker_id: &Uuid, blocked_id: &Uuid) -> Result<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO blocked_users (blocker_id, blocked_id, created_at)
             VALUES (?, ?, ?)",
            (
                blocker_id.to_string(),
                blocked_id.to_string(),
                Utc::now().to_rfc3339(),
            ),
        )?;
        tx.execute(
            "DELETE FROM friendships
             WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
            rusqlite::params![blocker_id.to_string(), blocked_id.to_string()],
        )?;
        tx.execute(
            "DELETE FROM friend_requests
             WHERE (from_user_id = ?1 AND to_user_id = ?2)
                OR (from_user_id = ?2 AND to_user_id = ?1)",
            rusqlite::params![blocker_id.to_string(), blocked_id.to_string()],
        )?;

        tx.commit().context("Failed to block user")?;
        Ok(())
    }

    /// Remove a block (only the caller's own direction)
    pub fn unblock(&self, blocker_id: &Uuid, blocked_id: &Uuid) -> Result<usize> {
        let conn = self.pool.get()?;
        let deleted = conn
            .execute(
                "DELETE FROM blocked_users WHERE blocker_id = ? AND blocked_id = ?",
                (blocker_id.to_string(), blocked_id.to_string()),
            )
            .context("Failed to unblock user")?;
        Ok(deleted)
    }

    /// Whether either user blocks the other. This is the visibility test
    /// every social query applies.
    pub fn is_blocked_either_way(&self, a: &Uuid, b: &Uuid) -> Result<bool> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM blocked_users
             WHERE (blocker_id = ?1 AND blocked_id = ?2)
                OR (blocker_id = ?2 AND blocked_id = ?1)",
            rusqlite::params![a.to_string(), b.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Users the given user has blocked (for the settings page)
    pub fn list_blocked(&self, blocker_id: &Uuid) -> Result<Vec<Uuid>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT blocked_id FROM blocked_users WHERE blocker_id = ? ORDER BY created_at DESC",
        )?;

        let blocked = stmt
            .query_map([blocker_id.to_string()], |row| {
                let id: String = row.get(0)?;
                Ok(Uuid::parse_str(&id).unwrap())
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(blocked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::db::repositories::FriendRepository;
    use thutalk_types::FriendRequest;

    fn setup() -> (Database, BlockRepository) {
        let db = Database::in_memory().expect("Failed to create test database");
        let repo = BlockRepository::new(db.pool.clone());
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

    #[test]
    fn test_block_severs_friendship_and_requests() {
        let (db, repo) = setup();
        let friends = FriendRepository::new(db.pool.clone());
        let a = insert_user(&db, "a");
        let b = insert_user(&db, "b");

        friends.add_friendship(&a, &b).unwrap();
        friends
            .create_request(&FriendRequest {
                id: Uuid::new_v4(),
                from_user_id: b,
                to_user_id: a,
                from_username: String::new(),
                created_at: Utc::now(),
            })
            .unwrap();

        repo.block(&a, &b).unwrap();

        assert!(repo.is_blocked_either_way(&a, &b).unwrap());
        assert!(repo.is_blocked_either_way(&b, &a).unwrap());
        assert!(!friends.are_friends(&a, &b).unwrap());
        assert!(!friends.are_friends(&b, &a).unwrap());
        assert_eq!(friends.incoming_count(&a).unwrap(), 0);
    }

    #[test]
    fn test_unblock_is_directional() {
        let (db, repo) = setup();
        let a = insert_user(&db, "a");
        let b = insert_user(&db, "b");

        repo.block(&a, &b).unwrap();
        repo.block(&b, &a).unwrap();

        assert_eq!(repo.unblock(&a, &b).unwrap(), 1);
        // b's own block still stands
        assert!(repo.is_blocked_either_way(&a, &b).unwrap());
        assert_eq!(repo.list_blocked(&b).unwrap(), vec![a]);

        assert_eq!(repo.unblock(&b, &a).unwrap(), 1);
        assert!(!repo.is_blocked_either_way(&a, &b).unwrap());
    }
}
