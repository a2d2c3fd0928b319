use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use thutalk_types::User;

use crate::db::DbPool;

pub struct UserRepository {
    pool: DbPool,
}

impl UserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a new user with a bcrypt password hash
    pub fn create(&self, user: &User, password_hash: &str) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO users (id, username, email, password_hash, is_staff, is_bot, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                user.id.to_string(),
                &user.username,
                user.email.as_deref(),
                password_hash,
                if user.is_staff { 1 } else { 0 },
                if user.is_bot { 1 } else { 0 },
                user.created_at.to_rfc3339(),
            ),
        )
        .context("Failed to create user")?;
        Ok(())
    }

    /// Get user by ID
    pub fn get_by_id(&self, user_id: &Uuid) -> Result<Option<User>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, username, email, is_staff, is_bot, created_at
             FROM users
             WHERE id = ?",
        )?;

        let user = stmt
            .query_row([user_id.to_string()], |row| {
                Ok(User {
                    id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
                    username: row.get(1)?,
                    email: row.get(2)?,
                    is_staff: row.get::<_, i32>(3)? == 1,
                    is_bot: row.get::<_, i32>(4)? == 1,
                    created_at: row.get::<_, String>(5)?.parse::<DateTime<Utc>>().unwrap(),
                })
            })
            .optional()?;

        Ok(user)
    }

    /// Get user by username
    pub fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, username, email, is_staff, is_bot, created_at
             FROM users
             WHERE username = ?",
        )?;

        let user = stmt
            .query_row([username], |row| {
                Ok(User {
                    id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
                    username: row.get(1)?,
                    email: row.get(2)?,
                    is_staff: row.get::<_, i32>(3)? == 1,
                    is_bot: row.get::<_, i32>(4)? == 1,
                    created_at: row.get::<_, String>(5)?.parse::<DateTime<Utc>>().unwrap(),
                })
            })
            .optional()?;

        Ok(user)
    }

    /// Get the stored password hash for a user
    pub fn get_password_hash(&self, user_id: &Uuid) -> Result<Option<String>> {
        let conn = self.pool.get()?;
        let hash = conn
            .query_row(
                "SELECT password_hash FROM users WHERE id = ?",
                [user_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    /// Replace a user's password hash
    pub fn set_password_hash(&self, user_id: &Uuid, password_hash: &str) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE users SET password_hash = ? WHERE id = ?",
            [password_hash, &user_id.to_string()],
        )
        .context("Failed to update password hash")?;
        Ok(())
    }

    /// Search users by username substring, hiding bots and anyone in a
    /// block relation with the searcher (either direction)
    pub fn search(&self, viewer_id: &Uuid, query: &str) -> Result<Vec<User>> {
        let conn = self.pool.get()?;
        let pattern = format!("%{}%", query);
        let mut stmt = conn.prepare(
            "SELECT u.id, u.username, u.email, u.is_staff, u.is_bot, u.created_at
             FROM users u
             WHERE u.username LIKE ?
               AND u.is_bot = 0
               AND u.id != ?
               AND NOT EXISTS (
                   SELECT 1 FROM blocked_users b
                   WHERE (b.blocker_id = ? AND b.blocked_id = u.id)
                      OR (b.blocker_id = u.id AND b.blocked_id = ?)
               )
             ORDER BY u.username",
        )?;

        let users = stmt
            .query_map(
                (
                    pattern,
                    viewer_id.to_string(),
                    viewer_id.to_string(),
                    viewer_id.to_string(),
                ),
                |row| {
                    Ok(User {
                        id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
                        username: row.get(1)?,
                        email: row.get(2)?,
                        is_staff: row.get::<_, i32>(3)? == 1,
                        is_bot: row.get::<_, i32>(4)? == 1,
                        created_at: row.get::<_, String>(5)?.parse::<DateTime<Utc>>().unwrap(),
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(users)
    }

    /// All non-bot user IDs, for broadcast fan-out
    pub fn list_non_bot_ids(&self) -> Result<Vec<Uuid>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT id FROM users WHERE is_bot = 0")?;

        let ids = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                Ok(Uuid::parse_str(&id).unwrap())
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ids)
    }

    /// Update username and email
    pub fn update_account(&self, user_id: &Uuid, username: &str, email: Option<&str>) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE users SET username = ?, email = ? WHERE id = ?",
            (username, email, user_id.to_string()),
        )
        .context("Failed to update account")?;
        Ok(())
    }

    /// Delete a user; owned rows go with it via ON DELETE CASCADE
    pub fn delete(&self, user_id: &Uuid) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute("DELETE FROM users WHERE id = ?", [user_id.to_string()])
            .context("Failed to delete user")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn setup() -> (Database, UserRepository) {
        let db = Database::in_memory().expect("Failed to create test database");
        let repo = UserRepository::new(db.pool.clone());
        (db, repo)
    }

    fn make_user(username: &str) -> User {
        User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: None,
            is_staff: false,
            is_bot: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_create_and_fetch_user() {
        let (_db, repo) = setup();
        let user = make_user("aung");
        repo.create(&user, "hash").expect("create failed");

        let by_id = repo.get_by_id(&user.id).unwrap().expect("missing by id");
        assert_eq!(by_id.username, "aung");

        let by_name = repo.get_by_username("aung").unwrap().expect("missing by name");
        assert_eq!(by_name.id, user.id);

        assert!(repo.get_by_username("nobody").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let (_db, repo) = setup();
        repo.create(&make_user("aung"), "h1").unwrap();
        assert!(repo.create(&make_user("aung"), "h2").is_err());
    }

    #[test]
    fn test_password_hash_round_trip() {
        let (_db, repo) = setup();
        let user = make_user("mya");
        repo.create(&user, "old-hash").unwrap();

        assert_eq!(
            repo.get_password_hash(&user.id).unwrap().as_deref(),
            Some("old-hash")
        );

        repo.set_password_hash(&user.id, "new-hash").unwrap();
        assert_eq!(
            repo.get_password_hash(&user.id).unwrap().as_deref(),
            Some("new-hash")
        );
    }

    #[test]
    fn test_search_hides_bots_and_blocked() {
        let (db, repo) = setup();
        let viewer = make_user("viewer");
        let friend = make_user("thandar");
        let blocked = make_user("thawda");
        let mut bot = make_user("thu-bot");
        bot.is_bot = true;

        for (u, h) in [(&viewer, "h"), (&friend, "h"), (&blocked, "h"), (&bot, "h")] {
            repo.create(u, h).unwrap();
        }

        let conn = db.connection().unwrap();
        conn.execute(
            "INSERT INTO blocked_users (blocker_id, blocked_id, created_at) VALUES (?, ?, ?)",
            (
                blocked.id.to_string(),
                viewer.id.to_string(),
                Utc::now().to_rfc3339(),
            ),
        )
        .unwrap();
        drop(conn);

        let found = repo.search(&viewer.id, "th").unwrap();
        let names: Vec<_> = found.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["thandar"]);
    }
}
