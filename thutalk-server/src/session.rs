use crate::db::Database;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Database-backed session manager for persistent authentication
///
/// Manages user sessions with token-based authentication, including:
/// - Session creation with UUID v4 tokens
/// - Session validation with expiry checking
/// - Session deletion (logout)
/// - Automatic cleanup of expired sessions
#[derive(Clone)]
pub struct SessionManager {
    db: Database,
}

impl SessionManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a new session for a user
    ///
    /// Generates a UUID v4 token and stores it with a 30-day expiry.
    pub fn create_session(&self, user_id: Uuid) -> Result<String> {
        let token = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let expires_at = created_at + Duration::days(30);

        let conn = self.db.connection()?;
        conn.execute(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                token,
                user_id.to_string(),
                created_at.to_rfc3339(),
                expires_at.to_rfc3339(),
            ],
        )
        .context("Failed to create session")?;

        tracing::info!("Created session for user {}", user_id);
        Ok(token)
    }

    /// Validate a session token and return the associated user ID
    ///
    /// Expired sessions are removed on sight. A successful validation also
    /// refreshes the user's last_seen timestamp for presence.
    pub fn validate_session(&self, token: &str) -> Result<Uuid> {
        let conn = self.db.connection()?;

        let (user_id_str, expires_at_str): (String, String) = conn
            .query_row(
                "SELECT user_id, expires_at FROM sessions WHERE token = ?1",
                rusqlite::params![token],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .context("Session not found")?;

        let expires_at = DateTime::parse_from_rfc3339(&expires_at_str)
            .context("Failed to parse expiry time")?
            .with_timezone(&Utc);

        if Utc::now() > expires_at {
            self.delete_session(token)?;
            anyhow::bail!("Session has expired");
        }

        let user_id = Uuid::parse_str(&user_id_str).context("Failed to parse user ID")?;

        conn.execute(
            "UPDATE profiles SET last_seen = ?1 WHERE user_id = ?2",
            rusqlite::params![Utc::now().to_rfc3339(), user_id.to_string()],
        )
        .context("Failed to update last seen")?;

        Ok(user_id)
    }

    /// Delete a session (logout)
    pub fn delete_session(&self, token: &str) -> Result<()> {
        let conn = self.db.connection()?;
        let rows_affected = conn
            .execute(
                "DELETE FROM sessions WHERE token = ?1",
                rusqlite::params![token],
            )
            .context("Failed to delete session")?;

        if rows_affected > 0 {
            tracing::info!("Deleted session");
        }

        Ok(())
    }

    /// Delete every session a user holds (used when banning)
    pub fn delete_sessions_for_user(&self, user_id: &Uuid) -> Result<usize> {
        let conn = self.db.connection()?;
        let rows_affected = conn
            .execute(
                "DELETE FROM sessions WHERE user_id = ?1",
                rusqlite::params![user_id.to_string()],
            )
            .context("Failed to delete user sessions")?;
        Ok(rows_affected)
    }

    /// Clean up expired sessions from the database
    ///
    /// Removes all sessions that have passed their expiry time. Called at
    /// startup and hourly from a background task.
    pub fn cleanup_expired_sessions(&self) -> Result<usize> {
        let conn = self.db.connection()?;
        let now = Utc::now().to_rfc3339();

        let rows_affected = conn
            .execute(
                "DELETE FROM sessions WHERE expires_at < ?1",
                rusqlite::params![now],
            )
            .context("Failed to cleanup expired sessions")?;

        if rows_affected > 0 {
            tracing::info!("Cleaned up {} expired sessions", rows_affected);
        }

        Ok(rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn setup_test_db() -> (Database, Uuid) {
        let db = Database::in_memory().expect("Failed to create test database");
        let user_id = Uuid::new_v4();

        let conn = db.connection().expect("Failed to get connection");
        conn.execute(
            "INSERT INTO users (id, username, email, password_hash, is_staff, is_bot, created_at)
             VALUES (?1, 'testuser', NULL, 'x', 0, 0, ?2)",
            rusqlite::params![user_id.to_string(), Utc::now().to_rfc3339()],
        )
        .expect("Failed to create test user");
        conn.execute(
            "INSERT INTO profiles (user_id, talk_id) VALUES (?1, 'talk-7777')",
            rusqlite::params![user_id.to_string()],
        )
        .expect("Failed to create test profile");

        (db, user_id)
    }

    #[test]
    fn test_create_session() {
        let (db, user_id) = setup_test_db();
        let manager = SessionManager::new(db);

        let token = manager
            .create_session(user_id)
            .expect("Failed to create session");
        assert!(!token.is_empty());
        assert!(Uuid::parse_str(&token).is_ok(), "Token should be a valid UUID");
    }

    #[test]
    fn test_validate_session_touches_last_seen() {
        let (db, user_id) = setup_test_db();
        let manager = SessionManager::new(db.clone());

        let token = manager
            .create_session(user_id)
            .expect("Failed to create session");
        let validated = manager
            .validate_session(&token)
            .expect("Failed to validate session");
        assert_eq!(user_id, validated);

        let conn = db.connection().unwrap();
        let last_seen: Option<String> = conn
            .query_row(
                "SELECT last_seen FROM profiles WHERE user_id = ?1",
                rusqlite::params![user_id.to_string()],
                |row| row.get(0),
            )
            .unwrap();
        assert!(last_seen.is_some(), "validation should record presence");
    }

    #[test]
    fn test_validate_invalid_session() {
        let (db, _user_id) = setup_test_db();
        let manager = SessionManager::new(db);

        assert!(manager.validate_session("invalid-token").is_err());
    }

    #[test]
    fn test_delete_session() {
        let (db, user_id) = setup_test_db();
        let manager = SessionManager::new(db);

        let token = manager
            .create_session(user_id)
            .expect("Failed to create session");
        manager
            .delete_session(&token)
            .expect("Failed to delete session");

        assert!(
            manager.validate_session(&token).is_err(),
            "Session should be invalid after deletion"
        );
    }

    #[test]
    fn test_delete_sessions_for_user() {
        let (db, user_id) = setup_test_db();
        let manager = SessionManager::new(db);

        let token1 = manager.create_session(user_id).unwrap();
        let token2 = manager.create_session(user_id).unwrap();

        let removed = manager.delete_sessions_for_user(&user_id).unwrap();
        assert_eq!(removed, 2);
        assert!(manager.validate_session(&token1).is_err());
        assert!(manager.validate_session(&token2).is_err());
    }

    #[test]
    fn test_cleanup_expired_sessions() {
        let (db, user_id) = setup_test_db();
        let manager = SessionManager::new(db.clone());

        let token = manager
            .create_session(user_id)
            .expect("Failed to create session");

        // Manually expire the session
        let conn = db.connection().expect("Failed to get connection");
        let expired_time = (Utc::now() - Duration::days(1)).to_rfc3339();
        conn.execute(
            "UPDATE sessions SET expires_at = ?1 WHERE token = ?2",
            rusqlite::params![expired_time, token],
        )
        .expect("Failed to expire session");
        drop(conn);

        let cleaned = manager.cleanup_expired_sessions().expect("Failed to cleanup");
        assert_eq!(cleaned, 1);
        assert!(manager.validate_session(&token).is_err());
    }
}
