use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use thutalk_types::{Profile, Role};

use crate::db::DbPool;

const PROFILE_COLUMNS: &str = "p.user_id, u.username, p.talk_id, p.bio, p.avatar, p.role,
             p.is_verified, p.is_banned, p.ban_reason, p.banned_until, p.last_seen";

pub struct ProfileRepository {
    pool: DbPool,
}

impl ProfileRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
        Ok(Profile {
            user_id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
            username: row.get(1)?,
            talk_id: row.get(2)?,
            bio: row.get(3)?,
            avatar: row.get(4)?,
            role: Role::parse(&row.get::<_, String>(5)?).unwrap_or_default(),
            is_verified: row.get::<_, i32>(6)? == 1,
            is_banned: row.get::<_, i32>(7)? == 1,
            ban_reason: row.get(8)?,
            banned_until: row
                .get::<_, Option<String>>(9)?
                .map(|s| s.parse::<DateTime<Utc>>().unwrap()),
            last_seen: row
                .get::<_, Option<String>>(10)?
                .map(|s| s.parse::<DateTime<Utc>>().unwrap()),
        })
    }

    /// Create a profile row for a freshly registered user
    pub fn create(&self, profile: &Profile) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO profiles (user_id, talk_id, bio, avatar, role, is_verified, is_banned, ban_reason, banned_until, last_seen)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                profile.user_id.to_string(),
                &profile.talk_id,
                profile.bio.as_deref(),
                profile.avatar.as_deref(),
                profile.role.as_str(),
                if profile.is_verified { 1 } else { 0 },
                if profile.is_banned { 1 } else { 0 },
                profile.ban_reason.as_deref(),
                profile.banned_until.map(|t| t.to_rfc3339()),
                profile.last_seen.map(|t| t.to_rfc3339()),
            ),
        )
        .context("Failed to create profile")?;
        Ok(())
    }

    /// Pick an unused talk-NNNN handle. The digits come from fresh UUID
    /// bytes, retried on collision.
    pub fn generate_talk_id(&self) -> Result<String> {
        for _ in 0..64 {
            let bytes = Uuid::new_v4().into_bytes();
            let n = u16::from_be_bytes([bytes[0], bytes[1]]) % 10_000;
            let candidate = format!("talk-{:04}", n);
            if !self.talk_id_taken(&candidate, None)? {
                return Ok(candidate);
            }
        }
        anyhow::bail!("Could not find a free talk id")
    }

    /// Check whether a talk_id is already assigned, optionally ignoring one user
    pub fn talk_id_taken(&self, talk_id: &str, ignore_user: Option<&Uuid>) -> Result<bool> {
        let conn = self.pool.get()?;
        let count: i64 = match ignore_user {
            Some(user_id) => conn.query_row(
                "SELECT COUNT(*) FROM profiles WHERE talk_id = ? AND user_id != ?",
                (talk_id, user_id.to_string()),
                |row| row.get(0),
            )?,
            None => conn.query_row(
                "SELECT COUNT(*) FROM profiles WHERE talk_id = ?",
                [talk_id],
                |row| row.get(0),
            )?,
        };
        Ok(count > 0)
    }

    /// Get a profile by user ID
    pub fn get_by_user_id(&self, user_id: &Uuid) -> Result<Option<Profile>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROFILE_COLUMNS}
             FROM profiles p
             JOIN users u ON p.user_id = u.id
             WHERE p.user_id = ?"
        ))?;

        let profile = stmt
            .query_row([user_id.to_string()], Self::row_to_profile)
            .optional()?;
        Ok(profile)
    }

    /// Exact talk_id lookup (the "search by ID" feature)
    pub fn get_by_talk_id(&self, talk_id: &str) -> Result<Option<Profile>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROFILE_COLUMNS}
             FROM profiles p
             JOIN users u ON p.user_id = u.id
             WHERE p.talk_id = ?"
        ))?;

        let profile = stmt.query_row([talk_id], Self::row_to_profile).optional()?;
        Ok(profile)
    }

    /// Update the editable profile fields
    pub fn update(
        &self,
        user_id: &Uuid,
        bio: Option<&str>,
        avatar: Option<&str>,
        talk_id: Option<&str>,
    ) -> Result<()> {
        let conn = self.pool.get()?;
        if let Some(bio) = bio {
            conn.execute(
                "UPDATE profiles SET bio = ? WHERE user_id = ?",
                (bio, user_id.to_string()),
            )
            .context("Failed to update bio")?;
        }
        if let Some(avatar) = avatar {
            conn.execute(
                "UPDATE profiles SET avatar = ? WHERE user_id = ?",
                (avatar, user_id.to_string()),
            )
            .context("Failed to update avatar")?;
        }
        if let Some(talk_id) = talk_id {
            conn.execute(
                "UPDATE profiles SET talk_id = ? WHERE user_id = ?",
                (talk_id, user_id.to_string()),
            )
            .context("Failed to update talk id")?;
        }
        Ok(())
    }

    /// Record activity for presence tracking
    pub fn touch_last_seen(&self, user_id: &Uuid) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE profiles SET last_seen = ? WHERE user_id = ?",
            (Utc::now().to_rfc3339(), user_id.to_string()),
        )
        .context("Failed to update last seen")?;
        Ok(())
    }

    pub fn set_role(&self, user_id: &Uuid, role: Role) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE profiles SET role = ? WHERE user_id = ?",
            (role.as_str(), user_id.to_string()),
        )
        .context("Failed to update role")?;
        Ok(())
    }

    pub fn set_verified(&self, user_id: &Uuid, verified: bool) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE profiles SET is_verified = ? WHERE user_id = ?",
            (if verified { 1 } else { 0 }, user_id.to_string()),
        )
        .context("Failed to update verification flag")?;
        Ok(())
    }

    /// Ban a user, optionally until a given time
    pub fn set_ban(
        &self,
        user_id: &Uuid,
        reason: &str,
        until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE profiles SET is_banned = 1, ban_reason = ?, banned_until = ? WHERE user_id = ?",
            (
                reason,
                until.map(|t| t.to_rfc3339()),
                user_id.to_string(),
            ),
        )
        .context("Failed to ban user")?;
        Ok(())
    }

    /// Clear ban state (manual unban or expired ban)
    pub fn lift_ban(&self, user_id: &Uuid) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE profiles SET is_banned = 0, ban_reason = NULL, banned_until = NULL WHERE user_id = ?",
            [user_id.to_string()],
        )
        .context("Failed to lift ban")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn setup() -> (Database, ProfileRepository) {
        let db = Database::in_memory().expect("Failed to create test database");
        let repo = ProfileRepository::new(db.pool.clone());
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

    fn make_profile(user_id: Uuid, talk_id: &str) -> Profile {
        Profile {
            user_id,
            username: String::new(),
            talk_id: talk_id.to_string(),
            bio: None,
            avatar: None,
            role: Role::User,
            is_verified: false,
            is_banned: false,
            ban_reason: None,
            banned_until: None,
            last_seen: None,
        }
    }

    #[test]
    fn test_create_and_lookup() {
        let (db, repo) = setup();
        let user_id = insert_user(&db, "aung");
        repo.create(&make_profile(user_id, "talk-1111")).unwrap();

        let by_user = repo.get_by_user_id(&user_id).unwrap().expect("missing");
        assert_eq!(by_user.talk_id, "talk-1111");
        assert_eq!(by_user.username, "aung");

        let by_talk_id = repo.get_by_talk_id("talk-1111").unwrap().expect("missing");
        assert_eq!(by_talk_id.user_id, user_id);
    }

    #[test]
    fn test_talk_id_uniqueness() {
        let (db, repo) = setup();
        let first = insert_user(&db, "aung");
        let second = insert_user(&db, "mya");
        repo.create(&make_profile(first, "talk-2222")).unwrap();

        assert!(repo.talk_id_taken("talk-2222", None).unwrap());
        assert!(!repo.talk_id_taken("talk-2222", Some(&first)).unwrap());
        assert!(repo.create(&make_profile(second, "talk-2222")).is_err());

        let generated = repo.generate_talk_id().unwrap();
        assert!(generated.starts_with("talk-"));
        assert_ne!(generated, "talk-2222");
    }

    #[test]
    fn test_ban_lifecycle() {
        let (db, repo) = setup();
        let user_id = insert_user(&db, "aung");
        repo.create(&make_profile(user_id, "talk-3333")).unwrap();

        let until = Utc::now() + chrono::Duration::days(7);
        repo.set_ban(&user_id, "spam", Some(until)).unwrap();

        let banned = repo.get_by_user_id(&user_id).unwrap().unwrap();
        assert!(banned.is_banned);
        assert_eq!(banned.ban_reason.as_deref(), Some("spam"));
        assert!(banned.banned_until.is_some());

        repo.lift_ban(&user_id).unwrap();
        let lifted = repo.get_by_user_id(&user_id).unwrap().unwrap();
        assert!(!lifted.is_banned);
        assert!(lifted.ban_reason.is_none());
    }

    #[test]
    fn test_touch_last_seen() {
        let (db, repo) = setup();
        let user_id = insert_user(&db, "aung");
        repo.create(&make_profile(user_id, "talk-4444")).unwrap();

        assert!(repo.get_by_user_id(&user_id).unwrap().unwrap().last_seen.is_none());
        repo.touch_last_seen(&user_id).unwrap();
        assert!(repo.get_by_user_id(&user_id).unwrap().unwrap().last_seen.is_some());
    }
}
