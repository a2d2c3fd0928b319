use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use thutalk_types::{Story, StoryGroup};

use crate::db::DbPool;

/// Stories disappear from every query this long after posting
pub const STORY_VISIBLE_HOURS: i64 = 24;

pub struct StoryRepository {
    pool: DbPool,
}

impl StoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn row_to_story(row: &rusqlite::Row<'_>) -> rusqlite::Result<Story> {
        Ok(Story {
            id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
            user_id: Uuid::parse_str(&row.get::<_, String>(1)?).unwrap(),
            username: row.get(2)?,
            user_avatar: row.get(3)?,
            image: row.get(4)?,
            caption: row.get(5)?,
            created_at: row.get::<_, String>(6)?.parse::<DateTime<Utc>>().unwrap(),
        })
    }

    /// Create a new story
    pub fn create(&self, story: &Story) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO stories (id, user_id, image, caption, created_at)
             VALUES (?, ?, ?, ?, ?)",
            (
                story.id.to_string(),
                story.user_id.to_string(),
                &story.image,
                story.caption.as_deref(),
                story.created_at.to_rfc3339(),
            ),
        )
        .context("Failed to create story")?;
        Ok(())
    }

    /// Get a story by ID (including expired ones, for owner deletes)
    pub fn get_by_id(&self, story_id: &Uuid) -> Result<Option<Story>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.user_id, u.username, p.avatar, s.image, s.caption, s.created_at
             FROM stories s
             JOIN users u ON s.user_id = u.id
             LEFT JOIN profiles p ON p.user_id = u.id
             WHERE s.id = ?",
        )?;

        let story = stmt
            .query_row([story_id.to_string()], Self::row_to_story)
            .optional()?;
        Ok(story)
    }

    /// Active stories for the feed rail: younger than the visibility
    /// window, authors with a block either way hidden, grouped per author
    /// with the viewer's own group first
    pub fn get_active_grouped(&self, viewer_id: &Uuid) -> Result<Vec<StoryGroup>> {
        let conn = self.pool.get()?;
        let cutoff = (Utc::now() - Duration::hours(STORY_VISIBLE_HOURS)).to_rfc3339();
        let mut stmt = conn.prepare(
            "SELECT s.id, s.user_id, u.username, p.avatar, s.image, s.caption, s.created_at
             FROM stories s
             JOIN users u ON s.user_id = u.id
             LEFT JOIN profiles p ON p.user_id = u.id
             WHERE s.created_at > ?1
               AND NOT EXISTS (
                   SELECT 1 FROM blocked_users b
                   WHERE (b.blocker_id = ?2 AND b.blocked_id = s.user_id)
                      OR (b.blocker_id = s.user_id AND b.blocked_id = ?2)
               )
             ORDER BY (s.user_id = ?2) DESC, s.created_at ASC",
        )?;

        let stories = stmt
            .query_map(
                rusqlite::params![cutoff, viewer_id.to_string()],
                Self::row_to_story,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        // Fold the time-ordered rows into per-author groups, keeping the
        // viewer-first ordering from the query
        let mut groups: Vec<StoryGroup> = Vec::new();
        for story in stories {
            match groups.iter_mut().find(|g| g.user_id == story.user_id) {
                Some(group) => group.stories.push(story),
                None => groups.push(StoryGroup {
                    user_id: story.user_id,
                    username: story.username.clone(),
                    user_avatar: story.user_avatar.clone(),
                    stories: vec![story],
                }),
            }
        }

        Ok(groups)
    }

    /// Delete a story
    pub fn delete(&self, story_id: &Uuid) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute("DELETE FROM stories WHERE id = ?", [story_id.to_string()])
            .context("Failed to delete story")?;
        Ok(())
    }

    /// Hard-delete stories older than the given cutoff. Returns the number
    /// of rows removed. Used by the scheduled purge tool.
    pub fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.pool.get()?;
        let deleted = conn
            .execute(
                "DELETE FROM stories WHERE created_at < ?",
                [cutoff.to_rfc3339()],
            )
            .context("Failed to purge old stories")?;
        Ok(deleted)
    }

    /// Count stories older than the cutoff without deleting (dry runs)
    pub fn count_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM stories WHERE created_at < ?",
            [cutoff.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn setup() -> (Database, StoryRepository) {
        let db = Database::in_memory().expect("Failed to create test database");
        let repo = StoryRepository::new(db.pool.clone());
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

    fn insert_story(repo: &StoryRepository, user_id: Uuid, age_hours: i64) -> Story {
        let story = Story {
            id: Uuid::new_v4(),
            user_id,
            username: String::new(),
            user_avatar: None,
            image: "stories/pic.jpg".to_string(),
            caption: None,
            created_at: Utc::now() - Duration::hours(age_hours),
        };
        repo.create(&story).unwrap();
        story
    }

    #[test]
    fn test_expired_stories_are_filtered() {
        let (db, repo) = setup();
        let user = insert_user(&db, "aung");
        insert_story(&repo, user, 1);
        insert_story(&repo, user, 25);

        let groups = repo.get_active_grouped(&user).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].stories.len(), 1);
    }

    #[test]
    fn test_viewer_group_comes_first() {
        let (db, repo) = setup();
        let viewer = insert_user(&db, "viewer");
        let other = insert_user(&db, "other");
        insert_story(&repo, other, 2);
        insert_story(&repo, viewer, 1);

        let groups = repo.get_active_grouped(&viewer).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].user_id, viewer);
    }

    #[test]
    fn test_blocked_author_stories_hidden() {
        let (db, repo) = setup();
        let viewer = insert_user(&db, "viewer");
        let enemy = insert_user(&db, "enemy");
        insert_story(&repo, enemy, 1);

        let conn = db.connection().unwrap();
        conn.execute(
            "INSERT INTO blocked_users (blocker_id, blocked_id, created_at) VALUES (?, ?, ?)",
            (
                enemy.to_string(),
                viewer.to_string(),
                Utc::now().to_rfc3339(),
            ),
        )
        .unwrap();
        drop(conn);

        assert!(repo.get_active_grouped(&viewer).unwrap().is_empty());
    }

    #[test]
    fn test_purge_old_stories() {
        let (db, repo) = setup();
        let user = insert_user(&db, "aung");
        insert_story(&repo, user, 1);
        insert_story(&repo, user, 7);
        insert_story(&repo, user, 8);

        let cutoff = Utc::now() - Duration::hours(6);
        assert_eq!(repo.count_older_than(cutoff).unwrap(), 2);
        assert_eq!(repo.delete_older_than(cutoff).unwrap(), 2);
        assert_eq!(repo.count_older_than(cutoff).unwrap(), 0);
    }
}
