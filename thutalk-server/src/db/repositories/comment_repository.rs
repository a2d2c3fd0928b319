use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use thutalk_types::Comment;

use crate::db::DbPool;

pub struct CommentRepository {
    pool: DbPool,
}

impl CommentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn row_to_comment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
        let parent: Option<String> = row.get(5)?;
        Ok(Comment {
            id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
            post_id: Uuid::parse_str(&row.get::<_, String>(1)?).unwrap(),
            user_id: Uuid::parse_str(&row.get::<_, String>(2)?).unwrap(),
            username: row.get(3)?,
            content: row.get(4)?,
            parent_id: parent.and_then(|s| Uuid::parse_str(&s).ok()),
            created_at: row.get::<_, String>(6)?.parse::<DateTime<Utc>>().unwrap(),
        })
    }

    /// Create a comment or a one-level reply
    pub fn create(&self, comment: &Comment) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO comments (id, post_id, user_id, content, parent_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                comment.id.to_string(),
                comment.post_id.to_string(),
                comment.user_id.to_string(),
                &comment.content,
                comment.parent_id.map(|id| id.to_string()),
                comment.created_at.to_rfc3339(),
            ),
        )
        .context("Failed to create comment")?;
        Ok(())
    }

    /// Get a comment by ID
    pub fn get_by_id(&self, comment_id: &Uuid) -> Result<Option<Comment>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.post_id, c.user_id, u.username, c.content, c.parent_id, c.created_at
             FROM comments c
             JOIN users u ON c.user_id = u.id
             WHERE c.id = ?",
        )?;

        let comment = stmt
            .query_row([comment_id.to_string()], Self::row_to_comment)
            .optional()?;
        Ok(comment)
    }

    /// All comments on a post, oldest first (replies interleave by time;
    /// clients group them under parent_id)
    pub fn get_by_post(&self, post_id: &Uuid) -> Result<Vec<Comment>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.post_id, c.user_id, u.username, c.content, c.parent_id, c.created_at
             FROM comments c
             JOIN users u ON c.user_id = u.id
             WHERE c.post_id = ?
             ORDER BY c.created_at ASC",
        )?;

        let comments = stmt
            .query_map([post_id.to_string()], Self::row_to_comment)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(comments)
    }

    /// Delete a comment; replies cascade
    pub fn delete(&self, comment_id: &Uuid) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute("DELETE FROM comments WHERE id = ?", [comment_id.to_string()])
            .context("Failed to delete comment")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn setup() -> (Database, CommentRepository) {
        let db = Database::in_memory().expect("Failed to create test database");
        let repo = CommentRepository::new(db.pool.clone());
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

    fn insert_post(db: &Database, author_id: &Uuid) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        let conn = db.connection().unwrap();
        conn.execute(
            "INSERT INTO posts (id, author_id, content, image, created_at, updated_at)
             VALUES (?, ?, 'post body', NULL, ?, ?)",
            (id.to_string(), author_id.to_string(), &now, &now),
        )
        .unwrap();
        id
    }

    fn make_comment(post_id: Uuid, user_id: Uuid, content: &str, parent_id: Option<Uuid>) -> Comment {
        Comment {
            id: Uuid::new_v4(),
            post_id,
            user_id,
            username: String::new(),
            content: content.to_string(),
            parent_id,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_comment_thread() {
        let (db, repo) = setup();
        let author = insert_user(&db, "author");
        let commenter = insert_user(&db, "commenter");
        let post_id = insert_post(&db, &author);

        let top = make_comment(post_id, commenter, "nice post", None);
        repo.create(&top).unwrap();
        let reply = make_comment(post_id, author, "thanks!", Some(top.id));
        repo.create(&reply).unwrap();

        let comments = repo.get_by_post(&post_id).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].parent_id, None);
        assert_eq!(comments[1].parent_id, Some(top.id));
        assert_eq!(comments[0].username, "commenter");
    }

    #[test]
    fn test_deleting_parent_removes_replies() {
        let (db, repo) = setup();
        let author = insert_user(&db, "author");
        let post_id = insert_post(&db, &author);

        let top = make_comment(post_id, author, "top", None);
        repo.create(&top).unwrap();
        repo.create(&make_comment(post_id, author, "reply", Some(top.id)))
            .unwrap();

        repo.delete(&top.id).unwrap();
        assert!(repo.get_by_post(&post_id).unwrap().is_empty());
    }
}
