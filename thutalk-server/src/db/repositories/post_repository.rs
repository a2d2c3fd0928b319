use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use thutalk_types::Post;

use crate::db::DbPool;

pub struct PostRepository {
    pool: DbPool,
}

impl PostRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn row_to_post(row: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
        Ok(Post {
            id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
            author_id: Uuid::parse_str(&row.get::<_, String>(1)?).unwrap(),
            author_username: row.get(2)?,
            author_avatar: row.get(3)?,
            content: row.get(4)?,
            image: row.get(5)?,
            created_at: row.get::<_, String>(6)?.parse::<DateTime<Utc>>().unwrap(),
            updated_at: row.get::<_, String>(7)?.parse::<DateTime<Utc>>().unwrap(),
            like_count: row.get(8)?,
            liked_by_viewer: row.get::<_, i64>(9)? > 0,
            comment_count: row.get(10)?,
        })
    }

    const POST_SELECT: &'static str = "SELECT p.id, p.author_id, u.username, pr.avatar, p.content, p.image,
                    p.created_at, p.updated_at,
                    (SELECT COUNT(*) FROM post_likes WHERE post_id = p.id) AS like_count,
                    (SELECT COUNT(*) FROM post_likes WHERE post_id = p.id AND user_id = ?1) AS liked,
                    (SELECT COUNT(*) FROM comments WHERE post_id = p.id) AS comment_count
             FROM posts p
             JOIN users u ON p.author_id = u.id
             LEFT JOIN profiles pr ON pr.user_id = u.id";

    /// Create a new post
    pub fn create(&self, post: &Post) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO posts (id, author_id, content, image, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                post.id.to_string(),
                post.author_id.to_string(),
                &post.content,
                post.image.as_deref(),
                post.created_at.to_rfc3339(),
                post.updated_at.to_rfc3339(),
            ),
        )
        .context("Failed to create post")?;
        Ok(())
    }

    /// Newest-first feed for a viewer, hiding authors with a block in
    /// either direction
    pub fn get_feed(&self, viewer_id: &Uuid, limit: i64) -> Result<Vec<Post>> {
        let conn = self.pool.get()?;
        let query = format!(
            "{}
             WHERE NOT EXISTS (
                 SELECT 1 FROM blocked_users b
                 WHERE (b.blocker_id = ?1 AND b.blocked_id = p.author_id)
                    OR (b.blocker_id = p.author_id AND b.blocked_id = ?1)
             )
             ORDER BY p.created_at DESC
             LIMIT ?2",
            Self::POST_SELECT
        );
        let mut stmt = conn.prepare(&query)?;

        let posts = stmt
            .query_map(rusqlite::params![viewer_id.to_string(), limit], Self::row_to_post)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(posts)
    }

    /// Posts by a specific author, newest first
    pub fn get_by_author(&self, viewer_id: &Uuid, author_id: &Uuid) -> Result<Vec<Post>> {
        let conn = self.pool.get()?;
        let query = format!(
            "{}
             WHERE p.author_id = ?2
             ORDER BY p.created_at DESC",
            Self::POST_SELECT
        );
        let mut stmt = conn.prepare(&query)?;

        let posts = stmt
            .query_map(
                rusqlite::params![viewer_id.to_string(), author_id.to_string()],
                Self::row_to_post,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(posts)
    }

    /// Get a single post by ID
    pub fn get_by_id(&self, viewer_id: &Uuid, post_id: &Uuid) -> Result<Option<Post>> {
        let conn = self.pool.get()?;
        let query = format!("{} WHERE p.id = ?2", Self::POST_SELECT);
        let mut stmt = conn.prepare(&query)?;

        let post = stmt
            .query_row(
                rusqlite::params![viewer_id.to_string(), post_id.to_string()],
                Self::row_to_post,
            )
            .optional()?;

        Ok(post)
    }

    /// Update a post's content and image, bumping updated_at
    pub fn update(&self, post_id: &Uuid, content: &str, image: Option<&str>) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE posts SET content = ?, image = ?, updated_at = ? WHERE id = ?",
            (content, image, Utc::now().to_rfc3339(), post_id.to_string()),
        )
        .context("Failed to update post")?;
        Ok(())
    }

    /// Delete a post; likes and comments cascade
    pub fn delete(&self, post_id: &Uuid) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute("DELETE FROM posts WHERE id = ?", [post_id.to_string()])
            .context("Failed to delete post")?;
        Ok(())
    }

    /// Toggle a like. Returns (now_liked, like_count).
    pub fn toggle_like(&self, post_id: &Uuid, user_id: &Uuid) -> Result<(bool, i64)> {
        let conn = self.pool.get()?;

        let removed = conn.execute(
            "DELETE FROM post_likes WHERE post_id = ? AND user_id = ?",
            (post_id.to_string(), user_id.to_string()),
        )?;

        let now_liked = removed == 0;
        if now_liked {
            conn.execute(
                "INSERT INTO post_likes (post_id, user_id, created_at) VALUES (?, ?, ?)",
                (
                    post_id.to_string(),
                    user_id.to_string(),
                    Utc::now().to_rfc3339(),
                ),
            )
            .context("Failed to like post")?;
        }

        let like_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM post_likes WHERE post_id = ?",
            [post_id.to_string()],
            |row| row.get(0),
        )?;

        Ok((now_liked, like_count))
    }

    /// Post count for a profile page
    pub fn count_by_author(&self, author_id: &Uuid) -> Result<usize> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE author_id = ?",
            [author_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn setup() -> (Database, PostRepository) {
        let db = Database::in_memory().expect("Failed to create test database");
        let repo = PostRepository::new(db.pool.clone());
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

    fn make_post(author_id: Uuid, content: &str) -> Post {
        let now = Utc::now();
        Post {
            id: Uuid::new_v4(),
            author_id,
            author_username: String::new(),
            author_avatar: None,
            content: content.to_string(),
            image: None,
            created_at: now,
            updated_at: now,
            like_count: 0,
            liked_by_viewer: false,
            comment_count: 0,
        }
    }

    #[test]
    fn test_feed_excludes_blocked_authors() {
        let (db, repo) = setup();
        let viewer = insert_user(&db, "viewer");
        let friend = insert_user(&db, "friend");
        let enemy = insert_user(&db, "enemy");

        repo.create(&make_post(friend, "visible")).unwrap();
        repo.create(&make_post(enemy, "hidden")).unwrap();

        let conn = db.connection().unwrap();
        conn.execute(
            "INSERT INTO blocked_users (blocker_id, blocked_id, created_at) VALUES (?, ?, ?)",
            (
                viewer.to_string(),
                enemy.to_string(),
                Utc::now().to_rfc3339(),
            ),
        )
        .unwrap();
        drop(conn);

        let feed = repo.get_feed(&viewer, 50).unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].content, "visible");
        assert_eq!(feed[0].author_username, "friend");
    }

    #[test]
    fn test_like_toggles() {
        let (db, repo) = setup();
        let author = insert_user(&db, "author");
        let liker = insert_user(&db, "liker");
        let post = make_post(author, "like me");
        repo.create(&post).unwrap();

        let (liked, count) = repo.toggle_like(&post.id, &liker).unwrap();
        assert!(liked);
        assert_eq!(count, 1);

        let fetched = repo.get_by_id(&liker, &post.id).unwrap().unwrap();
        assert!(fetched.liked_by_viewer);
        assert_eq!(fetched.like_count, 1);

        let (liked, count) = repo.toggle_like(&post.id, &liker).unwrap();
        assert!(!liked);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_update_bumps_updated_at() {
        let (db, repo) = setup();
        let author = insert_user(&db, "author");
        let post = make_post(author, "before");
        repo.create(&post).unwrap();

        repo.update(&post.id, "after", Some("pics/new.jpg")).unwrap();
        let fetched = repo.get_by_id(&author, &post.id).unwrap().unwrap();
        assert_eq!(fetched.content, "after");
        assert_eq!(fetched.image.as_deref(), Some("pics/new.jpg"));
        assert!(fetched.updated_at >= fetched.created_at);
    }

    #[test]
    fn test_delete_cascades_likes() {
        let (db, repo) = setup();
        let author = insert_user(&db, "author");
        let post = make_post(author, "gone soon");
        repo.create(&post).unwrap();
        repo.toggle_like(&post.id, &author).unwrap();

        repo.delete(&post.id).unwrap();
        assert!(repo.get_by_id(&author, &post.id).unwrap().is_none());

        let conn = db.connection().unwrap();
        let likes: i64 = conn
            .query_row("SELECT COUNT(*) FROM post_likes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(likes, 0);
    }
}
