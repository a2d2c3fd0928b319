use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Parser;
use thutalk_server::db::repositories::StoryRepository;
use thutalk_server::db::Database;

/// ThuTalk story purge
///
/// Stories disappear from the app 24 hours after posting; this tool
/// hard-deletes the rows behind them. It is meant to run from an external
/// scheduler (cron or similar).
#[derive(Parser, Debug)]
#[command(name = "purge-stories")]
#[command(about = "Delete stories past their retention window", long_about = None)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, default_value = "./thutalk.db")]
    database: String,

    /// Age in hours beyond which stories are deleted
    #[arg(long, default_value_t = 6)]
    max_age_hours: i64,

    /// Report what would be deleted without touching anything
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Skip confirmation prompt
    #[arg(short = 'y', long)]
    yes: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let db = Database::new(&args.database)
        .with_context(|| format!("Failed to open database at {}", args.database))?;
    db.initialize().context("Failed to prepare database schema")?;

    let repo = StoryRepository::new(db.pool.clone());
    let cutoff = Utc::now() - Duration::hours(args.max_age_hours);

    let doomed = repo
        .count_older_than(cutoff)
        .context("Failed to count old stories")?;

    println!(
        "Found {} stories older than {} hours in {}",
        doomed, args.max_age_hours, args.database
    );

    if doomed == 0 {
        println!("Nothing to do.");
        return Ok(());
    }

    if args.dry_run {
        println!("Dry run: no stories deleted.");
        return Ok(());
    }

    if !args.yes {
        println!("Delete them? [y/N]");
        let mut answer = String::new();
        std::io::stdin()
            .read_line(&mut answer)
            .context("Failed to read confirmation")?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let deleted = repo
        .delete_older_than(cutoff)
        .context("Failed to delete old stories")?;

    println!("Successfully deleted {} old stories.", deleted);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use thutalk_types::Story;
    use uuid::Uuid;

    #[test]
    fn test_purge_only_touches_old_rows() {
        let db = Database::in_memory().unwrap();
        let conn = db.connection().unwrap();
        let user_id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO users (id, username, email, password_hash, is_staff, is_bot, created_at)
             VALUES (?, 'aung', NULL, 'x', 0, 0, ?)",
            (user_id.to_string(), Utc::now().to_rfc3339()),
        )
        .unwrap();

        let repo = StoryRepository::new(db.pool.clone());
        for age in [1i64, 7, 30] {
            repo.create(&Story {
                id: Uuid::new_v4(),
                user_id,
                username: String::new(),
                user_avatar: None,
                image: "stories/a.jpg".to_string(),
                caption: None,
                created_at: Utc::now() - Duration::hours(age),
            })
            .unwrap();
        }

        let cutoff = Utc::now() - Duration::hours(6);
        assert_eq!(repo.delete_older_than(cutoff).unwrap(), 2);
        assert_eq!(repo.count_older_than(cutoff).unwrap(), 0);
    }
}
