use anyhow::{Context, Result};
use clap::Parser;
use rusqlite::Connection;

/// Database Inspector
///
/// Reports on a ThuTalk database: which tables exist, how many rows each
/// holds, and a few operational numbers (pending requests, unread
/// messages, active bans).
#[derive(Parser, Debug)]
#[command(name = "inspect-db")]
#[command(about = "Inspect a ThuTalk database", long_about = None)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, default_value = "./thutalk.db")]
    database: String,
}

const REQUIRED_TABLES: &[&str] = &[
    "users",
    "profiles",
    "posts",
    "post_likes",
    "comments",
    "stories",
    "messages",
    "notifications",
    "friend_requests",
    "friendships",
    "blocked_users",
    "admin_broadcasts",
    "sessions",
];

fn main() -> Result<()> {
    let args = Args::parse();

    println!("ThuTalk Database Inspector");
    println!("==========================");
    println!();
    println!("Database: {}", args.database);
    println!();

    if !std::path::Path::new(&args.database).exists() {
        println!("❌ Database file not found: {}", args.database);
        return Ok(());
    }

    let conn = Connection::open(&args.database).context("Failed to open database connection")?;

    println!("✓ Database file exists and is accessible");
    println!();

    println!("Tables:");
    println!("-------");

    let mut all_tables_exist = true;
    for table_name in REQUIRED_TABLES {
        if check_table_exists(&conn, table_name)? {
            let count = count_records(&conn, table_name)?;
            println!("  ✓ {:<18} {} rows", table_name, count);
        } else {
            println!("  ❌ {:<18} MISSING", table_name);
            all_tables_exist = false;
        }
    }

    if all_tables_exist {
        println!();
        println!("Activity:");
        println!("---------");

        let pending_requests: i64 = conn.query_row(
            "SELECT COUNT(*) FROM friend_requests",
            [],
            |row| row.get(0),
        )?;
        let unread_messages: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE is_read = 0",
            [],
            |row| row.get(0),
        )?;
        let active_bans: i64 = conn.query_row(
            "SELECT COUNT(*) FROM profiles WHERE is_banned = 1",
            [],
            |row| row.get(0),
        )?;
        let bots: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE is_bot = 1",
            [],
            |row| row.get(0),
        )?;

        println!("  pending friend requests : {}", pending_requests);
        println!("  unread messages         : {}", unread_messages);
        println!("  active bans             : {}", active_bans);
        println!("  bot accounts            : {}", bots);
    }

    println!();
    println!("Summary:");
    println!("--------");

    if all_tables_exist {
        println!("✓ All required tables exist");
    } else {
        println!("❌ Some required tables are missing");
        println!("⚠️  Run the server once (Database::initialize) to create them");
    }

    Ok(())
}

fn check_table_exists(conn: &Connection, table_name: &str) -> Result<bool> {
    let count: i32 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
        [table_name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn count_records(conn: &Connection, table_name: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", table_name),
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}
