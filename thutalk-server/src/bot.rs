use anyhow::{Context, Result};
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use uuid::Uuid;

use thutalk_types::{Message, Profile, Role, User};

use crate::db::repositories::{MessageRepository, ProfileRepository, UserRepository};
use crate::db::Database;

/// The scripted chat bot every user can talk to
pub const CHAT_BOT_USERNAME: &str = "ThuTalk";
/// The account admin broadcasts are sent from
pub const OFFICIAL_BOT_USERNAME: &str = "TalkOfficialBot";
/// The official bot always owns this handle
pub const OFFICIAL_BOT_TALK_ID: &str = "talk-0000";

/// Bots never log in; this marker can never match a bcrypt hash
const UNUSABLE_PASSWORD: &str = "!";

lazy_static! {
    /// Keyword table for the chat bot. First match wins.
    static ref KEYWORD_REPLIES: Vec<(Regex, &'static str)> = vec![
        (
            Regex::new(r"(?i)\b(hello|hi|hey|mingalaba)\b").unwrap(),
            "Mingalaba! 👋 I'm ThuTalk, the resident bot. Type 'help' to see what I can answer.",
        ),
        (
            Regex::new(r"(?i)\bhelp\b").unwrap(),
            "You can ask me about: 'features', 'friends', 'stories' or 'privacy'. I reply to keywords I know.",
        ),
        (
            Regex::new(r"(?i)\b(who are you|about)\b").unwrap(),
            "I'm ThuTalk's welcome bot. I greet new members and answer simple questions, one keyword at a time.",
        ),
        (
            Regex::new(r"(?i)\bfeatures?\b").unwrap(),
            "ThuTalk has posts, 24-hour stories, comments, likes, friends and private chat. Try posting something!",
        ),
        (
            Regex::new(r"(?i)\bfriends?\b").unwrap(),
            "Open someone's profile and tap Add Friend. Once they accept, you'll see each other in your friend lists.",
        ),
        (
            Regex::new(r"(?i)\b(story|stories)\b").unwrap(),
            "Stories stay visible for 24 hours and then disappear. Add one from the home page.",
        ),
        (
            Regex::new(r"(?i)\b(privacy|block)\b").unwrap(),
            "You can block anyone from their profile. Blocked users can't see your posts, stories or profile, and can't message you.",
        ),
        (
            Regex::new(r"(?i)\bthanks?\b").unwrap(),
            "You're welcome! 😊",
        ),
        (
            Regex::new(r"(?i)\b(bye|goodbye)\b").unwrap(),
            "See you around! 👋",
        ),
    ];
}

/// Reply when no keyword matches
const FALLBACK_REPLY: &str =
    "Sorry, I didn't catch that. Type 'help' for the list of things I understand.";

const WELCOME_MESSAGE: &str = "Mingalaba! 👋 Welcome to ThuTalk. I'm the ThuTalk bot — \
    message me 'help' any time to learn your way around. Have fun!";

/// Pick the canned reply for an incoming chat message
pub fn auto_reply(text: &str) -> &'static str {
    for (pattern, reply) in KEYWORD_REPLIES.iter() {
        if pattern.is_match(text) {
            return reply;
        }
    }
    FALLBACK_REPLY
}

/// Whether a username belongs to one of the well-known bot accounts
pub fn is_bot_username(username: &str) -> bool {
    username == CHAT_BOT_USERNAME || username == OFFICIAL_BOT_USERNAME
}

fn get_or_create_bot(
    db: &Database,
    username: &str,
    role: Role,
    talk_id: Option<&str>,
) -> Result<User> {
    let users = UserRepository::new(db.pool.clone());
    let profiles = ProfileRepository::new(db.pool.clone());

    if let Some(existing) = users.get_by_username(username)? {
        // Keep the profile in the expected shape even if it was edited
        profiles.set_role(&existing.id, role)?;
        profiles.set_verified(&existing.id, true)?;
        return Ok(existing);
    }

    let bot = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: None,
        is_staff: false,
        is_bot: true,
        created_at: Utc::now(),
    };
    users
        .create(&bot, UNUSABLE_PASSWORD)
        .with_context(|| format!("Failed to create bot account {username}"))?;

    let talk_id = match talk_id {
        Some(fixed) if !profiles.talk_id_taken(fixed, None)? => fixed.to_string(),
        _ => profiles.generate_talk_id()?,
    };
    profiles.create(&Profile {
        user_id: bot.id,
        username: bot.username.clone(),
        talk_id,
        bio: None,
        avatar: None,
        role,
        is_verified: true,
        is_banned: false,
        ban_reason: None,
        banned_until: None,
        last_seen: None,
    })?;

    tracing::info!("Provisioned bot account {}", username);
    Ok(bot)
}

/// Make sure both well-known accounts exist, creating them on first run
pub fn ensure_bot_accounts(db: &Database) -> Result<()> {
    get_or_create_bot(db, CHAT_BOT_USERNAME, Role::Developer, None)?;
    get_or_create_bot(
        db,
        OFFICIAL_BOT_USERNAME,
        Role::Official,
        Some(OFFICIAL_BOT_TALK_ID),
    )?;
    Ok(())
}

/// The chat bot account, provisioning it if missing
pub fn chat_bot(db: &Database) -> Result<User> {
    get_or_create_bot(db, CHAT_BOT_USERNAME, Role::Developer, None)
}

/// The official broadcast account, provisioning it if missing
pub fn official_bot(db: &Database) -> Result<User> {
    get_or_create_bot(
        db,
        OFFICIAL_BOT_USERNAME,
        Role::Official,
        Some(OFFICIAL_BOT_TALK_ID),
    )
}

/// Send the welcome DM to a fresh registrant
pub fn welcome_new_user(db: &Database, user_id: &Uuid) -> Result<()> {
    let bot = chat_bot(db)?;
    let messages = MessageRepository::new(db.pool.clone());
    messages.create(&Message {
        id: Uuid::new_v4(),
        sender_id: bot.id,
        receiver_id: *user_id,
        sender_username: bot.username,
        content: Some(WELCOME_MESSAGE.to_string()),
        image: None,
        voice_note: None,
        parent_id: None,
        is_read: false,
        is_edited: false,
        created_at: Utc::now(),
    })?;
    Ok(())
}

/// Answer a DM sent to the chat bot: store the canned reply and mark the
/// user's message as read (the bot has "seen" it)
pub fn reply_to_message(db: &Database, user_id: &Uuid, incoming_text: &str) -> Result<Message> {
    let bot = chat_bot(db)?;
    let messages = MessageRepository::new(db.pool.clone());

    messages.mark_read(&bot.id, user_id)?;

    let reply = Message {
        id: Uuid::new_v4(),
        sender_id: bot.id,
        receiver_id: *user_id,
        sender_username: bot.username.clone(),
        content: Some(auto_reply(incoming_text).to_string()),
        image: None,
        voice_note: None,
        parent_id: None,
        is_read: false,
        is_edited: false,
        created_at: Utc::now(),
    };
    messages.create(&reply)?;
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::MessageRepository;

    #[test]
    fn test_auto_reply_keyword_matching() {
        assert!(auto_reply("Hello there!").contains("Mingalaba"));
        assert!(auto_reply("hi").contains("Mingalaba"));
        assert!(auto_reply("can you HELP me?").contains("keywords"));
        assert!(auto_reply("what features do you have").contains("stories"));
        assert!(auto_reply("thanks a lot").contains("welcome"));
        assert_eq!(auto_reply("qwerty"), FALLBACK_REPLY);
        // 'high' must not trigger the greeting ('hi' is word-bounded)
        assert_eq!(auto_reply("high noon"), FALLBACK_REPLY);
    }

    #[test]
    fn test_ensure_bot_accounts_is_idempotent() {
        let db = Database::in_memory().unwrap();
        ensure_bot_accounts(&db).unwrap();
        ensure_bot_accounts(&db).unwrap();

        let users = UserRepository::new(db.pool.clone());
        let chat = users.get_by_username(CHAT_BOT_USERNAME).unwrap().unwrap();
        let official = users
            .get_by_username(OFFICIAL_BOT_USERNAME)
            .unwrap()
            .unwrap();
        assert!(chat.is_bot);
        assert!(official.is_bot);

        let profiles = ProfileRepository::new(db.pool.clone());
        let official_profile = profiles.get_by_user_id(&official.id).unwrap().unwrap();
        assert_eq!(official_profile.talk_id, OFFICIAL_BOT_TALK_ID);
        assert_eq!(official_profile.role, Role::Official);
        assert!(official_profile.is_verified);
    }

    #[test]
    fn test_welcome_and_reply_flow() {
        let db = Database::in_memory().unwrap();
        ensure_bot_accounts(&db).unwrap();

        let user_id = Uuid::new_v4();
        let conn = db.connection().unwrap();
        conn.execute(
            "INSERT INTO users (id, username, email, password_hash, is_staff, is_bot, created_at)
             VALUES (?, 'newbie', NULL, 'x', 0, 0, ?)",
            (user_id.to_string(), Utc::now().to_rfc3339()),
        )
        .unwrap();
        drop(conn);

        welcome_new_user(&db, &user_id).unwrap();

        let bot = chat_bot(&db).unwrap();
        let messages = MessageRepository::new(db.pool.clone());
        let conversation = messages.get_conversation(&user_id, &bot.id).unwrap();
        assert_eq!(conversation.len(), 1);
        assert!(conversation[0].content.as_deref().unwrap().contains("Welcome"));

        // User asks something; the bot answers and marks it read
        messages
            .create(&Message {
                id: Uuid::new_v4(),
                sender_id: user_id,
                receiver_id: bot.id,
                sender_username: String::new(),
                content: Some("help".to_string()),
                image: None,
                voice_note: None,
                parent_id: None,
                is_read: false,
                is_edited: false,
                created_at: Utc::now(),
            })
            .unwrap();
        let reply = reply_to_message(&db, &user_id, "help").unwrap();
        assert!(reply.content.unwrap().contains("keywords"));
        assert_eq!(messages.unread_total(&bot.id).unwrap(), 0);
    }
}
