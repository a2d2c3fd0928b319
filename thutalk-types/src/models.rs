use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enums::{NotificationKind, RelationshipStatus, Role};

// Custom serde module for DateTime to ensure RFC3339 string format
mod datetime_format {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<DateTime<Utc>>().map_err(serde::de::Error::custom)
    }
}

// Same as datetime_format but for optional timestamps (ban expiry, last seen)
mod datetime_format_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => serializer.serialize_some(&d.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        match s {
            Some(s) => s
                .parse::<DateTime<Utc>>()
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub is_staff: bool,
    pub is_bot: bool,
    #[serde(with = "datetime_format")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: Uuid,
    /// Populated from the users table when returned by the API
    #[serde(default)]
    pub username: String,
    pub talk_id: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub role: Role,
    pub is_verified: bool,
    pub is_banned: bool,
    #[serde(default)]
    pub ban_reason: Option<String>,
    #[serde(default, with = "datetime_format_opt")]
    pub banned_until: Option<DateTime<Utc>>,
    #[serde(default, with = "datetime_format_opt")]
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    #[serde(default)]
    pub author_username: String,
    #[serde(default)]
    pub author_avatar: Option<String>,
    pub content: String,
    pub image: Option<String>,
    #[serde(with = "datetime_format")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "datetime_format")]
    pub updated_at: DateTime<Utc>,
    /// Like total for display
    #[serde(default)]
    pub like_count: i64,
    /// Whether the requesting user has liked this post
    #[serde(default)]
    pub liked_by_viewer: bool,
    #[serde(default)]
    pub comment_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub username: String,
    pub content: String,
    /// Parent comment for one level of threaded replies
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(with = "datetime_format")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub user_avatar: Option<String>,
    pub image: String,
    pub caption: Option<String>,
    #[serde(with = "datetime_format")]
    pub created_at: DateTime<Utc>,
}

/// One author's active stories, for the feed story rail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryGroup {
    pub user_id: Uuid,
    pub username: String,
    pub user_avatar: Option<String>,
    pub stories: Vec<Story>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    #[serde(default)]
    pub sender_username: String,
    pub content: Option<String>,
    pub image: Option<String>,
    pub voice_note: Option<String>,
    /// Message being replied to
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    pub is_read: bool,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(with = "datetime_format")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub sender_id: Uuid,
    #[serde(default)]
    pub sender_username: String,
    pub kind: NotificationKind,
    pub content: Option<String>,
    #[serde(default)]
    pub post_id: Option<Uuid>,
    pub is_seen: bool,
    #[serde(with = "datetime_format")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequest {
    pub id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    #[serde(default)]
    pub from_username: String,
    #[serde(with = "datetime_format")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminBroadcast {
    pub id: Uuid,
    pub subject: String,
    pub message: String,
    #[serde(with = "datetime_format")]
    pub created_at: DateTime<Utc>,
}

/// Entry in the chat inbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub other_user_id: Uuid,
    pub other_username: String,
    pub other_avatar: Option<String>,
    pub last_message: String,
    pub last_message_time: String,
    pub unread_count: usize,
}

/// Presence info for the chat header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStatus {
    pub username: String,
    #[serde(default, with = "datetime_format_opt")]
    pub last_seen: Option<DateTime<Utc>>,
    pub online: bool,
}

/// Badge counters: bell icon and chat icon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnreadCounts {
    pub unread_notifications: i64,
    pub unread_chats: i64,
}

/// A profile as seen by another user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileView {
    pub user_id: Uuid,
    pub username: String,
    pub talk_id: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub role: Role,
    pub is_verified: bool,
    pub friend_count: usize,
    pub post_count: usize,
    pub relationship: RelationshipStatus,
}

// Request/Response types for API
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: User,
    pub profile: Profile,
    pub session_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdatePostRequest {
    pub content: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateStoryRequest {
    pub image: String,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub voice_note: Option<String>,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

impl SendMessageRequest {
    /// A message must carry text, an image or a voice note
    pub fn is_empty(&self) -> bool {
        self.content.as_deref().map_or(true, |c| c.trim().is_empty())
            && self.image.is_none()
            && self.voice_note.is_none()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EditMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub talk_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BanRequest {
    pub reason: String,
    #[serde(default, with = "datetime_format_opt")]
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BroadcastRequest {
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_message_request_emptiness() {
        let empty = SendMessageRequest {
            content: Some("   ".to_string()),
            image: None,
            voice_note: None,
            parent_id: None,
        };
        assert!(empty.is_empty());

        let voice_only = SendMessageRequest {
            content: None,
            image: None,
            voice_note: Some("voice/abc.ogg".to_string()),
            parent_id: None,
        };
        assert!(!voice_only.is_empty());
    }

    #[test]
    fn test_profile_serializes_timestamps_as_rfc3339() {
        let profile = Profile {
            user_id: Uuid::nil(),
            username: "aung".to_string(),
            talk_id: "talk-1234".to_string(),
            bio: None,
            avatar: None,
            role: Role::User,
            is_verified: false,
            is_banned: false,
            ban_reason: None,
            banned_until: None,
            last_seen: Some("2024-03-01T10:00:00Z".parse().unwrap()),
        };
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["last_seen"], "2024-03-01T10:00:00+00:00");
        assert!(json["banned_until"].is_null());
    }
}
