use serde::{Deserialize, Serialize};

/// Profile role tags shown next to usernames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Developer,
    AppInspector,
    Creator,
    Official,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Developer => "developer",
            Role::AppInspector => "app_inspector",
            Role::Creator => "creator",
            Role::Official => "official",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(Role::User),
            "developer" => Some(Role::Developer),
            "app_inspector" => Some(Role::AppInspector),
            "creator" => Some(Role::Creator),
            "official" => Some(Role::Official),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Like,
    Comment,
    FriendAccept,
    Message,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Like => "like",
            NotificationKind::Comment => "comment",
            NotificationKind::FriendAccept => "friend_accept",
            NotificationKind::Message => "message",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "like" => Some(NotificationKind::Like),
            "comment" => Some(NotificationKind::Comment),
            "friend_accept" => Some(NotificationKind::FriendAccept),
            "message" => Some(NotificationKind::Message),
            _ => None,
        }
    }
}

/// How the viewed profile relates to the viewer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelationshipStatus {
    #[serde(rename = "self")]
    Self_,
    Friends,
    RequestSent,
    RequestReceived,
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        for role in [
            Role::User,
            Role::Developer,
            Role::AppInspector,
            Role::Creator,
            Role::Official,
        ] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("moderator"), None);
    }

    #[test]
    fn test_notification_kind_parse_is_case_insensitive() {
        assert_eq!(
            NotificationKind::parse("Friend_Accept"),
            Some(NotificationKind::FriendAccept)
        );
        assert_eq!(NotificationKind::parse("poke"), None);
    }
}
