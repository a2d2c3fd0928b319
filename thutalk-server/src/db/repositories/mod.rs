mod block_repository;
mod broadcast_repository;
mod comment_repository;
mod friend_repository;
mod message_repository;
mod notification_repository;
mod post_repository;
mod profile_repository;
mod story_repository;
mod user_repository;

pub use block_repository::BlockRepository;
pub use broadcast_repository::BroadcastRepository;
pub use comment_repository::CommentRepository;
pub use friend_repository::FriendRepository;
pub use message_repository::MessageRepository;
pub use notification_repository::NotificationRepository;
pub use post_repository::PostRepository;
pub use profile_repository::ProfileRepository;
pub use story_repository::StoryRepository;
pub use user_repository::UserRepository;
