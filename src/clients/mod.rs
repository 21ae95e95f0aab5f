//! Client modules for external API interactions

pub mod livechat_client;

pub use livechat_client::{ChatPlatform, LiveChatClient};
