pub mod bot_api;
pub mod extraction;
pub mod transport;

pub use bot_api::BotApiClient;
pub use extraction::ExtractionClient;
pub use transport::{InlineButton, Keyboard, QuizPost, SentMessage, Transport};
