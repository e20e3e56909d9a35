pub mod converter;
pub mod csv_file;
pub mod directory;
pub mod extract_service;
pub mod quiz_poster;
pub mod renderer;

pub use converter::{is_image_file, CommandConverter, DocumentConverter};
pub use directory::{AuthorizedUser, Destination, Destinations, DirectoryService, MemoryDirectory, UserSettings};
pub use extract_service::{LlmExtractor, PageExtractor};
pub use quiz_poster::QuizPoster;
pub use renderer::{DocumentRenderer, TextRenderer};
