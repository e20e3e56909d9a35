pub mod event;
pub mod question;
pub mod session;
pub mod task;

pub use event::InboundEvent;
pub use question::{cleanup_text, sanitize_questions, Question, MAX_OPTIONS, MIN_OPTIONS};
pub use session::{ContentKind, ExpectedInput, ExportTemplate, ProcessingMode, Session};
pub use task::{PageImage, Task, TaskContentKind, TaskPayload};
