pub mod db;
pub mod fonnte;
pub mod prompt_llm;

pub use db::DbAdapter;
pub use fonnte::FonnteMessenger;
pub use prompt_llm::OpenAiPromptAdapter;
