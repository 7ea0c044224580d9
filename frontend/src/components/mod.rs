pub mod chat;
pub mod prompt_input;
