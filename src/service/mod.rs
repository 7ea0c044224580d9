pub mod chat_service;
pub mod ui_stream;
