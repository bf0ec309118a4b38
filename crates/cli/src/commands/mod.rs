pub mod chat;
pub mod config_cmd;
pub mod credential;
pub mod health;
pub mod knowledge;
pub mod status;
