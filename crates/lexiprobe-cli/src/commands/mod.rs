pub mod init;
pub mod show_config;
pub mod simulate;
pub mod transcribe;
pub mod validate;
