//! Wakeprompt storage crate - SQLite alarm records, audio blobs on disk,
//! and the file-backed credential store.

pub mod audio;
pub mod credential;
pub mod db;
pub mod migrations;
pub mod repository;

pub use audio::{wav_duration_secs, FsAudioStore};
pub use credential::FileCredentialStore;
pub use db::Database;
pub use repository::SqliteAlarmRepository;
