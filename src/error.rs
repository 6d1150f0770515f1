use std::path::PathBuf;

use crate::record::RecordId;

/// Kimaiとのやり取り、およびローカル状態の操作で発生するエラー。
///
/// コマンド層では`anyhow::Error`に変換して扱う。
#[derive(Debug, thiserror::Error)]
pub enum KimaiError {
    /// 通信自体に失敗した。リトライはしない。
    #[error("Failed to reach the Kimai server: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode the Kimai response: {0}")]
    Decode(String),

    /// サーバーが`success: false`を返した。メッセージはそのまま伝える。
    #[error("{0}")]
    Application(String),

    #[error("No record exists for id {0}")]
    NotFound(RecordId),

    #[error("You are not authorized to edit record {0}")]
    Unauthorized(RecordId),

    #[error("'{0}' is not configured. Run 'kimai configure' first")]
    NotConfigured(&'static str),

    #[error("Could not parse date: '{0}'")]
    InvalidDate(String),

    #[error("No record currently running")]
    NoRunningRecord,

    #[error("No favorite for name '{0}' exists")]
    FavoriteNotFound(String),

    #[error("Favorite '{0}' already exists")]
    FavoriteExists(String),

    #[error("Failed to access config file {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config file {path} is malformed: {source}")]
    ConfigFormat {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to store config value '{key}': {source}")]
    ConfigValue {
        key: String,
        #[source]
        source: serde_yaml::Error,
    },
}

pub type KimaiResult<T> = Result<T, KimaiError>;
