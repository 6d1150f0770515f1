use std::{
    collections::BTreeMap,
    env, fs,
    io::ErrorKind,
    path::PathBuf,
};

use log::{debug, warn};
use serde::{de::DeserializeOwned, Serialize};
use serde_yaml::Value;

use crate::error::{KimaiError, KimaiResult};
use crate::record::RecordId;

pub const KIMAI_URL: &str = "KimaiUrl";
pub const API_KEY: &str = "ApiKey";
pub const CURRENT_ENTRY: &str = "CurrentEntry";
pub const COMMENT: &str = "Comment";
pub const FAVORITES: &str = "Favorites";
pub const PROJECTS: &str = "Projects";
pub const TASKS: &str = "Tasks";

/// 設定ファイルの場所を上書きする環境変数。
pub const CONFIG_PATH_ENV: &str = "KIMAI_CONFIG_PATH";

/// 設定ファイルの既定の場所(`~/.kimai/config`)を返す。
pub fn config_path() -> Option<PathBuf> {
    match env::var_os(CONFIG_PATH_ENV) {
        Some(path) => Some(PathBuf::from(path)),
        None => dirs::home_dir().map(|home| home.join(".kimai").join("config")),
    }
}

/// プロセス間で引き継ぐローカル状態を保持するキーバリューストア。
///
/// 起動時に1度だけ`load`し、正常終了時に1度だけ`flush`する。
/// ファイルは毎回全体を書き直すため、同時に実行されたプロセス間では後勝ちになる。
#[derive(Debug, Default)]
pub struct Config {
    path: Option<PathBuf>,
    values: BTreeMap<String, Value>,
}

impl Config {
    /// ファイルに紐付かないストアを返す。
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// 既定の場所から設定を読み込む。
    pub fn load() -> KimaiResult<Self> {
        match config_path() {
            Some(path) => Self::load_from(path),
            None => {
                warn!("Home directory not found, config will not be persisted");
                Ok(Self::in_memory())
            }
        }
    }

    /// 指定したファイルから設定を読み込む。ファイルが無い場合は空のストアを返す。
    pub fn load_from(path: impl Into<PathBuf>) -> KimaiResult<Self> {
        let path = path.into();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No config file at {}", path.display());
                String::new()
            }
            Err(source) => return Err(KimaiError::ConfigIo { path, source }),
        };

        let values = if content.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_yaml::from_str::<Option<BTreeMap<String, Value>>>(&content)
                .map_err(|source| KimaiError::ConfigFormat {
                    path: path.clone(),
                    source,
                })?
                .unwrap_or_default()
        };

        Ok(Self {
            path: Some(path),
            values,
        })
    }

    /// 設定ファイル全体を書き直す。
    pub fn flush(&self) -> KimaiResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| KimaiError::ConfigIo {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let content =
            serde_yaml::to_string(&self.values).map_err(|source| KimaiError::ConfigFormat {
                path: path.clone(),
                source,
            })?;
        fs::write(path, content).map_err(|source| KimaiError::ConfigIo {
            path: path.clone(),
            source,
        })?;
        debug!("Config written to {}", path.display());

        Ok(())
    }

    /// 値を取得する。存在しないか型が合わない場合は`None`を返す。
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.values.get(key)?;

        match serde_yaml::from_value(value.clone()) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring config value '{}': {}", key, e);
                None
            }
        }
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> KimaiResult<()> {
        let value = serde_yaml::to_value(value).map_err(|source| KimaiError::ConfigValue {
            key: key.to_string(),
            source,
        })?;
        self.values.insert(key.to_string(), value);

        Ok(())
    }

    /// 値を削除する。存在しないキーは無視する。
    pub fn delete(&mut self, key: &str) {
        self.values.remove(key);
    }

    pub fn kimai_url(&self) -> Option<String> {
        self.get(KIMAI_URL)
    }

    pub fn api_key(&self) -> Option<String> {
        self.get(API_KEY)
    }

    /// 計測中とみなしているレコードのID。
    ///
    /// 古い設定ファイルでは文字列で保存されていることがある。
    pub fn current_entry(&self) -> Option<RecordId> {
        match self.values.get(CURRENT_ENTRY)? {
            Value::String(id) => id.trim().parse().ok().map(RecordId),
            value => value.as_u64().map(RecordId),
        }
    }

    pub fn set_current_entry(&mut self, id: RecordId) -> KimaiResult<()> {
        self.set(CURRENT_ENTRY, id)
    }

    pub fn clear_current_entry(&mut self) {
        self.delete(CURRENT_ENTRY);
    }

    /// 停止時に書き込む予定のコメント。空文字列は未設定として扱う。
    pub fn pending_comment(&self) -> Option<String> {
        self.get::<String>(COMMENT)
            .filter(|comment| !comment.is_empty())
    }

    pub fn set_pending_comment(&mut self, comment: &str) -> KimaiResult<()> {
        self.set(COMMENT, comment)
    }

    pub fn clear_pending_comment(&mut self) {
        self.delete(COMMENT);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;

    use super::{Config, API_KEY, CURRENT_ENTRY};
    use crate::error::KimaiError;
    use crate::record::RecordId;

    #[test]
    fn test_getting_an_existing_value() {
        let mut config = Config::in_memory();
        config.set("existing-key", "value").unwrap();

        assert_eq!(config.get::<String>("existing-key").as_deref(), Some("value"));
    }

    #[test]
    fn test_getting_a_missing_value() {
        let config = Config::in_memory();

        assert_eq!(config.get::<String>("missing-key"), None);
        assert_eq!(config.get_or("missing-key", "default".to_string()), "default");
    }

    #[test]
    fn test_default_ignored_if_value_exists() {
        let mut config = Config::in_memory();
        config.set("key", "value").unwrap();

        assert_eq!(config.get_or("key", "default".to_string()), "value");
    }

    #[test]
    fn test_overriding_and_deleting_a_value() {
        let mut config = Config::in_memory();
        config.set("key", "old").unwrap();
        config.set("key", "new").unwrap();
        assert_eq!(config.get::<String>("key").as_deref(), Some("new"));

        config.delete("key");
        config.delete("key");

        assert_eq!(config.get::<String>("key"), None);
    }

    #[test]
    fn test_wrong_type_is_treated_as_missing() {
        let mut config = Config::in_memory();
        config.set("key", "not a number").unwrap();

        assert_eq!(config.get::<u64>("key"), None);
    }

    /// 古い形式で文字列として保存されたIDも読めることを確認する。
    #[test]
    fn test_current_entry_accepts_string_id() {
        let mut config = Config::in_memory();
        config.set(CURRENT_ENTRY, "42").unwrap();
        assert_eq!(config.current_entry(), Some(RecordId(42)));

        config.set_current_entry(RecordId(7)).unwrap();
        assert_eq!(config.current_entry(), Some(RecordId(7)));
    }

    #[test]
    fn test_empty_pending_comment_is_none() {
        let mut config = Config::in_memory();
        config.set_pending_comment("").unwrap();

        assert_eq!(config.pending_comment(), None);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path().join("config")).unwrap();

        assert_eq!(config.api_key(), None);
    }

    #[test]
    fn test_flush_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config");

        let mut config = Config::load_from(&path).unwrap();
        config.set(API_KEY, "secret").unwrap();
        config.set_current_entry(RecordId(42)).unwrap();
        let mut tasks = BTreeMap::new();
        tasks.insert("Development".to_string(), 9u64);
        config.set("Tasks", &tasks).unwrap();
        config.flush().unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.api_key().as_deref(), Some("secret"));
        assert_eq!(loaded.current_entry(), Some(RecordId(42)));
        assert_eq!(loaded.get::<BTreeMap<String, u64>>("Tasks"), Some(tasks));
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        fs::write(&path, "ApiKey: [unterminated").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(KimaiError::ConfigFormat { .. })
        ));
    }
}
