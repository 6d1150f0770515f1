use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{Config, FAVORITES};
use crate::error::{KimaiError, KimaiResult};

/// プロジェクトとタスクの組に付けた名前。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Favorite {
    pub name: String,
    pub project_id: u64,
    pub task_id: u64,
}

/// 設定ファイル上の表現。
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StoredFavorite {
    project: u64,
    task: u64,
}

fn load(config: &Config) -> BTreeMap<String, StoredFavorite> {
    config.get_or(FAVORITES, BTreeMap::new())
}

/// 保存済みのお気に入りを名前順に返す。
pub fn list(config: &Config) -> Vec<Favorite> {
    load(config)
        .into_iter()
        .map(|(name, stored)| Favorite {
            name,
            project_id: stored.project,
            task_id: stored.task,
        })
        .collect()
}

/// 名前からお気に入りを取得する。
pub fn get(config: &Config, name: &str) -> KimaiResult<Favorite> {
    let stored = load(config)
        .remove(name)
        .ok_or_else(|| KimaiError::FavoriteNotFound(name.to_string()))?;

    Ok(Favorite {
        name: name.to_string(),
        project_id: stored.project,
        task_id: stored.task,
    })
}

/// 名前からプロジェクトIDとタスクIDの組を返す。
pub fn resolve(config: &Config, name: &str) -> KimaiResult<(u64, u64)> {
    let favorite = get(config, name)?;

    Ok((favorite.project_id, favorite.task_id))
}

/// お気に入りを追加する。同名のものがある場合はエラーにする。
pub fn add(config: &mut Config, name: &str, project_id: u64, task_id: u64) -> KimaiResult<()> {
    let mut favorites = load(config);
    if favorites.contains_key(name) {
        return Err(KimaiError::FavoriteExists(name.to_string()));
    }

    favorites.insert(
        name.to_string(),
        StoredFavorite {
            project: project_id,
            task: task_id,
        },
    );
    config.set(FAVORITES, favorites)
}

pub fn delete(config: &mut Config, name: &str) -> KimaiResult<()> {
    let mut favorites = load(config);
    if favorites.remove(name).is_none() {
        return Err(KimaiError::FavoriteNotFound(name.to_string()));
    }

    config.set(FAVORITES, favorites)
}

#[cfg(test)]
mod tests {
    use super::{add, delete, get, list, resolve, Favorite};
    use crate::config::Config;
    use crate::error::KimaiError;

    #[test]
    fn test_add_and_get() {
        let mut config = Config::in_memory();
        add(&mut config, "dev", 7, 9).unwrap();

        assert_eq!(resolve(&config, "dev").unwrap(), (7, 9));

        assert_eq!(
            get(&config, "dev").unwrap(),
            Favorite {
                name: "dev".to_string(),
                project_id: 7,
                task_id: 9,
            }
        );
    }

    #[test]
    fn test_add_duplicate() {
        let mut config = Config::in_memory();
        add(&mut config, "dev", 7, 9).unwrap();

        assert!(matches!(
            add(&mut config, "dev", 1, 2),
            Err(KimaiError::FavoriteExists(name)) if name == "dev"
        ));
        assert_eq!(get(&config, "dev").unwrap().project_id, 7);
    }

    #[test]
    fn test_get_missing() {
        let config = Config::in_memory();

        assert!(matches!(
            get(&config, "nope"),
            Err(KimaiError::FavoriteNotFound(_))
        ));
    }

    #[test]
    fn test_list_and_delete() {
        let mut config = Config::in_memory();
        add(&mut config, "meetings", 1, 2).unwrap();
        add(&mut config, "dev", 7, 9).unwrap();

        let names: Vec<String> = list(&config).into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["dev", "meetings"]);

        delete(&mut config, "dev").unwrap();
        assert_eq!(list(&config).len(), 1);
        assert!(matches!(
            delete(&mut config, "dev"),
            Err(KimaiError::FavoriteNotFound(_))
        ));
    }
}
