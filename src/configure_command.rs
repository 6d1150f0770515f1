use std::io::Write;

use anyhow::{Context, Result};
use log::info;

use crate::catalog_command::CatalogCommand;
use crate::config::{Config, API_KEY, KIMAI_URL};
use crate::repository::KimaiRepository;
use crate::rpc::KimaiClient;

/// `configure`サブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct ConfigureArgs {
    #[clap(short = 'k', long = "kimai-url", help = "Base URL of the Kimai server")]
    pub kimai_url: String,

    #[clap(short = 'u', long = "username")]
    pub username: String,

    #[clap(short = 'p', long = "password")]
    pub password: String,
}

/// `configure`サブコマンドの処理を行う。
///
/// 認証してAPIキーを保存し、プロジェクトとタスクの一覧をダウンロードする。
///
/// # Arguments
///
/// * `args` - `configure`サブコマンドの引数
/// * `config` - 保存先の設定
/// * `out` - 結果の出力先
pub async fn configure_command<W: Write>(
    args: ConfigureArgs,
    config: &mut Config,
    out: &mut W,
) -> Result<()> {
    config.set(KIMAI_URL, &args.kimai_url)?;

    let api_key = KimaiClient::new(&args.kimai_url, None)
        .authenticate(&args.username, &args.password)
        .await
        .context("Authentication failed.")?;
    config.set(API_KEY, &api_key)?;
    info!("Authenticated as {}", args.username);

    let repository = KimaiRepository::new(KimaiClient::new(&args.kimai_url, Some(api_key)));
    let mut catalog = CatalogCommand::new(&repository, config, out);
    catalog.download_projects().await?;
    catalog.download_tasks().await?;

    writeln!(out, "Configuration complete")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;

    use super::{configure_command, ConfigureArgs};
    use crate::config::Config;

    fn args(url: String) -> ConfigureArgs {
        ConfigureArgs {
            kimai_url: url,
            username: "alice".to_string(),
            password: "pw".to_string(),
        }
    }

    #[tokio::test]
    async fn test_configure_saves_api_key_and_catalogs() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/core/json.php")
            .match_body(Matcher::Regex(r#""method": "authenticate""#.to_string()))
            .with_body(r#"{"result": {"success": true, "items": [{"apiKey": "abc"}]}}"#)
            .create_async()
            .await;
        let projects = server
            .mock("POST", "/core/json.php")
            .match_body(Matcher::Regex(
                r#""method": "getProjects", "params": \["abc"\]"#.to_string(),
            ))
            .with_body(r#"{"result": {"success": true, "items": []}}"#)
            .expect(1)
            .create_async()
            .await;
        server
            .mock("POST", "/core/json.php")
            .match_body(Matcher::Regex(r#""method": "getTasks""#.to_string()))
            .with_body(r#"{"result": {"success": true, "items": []}}"#)
            .create_async()
            .await;
        let mut config = Config::in_memory();
        let mut out = Vec::new();

        configure_command(args(server.url()), &mut config, &mut out)
            .await
            .unwrap();

        assert_eq!(config.api_key().as_deref(), Some("abc"));
        assert_eq!(config.kimai_url(), Some(server.url()));
        assert!(String::from_utf8(out)
            .unwrap()
            .ends_with("Configuration complete\n"));
        projects.assert_async().await;
    }

    #[tokio::test]
    async fn test_configure_with_wrong_password() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/core/json.php")
            .with_body(r#"{"result": {"success": false, "error": {"msg": "Unknown user or wrong password"}}}"#)
            .create_async()
            .await;
        let mut config = Config::in_memory();
        let mut out = Vec::new();

        let result = configure_command(args(server.url()), &mut config, &mut out).await;

        assert!(result.is_err());
        assert_eq!(config.api_key(), None);
    }
}
