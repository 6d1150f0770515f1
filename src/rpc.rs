use std::fmt;

use log::debug;
use reqwest::{header::CONTENT_TYPE, Client};
use serde::Deserialize;
use serde_json::Value;

use crate::config::Config;
use crate::error::{KimaiError, KimaiResult};

/// JSON APIのエンドポイント。
const ENDPOINT_PATH: &str = "/core/json.php";

/// Kimai APIが提供するメソッド。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestAction {
    Authenticate,
    GetProjects,
    GetTasks,
    StartRecord,
    StopRecord,
    GetTimesheet,
    GetTimesheetRecord,
    SetTimesheetRecord,
    RemoveTimesheetRecord,
}

impl RequestAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestAction::Authenticate => "authenticate",
            RequestAction::GetProjects => "getProjects",
            RequestAction::GetTasks => "getTasks",
            RequestAction::StartRecord => "startRecord",
            RequestAction::StopRecord => "stopRecord",
            RequestAction::GetTimesheet => "getTimesheet",
            RequestAction::GetTimesheetRecord => "getTimesheetRecord",
            RequestAction::SetTimesheetRecord => "setTimesheetRecord",
            RequestAction::RemoveTimesheetRecord => "removeTimesheetRecord",
        }
    }
}

impl fmt::Display for RequestAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// リクエストの`params`に並ぶ1要素。
///
/// サーバー側のパーサーに合わせて、真偽値はリテラル、オブジェクトは埋め込みJSON、
/// それ以外は文字列として送る。
#[derive(Clone, Debug, PartialEq)]
pub enum Param {
    Bool(bool),
    Object(Value),
    Scalar(String),
}

impl Param {
    pub fn scalar(value: impl ToString) -> Self {
        Param::Scalar(value.to_string())
    }

    fn build(&self) -> String {
        match self {
            Param::Bool(value) => value.to_string(),
            Param::Object(value) => value.to_string(),
            Param::Scalar(value) => Value::String(value.clone()).to_string(),
        }
    }
}

/// リクエストボディの文字列を組み立てる。
///
/// `api_key`がある場合は先頭のパラメータとして付与する。
pub fn build_payload(action: RequestAction, api_key: Option<&str>, params: &[Param]) -> String {
    let params: Vec<String> = api_key
        .map(Param::scalar)
        .iter()
        .chain(params.iter())
        .map(Param::build)
        .collect();

    format!(
        r#"{{"jsonrpc":"2.0", "method": "{}", "params": [{}], "id": 1}}"#,
        action,
        params.join(",")
    )
}

#[derive(Debug, Deserialize)]
struct Envelope {
    result: RawOutcome,
}

#[derive(Debug, Deserialize)]
struct RawOutcome {
    success: bool,
    #[serde(default)]
    items: Option<Vec<Value>>,
    #[serde(default)]
    error: Option<RawError>,
}

#[derive(Debug, Deserialize)]
struct RawError {
    msg: Option<String>,
}

/// レスポンスをデコードした結果。
#[derive(Clone, Debug, PartialEq)]
pub enum RpcOutcome {
    Success(Vec<Value>),
    Failure(String),
}

impl RpcOutcome {
    /// レスポンスボディを`RpcOutcome`にデコードする。
    pub fn decode(body: &str) -> KimaiResult<Self> {
        let envelope: Envelope = serde_json::from_str(body)
            .map_err(|e| KimaiError::Decode(format!("{} (body: {})", e, body)))?;
        let result = envelope.result;

        if result.success {
            return Ok(RpcOutcome::Success(result.items.unwrap_or_default()));
        }

        let message = result
            .error
            .and_then(|error| error.msg)
            .unwrap_or_else(|| "unknown error".to_string());

        Ok(RpcOutcome::Failure(message))
    }

    pub fn into_result(self) -> KimaiResult<Vec<Value>> {
        match self {
            RpcOutcome::Success(items) => Ok(items),
            RpcOutcome::Failure(message) => Err(KimaiError::Application(message)),
        }
    }
}

/// Kimai APIと通信するためのクライアント。
///
/// # Examples
///
/// ```
/// let client = KimaiClient::new("https://kimai.example.com", Some(api_key));
/// let items = client.send(RequestAction::GetProjects, &[], true).await?;
/// ```
pub struct KimaiClient {
    client: Client,
    api_url: String,
    api_key: Option<String>,
}

impl KimaiClient {
    /// 新しい`KimaiClient`を返す。
    pub fn new(api_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// 設定ファイルのURLとAPIキーから`KimaiClient`を作る。
    ///
    /// URLが設定されていない場合はエラーを返す。
    pub fn from_config(config: &Config) -> KimaiResult<Self> {
        let api_url = config
            .kimai_url()
            .ok_or(KimaiError::NotConfigured(crate::config::KIMAI_URL))?;

        Ok(Self::new(api_url, config.api_key()))
    }

    /// 1回だけリクエストを送り、結果をそのまま返す。
    ///
    /// # Arguments
    ///
    /// * `action` - 呼び出すメソッド
    /// * `params` - APIキー以降のパラメータ
    /// * `requires_auth` - APIキーを先頭に付与するかどうか
    pub async fn send(
        &self,
        action: RequestAction,
        params: &[Param],
        requires_auth: bool,
    ) -> KimaiResult<Vec<Value>> {
        let api_key = if requires_auth {
            let key = self
                .api_key
                .as_deref()
                .ok_or(KimaiError::NotConfigured(crate::config::API_KEY))?;
            Some(key)
        } else {
            None
        };

        let payload = build_payload(action, api_key, params);
        debug!("Sending {} to {}", action, self.api_url);

        let body = self
            .client
            .post(format!("{}{}", self.api_url, ENDPOINT_PATH))
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        RpcOutcome::decode(&body)?.into_result()
    }

    /// ユーザー名とパスワードで認証し、APIキーを返す。
    pub async fn authenticate(&self, username: &str, password: &str) -> KimaiResult<String> {
        let items = self
            .send(
                RequestAction::Authenticate,
                &[Param::scalar(username), Param::scalar(password)],
                false,
            )
            .await?;

        items
            .first()
            .and_then(|item| item.get("apiKey"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| KimaiError::Decode("authentication response has no apiKey".to_string()))
    }
}
