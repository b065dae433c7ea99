use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::config;

/// TwitchのGQLエンドポイント
const TWITCH_GQL_URL: &str = "https://gql.twitch.tv/gql";

/// Twitch Webクライアントの公開Client-ID
const TWITCH_CLIENT_ID: &str = "kimne78kx3ncx6brgo4mv6wki5h1ko";

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GQL returned status {0}")]
    Api(u16),
}

/// 配信状態のスナップショット
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamStatus {
    pub is_live: bool,
    pub viewer_count: u64,
}

/// チャンネルの配信状態と視聴者数を問い合わせるクライアント
///
/// 認証不要の公開GQLクエリを使う。`stream`がnullなら配信していない。
pub struct StatusClient {
    client: reqwest::Client,
    base_url: String,
}

impl StatusClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(config::http_timeout())
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: TWITCH_GQL_URL.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(base_url: &str) -> Self {
        let mut client = Self::new();
        client.base_url = base_url.to_string();
        client
    }

    /// チャンネルの現在の配信状態を取得する
    ///
    /// チャンネル名は`#`なしのログイン名。存在しないチャンネルは
    /// 「配信していない」として扱う。
    pub async fn fetch(&self, channel: &str) -> Result<StreamStatus, StatusError> {
        let query = format!(
            "query {{ user(login: \"{}\") {{ stream {{ id viewersCount }} }} }}",
            channel
        );

        let response = self
            .client
            .post(&self.base_url)
            .header("Client-ID", TWITCH_CLIENT_ID)
            .json(&json!({ "query": query }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StatusError::Api(response.status().as_u16()));
        }

        let body: GqlResponse = response.json().await?;
        let stream = body.data.and_then(|d| d.user).and_then(|u| u.stream);

        Ok(StreamStatus {
            is_live: stream.is_some(),
            viewer_count: stream.and_then(|s| s.viewers_count).unwrap_or(0),
        })
    }

    pub async fn is_live(&self, channel: &str) -> Result<bool, StatusError> {
        Ok(self.fetch(channel).await?.is_live)
    }

    pub async fn viewer_count(&self, channel: &str) -> Result<u64, StatusError> {
        Ok(self.fetch(channel).await?.viewer_count)
    }
}

impl Default for StatusClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct GqlResponse {
    data: Option<GqlData>,
}

#[derive(Debug, Deserialize)]
struct GqlData {
    user: Option<GqlUser>,
}

#[derive(Debug, Deserialize)]
struct GqlUser {
    stream: Option<GqlStream>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlStream {
    #[allow(dead_code)]
    id: Option<String>,
    viewers_count: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_live_channel() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data": {"user": {"stream": {"id": "123", "viewersCount": 4321}}}}"#,
            )
            .create_async()
            .await;

        let client = StatusClient::with_base_url(&server.url());
        let status = client.fetch("livech").await.unwrap();
        assert!(status.is_live);
        assert_eq!(status.viewer_count, 4321);
    }

    #[tokio::test]
    async fn test_offline_channel() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"data": {"user": {"stream": null}}}"#)
            .create_async()
            .await;

        let client = StatusClient::with_base_url(&server.url());
        let status = client.fetch("sleepych").await.unwrap();
        assert!(!status.is_live);
        assert_eq!(status.viewer_count, 0);
    }

    #[tokio::test]
    async fn test_unknown_user_is_offline() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"data": {"user": null}}"#)
            .create_async()
            .await;

        let client = StatusClient::with_base_url(&server.url());
        assert!(!client.is_live("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn test_server_error_surfaces() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/").with_status(503).create_async().await;

        let client = StatusClient::with_base_url(&server.url());
        assert!(matches!(
            client.fetch("anych").await,
            Err(StatusError::Api(503))
        ));
    }
}
