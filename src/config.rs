// =============================================================================
// 共通設定モジュール
// =============================================================================
// コア全体で使用する設定値を定義
//
// 設定ファイルの読み書きは埋め込み側（シェル）の責務。
// コアはここで組み立てた Settings を注入されるだけで、
// ホットパス内からグローバル設定を読むことはない。
// =============================================================================

use std::path::PathBuf;
use std::time::Duration;

/// メッセージ履歴のデフォルト保持件数（チャンネルごと）
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// 全チャンネル一斉接続時の起動間隔
///
/// ハンドシェイクが同時に殺到しないよう、接続タスクの起動を
/// この間隔だけずらす。
pub const DEFAULT_CONNECT_STAGGER: Duration = Duration::from_millis(200);

/// HTTPリクエストのデフォルトタイムアウト（秒）
///
/// エモートプロバイダーAPI、Twitch GQL など外部APIへの
/// リクエストで使用。
pub const HTTP_TIMEOUT_SECS: u64 = 10;

/// HTTPリクエストのデフォルトタイムアウト（Duration）
pub fn http_timeout() -> Duration {
    Duration::from_secs(HTTP_TIMEOUT_SECS)
}

/// TwitchチャットIRCサーバーのデフォルトホスト
pub const DEFAULT_IRC_HOST: &str = "irc.chat.twitch.tv";

/// TwitchチャットIRCサーバーのデフォルトポート（平文）
pub const DEFAULT_IRC_PORT: u16 = 6667;

/// コアに注入する設定一式
///
/// - `channels`: 接続対象のチャンネル許可リスト（`#`は付けても付けなくてもよい）
/// - `filter_keywords`: ハイライト判定用キーワード（大文字小文字を区別しない部分一致）
/// - `buffer_size`: チャンネルごとのメッセージ履歴件数
/// - `connect_stagger`: 一斉接続時の起動間隔
/// - `emote_cache_dir`: ダウンロード済みエモートの保存先
/// - `irc_host` / `irc_port`: 接続先IRCサーバー（通常はTwitchの既定値のまま）
#[derive(Debug, Clone)]
pub struct Settings {
    pub channels: Vec<String>,
    pub filter_keywords: Vec<String>,
    pub buffer_size: usize,
    pub connect_stagger: Duration,
    pub emote_cache_dir: PathBuf,
    pub irc_host: String,
    pub irc_port: u16,
}

impl Settings {
    /// チャンネルリストだけ指定して残りをデフォルトにする
    pub fn with_channels<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            channels: channels.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        // キャッシュディレクトリが取れない環境ではカレント直下にフォールバック
        let emote_cache_dir = dirs::cache_dir()
            .map(|d| d.join("twitch-multichat").join("emotes"))
            .unwrap_or_else(|| PathBuf::from("emotes"));

        Self {
            channels: Vec::new(),
            filter_keywords: Vec::new(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            connect_stagger: DEFAULT_CONNECT_STAGGER,
            emote_cache_dir,
            irc_host: DEFAULT_IRC_HOST.to_string(),
            irc_port: DEFAULT_IRC_PORT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!(settings.channels.is_empty());
        assert_eq!(settings.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(settings.connect_stagger, Duration::from_millis(200));
        assert_eq!(settings.irc_host, DEFAULT_IRC_HOST);
        assert_eq!(settings.irc_port, DEFAULT_IRC_PORT);
    }

    #[test]
    fn test_with_channels() {
        let settings = Settings::with_channels(["alice", "bob"]);
        assert_eq!(settings.channels, vec!["alice", "bob"]);
        assert_eq!(settings.buffer_size, DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn test_http_timeout_duration() {
        assert_eq!(http_timeout(), Duration::from_secs(10));
    }
}
