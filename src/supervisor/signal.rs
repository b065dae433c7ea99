use serde::Serialize;

use crate::emotes::EmoteInfo;
use crate::irc::{Message, RewardRedemption};

/// エモート解決とハイライト判定を済ませた配信用メッセージ
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedMessage {
    #[serde(flatten)]
    pub message: Message,
    pub emotes: Vec<EmoteInfo>,
    /// フィルタキーワードに一致したか
    pub highlighted: bool,
}

/// スーパーバイザーが埋め込み側へ流すシグナル
///
/// すべてのバリアントがタグ付きでシリアライズされるので、
/// 受け手は`type`フィールドで分岐できる。
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Signal {
    /// チャンネル接続成功
    ChannelConnected { channel: String },
    /// チャンネル接続失敗
    ChannelConnectFailed { channel: String, error: String },
    /// フォーカス中チャンネルの新着メッセージ
    NewMessage { message: AnnotatedMessage },
    /// 非フォーカスチャンネルでキーワードに一致したメッセージ
    ChannelHighlight { channel: String, message: AnnotatedMessage },
    /// フォーカス切り替え時の履歴リプレイ
    ChannelHistory {
        channel: String,
        messages: Vec<AnnotatedMessage>,
    },
    /// チャンネルポイント報酬の引き換え
    RewardRedeemed {
        channel: String,
        reward: RewardRedemption,
    },
    /// 読み取りループの致命的エラー
    ConnectionError { channel: String, error: String },
    /// 配信状態の変化（初回観測を含む）
    LiveStatusChanged { channel: String, is_live: bool },
    /// フォーカス中チャンネルの視聴者数
    ViewerCount { channel: String, count: u64 },
    /// フォーカスが移った
    ChannelSwitched { channel: String },
    /// フォーカス中チャンネルが切断されフォーカスが失われた
    ActiveChannelLost { channel: String },
    /// チャンネルが切断された
    ChannelDisconnected { channel: String },
    /// 許可リストにチャンネルが追加された
    ChannelAdded { channel: String },
    /// 許可リストからチャンネルが削除された
    ChannelRemoved { channel: String },
    /// 全チャンネルの切断が完了した
    AllChannelsDisconnected { channels: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_serializes_with_type_tag() {
        let signal = Signal::ChannelConnected {
            channel: "#testch".to_string(),
        };
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["type"], "channelConnected");
        assert_eq!(json["channel"], "#testch");
    }

    #[test]
    fn test_live_status_field_names() {
        let signal = Signal::LiveStatusChanged {
            channel: "testch".to_string(),
            is_live: true,
        };
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["type"], "liveStatusChanged");
        assert_eq!(json["isLive"], true);
    }
}
