use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// パース済みのチャットメッセージ
///
/// `user_color` はパース完了時点で必ず有効な `#RRGGBB` 形式になる
/// （colorタグ→ユーザー名由来のパレット→白、の順で解決される）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// 表示名（display-nameタグ優先、なければIRCプレフィックスから抽出）
    pub username: String,
    /// メッセージ本文
    pub content: String,
    /// チャンネル名（`#`付き）
    pub channel: String,
    /// IRCv3タグ（key→value）
    pub tags: HashMap<String, String>,
    /// 受信した生の行
    pub raw: String,
    /// 受信時刻
    pub timestamp: DateTime<Utc>,
    /// 解決済みの表示色（`#RRGGBB`）
    pub user_color: String,
}

impl Message {
    /// room-idタグ（TwitchのチャンネルID）を取得
    ///
    /// チャンネルエモートAPIのキーとして使用する。
    pub fn room_id(&self) -> Option<&str> {
        self.tags.get("room-id").map(String::as_str)
    }
}

/// チャンネルポイント報酬の引き換え
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardRedemption {
    /// 報酬ID（custom-reward-idタグ）
    pub reward_id: String,
    /// 引き換えたユーザーの表示名
    pub username: String,
    /// ユーザーが添えたテキスト（空の場合あり）
    pub user_input: String,
    /// 受信した生の行
    pub raw: String,
    /// 受信時刻
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_accessor() {
        let mut tags = HashMap::new();
        tags.insert("room-id".to_string(), "12345".to_string());

        let msg = Message {
            username: "alice".to_string(),
            content: "hello".to_string(),
            channel: "#test".to_string(),
            tags,
            raw: String::new(),
            timestamp: Utc::now(),
            user_color: "#FFFFFF".to_string(),
        };

        assert_eq!(msg.room_id(), Some("12345"));
    }

    #[test]
    fn test_room_id_missing() {
        let msg = Message {
            username: "alice".to_string(),
            content: "hello".to_string(),
            channel: "#test".to_string(),
            tags: HashMap::new(),
            raw: String::new(),
            timestamp: Utc::now(),
            user_color: "#FFFFFF".to_string(),
        };

        assert_eq!(msg.room_id(), None);
    }
}
