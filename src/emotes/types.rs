use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// エモートの提供元
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmoteProvider {
    /// Twitchネイティブ（emotesタグで位置が宣言される）
    Twitch,
    #[serde(rename = "7tv")]
    SevenTv,
    Bttv,
    Ffz,
}

impl EmoteProvider {
    /// キャッシュディレクトリ名
    pub fn dir_name(&self) -> &'static str {
        match self {
            EmoteProvider::Twitch => "emotes",
            EmoteProvider::SevenTv => "emotes_7tv",
            EmoteProvider::Bttv => "emotes_bttv",
            EmoteProvider::Ffz => "emotes_ffz",
        }
    }
}

/// カタログのスコープ（グローバル or チャンネル別）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmoteScope {
    Global,
    /// チャンネル名（`#`なし）
    Channel(String),
}

impl EmoteScope {
    /// キャッシュディレクトリのサブパス名
    pub fn dir_name(&self) -> &str {
        match self {
            EmoteScope::Global => "global",
            EmoteScope::Channel(name) => name,
        }
    }
}

/// メッセージ内でのエモート出現位置（ルーン単位、endを含む）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotePosition {
    pub start: usize,
    pub end: usize,
}

/// エモート1件の情報
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmoteInfo {
    pub id: String,
    /// 表示名（メッセージ中のトークンと一致する）
    pub name: String,
    /// 取得元URL（最大ティアの画像URL、ネイティブはCDNテンプレート）
    pub url: String,
    /// ダウンロード済みのローカルファイル（未取得ならNone）
    pub file_path: Option<PathBuf>,
    /// 1メッセージ内での出現位置リスト
    pub positions: Vec<EmotePosition>,
    pub provider: EmoteProvider,
    pub scope: EmoteScope,
}

// ---------------------------------------------------------------------------
// プロバイダーAPIレスポンス型
// ---------------------------------------------------------------------------

/// 7TV ユーザーエンドポイント（チャンネルエモート）
#[derive(Debug, Deserialize)]
pub struct SevenTvUserResponse {
    pub emote_set: SevenTvEmoteSet,
}

/// 7TV グローバルエモートセット
#[derive(Debug, Deserialize)]
pub struct SevenTvEmoteSet {
    #[serde(default)]
    pub emotes: Vec<SevenTvEmote>,
}

#[derive(Debug, Deserialize)]
pub struct SevenTvEmote {
    pub id: String,
    pub name: String,
    pub data: SevenTvEmoteData,
}

#[derive(Debug, Deserialize)]
pub struct SevenTvEmoteData {
    pub host: SevenTvHost,
}

#[derive(Debug, Deserialize)]
pub struct SevenTvHost {
    /// プロトコル相対URL（`//cdn.7tv.app/...`）
    pub url: String,
    #[serde(default)]
    pub files: Vec<SevenTvFile>,
}

#[derive(Debug, Deserialize)]
pub struct SevenTvFile {
    pub name: String,
    #[serde(default)]
    pub format: String,
}

/// BTTV エモート（グローバル・チャンネル共通の形）
#[derive(Debug, Deserialize)]
pub struct BttvEmote {
    pub id: String,
    /// 表示名はBTTVでは`code`
    pub code: String,
}

/// BTTV チャンネルエンドポイント
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BttvChannelResponse {
    #[serde(default)]
    pub channel_emotes: Vec<BttvEmote>,
    #[serde(default)]
    pub shared_emotes: Vec<BttvEmote>,
}

/// FFZ セットエンドポイント（グローバル・チャンネル共通の形）
#[derive(Debug, Deserialize)]
pub struct FfzSetsResponse {
    #[serde(default)]
    pub sets: HashMap<String, FfzSet>,
}

#[derive(Debug, Deserialize)]
pub struct FfzSet {
    #[serde(default)]
    pub emoticons: Vec<FfzEmoticon>,
}

#[derive(Debug, Deserialize)]
pub struct FfzEmoticon {
    pub id: i64,
    pub name: String,
    /// スケールティア（"1"/"2"/"4"）→ URL
    #[serde(default)]
    pub urls: HashMap<String, String>,
}
