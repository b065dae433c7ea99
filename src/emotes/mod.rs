// =============================================================================
// エモートモジュール
// =============================================================================
// Twitchネイティブ + サードパーティ（7TV / BTTV / FFZ）のエモート解決
//
// 機能:
// - プロバイダーAPIからのカタログ取得（グローバル + チャンネル別）
// - メッセージ本文のエモート解決（ネイティブタグ + 単語走査）
// - 画像のダウンロードとローカルキャッシュ（GIFは静止画化、高さ制限）
//
// 優先順位: チャンネル7TV → グローバル7TV → チャンネルBTTV →
// グローバルBTTV → チャンネルFFZ → グローバルFFZ
// =============================================================================

mod errors;
mod fetcher;
mod image;
mod parser;
mod registry;
mod types;

pub use errors::EmoteError;
pub use fetcher::EmoteFetcher;
pub use image::MAX_EMOTE_HEIGHT;
pub use parser::{native_emote_url, parse_emotes};
pub use registry::EmoteRegistry;
pub use types::{EmoteInfo, EmotePosition, EmoteProvider, EmoteScope};
