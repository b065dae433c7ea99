// =============================================================================
// Twitch IRC モジュール
// =============================================================================
// 匿名（読み取り専用）のTwitchチャット接続を提供する
//
// 機能:
// - ワイヤープロトコル行のパース（タグ / PRIVMSG / 報酬 / PING）
// - チャンネルごとの接続と読み取りループ
// - 固定長リングバッファによるメッセージ履歴
//
// 認証付きの書き込みアクセスと自動再接続はスコープ外。
// =============================================================================

mod connection;
mod errors;
pub mod parser;
mod ring_buffer;
mod types;

pub use connection::{Connection, Receivers};
pub use errors::IrcError;
pub use ring_buffer::RingBuffer;
pub use types::{Message, RewardRedemption};
