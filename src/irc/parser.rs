//! Twitch IRC ワイヤープロトコルのパーサー
//!
//! 1行のテキストを受け取り、[`Message`] / [`RewardRedemption`] /
//! 「関係ない行」のいずれかに振り分ける純粋関数群。
//! 不正な行はエラーにせず、単に `None` を返して読み飛ばす。

use chrono::Utc;
use std::collections::HashMap;

use super::types::{Message, RewardRedemption};

/// キープアライブ行（完全一致で判定）
pub const PING_LINE: &str = "PING :tmi.twitch.tv";

/// キープアライブへの応答行
pub const PONG_LINE: &str = "PONG :tmi.twitch.tv";

/// 報酬引き換え行の判定に使う部分文字列
pub const REWARD_MARKER: &str = "custom-reward-id=";

/// PRIVMSGトークン
const PRIVMSG_TOKEN: &str = " PRIVMSG ";

/// colorタグが空のときに使うデフォルトパレット（15色）
///
/// Twitchクライアントが未設定ユーザーに割り当てる色の再現。
/// ユーザー名のハッシュでインデックスが決まるため、
/// 同じユーザーには常に同じ色が付く。
const DEFAULT_COLORS: [&str; 15] = [
    "#FF0000", "#0000FF", "#00FF00", "#B22222", "#FF7F50",
    "#9ACD32", "#FF4500", "#2E8B57", "#DAA520", "#D2691E",
    "#5F9EA0", "#1E90FF", "#FF69B4", "#8A2BE2", "#00FF7F",
];

/// キープアライブ行かどうか
pub fn is_ping(line: &str) -> bool {
    line == PING_LINE
}

/// 行頭の`@`から始まるタグブロックをパースする
///
/// タグブロックは`@`の直後から最初の空白まで。`;`区切りの各エントリを
/// 最初の`=`で分割し、`=`を含まない不正なエントリは黙って捨てる。
fn parse_tags(line: &str) -> HashMap<String, String> {
    let mut tags = HashMap::new();

    if !line.starts_with('@') {
        return tags;
    }

    let Some(block_end) = line.find(' ') else {
        return tags;
    };

    for entry in line[1..block_end].split(';') {
        if let Some((key, value)) = entry.split_once('=') {
            tags.insert(key.to_string(), value.to_string());
        }
    }

    tags
}

/// IRCプレフィックス（`:nick!user@host`）からニックネームを抽出
fn username_from_prefix(line: &str) -> Option<&str> {
    let colon = line.find(':')?;
    let bang = line[colon..].find('!')?;
    Some(&line[colon + 1..colon + bang])
}

/// PRIVMSG行を[`Message`]にパースする
///
/// ` PRIVMSG `トークンを含まない行、チャンネル名と本文の区切り
/// （` :`）が見つからない行は関係ない行として`None`を返す。
pub fn parse_privmsg(line: &str) -> Option<Message> {
    let tags = parse_tags(line);

    let privmsg_start = line.find(PRIVMSG_TOKEN)?;
    let channel_start = privmsg_start + PRIVMSG_TOKEN.len();
    let channel_len = line[channel_start..].find(" :")?;
    let channel = &line[channel_start..channel_start + channel_len];

    let content_start = channel_start + channel_len + 2;
    let content = line.get(content_start..).unwrap_or_default();

    // display-nameタグ優先、なければIRCプレフィックスから取る
    let username = match tags.get("display-name") {
        Some(name) if !name.is_empty() => name.clone(),
        _ => username_from_prefix(line).unwrap_or_default().to_string(),
    };

    let user_color = resolve_user_color(&tags, &username);

    Some(Message {
        username,
        content: content.to_string(),
        channel: channel.to_string(),
        tags,
        raw: line.to_string(),
        timestamp: Utc::now(),
        user_color,
    })
}

/// 報酬引き換え行を[`RewardRedemption`]にパースする
///
/// タグブロックの区切りはPRIVMSGと同じ「`@`の後の最初の空白」。
/// custom-reward-idタグを持たない行は`None`。
/// ユーザー入力テキストはPRIVMSGトークン以降の最初の` :`の後ろ。
pub fn parse_reward(line: &str) -> Option<RewardRedemption> {
    let tags = parse_tags(line);
    let reward_id = tags.get("custom-reward-id")?.clone();

    let user_input = line.find(PRIVMSG_TOKEN).and_then(|privmsg_start| {
        let text_start = line[privmsg_start..].find(" :")? + privmsg_start + 2;
        line.get(text_start..)
    });

    Some(RewardRedemption {
        reward_id,
        username: tags.get("display-name").cloned().unwrap_or_default(),
        user_input: user_input.unwrap_or_default().to_string(),
        raw: line.to_string(),
        timestamp: Utc::now(),
    })
}

/// ユーザーの表示色を決定する
///
/// 1. colorタグが非空: 暗い色なら明るく補正して使う
/// 2. colorタグが空: ユーザー名のハッシュでパレットから選ぶ
/// 3. colorタグなし: 白
///
/// どの経路でも必ず有効な色文字列が返る（全域関数）。
pub fn resolve_user_color(tags: &HashMap<String, String>, username: &str) -> String {
    match tags.get("color") {
        Some(color) if !color.is_empty() => lighten_if_dark(color),
        Some(_) => default_color_for(username),
        None => "#FFFFFF".to_string(),
    }
}

/// 暗い色を明るい背景向けに補正する
///
/// 知覚輝度（0.299R + 0.587G + 0.114B）が128未満なら、
/// 各チャンネルを白に向かって40%ブレンドする。
/// 6桁の16進数でない入力はそのまま返す。
fn lighten_if_dark(hex_color: &str) -> String {
    let color = hex_color.trim_start_matches('#');
    if color.len() != 6 {
        return hex_color.to_string();
    }

    let r = i64::from_str_radix(&color[0..2], 16).unwrap_or(0);
    let g = i64::from_str_radix(&color[2..4], 16).unwrap_or(0);
    let b = i64::from_str_radix(&color[4..6], 16).unwrap_or(0);

    let luminance = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
    let (r, g, b) = if luminance < 128.0 {
        (
            r + ((255 - r) as f64 * 0.4) as i64,
            g + ((255 - g) as f64 * 0.4) as i64,
            b + ((255 - b) as f64 * 0.4) as i64,
        )
    } else {
        (r, g, b)
    };

    format!("#{:02X}{:02X}{:02X}", r, g, b)
}

/// ユーザー名からデフォルト色を決定する
///
/// 小文字化したユーザー名に対する`hash = (hash << 5) - hash + c`の
/// ローリングハッシュでパレットの添字を選ぶ。決定的なので
/// 同じユーザー名は常に同じ色になる。
fn default_color_for(username: &str) -> String {
    let mut hash: i64 = 0;
    for c in username.to_lowercase().chars() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(c as i64);
    }

    let index = (hash.unsigned_abs() % DEFAULT_COLORS.len() as u64) as usize;
    DEFAULT_COLORS[index].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_PRIVMSG: &str = "@badge-info=;badges=;color=#1E90FF;display-name=Alice;emotes=;first-msg=0;id=abc;mod=0;room-id=4242;subscriber=0;turbo=0;user-id=123;user-type= :alice!alice@alice.tmi.twitch.tv PRIVMSG #testchan :Hello world!";

    #[test]
    fn test_parse_privmsg_basic() {
        let msg = parse_privmsg(SAMPLE_PRIVMSG).expect("should parse");
        assert_eq!(msg.username, "Alice");
        assert_eq!(msg.channel, "#testchan");
        assert_eq!(msg.content, "Hello world!");
        assert_eq!(msg.room_id(), Some("4242"));
        assert_eq!(msg.raw, SAMPLE_PRIVMSG);
    }

    #[test]
    fn test_parse_privmsg_without_token() {
        // PRIVMSGトークンを含まない行は無関係な行として読み飛ばす
        assert!(parse_privmsg(":tmi.twitch.tv 001 justinfan123 :Welcome").is_none());
        assert!(parse_privmsg("").is_none());
    }

    #[test]
    fn test_parse_privmsg_minimal() {
        let msg = parse_privmsg(":bob!bob@bob.tmi.twitch.tv PRIVMSG #xyz :hello world")
            .expect("should parse");
        assert_eq!(msg.channel, "#xyz");
        assert_eq!(msg.content, "hello world");
        // タグなし→プレフィックスからユーザー名を取り、色は白
        assert_eq!(msg.username, "bob");
        assert_eq!(msg.user_color, "#FFFFFF");
    }

    #[test]
    fn test_parse_tags_value_with_equals_free_text() {
        let tags = parse_tags("@display-name=Alice;flags=;bad-entry;id=x=y rest");
        assert_eq!(tags.get("display-name").map(String::as_str), Some("Alice"));
        assert_eq!(tags.get("flags").map(String::as_str), Some(""));
        // 最初の`=`でのみ分割するため、値側の`=`は保持される
        assert_eq!(tags.get("id").map(String::as_str), Some("x=y"));
        // `=`を含まないエントリは捨てられる
        assert!(!tags.contains_key("bad-entry"));
    }

    #[test]
    fn test_is_ping() {
        assert!(is_ping("PING :tmi.twitch.tv"));
        assert!(!is_ping("PING :something.else"));
        assert!(!is_ping(" PING :tmi.twitch.tv"));
    }

    #[test]
    fn test_color_lighten_dark() {
        // 黒（輝度0）→ 各チャンネル 0 + 255*0.4 = 102 = 0x66
        assert_eq!(lighten_if_dark("#000000"), "#666666");
    }

    #[test]
    fn test_color_keep_light() {
        assert_eq!(lighten_if_dark("#FFFFFF"), "#FFFFFF");
        // 輝度128以上はそのまま
        assert_eq!(lighten_if_dark("#FF7F50"), "#FF7F50");
    }

    #[test]
    fn test_color_malformed_passthrough() {
        assert_eq!(lighten_if_dark("#FFF"), "#FFF");
        assert_eq!(lighten_if_dark("red"), "red");
    }

    #[test]
    fn test_default_color_deterministic() {
        // hash("a") = 97, 97 % 15 = 7 → パレット7番
        assert_eq!(default_color_for("a"), "#2E8B57");
        // 大文字小文字を区別しない
        assert_eq!(default_color_for("Alice"), default_color_for("alice"));
        // 何度呼んでも同じ
        assert_eq!(default_color_for("somebody"), default_color_for("somebody"));
    }

    #[test]
    fn test_resolve_color_total() {
        let mut tags = HashMap::new();

        // タグなし → 白
        assert_eq!(resolve_user_color(&tags, "alice"), "#FFFFFF");

        // 空タグ → パレット（決定的）
        tags.insert("color".to_string(), String::new());
        let first = resolve_user_color(&tags, "alice");
        assert_eq!(first, resolve_user_color(&tags, "alice"));
        assert!(DEFAULT_COLORS.contains(&first.as_str()));

        // 非空タグ → 補正して使用
        tags.insert("color".to_string(), "#000000".to_string());
        assert_eq!(resolve_user_color(&tags, "alice"), "#666666");
    }

    #[test]
    fn test_parse_reward() {
        let line = "@custom-reward-id=uuid-1234;display-name=Carol;room-id=99 :carol!carol@carol.tmi.twitch.tv PRIVMSG #testchan :do a flip";
        let reward = parse_reward(line).expect("should parse");
        assert_eq!(reward.reward_id, "uuid-1234");
        assert_eq!(reward.username, "Carol");
        assert_eq!(reward.user_input, "do a flip");
    }

    #[test]
    fn test_parse_reward_empty_input() {
        // ユーザー入力なしの報酬（PRIVMSG部分がない行）
        let line = "@custom-reward-id=uuid-5678;display-name=Dave other";
        let reward = parse_reward(line).expect("should parse");
        assert_eq!(reward.reward_id, "uuid-5678");
        assert_eq!(reward.user_input, "");
    }

    #[test]
    fn test_parse_reward_without_tag() {
        assert!(parse_reward("@display-name=Eve :eve!eve@e PRIVMSG #c :hi").is_none());
    }
}
