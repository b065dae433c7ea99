use crate::irc::Message;

use super::registry::EmoteRegistry;
use super::types::{EmoteInfo, EmotePosition, EmoteProvider, EmoteScope};

/// Twitchネイティブエモート画像のCDN URLテンプレート
pub const NATIVE_EMOTE_CDN: &str = "https://static-cdn.jtvnw.net/emoticons/v2";

/// ネイティブエモートIDからCDN URLを組み立てる
pub fn native_emote_url(id: &str) -> String {
    format!("{}/{}/default/dark/1.0", NATIVE_EMOTE_CDN, id)
}

/// メッセージ本文からエモートの出現を解決する
///
/// 2段階で処理する:
/// 1. `emotes`タグに宣言されたネイティブエモートの位置を取り込む
///    （位置はルーン単位・end含む。範囲外の宣言は破棄）
/// 2. ネイティブに覆われていない単語をカタログで解決する
///
/// 結果は出現開始位置の昇順。
pub fn parse_emotes(registry: &EmoteRegistry, msg: &Message) -> Vec<EmoteInfo> {
    let runes: Vec<char> = msg.content.chars().collect();
    let channel = msg.channel.trim_start_matches('#');

    let mut found = Vec::new();
    // ネイティブエモートに覆われたルーンのマスク
    let mut covered = vec![false; runes.len()];

    if let Some(tag) = msg.tags.get("emotes") {
        parse_native_tag(registry, tag, channel, &runes, &mut covered, &mut found);
    }

    scan_words(registry, channel, &runes, &covered, &mut found);

    found.sort_by_key(|e| e.positions.first().map(|p| p.start).unwrap_or(0));
    found
}

/// `emotes`タグをパースする
///
/// 形式: `id1:s-e,s-e/id2:s-e`。不正な組は黙って捨てる。
fn parse_native_tag(
    registry: &EmoteRegistry,
    tag: &str,
    channel: &str,
    runes: &[char],
    covered: &mut [bool],
    found: &mut Vec<EmoteInfo>,
) {
    for group in tag.split('/') {
        let Some((id, ranges)) = group.split_once(':') else {
            continue;
        };

        for range in ranges.split(',') {
            let Some((start, end)) = range.split_once('-') else {
                continue;
            };
            let (Ok(start), Ok(end)) = (start.parse::<usize>(), end.parse::<usize>()) else {
                continue;
            };
            // 本文の外を指す宣言は信用しない
            if start > end || end >= runes.len() {
                continue;
            }

            for slot in &mut covered[start..=end] {
                *slot = true;
            }

            let name: String = runes[start..=end].iter().collect();
            found.push(EmoteInfo {
                id: id.to_string(),
                name,
                url: native_emote_url(id),
                file_path: registry.downloaded_path(id),
                positions: vec![EmotePosition { start, end }],
                provider: EmoteProvider::Twitch,
                scope: EmoteScope::Channel(channel.to_string()),
            });
        }
    }
}

/// 空白区切りの単語を走査してカタログで解決する
///
/// ネイティブエモートと1ルーンでも重なる単語はスキップ。
fn scan_words(
    registry: &EmoteRegistry,
    channel: &str,
    runes: &[char],
    covered: &[bool],
    found: &mut Vec<EmoteInfo>,
) {
    let mut i = 0;
    while i < runes.len() {
        if runes[i] == ' ' {
            i += 1;
            continue;
        }

        let start = i;
        while i < runes.len() && runes[i] != ' ' {
            i += 1;
        }
        let end = i - 1;

        if covered[start..=end].iter().any(|&c| c) {
            continue;
        }

        let word: String = runes[start..=end].iter().collect();
        if let Some(entry) = registry.lookup(channel, &word) {
            let file_path = entry
                .file_path
                .clone()
                .or_else(|| registry.downloaded_path(&entry.id));
            found.push(EmoteInfo {
                positions: vec![EmotePosition { start, end }],
                file_path,
                ..entry
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn make_message(content: &str, emotes_tag: Option<&str>) -> Message {
        let mut tags = HashMap::new();
        if let Some(tag) = emotes_tag {
            tags.insert("emotes".to_string(), tag.to_string());
        }
        Message {
            username: "tester".to_string(),
            content: content.to_string(),
            channel: "#testch".to_string(),
            tags,
            raw: String::new(),
            timestamp: Utc::now(),
            user_color: "#FFFFFF".to_string(),
        }
    }

    fn register(registry: &EmoteRegistry, id: &str, name: &str) {
        registry.insert(EmoteInfo {
            id: id.to_string(),
            name: name.to_string(),
            url: format!("https://example.com/{}", id),
            file_path: None,
            positions: Vec::new(),
            provider: EmoteProvider::Bttv,
            scope: EmoteScope::Global,
        });
    }

    #[test]
    fn test_native_tag_positions() {
        let registry = EmoteRegistry::new();
        let msg = make_message("Kappa hello Kappa", Some("25:0-4,12-16"));

        let emotes = parse_emotes(&registry, &msg);
        assert_eq!(emotes.len(), 2);
        assert_eq!(emotes[0].name, "Kappa");
        assert_eq!(emotes[0].positions, vec![EmotePosition { start: 0, end: 4 }]);
        assert_eq!(emotes[1].positions, vec![EmotePosition { start: 12, end: 16 }]);
        assert_eq!(emotes[0].url, native_emote_url("25"));
    }

    #[test]
    fn test_native_tag_out_of_bounds_discarded() {
        let registry = EmoteRegistry::new();
        let msg = make_message("short", Some("25:0-4,10-14"));

        let emotes = parse_emotes(&registry, &msg);
        assert_eq!(emotes.len(), 1);
        assert_eq!(emotes[0].positions[0].end, 4);
    }

    #[test]
    fn test_native_positions_are_rune_indexed() {
        let registry = EmoteRegistry::new();
        // マルチバイト文字の後でもルーン単位の位置で切り出せる
        let msg = make_message("こんにちは Kappa", Some("25:6-10"));

        let emotes = parse_emotes(&registry, &msg);
        assert_eq!(emotes.len(), 1);
        assert_eq!(emotes[0].name, "Kappa");
    }

    #[test]
    fn test_word_scan_resolves_catalog() {
        let registry = EmoteRegistry::new();
        register(&registry, "e1", "catJAM");
        let msg = make_message("hello catJAM world", None);

        let emotes = parse_emotes(&registry, &msg);
        assert_eq!(emotes.len(), 1);
        assert_eq!(emotes[0].id, "e1");
        assert_eq!(emotes[0].positions, vec![EmotePosition { start: 6, end: 11 }]);
    }

    #[test]
    fn test_covered_words_not_rescanned() {
        let registry = EmoteRegistry::new();
        // ネイティブで覆われた単語はカタログ解決しない
        register(&registry, "e1", "Kappa");
        let msg = make_message("Kappa Kappa", Some("25:0-4"));

        let emotes = parse_emotes(&registry, &msg);
        assert_eq!(emotes.len(), 2);
        assert_eq!(emotes[0].id, "25");
        assert_eq!(emotes[1].id, "e1");
    }

    #[test]
    fn test_results_sorted_by_start() {
        let registry = EmoteRegistry::new();
        register(&registry, "e1", "catJAM");
        let msg = make_message("catJAM then Kappa", Some("25:12-16"));

        let emotes = parse_emotes(&registry, &msg);
        assert_eq!(emotes.len(), 2);
        assert!(emotes[0].positions[0].start < emotes[1].positions[0].start);
    }

    #[test]
    fn test_plain_text_yields_nothing() {
        let registry = EmoteRegistry::new();
        let msg = make_message("just a normal message", None);
        assert!(parse_emotes(&registry, &msg).is_empty());
    }
}
