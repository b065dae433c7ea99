use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use super::types::{EmoteInfo, EmoteProvider, EmoteScope};

type Catalog = HashMap<String, EmoteInfo>;
type ChannelCatalogs = HashMap<String, Catalog>;

/// サードパーティエモートのレイヤー別カタログ
///
/// プロバイダー×スコープの6層を保持し、`lookup()`は
/// チャンネル7TV → グローバル7TV → チャンネルBTTV → グローバルBTTV
/// → チャンネルFFZ → グローバルFFZ の優先順で探索する。
/// 各層は独立したRwLockで守られ、読み取りは層ごとに順番に取得する。
pub struct EmoteRegistry {
    seventv_global: RwLock<Catalog>,
    bttv_global: RwLock<Catalog>,
    ffz_global: RwLock<Catalog>,
    seventv_channels: RwLock<ChannelCatalogs>,
    bttv_channels: RwLock<ChannelCatalogs>,
    ffz_channels: RwLock<ChannelCatalogs>,
    /// ダウンロード済みエモートのIDキーのキャッシュ
    downloaded: RwLock<Catalog>,
}

impl EmoteRegistry {
    pub fn new() -> Self {
        Self {
            seventv_global: RwLock::new(HashMap::new()),
            bttv_global: RwLock::new(HashMap::new()),
            ffz_global: RwLock::new(HashMap::new()),
            seventv_channels: RwLock::new(HashMap::new()),
            bttv_channels: RwLock::new(HashMap::new()),
            ffz_channels: RwLock::new(HashMap::new()),
            downloaded: RwLock::new(HashMap::new()),
        }
    }

    /// エモートをカタログへ登録する（スコープはemote自身が持つ）
    pub fn insert(&self, emote: EmoteInfo) {
        match &emote.scope {
            EmoteScope::Global => {
                let lock = self.global_layer(emote.provider);
                lock.write()
                    .expect("emote registry lock poisoned")
                    .insert(emote.name.clone(), emote);
            }
            EmoteScope::Channel(channel) => {
                let channel = channel.clone();
                let lock = self.channel_layer(emote.provider);
                lock.write()
                    .expect("emote registry lock poisoned")
                    .entry(channel)
                    .or_default()
                    .insert(emote.name.clone(), emote);
            }
        }
    }

    /// 単語をエモート名として解決する
    ///
    /// チャンネル名は`#`の有無を問わない。見つからなければNone。
    pub fn lookup(&self, channel: &str, word: &str) -> Option<EmoteInfo> {
        let channel = channel.trim_start_matches('#');

        for provider in [EmoteProvider::SevenTv, EmoteProvider::Bttv, EmoteProvider::Ffz] {
            if let Some(found) = self.lookup_channel_layer(provider, channel, word) {
                return Some(found);
            }
            if let Some(found) = self.lookup_global_layer(provider, word) {
                return Some(found);
            }
        }
        None
    }

    /// ダウンロード完了を記録する
    ///
    /// IDキーのキャッシュに加え、該当チャンネル層とグローバル層の
    /// エントリにもfile_pathを反映し、以後の解決を即時にする。
    pub fn record_download(&self, emote: &EmoteInfo, path: &Path) {
        let mut cached = emote.clone();
        cached.file_path = Some(path.to_path_buf());
        cached.positions = Vec::new();

        self.downloaded
            .write()
            .expect("emote registry lock poisoned")
            .insert(cached.id.clone(), cached);

        if emote.provider == EmoteProvider::Twitch {
            return;
        }

        if let EmoteScope::Channel(channel) = &emote.scope {
            let lock = self.channel_layer(emote.provider);
            let mut channels = lock.write().expect("emote registry lock poisoned");
            if let Some(entry) = channels
                .get_mut(channel.as_str())
                .and_then(|c| c.get_mut(&emote.name))
            {
                entry.file_path = Some(path.to_path_buf());
            }
        } else {
            let lock = self.global_layer(emote.provider);
            let mut catalog = lock.write().expect("emote registry lock poisoned");
            if let Some(entry) = catalog.get_mut(&emote.name) {
                entry.file_path = Some(path.to_path_buf());
            }
        }
    }

    /// ダウンロード済みキャッシュをIDで引く
    pub fn downloaded(&self, id: &str) -> Option<EmoteInfo> {
        self.downloaded
            .read()
            .expect("emote registry lock poisoned")
            .get(id)
            .cloned()
    }

    /// ダウンロード済みファイルのパスをIDで引く
    pub fn downloaded_path(&self, id: &str) -> Option<PathBuf> {
        self.downloaded
            .read()
            .expect("emote registry lock poisoned")
            .get(id)
            .and_then(|e| e.file_path.clone())
    }

    /// 指定チャンネルのカタログが取得済みか
    pub fn has_channel(&self, provider: EmoteProvider, channel: &str) -> bool {
        let channel = channel.trim_start_matches('#');
        self.channel_layer(provider)
            .read()
            .expect("emote registry lock poisoned")
            .contains_key(channel)
    }

    fn global_layer(&self, provider: EmoteProvider) -> &RwLock<Catalog> {
        match provider {
            EmoteProvider::SevenTv => &self.seventv_global,
            EmoteProvider::Bttv => &self.bttv_global,
            EmoteProvider::Ffz => &self.ffz_global,
            EmoteProvider::Twitch => unreachable!("native emotes are not catalogued"),
        }
    }

    fn channel_layer(&self, provider: EmoteProvider) -> &RwLock<ChannelCatalogs> {
        match provider {
            EmoteProvider::SevenTv => &self.seventv_channels,
            EmoteProvider::Bttv => &self.bttv_channels,
            EmoteProvider::Ffz => &self.ffz_channels,
            EmoteProvider::Twitch => unreachable!("native emotes are not catalogued"),
        }
    }

    fn lookup_global_layer(&self, provider: EmoteProvider, word: &str) -> Option<EmoteInfo> {
        self.global_layer(provider)
            .read()
            .expect("emote registry lock poisoned")
            .get(word)
            .cloned()
    }

    fn lookup_channel_layer(
        &self,
        provider: EmoteProvider,
        channel: &str,
        word: &str,
    ) -> Option<EmoteInfo> {
        self.channel_layer(provider)
            .read()
            .expect("emote registry lock poisoned")
            .get(channel)
            .and_then(|catalog| catalog.get(word))
            .cloned()
    }
}

impl Default for EmoteRegistry {
    fn default() -> Self {
        Self::new()
    }
}
