use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use image::ImageFormat;
use serde::de::DeserializeOwned;

use crate::config;

use super::errors::EmoteError;
use super::image::{clamp_height, decode_first_frame};
use super::registry::EmoteRegistry;
use super::types::{
    BttvChannelResponse, BttvEmote, EmoteInfo, EmoteProvider, EmoteScope, FfzEmoticon,
    FfzSetsResponse, SevenTvEmote, SevenTvEmoteSet, SevenTvFile, SevenTvUserResponse,
};

const SEVENTV_API_BASE: &str = "https://7tv.io";
const BTTV_API_BASE: &str = "https://api.betterttv.net";
const BTTV_CDN_BASE: &str = "https://cdn.betterttv.net";
const FFZ_API_BASE: &str = "https://api.frankerfacez.com";

/// サードパーティエモートの取得とダウンロードを担当する
///
/// プロバイダーAPIからカタログをレジストリへ流し込み、
/// 解決済みエモートの画像をキャッシュディレクトリへ保存する。
/// カタログ取得時点ではメタデータのみ登録し、画像の実体は
/// メッセージ解決時に`download_emote()`で遅延取得する。
pub struct EmoteFetcher {
    client: reqwest::Client,
    registry: Arc<EmoteRegistry>,
    cache_dir: PathBuf,
    seventv_base: String,
    bttv_base: String,
    bttv_cdn: String,
    ffz_base: String,
}

impl EmoteFetcher {
    pub fn new(registry: Arc<EmoteRegistry>, cache_dir: PathBuf) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config::http_timeout())
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            registry,
            cache_dir,
            seventv_base: SEVENTV_API_BASE.to_string(),
            bttv_base: BTTV_API_BASE.to_string(),
            bttv_cdn: BTTV_CDN_BASE.to_string(),
            ffz_base: FFZ_API_BASE.to_string(),
        }
    }

    /// 全エンドポイントをテストサーバーへ向ける
    #[cfg(test)]
    pub(crate) fn with_base_url(
        registry: Arc<EmoteRegistry>,
        cache_dir: PathBuf,
        base_url: &str,
    ) -> Self {
        let mut fetcher = Self::new(registry, cache_dir);
        fetcher.seventv_base = base_url.to_string();
        fetcher.bttv_base = base_url.to_string();
        fetcher.bttv_cdn = base_url.to_string();
        fetcher.ffz_base = base_url.to_string();
        fetcher
    }

    // -----------------------------------------------------------------------
    // カタログ取得
    // -----------------------------------------------------------------------

    /// グローバルエモートを3プロバイダーまとめて取得する
    ///
    /// プロバイダー単位で失敗を許容し、ログに残して続行する。
    pub async fn fetch_global_emotes(&self) {
        let (seventv, bttv, ffz) = tokio::join!(
            self.fetch_seventv_global(),
            self.fetch_bttv_global(),
            self.fetch_ffz_global(),
        );
        log_fetch_result("7TV", "global", seventv);
        log_fetch_result("BTTV", "global", bttv);
        log_fetch_result("FFZ", "global", ffz);
    }

    /// チャンネルエモートを3プロバイダーまとめて取得する
    pub async fn fetch_channel_emotes(&self, room_id: &str, channel: &str) {
        let channel = channel.trim_start_matches('#');
        let (seventv, bttv, ffz) = tokio::join!(
            self.fetch_seventv_channel(room_id, channel),
            self.fetch_bttv_channel(room_id, channel),
            self.fetch_ffz_channel(channel),
        );
        log_fetch_result("7TV", channel, seventv);
        log_fetch_result("BTTV", channel, bttv);
        log_fetch_result("FFZ", channel, ffz);
    }

    pub async fn fetch_seventv_global(&self) -> Result<usize, EmoteError> {
        let url = format!("{}/v3/emote-sets/global", self.seventv_base);
        let set: SevenTvEmoteSet = self.get_json(&url).await?;
        Ok(self.store_seventv(set.emotes, EmoteScope::Global))
    }

    /// 7TVのチャンネルエモートはTwitchのroom-idで引く
    pub async fn fetch_seventv_channel(
        &self,
        room_id: &str,
        channel: &str,
    ) -> Result<usize, EmoteError> {
        let url = format!("{}/v3/users/twitch/{}", self.seventv_base, room_id);
        let resp: SevenTvUserResponse = self.get_json(&url).await?;
        let scope = EmoteScope::Channel(channel.to_string());
        Ok(self.store_seventv(resp.emote_set.emotes, scope))
    }

    pub async fn fetch_bttv_global(&self) -> Result<usize, EmoteError> {
        let url = format!("{}/3/cached/emotes/global", self.bttv_base);
        let emotes: Vec<BttvEmote> = self.get_json(&url).await?;
        Ok(self.store_bttv(emotes, EmoteScope::Global))
    }

    /// BTTVのチャンネルエモートは専用枠と共有枠の和集合
    pub async fn fetch_bttv_channel(
        &self,
        room_id: &str,
        channel: &str,
    ) -> Result<usize, EmoteError> {
        let url = format!("{}/3/cached/users/twitch/{}", self.bttv_base, room_id);
        let resp: BttvChannelResponse = self.get_json(&url).await?;

        let mut emotes = resp.channel_emotes;
        emotes.extend(resp.shared_emotes);
        Ok(self.store_bttv(emotes, EmoteScope::Channel(channel.to_string())))
    }

    pub async fn fetch_ffz_global(&self) -> Result<usize, EmoteError> {
        let url = format!("{}/v1/set/global", self.ffz_base);
        let resp: FfzSetsResponse = self.get_json(&url).await?;
        Ok(self.store_ffz(resp, EmoteScope::Global))
    }

    /// FFZのチャンネルエモートはログイン名で引く
    ///
    /// FFZに登録のないチャンネルは404を返すが、それはエラーではなく
    /// 「エモートなし」として扱う。
    pub async fn fetch_ffz_channel(&self, channel: &str) -> Result<usize, EmoteError> {
        let url = format!("{}/v1/room/{}", self.ffz_base, channel);
        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(0);
        }
        if !response.status().is_success() {
            return Err(EmoteError::Api {
                status: response.status().as_u16(),
                url,
            });
        }

        let resp: FfzSetsResponse = response.json().await?;
        Ok(self.store_ffz(resp, EmoteScope::Channel(channel.to_string())))
    }

    fn store_seventv(&self, emotes: Vec<SevenTvEmote>, scope: EmoteScope) -> usize {
        let mut count = 0;
        for emote in emotes {
            let Some(file) = pick_seventv_file(&emote.data.host.files) else {
                continue;
            };
            let url = normalize_url(&format!("{}/{}", emote.data.host.url, file.name));
            self.store(EmoteProvider::SevenTv, &scope, emote.id, emote.name, url);
            count += 1;
        }
        count
    }

    fn store_bttv(&self, emotes: Vec<BttvEmote>, scope: EmoteScope) -> usize {
        let count = emotes.len();
        for emote in emotes {
            let url = format!("{}/emote/{}/3x", self.bttv_cdn, emote.id);
            self.store(EmoteProvider::Bttv, &scope, emote.id, emote.code, url);
        }
        count
    }

    fn store_ffz(&self, resp: FfzSetsResponse, scope: EmoteScope) -> usize {
        let mut count = 0;
        for set in resp.sets.into_values() {
            for emoticon in set.emoticons {
                let Some(url) = pick_ffz_url(&emoticon) else {
                    continue;
                };
                self.store(
                    EmoteProvider::Ffz,
                    &scope,
                    emoticon.id.to_string(),
                    emoticon.name,
                    url,
                );
                count += 1;
            }
        }
        count
    }

    fn store(
        &self,
        provider: EmoteProvider,
        scope: &EmoteScope,
        id: String,
        name: String,
        url: String,
    ) {
        let mut info = EmoteInfo {
            id,
            name,
            url,
            file_path: None,
            positions: Vec::new(),
            provider,
            scope: scope.clone(),
        };
        // 過去の実行で保存済みならそのまま使う
        let path = self.emote_path(&info);
        if path.exists() {
            info.file_path = Some(path);
        }
        self.registry.insert(info);
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, EmoteError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(EmoteError::Api {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.json().await?)
    }

    // -----------------------------------------------------------------------
    // 画像ダウンロード
    // -----------------------------------------------------------------------

    /// エモート画像を取得してキャッシュに保存する
    ///
    /// 既にファイルがあれば再取得しない。GIFは先頭フレームに落とし、
    /// 高さ上限を超える画像は縮小して、常にPNGで保存する。
    /// 成功したらレジストリに反映する。
    pub async fn download_emote(&self, emote: &EmoteInfo) -> Result<PathBuf, EmoteError> {
        if emote.url.is_empty() {
            return Err(EmoteError::MissingUrl(emote.name.clone()));
        }

        let path = self.emote_path(emote);
        if path.exists() {
            self.registry.record_download(emote, &path);
            return Ok(path);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self.client.get(&emote.url).send().await?;
        if !response.status().is_success() {
            return Err(EmoteError::Api {
                status: response.status().as_u16(),
                url: emote.url.clone(),
            });
        }
        let bytes = response.bytes().await?;

        let img = clamp_height(decode_first_frame(&bytes)?);
        let mut encoded = Cursor::new(Vec::new());
        img.write_to(&mut encoded, ImageFormat::Png)?;
        tokio::fs::write(&path, encoded.into_inner()).await?;

        self.registry.record_download(emote, &path);
        log::debug!("Downloaded emote {} to {}", emote.name, path.display());
        Ok(path)
    }

    /// エモートの保存先パス
    ///
    /// `<cache_dir>/channels/<scope>/<provider_dir>/<name>_<id>.png`
    fn emote_path(&self, emote: &EmoteInfo) -> PathBuf {
        self.cache_dir
            .join("channels")
            .join(emote.scope.dir_name())
            .join(emote.provider.dir_name())
            .join(emote_file_name(&emote.name, &emote.id))
    }
}

/// ファイル名に使えない文字を避けたエモートファイル名
fn emote_file_name(name: &str, id: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' || c == ':' { '_' } else { c })
        .collect();
    if safe.is_empty() {
        format!("emote_{}.png", id)
    } else {
        format!("{}_{}.png", safe, id)
    }
}

/// プロトコル相対URL("//...")をhttpsに正規化する
fn normalize_url(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{}", url)
    } else {
        url.to_string()
    }
}

/// 7TVのファイル一覧から保存対象を選ぶ
///
/// PNGの最大スケールを優先し、なければGIFの最大スケール。
fn pick_seventv_file(files: &[SevenTvFile]) -> Option<&SevenTvFile> {
    let is_format = |f: &&SevenTvFile, ext: &str| {
        f.format.eq_ignore_ascii_case(ext) || f.name.to_ascii_lowercase().ends_with(&format!(".{}", ext))
    };

    files
        .iter()
        .filter(|f| is_format(f, "png"))
        .last()
        .or_else(|| files.iter().filter(|f| is_format(f, "gif")).last())
}

/// FFZのスケールティアからURLを選ぶ（4x → 2x → 1x）
fn pick_ffz_url(emoticon: &FfzEmoticon) -> Option<String> {
    ["4", "2", "1"]
        .iter()
        .find_map(|tier| emoticon.urls.get(*tier))
        .map(|url| normalize_url(url))
}

fn log_fetch_result(provider: &str, scope: &str, result: Result<usize, EmoteError>) {
    match result {
        Ok(count) => log::info!("Fetched {} {} emotes for {}", count, provider, scope),
        Err(e) => log::warn!("Failed to fetch {} emotes for {}: {}", provider, scope, e),
    }
}
