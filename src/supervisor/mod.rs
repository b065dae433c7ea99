// =============================================================================
// セッションスーパーバイザーモジュール
// =============================================================================
// 複数チャンネルのIRC接続をまとめて管理する
//
// 機能:
// - チャンネル→接続マップと単一フォーカスの管理
// - 一斉接続（起動間隔をずらす）と集約エラー
// - 接続ごとの転送ループ（エモート解決 + ハイライト判定 + 履歴）
// - 配信状態（2分間隔）と視聴者数（30秒間隔）のポーリング
//
// 配信状態の問い合わせはTwitch GQLの公開クエリを使う。
// =============================================================================

mod errors;
mod signal;
mod status;

pub use errors::SupervisorError;
pub use signal::{AnnotatedMessage, Signal};
pub use status::{StatusClient, StatusError, StreamStatus};

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::emotes::{parse_emotes, EmoteFetcher, EmoteRegistry};
use crate::irc::{Connection, Receivers};

/// 視聴者数ポーリングの間隔
const VIEWER_COUNT_INTERVAL: Duration = Duration::from_secs(30);

/// 配信状態ポーリングの間隔
const LIVE_STATUS_INTERVAL: Duration = Duration::from_secs(120);

/// 配信状態チェックのチャンネル間ウェイト
const LIVE_STATUS_PACING: Duration = Duration::from_millis(500);

/// 1接続分のハンドル
struct ChannelHandle {
    connection: Arc<Connection>,
    /// 転送ループと視聴者数ループをまとめて止めるトークン
    cancel: CancellationToken,
    local: Arc<StdMutex<ChannelLocal>>,
}

/// 接続ごとのローカル状態（専用ロックで守る）
#[derive(Default)]
struct ChannelLocal {
    history: VecDeque<AnnotatedMessage>,
    viewer_count: u64,
}

/// 接続マップ・フォーカス・配信状態をまとめて守る共有状態
///
/// ネットワークI/Oをまたいでこのロックを保持してはならない。
struct Shared {
    /// 許可リスト（`#`なしのログイン名）
    channels: Vec<String>,
    /// フォーカス中チャンネル（`#`付きキー）
    focused: Option<String>,
    /// 接続マップ（`#`付きキー）
    connections: HashMap<String, ChannelHandle>,
    /// 既知の配信状態（`#`なしキー）
    live_statuses: HashMap<String, bool>,
}

/// 複数チャンネルのチャットセッションを管理するスーパーバイザー
///
/// `new()`でシグナル受信側と対で作り、`connect_all()`または
/// `connect_channel()`で接続を開始する。以後の観測はすべて
/// `Signal`として受信側へ流れる。
#[derive(Clone)]
pub struct ChatSupervisor {
    settings: Settings,
    /// 小文字化済みのハイライトキーワード
    keywords: Arc<Vec<String>>,
    registry: Arc<EmoteRegistry>,
    fetcher: Arc<EmoteFetcher>,
    status: Arc<StatusClient>,
    signals: mpsc::UnboundedSender<Signal>,
    shared: Arc<RwLock<Shared>>,
    monitor_token: CancellationToken,
}

impl ChatSupervisor {
    /// スーパーバイザーとシグナル受信側を作る
    pub fn new(settings: Settings) -> (Self, mpsc::UnboundedReceiver<Signal>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let registry = Arc::new(EmoteRegistry::new());
        let fetcher = Arc::new(EmoteFetcher::new(
            Arc::clone(&registry),
            settings.emote_cache_dir.clone(),
        ));
        let channels: Vec<String> = settings
            .channels
            .iter()
            .map(|c| without_hash(c).to_string())
            .collect();
        let keywords = Arc::new(
            settings
                .filter_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect::<Vec<_>>(),
        );

        let supervisor = Self {
            settings,
            keywords,
            registry,
            fetcher,
            status: Arc::new(StatusClient::new()),
            signals: tx,
            shared: Arc::new(RwLock::new(Shared {
                channels,
                focused: None,
                connections: HashMap::new(),
                live_statuses: HashMap::new(),
            })),
            monitor_token: CancellationToken::new(),
        };
        (supervisor, rx)
    }

    /// 配信状態クライアントを差し替える（テスト用）
    #[cfg(test)]
    pub(crate) fn with_status_client(mut self, status: StatusClient) -> Self {
        self.status = Arc::new(status);
        self
    }

    /// エモートレジストリへの参照
    pub fn registry(&self) -> Arc<EmoteRegistry> {
        Arc::clone(&self.registry)
    }

    /// グローバルエモートを事前取得する
    pub async fn prefetch_global_emotes(&self) {
        self.fetcher.fetch_global_emotes().await;
    }

    // -----------------------------------------------------------------------
    // 接続管理
    // -----------------------------------------------------------------------

    /// 許可リストの全チャンネルへ接続する
    ///
    /// 接続タスクの起動を設定された間隔だけずらす。一部の失敗は
    /// 許容し、1つも成功しなかったときだけ集約エラーを返す。
    pub async fn connect_all(&self) -> Result<(), SupervisorError> {
        let channels: Vec<String> = self.shared.read().await.channels.clone();
        if channels.is_empty() {
            return Ok(());
        }

        let mut tasks = Vec::with_capacity(channels.len());
        for (i, channel) in channels.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.settings.connect_stagger).await;
            }
            let supervisor = self.clone();
            tasks.push(tokio::spawn(async move {
                let result = supervisor.connect_channel(&channel).await;
                (channel, result)
            }));
        }

        let mut successes = 0;
        let mut failures = Vec::new();
        for task in tasks {
            match task.await {
                Ok((_, Ok(()))) => successes += 1,
                Ok((channel, Err(e))) => failures.push((channel, e.to_string())),
                Err(e) => log::error!("Connect task panicked: {}", e),
            }
        }

        if successes == 0 && !failures.is_empty() {
            return Err(SupervisorError::AllConnectionsFailed(failures));
        }
        for (channel, error) in &failures {
            log::warn!("Connection to {} failed: {}", channel, error);
        }
        Ok(())
    }

    /// 1チャンネルへ接続してフォーカスを検討する
    ///
    /// 既に接続済みならダイヤルせず、フォーカス切り替えと
    /// 履歴リプレイだけを行う（冪等）。
    pub async fn connect_channel(&self, channel: &str) -> Result<(), SupervisorError> {
        let key = with_hash(channel);

        if let Some(local) = self.try_focus_existing(&key).await {
            self.replay_history(&key, &local);
            return Ok(());
        }

        let conn = Arc::new(Connection::with_server(
            &key,
            self.settings.buffer_size,
            &self.settings.irc_host,
            self.settings.irc_port,
        ));
        if let Err(e) = conn.connect().await {
            self.emit(Signal::ChannelConnectFailed {
                channel: key.clone(),
                error: e.to_string(),
            });
            return Err(SupervisorError::Connect {
                channel: key,
                source: e,
            });
        }

        let receivers = conn
            .take_receivers()
            .expect("fresh connection always has receivers");
        conn.start();

        let cancel = CancellationToken::new();
        let local = Arc::new(StdMutex::new(ChannelLocal::default()));
        let handle = ChannelHandle {
            connection: Arc::clone(&conn),
            cancel: cancel.clone(),
            local: Arc::clone(&local),
        };

        let (replaced, focus_changed) = {
            let mut shared = self.shared.write().await;
            let replaced = shared.connections.insert(key.clone(), handle);
            let focus_changed = shared.focused.is_none();
            if focus_changed {
                shared.focused = Some(key.clone());
            }
            (replaced, focus_changed)
        };
        // 切断済みの古いハンドルが残っていたら片付ける
        if let Some(old) = replaced {
            old.cancel.cancel();
            old.connection.stop().await;
        }

        tokio::spawn(forward_loop(
            self.clone(),
            key.clone(),
            receivers,
            cancel.clone(),
            Arc::clone(&local),
        ));
        tokio::spawn(viewer_count_loop(self.clone(), key.clone(), cancel, local));

        self.emit(Signal::ChannelConnected {
            channel: key.clone(),
        });
        if focus_changed {
            self.emit(Signal::ChannelSwitched { channel: key });
        }
        Ok(())
    }

    /// フォーカスを切り替える
    ///
    /// 接続済みならフォーカス移動と履歴リプレイのみ。未接続なら
    /// 接続してからフォーカスする。
    pub async fn switch_channel(&self, channel: &str) -> Result<(), SupervisorError> {
        let key = with_hash(channel);

        match self.try_focus_existing(&key).await {
            Some(local) => {
                self.replay_history(&key, &local);
                Ok(())
            }
            None => self.connect_channel(channel).await,
        }
    }

    /// チャンネルを切断して接続マップから外す
    pub async fn disconnect_channel(&self, channel: &str) -> Result<(), SupervisorError> {
        let key = with_hash(channel);

        let (handle, lost_focus) = {
            let mut shared = self.shared.write().await;
            let handle = shared
                .connections
                .remove(&key)
                .ok_or_else(|| SupervisorError::NotConnected(key.clone()))?;
            let lost_focus = shared.focused.as_deref() == Some(key.as_str());
            if lost_focus {
                shared.focused = None;
            }
            (handle, lost_focus)
        };

        handle.cancel.cancel();
        handle.connection.stop().await;

        self.emit(Signal::ChannelDisconnected {
            channel: key.clone(),
        });
        if lost_focus {
            self.emit(Signal::ActiveChannelLost { channel: key });
        }
        Ok(())
    }

    /// 全チャンネルを切断する
    pub async fn disconnect_all(&self) {
        let handles: Vec<(String, ChannelHandle)> = {
            let mut shared = self.shared.write().await;
            shared.focused = None;
            shared.connections.drain().collect()
        };

        let mut channels = Vec::with_capacity(handles.len());
        for (key, handle) in handles {
            handle.cancel.cancel();
            handle.connection.stop().await;
            channels.push(key);
        }
        channels.sort();

        self.emit(Signal::AllChannelsDisconnected { channels });
    }

    /// 監視ループを止めて全接続を閉じる
    pub async fn shutdown(&self) {
        self.monitor_token.cancel();
        self.disconnect_all().await;
    }

    // -----------------------------------------------------------------------
    // 許可リスト管理
    // -----------------------------------------------------------------------

    /// チャンネルを許可リストに追加し、配信状態を即時観測する
    pub async fn add_channel(&self, channel: &str) -> Result<(), SupervisorError> {
        let name = without_hash(channel).to_string();

        {
            let mut shared = self.shared.write().await;
            if shared.channels.iter().any(|c| c == &name) {
                return Err(SupervisorError::AlreadyRegistered(name));
            }
            shared.channels.push(name.clone());
        }
        self.emit(Signal::ChannelAdded {
            channel: name.clone(),
        });

        match self.status.is_live(&name).await {
            Ok(is_live) => {
                self.shared
                    .write()
                    .await
                    .live_statuses
                    .insert(name.clone(), is_live);
                self.emit(Signal::LiveStatusChanged {
                    channel: name,
                    is_live,
                });
            }
            Err(e) => log::warn!("Live status check failed for {}: {}", name, e),
        }
        Ok(())
    }

    /// チャンネルを許可リストから外し、接続が残っていれば切断する
    pub async fn remove_channel(&self, channel: &str) -> Result<(), SupervisorError> {
        let name = without_hash(channel).to_string();

        {
            let mut shared = self.shared.write().await;
            let Some(pos) = shared.channels.iter().position(|c| c == &name) else {
                return Err(SupervisorError::UnknownChannel(name));
            };
            shared.channels.remove(pos);
            shared.live_statuses.remove(&name);
        }

        match self.disconnect_channel(&name).await {
            Ok(()) | Err(SupervisorError::NotConnected(_)) => {}
            Err(e) => return Err(e),
        }

        self.emit(Signal::ChannelRemoved { channel: name });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // 配信状態の監視
    // -----------------------------------------------------------------------

    /// 許可リスト全体の配信状態を定期チェックするループを起動する
    pub fn start_live_status_monitoring(&self) {
        let supervisor = self.clone();
        let token = self.monitor_token.clone();

        tokio::spawn(async move {
            supervisor.check_all_live_statuses().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(LIVE_STATUS_INTERVAL) => {
                        supervisor.check_all_live_statuses().await;
                    }
                }
            }
        });
    }

    async fn check_all_live_statuses(&self) {
        let channels: Vec<String> = self.shared.read().await.channels.clone();

        for (i, channel) in channels.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(LIVE_STATUS_PACING).await;
            }
            let is_live = match self.status.is_live(channel).await {
                Ok(v) => v,
                Err(e) => {
                    log::warn!("Live status check failed for {}: {}", channel, e);
                    continue;
                }
            };

            // 初回観測も変化として通知する
            let changed = {
                let mut shared = self.shared.write().await;
                shared.live_statuses.insert(channel.clone(), is_live) != Some(is_live)
            };
            if changed {
                self.emit(Signal::LiveStatusChanged {
                    channel: channel.clone(),
                    is_live,
                });
            }
        }
    }

    // -----------------------------------------------------------------------
    // 照会
    // -----------------------------------------------------------------------

    /// フォーカス中チャンネル（`#`付き）
    pub async fn focused_channel(&self) -> Option<String> {
        self.shared.read().await.focused.clone()
    }

    /// 接続中のチャンネル一覧（`#`付き、ソート済み）
    pub async fn connected_channels(&self) -> Vec<String> {
        let shared = self.shared.read().await;
        let mut channels: Vec<String> = shared
            .connections
            .iter()
            .filter(|(_, h)| h.connection.is_connected())
            .map(|(k, _)| k.clone())
            .collect();
        channels.sort();
        channels
    }

    /// 許可リスト（`#`なし）
    pub async fn channels(&self) -> Vec<String> {
        self.shared.read().await.channels.clone()
    }

    /// 既知の配信状態（未観測ならfalse）
    pub async fn is_channel_live(&self, channel: &str) -> bool {
        self.shared
            .read()
            .await
            .live_statuses
            .get(without_hash(channel))
            .copied()
            .unwrap_or(false)
    }

    /// フォーカス中チャンネルの直近の視聴者数
    pub async fn focused_viewer_count(&self) -> u64 {
        let shared = self.shared.read().await;
        shared
            .focused
            .as_ref()
            .and_then(|key| shared.connections.get(key))
            .map(|h| h.local.lock().expect("channel local lock poisoned").viewer_count)
            .unwrap_or(0)
    }

    /// チャンネルの直近n件の注釈済みメッセージ
    pub async fn recent_messages(&self, channel: &str, n: usize) -> Vec<AnnotatedMessage> {
        let key = with_hash(channel);
        let shared = self.shared.read().await;
        let Some(handle) = shared.connections.get(&key) else {
            return Vec::new();
        };
        let local = handle.local.lock().expect("channel local lock poisoned");
        local
            .history
            .iter()
            .skip(local.history.len().saturating_sub(n))
            .cloned()
            .collect()
    }

    // -----------------------------------------------------------------------
    // 内部
    // -----------------------------------------------------------------------

    /// 接続済みならフォーカスを移してローカル状態を返す
    async fn try_focus_existing(&self, key: &str) -> Option<Arc<StdMutex<ChannelLocal>>> {
        let mut shared = self.shared.write().await;
        let handle = shared.connections.get(key)?;
        if !handle.connection.is_connected() {
            return None;
        }
        let local = Arc::clone(&handle.local);
        shared.focused = Some(key.to_string());
        Some(local)
    }

    /// フォーカス切り替え時のリプレイ（履歴 + 視聴者数）
    fn replay_history(&self, key: &str, local: &Arc<StdMutex<ChannelLocal>>) {
        let (messages, viewer_count) = {
            let local = local.lock().expect("channel local lock poisoned");
            (
                local.history.iter().cloned().collect::<Vec<_>>(),
                local.viewer_count,
            )
        };

        self.emit(Signal::ChannelSwitched {
            channel: key.to_string(),
        });
        self.emit(Signal::ChannelHistory {
            channel: key.to_string(),
            messages,
        });
        self.emit(Signal::ViewerCount {
            channel: key.to_string(),
            count: viewer_count,
        });
    }

    async fn is_focused(&self, key: &str) -> bool {
        self.shared.read().await.focused.as_deref() == Some(key)
    }

    /// メッセージにエモート解決とハイライト判定を付ける
    ///
    /// ローカルファイルのないエモートはバックグラウンドで
    /// ダウンロードを開始する。
    fn annotate(&self, msg: crate::irc::Message) -> AnnotatedMessage {
        let emotes = parse_emotes(&self.registry, &msg);

        for emote in &emotes {
            if emote.file_path.is_none() && !emote.url.is_empty() {
                let fetcher = Arc::clone(&self.fetcher);
                let emote = emote.clone();
                tokio::spawn(async move {
                    if let Err(e) = fetcher.download_emote(&emote).await {
                        log::debug!("Emote download failed for {}: {}", emote.name, e);
                    }
                });
            }
        }

        let highlighted = is_highlighted(&msg.content, &self.keywords);
        AnnotatedMessage {
            message: msg,
            emotes,
            highlighted,
        }
    }

    fn emit(&self, signal: Signal) {
        if self.signals.send(signal).is_err() {
            log::debug!("Signal receiver dropped, signal discarded");
        }
    }
}

/// キーワードの大文字小文字を無視した部分一致
fn is_highlighted(content: &str, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return false;
    }
    let lower = content.to_lowercase();
    keywords.iter().any(|k| lower.contains(k.as_str()))
}

fn with_hash(channel: &str) -> String {
    if channel.starts_with('#') {
        channel.to_string()
    } else {
        format!("#{}", channel)
    }
}

fn without_hash(channel: &str) -> &str {
    channel.trim_start_matches('#')
}

/// 接続1本分の転送ループ
///
/// 配信チャネルから受け取ったアイテムに注釈を付け、履歴へ積み、
/// フォーカス状態に応じてシグナルへ変換する。最初のメッセージの
/// room-idタグでチャンネルエモートの取得を開始する。
async fn forward_loop(
    supervisor: ChatSupervisor,
    key: String,
    mut receivers: Receivers,
    cancel: CancellationToken,
    local: Arc<StdMutex<ChannelLocal>>,
) {
    let mut emotes_requested = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = receivers.messages.recv() => {
                let Some(msg) = msg else { break };

                if !emotes_requested {
                    if let Some(room_id) = msg.room_id() {
                        let fetcher = Arc::clone(&supervisor.fetcher);
                        let room_id = room_id.to_string();
                        let channel = key.clone();
                        tokio::spawn(async move {
                            fetcher.fetch_channel_emotes(&room_id, &channel).await;
                        });
                        emotes_requested = true;
                    }
                }

                let annotated = supervisor.annotate(msg);
                {
                    let mut local = local.lock().expect("channel local lock poisoned");
                    local.history.push_back(annotated.clone());
                    while local.history.len() > supervisor.settings.buffer_size {
                        local.history.pop_front();
                    }
                }

                if supervisor.is_focused(&key).await {
                    supervisor.emit(Signal::NewMessage { message: annotated });
                } else if annotated.highlighted {
                    supervisor.emit(Signal::ChannelHighlight {
                        channel: key.clone(),
                        message: annotated,
                    });
                }
            }

            reward = receivers.rewards.recv() => {
                let Some(reward) = reward else { break };
                // 報酬はフォーカス中のチャンネルだけ通知する
                if supervisor.is_focused(&key).await {
                    supervisor.emit(Signal::RewardRedeemed {
                        channel: key.clone(),
                        reward,
                    });
                }
            }

            err = receivers.errors.recv() => {
                let Some(err) = err else { break };
                log::error!("Connection error on {}: {}", key, err);
                supervisor.emit(Signal::ConnectionError {
                    channel: key.clone(),
                    error: err.to_string(),
                });
                break;
            }
        }
    }

    log::debug!("Forward loop ended for {}", key);
}

/// フォーカス中チャンネルの視聴者数を定期取得するループ
async fn viewer_count_loop(
    supervisor: ChatSupervisor,
    key: String,
    cancel: CancellationToken,
    local: Arc<StdMutex<ChannelLocal>>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = tokio::time::sleep(VIEWER_COUNT_INTERVAL) => {
                // フォーカスされていないチャンネルでは問い合わせない
                if !supervisor.is_focused(&key).await {
                    continue;
                }
                match supervisor.status.viewer_count(without_hash(&key)).await {
                    Ok(count) => {
                        local.lock().expect("channel local lock poisoned").viewer_count = count;
                        supervisor.emit(Signal::ViewerCount {
                            channel: key.clone(),
                            count,
                        });
                    }
                    Err(e) => log::debug!("Viewer count fetch failed for {}: {}", key, e),
                }
            }
        }
    }
}
