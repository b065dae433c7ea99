//! チャンネルごとのIRC接続
//!
//! 1接続につき1つの読み取りループを持ち、パース済みのメッセージ・
//! 報酬・エラーを3本の有界チャネルで配信する。チャネルが満杯の
//! ときは新しいアイテムを黙って捨てる（drop-on-full）。これは
//! 消費側の遅延でネットワーク読み取りを止めないための意図的な
//! バックプレッシャーポリシー。

use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config;

use super::errors::IrcError;
use super::parser;
use super::ring_buffer::RingBuffer;
use super::types::{Message, RewardRedemption};

/// 配信チャネルの容量
///
/// 満杯になったら新しいアイテムは捨てる。読み取りループの
/// 生存性を配信の完全性より優先する。
const DELIVERY_CHANNEL_CAPACITY: usize = 10;

/// stop時に読み取りループの終了を待つ猶予
const STOP_GRACE: Duration = Duration::from_millis(10);

/// 接続状態フラグ（1つのロックでまとめて守る）
#[derive(Debug, Default)]
struct ConnState {
    connected: bool,
    stopped: bool,
}

/// 読み取りループが配信に使う送信側ハンドル一式
#[derive(Clone)]
struct Outbound {
    messages: mpsc::Sender<Message>,
    rewards: mpsc::Sender<RewardRedemption>,
    errors: mpsc::Sender<IrcError>,
}

/// 配信チャネルの受信側一式
///
/// `take_receivers()`で一度だけ取り出せる。
pub struct Receivers {
    pub messages: mpsc::Receiver<Message>,
    pub rewards: mpsc::Receiver<RewardRedemption>,
    pub errors: mpsc::Receiver<IrcError>,
}

/// 1チャンネル分のIRCセッション
///
/// ライフサイクル: `new` → `connect`（ダイヤル+ハンドシェイク）→
/// `start`（読み取りループ起動）→ `stop`（冪等）。
/// 再接続は行わない。読み取りエラーでセッションは終了する。
pub struct Connection {
    channel: String,
    host: String,
    port: u16,
    buffer: Arc<RingBuffer>,
    state: Arc<Mutex<ConnState>>,
    stop_token: CancellationToken,
    outbound: Mutex<Option<Outbound>>,
    receivers: Mutex<Option<Receivers>>,
    /// connect()からstart()までの間だけストリームを保持する
    stream: Mutex<Option<TcpStream>>,
}

impl Connection {
    /// Twitchの既定エンドポイントに向けた接続を作成（まだダイヤルはしない）
    pub fn new(channel: impl Into<String>, buffer_size: usize) -> Self {
        Self::with_server(
            channel,
            buffer_size,
            config::DEFAULT_IRC_HOST,
            config::DEFAULT_IRC_PORT,
        )
    }

    /// 接続先サーバーを指定して作成
    pub fn with_server(
        channel: impl Into<String>,
        buffer_size: usize,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(DELIVERY_CHANNEL_CAPACITY);
        let (reward_tx, reward_rx) = mpsc::channel(DELIVERY_CHANNEL_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(DELIVERY_CHANNEL_CAPACITY);

        Self {
            channel: channel.into(),
            host: host.into(),
            port,
            buffer: Arc::new(RingBuffer::new(buffer_size)),
            state: Arc::new(Mutex::new(ConnState::default())),
            stop_token: CancellationToken::new(),
            outbound: Mutex::new(Some(Outbound {
                messages: msg_tx,
                rewards: reward_tx,
                errors: error_tx,
            })),
            receivers: Mutex::new(Some(Receivers {
                messages: msg_rx,
                rewards: reward_rx,
                errors: error_rx,
            })),
            stream: Mutex::new(None),
        }
    }

    /// チャンネル名を取得
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// IRCサーバーにダイヤルしてハンドシェイクを行う
    ///
    /// 匿名ユーザー（justinfanXXXX）としてNICKを送り、チャンネルに
    /// JOINし、タグ/コマンド拡張のCAPを要求する。
    pub async fn connect(&self) -> Result<(), IrcError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        self.handshake(stream).await
    }

    async fn handshake(&self, mut stream: TcpStream) -> Result<(), IrcError> {
        let nick = format!("justinfan{}", rand::thread_rng().gen_range(1000..10000));

        stream
            .write_all(format!("NICK {}\r\n", nick).as_bytes())
            .await?;
        stream
            .write_all(format!("JOIN {}\r\n", self.channel).as_bytes())
            .await?;
        stream
            .write_all(b"CAP REQ :twitch.tv/tags twitch.tv/commands\r\n")
            .await?;

        *self.stream.lock().expect("stream lock poisoned") = Some(stream);

        {
            let mut state = self.state.lock().expect("state lock poisoned");
            state.connected = true;
            state.stopped = false;
        }

        log::info!("Connected to {} as {}", self.channel, nick);
        Ok(())
    }

    /// 読み取りループを独立タスクとして起動する
    pub fn start(&self) {
        let Some(stream) = self.stream.lock().expect("stream lock poisoned").take() else {
            log::warn!("start() called before connect() for {}", self.channel);
            return;
        };
        let Some(outbound) = self
            .outbound
            .lock()
            .expect("outbound lock poisoned")
            .clone()
        else {
            return;
        };

        let channel = self.channel.clone();
        let buffer = Arc::clone(&self.buffer);
        let state = Arc::clone(&self.state);
        let token = self.stop_token.clone();

        tokio::spawn(async move {
            read_loop(channel, stream, buffer, outbound, token).await;
            state.lock().expect("state lock poisoned").connected = false;
        });
    }

    /// 受信側ハンドルを取り出す（最初の1回だけSome）
    pub fn take_receivers(&self) -> Option<Receivers> {
        self.receivers.lock().expect("receivers lock poisoned").take()
    }

    /// 接続中かどうか
    pub fn is_connected(&self) -> bool {
        self.state.lock().expect("state lock poisoned").connected
    }

    /// 直近n件のメッセージ履歴
    pub fn recent_messages(&self, n: usize) -> Vec<Message> {
        self.buffer.get_last(n)
    }

    /// 全メッセージ履歴（時系列順）
    pub fn all_messages(&self) -> Vec<Message> {
        self.buffer.get_all()
    }

    /// 接続を停止する（冪等）
    ///
    /// stoppedフラグでガードし、ソケットを閉じ（読み取りループの
    /// ブロックを解除）、停止を通知し、短い猶予の後に送信側ハンドル
    /// を破棄して配信チャネルをちょうど1回だけ閉じる。
    /// 2回目以降の呼び出しは何もしない。
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().expect("state lock poisoned");
            if state.stopped {
                return;
            }
            state.stopped = true;
            state.connected = false;
        }

        // start()前に残っているストリームがあればここで閉じる。
        // 起動済みの読み取りループはトークンのキャンセルで抜ける
        // （selectが解除され、ループ側が持つストリームも破棄される）。
        self.stream.lock().expect("stream lock poisoned").take();
        self.stop_token.cancel();

        tokio::time::sleep(STOP_GRACE).await;

        // 最後の送信側ハンドルを落とすと受信側はクローズを観測する
        self.outbound.lock().expect("outbound lock poisoned").take();
        log::info!("Stopped connection for {}", self.channel);
    }
}

/// 読み取りループ本体
///
/// 1行ずつ読み、PINGには同じ接続上で即座にPONGを返す。
/// 報酬行・PRIVMSG行はパースして非ブロッキング配信。
/// 読み取り失敗（エラーまたはEOF）でエラーを配信して終了する。
async fn read_loop(
    channel: String,
    stream: TcpStream,
    buffer: Arc<RingBuffer>,
    outbound: Outbound,
    token: CancellationToken,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                log::debug!("Read loop cancelled for {}", channel);
                break;
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        try_deliver(&outbound.errors, IrcError::ConnectionClosed, "error", &channel);
                        break;
                    }
                    Err(e) => {
                        try_deliver(&outbound.errors, IrcError::Io(e), "error", &channel);
                        break;
                    }
                };

                if parser::is_ping(&line) {
                    log::info!("Got a PING -> sent a PONG for channel: {}", channel);
                    if let Err(e) = write_half
                        .write_all(format!("{}\r\n", parser::PONG_LINE).as_bytes())
                        .await
                    {
                        try_deliver(&outbound.errors, IrcError::Io(e), "error", &channel);
                        break;
                    }
                    continue;
                }

                if line.contains(parser::REWARD_MARKER) {
                    if let Some(reward) = parser::parse_reward(&line) {
                        try_deliver(&outbound.rewards, reward, "reward", &channel);
                    }
                }

                if line.contains(" PRIVMSG ") {
                    if let Some(msg) = parser::parse_privmsg(&line) {
                        buffer.add(msg.clone());
                        try_deliver(&outbound.messages, msg, "message", &channel);
                    }
                }
            }
        }
    }

    log::debug!("Read loop ended for {}", channel);
}

/// 非ブロッキング配信（満杯なら捨てる）
fn try_deliver<T>(tx: &mpsc::Sender<T>, item: T, kind: &str, channel: &str) {
    match tx.try_send(item) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            log::debug!("{} channel full for {}, dropping item", kind, channel);
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}
