//! 受信専用のTwitchマルチチャンネルチャットコア
//!
//! 匿名IRC接続で複数チャンネルのチャットを同時に受信し、
//! エモート解決とハイライト判定を済ませたメッセージを
//! シグナルとして埋め込み側へ流す。
//!
//! ```no_run
//! use multichat::{ChatSupervisor, Settings, Signal};
//!
//! # async fn run() {
//! let settings = Settings::with_channels(["somechannel"]);
//! let (supervisor, mut signals) = ChatSupervisor::new(settings);
//!
//! supervisor.start_live_status_monitoring();
//! supervisor.connect_all().await.unwrap();
//!
//! while let Some(signal) = signals.recv().await {
//!     if let Signal::NewMessage { message } = signal {
//!         println!("{}: {}", message.message.username, message.message.content);
//!     }
//! }
//! # }
//! ```

pub mod config;
pub mod emotes;
pub mod irc;
pub mod supervisor;

pub use config::Settings;
pub use supervisor::{AnnotatedMessage, ChatSupervisor, Signal, SupervisorError};
