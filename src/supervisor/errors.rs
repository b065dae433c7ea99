use thiserror::Error;

use crate::irc::IrcError;

/// セッション管理のエラー
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to connect to {channel}: {source}")]
    Connect {
        channel: String,
        #[source]
        source: IrcError,
    },

    #[error("not connected to {0}")]
    NotConnected(String),

    #[error("channel already registered: {0}")]
    AlreadyRegistered(String),

    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// 一斉接続で1つも成功しなかった
    #[error("all connection attempts failed: {}", format_failures(.0))]
    AllConnectionsFailed(Vec<(String, String)>),
}

impl SupervisorError {
    /// 一斉接続の失敗一覧（該当しないバリアントでは空）
    pub fn failures(&self) -> &[(String, String)] {
        match self {
            SupervisorError::AllConnectionsFailed(failures) => failures,
            _ => &[],
        }
    }
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(channel, error)| format!("{}: {}", channel, error))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_error_lists_each_channel() {
        let err = SupervisorError::AllConnectionsFailed(vec![
            ("#a".to_string(), "connection refused".to_string()),
            ("#b".to_string(), "timed out".to_string()),
        ]);

        let text = err.to_string();
        assert!(text.contains("#a: connection refused"));
        assert!(text.contains("#b: timed out"));
        assert_eq!(err.failures().len(), 2);
    }
}
