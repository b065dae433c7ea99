use thiserror::Error;

/// エモート取得・変換まわりのエラー
#[derive(Debug, Error)]
pub enum EmoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned status {status} for {url}")]
    Api { status: u16, url: String },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("animation has no frames")]
    EmptyAnimation,

    #[error("emote has no downloadable URL: {0}")]
    MissingUrl(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
