use std::io::Cursor;

use image::codecs::gif::GifDecoder;
use image::imageops::FilterType;
use image::{AnimationDecoder, DynamicImage, ImageFormat};

use super::errors::EmoteError;

/// 保存するエモート画像の高さ上限（px）
pub const MAX_EMOTE_HEIGHT: u32 = 32;

/// バイト列を静止画像としてデコードする
///
/// GIFは先頭フレームだけを取り出す。それ以外はそのままデコード。
pub fn decode_first_frame(bytes: &[u8]) -> Result<DynamicImage, EmoteError> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Gif) => {
            let decoder = GifDecoder::new(Cursor::new(bytes))?;
            let frame = decoder
                .into_frames()
                .next()
                .ok_or(EmoteError::EmptyAnimation)??;
            Ok(DynamicImage::ImageRgba8(frame.into_buffer()))
        }
        _ => Ok(image::load_from_memory(bytes)?),
    }
}

/// 高さが上限を超える画像をアスペクト比を保って縮小する
pub fn clamp_height(img: DynamicImage) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    if height <= MAX_EMOTE_HEIGHT {
        return img;
    }

    let scale = f64::from(MAX_EMOTE_HEIGHT) / f64::from(height);
    let new_width = ((f64::from(width) * scale) as u32).max(1);
    img.resize_exact(new_width, MAX_EMOTE_HEIGHT, FilterType::CatmullRom)
}
