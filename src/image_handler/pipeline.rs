//! # 解码与重新编码流水线
//!
//! ## 设计思路
//!
//! 将“data URL → 图像 → 目标格式字节”的过程集中管理，并在完整解码前先做尺寸检查，
//! 降低恶意输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 拒绝 SVG 等矢量来源，解出 data URL 字节，猜测格式并读取 header 尺寸
//! 2. 按像素/内存上限快速拒绝
//! 3. 完整解码
//! 4. JPEG 没有透明通道，先合成到白色背景上
//! 5. 按目标格式编码，重新包装为 data URL

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageReader, Rgb, RgbImage};
use std::io::Cursor;
use std::time::Instant;

use super::source::DataUrl;
use super::{ImageConfig, ImageError, ImageHandler};
use crate::protocol::ImageType;

const SVG_MIME: &str = "image/svg+xml";

impl ImageHandler {
    /// 把 data URL 重新编码为目标格式。
    pub fn reencode(&self, source: &DataUrl, target: ImageType) -> Result<DataUrl, ImageError> {
        let start = Instant::now();
        if source.mime().eq_ignore_ascii_case(SVG_MIME) {
            return Err(ImageError::UnsupportedSource(
                "SVG 矢量图无法在后台栅格化".to_string(),
            ));
        }
        let bytes = source.decode_bytes()?;
        let decoded = self.decode_with_limits(&bytes)?;
        let (width, height) = decoded.dimensions();

        let encoded = encode(&decoded, target, &self.config)?;

        log::info!(
            "✅ 重新编码完成 - {} -> {} 尺寸: {}x{} 输出: {} 字节 耗时: {}ms",
            source.mime(),
            target.mime(),
            width,
            height,
            encoded.len(),
            start.elapsed().as_millis()
        );

        Ok(DataUrl::from_bytes(target.mime(), &encoded))
    }

    fn decode_with_limits(&self, bytes: &[u8]) -> Result<DynamicImage, ImageError> {
        let (header_width, header_height) = inspect_dimensions_from_memory(bytes)?;
        validate_limits(&self.config, header_width, header_height)?;

        let decoded = image::load_from_memory(bytes)
            .map_err(|e| ImageError::Decode(format!("图片解码失败：{}", e)))?;

        let (width, height) = decoded.dimensions();
        validate_limits(&self.config, width, height)?;
        Ok(decoded)
    }
}

/// 仅通过图片头信息读取宽高。
fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::InvalidFormat(format!("无法识别图片格式：{}", e)))?;

    reader
        .into_dimensions()
        .map_err(|e| ImageError::InvalidFormat(format!("无法读取图片尺寸：{}", e)))
}

/// 校验像素数量与按 RGBA 估算的解码内存。
fn validate_limits(config: &ImageConfig, width: u32, height: u32) -> Result<(), ImageError> {
    let pixels = (width as u64)
        .checked_mul(height as u64)
        .ok_or_else(|| ImageError::ResourceLimit("图片像素数溢出".to_string()))?;

    if pixels > config.max_decoded_pixels {
        return Err(ImageError::ResourceLimit(format!(
            "图片像素过大：{} 像素（限制：{} 像素）",
            pixels, config.max_decoded_pixels
        )));
    }

    let estimated = pixels
        .checked_mul(4)
        .ok_or_else(|| ImageError::ResourceLimit("图片解码内存估算溢出".to_string()))?;
    if estimated > config.max_decoded_bytes {
        return Err(ImageError::ResourceLimit(format!(
            "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
            estimated as f64 / 1024.0 / 1024.0,
            config.max_decoded_bytes as f64 / 1024.0 / 1024.0
        )));
    }

    Ok(())
}

fn encode(image: &DynamicImage, target: ImageType, config: &ImageConfig) -> Result<Vec<u8>, ImageError> {
    let mut out = Cursor::new(Vec::new());
    match target {
        ImageType::Jpg => {
            let flattened = flatten_on_white(image);
            let quality = config.jpeg_quality.clamp(1, 100);
            JpegEncoder::new_with_quality(&mut out, quality)
                .encode_image(&flattened)
                .map_err(|e| ImageError::Encode(format!("JPEG 编码失败：{}", e)))?;
        }
        ImageType::Png | ImageType::Webp => {
            // WebP 编码器只支持 8 位 RGB(A)
            let normalized = DynamicImage::ImageRgba8(image.to_rgba8());
            normalized
                .write_to(&mut out, target.image_format())
                .map_err(|e| ImageError::Encode(format!("{} 编码失败：{}", target.label(), e)))?;
        }
    }
    Ok(out.into_inner())
}

/// 按 alpha 与白色背景混合，输出不带透明通道的 RGB。
fn flatten_on_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let blend = |c: u8| -> u8 {
            let alpha = a as u32;
            ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8
        };
        Rgb([blend(r), blend(g), blend(b)])
    })
}
