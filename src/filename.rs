//! # 建议文件名推导
//!
//! 根据图片来源 URL 推导下载对话框里的默认文件名。纯函数，无副作用，
//! 对任意输入（包括空串与畸形百分号编码）都不会 panic。

use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;

/// 文件名主体（不含扩展名）的最大字符数。
const MAX_STEM_CHARS: usize = 32;

/// 应用商店截图一类的长不透明 ID 链接。
static OPAQUE_HOSTED_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"googleusercontent\.com/[0-9a-zA-Z]{30,}").expect("valid regex"));
static QUERY_OR_FRAGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[?#].*").expect("valid regex"));
static PATH_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r".*/").expect("valid regex"));
static DOT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.[^0-9a-z]*\.").expect("valid regex"));
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s\s+").expect("valid regex"));
static IMAGE_EXTENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(jpe?g|png|gif|webp|svg)$").expect("valid regex"));

/// 推导建议文件名，结果恒以 `.<target_type>` 结尾。
///
/// # 示例
/// ```rust
/// use save_image_as_type::filename::derive_filename;
///
/// assert_eq!(
///     derive_filename("https://img.example.com/path/My+Photo.JPG?x=1", "png"),
///     "My Photo.png"
/// );
/// assert_eq!(derive_filename("", "jpg"), "image.jpg");
/// ```
pub fn derive_filename(source_url: &str, target_type: &str) -> String {
    if OPAQUE_HOSTED_IMAGE.is_match(source_url) {
        return format!("screenshot.{}", target_type);
    }
    if source_url.starts_with("blob:") || source_url.starts_with("data:") {
        return format!("Untitled.{}", target_type);
    }

    let stem = derive_stem(source_url);
    let stem = if stem.is_empty() { "image" } else { stem.as_str() };
    format!("{}.{}", stem, target_type)
}

fn derive_stem(source_url: &str) -> String {
    let name = QUERY_OR_FRAGMENT.replacen(source_url, 1, "");
    let name = PATH_PREFIX.replacen(&name, 1, "");
    let name = name.replace('+', " ");
    let name = percent_decode_str(&name).decode_utf8_lossy();

    // 只过滤 ASCII 区间，非 ASCII 字符（中文等）原样保留
    let mut name: String = name
        .chars()
        .filter(|c| !c.is_ascii() || c.is_ascii_alphanumeric() || "_-.,@ ".contains(*c))
        .collect();

    while DOT_RUN.is_match(&name) {
        name = DOT_RUN.replace_all(&name, ".").into_owned();
    }

    let name = WHITESPACE_RUN.replace_all(&name, " ");
    let name = IMAGE_EXTENSION.replace(name.trim(), "");
    let name = name.trim();

    let truncated: String = name.chars().take(MAX_STEM_CHARS).collect();
    truncated
        .trim_end_matches(|c: char| !c.is_ascii_alphanumeric())
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn plain_url_keeps_last_segment_and_drops_query() {
        assert_eq!(
            derive_filename("https://img.example.com/path/My+Photo.JPG?x=1", "png"),
            "My Photo.png"
        );
    }

    #[test]
    fn empty_source_falls_back_to_image() {
        assert_eq!(derive_filename("", "jpg"), "image.jpg");
    }

    #[test]
    fn inline_and_blob_sources_are_untitled() {
        assert_eq!(derive_filename("data:image/png;base64,AAAA", "webp"), "Untitled.webp");
        assert_eq!(
            derive_filename("blob:https://example.com/5b1c-44", "png"),
            "Untitled.png"
        );
    }

    #[test]
    fn store_screenshot_urls_are_named_screenshot() {
        let url = "https://lh3.googleusercontent.com/AbCdEfGhIjKlMnOpQrStUvWxYz0123456789=w640";
        assert_eq!(derive_filename(url, "jpg"), "screenshot.jpg");
    }

    #[test]
    fn percent_encoded_unicode_is_decoded_and_kept() {
        assert_eq!(
            derive_filename("https://example.com/%E7%8C%AB%E5%92%AA-cat.png", "jpg"),
            "猫咪-cat.jpg"
        );
    }

    #[test]
    fn malformed_percent_escape_does_not_fail() {
        assert_eq!(derive_filename("https://example.com/100%zz.png", "png"), "100zz.png");
    }

    #[test]
    fn disallowed_ascii_is_stripped_and_dot_runs_collapse() {
        assert_eq!(
            derive_filename("https://example.com/a<b>c..!!..d.webp#frag", "png"),
            "abc.d.png"
        );
    }

    #[test]
    fn whitespace_runs_collapse() {
        assert_eq!(
            derive_filename("https://example.com/hello%20%20%20world.gif", "png"),
            "hello world.png"
        );
    }

    #[test]
    fn long_names_are_truncated_then_trailing_symbols_trimmed() {
        let url = "https://example.com/abcdefghijklmnopqrstuvwxyz-1234-_x.png";
        // 截断到 32 字符后以 "-1234-" 结尾，末尾的 "-" 被去掉
        assert_eq!(derive_filename(url, "png"), "abcdefghijklmnopqrstuvwxyz-1234.png");
    }

    #[test]
    fn only_symbols_fall_back_to_image() {
        assert_eq!(derive_filename("https://example.com/---.png", "webp"), "image.webp");
        assert_eq!(derive_filename("https://example.com/", "webp"), "image.webp");
    }

    proptest! {
        #[test]
        fn always_ends_with_target_extension(source in ".*", target in "(jpg|png|webp)") {
            let name = derive_filename(&source, &target);
            let suffix = format!(".{}", target);
            prop_assert!(name.ends_with(&suffix));
            prop_assert!(name.len() > suffix.len());
        }

        #[test]
        fn is_deterministic(source in "\\PC*") {
            prop_assert_eq!(derive_filename(&source, "png"), derive_filename(&source, "png"));
        }
    }
}
