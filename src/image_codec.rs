use std::io::Cursor;

use base64::{Engine, engine::general_purpose::STANDARD};
use image::{DynamicImage, codecs::jpeg::JpegEncoder};

const REENCODE_QUALITY: u8 = 80;
const MAX_REENCODE_PASSES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime_type: String,
    pub payload: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("expected data:<mime>;base64,<payload> ({0})")]
pub struct InvalidDataUri(pub String);

/// Decoded size of a base64 string, without decoding it.
pub fn estimated_decoded_len(encoded: &str) -> usize {
    let trimmed = encoded.trim_end();
    let padding = trimmed.chars().rev().take_while(|c| *c == '=').count().min(2);
    (trimmed.len() * 3 / 4).saturating_sub(padding)
}

/// Returns `encoded` unchanged when it fits in `max_kb`, otherwise a
/// 4-aligned prefix sized to the budget.
///
/// The truncated form is usually not a decodable image. Callers treat it as a
/// best-effort payload the provider may reject.
pub fn ensure_within_size_budget(encoded: &str, max_kb: usize) -> String {
    let budget_bytes = max_kb.saturating_mul(1024);
    if estimated_decoded_len(encoded) <= budget_bytes {
        return encoded.to_string();
    }
    let max_chars = budget_bytes.saturating_mul(4) / 3;
    let aligned = max_chars - max_chars % 4;
    tracing::warn!(
        original_len = encoded.len(),
        truncated_len = aligned,
        max_kb,
        "photo over budget, truncating base64 payload"
    );
    // base64 is ASCII; anything else still gets cut on a char boundary
    let mut cut = aligned.min(encoded.len());
    while cut > 0 && (cut % 4 != 0 || !encoded.is_char_boundary(cut)) {
        cut -= 1;
    }
    encoded[..cut].to_string()
}

/// Whether `encoded` is a non-empty, standard base64 payload.
pub fn is_base64_payload(encoded: &str) -> bool {
    let trimmed = encoded.trim();
    !trimmed.is_empty() && STANDARD.decode(trimmed).is_ok()
}

/// Fits a base64 photo into `max_kb`. Tries a JPEG re-encode at decreasing
/// dimensions first and only truncates when that is impossible.
pub fn shrink_photo(encoded: &str, max_kb: usize) -> String {
    let budget_bytes = max_kb.saturating_mul(1024);
    if estimated_decoded_len(encoded) <= budget_bytes {
        return encoded.to_string();
    }
    match reencode_to_budget(encoded, budget_bytes) {
        Some(smaller) => smaller,
        None => ensure_within_size_budget(encoded, max_kb),
    }
}

fn reencode_to_budget(encoded: &str, budget_bytes: usize) -> Option<String> {
    let bytes = STANDARD.decode(encoded.trim()).ok()?;
    let mut image = image::load_from_memory(&bytes).ok()?;
    for pass in 0..MAX_REENCODE_PASSES {
        if pass > 0 {
            let (width, height) = (image.width() / 2, image.height() / 2);
            if width == 0 || height == 0 {
                return None;
            }
            image = image.thumbnail(width, height);
        }
        let jpeg = encode_jpeg(&image)?;
        if jpeg.len() <= budget_bytes {
            tracing::debug!(pass, size = jpeg.len(), "photo re-encoded within budget");
            return Some(STANDARD.encode(jpeg));
        }
    }
    None
}

fn encode_jpeg(image: &DynamicImage) -> Option<Vec<u8>> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut output = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut output), REENCODE_QUALITY);
    rgb.write_with_encoder(encoder).ok()?;
    Some(output)
}

pub fn parse_data_uri(raw: &str) -> Result<DataUri, InvalidDataUri> {
    let rest = raw
        .strip_prefix("data:")
        .ok_or_else(|| InvalidDataUri("missing data: scheme".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| InvalidDataUri("missing payload separator".to_string()))?;
    let mime_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| InvalidDataUri("payload is not base64".to_string()))?;
    if mime_type.is_empty() || !mime_type.contains('/') {
        return Err(InvalidDataUri(format!("bad mime type '{mime_type}'")));
    }
    if payload.is_empty() {
        return Err(InvalidDataUri("empty payload".to_string()));
    }
    Ok(DataUri {
        mime_type: mime_type.to_ascii_lowercase(),
        payload: payload.to_string(),
    })
}

pub fn to_data_uri(mime_type: &str, payload: &str) -> String {
    format!("data:{mime_type};base64,{payload}")
}

/// Client photos arrive either as data URIs or as bare base64.
pub fn photo_payload(raw: &str) -> &str {
    match raw.split_once(";base64,") {
        Some((head, payload)) if head.starts_with("data:") => payload,
        _ => raw,
    }
}

pub fn detect_mime_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    if bytes.starts_with(b"BM") {
        return Some("image/bmp");
    }
    None
}
