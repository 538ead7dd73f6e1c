use chardetng::EncodingDetector;
use encoding_rs::{Encoding as RsEncoding, UTF_8};
use tabshell_settings::DecodePolicy;

/// Text produced from raw file bytes together with the encoding that was used.
/// 由原始位元組解碼而得的文字及其使用的編碼。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub encoding: &'static str,
    pub had_bom: bool,
}

/// Marker error: the bytes are not valid text under the active policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndecodableText;

/// Decodes file bytes according to `policy`.
/// 依照 `policy` 將檔案位元組解碼為文字。
pub fn decode_text(bytes: &[u8], policy: DecodePolicy) -> Result<DecodedText, UndecodableText> {
    match policy {
        DecodePolicy::Strict => std::str::from_utf8(bytes)
            .map(|text| DecodedText {
                text: text.to_owned(),
                encoding: UTF_8.name(),
                had_bom: false,
            })
            .map_err(|_| UndecodableText),
        DecodePolicy::Detect => detect_and_decode(bytes),
    }
}

fn detect_and_decode(bytes: &[u8]) -> Result<DecodedText, UndecodableText> {
    if let Some((encoding, bom_len)) = RsEncoding::for_bom(bytes) {
        return decode_with(encoding, &bytes[bom_len..], true);
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(DecodedText {
            text: text.to_owned(),
            encoding: UTF_8.name(),
            had_bom: false,
        });
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let guess = detector.guess(None, false);
    decode_with(guess, bytes, false)
}

fn decode_with(
    encoding: &'static RsEncoding,
    bytes: &[u8],
    had_bom: bool,
) -> Result<DecodedText, UndecodableText> {
    let text = encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .ok_or(UndecodableText)?;
    Ok(DecodedText {
        text: text.into_owned(),
        encoding: encoding.name(),
        had_bom,
    })
}
