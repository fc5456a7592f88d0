use crate::utils::Result;
use bytes::Bytes;
use encoding_rs::{Encoding, UTF_8};
use flate2::read::DeflateDecoder;
use flate2::read::GzDecoder;
use std::io::Read;
use tracing::warn;

pub const ENC_GZIP: &str = "gzip";
pub const ENC_X_GZIP: &str = "x-gzip";
pub const ENC_DEFLATE: &str = "deflate";
pub const ENC_ZSTD: &str = "zstd";

pub fn decode_gzip(data: &[u8]) -> Result<Bytes> {
    let mut decoder = GzDecoder::new(data);
    let mut decoded_data = Vec::new();
    decoder.read_to_end(&mut decoded_data)?;
    Ok(Bytes::from(decoded_data))
}

pub fn decode_deflate(data: &[u8]) -> Result<Bytes> {
    let mut decoder = DeflateDecoder::new(data);
    let mut decoded_data = Vec::new();
    decoder.read_to_end(&mut decoded_data)?;
    Ok(Bytes::from(decoded_data))
}

pub fn decode_zstd(data: &[u8]) -> Result<Bytes> {
    let decoded_data = zstd::decode_all(data)?;
    Ok(Bytes::from(decoded_data))
}

/// Undoes a `Content-Encoding` the server applied. Unknown or absent
/// encodings pass the bytes through unchanged.
pub fn decompress(data: &[u8], content_encoding: Option<&str>) -> Result<Bytes> {
    let encoding = content_encoding
        .map(|e| e.trim().to_ascii_lowercase())
        .unwrap_or_default();

    match encoding.as_str() {
        ENC_GZIP | ENC_X_GZIP => decode_gzip(data),
        ENC_DEFLATE => decode_deflate(data),
        ENC_ZSTD => decode_zstd(data),
        _ => Ok(Bytes::copy_from_slice(data)),
    }
}

/// Pulls the `charset=` parameter out of a `Content-Type` value.
pub fn charset(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"'))
        } else {
            None
        }
    })
}

/// Turns body bytes into display text. Never fails: bytes that are not
/// valid in the declared charset (or UTF-8 when none is declared) come out
/// with replacement characters.
pub fn decode_text(data: &[u8], charset: Option<&str>) -> String {
    let encoding = charset
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);

    if encoding == UTF_8 {
        return String::from_utf8_lossy(data).into_owned();
    }

    let (text, _, _) = encoding.decode(data);
    text.into_owned()
}

/// Display text for a response body given its `Content-Encoding` and
/// `Content-Type` headers. A body that fails to decompress is shown as-is.
pub fn decode_body(data: &[u8], content_encoding: Option<&str>, content_type: Option<&str>) -> String {
    let bytes = match decompress(data, content_encoding) {
        Ok(b) => b,
        Err(e) => {
            warn!(
                encoding = content_encoding.unwrap_or_default(),
                "failed to decompress body, showing raw bytes: {e}"
            );
            Bytes::copy_from_slice(data)
        }
    };

    decode_text(&bytes, content_type.and_then(charset))
}
