use anyhow::bail;
use std::io::Read;

pub type Result<T> = anyhow::Result<T>;

/// Cap on a caller-supplied request description (JSON body, `--request`
/// file or piped stdin). Subprocess output is not capped.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Reads everything from `input`, giving up as soon as more than
/// `MAX_BODY_BYTES` arrive.
pub fn read_capped<R: Read>(input: R) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    input
        .take(MAX_BODY_BYTES as u64 + 1)
        .read_to_end(&mut buffer)?;

    if buffer.len() > MAX_BODY_BYTES {
        bail!("Request body too large.");
    }
    Ok(buffer)
}

/// Same as `read_capped`, returning `None` for empty input.
pub fn read_capped_text<R: Read>(input: R) -> Result<Option<String>> {
    let buffer = read_capped(input)?;
    if buffer.is_empty() {
        Ok(None)
    } else {
        Ok(Some(String::from_utf8(buffer)?))
    }
}

/// Splits a `name=value` command-line pair. The value may itself contain `=`.
pub fn split_pair(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{s}'")),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn read_capped_accepts_exactly_the_limit() {
        let data = vec![b'x'; MAX_BODY_BYTES];
        let read = read_capped(data.as_slice()).unwrap();
        assert_eq!(read.len(), MAX_BODY_BYTES);
    }

    #[test]
    fn read_capped_rejects_one_byte_more() {
        let data = vec![b'x'; MAX_BODY_BYTES + 1];
        let err = read_capped(data.as_slice()).unwrap_err();
        assert_eq!(err.to_string(), "Request body too large.");
    }

    #[test]
    fn read_capped_text_maps_empty_to_none() {
        assert_eq!(read_capped_text(&b""[..]).unwrap(), None);
        assert_eq!(
            read_capped_text(&b"{\"a\":1}"[..]).unwrap(),
            Some("{\"a\":1}".to_string())
        );
    }

    #[test]
    fn split_pair_keeps_equals_in_value() {
        assert_eq!(
            split_pair("filter=a=b").unwrap(),
            ("filter".to_string(), "a=b".to_string())
        );
        assert_eq!(
            split_pair("empty=").unwrap(),
            ("empty".to_string(), String::new())
        );
        assert!(split_pair("novalue").is_err());
        assert!(split_pair("=x").is_err());
    }
}
