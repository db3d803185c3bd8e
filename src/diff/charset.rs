//! Character set detection for stored bodies

use std::sync::LazyLock;

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, ISO_8859_2, UTF_8, WINDOWS_1250, WINDOWS_1252};
use regex::bytes::Regex;
use tracing::debug;

use crate::diff::DiffError;
use crate::store::types::ContentBlob;

/// Tried in order when detection is inconclusive
///
/// The single-byte encodings at the end map every byte, so with this list
/// `decode` never returns `DiffError::Decode` in practice.
fn fallback_encodings() -> [&'static Encoding; 4] {
    [UTF_8, ISO_8859_2, WINDOWS_1250, WINDOWS_1252]
}

/// Markup declarations are only honoured near the top of the document
const META_SCAN_LIMIT: usize = 1024;

static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([A-Za-z0-9_\-:.]+)"#).unwrap()
});

/// Decode `bytes` strictly; `None` when they are not valid in `encoding`
fn try_decode(encoding: &'static Encoding, bytes: &[u8]) -> Option<String> {
    let (encoding, bytes) = match Encoding::for_bom(bytes) {
        Some((bom_encoding, bom_length)) => (bom_encoding, &bytes[bom_length..]),
        None => (encoding, bytes),
    };
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
}

/// Charset declared by a `<meta>` element
fn sniff_meta_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(META_SCAN_LIMIT)];
    let captures = META_CHARSET.captures(head)?;
    Encoding::for_label(captures.get(1)?.as_bytes())
}

fn detect(bytes: &[u8]) -> &'static Encoding {
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    detector.guess(None, true)
}

/// Decode the body of a blob to text
///
/// Order: declared charset, `<meta>` charset (HTML only), statistical
/// detection, then the fallback list. Failing all of them is fatal.
pub fn decode(blob: &ContentBlob) -> Result<String, DiffError> {
    let bytes = blob.data.as_slice();

    let declared = blob
        .charset()
        .and_then(|label| Encoding::for_label(label.as_bytes()));
    let meta = (blob.mime_type() == "text/html")
        .then(|| sniff_meta_charset(bytes))
        .flatten();

    for encoding in declared.into_iter().chain(meta) {
        if let Some(text) = try_decode(encoding, bytes) {
            return Ok(text);
        }
        debug!("Declared charset {} does not decode content", encoding.name());
    }

    let guessed = detect(bytes);
    if let Some(text) = try_decode(guessed, bytes) {
        return Ok(text);
    }
    debug!("Detected charset {} is inconclusive", guessed.name());

    fallback_encodings()
        .into_iter()
        .find_map(|encoding| try_decode(encoding, bytes))
        .ok_or_else(|| DiffError::Decode(format!("no candidate charset decodes {} bytes", bytes.len())))
}
