//! Text extraction for content scanning.
//!
//! Files on the shop floor are written by whatever the machine control
//! exports: UTF-8 with or without a byte-order mark, or UTF-16 in either
//! endianness. The decoder sniffs the leading bytes and falls back to lossy
//! UTF-8. A file that is locked by its writer is retried a bounded number
//! of times; any unreadable file decodes to the empty string so a content
//! scan degrades to "no content" instead of failing the event pipeline.

use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

const LOCK_RETRIES: u32 = 3;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Read and decode a file to text, retrying while the writer holds a lock.
///
/// Returns an empty string on any unrecoverable error.
pub async fn read_text(path: &Path) -> String {
    let mut attempt = 0;
    loop {
        match tokio::fs::read(path).await {
            Ok(bytes) => return decode(&bytes),
            Err(err) if is_lock_error(&err) && attempt < LOCK_RETRIES => {
                attempt += 1;
                debug!(
                    path = %path.display(),
                    attempt,
                    "file locked, retrying content read"
                );
                tokio::time::sleep(LOCK_RETRY_DELAY).await;
            }
            Err(err) => {
                debug!(path = %path.display(), error = %err, "content read failed");
                return String::new();
            }
        }
    }
}

/// Decode raw bytes using the byte-order mark, defaulting to UTF-8.
pub fn decode(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        String::from_utf8_lossy(&bytes[3..]).into_owned()
    } else if bytes.starts_with(&[0xFF, 0xFE]) {
        decode_utf16(&bytes[2..], u16::from_le_bytes)
    } else if bytes.starts_with(&[0xFE, 0xFF]) {
        decode_utf16(&bytes[2..], u16::from_be_bytes)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

fn decode_utf16(bytes: &[u8], read_unit: fn([u8; 2]) -> u16) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(|pair| read_unit([pair[0], pair[1]]));
    char::decode_utf16(units)
        .map(|unit| unit.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Sharing violations surface as `PermissionDenied` on Windows (raw code 32)
/// and `WouldBlock` elsewhere.
fn is_lock_error(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::PermissionDenied | ErrorKind::WouldBlock
    ) || err.raw_os_error() == Some(32)
}
