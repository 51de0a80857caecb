//! Multipart upload helpers.

use scriberr_domain::{Error, Result};

/// Longest accepted stored filename.
const MAX_NAME_LEN: usize = 255;

/// Sanitize a client-supplied filename for storage under
/// `uploads/<jobID>/`: percent-decode, strip any path components, drop
/// control characters, and cap the length. Falls back to `"audio"` when
/// nothing survives.
pub fn sanitize_filename(raw: &str) -> String {
    let decoded = percent_decode(raw);

    // Last path component only, for both separator conventions.
    let base = decoded
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim()
        .trim_start_matches('.');

    let mut clean: String = base
        .chars()
        .filter(|c| !c.is_control() && *c != '\0')
        .collect();

    if clean.len() > MAX_NAME_LEN {
        clean.truncate(MAX_NAME_LEN);
    }
    if clean.is_empty() {
        return "audio".to_string();
    }
    clean
}

/// Minimal percent-decoder; invalid escapes pass through literally.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
            ) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Accept only plausible audio uploads by extension; the engines see the
/// real container anyway, this just rejects obvious junk early.
pub fn validate_audio_extension(name: &str) -> Result<()> {
    const ACCEPTED: &[&str] = &[
        "wav", "mp3", "m4a", "mp4", "flac", "ogg", "opus", "webm", "aac",
    ];
    let ext = name
        .rsplit('.')
        .next()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if ACCEPTED.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "unsupported audio format {ext:?}; accepted: {}",
            ACCEPTED.join(", ")
        )))
    }
}

/// Content type for serving stored audio back.
pub fn audio_content_type(name: &str) -> &'static str {
    match name.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("flac") => "audio/flac",
        Some("ogg") | Some("opus") => "audio/ogg",
        Some("webm") => "audio/webm",
        Some("aac") => "audio/aac",
        _ => "application/octet-stream",
    }
}
