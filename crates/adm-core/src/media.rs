//! Audio attachment detection.
//!
//! A message attachment counts as audio if any of: its declared filename has
//! an audio extension, its MIME type looks like audio, or it carries audio
//! attributes (duration, title, performer).

use crate::client::AudioAttachment;

/// Extensions recognized as audio, lowercase, without the dot.
pub const AUDIO_EXTENSIONS: &[&str] =
    &["mp3", "m4a", "ogg", "flac", "wav", "opus", "aac", "wma"];

fn has_audio_extension(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| {
            let ext = ext.to_ascii_lowercase();
            AUDIO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn is_audio_mime(mime: &str) -> bool {
    let mime = mime.to_ascii_lowercase();
    mime.starts_with("audio/") || mime.contains("mpeg")
}

/// Decide whether an attachment is an audio file worth downloading.
pub fn is_audio_attachment(att: &AudioAttachment) -> bool {
    if att
        .file_name
        .as_deref()
        .map(has_audio_extension)
        .unwrap_or(false)
    {
        return true;
    }
    if att.mime_type.as_deref().map(is_audio_mime).unwrap_or(false) {
        return true;
    }
    att.duration_secs.is_some() || att.title.is_some() || att.performer.is_some()
}

/// Extension (with dot) to append to templated names, derived from the
/// declared filename and falling back to the MIME subtype.
pub fn preferred_extension(att: &AudioAttachment) -> String {
    if let Some(name) = att.file_name.as_deref() {
        if let Some((_, ext)) = name.rsplit_once('.') {
            if !ext.is_empty() && ext.len() <= 5 {
                return format!(".{}", ext.to_ascii_lowercase());
            }
        }
    }
    match att.mime_type.as_deref() {
        Some(m) if m.eq_ignore_ascii_case("audio/mpeg") => ".mp3".to_string(),
        Some(m) if m.eq_ignore_ascii_case("audio/flac") => ".flac".to_string(),
        Some(m) if m.eq_ignore_ascii_case("audio/ogg") => ".ogg".to_string(),
        Some(m) if m.eq_ignore_ascii_case("audio/mp4") => ".m4a".to_string(),
        Some(m) if m.eq_ignore_ascii_case("audio/wav") => ".wav".to_string(),
        _ => ".mp3".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RemoteFileRef;

    fn attachment(
        file_name: Option<&str>,
        mime: Option<&str>,
        duration: Option<i64>,
    ) -> AudioAttachment {
        AudioAttachment {
            file: RemoteFileRef {
                file_id: 1,
                reference: "ref".to_string(),
            },
            declared_size: 1024,
            file_name: file_name.map(str::to_string),
            mime_type: mime.map(str::to_string),
            duration_secs: duration,
            title: None,
            performer: None,
        }
    }

    #[test]
    fn detects_by_extension() {
        assert!(is_audio_attachment(&attachment(Some("song.MP3"), None, None)));
        assert!(is_audio_attachment(&attachment(Some("a.flac"), None, None)));
        assert!(!is_audio_attachment(&attachment(Some("doc.pdf"), None, None)));
    }

    #[test]
    fn detects_by_mime() {
        assert!(is_audio_attachment(&attachment(None, Some("audio/ogg"), None)));
        assert!(is_audio_attachment(&attachment(None, Some("video/mpeg"), None)));
        assert!(!is_audio_attachment(&attachment(None, Some("image/png"), None)));
    }

    #[test]
    fn detects_by_audio_attribute() {
        assert!(is_audio_attachment(&attachment(None, None, Some(180))));
        assert!(!is_audio_attachment(&attachment(None, None, None)));
    }

    #[test]
    fn preferred_extension_prefers_filename() {
        assert_eq!(preferred_extension(&attachment(Some("x.OPUS"), None, None)), ".opus");
        assert_eq!(
            preferred_extension(&attachment(None, Some("audio/flac"), None)),
            ".flac"
        );
        assert_eq!(preferred_extension(&attachment(None, None, None)), ".mp3");
    }
}
