//! Media reference parsing for user-entered video links.
//!
//! Recognized shapes (the identifier follows the last marker found):
//! - canonical watch links: `.../watch?v=<id>` and `...&v=<id>`
//! - short links: `youtu.be/<id>`
//! - embed links: `.../embed/<id>` and `.../v/<id>`
//! - channel-relative links: `.../u/<c>/<id>` where `<c>` is one word character

/// Length of a canonical media identifier.
pub const MEDIA_ID_LEN: usize = 11;

const ID_MARKERS: [&str; 5] = ["watch?v=", "&v=", "embed/", "v/", "youtu.be/"];

fn is_id_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}

fn is_word_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Returns the byte length of the marker starting at `at`, if any.
fn marker_len_at(raw: &str, at: usize) -> Option<usize> {
    let rest = &raw[at..];
    if let Some(marker) = ID_MARKERS.iter().find(|marker| rest.starts_with(**marker)) {
        return Some(marker.len());
    }
    let bytes = rest.as_bytes();
    if bytes.len() >= 4
        && bytes[0] == b'u'
        && bytes[1] == b'/'
        && is_word_char(bytes[2])
        && bytes[3] == b'/'
    {
        return Some(4);
    }
    None
}

/// Returns the text following the right-most recognized marker.
fn candidate_after_last_marker(raw: &str) -> Option<&str> {
    let start = raw
        .char_indices()
        .rev()
        .find_map(|(at, _)| marker_len_at(raw, at).map(|len| at + len))?;
    let tail = &raw[start..];
    let end = tail.find(['#', '&', '?']).unwrap_or(tail.len());
    Some(&tail[..end])
}

/// Returns true if `candidate` has the canonical identifier shape.
pub fn is_canonical_media_id(candidate: &str) -> bool {
    candidate.len() == MEDIA_ID_LEN && candidate.chars().all(is_id_char)
}

/// Extracts the canonical media identifier embedded in `reference`.
///
/// Returns `None` for blank input, unrecognized shapes, and candidates that are
/// not exactly [`MEDIA_ID_LEN`] identifier characters.
pub fn extract_media_id(reference: &str) -> Option<String> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return None;
    }
    let candidate = candidate_after_last_marker(trimmed)?;
    if !is_canonical_media_id(candidate) {
        return None;
    }
    Some(candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "dQw4w9WgXcQ";

    #[test]
    fn test_extracts_id_from_every_recognized_shape() {
        let references = [
            format!("https://example.com/watch?v={ID}"),
            format!("https://www.youtube.com/watch?v={ID}&t=42s"),
            format!("https://www.youtube.com/watch?feature=share&v={ID}"),
            format!("https://youtu.be/{ID}"),
            format!("https://youtu.be/{ID}?si=abcdef"),
            format!("https://www.youtube.com/embed/{ID}"),
            format!("https://www.youtube-nocookie.com/embed/{ID}?autoplay=1"),
            format!("https://www.youtube.com/v/{ID}#t=10"),
            format!("https://www.youtube.com/user/someone#p/u/1/{ID}"),
            format!("  https://music.youtube.com/watch?v={ID}  "),
        ];
        for reference in references {
            assert_eq!(
                extract_media_id(&reference).as_deref(),
                Some(ID),
                "reference: {reference}"
            );
        }
    }

    #[test]
    fn test_rejects_unrecognized_shapes() {
        for reference in [
            "not a url",
            "https://example.com/",
            "https://vimeo.com/76979871",
            ID,
        ] {
            assert_eq!(extract_media_id(reference), None, "reference: {reference}");
        }
    }

    #[test]
    fn test_rejects_blank_input() {
        assert_eq!(extract_media_id(""), None);
        assert_eq!(extract_media_id("   \t\n"), None);
    }

    #[test]
    fn test_rejects_near_miss_lengths_without_truncating() {
        assert_eq!(
            extract_media_id("https://www.youtube.com/watch?v=dQw4w9WgXcQQ"),
            None
        );
        assert_eq!(
            extract_media_id("https://www.youtube.com/watch?v=dQw4w9WgXc"),
            None
        );
        assert_eq!(extract_media_id("https://youtu.be/dQw4w9WgXcQ/"), None);
    }

    #[test]
    fn test_rejects_candidate_with_invalid_characters() {
        assert_eq!(
            extract_media_id("https://www.youtube.com/watch?v=dQw4w9 gXcQ"),
            None
        );
        assert_eq!(
            extract_media_id("https://www.youtube.com/watch?v=dQw4w9.gXcQ"),
            None
        );
    }

    #[test]
    fn test_last_marker_wins() {
        let reference = format!("https://www.youtube.com/watch?v=aaaaaaaaaaa&v={ID}");
        assert_eq!(extract_media_id(&reference).as_deref(), Some(ID));
    }

    #[test]
    fn test_canonical_shape_check() {
        assert!(is_canonical_media_id(ID));
        assert!(is_canonical_media_id("a-b_c-d_e-f"));
        assert!(!is_canonical_media_id("short"));
        assert!(!is_canonical_media_id("ééééééééééé"));
    }
}
