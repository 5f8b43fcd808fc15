// components/media_downloader/src/utils.rs
use crate::types::{AudioFormat, MediaId};

const MAX_TITLE_CHARS: usize = 100;

/// Sanitize a title to be safe for all filesystems
pub fn sanitize_title(title: &str) -> String {
    let cleaned = sanitize_filename::sanitize_with_options(
        title.replace(['\'', '"'], ""),
        sanitize_filename::Options {
            windows: true,
            truncate: false,
            replacement: "",
        },
    );
    let cleaned = cleaned.replace(['[', ']'], "");
    let trimmed = cleaned.trim().trim_end_matches('.');

    let truncated: String = trimmed.chars().take(MAX_TITLE_CHARS).collect();
    let truncated = truncated.trim_end();
    if truncated.is_empty() {
        "untitled".to_string()
    } else {
        truncated.to_string()
    }
}

/// The bracketed tag that ties a file on disk to its media id, `extractor-id`.
/// The id is percent-encoded so distinct ids never share a tag.
fn media_tag(media_id: &MediaId) -> String {
    format!("{}-{}", media_id.extractor(), urlencoding::encode(media_id.id()))
}

/// Generate a collision-free filename: `Title [extractor-id].ext`
///
/// The media id makes the name unique per source media, so two different
/// videos with the same title never share a file.
pub fn generate_filename(title: &str, media_id: &MediaId, format: AudioFormat) -> String {
    format!(
        "{} [{}].{}",
        sanitize_title(title),
        media_tag(media_id),
        format.extension()
    )
}

/// Recover the display title and media id from a file stem written by
/// [`generate_filename`]. Stems without a trailing tag yield no id.
pub fn parse_file_stem(stem: &str) -> (String, Option<MediaId>) {
    let tagged = stem
        .strip_suffix(']')
        .and_then(|rest| rest.rsplit_once(" ["))
        .and_then(|(title, tag)| {
            let (extractor, id) = tag.split_once('-')?;
            if extractor.is_empty() || id.is_empty() {
                return None;
            }
            let id = urlencoding::decode(id).ok()?;
            Some((title.to_string(), MediaId::new(extractor, &id)))
        });

    match tagged {
        Some((title, media_id)) => (title, Some(media_id)),
        None => (stem.to_string(), None),
    }
}
