//! Output file naming.
//!
//! Names are cosmetic. The storage key carries the job id, so two jobs with
//! the same headline never collide.

const FALLBACK_NAME: &str = "output";

/// Lowercase, collapse runs of non-alphanumerics to `-`, trim dashes, cap at
/// `max_len` bytes.
pub fn slugify(text: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(text.len().min(max_len));
    let mut pending_dash = false;

    for ch in text.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
        if slug.len() >= max_len {
            break;
        }
    }

    slug.truncate(max_len);
    slug.trim_end_matches('-').to_string()
}

/// File name for a job's final artifact.
///
/// Prefers the headline or hook text, then the original file's stem, then a
/// fixed fallback. Always ends in `.mp4`.
pub fn output_file_name(headline: Option<&str>, original_name: &str, max_len: usize) -> String {
    let from_headline = headline.map(|h| slugify(h, max_len)).filter(|s| !s.is_empty());

    let stem = original_name
        .rsplit('/')
        .next()
        .unwrap_or(original_name);
    let stem = stem.rsplit_once('.').map(|(s, _)| s).unwrap_or(stem);

    let base = from_headline
        .or_else(|| Some(slugify(stem, max_len)).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| FALLBACK_NAME.to_string());

    format!("{base}.mp4")
}
