//! Headline text resolution for the overlay stage.

use reel_ml_client::ContentGenerator;
use reel_models::{HeadlineSource, Transcript};

use crate::error::{WorkerError, WorkerResult};

const ELLIPSIS: char = '…';

/// Opening sentence of the transcript, whitespace-normalized and capped at
/// `max_chars` on a word boundary.
///
/// Returns `None` for an empty transcript.
pub fn extract_hook(transcript: &Transcript, max_chars: usize) -> Option<String> {
    let text = if transcript.full_text.trim().is_empty() {
        transcript
            .segments
            .iter()
            .map(|s| s.text.trim())
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        transcript.full_text.clone()
    };

    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return None;
    }

    let sentence = first_sentence(&normalized);
    Some(cap_on_word(sentence, max_chars))
}

fn first_sentence(text: &str) -> &str {
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_boundary {
                return &text[..i + c.len_utf8()];
            }
        }
    }
    text
}

fn cap_on_word(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let budget = max_chars.saturating_sub(1);
    let mut out = String::new();
    for word in text.split(' ') {
        let extra = if out.is_empty() { 0 } else { 1 };
        if out.chars().count() + extra + word.chars().count() > budget {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    if out.is_empty() {
        // a single word longer than the budget
        out = text.chars().take(budget).collect();
    }
    let trimmed = out.trim_end_matches(|c: char| c.is_ascii_punctuation());
    format!("{trimmed}{ELLIPSIS}")
}

/// Resolve the overlay text for `source`.
///
/// `Ok(None)` means no overlay was requested. Any error is a headline-stage
/// failure; the caller degrades.
pub async fn resolve_headline(
    source: &HeadlineSource,
    transcript: Option<&Transcript>,
    generator: &dyn ContentGenerator,
    max_chars: usize,
) -> WorkerResult<Option<String>> {
    match source {
        HeadlineSource::None => Ok(None),
        HeadlineSource::Literal(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Err(WorkerError::validation("literal headline is empty"));
            }
            Ok(Some(text.to_string()))
        }
        HeadlineSource::ExtractedHook => {
            let transcript =
                transcript.ok_or_else(|| WorkerError::internal("hook needs a transcript"))?;
            extract_hook(transcript, max_chars)
                .map(Some)
                .ok_or_else(|| WorkerError::validation("transcript has no text to extract a hook from"))
        }
        HeadlineSource::Generated => {
            let transcript =
                transcript.ok_or_else(|| WorkerError::internal("generation needs a transcript"))?;
            if transcript.is_empty() {
                return Err(WorkerError::validation("transcript is empty"));
            }
            let text = generator
                .generate_headline(&transcript.full_text, max_chars)
                .await?;
            Ok(Some(text))
        }
    }
}
