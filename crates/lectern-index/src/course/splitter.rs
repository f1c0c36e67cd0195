//! Sentence-aware chunking with sentence-granular overlap.
//!
//! Sizes are counted in chars of the lesson body; the `Course … Lesson n: `
//! prefix is not counted.
//!
//! A sentence ends at `.`, `!` or `?` (plus any closing quotes or brackets)
//! followed by whitespace and an uppercase letter. A `.` after a known
//! abbreviation or a single-letter initial does not end a sentence. Decimals
//! never split since their `.` is not followed by whitespace.

use super::types::{CourseChunk, CourseDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
        }
    }
}

const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "etc", "e.g", "i.e", "fig",
    "approx", "inc", "ltd",
];

const CLOSERS: &[char] = &['"', '\'', ')', ']', '\u{201d}', '\u{2019}'];

#[derive(Debug, Clone)]
pub struct CourseChunker {
    config: ChunkerConfig,
}

impl CourseChunker {
    #[must_use]
    pub fn new(config: ChunkerConfig) -> Self {
        Self {
            config: ChunkerConfig {
                chunk_size: config.chunk_size.max(1),
                chunk_overlap: config.chunk_overlap,
            },
        }
    }

    #[must_use]
    pub fn config(&self) -> ChunkerConfig {
        self.config
    }

    /// Chunk every section of a parsed document. Indices run across the whole
    /// course in document order; overlap never crosses a lesson boundary.
    #[must_use]
    pub fn chunk(&self, document: &CourseDocument) -> Vec<CourseChunk> {
        let course = &document.course;
        let mut out = Vec::new();

        for section in &document.sections {
            let prefix = match section.lesson {
                Some(n) => format!("Course {} Lesson {n}: ", course.title),
                None => format!("Course {}: ", course.title),
            };
            let lesson_link = section
                .lesson
                .and_then(|n| course.lesson(n))
                .and_then(|l| l.link.clone());

            for body in self.split_body(&section.body) {
                out.push(CourseChunk {
                    content: format!("{prefix}{body}"),
                    course_title: course.title.clone(),
                    lesson_number: section.lesson,
                    lesson_link: lesson_link.clone(),
                    chunk_index: out.len(),
                });
            }
        }

        out
    }

    /// Split one body of text into chunk bodies (no prefix).
    #[must_use]
    pub fn split_body(&self, text: &str) -> Vec<String> {
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            return Vec::new();
        }

        let size = self.config.chunk_size;
        let units: Vec<&str> = split_sentences(&normalized)
            .into_iter()
            .flat_map(|s| force_split(s, size))
            .collect();
        pack(&units, size, self.config.chunk_overlap)
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split normalized text (single spaces) into trimmed sentences.
pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let (_, c) = chars[i];
        if !matches!(c, '.' | '!' | '?') {
            i += 1;
            continue;
        }

        let mut end = i + 1;
        while end < chars.len() && CLOSERS.contains(&chars[end].1) {
            end += 1;
        }
        let followed_by_space = end < chars.len() && chars[end].1.is_whitespace();
        let next_upper = chars.get(end + 1).is_some_and(|(_, n)| n.is_uppercase());

        if followed_by_space && next_upper && !(c == '.' && is_abbreviation(text, chars[i].0)) {
            let end_byte = chars[end].0;
            let sentence = text[start..end_byte].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = chars[end + 1].0;
            i = end + 1;
        } else {
            i = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Whether the word ending right before the `.` at `dot` is an abbreviation.
fn is_abbreviation(text: &str, dot: usize) -> bool {
    let word_start = text[..dot].rfind(' ').map_or(0, |p| p + 1);
    let word = text[word_start..dot].trim_start_matches(['(', '"', '\'']);
    let mut chars = word.chars();
    if let (Some(first), None) = (chars.next(), chars.next())
        && first.is_alphabetic()
    {
        return true;
    }
    let lowered = word.to_lowercase();
    ABBREVIATIONS.contains(&lowered.as_str())
}

/// Break a sentence longer than `size` chars into `size`-char pieces.
fn force_split(sentence: &str, size: usize) -> Vec<&str> {
    if char_len(sentence) <= size {
        return vec![sentence];
    }
    let mut pieces = Vec::new();
    let mut piece_start = 0;
    let mut count = 0;
    for (byte, _) in sentence.char_indices() {
        if count == size {
            pieces.push(sentence[piece_start..byte].trim());
            piece_start = byte;
            count = 0;
        }
        count += 1;
    }
    pieces.push(sentence[piece_start..].trim());
    pieces.retain(|p| !p.is_empty());
    pieces
}

/// Greedy packing. Each new chunk starts with the trailing sentences of the
/// previous one whose joined length fits in `overlap`, minus any leading
/// sentences that would push the chunk past `size`.
fn pack(units: &[&str], size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0;

    for &unit in units {
        let len = char_len(unit);
        let added = if current.is_empty() { len } else { len + 1 };

        if !current.is_empty() && current_len + added > size {
            chunks.push(current.join(" "));

            let mut tail_start = current.len();
            let mut tail_len = 0;
            for (idx, s) in current.iter().enumerate().rev() {
                let extra = if tail_len == 0 {
                    char_len(s)
                } else {
                    char_len(s) + 1
                };
                if tail_len + extra > overlap {
                    break;
                }
                tail_len += extra;
                tail_start = idx;
            }

            let mut tail: Vec<&str> = current[tail_start..].to_vec();
            while !tail.is_empty() && tail_len + 1 + len > size {
                let dropped = tail.remove(0);
                tail_len = if tail.is_empty() {
                    0
                } else {
                    tail_len - char_len(dropped) - 1
                };
            }

            current = tail;
            current_len = tail_len;
        }

        current_len += if current.is_empty() { len } else { len + 1 };
        current.push(unit);
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }
    chunks
}
