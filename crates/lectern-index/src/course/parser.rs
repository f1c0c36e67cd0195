//! Course document format:
//!
//! ```text
//! Course Title: <title>
//! Course Link: <url>              (optional)
//! Course Instructor: <name>       (optional)
//!
//! Lesson 1: <lesson title>
//! Lesson Link: <url>              (optional)
//! <body text>
//! ```

use std::sync::LazyLock;

use regex::Regex;

use super::error::ParseError;
use super::types::{Course, CourseDocument, CourseSection, Lesson};

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Course\s+([A-Za-z]+)\s*:\s*(.*)$").unwrap());

static LESSON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Lesson\s+(\d+)\s*:\s*(.*)$").unwrap());

static LESSON_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Lesson\s+Link\s*:\s*(.*)$").unwrap());

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

/// Parse a course document into metadata and per-lesson body sections.
///
/// Text between the header and the first lesson marker becomes a section
/// with no lesson number.
///
/// # Errors
///
/// Returns [`ParseError`] when the header is missing or malformed, or a
/// lesson number is repeated.
pub fn parse_course(text: &str) -> Result<CourseDocument, ParseError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .peekable();

    let (title_line, first) = loop {
        match lines.next() {
            None => return Err(ParseError::Empty),
            Some((_, "")) => {}
            Some(found) => break found,
        }
    };

    let title = match HEADER_RE.captures(first) {
        Some(caps) if caps[1].eq_ignore_ascii_case("title") => {
            non_empty(&caps[2]).ok_or(ParseError::EmptyTitle { line: title_line })?
        }
        _ => {
            return Err(ParseError::MissingTitle {
                line: title_line,
                found: first.to_owned(),
            });
        }
    };

    let mut link = None;
    let mut instructor = None;
    while let Some(&(line_no, line)) = lines.peek() {
        if line.is_empty() {
            lines.next();
            continue;
        }
        let Some(caps) = HEADER_RE.captures(line) else {
            break;
        };
        let key = &caps[1];
        if key.eq_ignore_ascii_case("link") {
            link = non_empty(&caps[2]);
        } else if key.eq_ignore_ascii_case("instructor") {
            instructor = non_empty(&caps[2]);
        } else {
            return Err(ParseError::MalformedHeader {
                line: line_no,
                found: line.to_owned(),
            });
        }
        lines.next();
    }

    let mut lessons: Vec<Lesson> = Vec::new();
    let mut sections = Vec::new();
    let mut current = CourseSection {
        lesson: None,
        body: String::new(),
    };

    while let Some((line_no, line)) = lines.next() {
        if let Some(caps) = LESSON_RE.captures(line) {
            let number: u32 = caps[1]
                .parse()
                .map_err(|_| ParseError::InvalidLessonNumber {
                    line: line_no,
                    value: caps[1].to_owned(),
                })?;
            if lessons.iter().any(|l| l.number == number) {
                return Err(ParseError::DuplicateLesson {
                    line: line_no,
                    number,
                });
            }

            let mut lesson_link = None;
            while let Some(&(_, next)) = lines.peek() {
                if next.is_empty() {
                    lines.next();
                    continue;
                }
                if let Some(link_caps) = LESSON_LINK_RE.captures(next) {
                    lesson_link = non_empty(&link_caps[1]);
                    lines.next();
                }
                break;
            }

            lessons.push(Lesson {
                number,
                title: caps[2].trim().to_owned(),
                link: lesson_link,
            });
            let finished = std::mem::replace(
                &mut current,
                CourseSection {
                    lesson: Some(number),
                    body: String::new(),
                },
            );
            if !finished.body.is_empty() {
                sections.push(finished);
            }
            continue;
        }

        if !line.is_empty() {
            if !current.body.is_empty() {
                current.body.push('\n');
            }
            current.body.push_str(line);
        }
    }
    if !current.body.is_empty() {
        sections.push(current);
    }

    Ok(CourseDocument {
        course: Course {
            title,
            link,
            instructor,
            lessons,
        },
        sections,
    })
}
