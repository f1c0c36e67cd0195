use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub number: u32,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Course metadata parsed from a document header and its lesson markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    pub title: String,
    pub link: Option<String>,
    pub instructor: Option<String>,
    pub lessons: Vec<Lesson>,
}

impl Course {
    #[must_use]
    pub fn lesson(&self, number: u32) -> Option<&Lesson> {
        self.lessons.iter().find(|l| l.number == number)
    }
}

/// Body text attached to one lesson, or to the course preamble when `lesson` is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseSection {
    pub lesson: Option<u32>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseDocument {
    pub course: Course,
    pub sections: Vec<CourseSection>,
}

/// Retrievable passage; `content` already carries the course/lesson prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseChunk {
    pub content: String,
    pub course_title: String,
    pub lesson_number: Option<u32>,
    pub lesson_link: Option<String>,
    /// Zero-based, contiguous within a course.
    pub chunk_index: usize,
}

/// One record per course in the catalog collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub title: String,
    pub course_link: Option<String>,
    pub instructor: Option<String>,
    pub lessons: Vec<Lesson>,
}

impl From<&Course> for CatalogEntry {
    fn from(course: &Course) -> Self {
        Self {
            title: course.title.clone(),
            course_link: course.link.clone(),
            instructor: course.instructor.clone(),
            lessons: course.lessons.clone(),
        }
    }
}
