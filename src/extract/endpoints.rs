//! Logical resources extracted from Canvas
//!
//! Each endpoint maps to one destination table and one fetch strategy.

use std::fmt;

/// One logical resource type pulled from the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    Users,
    Quizzes,
    QuizSubmissions,
    Assignments,
    AssignmentSubmissions,
    Courses,
    CourseEnrollment,
    Discussions,
    DiscussionEntries,
}

/// How an endpoint's records are reached from the account root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// One paginated collection under the account
    Flat,

    /// One paginated collection per course, stamped with `course_id`
    PerCourse,

    /// One paginated collection per course-scoped item, stamped with both ids
    TwoLevel,
}

impl Endpoint {
    /// Every endpoint, in the order they are submitted for extraction
    pub const ALL: [Endpoint; 9] = [
        Endpoint::Users,
        Endpoint::Quizzes,
        Endpoint::QuizSubmissions,
        Endpoint::Assignments,
        Endpoint::AssignmentSubmissions,
        Endpoint::Courses,
        Endpoint::CourseEnrollment,
        Endpoint::Discussions,
        Endpoint::DiscussionEntries,
    ];

    /// Human readable name used in logs and reports
    pub fn name(&self) -> &'static str {
        match self {
            Self::Users => "Users",
            Self::Quizzes => "Quizzes",
            Self::QuizSubmissions => "Quiz Submissions",
            Self::Assignments => "Assignments",
            Self::AssignmentSubmissions => "Assignment Submissions",
            Self::Courses => "Courses",
            Self::CourseEnrollment => "Course Enrollment",
            Self::Discussions => "Discussions",
            Self::DiscussionEntries => "Discussion Entries",
        }
    }

    /// Destination table
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Users => "canvas_users",
            Self::Quizzes => "canvas_quizzes",
            Self::QuizSubmissions => "canvas_quiz_submissions",
            Self::Assignments => "canvas_assignments",
            Self::AssignmentSubmissions => "canvas_assignment_submissions",
            Self::Courses => "canvas_courses",
            Self::CourseEnrollment => "canvas_course_enrollment",
            Self::Discussions => "canvas_discussions",
            Self::DiscussionEntries => "canvas_discussion_entries",
        }
    }

    pub fn strategy(&self) -> FetchStrategy {
        match self {
            Self::Users | Self::Courses => FetchStrategy::Flat,
            Self::Quizzes | Self::Assignments | Self::CourseEnrollment | Self::Discussions => {
                FetchStrategy::PerCourse
            }
            Self::QuizSubmissions | Self::AssignmentSubmissions | Self::DiscussionEntries => {
                FetchStrategy::TwoLevel
            }
        }
    }

    /// Parent identifier fields stamped on every record of this endpoint
    pub fn stamped_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Users | Self::Courses => &[],
            Self::Quizzes | Self::Assignments | Self::CourseEnrollment | Self::Discussions => {
                &["course_id"]
            }
            Self::QuizSubmissions => &["course_id", "quiz_id"],
            Self::AssignmentSubmissions => &["course_id", "assignment_id"],
            Self::DiscussionEntries => &["course_id", "topic_id"],
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Flat => "flat",
            Self::PerCourse => "per course",
            Self::TwoLevel => "two level",
        };
        f.write_str(label)
    }
}
