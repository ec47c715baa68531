//! Hierarchical collection of Canvas resources
//!
//! Users and courses are plain account-level collections. Everything else
//! hangs off courses, and submissions and discussion entries hang off a
//! course-scoped item (quiz, assignment, discussion topic). Children are
//! stamped with their ancestors' ids before they are merged, so every record
//! can be joined back to the course (and item) it was fetched under.
//!
//! Requests within one endpoint are issued one after another; concurrency
//! lives one level up, across endpoints.

use crate::api::{fetch_all, Record, RetryPolicy, Session};
use crate::extract::endpoints::Endpoint;
use crate::extract::normalize::{
    canonical_id, canonicalize_ids, flatten_nested, flatten_replies, strip_markup_field,
};
use crate::ExtractError;
use serde_json::Value;
use std::sync::Arc;

/// Route to a sub-collection of a course-scoped item
struct ItemRoute {
    /// Course collection the parent item lives in
    collection: &'static str,
    /// Sub-collection fetched per item
    child: &'static str,
    /// Field the parent item's id is stamped into
    stamp_field: &'static str,
    /// Field the API wraps the records under
    wrap_key: Option<&'static str>,
    /// Whether records are reply trees to flatten
    reply_tree: bool,
}

const QUIZ_SUBMISSIONS: ItemRoute = ItemRoute {
    collection: "quizzes",
    child: "submissions",
    stamp_field: "quiz_id",
    wrap_key: Some("quiz_submissions"),
    reply_tree: false,
};

const ASSIGNMENT_SUBMISSIONS: ItemRoute = ItemRoute {
    collection: "assignments",
    child: "submissions",
    stamp_field: "assignment_id",
    wrap_key: None,
    reply_tree: false,
};

const DISCUSSION_VIEW: ItemRoute = ItemRoute {
    collection: "discussion_topics",
    child: "view",
    stamp_field: "topic_id",
    wrap_key: Some("view"),
    reply_tree: true,
};

/// Fetches the records of one endpoint, walking the course hierarchy as needed
pub struct Collector {
    session: Arc<Session>,
    policy: RetryPolicy,
    per_page: u32,
}

impl Collector {
    pub fn new(session: Arc<Session>, policy: RetryPolicy, per_page: u32) -> Self {
        Self {
            session,
            policy,
            per_page,
        }
    }

    /// Collects and normalizes every record of `endpoint`
    ///
    /// The returned records carry their ancestor ids and have nested values
    /// serialized to JSON text, ready for loading.
    pub async fn collect(&self, endpoint: Endpoint) -> Result<Vec<Record>, ExtractError> {
        let mut records = match endpoint {
            Endpoint::Users => self.users().await?,
            Endpoint::Courses => self.courses().await?,
            Endpoint::CourseEnrollment => self.for_each_course(endpoint, "users").await?,
            Endpoint::Quizzes => self.quizzes().await?,
            Endpoint::Assignments => self.assignments().await?,
            Endpoint::Discussions => self.discussion_topics().await?,
            Endpoint::QuizSubmissions => {
                let quizzes = self.quizzes().await?;
                self.for_each_item(endpoint, &quizzes, &QUIZ_SUBMISSIONS)
                    .await?
            }
            Endpoint::AssignmentSubmissions => {
                let assignments = self.assignments().await?;
                self.for_each_item(endpoint, &assignments, &ASSIGNMENT_SUBMISSIONS)
                    .await?
            }
            Endpoint::DiscussionEntries => {
                let topics = self.discussion_topics().await?;
                self.for_each_item(endpoint, &topics, &DISCUSSION_VIEW)
                    .await?
            }
        };

        for record in &mut records {
            canonicalize_ids(record);
            flatten_nested(record);
        }
        Ok(records)
    }

    async fn fetch_path(
        &self,
        path: &str,
        wrap_key: Option<&str>,
    ) -> Result<Vec<Record>, ExtractError> {
        let url = self.session.api_url(path)?;
        Ok(fetch_all(&self.session, &url, wrap_key, &self.policy).await?)
    }

    async fn users(&self) -> Result<Vec<Record>, ExtractError> {
        let path = format!(
            "accounts/{}/users?per_page={}",
            self.session.account_id(),
            self.per_page
        );
        self.fetch_path(&path, None).await
    }

    async fn courses(&self) -> Result<Vec<Record>, ExtractError> {
        let path = format!(
            "accounts/{}/courses?per_page={}&state=available",
            self.session.account_id(),
            self.per_page
        );
        self.fetch_path(&path, None).await
    }

    async fn quizzes(&self) -> Result<Vec<Record>, ExtractError> {
        self.for_each_course(Endpoint::Quizzes, "quizzes").await
    }

    async fn assignments(&self) -> Result<Vec<Record>, ExtractError> {
        let mut assignments = self
            .for_each_course(Endpoint::Assignments, "assignments")
            .await?;
        for assignment in &mut assignments {
            strip_markup_field(assignment, "description");
        }
        Ok(assignments)
    }

    async fn discussion_topics(&self) -> Result<Vec<Record>, ExtractError> {
        self.for_each_course(Endpoint::Discussions, "discussion_topics")
            .await
    }

    /// Fetches `segment` under every available course
    ///
    /// Each course's freshly fetched records are stamped with its
    /// `course_id` before being appended.
    async fn for_each_course(
        &self,
        endpoint: Endpoint,
        segment: &str,
    ) -> Result<Vec<Record>, ExtractError> {
        let courses = self.courses().await?;
        let mut result = Vec::new();

        for course in &courses {
            let course_id = require_id(endpoint, course, "id")?;
            let path = format!(
                "courses/{}/{}?per_page={}",
                course_id, segment, self.per_page
            );

            let mut children = self.fetch_path(&path, None).await?;
            stamp(&mut children, "course_id", &course_id);
            result.extend(children);
        }

        tracing::debug!(
            "{}: {} records across {} courses",
            endpoint,
            result.len(),
            courses.len()
        );
        Ok(result)
    }

    /// Fetches a sub-collection under every course-scoped item
    ///
    /// `items` must already carry `course_id`; every fetched record is stamped
    /// with both the course id and the item id.
    async fn for_each_item(
        &self,
        endpoint: Endpoint,
        items: &[Record],
        route: &ItemRoute,
    ) -> Result<Vec<Record>, ExtractError> {
        let mut result = Vec::new();

        for item in items {
            let course_id = require_id(endpoint, item, "course_id")?;
            let item_id = require_id(endpoint, item, "id")?;
            let path = format!(
                "courses/{}/{}/{}/{}?per_page={}",
                course_id, route.collection, item_id, route.child, self.per_page
            );

            let mut children = self.fetch_path(&path, route.wrap_key).await?;
            if route.reply_tree {
                children = flatten_replies(children);
            }
            stamp(&mut children, "course_id", &course_id);
            stamp(&mut children, route.stamp_field, &item_id);
            result.extend(children);
        }

        tracing::debug!(
            "{}: {} records across {} {}",
            endpoint,
            result.len(),
            items.len(),
            route.collection
        );
        Ok(result)
    }
}

/// Reads an identifier from a parent record as a canonical string
fn require_id(endpoint: Endpoint, record: &Record, field: &'static str) -> Result<String, ExtractError> {
    record
        .get(field)
        .and_then(canonical_id)
        .ok_or(ExtractError::MissingField {
            endpoint: endpoint.name(),
            field,
        })
}

/// Writes `value` into `field` of every record
fn stamp(records: &mut [Record], field: &str, value: &str) {
    for record in records {
        record.insert(field.to_string(), Value::String(value.to_string()));
    }
}
