use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use crate::question::{
    Comment, QuestionWithStats, ReceivedComment, StudentCounts, StudentSummary, TeacherStats,
};
use crate::user::{NewUser, User};

/// The persistence gateway. Implementations only execute parameterized
/// reads/writes; every ordering and counting policy lives in the queries so
/// the in-memory and MySQL backends stay interchangeable.
#[async_trait]
pub trait ClassroomStore: Send + Sync {
    async fn user_by_id(&self, user_id: i64) -> Result<Option<User>>;
    async fn user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn user_by_email(&self, email: &str) -> Result<Option<User>>;
    /// Returns the new account's id.
    async fn insert_user(&self, user: &NewUser) -> Result<i64>;
    /// Removes the account and everything hanging off it: the user's
    /// questions, the comments and likes under those questions, and the
    /// user's own comments and likes elsewhere.
    async fn delete_user(&self, user_id: i64) -> Result<()>;
    async fn update_password(
        &self,
        user_id: i64,
        password_hash: &str,
        reset_token: Option<&str>,
        reset_token_expires: Option<NaiveDateTime>,
    ) -> Result<()>;
    async fn insert_class(&self, name: &str, teacher_id: i64) -> Result<i64>;
    /// Roster for a class, ordered by full name.
    async fn students_in_class(&self, class_name: &str) -> Result<Vec<StudentSummary>>;

    /// Returns the new question's id.
    async fn insert_question(
        &self,
        user_id: i64,
        content: &str,
        reason: &str,
        category: &str,
        date: NaiveDate,
    ) -> Result<i64>;
    /// Full replacement of the mutable fields.
    async fn update_question(
        &self,
        question_id: i64,
        content: &str,
        reason: &str,
        category: &str,
    ) -> Result<()>;
    async fn question_author(&self, question_id: i64) -> Result<Option<i64>>;
    async fn question_with_stats(&self, question_id: i64) -> Result<Option<QuestionWithStats>>;
    /// Global recent feed, newest first.
    async fn recent_questions(&self, limit: u32, offset: u32) -> Result<Vec<QuestionWithStats>>;
    /// A class's today bucket, newest first.
    async fn questions_today(
        &self,
        class_name: &str,
        today: NaiveDate,
    ) -> Result<Vec<QuestionWithStats>>;
    /// A day's questions, most liked first, ties to the earlier creation.
    async fn questions_on_date(
        &self,
        date: NaiveDate,
        class_name: Option<&str>,
    ) -> Result<Vec<QuestionWithStats>>;
    /// Ranking over the trailing week: like count descending, ties broken by
    /// the earlier creation time.
    async fn top_weekly(
        &self,
        class_name: Option<&str>,
        since: NaiveDate,
        limit: u32,
    ) -> Result<Vec<QuestionWithStats>>;
    async fn questions_by_user(&self, user_id: i64, limit: u32) -> Result<Vec<QuestionWithStats>>;
    async fn week_questions_by_user(
        &self,
        user_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<QuestionWithStats>>;

    /// Comments under a question, oldest first.
    async fn comments_for_question(&self, question_id: i64) -> Result<Vec<Comment>>;
    async fn comment_by_id(&self, comment_id: i64) -> Result<Option<Comment>>;
    async fn insert_comment(&self, question_id: i64, user_id: i64, content: &str) -> Result<i64>;
    /// Comments left on the user's questions, newest first.
    async fn comments_received(&self, user_id: i64, limit: u32) -> Result<Vec<ReceivedComment>>;

    async fn has_liked(&self, question_id: i64, user_id: i64) -> Result<bool>;
    async fn insert_like(&self, question_id: i64, user_id: i64) -> Result<()>;
    async fn delete_like(&self, question_id: i64, user_id: i64) -> Result<()>;

    async fn teacher_stats(
        &self,
        class_name: &str,
        today: NaiveDate,
        since: NaiveDate,
    ) -> Result<TeacherStats>;
    async fn student_counts(&self, user_id: i64, since: NaiveDate) -> Result<StudentCounts>;

    async fn username_taken(&self, username: &str) -> Result<bool> {
        Ok(self.user_by_username(username).await?.is_some())
    }

    async fn username_or_email_taken(&self, username: &str, email: &str) -> Result<bool> {
        if self.username_taken(username).await? {
            return Ok(true);
        }
        Ok(self.user_by_email(email).await?.is_some())
    }

    async fn question_exists(&self, question_id: i64) -> Result<bool> {
        Ok(self.question_author(question_id).await?.is_some())
    }
}
