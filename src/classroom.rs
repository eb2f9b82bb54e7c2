use std::sync::Arc;

use chrono::{Duration, Local, NaiveDate};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

use crate::error::ClassroomError;
use crate::password;
use crate::question::{
    Comment, QuestionWithStats, ReceivedComment, StudentCounts, StudentSummary, TeacherStats,
};
use crate::store::ClassroomStore;
use crate::user::{NewUser, Role, SessionUser};
use crate::{DETAIL_LIMIT, RESET_TOKEN_EXPIRY_SECONDS, WEEKLY_TOP_COUNT};

type Result<T> = std::result::Result<T, ClassroomError>;

/// What the like toggle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeAction {
    Liked,
    Unliked,
}

/// One line of a bulk roster upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkStudentEntry {
    pub name: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedStudent {
    pub id: i64,
    pub name: String,
    pub username: String,
}

/// Per-line results of a bulk upload. Bad lines are collected, not fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkCreateOutcome {
    pub created: Vec<CreatedStudent>,
    pub errors: Vec<String>,
}

/// The domain facade over the persistence gateway. Handlers talk only to
/// this; the store behind it can be the MySQL or in-memory implementation.
#[derive(Clone)]
pub struct Classroom(Arc<dyn ClassroomStore + Send + Sync>);

impl Classroom {
    pub fn new(inner: Arc<dyn ClassroomStore + Send + Sync>) -> Self {
        Self(inner)
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn week_ago(&self) -> NaiveDate {
        self.today() - Duration::days(7)
    }

    /// Verifies credentials against the stored argon2 hash and returns the
    /// session record the client persists. The same message covers unknown
    /// usernames and wrong passwords.
    pub async fn login(&self, username: &str, pass: &str) -> Result<SessionUser> {
        if username.is_empty() || pass.is_empty() {
            return Err(ClassroomError::validation(
                "username and password are required",
            ));
        }
        let user = self
            .0
            .user_by_username(username)
            .await?
            .ok_or_else(|| ClassroomError::unauthorized("invalid username or password"))?;
        if !password::verify(user.password_hash(), pass)
            .await
            .map_err(ClassroomError::Internal)?
        {
            return Err(ClassroomError::unauthorized("invalid username or password"));
        }
        Ok(user.session())
    }

    /// Generic self-registration. A class affiliation is optional here;
    /// teacher registration below is the variant that also creates the class.
    pub async fn register(
        &self,
        username: &str,
        pass: &str,
        full_name: &str,
        role: Role,
        class_name: Option<&str>,
    ) -> Result<i64> {
        if username.is_empty() || pass.is_empty() || full_name.is_empty() {
            return Err(ClassroomError::validation("all fields are required"));
        }
        if self.0.username_taken(username).await? {
            return Err(ClassroomError::conflict("username already in use"));
        }
        let password_hash = password::hash(pass).await.map_err(ClassroomError::Internal)?;
        let user_id = self
            .0
            .insert_user(&NewUser {
                username: username.to_string(),
                password_hash,
                full_name: full_name.to_string(),
                email: None,
                role,
                class_name: class_name.unwrap_or_default().to_string(),
            })
            .await?;
        Ok(user_id)
    }

    /// Registers a teacher account and implicitly creates their class.
    pub async fn register_teacher(
        &self,
        username: &str,
        pass: &str,
        full_name: &str,
        email: &str,
        class_name: &str,
    ) -> Result<i64> {
        if username.is_empty()
            || pass.is_empty()
            || full_name.is_empty()
            || email.is_empty()
            || class_name.is_empty()
        {
            return Err(ClassroomError::validation("all fields are required"));
        }
        if !valid_email(email) {
            return Err(ClassroomError::validation("invalid email address"));
        }
        if self.0.username_or_email_taken(username, email).await? {
            return Err(ClassroomError::conflict(
                "username or email already in use",
            ));
        }
        let password_hash = password::hash(pass).await.map_err(ClassroomError::Internal)?;
        let teacher_id = self
            .0
            .insert_user(&NewUser {
                username: username.to_string(),
                password_hash,
                full_name: full_name.to_string(),
                email: Some(email.to_string()),
                role: Role::Teacher,
                class_name: class_name.to_string(),
            })
            .await?;
        self.0.insert_class(class_name, teacher_id).await?;
        Ok(teacher_id)
    }

    /// Issues a temporary password for the account registered under the
    /// email. The temporary password is returned to the caller; there is no
    /// mail collaborator.
    pub async fn forgot_password(&self, email: &str) -> Result<String> {
        if email.is_empty() {
            return Err(ClassroomError::validation("email is required"));
        }
        let user = self
            .0
            .user_by_email(email)
            .await?
            .ok_or_else(|| ClassroomError::not_found("no account registered for that email"))?;
        let temp_password = random_token(8);
        let reset_token = random_token(16);
        let expires =
            Local::now().naive_local() + Duration::seconds(RESET_TOKEN_EXPIRY_SECONDS);
        let password_hash = password::hash(&temp_password)
            .await
            .map_err(ClassroomError::Internal)?;
        self.0
            .update_password(user.id(), &password_hash, Some(&reset_token), Some(expires))
            .await?;
        Ok(temp_password)
    }

    /// Creates one student account in the calling teacher's class.
    pub async fn create_student(
        &self,
        teacher_id: i64,
        name: &str,
        username: &str,
        pass: &str,
    ) -> Result<i64> {
        if name.is_empty() || username.is_empty() || pass.is_empty() {
            return Err(ClassroomError::validation("all fields are required"));
        }
        let teacher = self.expect_teacher(teacher_id).await?;
        if self.0.username_taken(username).await? {
            return Err(ClassroomError::conflict("username already in use"));
        }
        let password_hash = password::hash(pass).await.map_err(ClassroomError::Internal)?;
        let student_id = self
            .0
            .insert_user(&NewUser {
                username: username.to_string(),
                password_hash,
                full_name: name.to_string(),
                email: None,
                role: Role::Student,
                class_name: teacher.class_name,
            })
            .await?;
        Ok(student_id)
    }

    /// Creates many student accounts at once. Lines with missing fields or
    /// taken usernames are reported in the outcome and skipped.
    pub async fn bulk_create_students(
        &self,
        teacher_id: i64,
        entries: &[BulkStudentEntry],
    ) -> Result<BulkCreateOutcome> {
        let teacher = self.expect_teacher(teacher_id).await?;
        let mut outcome = BulkCreateOutcome {
            created: Vec::new(),
            errors: Vec::new(),
        };
        for entry in entries {
            if entry.name.is_empty() || entry.username.is_empty() || entry.password.is_empty() {
                let label = if entry.name.is_empty() {
                    entry.username.as_str()
                } else {
                    entry.name.as_str()
                };
                outcome
                    .errors
                    .push(format!("{}: missing required fields", label));
                continue;
            }
            if self.0.username_taken(&entry.username).await? {
                outcome.errors.push(format!(
                    "{} ({}): username already in use",
                    entry.name, entry.username
                ));
                continue;
            }
            let password_hash = password::hash(&entry.password)
                .await
                .map_err(ClassroomError::Internal)?;
            let id = self
                .0
                .insert_user(&NewUser {
                    username: entry.username.clone(),
                    password_hash,
                    full_name: entry.name.clone(),
                    email: None,
                    role: Role::Student,
                    class_name: teacher.class_name.clone(),
                })
                .await?;
            outcome.created.push(CreatedStudent {
                id,
                name: entry.name.clone(),
                username: entry.username.clone(),
            });
        }
        Ok(outcome)
    }

    /// Deletes a student account and everything it authored or touched.
    /// Returns the student's display name for the confirmation message.
    pub async fn delete_student(&self, student_id: i64) -> Result<String> {
        let student = self
            .0
            .user_by_id(student_id)
            .await?
            .filter(|u| u.role() == Role::Student)
            .ok_or_else(|| ClassroomError::not_found("student not found"))?;
        self.0.delete_user(student_id).await?;
        Ok(student.full_name().to_string())
    }

    /// The roster of a class, ordered by name, with activity counts.
    pub async fn class_students(&self, class_name: &str) -> Result<Vec<StudentSummary>> {
        Ok(self.0.students_in_class(class_name).await?)
    }

    /// Posts a question into the author's today bucket. Content, reason and
    /// category are all required.
    pub async fn post_question(
        &self,
        user_id: i64,
        content: &str,
        reason: &str,
        category: &str,
    ) -> Result<QuestionWithStats> {
        let (content, reason, category) = required_question_fields(content, reason, category)?;
        let question_id = self
            .0
            .insert_question(user_id, content, reason, category, self.today())
            .await?;
        self.expect_question(question_id).await
    }

    /// Author-only full replacement of a question's mutable fields.
    pub async fn edit_question(
        &self,
        user_id: i64,
        question_id: i64,
        content: &str,
        reason: &str,
        category: &str,
    ) -> Result<QuestionWithStats> {
        let (content, reason, category) = required_question_fields(content, reason, category)?;
        let author = self
            .0
            .question_author(question_id)
            .await?
            .ok_or_else(|| ClassroomError::not_found("question not found"))?;
        if author != user_id {
            return Err(ClassroomError::forbidden(
                "only the author can edit a question",
            ));
        }
        self.0
            .update_question(question_id, content, reason, category)
            .await?;
        self.expect_question(question_id).await
    }

    /// The global recent feed, newest first, paged.
    pub async fn recent_questions(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<Vec<QuestionWithStats>> {
        let offset = page.saturating_sub(1) * limit;
        Ok(self.0.recent_questions(limit, offset).await?)
    }

    /// A class's today bucket, newest first.
    pub async fn questions_today(&self, class_name: &str) -> Result<Vec<QuestionWithStats>> {
        Ok(self.0.questions_today(class_name, self.today()).await?)
    }

    /// A day's questions, most liked first, optionally scoped to a class.
    pub async fn questions_on_date(
        &self,
        date: NaiveDate,
        class_name: Option<&str>,
    ) -> Result<Vec<QuestionWithStats>> {
        Ok(self.0.questions_on_date(date, class_name).await?)
    }

    /// Top questions of the trailing week. Like count descending; a tie goes
    /// to the question created earlier.
    pub async fn top_weekly(&self, class_name: Option<&str>) -> Result<Vec<QuestionWithStats>> {
        Ok(self
            .0
            .top_weekly(class_name, self.week_ago(), WEEKLY_TOP_COUNT)
            .await?)
    }

    /// Toggles the caller's like on a question: at most one like row per
    /// (question, user) pair ever exists.
    pub async fn toggle_like(&self, user_id: i64, question_id: i64) -> Result<LikeAction> {
        if !self.0.question_exists(question_id).await? {
            return Err(ClassroomError::not_found("question not found"));
        }
        if self.0.has_liked(question_id, user_id).await? {
            self.0.delete_like(question_id, user_id).await?;
            Ok(LikeAction::Unliked)
        } else {
            self.0.insert_like(question_id, user_id).await?;
            Ok(LikeAction::Liked)
        }
    }

    /// Comments under a question, oldest first.
    pub async fn comments(&self, question_id: i64) -> Result<Vec<Comment>> {
        Ok(self.0.comments_for_question(question_id).await?)
    }

    /// Appends an immutable comment to a question.
    pub async fn add_comment(
        &self,
        user_id: i64,
        question_id: i64,
        content: &str,
    ) -> Result<Comment> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ClassroomError::validation("comment content is required"));
        }
        if !self.0.question_exists(question_id).await? {
            return Err(ClassroomError::not_found("question not found"));
        }
        let comment_id = self.0.insert_comment(question_id, user_id, content).await?;
        self.0
            .comment_by_id(comment_id)
            .await?
            .ok_or_else(|| ClassroomError::Internal(anyhow::anyhow!("inserted comment missing")))
    }

    /// Aggregate counts for the teacher dashboard.
    pub async fn teacher_stats(&self, class_name: &str) -> Result<TeacherStats> {
        Ok(self
            .0
            .teacher_stats(class_name, self.today(), self.week_ago())
            .await?)
    }

    /// Per-student aggregate counts for the student dashboard.
    pub async fn student_stats(&self, user_id: i64) -> Result<StudentCounts> {
        Ok(self.0.student_counts(user_id, self.week_ago()).await?)
    }

    /// A student's own questions, newest first.
    pub async fn student_questions(&self, user_id: i64) -> Result<Vec<QuestionWithStats>> {
        Ok(self.0.questions_by_user(user_id, DETAIL_LIMIT).await?)
    }

    /// A student's questions from the trailing week, newest first.
    pub async fn student_week_questions(&self, user_id: i64) -> Result<Vec<QuestionWithStats>> {
        Ok(self
            .0
            .week_questions_by_user(user_id, self.week_ago())
            .await?)
    }

    /// Comments other people left on the student's questions, newest first.
    pub async fn student_received_comments(&self, user_id: i64) -> Result<Vec<ReceivedComment>> {
        Ok(self.0.comments_received(user_id, DETAIL_LIMIT).await?)
    }

    async fn expect_teacher(&self, teacher_id: i64) -> Result<SessionUser> {
        let teacher = self
            .0
            .user_by_id(teacher_id)
            .await?
            .filter(|u| u.role() == Role::Teacher)
            .ok_or_else(|| ClassroomError::forbidden("teacher privileges required"))?;
        Ok(teacher.session())
    }

    async fn expect_question(&self, question_id: i64) -> Result<QuestionWithStats> {
        self.0
            .question_with_stats(question_id)
            .await?
            .ok_or_else(|| ClassroomError::Internal(anyhow::anyhow!("question row missing")))
    }
}

fn required_question_fields<'a>(
    content: &'a str,
    reason: &'a str,
    category: &'a str,
) -> Result<(&'a str, &'a str, &'a str)> {
    let (content, reason, category) = (content.trim(), reason.trim(), category.trim());
    if content.is_empty() || reason.is_empty() || category.is_empty() {
        return Err(ClassroomError::validation(
            "content, reason and category are all required",
        ));
    }
    Ok((content, reason, category))
}

fn valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        _ => false,
    }
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(valid_email("teacher@school.edu"));
        assert!(!valid_email("teacher"));
        assert!(!valid_email("teacher@school"));
        assert!(!valid_email("te acher@school.edu"));
        assert!(!valid_email("teacher@school.edu@x.com"));
    }
}
