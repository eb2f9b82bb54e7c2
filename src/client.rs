//! Typed HTTP client for the JSON API: the piece of the browser client that
//! issues requests. The feed controller drives it through [`FeedSource`].

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;

use crate::api::*;
use crate::classroom::LikeAction;
use crate::feed::FeedSource;
use crate::question::{Comment, QuestionWithStats, TeacherStats};
use crate::user::SessionUser;

#[derive(Clone)]
pub struct ApiClient {
    base: Url,
    http: Client,
    session: Option<SessionUser>,
}

async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    // Failed replies carry {"error": "..."}; surface that text the way the
    // client toast does.
    let body: ErrorBody = response.json().await.unwrap_or(ErrorBody {
        error: "unknown error".to_string(),
    });
    Err(anyhow!("{} ({})", body.error, status))
}

impl ApiClient {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            http: Client::new(),
            session: None,
        }
    }

    pub fn session(&self) -> Option<&SessionUser> {
        self.session.as_ref()
    }

    /// Drops the locally persisted session record.
    pub fn logout(&mut self) {
        self.session = None;
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    fn session_cookie(&self) -> Result<String> {
        let user = self
            .session
            .as_ref()
            .ok_or_else(|| anyhow!("not logged in"))?;
        Ok(format!("user_id={}", user.id))
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<SessionUser> {
        let response = self
            .http
            .post(self.url("api/auth/login")?)
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        let body: LoginResponse = parse(response).await?;
        self.session = Some(body.user.clone());
        Ok(body.user)
    }

    pub async fn register_teacher(&self, request: &RegisterTeacherRequest) -> Result<i64> {
        let response = self
            .http
            .post(self.url("api/auth/register-teacher")?)
            .json(request)
            .send()
            .await?;
        let body: RegisterResponse = parse(response).await?;
        Ok(body.user_id)
    }

    pub async fn create_student(&self, request: &CreateStudentRequest) -> Result<i64> {
        let response = self
            .http
            .post(self.url("api/teacher/create-student")?)
            .json(request)
            .send()
            .await?;
        let body: CreateStudentResponse = parse(response).await?;
        Ok(body.student_id)
    }

    pub async fn post_question(
        &self,
        content: &str,
        reason: &str,
        category: &str,
    ) -> Result<QuestionWithStats> {
        let response = self
            .http
            .post(self.url("api/questions")?)
            .header("cookie", self.session_cookie()?)
            .json(&QuestionBody {
                content: content.to_string(),
                reason: reason.to_string(),
                category: category.to_string(),
            })
            .send()
            .await?;
        let body: QuestionResponse = parse(response).await?;
        Ok(body.question)
    }

    pub async fn edit_question(
        &self,
        question_id: i64,
        content: &str,
        reason: &str,
        category: &str,
    ) -> Result<QuestionWithStats> {
        let response = self
            .http
            .put(self.url(&format!("api/questions/{}", question_id))?)
            .header("cookie", self.session_cookie()?)
            .json(&QuestionBody {
                content: content.to_string(),
                reason: reason.to_string(),
                category: category.to_string(),
            })
            .send()
            .await?;
        let body: QuestionResponse = parse(response).await?;
        Ok(body.question)
    }

    pub async fn toggle_like(&self, question_id: i64) -> Result<LikeAction> {
        let response = self
            .http
            .post(self.url(&format!("api/questions/{}/like", question_id))?)
            .header("cookie", self.session_cookie()?)
            .send()
            .await?;
        let body: LikeResponse = parse(response).await?;
        Ok(body.action)
    }

    pub async fn comments(&self, question_id: i64) -> Result<Vec<Comment>> {
        let response = self
            .http
            .get(self.url(&format!("api/questions/{}/comments", question_id))?)
            .send()
            .await?;
        let body: CommentsResponse = parse(response).await?;
        Ok(body.comments)
    }

    pub async fn add_comment(&self, question_id: i64, content: &str) -> Result<Comment> {
        let response = self
            .http
            .post(self.url(&format!("api/questions/{}/comments", question_id))?)
            .header("cookie", self.session_cookie()?)
            .json(&CommentBody {
                content: content.to_string(),
            })
            .send()
            .await?;
        let body: CommentResponse = parse(response).await?;
        Ok(body.comment)
    }

    pub async fn questions_on_date(
        &self,
        date: &str,
        class_name: Option<&str>,
    ) -> Result<Vec<QuestionWithStats>> {
        let mut request = self
            .http
            .get(self.url(&format!("api/questions/date/{}", date))?);
        if let Some(class_name) = class_name {
            request = request.query(&[("class_name", class_name)]);
        }
        let body: QuestionsResponse = parse(request.send().await?).await?;
        Ok(body.questions)
    }

    pub async fn student_stats(&self, user_id: i64) -> Result<StudentStatsPayload> {
        let response = self
            .http
            .get(self.url(&format!("api/student/stats/{}", user_id))?)
            .send()
            .await?;
        let body: StudentStatsResponse = parse(response).await?;
        Ok(body.stats)
    }

    pub async fn analyze_question(&self, question: &str) -> Result<String> {
        let response = self
            .http
            .post(self.url("api/ai/analyze-question")?)
            .json(&AnalyzeQuestionRequest {
                question: question.to_string(),
                user_id: self.session.as_ref().map(|u| u.id),
            })
            .send()
            .await?;
        let body: AnalyzeQuestionResponse = parse(response).await?;
        Ok(body.analysis)
    }
}

#[async_trait]
impl FeedSource for ApiClient {
    async fn today_questions(&self, class_name: &str) -> Result<Vec<QuestionWithStats>> {
        let response = self
            .http
            .get(self.url(&format!("api/questions/today/{}", class_name))?)
            .send()
            .await?;
        let body: QuestionsResponse = parse(response).await?;
        Ok(body.questions)
    }

    async fn top_weekly(&self, class_name: &str) -> Result<Vec<QuestionWithStats>> {
        let response = self
            .http
            .get(self.url("api/questions/top-weekly")?)
            .query(&[("class_name", class_name)])
            .send()
            .await?;
        let body: QuestionsResponse = parse(response).await?;
        Ok(body.questions)
    }

    async fn teacher_stats(&self, class_name: &str) -> Result<TeacherStats> {
        let response = self
            .http
            .get(self.url(&format!("api/teacher/stats/{}", class_name))?)
            .send()
            .await?;
        let body: TeacherStatsResponse = parse(response).await?;
        Ok(body.stats)
    }
}
