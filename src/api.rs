//! Request and response bodies for the JSON API. Every success reply carries
//! `success: true`; failures are an [`ErrorBody`] with a 4xx/5xx status.

use serde::{Deserialize, Serialize};

use crate::classroom::{CreatedStudent, LikeAction};
use crate::question::{
    BestQuestion, Comment, LevelInfo, QuestionWithStats, ReceivedComment, StudentSummary,
    TeacherStats,
};
use crate::user::{Role, SessionUser};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: SessionUser,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub user_type: Role,
    #[serde(default)]
    pub class_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterTeacherRequest {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub email: String,
    pub class_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub user_id: i64,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ForgotPasswordResponse {
    pub success: bool,
    pub message: String,
    // Development behavior: no mail collaborator exists, so the temporary
    // password comes back in the response.
    pub temp_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateStudentRequest {
    pub teacher_id: i64,
    pub student_name: String,
    pub student_username: String,
    pub student_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateStudentResponse {
    pub success: bool,
    pub student_id: i64,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkCreateStudentsRequest {
    pub teacher_id: i64,
    pub students: Vec<BulkStudentBody>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkStudentBody {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkCreateStudentsResponse {
    pub success: bool,
    pub created_count: usize,
    pub total_count: usize,
    pub results: Vec<CreatedStudent>,
    pub errors: Vec<String>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteStudentResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StudentsResponse {
    pub success: bool,
    pub students: Vec<StudentSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuestionsResponse {
    pub success: bool,
    pub questions: Vec<QuestionWithStats>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub success: bool,
    pub question: QuestionWithStats,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuestionBody {
    pub content: String,
    pub reason: String,
    pub category: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LikeResponse {
    pub success: bool,
    pub action: LikeAction,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentsResponse {
    pub success: bool,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentBody {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentResponse {
    pub success: bool,
    pub comment: Comment,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReceivedCommentsResponse {
    pub success: bool,
    pub comments: Vec<ReceivedComment>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TeacherStatsResponse {
    pub success: bool,
    pub stats: TeacherStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StudentStatsPayload {
    pub total_likes: i64,
    pub total_questions: i64,
    pub total_comments: i64,
    pub week_questions: i64,
    pub best_question: Option<BestQuestion>,
    pub level: LevelInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StudentStatsResponse {
    pub success: bool,
    pub stats: StudentStatsPayload,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub user_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub success: bool,
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeQuestionRequest {
    pub question: String,
    #[serde(default)]
    pub user_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeQuestionResponse {
    pub success: bool,
    pub analysis: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ClassQuery {
    pub class_name: Option<String>,
}
