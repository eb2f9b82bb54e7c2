use std::convert::Infallible;

use chrono::NaiveDate;
use log::{error, info};
use serde::Serialize;
use warp::{
    filters::BoxedFilter,
    http::{
        header::{HeaderValue, SET_COOKIE},
        StatusCode,
    },
    reject::Rejection,
    reply::{self, Reply},
    Filter,
};

use crate::ai::AiClient;
use crate::api::*;
use crate::classroom::Classroom;
use crate::error::ClassroomError;
use crate::question::level_for;
use crate::SESSION_COOKIE_MAX_AGE;

pub async fn start_server(schema_name: &str, port: u16) -> anyhow::Result<()> {
    let classroom = Classroom::new_db(schema_name).await?;
    let ai = AiClient::from_env();
    let routes = make_routes(classroom, ai);

    let host = "0.0.0.0"; // 127.0.0.1 won't work inside docker.
    let addr = format!("{}:{}", host, port);
    let socket_addr = addr.parse::<std::net::SocketAddr>()?;

    info!("Server running on {}", addr);
    warp::serve(routes).run(socket_addr).await;

    Ok(())
}

pub fn make_routes(classroom: Classroom, ai: AiClient) -> BoxedFilter<(impl Reply,)> {
    let api = warp::path("api");
    let routes = status_filter()
        .or(auth_routes(classroom.clone()))
        .unify()
        .or(teacher_routes(classroom.clone()))
        .unify()
        .or(question_routes(classroom.clone()))
        .unify()
        .or(student_routes(classroom))
        .unify()
        .or(ai_routes(ai))
        .unify();
    let cors = warp::cors()
        .allow_any_origin()
        .allow_header("content-type")
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"]);

    api.and(routes)
        .recover(handle_rejection)
        .with(cors)
        .boxed()
}

fn with_classroom(
    classroom: Classroom,
) -> impl Filter<Extract = (Classroom,), Error = Infallible> + Clone {
    warp::any().map(move || classroom.clone())
}

fn with_ai(ai: AiClient) -> impl Filter<Extract = (AiClient,), Error = Infallible> + Clone {
    warp::any().map(move || ai.clone())
}

fn session_cookie(name: &str, value: &str) -> String {
    format!(
        "{}={}; Max-Age={}; Path=/; SameSite=Lax",
        name, value, SESSION_COOKIE_MAX_AGE
    )
}

fn json_ok<T: Serialize>(body: &T) -> Box<dyn Reply> {
    Box::new(reply::json(body))
}

fn error_reply(e: &ClassroomError) -> Box<dyn Reply> {
    // Store and other unclassified failures are logged but reach the client
    // as a generic 500.
    let message = match e {
        ClassroomError::Internal(inner) => {
            error!("request failed: {:#}", inner);
            "internal server error".to_string()
        }
        other => other.to_string(),
    };
    Box::new(reply::with_status(
        reply::json(&ErrorBody { error: message }),
        e.status(),
    ))
}

fn require_session(user_id: Option<i64>) -> Result<i64, ClassroomError> {
    user_id.ok_or_else(|| ClassroomError::unauthorized("login required"))
}

fn status_filter() -> BoxedFilter<(Box<dyn Reply>,)> {
    warp::path!("status")
        .and(warp::get())
        .and_then(status_handler)
        .boxed()
}

// Ref. https://github.com/seanmonstar/warp/blob/master/examples/dyn_reply.rs
async fn status_handler() -> Result<Box<dyn Reply>, Rejection> {
    Ok(Box::new(reply::json(&"Question Classroom is running")))
}

fn auth_routes(classroom: Classroom) -> BoxedFilter<(Box<dyn Reply>,)> {
    let login = warp::path!("auth" / "login")
        .and(warp::post())
        .and(with_classroom(classroom.clone()))
        .and(warp::body::json())
        .and_then(login_handler);
    let register = warp::path!("auth" / "register")
        .and(warp::post())
        .and(with_classroom(classroom.clone()))
        .and(warp::body::json())
        .and_then(register_handler);
    let register_teacher = warp::path!("auth" / "register-teacher")
        .and(warp::post())
        .and(with_classroom(classroom.clone()))
        .and(warp::body::json())
        .and_then(register_teacher_handler);
    let forgot_password = warp::path!("auth" / "forgot-password")
        .and(warp::post())
        .and(with_classroom(classroom))
        .and(warp::body::json())
        .and_then(forgot_password_handler);

    login
        .or(register)
        .unify()
        .or(register_teacher)
        .unify()
        .or(forgot_password)
        .unify()
        .boxed()
}

async fn login_handler(
    classroom: Classroom,
    req: LoginRequest,
) -> Result<Box<dyn Reply>, Rejection> {
    match classroom.login(&req.username, &req.password).await {
        Ok(user) => {
            let cookies = [
                session_cookie("user_id", &user.id.to_string()),
                session_cookie("username", &user.username),
                session_cookie("user_type", user.user_type.as_str()),
            ];
            let mut response = reply::json(&LoginResponse {
                success: true,
                user,
            })
            .into_response();
            for cookie in cookies {
                // Skip values that cannot travel in a header.
                if let Ok(value) = HeaderValue::from_str(&cookie) {
                    response.headers_mut().append(SET_COOKIE, value);
                }
            }
            Ok(Box::new(response))
        }
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn register_handler(
    classroom: Classroom,
    req: RegisterRequest,
) -> Result<Box<dyn Reply>, Rejection> {
    let result = classroom
        .register(
            &req.username,
            &req.password,
            &req.full_name,
            req.user_type,
            req.class_name.as_deref(),
        )
        .await;
    match result {
        Ok(user_id) => Ok(json_ok(&RegisterResponse {
            success: true,
            user_id,
            message: "Registration complete. Please log in.".to_string(),
        })),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn register_teacher_handler(
    classroom: Classroom,
    req: RegisterTeacherRequest,
) -> Result<Box<dyn Reply>, Rejection> {
    let result = classroom
        .register_teacher(
            &req.username,
            &req.password,
            &req.full_name,
            &req.email,
            &req.class_name,
        )
        .await;
    match result {
        Ok(user_id) => Ok(json_ok(&RegisterResponse {
            success: true,
            user_id,
            message: "Teacher registration complete.".to_string(),
        })),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn forgot_password_handler(
    classroom: Classroom,
    req: ForgotPasswordRequest,
) -> Result<Box<dyn Reply>, Rejection> {
    match classroom.forgot_password(&req.email).await {
        Ok(temp_password) => Ok(json_ok(&ForgotPasswordResponse {
            success: true,
            message: "A temporary password has been issued.".to_string(),
            temp_password,
        })),
        Err(e) => Ok(error_reply(&e)),
    }
}

fn teacher_routes(classroom: Classroom) -> BoxedFilter<(Box<dyn Reply>,)> {
    let create_student = warp::path!("teacher" / "create-student")
        .and(warp::post())
        .and(with_classroom(classroom.clone()))
        .and(warp::body::json())
        .and_then(create_student_handler);
    let bulk_create = warp::path!("teacher" / "bulk-create-students")
        .and(warp::post())
        .and(with_classroom(classroom.clone()))
        .and(warp::body::json())
        .and_then(bulk_create_students_handler);
    let delete_student = warp::path!("teacher" / "delete-student" / i64)
        .and(warp::delete())
        .and(with_classroom(classroom.clone()))
        .and_then(delete_student_handler);
    let students = warp::path!("teacher" / "students" / String)
        .and(warp::get())
        .and(with_classroom(classroom.clone()))
        .and_then(class_students_handler);
    let stats = warp::path!("teacher" / "stats" / String)
        .and(warp::get())
        .and(with_classroom(classroom))
        .and_then(teacher_stats_handler);

    create_student
        .or(bulk_create)
        .unify()
        .or(delete_student)
        .unify()
        .or(students)
        .unify()
        .or(stats)
        .unify()
        .boxed()
}

async fn create_student_handler(
    classroom: Classroom,
    req: CreateStudentRequest,
) -> Result<Box<dyn Reply>, Rejection> {
    let result = classroom
        .create_student(
            req.teacher_id,
            &req.student_name,
            &req.student_username,
            &req.student_password,
        )
        .await;
    match result {
        Ok(student_id) => Ok(json_ok(&CreateStudentResponse {
            success: true,
            student_id,
            message: "Student account created.".to_string(),
        })),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn bulk_create_students_handler(
    classroom: Classroom,
    req: BulkCreateStudentsRequest,
) -> Result<Box<dyn Reply>, Rejection> {
    let entries: Vec<crate::classroom::BulkStudentEntry> = req
        .students
        .iter()
        .map(|s| crate::classroom::BulkStudentEntry {
            name: s.name.clone(),
            username: s.username.clone(),
            password: s.password.clone(),
        })
        .collect();
    match classroom.bulk_create_students(req.teacher_id, &entries).await {
        Ok(outcome) => Ok(json_ok(&BulkCreateStudentsResponse {
            success: true,
            created_count: outcome.created.len(),
            total_count: entries.len(),
            message: format!("{} student accounts created.", outcome.created.len()),
            results: outcome.created,
            errors: outcome.errors,
        })),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn delete_student_handler(
    student_id: i64,
    classroom: Classroom,
) -> Result<Box<dyn Reply>, Rejection> {
    match classroom.delete_student(student_id).await {
        Ok(full_name) => Ok(json_ok(&DeleteStudentResponse {
            success: true,
            message: format!(
                "The account for \"{}\" and all related data were deleted.",
                full_name
            ),
        })),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn class_students_handler(
    class_name: String,
    classroom: Classroom,
) -> Result<Box<dyn Reply>, Rejection> {
    match classroom.class_students(&class_name).await {
        Ok(students) => Ok(json_ok(&StudentsResponse {
            success: true,
            students,
        })),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn teacher_stats_handler(
    class_name: String,
    classroom: Classroom,
) -> Result<Box<dyn Reply>, Rejection> {
    match classroom.teacher_stats(&class_name).await {
        Ok(stats) => Ok(json_ok(&TeacherStatsResponse {
            success: true,
            stats,
        })),
        Err(e) => Ok(error_reply(&e)),
    }
}

fn question_routes(classroom: Classroom) -> BoxedFilter<(Box<dyn Reply>,)> {
    let recent = warp::path!("questions")
        .and(warp::get())
        .and(with_classroom(classroom.clone()))
        .and(warp::query::<PageQuery>())
        .and_then(recent_questions_handler);
    let today = warp::path!("questions" / "today" / String)
        .and(warp::get())
        .and(with_classroom(classroom.clone()))
        .and_then(questions_today_handler);
    let on_date = warp::path!("questions" / "date" / String)
        .and(warp::get())
        .and(with_classroom(classroom.clone()))
        .and(warp::query::<ClassQuery>())
        .and_then(questions_on_date_handler);
    let top_weekly = warp::path!("questions" / "top-weekly")
        .and(warp::get())
        .and(with_classroom(classroom.clone()))
        .and(warp::query::<ClassQuery>())
        .and_then(top_weekly_handler);
    let create = warp::path!("questions")
        .and(warp::post())
        .and(with_classroom(classroom.clone()))
        .and(warp::cookie::optional::<i64>("user_id"))
        .and(warp::body::json())
        .and_then(create_question_handler);
    let update = warp::path!("questions" / i64)
        .and(warp::put())
        .and(with_classroom(classroom.clone()))
        .and(warp::cookie::optional::<i64>("user_id"))
        .and(warp::body::json())
        .and_then(update_question_handler);
    let like = warp::path!("questions" / i64 / "like")
        .and(warp::post())
        .and(with_classroom(classroom.clone()))
        .and(warp::cookie::optional::<i64>("user_id"))
        .and_then(like_handler);
    let comments = warp::path!("questions" / i64 / "comments")
        .and(warp::get())
        .and(with_classroom(classroom.clone()))
        .and_then(comments_handler);
    let add_comment = warp::path!("questions" / i64 / "comments")
        .and(warp::post())
        .and(with_classroom(classroom))
        .and(warp::cookie::optional::<i64>("user_id"))
        .and(warp::body::json())
        .and_then(add_comment_handler);

    recent
        .or(today)
        .unify()
        .or(on_date)
        .unify()
        .or(top_weekly)
        .unify()
        .or(create)
        .unify()
        .or(update)
        .unify()
        .or(like)
        .unify()
        .or(comments)
        .unify()
        .or(add_comment)
        .unify()
        .boxed()
}

async fn recent_questions_handler(
    classroom: Classroom,
    query: PageQuery,
) -> Result<Box<dyn Reply>, Rejection> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    match classroom.recent_questions(page, limit).await {
        Ok(questions) => Ok(json_ok(&QuestionsResponse {
            success: true,
            questions,
        })),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn questions_today_handler(
    class_name: String,
    classroom: Classroom,
) -> Result<Box<dyn Reply>, Rejection> {
    match classroom.questions_today(&class_name).await {
        Ok(questions) => Ok(json_ok(&QuestionsResponse {
            success: true,
            questions,
        })),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn questions_on_date_handler(
    date: String,
    classroom: Classroom,
    query: ClassQuery,
) -> Result<Box<dyn Reply>, Rejection> {
    let date = match NaiveDate::parse_from_str(&date, "%Y-%m-%d") {
        Ok(date) => date,
        Err(_) => {
            return Ok(error_reply(&ClassroomError::validation(
                "dates must look like 2024-03-01",
            )))
        }
    };
    match classroom
        .questions_on_date(date, query.class_name.as_deref())
        .await
    {
        Ok(questions) => Ok(json_ok(&QuestionsResponse {
            success: true,
            questions,
        })),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn top_weekly_handler(
    classroom: Classroom,
    query: ClassQuery,
) -> Result<Box<dyn Reply>, Rejection> {
    match classroom.top_weekly(query.class_name.as_deref()).await {
        Ok(questions) => Ok(json_ok(&QuestionsResponse {
            success: true,
            questions,
        })),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn create_question_handler(
    classroom: Classroom,
    user_id: Option<i64>,
    req: QuestionBody,
) -> Result<Box<dyn Reply>, Rejection> {
    let user_id = match require_session(user_id) {
        Ok(user_id) => user_id,
        Err(e) => return Ok(error_reply(&e)),
    };
    match classroom
        .post_question(user_id, &req.content, &req.reason, &req.category)
        .await
    {
        Ok(question) => Ok(json_ok(&QuestionResponse {
            success: true,
            question,
            message: "Your question was posted.".to_string(),
        })),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn update_question_handler(
    question_id: i64,
    classroom: Classroom,
    user_id: Option<i64>,
    req: QuestionBody,
) -> Result<Box<dyn Reply>, Rejection> {
    let user_id = match require_session(user_id) {
        Ok(user_id) => user_id,
        Err(e) => return Ok(error_reply(&e)),
    };
    match classroom
        .edit_question(user_id, question_id, &req.content, &req.reason, &req.category)
        .await
    {
        Ok(question) => Ok(json_ok(&QuestionResponse {
            success: true,
            question,
            message: "Your question was updated.".to_string(),
        })),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn like_handler(
    question_id: i64,
    classroom: Classroom,
    user_id: Option<i64>,
) -> Result<Box<dyn Reply>, Rejection> {
    let user_id = match require_session(user_id) {
        Ok(user_id) => user_id,
        Err(e) => return Ok(error_reply(&e)),
    };
    match classroom.toggle_like(user_id, question_id).await {
        Ok(action) => {
            let message = match action {
                crate::classroom::LikeAction::Liked => "Liked.",
                crate::classroom::LikeAction::Unliked => "Like removed.",
            };
            Ok(json_ok(&LikeResponse {
                success: true,
                action,
                message: message.to_string(),
            }))
        }
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn comments_handler(
    question_id: i64,
    classroom: Classroom,
) -> Result<Box<dyn Reply>, Rejection> {
    match classroom.comments(question_id).await {
        Ok(comments) => Ok(json_ok(&CommentsResponse {
            success: true,
            comments,
        })),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn add_comment_handler(
    question_id: i64,
    classroom: Classroom,
    user_id: Option<i64>,
    req: CommentBody,
) -> Result<Box<dyn Reply>, Rejection> {
    let user_id = match require_session(user_id) {
        Ok(user_id) => user_id,
        Err(e) => return Ok(error_reply(&e)),
    };
    match classroom.add_comment(user_id, question_id, &req.content).await {
        Ok(comment) => Ok(json_ok(&CommentResponse {
            success: true,
            comment,
            message: "Your comment was posted.".to_string(),
        })),
        Err(e) => Ok(error_reply(&e)),
    }
}

fn student_routes(classroom: Classroom) -> BoxedFilter<(Box<dyn Reply>,)> {
    let stats = warp::path!("student" / "stats" / i64)
        .and(warp::get())
        .and(with_classroom(classroom.clone()))
        .and_then(student_stats_handler);
    let questions = warp::path!("student" / "details" / "questions" / i64)
        .and(warp::get())
        .and(with_classroom(classroom.clone()))
        .and_then(student_questions_handler);
    let week_questions = warp::path!("student" / "details" / "week-questions" / i64)
        .and(warp::get())
        .and(with_classroom(classroom.clone()))
        .and_then(student_week_questions_handler);
    let comments = warp::path!("student" / "details" / "comments" / i64)
        .and(warp::get())
        .and(with_classroom(classroom))
        .and_then(student_comments_handler);

    stats
        .or(questions)
        .unify()
        .or(week_questions)
        .unify()
        .or(comments)
        .unify()
        .boxed()
}

async fn student_stats_handler(
    user_id: i64,
    classroom: Classroom,
) -> Result<Box<dyn Reply>, Rejection> {
    match classroom.student_stats(user_id).await {
        Ok(counts) => {
            let level = level_for(counts.total_likes);
            Ok(json_ok(&StudentStatsResponse {
                success: true,
                stats: StudentStatsPayload {
                    total_likes: counts.total_likes,
                    total_questions: counts.total_questions,
                    total_comments: counts.total_comments,
                    week_questions: counts.week_questions,
                    best_question: counts.best_question,
                    level,
                },
            }))
        }
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn student_questions_handler(
    user_id: i64,
    classroom: Classroom,
) -> Result<Box<dyn Reply>, Rejection> {
    match classroom.student_questions(user_id).await {
        Ok(questions) => Ok(json_ok(&QuestionsResponse {
            success: true,
            questions,
        })),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn student_week_questions_handler(
    user_id: i64,
    classroom: Classroom,
) -> Result<Box<dyn Reply>, Rejection> {
    match classroom.student_week_questions(user_id).await {
        Ok(questions) => Ok(json_ok(&QuestionsResponse {
            success: true,
            questions,
        })),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn student_comments_handler(
    user_id: i64,
    classroom: Classroom,
) -> Result<Box<dyn Reply>, Rejection> {
    match classroom.student_received_comments(user_id).await {
        Ok(comments) => Ok(json_ok(&ReceivedCommentsResponse {
            success: true,
            comments,
        })),
        Err(e) => Ok(error_reply(&e)),
    }
}

fn ai_routes(ai: AiClient) -> BoxedFilter<(Box<dyn Reply>,)> {
    let chat = warp::path!("ai" / "chat")
        .and(warp::post())
        .and(with_ai(ai.clone()))
        .and(warp::body::json())
        .and_then(ai_chat_handler);
    let analyze = warp::path!("ai" / "analyze-question")
        .and(warp::post())
        .and(with_ai(ai))
        .and(warp::body::json())
        .and_then(ai_analyze_handler);

    chat.or(analyze).unify().boxed()
}

async fn ai_chat_handler(ai: AiClient, req: ChatRequest) -> Result<Box<dyn Reply>, Rejection> {
    if req.message.trim().is_empty() {
        return Ok(error_reply(&ClassroomError::validation(
            "a message is required",
        )));
    }
    let response = ai.chat(&req.message).await;
    Ok(json_ok(&ChatResponse {
        success: true,
        response,
    }))
}

async fn ai_analyze_handler(
    ai: AiClient,
    req: AnalyzeQuestionRequest,
) -> Result<Box<dyn Reply>, Rejection> {
    if req.question.trim().is_empty() {
        return Ok(error_reply(&ClassroomError::validation(
            "a question is required",
        )));
    }
    let analysis = ai.analyze_question(&req.question).await;
    Ok(json_ok(&AnalyzeQuestionResponse {
        success: true,
        analysis,
    }))
}

async fn handle_rejection(err: Rejection) -> Result<Box<dyn Reply>, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "method not allowed".to_string(),
        )
    } else {
        error!("unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error".to_string(),
        )
    };
    Ok(Box::new(reply::with_status(
        reply::json(&ErrorBody { error: message }),
        status,
    )))
}

#[tokio::test]
async fn test_status() {
    let routes = make_routes(Classroom::new_in_memory(), AiClient::disabled());
    let result = warp::test::request()
        .path("/api/status")
        .reply(&routes)
        .await;
    assert_eq!(result.status(), 200, "{}", result.status());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_login_requires_credentials() {
        let routes = make_routes(Classroom::new_in_memory(), AiClient::disabled());
        let result = warp::test::request()
            .method("POST")
            .path("/api/auth/login")
            .json(&LoginRequest {
                username: "nobody".to_string(),
                password: "nothing".to_string(),
            })
            .reply(&routes)
            .await;
        assert_eq!(result.status(), 401);
    }

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let routes = make_routes(Classroom::new_in_memory(), AiClient::disabled());
        let result = warp::test::request()
            .path("/api/no-such-thing")
            .reply(&routes)
            .await;
        assert_eq!(result.status(), 404);
        let body: ErrorBody = serde_json::from_slice(result.body()).unwrap();
        assert_eq!(body.error, "not found");
    }
}
