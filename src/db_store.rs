use std::{env, sync::Arc};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use log::info;
use mysql_async::{prelude::*, Pool, Row};
use url::Url;

use crate::classroom::Classroom;
use crate::question::{
    BestQuestion, Comment, QuestionWithStats, ReceivedComment, StudentCounts, StudentSummary,
    TeacherStats,
};
use crate::store::ClassroomStore;
use crate::user::{NewUser, User};

const USER: &str = "root";
const PASSWORD: Option<&str> = None;
const HOST: &str = "localhost";
const PORT: u16 = 3306;

const USERS_TABLE_NAME: &str = "users";
const CLASSES_TABLE_NAME: &str = "classes";
const QUESTIONS_TABLE_NAME: &str = "questions";
const COMMENTS_TABLE_NAME: &str = "comments";
const LIKES_TABLE_NAME: &str = "likes";
const STATS_VIEW_NAME: &str = "questions_with_stats";

const USER_COLUMNS: &str = "id, username, password_hash, full_name, email, user_type, class_name, \
     DATE_FORMAT(created_at, '%Y-%m-%d %H:%i:%s') AS created_at";

const STATS_COLUMNS: &str = "id, user_id, content, reason, category, \
     DATE_FORMAT(date, '%Y-%m-%d') AS date, \
     DATE_FORMAT(created_at, '%Y-%m-%d %H:%i:%s') AS created_at, \
     author_name, author_type, class_name, like_count, comment_count";

const COMMENT_COLUMNS: &str = "c.id, c.question_id, c.user_id, c.content, \
     DATE_FORMAT(c.created_at, '%Y-%m-%d %H:%i:%s') AS created_at, \
     u.full_name AS author_name, u.user_type AS author_type";

pub struct DbStore {
    pool: Pool,
}

impl DbStore {
    async fn new(schema_name: impl AsRef<str>) -> Result<Arc<Self>> {
        let pool = db_pool(schema_name.as_ref());
        // Fail fast if the database is unreachable.
        pool.get_conn().await?.ping().await?;
        Ok(Arc::new(Self { pool }))
    }
}

fn parse_date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
}

fn parse_datetime(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").unwrap()
}

fn row_to_user(row: Row) -> User {
    let created_at: String = row.get("created_at").unwrap();
    let user_type: String = row.get("user_type").unwrap();
    let email: Option<String> = row.get("email");
    User::new(
        row.get("id").unwrap(),
        row.get("username").unwrap(),
        row.get("password_hash").unwrap(),
        row.get("full_name").unwrap(),
        email,
        user_type.parse().unwrap(),
        row.get("class_name").unwrap(),
        parse_datetime(&created_at),
    )
}

fn row_to_stats(row: Row) -> QuestionWithStats {
    let date: String = row.get("date").unwrap();
    let created_at: String = row.get("created_at").unwrap();
    let author_type: String = row.get("author_type").unwrap();
    QuestionWithStats {
        id: row.get("id").unwrap(),
        user_id: row.get("user_id").unwrap(),
        content: row.get("content").unwrap(),
        reason: row.get("reason"),
        category: row.get("category"),
        date: parse_date(&date),
        created_at: parse_datetime(&created_at),
        author_name: row.get("author_name").unwrap(),
        author_type: author_type.parse().unwrap(),
        class_name: row.get("class_name").unwrap(),
        like_count: row.get("like_count").unwrap(),
        comment_count: row.get("comment_count").unwrap(),
    }
}

fn row_to_comment(row: Row) -> Comment {
    let created_at: String = row.get("created_at").unwrap();
    let author_type: String = row.get("author_type").unwrap();
    Comment {
        id: row.get("id").unwrap(),
        question_id: row.get("question_id").unwrap(),
        user_id: row.get("user_id").unwrap(),
        content: row.get("content").unwrap(),
        created_at: parse_datetime(&created_at),
        author_name: row.get("author_name").unwrap(),
        author_type: author_type.parse().unwrap(),
    }
}

async fn count_query(pool: &Pool, query: String, params: mysql_async::Params) -> Result<i64> {
    let mut conn = pool.get_conn().await?;
    let count: Option<i64> = conn.exec_first(query, params).await?;
    Ok(count.unwrap_or(0))
}

#[async_trait]
impl ClassroomStore for DbStore {
    async fn user_by_id(&self, user_id: i64) -> Result<Option<User>> {
        let mut conn = self.pool.get_conn().await?;
        let query = format!("SELECT {} FROM users WHERE id = :id", USER_COLUMNS);
        let result: Option<Row> = conn.exec_first(query, params! { "id" => user_id }).await?;
        Ok(result.map(row_to_user))
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        let mut conn = self.pool.get_conn().await?;
        let query = format!(
            "SELECT {} FROM users WHERE username = :username",
            USER_COLUMNS
        );
        let result: Option<Row> = conn
            .exec_first(query, params! { "username" => username })
            .await?;
        Ok(result.map(row_to_user))
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let mut conn = self.pool.get_conn().await?;
        let query = format!("SELECT {} FROM users WHERE email = :email", USER_COLUMNS);
        let result: Option<Row> = conn
            .exec_first(query, params! { "email" => email })
            .await?;
        Ok(result.map(row_to_user))
    }

    async fn insert_user(&self, user: &NewUser) -> Result<i64> {
        let mut conn = self.pool.get_conn().await?;
        let query = "INSERT INTO users (username, password_hash, full_name, email, user_type, class_name) \
             VALUES (:username, :password_hash, :full_name, :email, :user_type, :class_name)";
        let params = params! {
            "username" => user.username.as_str(),
            "password_hash" => user.password_hash.as_str(),
            "full_name" => user.full_name.as_str(),
            "email" => user.email.as_deref(),
            "user_type" => user.role.as_str(),
            "class_name" => user.class_name.as_str(),
        };
        conn.exec_drop(query, params).await?;
        conn.last_insert_id()
            .map(|id| id as i64)
            .ok_or_else(|| anyhow!("no insert id for new user"))
    }

    async fn delete_user(&self, user_id: i64) -> Result<()> {
        let mut conn = self.pool.get_conn().await?;
        // Questions, comments and likes go with the account via the cascading
        // foreign keys.
        conn.exec_drop(
            "DELETE FROM users WHERE id = :id",
            params! { "id" => user_id },
        )
        .await?;
        Ok(())
    }

    async fn update_password(
        &self,
        user_id: i64,
        password_hash: &str,
        reset_token: Option<&str>,
        reset_token_expires: Option<NaiveDateTime>,
    ) -> Result<()> {
        let mut conn = self.pool.get_conn().await?;
        let query = "UPDATE users SET password_hash = :password_hash, reset_token = :reset_token, \
             reset_token_expires = :reset_token_expires WHERE id = :id";
        let params = params! {
            "password_hash" => password_hash,
            "reset_token" => reset_token,
            "reset_token_expires" => reset_token_expires
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
            "id" => user_id,
        };
        conn.exec_drop(query, params).await?;
        Ok(())
    }

    async fn insert_class(&self, name: &str, teacher_id: i64) -> Result<i64> {
        let mut conn = self.pool.get_conn().await?;
        conn.exec_drop(
            "INSERT INTO classes (name, teacher_id) VALUES (:name, :teacher_id)",
            params! { "name" => name, "teacher_id" => teacher_id },
        )
        .await?;
        conn.last_insert_id()
            .map(|id| id as i64)
            .ok_or_else(|| anyhow!("no insert id for new class"))
    }

    async fn students_in_class(&self, class_name: &str) -> Result<Vec<StudentSummary>> {
        let mut conn = self.pool.get_conn().await?;
        let query = "SELECT id, username, full_name, \
                 DATE_FORMAT(created_at, '%Y-%m-%d %H:%i:%s') AS created_at, \
                 (SELECT COUNT(*) FROM questions WHERE user_id = users.id) AS question_count, \
                 (SELECT COUNT(*) FROM questions WHERE user_id = users.id \
                      AND date >= DATE_SUB(CURDATE(), INTERVAL 7 DAY)) AS week_question_count \
             FROM users \
             WHERE class_name = :class_name AND user_type = 'student' \
             ORDER BY full_name";
        let rows: Vec<Row> = conn
            .exec(query, params! { "class_name" => class_name })
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let created_at: String = row.get("created_at").unwrap();
                StudentSummary {
                    id: row.get("id").unwrap(),
                    username: row.get("username").unwrap(),
                    full_name: row.get("full_name").unwrap(),
                    created_at: parse_datetime(&created_at),
                    question_count: row.get("question_count").unwrap(),
                    week_question_count: row.get("week_question_count").unwrap(),
                }
            })
            .collect())
    }

    async fn insert_question(
        &self,
        user_id: i64,
        content: &str,
        reason: &str,
        category: &str,
        date: NaiveDate,
    ) -> Result<i64> {
        let mut conn = self.pool.get_conn().await?;
        let query = "INSERT INTO questions (user_id, content, reason, category, date) \
             VALUES (:user_id, :content, :reason, :category, :date)";
        let params = params! {
            "user_id" => user_id,
            "content" => content,
            "reason" => reason,
            "category" => category,
            "date" => date.format("%Y-%m-%d").to_string(),
        };
        conn.exec_drop(query, params).await?;
        conn.last_insert_id()
            .map(|id| id as i64)
            .ok_or_else(|| anyhow!("no insert id for new question"))
    }

    async fn update_question(
        &self,
        question_id: i64,
        content: &str,
        reason: &str,
        category: &str,
    ) -> Result<()> {
        let mut conn = self.pool.get_conn().await?;
        let query = "UPDATE questions SET content = :content, reason = :reason, \
             category = :category, updated_at = CURRENT_TIMESTAMP WHERE id = :id";
        let params = params! {
            "content" => content,
            "reason" => reason,
            "category" => category,
            "id" => question_id,
        };
        conn.exec_drop(query, params).await?;
        Ok(())
    }

    async fn question_author(&self, question_id: i64) -> Result<Option<i64>> {
        let mut conn = self.pool.get_conn().await?;
        let author: Option<i64> = conn
            .exec_first(
                "SELECT user_id FROM questions WHERE id = :id",
                params! { "id" => question_id },
            )
            .await?;
        Ok(author)
    }

    async fn question_with_stats(&self, question_id: i64) -> Result<Option<QuestionWithStats>> {
        let mut conn = self.pool.get_conn().await?;
        let query = format!(
            "SELECT {} FROM {} WHERE id = :id",
            STATS_COLUMNS, STATS_VIEW_NAME
        );
        let result: Option<Row> = conn
            .exec_first(query, params! { "id" => question_id })
            .await?;
        Ok(result.map(row_to_stats))
    }

    async fn recent_questions(&self, limit: u32, offset: u32) -> Result<Vec<QuestionWithStats>> {
        let mut conn = self.pool.get_conn().await?;
        let query = format!(
            "SELECT {} FROM {} ORDER BY created_at DESC, id DESC LIMIT :limit OFFSET :offset",
            STATS_COLUMNS, STATS_VIEW_NAME
        );
        let rows: Vec<Row> = conn
            .exec(query, params! { "limit" => limit, "offset" => offset })
            .await?;
        Ok(rows.into_iter().map(row_to_stats).collect())
    }

    async fn questions_today(
        &self,
        class_name: &str,
        today: NaiveDate,
    ) -> Result<Vec<QuestionWithStats>> {
        let mut conn = self.pool.get_conn().await?;
        let query = format!(
            "SELECT {} FROM {} WHERE class_name = :class_name AND date = :today \
             ORDER BY created_at DESC, id DESC",
            STATS_COLUMNS, STATS_VIEW_NAME
        );
        let params = params! {
            "class_name" => class_name,
            "today" => today.format("%Y-%m-%d").to_string(),
        };
        let rows: Vec<Row> = conn.exec(query, params).await?;
        Ok(rows.into_iter().map(row_to_stats).collect())
    }

    async fn questions_on_date(
        &self,
        date: NaiveDate,
        class_name: Option<&str>,
    ) -> Result<Vec<QuestionWithStats>> {
        let mut conn = self.pool.get_conn().await?;
        let date = date.format("%Y-%m-%d").to_string();
        let rows: Vec<Row> = match class_name {
            Some(class_name) => {
                let query = format!(
                    "SELECT {} FROM {} WHERE date = :date AND class_name = :class_name \
                     ORDER BY like_count DESC, created_at ASC, id ASC",
                    STATS_COLUMNS, STATS_VIEW_NAME
                );
                conn.exec(
                    query,
                    params! { "date" => date, "class_name" => class_name },
                )
                .await?
            }
            None => {
                let query = format!(
                    "SELECT {} FROM {} WHERE date = :date \
                     ORDER BY like_count DESC, created_at ASC, id ASC",
                    STATS_COLUMNS, STATS_VIEW_NAME
                );
                conn.exec(query, params! { "date" => date }).await?
            }
        };
        Ok(rows.into_iter().map(row_to_stats).collect())
    }

    async fn top_weekly(
        &self,
        class_name: Option<&str>,
        since: NaiveDate,
        limit: u32,
    ) -> Result<Vec<QuestionWithStats>> {
        let mut conn = self.pool.get_conn().await?;
        let since = since.format("%Y-%m-%d").to_string();
        let rows: Vec<Row> = match class_name {
            Some(class_name) => {
                let query = format!(
                    "SELECT {} FROM {} WHERE date >= :since AND class_name = :class_name \
                     ORDER BY like_count DESC, created_at ASC, id ASC LIMIT :limit",
                    STATS_COLUMNS, STATS_VIEW_NAME
                );
                conn.exec(
                    query,
                    params! { "since" => since, "class_name" => class_name, "limit" => limit },
                )
                .await?
            }
            None => {
                let query = format!(
                    "SELECT {} FROM {} WHERE date >= :since \
                     ORDER BY like_count DESC, created_at ASC, id ASC LIMIT :limit",
                    STATS_COLUMNS, STATS_VIEW_NAME
                );
                conn.exec(query, params! { "since" => since, "limit" => limit })
                    .await?
            }
        };
        Ok(rows.into_iter().map(row_to_stats).collect())
    }

    async fn questions_by_user(&self, user_id: i64, limit: u32) -> Result<Vec<QuestionWithStats>> {
        let mut conn = self.pool.get_conn().await?;
        let query = format!(
            "SELECT {} FROM {} WHERE user_id = :user_id \
             ORDER BY created_at DESC, id DESC LIMIT :limit",
            STATS_COLUMNS, STATS_VIEW_NAME
        );
        let rows: Vec<Row> = conn
            .exec(query, params! { "user_id" => user_id, "limit" => limit })
            .await?;
        Ok(rows.into_iter().map(row_to_stats).collect())
    }

    async fn week_questions_by_user(
        &self,
        user_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<QuestionWithStats>> {
        let mut conn = self.pool.get_conn().await?;
        let query = format!(
            "SELECT {} FROM {} WHERE user_id = :user_id AND date >= :since \
             ORDER BY created_at DESC, id DESC",
            STATS_COLUMNS, STATS_VIEW_NAME
        );
        let params = params! {
            "user_id" => user_id,
            "since" => since.format("%Y-%m-%d").to_string(),
        };
        let rows: Vec<Row> = conn.exec(query, params).await?;
        Ok(rows.into_iter().map(row_to_stats).collect())
    }

    async fn comments_for_question(&self, question_id: i64) -> Result<Vec<Comment>> {
        let mut conn = self.pool.get_conn().await?;
        let query = format!(
            "SELECT {} FROM comments c JOIN users u ON c.user_id = u.id \
             WHERE c.question_id = :question_id ORDER BY c.created_at ASC, c.id ASC",
            COMMENT_COLUMNS
        );
        let rows: Vec<Row> = conn
            .exec(query, params! { "question_id" => question_id })
            .await?;
        Ok(rows.into_iter().map(row_to_comment).collect())
    }

    async fn comment_by_id(&self, comment_id: i64) -> Result<Option<Comment>> {
        let mut conn = self.pool.get_conn().await?;
        let query = format!(
            "SELECT {} FROM comments c JOIN users u ON c.user_id = u.id WHERE c.id = :id",
            COMMENT_COLUMNS
        );
        let result: Option<Row> = conn
            .exec_first(query, params! { "id" => comment_id })
            .await?;
        Ok(result.map(row_to_comment))
    }

    async fn insert_comment(&self, question_id: i64, user_id: i64, content: &str) -> Result<i64> {
        let mut conn = self.pool.get_conn().await?;
        let query = "INSERT INTO comments (question_id, user_id, content) \
             VALUES (:question_id, :user_id, :content)";
        let params = params! {
            "question_id" => question_id,
            "user_id" => user_id,
            "content" => content,
        };
        conn.exec_drop(query, params).await?;
        conn.last_insert_id()
            .map(|id| id as i64)
            .ok_or_else(|| anyhow!("no insert id for new comment"))
    }

    async fn comments_received(&self, user_id: i64, limit: u32) -> Result<Vec<ReceivedComment>> {
        let mut conn = self.pool.get_conn().await?;
        let query = "SELECT c.id, c.question_id, c.content, \
                 DATE_FORMAT(c.created_at, '%Y-%m-%d %H:%i:%s') AS created_at, \
                 q.content AS question_content, u.full_name AS commenter_name \
             FROM comments c \
             JOIN questions q ON c.question_id = q.id \
             JOIN users u ON c.user_id = u.id \
             WHERE q.user_id = :user_id \
             ORDER BY c.created_at DESC, c.id DESC LIMIT :limit";
        let rows: Vec<Row> = conn
            .exec(query, params! { "user_id" => user_id, "limit" => limit })
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let created_at: String = row.get("created_at").unwrap();
                ReceivedComment {
                    id: row.get("id").unwrap(),
                    question_id: row.get("question_id").unwrap(),
                    content: row.get("content").unwrap(),
                    created_at: parse_datetime(&created_at),
                    question_content: row.get("question_content").unwrap(),
                    commenter_name: row.get("commenter_name").unwrap(),
                }
            })
            .collect())
    }

    async fn has_liked(&self, question_id: i64, user_id: i64) -> Result<bool> {
        let mut conn = self.pool.get_conn().await?;
        let result: Option<i64> = conn
            .exec_first(
                "SELECT id FROM likes WHERE question_id = :question_id AND user_id = :user_id",
                params! { "question_id" => question_id, "user_id" => user_id },
            )
            .await?;
        Ok(result.is_some())
    }

    async fn insert_like(&self, question_id: i64, user_id: i64) -> Result<()> {
        let mut conn = self.pool.get_conn().await?;
        conn.exec_drop(
            "INSERT IGNORE INTO likes (question_id, user_id) VALUES (:question_id, :user_id)",
            params! { "question_id" => question_id, "user_id" => user_id },
        )
        .await?;
        Ok(())
    }

    async fn delete_like(&self, question_id: i64, user_id: i64) -> Result<()> {
        let mut conn = self.pool.get_conn().await?;
        conn.exec_drop(
            "DELETE FROM likes WHERE question_id = :question_id AND user_id = :user_id",
            params! { "question_id" => question_id, "user_id" => user_id },
        )
        .await?;
        Ok(())
    }

    async fn teacher_stats(
        &self,
        class_name: &str,
        today: NaiveDate,
        since: NaiveDate,
    ) -> Result<TeacherStats> {
        let today = today.format("%Y-%m-%d").to_string();
        let since = since.format("%Y-%m-%d").to_string();
        let today_questions = count_query(
            &self.pool,
            "SELECT COUNT(*) FROM questions q JOIN users u ON q.user_id = u.id \
                 WHERE u.class_name = :class_name AND q.date = :today"
                .to_string(),
            params! { "class_name" => class_name, "today" => today.as_str() },
        )
        .await?;
        let week_questions = count_query(
            &self.pool,
            "SELECT COUNT(*) FROM questions q JOIN users u ON q.user_id = u.id \
                 WHERE u.class_name = :class_name AND q.date >= :since"
                .to_string(),
            params! { "class_name" => class_name, "since" => since.as_str() },
        )
        .await?;
        let active_students = count_query(
            &self.pool,
            "SELECT COUNT(DISTINCT q.user_id) FROM questions q JOIN users u ON q.user_id = u.id \
                 WHERE u.class_name = :class_name AND q.date >= :since"
                .to_string(),
            params! { "class_name" => class_name, "since" => since.as_str() },
        )
        .await?;
        let total_students = count_query(
            &self.pool,
            "SELECT COUNT(*) FROM users \
                 WHERE class_name = :class_name AND user_type = 'student'"
                .to_string(),
            params! { "class_name" => class_name },
        )
        .await?;
        Ok(TeacherStats {
            today_questions,
            week_questions,
            active_students,
            total_students,
        })
    }

    async fn student_counts(&self, user_id: i64, since: NaiveDate) -> Result<StudentCounts> {
        let since = since.format("%Y-%m-%d").to_string();
        let total_likes = count_query(
            &self.pool,
            "SELECT COUNT(*) FROM likes l JOIN questions q ON l.question_id = q.id \
                 WHERE q.user_id = :user_id"
                .to_string(),
            params! { "user_id" => user_id },
        )
        .await?;
        let total_questions = count_query(
            &self.pool,
            "SELECT COUNT(*) FROM questions WHERE user_id = :user_id".to_string(),
            params! { "user_id" => user_id },
        )
        .await?;
        let total_comments = count_query(
            &self.pool,
            "SELECT COUNT(*) FROM comments c JOIN questions q ON c.question_id = q.id \
                 WHERE q.user_id = :user_id"
                .to_string(),
            params! { "user_id" => user_id },
        )
        .await?;
        let week_questions = count_query(
            &self.pool,
            "SELECT COUNT(*) FROM questions WHERE user_id = :user_id AND date >= :since"
                .to_string(),
            params! { "user_id" => user_id, "since" => since.as_str() },
        )
        .await?;

        let mut conn = self.pool.get_conn().await?;
        let query = "SELECT q.content, COUNT(l.id) AS like_count \
             FROM questions q LEFT JOIN likes l ON q.id = l.question_id \
             WHERE q.user_id = :user_id \
             GROUP BY q.id, q.content \
             ORDER BY like_count DESC, q.id ASC \
             LIMIT 1";
        let best: Option<Row> = conn
            .exec_first(query, params! { "user_id" => user_id })
            .await?;
        let best_question = best.map(|row| BestQuestion {
            content: row.get("content").unwrap(),
            like_count: row.get("like_count").unwrap(),
        });

        Ok(StudentCounts {
            total_likes,
            total_questions,
            total_comments,
            week_questions,
            best_question,
        })
    }
}

impl Classroom {
    pub async fn new_db(schema_name: impl AsRef<str>) -> Result<Self> {
        Ok(Self::new(DbStore::new(schema_name).await?))
    }
}

pub fn server_url() -> Url {
    let mut server_url = Url::parse("mysql://").unwrap();
    let host = match env::var("DB_HOST") {
        Ok(val) => String::from(val.trim_matches('"')),
        Err(_) => HOST.to_string(),
    };
    info!("Using database host: {}", host);
    server_url.set_host(Some(&host)).unwrap();
    server_url.set_username(USER).unwrap();
    server_url.set_password(PASSWORD).unwrap();
    server_url.set_port(Some(PORT)).unwrap();
    server_url
}

pub fn database_url(schema_name: &str) -> Url {
    let mut database_url = server_url();
    database_url.set_path(schema_name);
    database_url
}

pub fn server_pool() -> Pool {
    Pool::new(server_url().as_str())
}

pub fn db_pool(schema_name: &str) -> Pool {
    Pool::new(database_url(schema_name).as_str())
}

pub async fn drop_db(server_pool: &Pool, schema_name: &str) -> Result<()> {
    let query = format!("DROP DATABASE IF EXISTS {}", schema_name);
    server_pool.get_conn().await?.query_drop(query).await?;

    Ok(())
}

pub async fn create_db(server_pool: &Pool, schema_name: &str) -> Result<()> {
    let query = format!("CREATE DATABASE IF NOT EXISTS {}", schema_name);
    server_pool.get_conn().await?.query_drop(query).await?;

    let query = format!(
        r"CREATE TABLE IF NOT EXISTS {}.{} (
            id BIGINT NOT NULL AUTO_INCREMENT,
            username VARCHAR(100) NOT NULL,
            password_hash VARCHAR(255) NOT NULL,
            full_name VARCHAR(100) NOT NULL,
            email VARCHAR(255),
            user_type VARCHAR(10) NOT NULL,
            class_name VARCHAR(100) NOT NULL DEFAULT '',
            reset_token VARCHAR(64),
            reset_token_expires DATETIME,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (id),
            UNIQUE INDEX (username),
            INDEX (email),
            INDEX (class_name)
        )",
        schema_name, USERS_TABLE_NAME
    );
    server_pool.get_conn().await?.query_drop(query).await?;

    let query = format!(
        r"CREATE TABLE IF NOT EXISTS {}.{} (
            id BIGINT NOT NULL AUTO_INCREMENT,
            name VARCHAR(100) NOT NULL,
            teacher_id BIGINT NOT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (id),
            FOREIGN KEY (teacher_id) REFERENCES {}.{}(id) ON DELETE CASCADE
        )",
        schema_name, CLASSES_TABLE_NAME, schema_name, USERS_TABLE_NAME
    );
    server_pool.get_conn().await?.query_drop(query).await?;

    let query = format!(
        r"CREATE TABLE IF NOT EXISTS {}.{} (
            id BIGINT NOT NULL AUTO_INCREMENT,
            user_id BIGINT NOT NULL,
            content TEXT NOT NULL,
            reason TEXT,
            category VARCHAR(50),
            date DATE NOT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
            PRIMARY KEY (id),
            INDEX (user_id),
            INDEX (date),
            FOREIGN KEY (user_id) REFERENCES {}.{}(id) ON DELETE CASCADE
        )",
        schema_name, QUESTIONS_TABLE_NAME, schema_name, USERS_TABLE_NAME
    );
    server_pool.get_conn().await?.query_drop(query).await?;

    let query = format!(
        r"CREATE TABLE IF NOT EXISTS {}.{} (
            id BIGINT NOT NULL AUTO_INCREMENT,
            question_id BIGINT NOT NULL,
            user_id BIGINT NOT NULL,
            content TEXT NOT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (id),
            INDEX (question_id),
            FOREIGN KEY (question_id) REFERENCES {}.{}(id) ON DELETE CASCADE,
            FOREIGN KEY (user_id) REFERENCES {}.{}(id) ON DELETE CASCADE
        )",
        schema_name,
        COMMENTS_TABLE_NAME,
        schema_name,
        QUESTIONS_TABLE_NAME,
        schema_name,
        USERS_TABLE_NAME
    );
    server_pool.get_conn().await?.query_drop(query).await?;

    let query = format!(
        r"CREATE TABLE IF NOT EXISTS {}.{} (
            id BIGINT NOT NULL AUTO_INCREMENT,
            question_id BIGINT NOT NULL,
            user_id BIGINT NOT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (id),
            UNIQUE INDEX (question_id, user_id),
            FOREIGN KEY (question_id) REFERENCES {}.{}(id) ON DELETE CASCADE,
            FOREIGN KEY (user_id) REFERENCES {}.{}(id) ON DELETE CASCADE
        )",
        schema_name,
        LIKES_TABLE_NAME,
        schema_name,
        QUESTIONS_TABLE_NAME,
        schema_name,
        USERS_TABLE_NAME
    );
    server_pool.get_conn().await?.query_drop(query).await?;

    let query = format!(
        r"CREATE OR REPLACE VIEW {schema}.{view} AS
            SELECT q.id, q.user_id, q.content, q.reason, q.category, q.date, q.created_at,
                   u.full_name AS author_name, u.user_type AS author_type, u.class_name,
                   (SELECT COUNT(*) FROM {schema}.{likes} l WHERE l.question_id = q.id)
                       AS like_count,
                   (SELECT COUNT(*) FROM {schema}.{comments} c WHERE c.question_id = q.id)
                       AS comment_count
            FROM {schema}.{questions} q
            JOIN {schema}.{users} u ON q.user_id = u.id",
        schema = schema_name,
        view = STATS_VIEW_NAME,
        likes = LIKES_TABLE_NAME,
        comments = COMMENTS_TABLE_NAME,
        questions = QUESTIONS_TABLE_NAME,
        users = USERS_TABLE_NAME
    );
    server_pool.get_conn().await?.query_drop(query).await?;

    Ok(())
}

pub async fn reset_db(schema_name: &str) -> Result<()> {
    let server_pool = server_pool();
    drop_db(&server_pool, schema_name).await?;
    create_db(&server_pool, schema_name).await?;

    Ok(())
}

pub async fn create_db_if_needed(schema_name: &str) -> Result<()> {
    let server_pool = server_pool();
    create_db(&server_pool, schema_name).await?;

    Ok(())
}

pub async fn can_connect_to_db(schema_name: &str) -> Result<bool> {
    let pool = db_pool(schema_name);
    let mut conn = pool.get_conn().await?;
    conn.ping().await?;

    Ok(true)
}
