use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Local, NaiveDate, NaiveDateTime};
use tokio::sync::RwLock;

use crate::classroom::Classroom;
use crate::question::{
    BestQuestion, Comment, Question, QuestionWithStats, ReceivedComment, StudentCounts,
    StudentSummary, TeacherStats,
};
use crate::store::ClassroomStore;
use crate::user::{NewUser, Role, User};

#[derive(Debug, Clone)]
struct CommentRow {
    id: i64,
    question_id: i64,
    user_id: i64,
    content: String,
    created_at: NaiveDateTime,
}

// Mirrors the classes table; written at teacher registration, only ever read
// back for bookkeeping.
#[derive(Debug, Clone)]
#[allow(dead_code)]
struct ClassRow {
    id: i64,
    name: String,
    teacher_id: i64,
}

struct Inner {
    next_user_id: i64,
    next_class_id: i64,
    next_question_id: i64,
    next_comment_id: i64,
    users: HashMap<i64, User>,
    username_to_id: HashMap<String, i64>,
    classes: Vec<ClassRow>,
    questions: BTreeMap<i64, Question>,
    comments: BTreeMap<i64, CommentRow>,
    // (question_id, user_id) membership pairs
    likes: HashSet<(i64, i64)>,
}

pub struct MemStore {
    inner: RwLock<Inner>,
}

impl MemStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(Inner {
                next_user_id: 1,
                next_class_id: 1,
                next_question_id: 1,
                next_comment_id: 1,
                users: HashMap::new(),
                username_to_id: HashMap::new(),
                classes: Vec::new(),
                questions: BTreeMap::new(),
                comments: BTreeMap::new(),
                likes: HashSet::new(),
            }),
        })
    }
}

impl std::fmt::Debug for MemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.try_read() {
            Ok(read) => write!(
                f,
                "MemStore(users: {}, questions: {}, comments: {}, likes: {})",
                read.users.len(),
                read.questions.len(),
                read.comments.len(),
                read.likes.len(),
            ),
            Err(_) => write!(f, "MemStore: <locked>"),
        }
    }
}

impl Inner {
    fn like_count(&self, question_id: i64) -> i64 {
        self.likes.iter().filter(|(q, _)| *q == question_id).count() as i64
    }

    fn comment_count(&self, question_id: i64) -> i64 {
        self.comments
            .values()
            .filter(|c| c.question_id == question_id)
            .count() as i64
    }

    fn stats_for(&self, question: &Question) -> QuestionWithStats {
        let author = self.users.get(&question.user_id).unwrap();
        QuestionWithStats {
            id: question.id,
            user_id: question.user_id,
            content: question.content.clone(),
            reason: question.reason.clone(),
            category: question.category.clone(),
            date: question.date,
            created_at: question.created_at,
            author_name: author.full_name().to_string(),
            author_type: author.role(),
            class_name: author.class_name().to_string(),
            like_count: self.like_count(question.id),
            comment_count: self.comment_count(question.id),
        }
    }

    fn comment_with_author(&self, row: &CommentRow) -> Comment {
        let author = self.users.get(&row.user_id).unwrap();
        Comment {
            id: row.id,
            question_id: row.question_id,
            user_id: row.user_id,
            content: row.content.clone(),
            created_at: row.created_at,
            author_name: author.full_name().to_string(),
            author_type: author.role(),
        }
    }

    fn author_class(&self, question: &Question) -> &str {
        self.users.get(&question.user_id).unwrap().class_name()
    }
}

/// Sort for ranked listings: likes descending, then earlier creation, then id
/// for full determinism.
fn ranked_order(a: &QuestionWithStats, b: &QuestionWithStats) -> std::cmp::Ordering {
    b.like_count
        .cmp(&a.like_count)
        .then(a.created_at.cmp(&b.created_at))
        .then(a.id.cmp(&b.id))
}

#[async_trait]
impl ClassroomStore for MemStore {
    async fn user_by_id(&self, user_id: i64) -> Result<Option<User>> {
        Ok(self.inner.read().await.users.get(&user_id).cloned())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        let read = self.inner.read().await;
        Ok(read
            .username_to_id
            .get(username)
            .and_then(|id| read.users.get(id))
            .cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let read = self.inner.read().await;
        Ok(read
            .users
            .values()
            .find(|u| u.email() == Some(email))
            .cloned())
    }

    async fn insert_user(&self, user: &NewUser) -> Result<i64> {
        let mut write = self.inner.write().await;
        let id = write.next_user_id;
        write.next_user_id += 1;
        let row = User::new(
            id,
            user.username.clone(),
            user.password_hash.clone(),
            user.full_name.clone(),
            user.email.clone(),
            user.role,
            user.class_name.clone(),
            Local::now().naive_local(),
        );
        write.username_to_id.insert(user.username.clone(), id);
        write.users.insert(id, row);
        Ok(id)
    }

    async fn delete_user(&self, user_id: i64) -> Result<()> {
        let mut write = self.inner.write().await;
        let owned: HashSet<i64> = write
            .questions
            .values()
            .filter(|q| q.user_id == user_id)
            .map(|q| q.id)
            .collect();
        write
            .comments
            .retain(|_, c| c.user_id != user_id && !owned.contains(&c.question_id));
        write
            .likes
            .retain(|(q, u)| *u != user_id && !owned.contains(q));
        write.questions.retain(|_, q| q.user_id != user_id);
        if let Some(user) = write.users.remove(&user_id) {
            write.username_to_id.remove(user.username());
        }
        Ok(())
    }

    async fn update_password(
        &self,
        user_id: i64,
        password_hash: &str,
        _reset_token: Option<&str>,
        _reset_token_expires: Option<NaiveDateTime>,
    ) -> Result<()> {
        let mut write = self.inner.write().await;
        if let Some(user) = write.users.get_mut(&user_id) {
            user.set_password_hash(password_hash.to_string());
        }
        Ok(())
    }

    async fn insert_class(&self, name: &str, teacher_id: i64) -> Result<i64> {
        let mut write = self.inner.write().await;
        let id = write.next_class_id;
        write.next_class_id += 1;
        write.classes.push(ClassRow {
            id,
            name: name.to_string(),
            teacher_id,
        });
        Ok(id)
    }

    async fn students_in_class(&self, class_name: &str) -> Result<Vec<StudentSummary>> {
        let read = self.inner.read().await;
        let since = Local::now().date_naive() - chrono::Duration::days(7);
        let mut students: Vec<StudentSummary> = read
            .users
            .values()
            .filter(|u| u.role() == Role::Student && u.class_name() == class_name)
            .map(|u| StudentSummary {
                id: u.id(),
                username: u.username().to_string(),
                full_name: u.full_name().to_string(),
                created_at: u.created_at(),
                question_count: read
                    .questions
                    .values()
                    .filter(|q| q.user_id == u.id())
                    .count() as i64,
                week_question_count: read
                    .questions
                    .values()
                    .filter(|q| q.user_id == u.id() && q.date >= since)
                    .count() as i64,
            })
            .collect();
        students.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(students)
    }

    async fn insert_question(
        &self,
        user_id: i64,
        content: &str,
        reason: &str,
        category: &str,
        date: NaiveDate,
    ) -> Result<i64> {
        let mut write = self.inner.write().await;
        let id = write.next_question_id;
        write.next_question_id += 1;
        let now = Local::now().naive_local();
        write.questions.insert(
            id,
            Question {
                id,
                user_id,
                content: content.to_string(),
                reason: Some(reason.to_string()),
                category: Some(category.to_string()),
                date,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn update_question(
        &self,
        question_id: i64,
        content: &str,
        reason: &str,
        category: &str,
    ) -> Result<()> {
        let mut write = self.inner.write().await;
        if let Some(question) = write.questions.get_mut(&question_id) {
            question.content = content.to_string();
            question.reason = Some(reason.to_string());
            question.category = Some(category.to_string());
            question.updated_at = Local::now().naive_local();
        }
        Ok(())
    }

    async fn question_author(&self, question_id: i64) -> Result<Option<i64>> {
        Ok(self
            .inner
            .read()
            .await
            .questions
            .get(&question_id)
            .map(|q| q.user_id))
    }

    async fn question_with_stats(&self, question_id: i64) -> Result<Option<QuestionWithStats>> {
        let read = self.inner.read().await;
        Ok(read.questions.get(&question_id).map(|q| read.stats_for(q)))
    }

    async fn recent_questions(&self, limit: u32, offset: u32) -> Result<Vec<QuestionWithStats>> {
        let read = self.inner.read().await;
        let mut all: Vec<QuestionWithStats> =
            read.questions.values().map(|q| read.stats_for(q)).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn questions_today(
        &self,
        class_name: &str,
        today: NaiveDate,
    ) -> Result<Vec<QuestionWithStats>> {
        let read = self.inner.read().await;
        let mut rows: Vec<QuestionWithStats> = read
            .questions
            .values()
            .filter(|q| q.date == today && read.author_class(q) == class_name)
            .map(|q| read.stats_for(q))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn questions_on_date(
        &self,
        date: NaiveDate,
        class_name: Option<&str>,
    ) -> Result<Vec<QuestionWithStats>> {
        let read = self.inner.read().await;
        let mut rows: Vec<QuestionWithStats> = read
            .questions
            .values()
            .filter(|q| q.date == date)
            .filter(|q| class_name.map_or(true, |c| read.author_class(q) == c))
            .map(|q| read.stats_for(q))
            .collect();
        rows.sort_by(ranked_order);
        Ok(rows)
    }

    async fn top_weekly(
        &self,
        class_name: Option<&str>,
        since: NaiveDate,
        limit: u32,
    ) -> Result<Vec<QuestionWithStats>> {
        let read = self.inner.read().await;
        let mut rows: Vec<QuestionWithStats> = read
            .questions
            .values()
            .filter(|q| q.date >= since)
            .filter(|q| class_name.map_or(true, |c| read.author_class(q) == c))
            .map(|q| read.stats_for(q))
            .collect();
        rows.sort_by(ranked_order);
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn questions_by_user(&self, user_id: i64, limit: u32) -> Result<Vec<QuestionWithStats>> {
        let read = self.inner.read().await;
        let mut rows: Vec<QuestionWithStats> = read
            .questions
            .values()
            .filter(|q| q.user_id == user_id)
            .map(|q| read.stats_for(q))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn week_questions_by_user(
        &self,
        user_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<QuestionWithStats>> {
        let read = self.inner.read().await;
        let mut rows: Vec<QuestionWithStats> = read
            .questions
            .values()
            .filter(|q| q.user_id == user_id && q.date >= since)
            .map(|q| read.stats_for(q))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn comments_for_question(&self, question_id: i64) -> Result<Vec<Comment>> {
        let read = self.inner.read().await;
        let mut rows: Vec<Comment> = read
            .comments
            .values()
            .filter(|c| c.question_id == question_id)
            .map(|c| read.comment_with_author(c))
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn comment_by_id(&self, comment_id: i64) -> Result<Option<Comment>> {
        let read = self.inner.read().await;
        Ok(read
            .comments
            .get(&comment_id)
            .map(|c| read.comment_with_author(c)))
    }

    async fn insert_comment(&self, question_id: i64, user_id: i64, content: &str) -> Result<i64> {
        let mut write = self.inner.write().await;
        let id = write.next_comment_id;
        write.next_comment_id += 1;
        write.comments.insert(
            id,
            CommentRow {
                id,
                question_id,
                user_id,
                content: content.to_string(),
                created_at: Local::now().naive_local(),
            },
        );
        Ok(id)
    }

    async fn comments_received(&self, user_id: i64, limit: u32) -> Result<Vec<ReceivedComment>> {
        let read = self.inner.read().await;
        let mut rows: Vec<ReceivedComment> = read
            .comments
            .values()
            .filter_map(|c| {
                let question = read.questions.get(&c.question_id)?;
                if question.user_id != user_id {
                    return None;
                }
                let commenter = read.users.get(&c.user_id)?;
                Some(ReceivedComment {
                    id: c.id,
                    question_id: c.question_id,
                    content: c.content.clone(),
                    created_at: c.created_at,
                    question_content: question.content.clone(),
                    commenter_name: commenter.full_name().to_string(),
                })
            })
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn has_liked(&self, question_id: i64, user_id: i64) -> Result<bool> {
        Ok(self
            .inner
            .read()
            .await
            .likes
            .contains(&(question_id, user_id)))
    }

    async fn insert_like(&self, question_id: i64, user_id: i64) -> Result<()> {
        self.inner.write().await.likes.insert((question_id, user_id));
        Ok(())
    }

    async fn delete_like(&self, question_id: i64, user_id: i64) -> Result<()> {
        self.inner.write().await.likes.remove(&(question_id, user_id));
        Ok(())
    }

    async fn teacher_stats(
        &self,
        class_name: &str,
        today: NaiveDate,
        since: NaiveDate,
    ) -> Result<TeacherStats> {
        let read = self.inner.read().await;
        let in_class =
            |q: &&Question| read.users.get(&q.user_id).unwrap().class_name() == class_name;
        let today_questions = read
            .questions
            .values()
            .filter(in_class)
            .filter(|q| q.date == today)
            .count() as i64;
        let week_rows: Vec<&Question> = read
            .questions
            .values()
            .filter(in_class)
            .filter(|q| q.date >= since)
            .collect();
        let active_students: HashSet<i64> = week_rows.iter().map(|q| q.user_id).collect();
        let total_students = read
            .users
            .values()
            .filter(|u| u.role() == Role::Student && u.class_name() == class_name)
            .count() as i64;
        Ok(TeacherStats {
            today_questions,
            week_questions: week_rows.len() as i64,
            active_students: active_students.len() as i64,
            total_students,
        })
    }

    async fn student_counts(&self, user_id: i64, since: NaiveDate) -> Result<StudentCounts> {
        let read = self.inner.read().await;
        let owned: Vec<&Question> = read
            .questions
            .values()
            .filter(|q| q.user_id == user_id)
            .collect();
        let total_likes = owned.iter().map(|q| read.like_count(q.id)).sum();
        let total_comments = owned.iter().map(|q| read.comment_count(q.id)).sum();
        let week_questions = owned.iter().filter(|q| q.date >= since).count() as i64;
        let best_question = owned
            .iter()
            .map(|q| (read.like_count(q.id), q))
            .max_by(|(la, qa), (lb, qb)| la.cmp(lb).then(qb.id.cmp(&qa.id)))
            .map(|(like_count, q)| BestQuestion {
                content: q.content.clone(),
                like_count,
            });
        Ok(StudentCounts {
            total_likes,
            total_questions: owned.len() as i64,
            total_comments,
            week_questions,
            best_question,
        })
    }
}

impl Classroom {
    pub fn new_in_memory() -> Self {
        Self::new(MemStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_like_pair_is_unique() {
        let store = MemStore::new();
        let teacher_id = store
            .insert_user(&NewUser {
                username: "kim".into(),
                password_hash: "x".into(),
                full_name: "Kim".into(),
                email: None,
                role: Role::Teacher,
                class_name: "3-1".into(),
            })
            .await
            .unwrap();
        let qid = store
            .insert_question(teacher_id, "Why is the sky blue?", "Wondered on the walk in", "science", Local::now().date_naive())
            .await
            .unwrap();

        store.insert_like(qid, teacher_id).await.unwrap();
        store.insert_like(qid, teacher_id).await.unwrap();
        let stats = store.question_with_stats(qid).await.unwrap().unwrap();
        assert_eq!(stats.like_count, 1);

        store.delete_like(qid, teacher_id).await.unwrap();
        let stats = store.question_with_stats(qid).await.unwrap().unwrap();
        assert_eq!(stats.like_count, 0);
    }
}
