use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::user::Role;

/// A stored question row.
#[derive(Debug, Clone)]
pub struct Question {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    pub reason: Option<String>,
    pub category: Option<String>,
    pub date: NaiveDate,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// The feed shape: a question joined with its author and read-time counts.
/// Matches the `questions_with_stats` view column for column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionWithStats {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    pub reason: Option<String>,
    pub category: Option<String>,
    pub date: NaiveDate,
    pub created_at: NaiveDateTime,
    pub author_name: String,
    pub author_type: Role,
    pub class_name: String,
    pub like_count: i64,
    pub comment_count: i64,
}

/// A comment joined with its author, as listed under a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub question_id: i64,
    pub user_id: i64,
    pub content: String,
    pub created_at: NaiveDateTime,
    pub author_name: String,
    pub author_type: Role,
}

/// A comment someone left on one of the viewer's questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedComment {
    pub id: i64,
    pub question_id: i64,
    pub content: String,
    pub created_at: NaiveDateTime,
    pub question_content: String,
    pub commenter_name: String,
}

/// Aggregate counts for a teacher's class dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherStats {
    pub today_questions: i64,
    pub week_questions: i64,
    pub active_students: i64,
    pub total_students: i64,
}

/// The viewer's most-liked question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestQuestion {
    pub content: String,
    pub like_count: i64,
}

/// Per-student aggregate counts, as produced by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentCounts {
    pub total_likes: i64,
    pub total_questions: i64,
    pub total_comments: i64,
    pub week_questions: i64,
    pub best_question: Option<BestQuestion>,
}

/// A roster row with activity counts, for the teacher's student list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentSummary {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub created_at: NaiveDateTime,
    pub question_count: i64,
    pub week_question_count: i64,
}

/// Like-count thresholds for the question levels shown on the student
/// dashboard.
const LEVELS: [(i64, &str); 4] = [
    (0, "Curiosity Seed"),
    (21, "Curiosity Sprout"),
    (51, "Curiosity Tree"),
    (101, "Curiosity Forest"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelInfo {
    pub name: String,
    pub total_likes: i64,
    pub progress_percent: u8,
    pub next_level: Option<String>,
    pub next_threshold: Option<i64>,
}

/// Maps a total like count onto the level ladder.
pub fn level_for(total_likes: i64) -> LevelInfo {
    let likes = total_likes.max(0);
    let mut index = 0;
    for (i, (threshold, _)) in LEVELS.iter().enumerate() {
        if likes >= *threshold {
            index = i;
        }
    }
    let (floor, name) = LEVELS[index];
    match LEVELS.get(index + 1) {
        Some((next_floor, next_name)) => {
            let span = next_floor - floor;
            let progress = ((likes - floor) * 100 / span).min(100) as u8;
            LevelInfo {
                name: name.to_string(),
                total_likes: likes,
                progress_percent: progress,
                next_level: Some(next_name.to_string()),
                next_threshold: Some(*next_floor),
            }
        }
        None => LevelInfo {
            name: name.to_string(),
            total_likes: likes,
            progress_percent: 100,
            next_level: None,
            next_threshold: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ladder() {
        let seed = level_for(0);
        assert_eq!(seed.name, "Curiosity Seed");
        assert_eq!(seed.progress_percent, 0);
        assert_eq!(seed.next_threshold, Some(21));

        let sprout = level_for(21);
        assert_eq!(sprout.name, "Curiosity Sprout");
        assert_eq!(sprout.next_level.as_deref(), Some("Curiosity Tree"));

        let forest = level_for(500);
        assert_eq!(forest.name, "Curiosity Forest");
        assert_eq!(forest.progress_percent, 100);
        assert_eq!(forest.next_level, None);
    }
}
