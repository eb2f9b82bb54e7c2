use classroom::classroom::{BulkStudentEntry, LikeAction};
use classroom::{reset_db, setup_log, Classroom, ClassroomError};
use log::{info, warn};
use nu_ansi_term::Color::{Cyan, Red};

/// Test against the classroom API that stores data in memory.
#[tokio::test]
async fn test_in_memory_classroom() {
    setup_log();
    let classroom = Classroom::new_in_memory();
    test_classroom_scenario(&classroom).await;
}

/// Test against the classroom API that stores data in a database.
/// Requires a MySQL or MariaDB server running on localhost.
#[tokio::test]
async fn test_db_classroom() {
    setup_log();
    let schema_name = "test_db_classroom";
    match reset_db(schema_name).await {
        Ok(_) => {}
        Err(e) => {
            warn!(
                "Skipping test_db_classroom because we can't connect to the database: {}",
                e
            );
            return;
        }
    }
    info!("Starting test_db_classroom on database: {}", schema_name);
    let classroom = Classroom::new_db(schema_name).await.unwrap();
    test_classroom_scenario(&classroom).await;
}

pub async fn test_classroom_scenario(classroom: &Classroom) {
    let class_name = "Grade 3-1";

    info!("{}", Cyan.paint("=== Ms. Park registers; her class is created with her"));
    let _teacher_id = classroom
        .register_teacher("mpark", "chalk&talk", "Miss Park", "park@school.edu", class_name)
        .await
        .unwrap();

    info!("{}", Red.paint("=== A second account cannot reuse her username or email"));
    let err = classroom
        .register_teacher("mpark", "pw", "Someone Else", "other@school.edu", "Grade 9-9")
        .await
        .unwrap_err();
    assert!(matches!(err, ClassroomError::Conflict(_)), "{}", err);
    let err = classroom
        .register_teacher("other", "pw", "Someone Else", "park@school.edu", "Grade 9-9")
        .await
        .unwrap_err();
    assert!(matches!(err, ClassroomError::Conflict(_)), "{}", err);

    info!("{}", Cyan.paint("=== Ms. Park logs in"));
    let teacher = classroom.login("mpark", "chalk&talk").await.unwrap();
    assert_eq!(teacher.full_name, "Miss Park");
    assert_eq!(teacher.class_name, class_name);

    info!("{}", Red.paint("=== A wrong password is rejected"));
    let err = classroom.login("mpark", "guess").await.unwrap_err();
    assert!(matches!(err, ClassroomError::Unauthorized(_)), "{}", err);

    info!("{}", Cyan.paint("=== Ms. Park creates accounts for Alice and Bob"));
    let alice_id = classroom
        .create_student(teacher.id, "Alice Kim", "alice", "alice-pw")
        .await
        .unwrap();
    let bob_id = classroom
        .create_student(teacher.id, "Bob Lee", "bob", "bob-pw")
        .await
        .unwrap();

    info!("{}", Red.paint("=== A student cannot create accounts"));
    let err = classroom
        .create_student(alice_id, "Eve Cho", "eve", "eve-pw")
        .await
        .unwrap_err();
    assert!(matches!(err, ClassroomError::Forbidden(_)), "{}", err);

    info!("{}", Cyan.paint("=== Alice logs in and posts a question"));
    let alice = classroom.login("alice", "alice-pw").await.unwrap();
    assert_eq!(alice.class_name, class_name);
    let q1 = classroom
        .post_question(
            alice.id,
            "Why does the moon follow us when we walk?",
            "I noticed it on the way home yesterday",
            "science",
        )
        .await
        .unwrap();
    assert_eq!(q1.author_name, "Alice Kim");
    assert_eq!(q1.like_count, 0);

    info!("{}", Red.paint("=== A question without a reason is rejected"));
    let err = classroom
        .post_question(alice.id, "Half a question", " ", "science")
        .await
        .unwrap_err();
    assert!(matches!(err, ClassroomError::Validation(_)), "{}", err);

    info!("{}", Cyan.paint("=== Bob posts a question too"));
    let q2 = classroom
        .post_question(
            bob_id,
            "Who decided the order of the alphabet?",
            "We learned the alphabet song today",
            "language",
        )
        .await
        .unwrap();

    info!("{}", Cyan.paint("=== The today feed shows both, newest first"));
    let today = classroom.questions_today(class_name).await.unwrap();
    assert_eq!(today.len(), 2);
    assert_eq!(today.last().unwrap().id, q1.id);

    info!("{}", Cyan.paint("=== Liking twice toggles: liked, then unliked"));
    assert_eq!(
        classroom.toggle_like(bob_id, q1.id).await.unwrap(),
        LikeAction::Liked
    );
    let stats = find_question(classroom, class_name, q1.id).await;
    assert_eq!(stats.like_count, 1);
    assert_eq!(
        classroom.toggle_like(bob_id, q1.id).await.unwrap(),
        LikeAction::Unliked
    );
    let stats = find_question(classroom, class_name, q1.id).await;
    assert_eq!(stats.like_count, 0);

    info!("{}", Cyan.paint("=== Bob likes Alice's question; Ms. Park likes Bob's"));
    assert_eq!(
        classroom.toggle_like(bob_id, q1.id).await.unwrap(),
        LikeAction::Liked
    );
    assert_eq!(
        classroom.toggle_like(teacher.id, q2.id).await.unwrap(),
        LikeAction::Liked
    );

    info!("{}", Red.paint("=== Liking a nonexistent question fails"));
    let err = classroom.toggle_like(bob_id, 424242).await.unwrap_err();
    assert!(matches!(err, ClassroomError::NotFound(_)), "{}", err);

    info!("{}", Cyan.paint("=== The weekly tie goes to the earlier question"));
    let top = classroom.top_weekly(Some(class_name)).await.unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].like_count, top[1].like_count);
    assert_eq!(top[0].id, q1.id);
    assert_eq!(top[1].id, q2.id);

    info!("{}", Cyan.paint("=== Comments collect under Alice's question, oldest first"));
    classroom
        .add_comment(bob_id, q1.id, "I wondered the same thing!")
        .await
        .unwrap();
    classroom
        .add_comment(teacher.id, q1.id, "Try watching it from a moving car.")
        .await
        .unwrap();
    let comments = classroom.comments(q1.id).await.unwrap();
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0].author_name, "Bob Lee");
    assert_eq!(comments[1].author_name, "Miss Park");

    info!("{}", Red.paint("=== Commenting on a nonexistent question fails"));
    let err = classroom
        .add_comment(bob_id, 424242, "hello?")
        .await
        .unwrap_err();
    assert!(matches!(err, ClassroomError::NotFound(_)), "{}", err);

    info!("{}", Red.paint("=== Bob cannot edit Alice's question"));
    let err = classroom
        .edit_question(bob_id, q1.id, "Hijacked", "none", "other")
        .await
        .unwrap_err();
    assert!(matches!(err, ClassroomError::Forbidden(_)), "{}", err);
    let stats = find_question(classroom, class_name, q1.id).await;
    assert_eq!(stats.content, "Why does the moon follow us when we walk?");

    info!("{}", Cyan.paint("=== Alice edits her own question"));
    let edited = classroom
        .edit_question(
            alice.id,
            q1.id,
            "Why does the moon seem to follow us when we walk?",
            "I noticed it again tonight",
            "science",
        )
        .await
        .unwrap();
    assert_eq!(edited.content, "Why does the moon seem to follow us when we walk?");

    info!("{}", Cyan.paint("=== Ms. Park checks her class stats"));
    let stats = classroom.teacher_stats(class_name).await.unwrap();
    assert_eq!(stats.today_questions, 2);
    assert_eq!(stats.week_questions, 2);
    assert_eq!(stats.active_students, 2);
    assert_eq!(stats.total_students, 2);

    info!("{}", Cyan.paint("=== Alice checks her personal stats"));
    let counts = classroom.student_stats(alice.id).await.unwrap();
    assert_eq!(counts.total_questions, 1);
    assert_eq!(counts.total_likes, 1);
    assert_eq!(counts.total_comments, 2);
    assert_eq!(counts.week_questions, 1);
    let best = counts.best_question.unwrap();
    assert_eq!(best.like_count, 1);

    info!("{}", Cyan.paint("=== The roster lists both students, by name"));
    let students = classroom.class_students(class_name).await.unwrap();
    assert_eq!(students.len(), 2);
    assert_eq!(students[0].full_name, "Alice Kim");
    assert_eq!(students[1].full_name, "Bob Lee");
    assert_eq!(students[0].question_count, 1);

    info!("{}", Cyan.paint("=== A bulk upload creates what it can and reports the rest"));
    let outcome = classroom
        .bulk_create_students(
            teacher.id,
            &[
                BulkStudentEntry {
                    name: "Chad Oh".to_string(),
                    username: "chad".to_string(),
                    password: "chad-pw".to_string(),
                },
                BulkStudentEntry {
                    name: "Dana Seo".to_string(),
                    username: "alice".to_string(),
                    password: "dana-pw".to_string(),
                },
                BulkStudentEntry {
                    name: "Eun Ji".to_string(),
                    username: "eunji".to_string(),
                    password: String::new(),
                },
            ],
        )
        .await
        .unwrap();
    assert_eq!(outcome.created.len(), 1);
    assert_eq!(outcome.created[0].username, "chad");
    assert_eq!(outcome.errors.len(), 2);

    info!("{}", Cyan.paint("=== Ms. Park resets her password by email"));
    let temp_password = classroom.forgot_password("park@school.edu").await.unwrap();
    assert!(classroom.login("mpark", "chalk&talk").await.is_err());
    let teacher_again = classroom.login("mpark", &temp_password).await.unwrap();
    assert_eq!(teacher_again.id, teacher.id);

    info!("{}", Red.paint("=== An unknown email cannot reset anything"));
    let err = classroom
        .forgot_password("stranger@school.edu")
        .await
        .unwrap_err();
    assert!(matches!(err, ClassroomError::NotFound(_)), "{}", err);

    info!("{}", Red.paint("=== Deleting a teacher through the student path fails"));
    let err = classroom.delete_student(teacher.id).await.unwrap_err();
    assert!(matches!(err, ClassroomError::NotFound(_)), "{}", err);

    info!("{}", Cyan.paint("=== Deleting Bob cascades through his activity"));
    let deleted_name = classroom.delete_student(bob_id).await.unwrap();
    assert_eq!(deleted_name, "Bob Lee");

    // His question is gone from the feed, his like and comment are gone from
    // Alice's question, and his account no longer authenticates.
    let today = classroom.questions_today(class_name).await.unwrap();
    assert_eq!(today.len(), 1);
    assert_eq!(today[0].id, q1.id);
    assert_eq!(today[0].like_count, 0);
    assert_eq!(today[0].comment_count, 1);
    let comments = classroom.comments(q1.id).await.unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].author_name, "Miss Park");
    let counts = classroom.student_stats(bob_id).await.unwrap();
    assert_eq!(counts.total_questions, 0);
    assert_eq!(counts.total_likes, 0);
    assert!(counts.best_question.is_none());
    assert!(classroom.login("bob", "bob-pw").await.is_err());

    info!("{}", Red.paint("=== Deleting him again reports him missing"));
    let err = classroom.delete_student(bob_id).await.unwrap_err();
    assert!(matches!(err, ClassroomError::NotFound(_)), "{}", err);
}

async fn find_question(
    classroom: &Classroom,
    class_name: &str,
    question_id: i64,
) -> classroom::question::QuestionWithStats {
    classroom
        .questions_today(class_name)
        .await
        .unwrap()
        .into_iter()
        .find(|q| q.id == question_id)
        .unwrap()
}
