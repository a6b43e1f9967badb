mod common;

use chrono::{DateTime, Duration, TimeZone, Utc};
use common::{add_word, create_user, quiz_service};
use vocab_srs::config::QuizConfig;
use vocab_srs::models::{QuizSubmission, SubmittedAnswer, UserId};
use vocab_srs::SrsError;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 20, 18, 0, 0).unwrap()
}

fn answer(id: &str, text: &str) -> SubmittedAnswer {
    SubmittedAnswer {
        vocabulary_id: id.to_string(),
        submitted_text: text.to_string(),
        time_taken: 4,
    }
}

fn submission(answers: Vec<SubmittedAnswer>) -> QuizSubmission {
    QuizSubmission {
        answers,
        total_time_spent: 42,
        question_count: None,
    }
}

#[tokio::test]
async fn empty_pool_is_reported_distinctly() {
    let quiz = quiz_service(QuizConfig::default()).await;
    let user = create_user(quiz.scheduler().db(), "empty@example.com").await;

    let err = quiz.begin_quiz_at(&user, t0()).await.unwrap_err();
    assert!(matches!(err, SrsError::EmptyQuizPool));

    let err = quiz.begin_quiz_at(&UserId::new("ghost"), t0()).await.unwrap_err();
    assert!(matches!(err, SrsError::NotFound(_)));
}

#[tokio::test]
async fn begin_quiz_caps_question_count() {
    let quiz = quiz_service(QuizConfig::default()).await;
    let db = quiz.scheduler().db();
    let user = create_user(db, "cap@example.com").await;
    for i in 0..12 {
        add_word(db, &user, &format!("word{}", i), 1 + i % 5).await;
    }

    let questions = quiz.begin_quiz_at(&user, t0()).await.unwrap();
    assert_eq!(questions.len(), 10);
    assert!(questions.iter().all(|q| q.level.is_none()));
    assert!(questions.windows(2).all(|w| w[0].difficulty <= w[1].difficulty));
}

#[tokio::test]
async fn single_correct_answer_on_new_item() {
    let quiz = quiz_service(QuizConfig::default()).await;
    let db = quiz.scheduler().db();
    let user = create_user(db, "single@example.com").await;
    let item = add_word(db, &user, "apple", 1).await;

    let session_id = quiz
        .submit_quiz_at(&user, &submission(vec![answer(&item.id, "  Apple ")]), t0())
        .await
        .unwrap();

    let progress = db.get_progress(&user, &item.id).await.unwrap().unwrap();
    assert_eq!(progress.level, 2);
    assert_eq!(progress.correct_count, 1);
    assert_eq!(progress.total_count, 1);
    assert_eq!(progress.next_review, t0() + Duration::days(1));

    let sessions = quiz.recent_sessions(&user).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, session_id);
    assert_eq!(sessions[0].score, 1);
    assert_eq!(sessions[0].total_questions, 1);
    assert_eq!(sessions[0].time_spent, 42);
    assert_eq!(sessions[0].completed_at, t0());

    let answers = quiz.session_answers(&user, &session_id).await.unwrap();
    assert_eq!(answers.len(), 1);
    assert!(answers[0].correct);
    assert_eq!(answers[0].vocabulary_id, item.id);
    assert_eq!(answers[0].time_taken, 4);

    // Answered items wait for their review date.
    let err = quiz.begin_quiz_at(&user, t0() + Duration::hours(1)).await.unwrap_err();
    assert!(matches!(err, SrsError::EmptyQuizPool));
    let again = quiz.begin_quiz_at(&user, t0() + Duration::days(1)).await.unwrap();
    assert_eq!(again[0].level, Some(2));
}

#[tokio::test]
async fn correctness_is_graded_on_the_server() {
    let quiz = quiz_service(QuizConfig::default()).await;
    let db = quiz.scheduler().db();
    let user = create_user(db, "grading@example.com").await;
    let apple = add_word(db, &user, "apple", 1).await;
    let pear = add_word(db, &user, "Pear", 1).await;

    let session_id = quiz
        .submit_quiz_at(
            &user,
            &submission(vec![answer(&apple.id, "Apple!"), answer(&pear.id, "PEAR")]),
            t0(),
        )
        .await
        .unwrap();

    let answers = quiz.session_answers(&user, &session_id).await.unwrap();
    let flags: Vec<bool> = answers.iter().map(|a| a.correct).collect();
    assert_eq!(flags, vec![false, true]);
    assert_eq!(quiz.recent_sessions(&user).await.unwrap()[0].score, 1);

    assert_eq!(db.get_progress(&user, &apple.id).await.unwrap().unwrap().level, 1);
    assert_eq!(db.get_progress(&user, &pear.id).await.unwrap().unwrap().level, 2);

    let check = quiz.check_answer(&user, &pear.id, " pear").await.unwrap();
    assert!(check.correct);
    assert_eq!(check.word, "Pear");
}

#[tokio::test]
async fn existing_top_level_stays_clamped() {
    let quiz = quiz_service(QuizConfig::default()).await;
    let db = quiz.scheduler().db();
    let user = create_user(db, "top@example.com").await;
    let item = add_word(db, &user, "summit", 4).await;

    let mut now = t0();
    for _ in 0..4 {
        quiz.scheduler().apply_result_at(&user, &item.id, true, now).await.unwrap();
        now += Duration::days(40);
    }
    assert_eq!(db.get_progress(&user, &item.id).await.unwrap().unwrap().level, 5);

    quiz.submit_quiz_at(&user, &submission(vec![answer(&item.id, "summit")]), now)
        .await
        .unwrap();
    let progress = db.get_progress(&user, &item.id).await.unwrap().unwrap();
    assert_eq!(progress.level, 5);
    assert_eq!(progress.next_review, now + Duration::days(30));
}

#[tokio::test]
async fn repeated_item_compounds_transitions() {
    let quiz = quiz_service(QuizConfig::default()).await;
    let db = quiz.scheduler().db();
    let user = create_user(db, "twice@example.com").await;
    let item = add_word(db, &user, "echo", 1).await;

    quiz.submit_quiz_at(
        &user,
        &submission(vec![answer(&item.id, "echo"), answer(&item.id, "echo")]),
        t0(),
    )
    .await
    .unwrap();

    let progress = db.get_progress(&user, &item.id).await.unwrap().unwrap();
    assert_eq!(progress.level, 3);
    assert_eq!(progress.next_review, t0() + Duration::days(7));
    assert_eq!(progress.correct_count, 2);
    assert_eq!(progress.total_count, 2);
}

#[tokio::test]
async fn repeated_item_can_be_rejected() {
    let quiz = quiz_service(QuizConfig {
        reject_duplicate_answers: true,
        ..QuizConfig::default()
    })
    .await;
    let db = quiz.scheduler().db();
    let user = create_user(db, "strict@example.com").await;
    let item = add_word(db, &user, "echo", 1).await;

    let err = quiz
        .submit_quiz_at(
            &user,
            &submission(vec![answer(&item.id, "echo"), answer(&item.id, "echo")]),
            t0(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SrsError::Validation(_)));
    assert!(db.get_progress(&user, &item.id).await.unwrap().is_none());
    assert!(quiz.recent_sessions(&user).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_item_aborts_the_whole_submission() {
    let quiz = quiz_service(QuizConfig::default()).await;
    let db = quiz.scheduler().db();
    let user = create_user(db, "atomic@example.com").await;
    let other = create_user(db, "stranger@example.com").await;
    let mine = add_word(db, &user, "mine", 1).await;
    let theirs = add_word(db, &other, "theirs", 1).await;

    for bad in ["does-not-exist", theirs.id.as_str()] {
        let err = quiz
            .submit_quiz_at(
                &user,
                &submission(vec![answer(&mine.id, "mine"), answer(bad, "x")]),
                t0(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SrsError::Validation(_)));
    }

    assert!(db.get_progress(&user, &mine.id).await.unwrap().is_none());
    assert!(db.get_progress(&other, &theirs.id).await.unwrap().is_none());
    assert!(quiz.recent_sessions(&user).await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_submissions_are_rejected() {
    let quiz = quiz_service(QuizConfig::default()).await;
    let db = quiz.scheduler().db();
    let user = create_user(db, "malformed@example.com").await;
    let item = add_word(db, &user, "word", 1).await;

    let mut negative = submission(vec![answer(&item.id, "word")]);
    negative.answers[0].time_taken = -3;
    let mut mismatched = submission(vec![answer(&item.id, "word")]);
    mismatched.question_count = Some(5);

    for bad in [submission(vec![]), negative, mismatched] {
        let err = quiz.submit_quiz_at(&user, &bad, t0()).await.unwrap_err();
        assert!(matches!(err, SrsError::Validation(_)));
    }
    assert!(quiz.recent_sessions(&user).await.unwrap().is_empty());

    let err = quiz
        .submit_quiz_at(&UserId::new("ghost"), &submission(vec![answer(&item.id, "word")]), t0())
        .await
        .unwrap_err();
    assert!(matches!(err, SrsError::NotFound(_)));
}

#[tokio::test]
async fn sessions_are_private_and_newest_first() {
    let quiz = quiz_service(QuizConfig::default()).await;
    let db = quiz.scheduler().db();
    let user = create_user(db, "history@example.com").await;
    let other = create_user(db, "nosy@example.com").await;
    let item = add_word(db, &user, "history", 1).await;

    let first = quiz
        .submit_quiz_at(&user, &submission(vec![answer(&item.id, "nope")]), t0())
        .await
        .unwrap();
    let second = quiz
        .submit_quiz_at(
            &user,
            &submission(vec![answer(&item.id, "history")]),
            t0() + Duration::days(2),
        )
        .await
        .unwrap();

    let ids: Vec<String> = quiz
        .recent_sessions(&user)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, vec![second, first.clone()]);

    assert!(quiz.recent_sessions(&other).await.unwrap().is_empty());
    let err = quiz.session_answers(&other, &first).await.unwrap_err();
    assert!(matches!(err, SrsError::NotFound(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_submissions_for_one_item_all_commit() {
    let quiz = quiz_service(QuizConfig::default()).await;
    let db = quiz.scheduler().db();
    let user = create_user(db, "crowd@example.com").await;
    let item = add_word(db, &user, "tide", 1).await;

    let racers = 8;
    let mut handles = Vec::new();
    for i in 0..racers {
        let quiz = quiz.clone();
        let user = user.clone();
        let text = if i % 2 == 0 { "tide" } else { "wave" };
        let submission = submission(vec![answer(&item.id, text)]);
        handles.push(tokio::spawn(async move {
            quiz.submit_quiz(&user, &submission).await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let progress = db.get_progress(&user, &item.id).await.unwrap().unwrap();
    let sessions = quiz.recent_sessions(&user).await.unwrap();
    assert_eq!(sessions.len(), racers);
    assert_eq!(progress.total_count, sessions.len() as i64);
    assert_eq!(progress.correct_count, racers as i64 / 2);
    assert_eq!(
        progress.correct_count,
        sessions.iter().map(|s| s.score).sum::<i64>()
    );
}
