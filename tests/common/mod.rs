#![allow(dead_code)]

use vocab_srs::config::QuizConfig;
use vocab_srs::db::Db;
use vocab_srs::models::{NewVocabularyItem, UserId, VocabularyItem};
use vocab_srs::quiz::QuizService;
use vocab_srs::scheduler::Scheduler;

pub async fn create_test_db() -> Db {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let path =
        std::env::temp_dir().join(format!("vocab_srs_test_{}_{}.db", std::process::id(), id));
    // Clean up leftovers from previous runs
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
    }
    let url = format!("sqlite://{}?mode=rwc", path.display());
    Db::new(&url).await.expect("failed to create test database")
}

pub async fn quiz_service(config: QuizConfig) -> QuizService {
    QuizService::new(Scheduler::new(create_test_db().await, config))
}

pub async fn create_user(db: &Db, email: &str) -> UserId {
    let user = db.create_user(email, Some("Test User")).await.unwrap();
    UserId::new(user.id)
}

pub async fn add_word(db: &Db, user: &UserId, word: &str, difficulty: i64) -> VocabularyItem {
    db.create_item(
        user,
        &NewVocabularyItem {
            word: word.to_string(),
            definition: format!("meaning of {}", word),
            example: None,
            category: None,
            difficulty: Some(difficulty),
        },
    )
    .await
    .unwrap()
}
