use practice_core::model::{CourseId, CourseScope, ProgressRecord, QuestionId, StudentId};
use practice_core::time::fixed_now;
use storage::repository::{ProgressStore, ProgressTransaction, StorageError};
use storage::sqlite::SqliteRepository;

fn scope(student: &str, course: &str) -> CourseScope {
    CourseScope::new(
        StudentId::parse(student).unwrap(),
        CourseId::parse(course).unwrap(),
    )
}

fn q(id: &str) -> QuestionId {
    QuestionId::parse(id).unwrap()
}

async fn file_repo() -> (tempfile::TempDir, SqliteRepository) {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("progress.sqlite3").display()
    );
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    (dir, repo)
}

#[tokio::test]
async fn sqlite_roundtrip_persists_progress() {
    let (_dir, repo) = file_repo().await;
    let s = scope("s1", "c1");

    let mut tx = repo.begin(&s).await.unwrap();
    assert_eq!(tx.count_records().await.unwrap(), 0);
    tx.bulk_insert(&[
        ProgressRecord::fresh(&s, q("q1"), fixed_now()),
        ProgressRecord::fresh(&s, q("q2"), fixed_now()),
    ])
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let stored = repo.list_progress(&s).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].question_id, q("q1"));
    assert_eq!(stored[0].correct_streak, 0);
    assert!(stored[0].is_in_active_set);
    assert!(!stored[0].is_mastered);
    assert_eq!(stored[0].updated_at, fixed_now());

    assert!(repo.list_progress(&scope("s2", "c1")).await.unwrap().is_empty());
}

#[tokio::test]
async fn sqlite_upsert_updates_mutable_fields() {
    let (_dir, repo) = file_repo().await;
    let s = scope("s1", "c1");

    let mut tx = repo.begin(&s).await.unwrap();
    tx.upsert_record(&ProgressRecord::fresh(&s, q("q1"), fixed_now()))
        .await
        .unwrap();

    let mut record = tx.get_record(&q("q1")).await.unwrap().expect("tracked");
    record.correct_streak = 3;
    record.is_mastered = true;
    record.is_in_active_set = false;
    tx.upsert_record(&record).await.unwrap();

    assert!(tx.list_active_question_ids().await.unwrap().is_empty());
    let used = tx.list_used_question_ids().await.unwrap();
    assert!(used.contains(&q("q1")));
    assert_eq!(tx.get_record(&q("q2")).await.unwrap(), None);
    tx.commit().await.unwrap();

    let stored = repo.list_progress(&s).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].correct_streak, 3);
    assert!(stored[0].is_mastered);
}

#[tokio::test]
async fn sqlite_dropped_transaction_rolls_back() {
    let (_dir, repo) = file_repo().await;
    let s = scope("s1", "c1");

    let mut tx = repo.begin(&s).await.unwrap();
    tx.bulk_insert(&[ProgressRecord::fresh(&s, q("q1"), fixed_now())])
        .await
        .unwrap();
    drop(tx);

    assert!(repo.list_progress(&s).await.unwrap().is_empty());
}

#[tokio::test]
async fn sqlite_duplicate_bulk_insert_is_conflict() {
    let (_dir, repo) = file_repo().await;
    let s = scope("s1", "c1");

    let mut tx = repo.begin(&s).await.unwrap();
    let err = tx
        .bulk_insert(&[
            ProgressRecord::fresh(&s, q("q1"), fixed_now()),
            ProgressRecord::fresh(&s, q("q1"), fixed_now()),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_second_writer_waits_for_first_commit() {
    let (_dir, repo) = file_repo().await;
    let s = scope("s1", "c1");

    let mut first = repo.begin(&s).await.unwrap();
    assert_eq!(first.count_records().await.unwrap(), 0);

    let waiter = {
        let repo = repo.clone();
        let s = s.clone();
        tokio::spawn(async move {
            let mut second = repo.begin(&s).await?;
            let seen = second.count_records().await?;
            second
                .bulk_insert(&[ProgressRecord::fresh(&s, q("q2"), fixed_now())])
                .await?;
            second.commit().await?;
            Ok::<_, StorageError>(seen)
        })
    };

    first
        .bulk_insert(&[ProgressRecord::fresh(&s, q("q1"), fixed_now())])
        .await
        .unwrap();
    first.commit().await.unwrap();

    let seen = waiter.await.expect("join").expect("second writer");
    assert_eq!(seen, 1);

    let stored = repo.list_progress(&s).await.unwrap();
    let ids: Vec<_> = stored.into_iter().map(|r| r.question_id).collect();
    assert_eq!(ids, vec![q("q1"), q("q2")]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_writers_in_different_scopes_all_commit() {
    let (_dir, repo) = file_repo().await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            let s = scope(&format!("s{i}"), "c1");
            let mut tx = repo.begin(&s).await?;
            tx.count_records().await?;
            tx.upsert_record(&ProgressRecord::fresh(&s, q("q1"), fixed_now()))
                .await?;
            tx.commit().await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("commit");
    }

    for i in 0..20 {
        let stored = repo.list_progress(&scope(&format!("s{i}"), "c1")).await.unwrap();
        assert_eq!(stored.len(), 1);
    }
}
