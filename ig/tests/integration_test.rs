//! Integration tests for Integrator
//!
//! These tests drive the JobManager end to end with in-memory and file
//! connectors.

use std::sync::Arc;
use std::time::Duration;

use integrator::batch::BatchProcessor;
use integrator::catalog::StaticCatalog;
use integrator::connector::{FileConnectorConfig, FileDestination, FileSource, MemoryDestination, MemorySource};
use integrator::domain::{INTERRUPTED_MESSAGE, JobStatus, JobTransition, MappingSpec, TransformRules, TransformStep};
use integrator::job::{JobError, JobManager, JobTaskResult};
use integrator::state::StateManager;
use serde_json::{Value, json};
use tempfile::TempDir;

async fn catalog_with(source: MemorySource, destination: Arc<MemoryDestination>) -> Arc<StaticCatalog> {
    let catalog = Arc::new(StaticCatalog::new());
    catalog.insert_mapping(MappingSpec::new("m1", "src", "dst")).await;
    catalog.insert_source("src", Arc::new(source)).await;
    catalog.insert_destination("dst", destination).await;
    catalog
}

// =============================================================================
// Batch outcomes
// =============================================================================

#[tokio::test]
async fn test_partial_batch_failure_completes_job() {
    let dest = Arc::new(MemoryDestination::new().fail_on_send(2, "HTTP 500: upstream unavailable"));
    let catalog = catalog_with(MemorySource::numbered(250), dest.clone()).await;
    let manager = JobManager::new(StateManager::spawn_in_memory(), catalog);

    let job = manager.create_job("m1", "partial").await.unwrap();
    manager.start_job(&job.id).await.unwrap();
    let result = manager.wait(&job.id).await.unwrap().unwrap();

    let JobTaskResult::Completed(summary) = result else {
        panic!("Expected Completed, got {:?}", result);
    };
    assert_eq!(summary.batches, 3);

    let status = manager.get_job_status(&job.id).await.unwrap();
    assert_eq!(status.status, JobStatus::Completed);
    assert_eq!(status.records_processed, 150);
    assert_eq!(status.records_failed, 100);
    assert_eq!(
        status.error_log.as_deref(),
        Some("batch 2: HTTP 500: upstream unavailable")
    );

    let sizes: Vec<usize> = dest.batches().await.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![100, 50]);
}

#[tokio::test]
async fn test_mapping_and_rules_applied_per_record() {
    let source = MemorySource::new(json!([
        {"first": "  ada ", "born": "1815-12-10", "score": "4.567", "tier": "g"},
        {"first": "alan", "born": "not a date", "score": "n/a"}
    ]));
    let dest = Arc::new(MemoryDestination::new());

    let catalog = Arc::new(StaticCatalog::new());
    let mut spec = MappingSpec::new("people", "src", "dst")
        .with_field("name", "first")
        .with_field("birthday", "born")
        .with_field("score", "score")
        .with_rules(
            TransformRules::new()
                .with_step("name", TransformStep::new("trim"))
                .with_step("name", TransformStep::new("uppercase"))
                .with_step("birthday", TransformStep::new("format_date").with_param("format", "%d/%m/%Y"))
                .with_step("score", TransformStep::new("round").with_param("decimals", 1))
                .with_step(
                    "level",
                    TransformStep::new("map_value").with_param("mapping", json!({"g": "gold"})),
                ),
        );
    spec.mapping_config
        .insert("level".to_string(), serde_json::from_value(json!({"source": "tier", "default": "none"})).unwrap());
    catalog.insert_mapping(spec).await;
    catalog.insert_source("src", Arc::new(source)).await;
    catalog.insert_destination("dst", dest.clone()).await;

    let manager = JobManager::new(StateManager::spawn_in_memory(), catalog);
    let job = manager.create_job("people", "people").await.unwrap();
    manager.start_job(&job.id).await.unwrap();
    manager.wait(&job.id).await.unwrap();

    let records: Vec<Value> = dest.records().await.into_iter().map(Value::Object).collect();
    assert_eq!(
        records,
        vec![
            json!({"name": "ADA", "birthday": "10/12/1815", "score": 4.6, "level": "gold"}),
            // unparseable values pass through untouched
            json!({"name": "ALAN", "birthday": "not a date", "score": "n/a", "level": "none"}),
        ]
    );
    assert_eq!(manager.get_job_status(&job.id).await.unwrap().records_failed, 0);
}

#[tokio::test]
async fn test_file_to_file_pipeline() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let input = temp.path().join("in.jsonl");
    std::fs::write(&input, "{\"id\":1,\"email\":\"A@X.COM\"}\n{\"id\":2,\"email\":\"b@y.com\"}\n").unwrap();
    let output = temp.path().join("out").join("result.jsonl");

    let catalog = Arc::new(StaticCatalog::new());
    catalog
        .insert_mapping(
            MappingSpec::new("emails", "in", "out")
                .with_field("contact", "email")
                .with_rules(TransformRules::new().with_step("contact", TransformStep::new("lowercase"))),
        )
        .await;
    catalog
        .insert_source("in", Arc::new(FileSource::new(FileConnectorConfig::new(&input))))
        .await;
    catalog
        .insert_destination("out", Arc::new(FileDestination::new(FileConnectorConfig::new(&output))))
        .await;

    let manager = JobManager::new(StateManager::spawn_in_memory(), catalog)
        .with_processor(BatchProcessor::new(1));
    let job = manager.create_job("emails", "emails").await.unwrap();
    manager.start_job(&job.id).await.unwrap();
    manager.wait(&job.id).await.unwrap();

    let written = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<Value> = written.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(lines, vec![json!({"contact": "a@x.com"}), json!({"contact": "b@y.com"})]);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_retry_failed_job() {
    let dest = Arc::new(MemoryDestination::new());
    let catalog = catalog_with(MemorySource::failing("connection refused"), dest.clone()).await;
    let manager = JobManager::new(StateManager::spawn_in_memory(), catalog.clone());

    let job = manager.create_job("m1", "flaky").await.unwrap();
    manager.start_job(&job.id).await.unwrap();
    manager.wait(&job.id).await.unwrap();
    let status = manager.get_job_status(&job.id).await.unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert!(status.error_log.unwrap().contains("connection refused"));

    // the source recovers
    catalog.insert_source("src", Arc::new(MemorySource::numbered(20))).await;

    let restarted = manager.retry_job(&job.id).await.unwrap();
    assert_eq!(restarted.status, JobStatus::Running);
    assert!(restarted.error_log.is_none());
    manager.wait(&job.id).await.unwrap();

    let status = manager.get_job_status(&job.id).await.unwrap();
    assert_eq!(status.status, JobStatus::Completed);
    assert_eq!(status.records_processed, 20);
    assert!(status.error_log.is_none());
    assert_eq!(dest.records().await.len(), 20);
}

#[tokio::test]
async fn test_retry_resets_counters_before_pending() {
    let catalog = catalog_with(MemorySource::numbered(1), Arc::new(MemoryDestination::new())).await;
    let manager = JobManager::new(StateManager::spawn_in_memory(), catalog);
    let state = manager.state().clone();

    let job = manager.create_job("m1", "reset").await.unwrap();
    state.transition_job(&job.id, JobTransition::Start).await.unwrap();
    state.record_progress(&job.id, 40, 60).await.unwrap();
    state
        .transition_job(
            &job.id,
            JobTransition::Fail {
                error: "boom".to_string(),
            },
        )
        .await
        .unwrap();

    let reset = state.transition_job(&job.id, JobTransition::Retry).await.unwrap();
    assert_eq!(reset.status, JobStatus::Pending);
    assert_eq!(reset.records_processed, 0);
    assert_eq!(reset.records_failed, 0);
    assert!(reset.error_log.is_none());
    assert!(reset.started_at.is_none());
    assert!(reset.completed_at.is_none());
}

#[tokio::test]
async fn test_cancel_running_job_stops_between_batches() {
    let dest = Arc::new(MemoryDestination::new().with_delay(Duration::from_millis(50)));
    let catalog = catalog_with(MemorySource::numbered(100), dest.clone()).await;
    let manager = JobManager::new(StateManager::spawn_in_memory(), catalog)
        .with_processor(BatchProcessor::new(10));

    let job = manager.create_job("m1", "slow").await.unwrap();
    manager.start_job(&job.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    let cancelled = manager.cancel_job(&job.id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.completed_at.is_some());

    let result = tokio::time::timeout(Duration::from_secs(5), manager.wait(&job.id))
        .await
        .expect("job should stop after cancellation")
        .unwrap();
    assert_eq!(result, Some(JobTaskResult::Cancelled));

    let status = manager.get_job_status(&job.id).await.unwrap();
    assert_eq!(status.status, JobStatus::Cancelled);
    assert!(status.records_processed < 100);
    // the batch in flight at cancel time is still counted
    assert_eq!(status.records_processed as usize, dest.records().await.len());
}

#[tokio::test]
async fn test_cancel_completed_job_rejected() {
    let catalog = catalog_with(MemorySource::numbered(3), Arc::new(MemoryDestination::new())).await;
    let manager = JobManager::new(StateManager::spawn_in_memory(), catalog);

    let job = manager.create_job("m1", "done").await.unwrap();
    manager.start_job(&job.id).await.unwrap();
    manager.wait(&job.id).await.unwrap();

    let err = manager.cancel_job(&job.id).await.unwrap_err();
    assert!(matches!(err, JobError::Transition(_)));
    assert_eq!(err.to_string(), format!("Job {} cannot be cancelled in status completed", job.id));
    assert_eq!(
        manager.get_job_status(&job.id).await.unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn test_concurrent_jobs() {
    let dest_a = Arc::new(MemoryDestination::new().with_delay(Duration::from_millis(20)));
    let dest_b = Arc::new(MemoryDestination::new().with_delay(Duration::from_millis(20)));
    let catalog = Arc::new(StaticCatalog::new());
    catalog.insert_mapping(MappingSpec::new("a", "src-a", "dst-a")).await;
    catalog.insert_mapping(MappingSpec::new("b", "src-b", "dst-b")).await;
    catalog.insert_source("src-a", Arc::new(MemorySource::numbered(30))).await;
    catalog.insert_source("src-b", Arc::new(MemorySource::numbered(50))).await;
    catalog.insert_destination("dst-a", dest_a.clone()).await;
    catalog.insert_destination("dst-b", dest_b.clone()).await;

    let manager = JobManager::new(StateManager::spawn_in_memory(), catalog)
        .with_processor(BatchProcessor::new(10));
    let a = manager.create_job("a", "a").await.unwrap();
    let b = manager.create_job("b", "b").await.unwrap();
    manager.start_job(&a.id).await.unwrap();
    manager.start_job(&b.id).await.unwrap();
    assert_eq!(manager.active_jobs().await.len(), 2);

    manager.wait(&a.id).await.unwrap();
    manager.wait(&b.id).await.unwrap();

    assert_eq!(manager.get_job_status(&a.id).await.unwrap().records_processed, 30);
    assert_eq!(manager.get_job_status(&b.id).await.unwrap().records_processed, 50);
    assert_eq!(dest_a.records().await.len(), 30);
    assert_eq!(dest_b.records().await.len(), 50);
    assert_eq!(manager.list_jobs(Some(JobStatus::Completed)).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_progress_visible_while_running() {
    let dest = Arc::new(MemoryDestination::new().with_delay(Duration::from_millis(40)));
    let catalog = catalog_with(MemorySource::numbered(50), dest).await;
    let manager = JobManager::new(StateManager::spawn_in_memory(), catalog)
        .with_processor(BatchProcessor::new(10));
    let mut events = manager.state().subscribe_events();

    let job = manager.create_job("m1", "watched").await.unwrap();
    manager.start_job(&job.id).await.unwrap();
    manager.wait(&job.id).await.unwrap();

    let mut progress = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let integrator::state::StateEvent::JobProgress { processed, failed, .. } = event {
            progress.push((processed, failed));
        }
    }
    assert_eq!(progress, vec![(10, 0), (20, 0), (30, 0), (40, 0), (50, 0)]);
}

#[tokio::test]
async fn test_job_state_persists_across_restart() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let catalog = catalog_with(MemorySource::numbered(5), Arc::new(MemoryDestination::new())).await;

    let job_id = {
        let manager = JobManager::new(StateManager::spawn(temp.path()).unwrap(), catalog);
        let job = manager.create_job("m1", "durable").await.unwrap();
        manager.start_job(&job.id).await.unwrap();
        manager.wait(&job.id).await.unwrap();
        manager.shutdown().await.unwrap();
        job.id
    };

    let state = StateManager::spawn(temp.path()).unwrap();
    let job = state.get_job_required(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.records_processed, 5);
    assert_eq!(job.name, "durable");
}

#[tokio::test]
async fn test_shutdown_fails_running_job_for_retry() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let dest = Arc::new(MemoryDestination::new().with_delay(Duration::from_millis(30)));
    let catalog = catalog_with(MemorySource::numbered(50), dest.clone()).await;

    let job_id = {
        let manager = JobManager::new(StateManager::spawn(temp.path()).unwrap(), catalog.clone())
            .with_processor(BatchProcessor::new(10));
        let job = manager.create_job("m1", "interrupted").await.unwrap();
        manager.start_job(&job.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(70)).await;
        manager.shutdown().await.unwrap();
        job.id
    };

    let manager = JobManager::new(StateManager::spawn(temp.path()).unwrap(), catalog)
        .with_processor(BatchProcessor::new(10));
    let status = manager.get_job_status(&job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::Failed);
    assert_eq!(status.error_log.as_deref(), Some(INTERRUPTED_MESSAGE));
    assert!(status.records_processed < 50);
    assert!(status.completed_at.is_some());

    let restarted = manager.retry_job(&job_id).await.unwrap();
    assert_eq!(restarted.status, JobStatus::Running);
    manager.wait(&job_id).await.unwrap();

    let status = manager.get_job_status(&job_id).await.unwrap();
    assert_eq!(status.status, JobStatus::Completed);
    assert_eq!(status.records_processed, 50);
}

#[tokio::test]
async fn test_restart_fails_job_left_running() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    {
        let state = StateManager::spawn(temp.path()).unwrap();
        let job = integrator::domain::Job::with_id("job-crashed", "m1");
        state.create_job(job).await.unwrap();
        state.transition_job("job-crashed", JobTransition::Start).await.unwrap();
        state.record_progress("job-crashed", 10, 0).await.unwrap();
        // the process dies here: no task ever records an outcome
        state.shutdown().await.unwrap();
    }

    let state = StateManager::spawn(temp.path()).unwrap();
    let job = state.get_job_required("job-crashed").await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_log.as_deref(), Some(INTERRUPTED_MESSAGE));
    assert_eq!(job.records_processed, 10);
}
