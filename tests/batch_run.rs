//! Integration tests for whole batch runs.
//!
//! These drive `BatchRun` end to end with in-process fake processors and
//! file sinks in temporary directories; no external tool or server is needed.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use geobatch::enumerate::{load_towns, road_pairs, TownPair, DEFAULT_ROAD_DELTA};
use geobatch::error::{BatchError, EXIT_PARTIAL_FAILURE, EXIT_SUCCESS, EXIT_UNREACHABLE};
use geobatch::output::{CategoryFileSink, CategoryLabels};
use geobatch::pipeline::{BatchConfig, BatchRun, RunState};
use geobatch::processor::{ExternalProcessor, ProcessorError};
use geobatch::scheduler::Category;
use tempfile::TempDir;

/// Three far-apart capitals, a cluster of three towns and two clusters of two.
const TEN_TOWNS: &str = "\
500;0;Capital A;t
600;0;Capital B;T
700;0;Capital C;t
0;0;Town 1;f
1;0;Town 2;f
2;0;Town 3;f
100;0;Town 4;f
101;0;Town 5;f
200;0;Town 6;f
201;0;Town 7;f
";

/// Answers `w1` for capital pairs and `w2` for everything else.
struct RoleProcessor {
    calls: AtomicUsize,
    fail_from_lat: Option<f64>,
    unreachable: bool,
}

impl RoleProcessor {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_from_lat: None,
            unreachable: false,
        }
    }
}

#[async_trait]
impl ExternalProcessor<TownPair> for RoleProcessor {
    async fn process(&self, pair: &TownPair) -> Result<Vec<String>, ProcessorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;

        if self.unreachable {
            return Err(ProcessorError::Unreachable("connection refused".to_string()));
        }
        if self.fail_from_lat == Some(pair.from.lat) {
            return Err(ProcessorError::Failed("HTTP 500 Internal Server Error".to_string()));
        }
        if pair.both_capitals() {
            Ok(vec!["w1".to_string()])
        } else {
            Ok(vec!["w2".to_string(), format!("town-{}", pair.from.lat)])
        }
    }
}

fn setup() -> (TempDir, Vec<TownPair>) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(dir.path().join("towns.csv"), TEN_TOWNS).expect("Failed to write towns");

    let towns = load_towns(&dir.path().join("towns.csv")).expect("Towns should parse");
    assert_eq!(towns.len(), 10);
    let pairs = road_pairs(&towns, DEFAULT_ROAD_DELTA);
    assert_eq!(pairs.len(), 8, "Filter should keep 3 capital pairs and 5 local pairs");

    (dir, pairs)
}

fn config(workers: usize) -> BatchConfig {
    BatchConfig::new(workers)
        .with_unit_timeout(Some(Duration::from_secs(10)))
        .with_progress_interval(Duration::from_millis(20))
}

/// Processor answering only `w1`/`w2`, as in the reference scenario.
struct PlainRoleProcessor;

#[async_trait]
impl ExternalProcessor<TownPair> for PlainRoleProcessor {
    async fn process(&self, pair: &TownPair) -> Result<Vec<String>, ProcessorError> {
        tokio::task::yield_now().await;
        let id = if pair.both_capitals() { "w1" } else { "w2" };
        Ok(vec![id.to_string()])
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ten_towns_scenario() {
    let (dir, pairs) = setup();
    let output = dir.path().join("ways.csv");

    let mut run: BatchRun<TownPair> = BatchRun::new(
        "ten-towns",
        config(4),
        Arc::new(PlainRoleProcessor),
        Arc::new(CategoryFileSink::new(&output)),
    );
    let report = run.run(pairs).await.expect("Run should succeed");

    assert_eq!(report.exit_code(), EXIT_SUCCESS);
    assert_eq!(report.stats.num_workers, 4);
    assert_eq!(report.stats.units_succeeded, 8);

    let content = fs::read_to_string(&output).expect("Output should exist");
    assert_eq!(content, "w1;priority\nw2;secondary\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_world_road_labels() {
    let (dir, pairs) = setup();
    let output = dir.path().join("ways.csv");

    let sink = CategoryFileSink::new(&output).with_labels(CategoryLabels::world_roads());
    let mut run: BatchRun<TownPair> =
        BatchRun::new("labels", config(16), Arc::new(PlainRoleProcessor), Arc::new(sink));
    run.run(pairs).await.expect("Run should succeed");

    let content = fs::read_to_string(&output).expect("Output should exist");
    assert_eq!(content, "w1;world_level\nw2;world_towns_level\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_identifier_collected_once() {
    let (dir, pairs) = setup();
    let output = dir.path().join("ways.csv");
    let processor = Arc::new(RoleProcessor::new());

    for workers in [1, 3, 8] {
        let mut run: BatchRun<TownPair> = BatchRun::new(
            "union",
            config(workers),
            processor.clone(),
            Arc::new(CategoryFileSink::new(&output)),
        );
        let report = run.run(pairs.clone()).await.expect("Run should succeed");

        assert_eq!(report.results.get(Category::Priority), ["w1".to_string()]);
        // `w2` plus one id per distinct non-capital `from` town: 0, 1, 100, 200.
        assert_eq!(report.results.get(Category::Secondary).len(), 5);
        assert_eq!(report.stats.total_processed(), 8);
        assert!(report.errors.is_empty());
    }

    // One preflight call plus eight unit calls per run.
    assert_eq!(processor.calls.load(Ordering::SeqCst), 3 * 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_failing_unit_is_isolated() {
    let (dir, pairs) = setup();
    let output = dir.path().join("ways.csv");
    // Only the pair starting at Town 4 fails.
    let processor = Arc::new(RoleProcessor {
        fail_from_lat: Some(100.0),
        ..RoleProcessor::new()
    });

    let mut run: BatchRun<TownPair> = BatchRun::new(
        "partial",
        config(4),
        processor,
        Arc::new(CategoryFileSink::new(&output)),
    );
    let report = run.run(pairs).await.expect("Unit failures should not abort");

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].unit.from.lat, 100.0);
    assert!(report.errors[0].to_string().starts_with("Error processing"));
    assert!(report.errors[0].reason.contains("HTTP 500"));
    assert_eq!(report.exit_code(), EXIT_PARTIAL_FAILURE);
    assert_eq!(report.final_state(), RunState::Done);

    let content = fs::read_to_string(&output).expect("Output should still be written");
    assert_eq!(
        content,
        "w1;priority\ntown-0;secondary\ntown-1;secondary\ntown-200;secondary\nw2;secondary\n"
    );
}

#[tokio::test]
async fn test_preflight_short_circuit() {
    let (dir, pairs) = setup();
    let output = dir.path().join("ways.csv");
    let processor = Arc::new(RoleProcessor {
        unreachable: true,
        ..RoleProcessor::new()
    });

    let mut run: BatchRun<TownPair> = BatchRun::new(
        "unreachable",
        config(4),
        processor.clone(),
        Arc::new(CategoryFileSink::new(&output)),
    );
    let err = run.run(pairs).await.expect_err("Probe failure should abort");

    assert!(matches!(err, BatchError::DependencyUnreachable(_)));
    assert_eq!(err.exit_code(), EXIT_UNREACHABLE);
    assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
    assert!(!run.states().contains(&RunState::Dispatching));
    assert!(!output.exists(), "No output should be written");
}

#[tokio::test]
async fn test_empty_enumeration_writes_nothing() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let output = dir.path().join("ways.csv");

    // No towns.csv at all: loading yields no towns, hence no pairs.
    let towns = load_towns(&dir.path().join("towns.csv")).expect("Missing file is not an error");
    let pairs = road_pairs(&towns, DEFAULT_ROAD_DELTA);

    let processor = Arc::new(RoleProcessor::new());
    let mut run: BatchRun<TownPair> = BatchRun::new(
        "empty",
        config(4),
        processor.clone(),
        Arc::new(CategoryFileSink::new(&output)),
    );
    let err = run.run(pairs).await.expect_err("No work should abort");

    assert!(matches!(err, BatchError::EnumerationEmpty(_)));
    assert_eq!(processor.calls.load(Ordering::SeqCst), 0);
    assert!(!output.exists());
}
