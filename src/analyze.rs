//! Analysis run orchestration.
//!
//! Drives one full run: scan → fingerprint → cache lookup → dispatch on miss
//! → cache store → outcome stream. Per-file work is independent; the only
//! shared state is the cache and the graph builder, and the builder is fed
//! from a single consumer loop so ingestion is serialized. One bad file never
//! aborts the run: failures flow through the same stream as successes, and
//! the run terminates even if every dispatch fails, because slot and token
//! release in the dispatcher is unconditional.
//!
//! Cancellation is cooperative: once the signal flips, no new dispatches are
//! submitted, in-flight dispatches finish, and every already-submitted file
//! reaches a terminal state before the run returns.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::cache::AnalysisCache;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::fingerprint::fingerprint;
use crate::graph::{CallGraph, GraphBuilder, RelationshipGraph};
use crate::models::{FileOutcome, Outcome, SourceFile};
use crate::progress::{AnalyzeProgressEvent, ProgressMode, ProgressReporter};
use crate::provider::{create_provider, InferenceProvider};
use crate::report;
use crate::scan::scan_tree;
use crate::summary;

/// Command-line options for one `atlas analyze` invocation.
pub struct RunOptions {
    pub root_override: Option<PathBuf>,
    /// Ignore the cache: dispatch every file (results are still stored).
    pub full: bool,
    /// Scan and report cache accounting without dispatching anything.
    pub dry_run: bool,
    pub limit: Option<usize>,
    pub progress: ProgressMode,
    pub output_override: Option<PathBuf>,
}

/// Everything one run produced, for reporting and for tests.
pub struct RunResult {
    pub outcomes: Vec<FileOutcome>,
    pub call_graph: CallGraph,
    pub relationship_graph: RelationshipGraph,
    pub total: u64,
    pub cached: u64,
    pub dispatched: u64,
    pub failed: u64,
    /// Files never submitted because cancellation arrived first.
    pub skipped: u64,
}

/// Run the `analyze` command end to end: pipeline, artifacts, summary.
pub async fn run_analyze(config: &Config, options: RunOptions) -> Result<()> {
    let root = options
        .root_override
        .clone()
        .unwrap_or_else(|| config.traversal.root.clone());
    let progress = options.progress.reporter();
    progress.report(AnalyzeProgressEvent::Scanning {
        root: root.display().to_string(),
    });

    let mut files = scan_tree(&config.traversal, options.root_override.as_deref())?;
    if let Some(limit) = options.limit {
        files.truncate(limit);
    }

    let cache = Arc::new(AnalysisCache::open(&config.storage.cache_path).await?);

    if options.dry_run {
        let hits = files
            .iter()
            .filter(|file| {
                !options.full
                    && cache
                        .lookup(&fingerprint(
                            file.content.as_bytes(),
                            &file.relative,
                            &file.language,
                        ))
                        .is_some()
            })
            .count();
        println!("analyze {} (dry-run)", root.display());
        println!("  files found: {}", files.len());
        println!("  cache hits: {}", hits);
        println!("  dispatches needed: {}", files.len() - hits);
        cache.close().await;
        return Ok(());
    }

    // Configuration problems (disabled provider, missing API key) surface
    // here, before any dispatch.
    let provider = create_provider(&config.provider)?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Warning: cancellation requested; finishing in-flight dispatches");
            let _ = cancel_tx.send(true);
        }
    });

    let result = run_pipeline(
        config,
        files,
        cache.clone(),
        provider,
        progress.as_ref(),
        cancel_rx,
        options.full,
    )
    .await?;

    let output_dir = options
        .output_override
        .unwrap_or_else(|| config.storage.output_dir.clone());
    report::write_artifacts(&output_dir, &root, &result)?;
    let summary_path = output_dir.join("summary.md");
    std::fs::write(&summary_path, summary::render(&result))?;

    println!("analyze {}", root.display());
    println!("  files scanned: {}", result.total);
    println!(
        "  analyzed: {} ({} from cache, {} dispatched)",
        result.cached + result.dispatched,
        result.cached,
        result.dispatched
    );
    println!("  failed: {}", result.failed);
    if result.skipped > 0 {
        println!("  skipped (cancelled): {}", result.skipped);
    }
    println!(
        "  call graph: {} functions, {} calls",
        result.call_graph.node_count(),
        result.call_graph.edge_count()
    );
    println!(
        "  relationship graph: {} nodes, {} edges",
        result.relationship_graph.node_count(),
        result.relationship_graph.edge_count()
    );
    println!("  artifacts: {}", output_dir.display());
    println!("ok");

    cache.close().await;
    Ok(())
}

/// Run the orchestration pipeline over an already-scanned file set.
///
/// Scheduling follows arrival order; completion order is unordered. Outcomes
/// are consumed incrementally: each one is folded into the graph builder and
/// reported before the next is awaited.
pub async fn run_pipeline(
    config: &Config,
    files: Vec<SourceFile>,
    cache: Arc<AnalysisCache>,
    provider: Arc<dyn InferenceProvider>,
    progress: &dyn ProgressReporter,
    cancel: watch::Receiver<bool>,
    full: bool,
) -> Result<RunResult> {
    let dispatcher = Arc::new(Dispatcher::new(
        provider,
        config.dispatch.clone(),
        config.provider.max_chunk_chars,
    ));
    let total = files.len() as u64;
    let (tx, mut rx) = mpsc::channel::<FileOutcome>(64);

    let producer = async move {
        let mut skipped = 0u64;
        for file in files {
            if *cancel.borrow() {
                skipped += 1;
                continue;
            }

            let fp = fingerprint(file.content.as_bytes(), &file.relative, &file.language);

            if !full {
                if let Some(analysis) = cache.lookup(&fp) {
                    let outcome = FileOutcome {
                        relative: file.relative.clone(),
                        language: file.language.clone(),
                        fingerprint: fp,
                        outcome: Outcome::Analyzed {
                            analysis,
                            from_cache: true,
                        },
                    };
                    if tx.send(outcome).await.is_err() {
                        break;
                    }
                    continue;
                }
            }

            let dispatcher = dispatcher.clone();
            let cache = cache.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = match dispatcher.dispatch(&file).await {
                    Ok(analysis) => {
                        if let Err(e) = cache.store(&fp, &file.relative, &analysis).await {
                            eprintln!(
                                "Warning: failed to store cache entry for {}: {}",
                                file.relative, e
                            );
                        }
                        FileOutcome {
                            relative: file.relative,
                            language: file.language,
                            fingerprint: fp,
                            outcome: Outcome::Analyzed {
                                analysis,
                                from_cache: false,
                            },
                        }
                    }
                    Err(failure) => FileOutcome {
                        relative: file.relative,
                        language: file.language,
                        fingerprint: fp,
                        outcome: Outcome::Failed { failure },
                    },
                };
                let _ = tx.send(outcome).await;
            });
        }
        skipped
        // tx drops here; the channel closes once every spawned task finishes.
    };

    let consumer = async {
        let mut builder = GraphBuilder::new();
        let mut outcomes = Vec::new();
        let mut cached = 0u64;
        let mut dispatched = 0u64;
        let mut failed = 0u64;

        while let Some(outcome) = rx.recv().await {
            builder.ingest(&outcome);
            match &outcome.outcome {
                Outcome::Analyzed {
                    from_cache: true, ..
                } => cached += 1,
                Outcome::Analyzed { .. } => dispatched += 1,
                Outcome::Failed { failure } => {
                    failed += 1;
                    eprintln!(
                        "Warning: analysis failed for {} ({}: {})",
                        failure.path,
                        failure.kind.as_str(),
                        failure.message
                    );
                }
            }
            outcomes.push(outcome);
            progress.report(AnalyzeProgressEvent::Analyzing {
                n: cached + dispatched + failed,
                total,
                cached,
                failed,
            });
        }

        (builder, outcomes, cached, dispatched, failed)
    };

    let (skipped, (builder, outcomes, cached, dispatched, failed)) =
        tokio::join!(producer, consumer);

    let (call_graph, relationship_graph) = builder.snapshot();
    Ok(RunResult {
        outcomes,
        call_graph,
        relationship_graph,
        total,
        cached,
        dispatched,
        failed,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::models::{FailureKind, FileAnalysis, FunctionFact};
    use crate::progress::NoProgress;
    use crate::provider::{AnalysisRequest, DispatchError, InferenceProvider};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProvider {
        calls: AtomicUsize,
        /// Paths that fail permanently.
        poison: Vec<String>,
    }

    #[async_trait]
    impl InferenceProvider for ScriptedProvider {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn analyze(
            &self,
            request: AnalysisRequest<'_>,
        ) -> Result<FileAnalysis, DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.poison.iter().any(|p| p == request.path) {
                return Err(DispatchError::new(FailureKind::BadRequest, "poisoned"));
            }
            Ok(FileAnalysis {
                summary: format!("analysis of {}", request.path),
                functions: vec![FunctionFact {
                    name: format!("fn_of_{}", request.path.replace(['/', '.'], "_")),
                    ..FunctionFact::default()
                }],
                ..FileAnalysis::default()
            })
        }
    }

    fn test_config(tmp: &Path) -> Config {
        Config {
            storage: StorageConfig {
                cache_path: tmp.join("cache.sqlite"),
                output_dir: tmp.join("out"),
            },
            traversal: Default::default(),
            provider: Default::default(),
            dispatch: Default::default(),
        }
    }

    fn source(relative: &str, content: &str) -> SourceFile {
        SourceFile {
            path: relative.into(),
            relative: relative.to_string(),
            language: "Python".to_string(),
            content: content.to_string(),
            size_bytes: content.len() as u64,
        }
    }

    fn not_cancelled() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    #[tokio::test]
    async fn test_second_run_is_all_cache_hits() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = test_config(tmp.path());
        let cache = Arc::new(AnalysisCache::open(&config.storage.cache_path).await.unwrap());
        let provider = Arc::new(ScriptedProvider {
            calls: AtomicUsize::new(0),
            poison: vec![],
        });

        let files = vec![source("a.py", "x = 1\n"), source("b.py", "y = 2\n")];

        let first = run_pipeline(
            &config,
            files.clone(),
            cache.clone(),
            provider.clone(),
            &NoProgress,
            not_cancelled(),
            false,
        )
        .await
        .unwrap();
        assert_eq!(first.dispatched, 2);
        assert_eq!(first.cached, 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        let second = run_pipeline(
            &config,
            files,
            cache.clone(),
            provider.clone(),
            &NoProgress,
            not_cancelled(),
            false,
        )
        .await
        .unwrap();
        assert_eq!(second.cached, 2);
        assert_eq!(second.dispatched, 0);
        // No further provider calls on the unchanged tree.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_changed_content_misses_cache() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = test_config(tmp.path());
        let cache = Arc::new(AnalysisCache::open(&config.storage.cache_path).await.unwrap());
        let provider = Arc::new(ScriptedProvider {
            calls: AtomicUsize::new(0),
            poison: vec![],
        });

        run_pipeline(
            &config,
            vec![source("a.py", "x = 1\n")],
            cache.clone(),
            provider.clone(),
            &NoProgress,
            not_cancelled(),
            false,
        )
        .await
        .unwrap();

        let result = run_pipeline(
            &config,
            vec![source("a.py", "x = 2\n")],
            cache.clone(),
            provider.clone(),
            &NoProgress,
            not_cancelled(),
            false,
        )
        .await
        .unwrap();
        assert_eq!(result.dispatched, 1);
        assert_eq!(result.cached, 0);
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = test_config(tmp.path());
        let cache = Arc::new(AnalysisCache::open(&config.storage.cache_path).await.unwrap());
        let provider = Arc::new(ScriptedProvider {
            calls: AtomicUsize::new(0),
            poison: vec!["x.py".to_string()],
        });

        let result = run_pipeline(
            &config,
            vec![
                source("x.py", "broken\n"),
                source("y.py", "y = 1\n"),
                source("z.py", "z = 1\n"),
            ],
            cache.clone(),
            provider,
            &NoProgress,
            not_cancelled(),
            false,
        )
        .await
        .unwrap();

        assert_eq!(result.dispatched, 2);
        assert_eq!(result.failed, 1);
        let failure = result
            .outcomes
            .iter()
            .find_map(|o| o.failure())
            .expect("a failure record");
        assert_eq!(failure.path, "x.py");
        assert_eq!(failure.kind, FailureKind::BadRequest);

        // Failed file is absent from the graphs, successes are present.
        assert!(result
            .relationship_graph
            .nodes
            .keys()
            .all(|k| k.id != "x.py"));
        assert!(result
            .relationship_graph
            .nodes
            .keys()
            .any(|k| k.id == "y.py"));
        assert!(result
            .relationship_graph
            .nodes
            .keys()
            .any(|k| k.id == "z.py"));
        // And the failure never entered the cache.
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_full_flag_bypasses_cache_lookup() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = test_config(tmp.path());
        let cache = Arc::new(AnalysisCache::open(&config.storage.cache_path).await.unwrap());
        let provider = Arc::new(ScriptedProvider {
            calls: AtomicUsize::new(0),
            poison: vec![],
        });

        let files = vec![source("a.py", "x = 1\n")];
        run_pipeline(
            &config,
            files.clone(),
            cache.clone(),
            provider.clone(),
            &NoProgress,
            not_cancelled(),
            false,
        )
        .await
        .unwrap();

        let again = run_pipeline(
            &config,
            files,
            cache.clone(),
            provider.clone(),
            &NoProgress,
            not_cancelled(),
            true,
        )
        .await
        .unwrap();
        assert_eq!(again.dispatched, 1);
        assert_eq!(again.cached, 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancellation_skips_unsubmitted_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = test_config(tmp.path());
        let cache = Arc::new(AnalysisCache::open(&config.storage.cache_path).await.unwrap());
        let provider = Arc::new(ScriptedProvider {
            calls: AtomicUsize::new(0),
            poison: vec![],
        });

        let (cancel_tx, cancel_rx) = watch::channel(true);
        let result = run_pipeline(
            &config,
            vec![source("a.py", "x = 1\n"), source("b.py", "y = 2\n")],
            cache,
            provider.clone(),
            &NoProgress,
            cancel_rx,
            false,
        )
        .await
        .unwrap();
        drop(cancel_tx);

        assert_eq!(result.skipped, 2);
        assert_eq!(result.dispatched + result.cached + result.failed, 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
