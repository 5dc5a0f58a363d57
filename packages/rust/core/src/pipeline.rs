//! End-to-end pipeline: source maps → harvest → fragment table → rewrite.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use docweave_collector::{FragmentCollector, FragmentTable};
use docweave_merge::MetadataTable;
use docweave_rewriter::{Injection, RewriteOutcome, TargetKind, rewrite_file};
use docweave_shared::{AppConfig, DocumentTarget, DocweaveError, FragmentKey, InjectOptions, Result};

use crate::report::{DocumentReport, DocumentStatus, RunReport, SourceFailure};

/// Configuration for [`run`].
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// `trigger/terminal` capture pattern.
    pub pattern: String,
    pub inject: InjectOptions,
}

impl From<&AppConfig> for RunConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            pattern: config.harvest.pattern.clone(),
            inject: InjectOptions::from(config),
        }
    }
}

/// Result of the harvest phase.
#[derive(Debug)]
pub struct Harvest {
    pub table: FragmentTable,
    /// Sources that were read (including failed ones).
    pub sources: usize,
    pub failures: Vec<SourceFailure>,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each source map is harvested (or failed).
    fn source_harvested(&self, path: &str, current: usize, total: usize);
    /// Called as each target document finishes.
    fn document_rewritten(&self, report: &DocumentReport, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn source_harvested(&self, _path: &str, _current: usize, _total: usize) {}
    fn document_rewritten(&self, _report: &DocumentReport, _current: usize, _total: usize) {}
    fn done(&self, _report: &RunReport) {}
}

/// Harvest every source map into one table.
///
/// A source that fails to open or parse is logged and skipped; it contributes
/// nothing to the table. An invalid pattern is fatal.
#[instrument(skip_all, fields(sources = sources.len(), pattern = %pattern))]
pub fn harvest(
    sources: &[PathBuf],
    pattern: &str,
    progress: &dyn ProgressReporter,
) -> Result<Harvest> {
    let mut collector = FragmentCollector::from_pattern(pattern)?;
    let mut failures = Vec::new();
    let total = sources.len();

    for (i, source) in sources.iter().enumerate() {
        if let Err(e) = collector.collect_file(source) {
            warn!(source = %source.display(), error = %e, "harvest failed, skipping source");
            failures.push(SourceFailure {
                path: source.clone(),
                error: e.to_string(),
            });
        }
        progress.source_harvested(&source.display().to_string(), i + 1, total);
    }

    let table = collector.into_table();
    info!(fragments = table.len(), failed = failures.len(), "harvest complete");
    Ok(Harvest {
        table,
        sources: total,
        failures,
    })
}

/// Build the injection for one harvested fragment.
///
/// Topics receive the categories allowed in a prolog `metadata`; maps receive
/// the whole categorized table for a schema-ordered merge.
pub fn injection_for(kind: TargetKind, markup: &str) -> Result<Injection> {
    let table = MetadataTable::from_markup(markup)?;
    Ok(match kind {
        TargetKind::Topic => Injection::Markup(table.metadata_markup()),
        TargetKind::Map => Injection::Metadata(table),
    })
}

/// Rewrite every document named in `table`, bounded by `options.concurrency`.
///
/// Documents are rewritten in parallel; the keys of one document run one
/// after another in a single worker, each pass reading the previous one's
/// output. Each key succeeds or fails on its own. With `fail_fast`, keys not
/// yet started when a failure is seen are never scheduled and the report is
/// marked aborted.
#[instrument(skip_all, fields(fragments = table.len(), concurrency = options.concurrency))]
pub async fn inject(
    table: Arc<FragmentTable>,
    options: &InjectOptions,
    progress: &dyn ProgressReporter,
) -> Result<RunReport> {
    let mut report = RunReport::new();
    report.fragments = table.len();

    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let halt = Arc::new(AtomicBool::new(false));
    let options = Arc::new(options.clone());

    let mut groups: BTreeMap<String, Vec<FragmentKey>> = BTreeMap::new();
    for key in table.keys() {
        groups.entry(key.document.clone()).or_default().push(key.clone());
    }

    let mut handles = Vec::with_capacity(groups.len());
    for (document, keys) in groups {
        let kind = TargetKind::detect(Path::new(&document), &options);
        let sem = semaphore.clone();
        let halt = halt.clone();
        let table = table.clone();
        let options = options.clone();

        let task_keys = keys.clone();
        let handle = tokio::spawn(async move {
            let _permit = sem
                .acquire()
                .await
                .map_err(|e| DocweaveError::Task(e.to_string()))?;
            if halt.load(Ordering::SeqCst) {
                return Ok(Vec::new());
            }
            tokio::task::spawn_blocking(move || inject_document(&table, &task_keys, kind, &options, &halt))
                .await
                .map_err(|e| DocweaveError::Task(e.to_string()))
        });
        handles.push((document, keys, kind, handle));
    }

    let total = table.len();
    let mut current = 0;
    for (document, keys, kind, handle) in handles {
        let docs = match handle.await {
            Ok(Ok(docs)) => docs,
            Ok(Err(e)) => {
                warn!(%document, error = %e, "rewrite task failed");
                failed_all(&keys, kind, &e)
            }
            Err(e) => {
                let e = DocweaveError::Task(e.to_string());
                warn!(%document, error = %e, "rewrite task panicked");
                failed_all(&keys, kind, &e)
            }
        };
        if docs.len() < keys.len() {
            debug!(%document, skipped = keys.len() - docs.len(), "not scheduled after failure");
        }
        for doc in docs {
            current += 1;
            progress.document_rewritten(&doc, current, total);
            report.documents.push(doc);
        }
    }

    report.aborted = halt.load(Ordering::SeqCst) && report.documents.len() < total;
    report.finish();
    info!(
        documents = report.documents.len(),
        injected = report.injected(),
        failed = report.failed(),
        aborted = report.aborted,
        "inject complete"
    );
    Ok(report)
}

/// Apply every key of one document in order, stopping early on `halt`.
fn inject_document(
    table: &FragmentTable,
    keys: &[FragmentKey],
    kind: TargetKind,
    options: &InjectOptions,
    halt: &AtomicBool,
) -> Vec<DocumentReport> {
    let mut docs = Vec::with_capacity(keys.len());
    for key in keys {
        if halt.load(Ordering::SeqCst) {
            break;
        }
        let markup = table.get(key).unwrap_or_default();
        let doc = inject_one(key, markup, kind, options);
        if options.fail_fast && doc.status == DocumentStatus::Failed {
            halt.store(true, Ordering::SeqCst);
        }
        docs.push(doc);
    }
    docs
}

fn failed_all(keys: &[FragmentKey], kind: TargetKind, error: &DocweaveError) -> Vec<DocumentReport> {
    keys.iter()
        .map(|key| DocumentReport::failed(key.to_string(), key.target().path, kind, error, 0))
        .collect()
}

fn inject_one(
    key: &FragmentKey,
    markup: &str,
    kind: TargetKind,
    options: &InjectOptions,
) -> DocumentReport {
    let start = Instant::now();
    let target = key.target();
    let label = key.to_string();

    let injection = match injection_for(kind, markup) {
        Ok(injection) => injection,
        Err(e) => {
            warn!(key = %label, error = %e, "harvested fragment is not usable");
            return DocumentReport::failed(label, target.path, kind, &e, elapsed_ms(start));
        }
    };
    if injection.is_empty() {
        debug!(key = %label, ?kind, "nothing to inject for this target kind");
        return DocumentReport::skipped(label, target.path, kind);
    }

    match rewrite_file(&target, kind, &injection, &options.temp_suffix) {
        Ok(outcome) => DocumentReport::from_outcome(label, outcome, elapsed_ms(start)),
        Err(e) => {
            warn!(key = %label, error = %e, "rewrite failed, document left unchanged");
            DocumentReport::failed(label, target.path, kind, &e, elapsed_ms(start))
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Run the full pipeline.
///
/// 1. Harvest every source map into a fragment table
/// 2. Freeze the table and rewrite its targets concurrently
#[instrument(skip_all, fields(sources = sources.len()))]
pub async fn run(
    sources: &[PathBuf],
    config: &RunConfig,
    progress: &dyn ProgressReporter,
) -> Result<RunReport> {
    let start = Instant::now();

    progress.phase("Harvesting fragments");
    let harvest = harvest(sources, &config.pattern, progress)?;

    progress.phase("Injecting fragments");
    let table = Arc::new(harvest.table);
    let mut report = inject(table, &config.inject, progress).await?;
    report.sources = harvest.sources;
    report.harvest_failures = harvest.failures;

    info!(
        run_id = %report.run_id,
        elapsed_ms = elapsed_ms(start),
        clean = report.is_clean(),
        "run complete"
    );
    progress.done(&report);
    Ok(report)
}

/// Inject a standalone fragment into one target, bypassing the harvest.
///
/// Topic targets receive the markup verbatim; map targets merge it.
pub fn inject_fragment(
    target: &DocumentTarget,
    markup: &str,
    options: &InjectOptions,
) -> Result<RewriteOutcome> {
    let kind = TargetKind::detect(&target.path, options);
    let injection = match kind {
        TargetKind::Topic => Injection::Markup(markup.to_string()),
        TargetKind::Map => Injection::Metadata(MetadataTable::from_markup(markup)?),
    };
    if injection.is_empty() {
        return Err(DocweaveError::validation(format!(
            "fragment has nothing to inject into {target}"
        )));
    }
    rewrite_file(target, kind, &injection, &options.temp_suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;

    use docweave_rewriter::Anchor;

    fn fixture_path(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../../fixtures/xml")
            .join(name)
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("docweave-pipeline-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(dir.join("topics")).unwrap();
        dir
    }

    /// Copy the sample map and its topics into a scratch directory.
    fn sample_workspace() -> PathBuf {
        let tmp = temp_dir();
        for name in ["sample.ditamap", "topics/intro.dita", "topics/setup.dita"] {
            std::fs::copy(fixture_path(name), tmp.join(name)).unwrap();
        }
        tmp
    }

    fn find<'a>(report: &'a RunReport, suffix: &str) -> &'a DocumentReport {
        report
            .documents
            .iter()
            .find(|d| d.key.ends_with(suffix))
            .unwrap_or_else(|| panic!("no report for {suffix}"))
    }

    fn options(concurrency: usize, fail_fast: bool) -> InjectOptions {
        InjectOptions {
            concurrency,
            fail_fast,
            ..InjectOptions::default()
        }
    }

    #[derive(Default)]
    struct Counting {
        harvested: AtomicUsize,
        rewritten: AtomicUsize,
        done: AtomicUsize,
    }

    impl ProgressReporter for Counting {
        fn phase(&self, _name: &str) {}
        fn source_harvested(&self, _path: &str, _current: usize, _total: usize) {
            self.harvested.fetch_add(1, Ordering::SeqCst);
        }
        fn document_rewritten(&self, _report: &DocumentReport, _current: usize, _total: usize) {
            self.rewritten.fetch_add(1, Ordering::SeqCst);
        }
        fn done(&self, _report: &RunReport) {
            self.done.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn harvest_skips_malformed_sources() {
        let tmp = temp_dir();
        let bad = tmp.join("bad.ditamap");
        std::fs::write(&bad, "<map><topicref href=\"a.dita\"><topicmeta>").unwrap();
        let sources = vec![fixture_path("sample.ditamap"), bad.clone(), tmp.join("missing.ditamap")];

        let harvest = harvest(&sources, "topicref/topicmeta", &SilentProgress).unwrap();
        assert_eq!(harvest.sources, 3);
        assert_eq!(harvest.table.len(), 2);
        assert_eq!(harvest.failures.len(), 2);
        assert_eq!(harvest.failures[0].path, bad);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn harvest_rejects_bad_pattern() {
        assert!(harvest(&[], "topicref", &SilentProgress).is_err());
    }

    #[test]
    fn topic_injection_keeps_prolog_categories() {
        let markup = concat!(
            r#"<topicmeta><author>A</author>"#,
            r#"<keywords><keyword>k</keyword></keywords></topicmeta>"#
        );
        match injection_for(TargetKind::Topic, markup).unwrap() {
            Injection::Markup(m) => assert_eq!(m, "<keywords><keyword>k</keyword></keywords>"),
            other => panic!("unexpected injection {other:?}"),
        }
        match injection_for(TargetKind::Map, markup).unwrap() {
            Injection::Metadata(t) => assert_eq!(t.len(), 2),
            other => panic!("unexpected injection {other:?}"),
        }
    }

    #[tokio::test]
    async fn run_rewrites_sample_topics() {
        let tmp = sample_workspace();
        let progress = Counting::default();
        let config = RunConfig {
            pattern: "topicref/topicmeta".into(),
            inject: options(2, false),
        };

        let report = run(&[tmp.join("sample.ditamap")], &config, &progress).await.unwrap();
        assert_eq!(report.sources, 1);
        assert_eq!(report.fragments, 2);
        assert!(report.is_clean());
        assert_eq!(progress.harvested.load(Ordering::SeqCst), 1);
        assert_eq!(progress.rewritten.load(Ordering::SeqCst), 2);
        assert_eq!(progress.done.load(Ordering::SeqCst), 1);

        let intro = find(&report, "topics/intro.dita");
        assert_eq!(intro.status, DocumentStatus::Injected);
        assert_eq!(intro.anchor, Some(Anchor::NewProlog));
        let written = std::fs::read_to_string(tmp.join("topics/intro.dita")).unwrap();
        let prolog = written.find("<prolog><metadata><keywords").unwrap();
        assert!(prolog < written.find("<body").unwrap());
        assert!(written.contains("Widget Pro</keyword>"));
        assert!(written.contains("<!-- keep this comment -->"));
        assert!(!written.contains("Second"));

        // Only author and shortdesc were harvested: nothing fits a prolog.
        let setup = find(&report, "topics/setup.dita#setup");
        assert_eq!(setup.status, DocumentStatus::Skipped);
        assert_eq!(
            std::fs::read_to_string(tmp.join("topics/setup.dita")).unwrap(),
            std::fs::read_to_string(fixture_path("topics/setup.dita")).unwrap()
        );

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn run_merges_into_map_targets() {
        let tmp = temp_dir();
        std::fs::copy(fixture_path("topicmeta-merge.ditamap"), tmp.join("guide.ditamap")).unwrap();
        let outer = tmp.join("outer.ditamap");
        std::fs::write(
            &outer,
            concat!(
                r#"<map><topicref href="guide.ditamap">"#,
                r#"<topicmeta><keywords><keyword>new</keyword></keywords></topicmeta>"#,
                r#"</topicref><topicref href="guide.ditamap">"#,
                r#"<topicmeta><critdates><created date="2024-05-05"/></critdates></topicmeta>"#,
                r#"</topicref></map>"#
            ),
        )
        .unwrap();

        let config = RunConfig {
            pattern: "topicref/topicmeta".into(),
            inject: options(4, false),
        };
        let report = run(&[outer], &config, &SilentProgress).await.unwrap();
        assert_eq!(report.documents.len(), 1);
        let guide = &report.documents[0];
        assert_eq!(guide.kind, TargetKind::Map);
        assert_eq!(guide.anchor, Some(Anchor::ExistingTopicmeta));

        let written = std::fs::read_to_string(tmp.join("guide.ditamap")).unwrap();
        assert!(written.contains("2024-05-05"));
        assert!(!written.contains("2020-01-01"));
        assert!(written.contains("<keyword>new</keyword>"));
        assert!(written.contains("<keyword>old</keyword>"));
        assert!(written.find("<navtitle").unwrap() < written.find("<critdates").unwrap());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    fn missing_targets(tmp: &Path) -> Arc<FragmentTable> {
        let mut collector = FragmentCollector::from_pattern("topicref/topicmeta").unwrap();
        collector
            .collect_str(
                &tmp.join("src.ditamap"),
                concat!(
                    r#"<map><topicref href="a.dita"><topicmeta><keywords><keyword>a</keyword></keywords></topicmeta></topicref>"#,
                    r#"<topicref href="b.dita"><topicmeta><keywords><keyword>b</keyword></keywords></topicmeta></topicref></map>"#
                ),
            )
            .unwrap();
        Arc::new(collector.into_table())
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_batch() {
        let tmp = temp_dir();
        let report = inject(missing_targets(&tmp), &options(1, false), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(report.documents.len(), 2);
        assert_eq!(report.failed(), 2);
        assert!(!report.aborted);
        assert!(report.documents[0].error.as_deref().unwrap().contains("a.dita"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn fail_fast_stops_scheduling() {
        let tmp = temp_dir();
        let report = inject(missing_targets(&tmp), &options(1, true), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(report.documents.len(), 1);
        assert!(report.documents[0].key.ends_with("a.dita"));
        assert!(report.aborted);
        assert!(!report.is_clean());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn fragments_of_one_document_all_land() {
        let tmp = temp_dir();
        let count = 12;
        let topics: String = (1..=count)
            .map(|i| format!(r#"<topic id="t{i}"><title>T{i}</title><body/></topic>"#))
            .collect();
        std::fs::write(tmp.join("multi.dita"), format!("<dita>{topics}</dita>")).unwrap();
        let refs: String = (1..=count)
            .map(|i| {
                format!(
                    r#"<topicref href="multi.dita#t{i}"><topicmeta><keywords><keyword>kw{i}</keyword></keywords></topicmeta></topicref>"#
                )
            })
            .collect();
        let mut collector = FragmentCollector::from_pattern("topicref/topicmeta").unwrap();
        collector
            .collect_str(&tmp.join("src.ditamap"), &format!("<map>{refs}</map>"))
            .unwrap();
        let progress = Counting::default();

        let report = inject(Arc::new(collector.into_table()), &options(8, false), &progress)
            .await
            .unwrap();
        assert_eq!(report.documents.len(), count);
        assert_eq!(report.injected(), count);
        assert_eq!(progress.rewritten.load(Ordering::SeqCst), count);

        let written = std::fs::read_to_string(tmp.join("multi.dita")).unwrap();
        for i in 1..=count {
            assert!(written.contains(&format!("<keyword>kw{i}</keyword>")), "kw{i} missing");
        }
        assert_eq!(written.matches("<prolog>").count(), count);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn inject_fragment_into_topic() {
        let tmp = temp_dir();
        let path = tmp.join("t.dita");
        std::fs::write(&path, r#"<topic id="t1"><title>T</title><body>text</body></topic>"#).unwrap();

        let target = DocumentTarget::parse(&format!("{}#t1", path.display()));
        let outcome = inject_fragment(
            &target,
            r#"<keyword id="k1">alpha</keyword>"#,
            &InjectOptions::default(),
        )
        .unwrap();
        assert_eq!(outcome.anchor, Some(Anchor::NewProlog));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            concat!(
                r#"<topic id="t1"><title>T</title><prolog><metadata><keyword id="k1">alpha</keyword>"#,
                r#"</metadata></prolog><body>text</body></topic>"#
            )
        );

        assert!(inject_fragment(&target, "  ", &InjectOptions::default()).is_err());

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
