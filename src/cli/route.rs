//! CLI route: single route table and run context. Dispatches to domain services and presentation.

use crate::cache::{ResolutionCache, SledResolutionCache};
use crate::coalesce::{EventCoalescer, FlushOutcome, FlushReport};
use crate::config::{ConfigLoader, DatelineConfig};
use crate::error::ApiError;
use crate::notification::NotificationRecord;
use crate::resolve::{ResolutionEngine, ResolveRequest};
use crate::source::SourceSet;
use crate::types::{MediaKey, Provenance};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tracing::{debug, info, warn};

use crate::cli::command_name;
use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_decision_json, format_decision_list_json, format_decision_list_text,
    format_decision_text, format_ingest_summary_json, format_ingest_summary_text,
    IngestSummary,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_format(raw: &str) -> Result<OutputFormat, ApiError> {
    match raw {
        "text" => Ok(OutputFormat::Text),
        "json" => Ok(OutputFormat::Json),
        other => Err(ApiError::InvalidArgument(format!(
            "Invalid format: {}. Must be 'text' or 'json'",
            other
        ))),
    }
}

/// Runtime context for CLI execution: workspace, loaded config, cache and engine.
/// Built from workspace path and optional config path using ConfigLoader only.
pub struct RunContext {
    workspace_root: PathBuf,
    config: DatelineConfig,
    cache: Arc<SledResolutionCache>,
    engine: Arc<ResolutionEngine>,
    runtime: tokio::runtime::Runtime,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        config.validate().map_err(|errors| {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                msgs.join("\n")
            ))
        })?;

        let cache_path = config.cache.resolve_path(&workspace_root);
        let cache = Arc::new(SledResolutionCache::new(&cache_path)?);
        debug!(path = ?cache_path, "Opened resolution cache");

        let sources = SourceSet::from_config(&config.sources, config.resolver.adapter_timeout())?;
        let engine = Arc::new(ResolutionEngine::new(
            sources,
            Arc::clone(&cache) as Arc<dyn ResolutionCache>,
            config.resolver.clone(),
        ));

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| ApiError::ConfigError(format!("Failed to start async runtime: {}", e)))?;

        Ok(Self {
            workspace_root,
            config,
            cache,
            engine,
            runtime,
        })
    }

    pub fn config(&self) -> &DatelineConfig {
        &self.config
    }

    pub fn engine(&self) -> Arc<ResolutionEngine> {
        Arc::clone(&self.engine)
    }

    /// Execute a command and return its output string.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let started = Instant::now();
        let result = self.dispatch(command);
        info!(
            command = command_name(command),
            ok = result.is_ok(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    fn dispatch(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Resolve {
                key,
                force,
                paths,
                format,
            } => self.handle_resolve(key, *force, paths, parse_format(format)?),
            Commands::Show { key, format } => self.handle_show(key, parse_format(format)?),
            Commands::List { unresolved, format } => {
                self.handle_list(*unresolved, parse_format(format)?)
            }
            Commands::RemapSource { from, to } => self.handle_remap_source(from, to),
            Commands::Ingest {
                debounce_ms,
                format,
            } => {
                let format = parse_format(format)?;
                let summary = self.ingest(BufReader::new(tokio::io::stdin()), *debounce_ms)?;
                Ok(match format {
                    OutputFormat::Text => format_ingest_summary_text(&summary),
                    OutputFormat::Json => format_ingest_summary_json(&summary),
                })
            }
            Commands::Validate => self.handle_validate(),
        }
    }

    fn handle_resolve(
        &self,
        key: &str,
        force: bool,
        paths: &[PathBuf],
        format: OutputFormat,
    ) -> Result<String, ApiError> {
        let key: MediaKey = key.parse()?;
        let paths: Vec<PathBuf> = paths
            .iter()
            .map(|p| {
                if p.is_absolute() {
                    p.clone()
                } else {
                    self.workspace_root.join(p)
                }
            })
            .collect();
        if let Some(missing) = paths.iter().find(|p| !p.exists()) {
            return Err(ApiError::PathNotFound(missing.clone()));
        }

        let request = ResolveRequest::new(key)
            .forced(force)
            .with_media_paths(paths);
        let decision = self
            .runtime
            .block_on(self.engine.resolve_request(request))?;
        self.cache.flush()?;

        Ok(match format {
            OutputFormat::Text => format_decision_text(&decision),
            OutputFormat::Json => format_decision_json(&decision),
        })
    }

    fn handle_show(&self, key: &str, format: OutputFormat) -> Result<String, ApiError> {
        let key: MediaKey = key.parse()?;
        match self.cache.get(&key)? {
            Some(decision) => Ok(match format {
                OutputFormat::Text => format_decision_text(&decision),
                OutputFormat::Json => format_decision_json(&decision),
            }),
            None => Ok(format!(
                "No decision cached for {}.\n\nRun `dateline resolve {}` to resolve it.",
                key, key
            )),
        }
    }

    fn handle_list(&self, unresolved: bool, format: OutputFormat) -> Result<String, ApiError> {
        let decisions = if unresolved {
            self.cache.list_unresolved()?
        } else {
            self.cache.list()?
        };
        Ok(match format {
            OutputFormat::Text => format_decision_list_text(&decisions, unresolved),
            OutputFormat::Json => format_decision_list_json(&decisions),
        })
    }

    fn handle_remap_source(&self, from: &str, to: &str) -> Result<String, ApiError> {
        if from.trim().is_empty() || to.trim().is_empty() {
            return Err(ApiError::InvalidArgument(
                "Source tags cannot be empty".to_string(),
            ));
        }
        let remapped = self
            .cache
            .remap_source(&Provenance::new(from), &Provenance::new(to))?;
        self.cache.flush()?;
        info!(from, to, remapped, "Remapped decision sources");
        Ok(format!(
            "Remapped {} decision(s) from {} to {}",
            remapped, from, to
        ))
    }

    fn handle_validate(&self) -> Result<String, ApiError> {
        let sources = &self.config.sources;
        let mut out = String::from("Configuration is valid\n\n");
        out.push_str(&format!(
            "  Profile: {:?}\n",
            self.config.resolver.profile
        ));
        out.push_str(&format!(
            "  Release priority: {}\n",
            self.config
                .resolver
                .release_priority
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
        out.push_str(&format!(
            "  Movie import history: {}\n",
            if sources.radarr.is_some() { "radarr" } else { "none" }
        ));
        out.push_str(&format!(
            "  Episode import history: {}\n",
            if sources.sonarr.is_some() { "sonarr" } else { "none" }
        ));
        out.push_str(&format!(
            "  Release dates: {}\n",
            if sources.tmdb.is_some() { "tmdb" } else { "none" }
        ));
        out.push_str(&format!(
            "  Library roots: {}\n",
            sources.library_roots.len()
        ));
        out.push_str(&format!(
            "  Cache: {}",
            self.config.cache.resolve_path(&self.workspace_root).display()
        ));
        Ok(out)
    }

    /// Feed newline-delimited notifications through a coalescer, then drain it.
    ///
    /// Unparseable lines are logged and counted, never fatal.
    pub fn ingest<R>(&self, reader: R, debounce_ms: Option<u64>) -> Result<IngestSummary, ApiError>
    where
        R: AsyncBufRead + Unpin,
    {
        self.runtime.block_on(self.ingest_from(reader, debounce_ms))
    }

    async fn ingest_from<R>(
        &self,
        reader: R,
        debounce_ms: Option<u64>,
    ) -> Result<IngestSummary, ApiError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut coalescer_config = self.config.coalescer.clone();
        if let Some(ms) = debounce_ms {
            coalescer_config.debounce_ms = ms;
        }
        coalescer_config
            .validate()
            .map_err(ApiError::InvalidArgument)?;
        let drain_timeout = coalescer_config.drain_timeout();

        let coalescer = EventCoalescer::new(self.engine(), coalescer_config)?;
        let mut reports = coalescer.subscribe();
        let mut tally = ReportTally::default();

        let mut lines = reader.lines();
        let mut read = 0usize;
        let mut accepted = 0usize;
        let mut rejected = 0usize;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => break,
                        Err(e) => {
                            warn!(error = %e, "Notification stream read failed, draining");
                            break;
                        }
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    read += 1;
                    let submitted = NotificationRecord::parse_line(&line)
                        .and_then(|notification| coalescer.submit(notification));
                    match submitted {
                        Ok(_) => accepted += 1,
                        Err(e) => {
                            warn!(line = read, error = %e, "Dropped notification");
                            rejected += 1;
                        }
                    }
                }
                report = reports.recv() => tally.record(report),
            }
        }

        let shutdown = coalescer.shutdown(drain_timeout).await;
        tally.drain(&mut reports);
        if shutdown.abandoned > 0 {
            warn!(abandoned = shutdown.abandoned, "Drain timed out before every batch flushed");
        }
        self.cache.flush()?;

        Ok(IngestSummary::from_run(
            read,
            accepted,
            rejected,
            tally.unresolved,
            &coalescer.stats(),
            &shutdown,
        ))
    }
}

#[derive(Debug, Default)]
struct ReportTally {
    unresolved: usize,
}

impl ReportTally {
    fn record(&mut self, report: Result<FlushReport, RecvError>) {
        match report {
            Ok(report) => {
                if let FlushOutcome::Resolved(decision) = &report.outcome {
                    info!(
                        key = %report.key,
                        hints = report.hints,
                        tier = %decision.tier,
                        source = %decision.source,
                        "Flushed"
                    );
                    if !decision.is_complete() {
                        self.unresolved += 1;
                    }
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Flush reports lagged; summary undercounts unresolved");
            }
            Err(RecvError::Closed) => {}
        }
    }

    fn drain(&mut self, reports: &mut Receiver<FlushReport>) {
        use tokio::sync::broadcast::error::TryRecvError;
        loop {
            match reports.try_recv() {
                Ok(report) => self.record(Ok(report)),
                Err(TryRecvError::Lagged(skipped)) => self.record(Err(RecvError::Lagged(skipped))),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }
}
