//! Build driver for the host document pipeline.
//!
//! A [`BuildSession`] owns one backend connection (through its [`Resolver`]) and
//! the build's [`Registry`], and reads documents one after the other. For larger
//! builds [`build_parallel`] splits the documents over worker threads, each with
//! its own connection and registry, and merges the worker registries afterwards.
//! Links are looked up again once every document has been read, so references
//! to objects defined in later documents still link.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::backend::{Backend, Connection};
use crate::error::{DomainError, Result};
use crate::reference::ObjectType;
use crate::registry::Registry;
use crate::resolver::Resolver;
use crate::settings::Settings;
use crate::title::{self, Definition, Diagnostic, DiagnosticKind, ResolvedReference};

// ------------- Input -------------
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Occurrence {
    Definition {
        object_type: ObjectType,
        signature: String,
        line: usize,
    },
    Reference {
        object_type: ObjectType,
        text: String,
        line: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceDocument {
    pub name: String,
    pub occurrences: Vec<Occurrence>,
}

impl SourceDocument {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            occurrences: Vec::new(),
        }
    }
    pub fn define(mut self, object_type: ObjectType, signature: &str, line: usize) -> Self {
        self.occurrences.push(Occurrence::Definition {
            object_type,
            signature: signature.to_string(),
            line,
        });
        self
    }
    pub fn reference(mut self, object_type: ObjectType, text: &str, line: usize) -> Self {
        self.occurrences.push(Occurrence::Reference {
            object_type,
            text: text.to_string(),
            line,
        });
        self
    }
}

// ------------- Output -------------
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rendered {
    Heading(Definition),
    /// The directive documents an object the backend does not know; nothing is rendered.
    BrokenDefinition {
        object_type: ObjectType,
        signature: String,
        line: usize,
    },
    Reference(ResolvedReference),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentOutput {
    pub document: String,
    pub rendered: Vec<Rendered>,
    pub diagnostics: Vec<Diagnostic>,
}

impl DocumentOutput {
    pub fn references(&self) -> impl Iterator<Item = &ResolvedReference> {
        self.rendered.iter().filter_map(|r| match r {
            Rendered::Reference(reference) => Some(reference),
            _ => None,
        })
    }
    pub fn headings(&self) -> impl Iterator<Item = &Definition> {
        self.rendered.iter().filter_map(|r| match r {
            Rendered::Heading(definition) => Some(definition),
            _ => None,
        })
    }
    fn relink(&mut self, registry: &Registry) {
        for rendered in &mut self.rendered {
            if let Rendered::Reference(reference) = rendered {
                reference.relink(registry, &self.document);
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub documents: usize,
    pub definitions: usize,
    pub references: usize,
    pub broken_definitions: usize,
    pub diagnostics: Vec<Diagnostic>,
    pub elapsed: Duration,
}

impl BuildReport {
    fn add(&mut self, output: &DocumentOutput) {
        self.documents += 1;
        for rendered in &output.rendered {
            match rendered {
                Rendered::Heading(_) => self.definitions += 1,
                Rendered::BrokenDefinition { .. } => self.broken_definitions += 1,
                Rendered::Reference(_) => self.references += 1,
            }
        }
        self.diagnostics.extend(output.diagnostics.iter().cloned());
    }
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.kind.is_fatal())
    }
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.diagnostics.iter().filter(|d| d.kind == kind).count()
    }
    /// Fails when broken definitions are not tolerated and there are any.
    pub fn check(&self, fail_on_broken_definition: bool) -> Result<()> {
        if fail_on_broken_definition && self.broken_definitions > 0 {
            return Err(DomainError::BrokenDefinitions(self.broken_definitions));
        }
        Ok(())
    }
}

// ------------- BuildSession -------------
pub struct BuildSession<B: Backend> {
    resolver: Resolver<B>,
    registry: Registry,
    registry_path: Option<PathBuf>,
    fail_on_broken_definition: bool,
    outputs: Vec<DocumentOutput>,
    started: Instant,
}

impl<B: Backend> BuildSession<B> {
    pub fn new(backend: B) -> Self {
        Self {
            resolver: Resolver::new(backend),
            registry: Registry::new(),
            registry_path: None,
            fail_on_broken_definition: true,
            outputs: Vec::new(),
            started: Instant::now(),
        }
    }
    /// A session continuing from the registry saved by an earlier build, if any.
    pub fn from_settings(backend: B, settings: &Settings) -> Result<Self> {
        let mut session = Self::new(backend);
        session.fail_on_broken_definition = settings.fail_on_broken_definition;
        if let Some(path) = &settings.registry_path {
            if path.exists() {
                session.registry = Registry::load(path)?;
                info!(path = %path.display(), entries = session.registry.len(), "continuing from saved registry");
            }
            session.registry_path = Some(path.clone());
        }
        Ok(session)
    }
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }
    pub fn resolver(&self) -> &Resolver<B> {
        &self.resolver
    }
    pub fn resolver_mut(&mut self) -> &mut Resolver<B> {
        &mut self.resolver
    }
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Reads (or re-reads) one document. Whatever the document defined before is forgotten first.
    pub fn read_document(&mut self, document: &SourceDocument) -> DocumentOutput {
        let name = document.name.as_str();
        self.registry.clear(name);
        let mut rendered = Vec::with_capacity(document.occurrences.len());
        let mut diagnostics = Vec::new();
        for occurrence in &document.occurrences {
            match occurrence {
                Occurrence::Definition {
                    object_type,
                    signature,
                    line,
                } => {
                    match title::define(&self.resolver, &mut self.registry, name, Some(*line), *object_type, signature) {
                        Ok(definition) => {
                            if let Some(duplicate) = &definition.duplicate {
                                diagnostics.push(Diagnostic::duplicate(Some(*line), duplicate));
                            }
                            rendered.push(Rendered::Heading(definition));
                        }
                        Err(e) => {
                            diagnostics.push(Diagnostic::new(
                                name,
                                Some(*line),
                                DiagnosticKind::DefinitionNotFound,
                                e.to_string(),
                            ));
                            rendered.push(Rendered::BrokenDefinition {
                                object_type: *object_type,
                                signature: signature.clone(),
                                line: *line,
                            });
                        }
                    }
                }
                Occurrence::Reference {
                    object_type,
                    text,
                    line,
                } => {
                    let reference =
                        title::reference_title(&self.resolver, &self.registry, name, Some(*line), *object_type, text);
                    diagnostics.extend(reference.diagnostics.iter().cloned());
                    rendered.push(Rendered::Reference(reference));
                }
            }
        }
        debug!(document = name, occurrences = rendered.len(), warnings = diagnostics.len(), "read document");
        DocumentOutput {
            document: name.to_string(),
            rendered,
            diagnostics,
        }
    }

    /// Reads every document, keeping the output for [`BuildSession::finish`].
    pub fn read_all(&mut self, documents: &[SourceDocument]) {
        for document in documents {
            let output = self.read_document(document);
            self.outputs.retain(|o| o.document != output.document);
            self.outputs.push(output);
        }
    }

    /// Links every read reference against the final registry and saves the registry.
    pub fn finish(mut self) -> Result<(Registry, Vec<DocumentOutput>, BuildReport)> {
        let mut report = BuildReport::default();
        for output in &mut self.outputs {
            output.relink(&self.registry);
            report.add(output);
        }
        report.elapsed = self.started.elapsed();
        info!(
            documents = report.documents,
            definitions = report.definitions,
            references = report.references,
            warnings = report.warnings().count(),
            "build finished"
        );
        report.check(self.fail_on_broken_definition)?;
        if let Some(path) = &self.registry_path {
            self.registry.save(path)?;
        }
        Ok((self.registry, self.outputs, report))
    }
}

// ------------- Parallel build -------------
struct WorkerResult {
    worker: usize,
    documents: Vec<String>,
    registry: Registry,
    outputs: Vec<DocumentOutput>,
}

/// The merged outcome of a partitioned build.
#[derive(Debug)]
pub struct ParallelBuild {
    pub workers: usize,
    pub registry: Registry,
    pub outputs: Vec<DocumentOutput>,
    pub report: BuildReport,
}

/// Reads `documents` on up to `workers` threads. `connect` opens a fresh backend
/// connection for every worker, so no resolver cache is shared between threads.
pub fn build_parallel<B, F>(documents: Vec<SourceDocument>, workers: usize, connect: F) -> Result<ParallelBuild>
where
    B: Backend + 'static,
    F: Fn() -> Result<B> + Send + Sync + 'static,
{
    build_partitioned(documents, workers, connect, Registry::new())
}

/// A parallel build against the configured connection, with `settings.workers`
/// threads. Continues from the saved registry and saves the merged one, unless
/// broken definitions fail the build.
pub fn build_with_settings(documents: Vec<SourceDocument>, settings: &Settings) -> Result<ParallelBuild> {
    let registry = match &settings.registry_path {
        Some(path) if path.exists() => Registry::load(path)?,
        _ => Registry::new(),
    };
    let connection_settings = settings.clone();
    let build = build_partitioned(
        documents,
        settings.workers(),
        move || Connection::open(&connection_settings),
        registry,
    )?;
    build.report.check(settings.fail_on_broken_definition)?;
    if let Some(path) = &settings.registry_path {
        build.registry.save(path)?;
    }
    Ok(build)
}

fn build_partitioned<B, F>(
    documents: Vec<SourceDocument>,
    workers: usize,
    connect: F,
    mut registry: Registry,
) -> Result<ParallelBuild>
where
    B: Backend + 'static,
    F: Fn() -> Result<B> + Send + Sync + 'static,
{
    let started = Instant::now();
    for document in &documents {
        registry.clear(&document.name);
    }
    let workers = workers.max(1).min(documents.len().max(1));
    let mut partitions: Vec<Vec<SourceDocument>> = (0..workers).map(|_| Vec::new()).collect();
    for (i, document) in documents.into_iter().enumerate() {
        partitions[i % workers].push(document);
    }

    let connect = Arc::new(connect);
    let (tx, rx) = mpsc::channel::<Result<WorkerResult>>();
    let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(workers);
    for (worker, partition) in partitions.into_iter().enumerate() {
        let tx = tx.clone();
        let connect = Arc::clone(&connect);
        handles.push(thread::spawn(move || {
            let result = connect().map(|backend| {
                info!(worker, documents = partition.len(), "worker started");
                let mut session = BuildSession::new(backend);
                let outputs: Vec<DocumentOutput> = partition.iter().map(|d| session.read_document(d)).collect();
                WorkerResult {
                    worker,
                    documents: partition.into_iter().map(|d| d.name).collect(),
                    registry: session.registry,
                    outputs,
                }
            });
            // the receiver only hangs up once every worker has reported
            let _ = tx.send(result);
        }));
    }
    drop(tx);

    let mut results = Vec::with_capacity(workers);
    for result in rx {
        results.push(result?);
    }
    for handle in handles {
        handle
            .join()
            .map_err(|_| DomainError::Worker("worker thread panicked".to_string()))?;
    }
    if results.len() != workers {
        return Err(DomainError::Worker(format!("{} of {} workers reported", results.len(), workers)));
    }
    results.sort_by_key(|r| r.worker);

    let mut outputs = Vec::new();
    let mut report = BuildReport::default();
    for result in results {
        for duplicate in registry.merge(&result.registry, result.documents.as_slice()) {
            warn!(worker = result.worker, "{}", duplicate);
            report.diagnostics.push(Diagnostic::duplicate(None, &duplicate));
        }
        outputs.extend(result.outputs);
    }
    for output in &mut outputs {
        output.relink(&registry);
        report.add(output);
    }
    report.elapsed = started.elapsed();
    info!(
        workers,
        documents = report.documents,
        entries = registry.len(),
        "parallel build merged"
    );
    Ok(ParallelBuild {
        workers,
        registry,
        outputs,
        report,
    })
}
