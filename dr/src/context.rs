//! Background research context
//!
//! The documents in the context directory are read once per process and
//! concatenated with boundary markers. The result is shared read-only by every
//! run.

use std::fmt;
use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use eyre::{Context as _, Result};
use tracing::{debug, info, warn};

use crate::config::ContextConfig;

/// Text used when no documents could be loaded
pub const NO_CONTEXT: &str = "No context documents found.";

static SHARED: Mutex<Option<ResearchContext>> = Mutex::new(None);

/// Immutable, cheaply cloneable research context
#[derive(Clone, PartialEq, Eq)]
pub struct ResearchContext {
    text: Arc<str>,
    documents: usize,
}

impl ResearchContext {
    /// Wrap already-assembled text
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self {
            text: text.into(),
            documents: 0,
        }
    }

    /// Load every document matching `config.pattern` in `config.dir`
    ///
    /// A missing directory, or one without readable documents, yields the
    /// `NO_CONTEXT` placeholder instead of an error. Only a malformed pattern
    /// fails.
    pub fn load(config: &ContextConfig) -> Result<Self> {
        debug!(dir = ?config.dir, pattern = %config.pattern, "ResearchContext::load: called");
        if !config.dir.is_dir() {
            warn!("Context directory {} not found", config.dir.display());
            return Ok(Self::new(NO_CONTEXT));
        }

        let mut paths = document_paths(&config.dir, &config.pattern)?;
        paths.sort();

        let mut sections = Vec::with_capacity(paths.len());
        for path in &paths {
            match fs::read_to_string(path) {
                Ok(text) => sections.push(wrap_document(&display_name(path), &text)),
                Err(e) => warn!("Failed to read context document {}: {}", path.display(), e),
            }
        }

        if sections.is_empty() {
            warn!("No readable context documents in {}", config.dir.display());
            return Ok(Self::new(NO_CONTEXT));
        }

        let documents = sections.len();
        let text = sections.join("\n\n");
        info!(documents, bytes = text.len(), "Loaded research context from {}", config.dir.display());
        Ok(Self {
            text: text.into(),
            documents,
        })
    }

    /// Process-wide context, loaded on first call
    ///
    /// Later calls return the first value regardless of `config`. Concurrent
    /// first callers wait for a single load; a failed load is not cached.
    pub fn shared(config: &ContextConfig) -> Result<Self> {
        init_once(&SHARED, || Self::load(config))
    }

    /// Full context text
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of documents that were loaded
    pub fn document_count(&self) -> usize {
        self.documents
    }
}

impl Deref for ResearchContext {
    type Target = str;

    fn deref(&self) -> &str {
        &self.text
    }
}

impl fmt::Debug for ResearchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResearchContext")
            .field("documents", &self.documents)
            .field("bytes", &self.text.len())
            .finish()
    }
}

fn init_once(
    slot: &Mutex<Option<ResearchContext>>,
    load: impl FnOnce() -> Result<ResearchContext>,
) -> Result<ResearchContext> {
    let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(ctx) = guard.as_ref() {
        debug!("init_once: already initialized");
        return Ok(ctx.clone());
    }
    let loaded = load()?;
    *guard = Some(loaded.clone());
    Ok(loaded)
}

fn document_paths(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = dir.join(pattern);
    let full = full.to_string_lossy();
    let entries = glob::glob(&full).context(format!("Invalid context pattern: {}", full))?;

    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => paths.push(path),
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable context entry: {}", e),
        }
    }
    Ok(paths)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn wrap_document(name: &str, text: &str) -> String {
    format!(
        "--- BEGIN DOCUMENT: {name} ---\n\n{text}\n\n--- END DOCUMENT: {name} ---"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_for(dir: &Path) -> ContextConfig {
        ContextConfig {
            dir: dir.to_path_buf(),
            pattern: "*.md".to_string(),
        }
    }

    #[test]
    fn test_missing_directory_yields_placeholder() {
        let temp = tempdir().unwrap();
        let ctx = ResearchContext::load(&config_for(&temp.path().join("nope"))).unwrap();
        assert_eq!(ctx.as_str(), NO_CONTEXT);
        assert_eq!(ctx.document_count(), 0);
    }

    #[test]
    fn test_empty_directory_yields_placeholder() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("notes.txt"), "not markdown").unwrap();

        let ctx = ResearchContext::load(&config_for(temp.path())).unwrap();
        assert_eq!(ctx.as_str(), NO_CONTEXT);
    }

    #[test]
    fn test_documents_sorted_and_wrapped() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("b.md"), "second").unwrap();
        fs::write(temp.path().join("a.md"), "first").unwrap();

        let ctx = ResearchContext::load(&config_for(temp.path())).unwrap();

        assert_eq!(ctx.document_count(), 2);
        assert_eq!(
            ctx.as_str(),
            "--- BEGIN DOCUMENT: a.md ---\n\nfirst\n\n--- END DOCUMENT: a.md ---\n\n\
             --- BEGIN DOCUMENT: b.md ---\n\nsecond\n\n--- END DOCUMENT: b.md ---"
        );
    }

    #[test]
    fn test_custom_pattern() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.md"), "md").unwrap();
        fs::write(temp.path().join("b.txt"), "txt").unwrap();

        let config = ContextConfig {
            dir: temp.path().to_path_buf(),
            pattern: "*.txt".to_string(),
        };
        let ctx = ResearchContext::load(&config).unwrap();
        assert!(ctx.contains("BEGIN DOCUMENT: b.txt"));
        assert!(!ctx.contains("a.md"));
    }

    #[test]
    fn test_clone_shares_text() {
        let ctx = ResearchContext::new("background");
        let other = ctx.clone();
        assert!(Arc::ptr_eq(&ctx.text, &other.text));
        assert_eq!(&*other, "background");
    }

    #[test]
    fn test_shared_initializes_once() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.md"), "once").unwrap();

        let first = ResearchContext::shared(&config_for(temp.path())).unwrap();
        fs::write(temp.path().join("a.md"), "changed").unwrap();
        let second = ResearchContext::shared(&config_for(&temp.path().join("elsewhere"))).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_concurrent_first_callers_load_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let slot = Mutex::new(None);
        let loads = AtomicUsize::new(0);

        let contexts: Vec<ResearchContext> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        init_once(&slot, || {
                            loads.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(20));
                            Ok(ResearchContext::new("loaded"))
                        })
                        .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(contexts.iter().all(|c| Arc::ptr_eq(&c.text, &contexts[0].text)));
    }

    #[test]
    fn test_failed_load_is_retried() {
        let slot = Mutex::new(None);
        assert!(init_once(&slot, || Err(eyre::eyre!("bad pattern"))).is_err());

        let ctx = init_once(&slot, || Ok(ResearchContext::new("second try"))).unwrap();
        assert_eq!(ctx.as_str(), "second try");
    }
}
