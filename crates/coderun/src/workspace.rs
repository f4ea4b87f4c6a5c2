//! Scratch directory and per-request workspaces
//!
//! Every request gets its own subdirectory of the scratch root, named by a
//! token that is unique within the process. All files a request creates live
//! in that subdirectory and are removed when the request ends.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::Language;

/// Attempts at finding an unused workspace name before giving up
const MAX_CREATE_ATTEMPTS: usize = 16;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

static CLASS_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:public\s+)?(?:final\s+)?(?:abstract\s+)?class\s+(\w+)")
        .expect("class declaration pattern should compile")
});

/// Errors that occur while managing workspace files
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("could not allocate a unique workspace after {0} attempts")]
    TokenExhausted(usize),
}

/// Find the class name Java requires the source file to be named after.
///
/// Accepts an optional `public`, then optional `final`/`abstract`, then
/// `class <Identifier>`; the first match wins.
pub fn java_class_name(code: &str) -> Option<&str> {
    CLASS_DECLARATION
        .captures(code)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// The process-wide scratch root
#[derive(Debug, Clone)]
pub struct Scratch {
    root: PathBuf,
}

impl Scratch {
    /// Create the scratch root if needed (idempotent, recursive)
    #[instrument]
    pub async fn prepare(root: &Path) -> Result<Self, WorkspaceError> {
        tokio::fs::create_dir_all(root).await?;
        let root = std::path::absolute(root)?;
        debug!(root = %root.display(), "scratch directory ready");
        Ok(Self { root })
    }

    /// Get the scratch root
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn next_token() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{millis:x}-{seq}")
}

/// Files owned by a single request
///
/// # Cleanup
///
/// Always call [`cleanup()`](Self::cleanup) before dropping. The `Drop`
/// implementation removes leftovers synchronously and logs a warning, which
/// only happens when a request future is cancelled mid-flight.
#[derive(Debug)]
pub struct Workspace {
    token: String,
    dir: PathBuf,
    artifacts: Vec<PathBuf>,
    active: bool,
}

impl Workspace {
    /// Create a fresh subdirectory of the scratch root
    #[instrument(skip(scratch))]
    pub async fn create(scratch: &Scratch) -> Result<Self, WorkspaceError> {
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let token = next_token();
            let dir = scratch.root().join(&token);
            match tokio::fs::create_dir(&dir).await {
                Ok(()) => {
                    debug!(%token, "workspace created");
                    return Ok(Self {
                        token,
                        dir,
                        artifacts: Vec::new(),
                        active: true,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(WorkspaceError::TokenExhausted(MAX_CREATE_ATTEMPTS))
    }

    /// Get the request token
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Get the workspace directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Generic artifact stem, `temp_<token>`
    pub fn stem(&self) -> String {
        format!("temp_{}", self.token)
    }

    /// Paths registered for deletion
    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    /// Whether cleanup is still pending
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Get the path to a file inside the workspace
    ///
    /// Returns an error if the name could escape the workspace.
    pub fn file_path(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        if name.is_empty()
            || name.contains("..")
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(WorkspaceError::InvalidPath(format!(
                "not a plain file name: {name}"
            )));
        }
        Ok(self.dir.join(name))
    }

    /// Track a file that a later step will create (binary, class file)
    pub fn register(&mut self, name: &str) -> Result<PathBuf, WorkspaceError> {
        let path = self.file_path(name)?;
        if !self.artifacts.contains(&path) {
            self.artifacts.push(path.clone());
        }
        Ok(path)
    }

    /// Write a file into the workspace and track it
    #[instrument(skip(self, content))]
    pub async fn write_file(&mut self, name: &str, content: &[u8]) -> Result<PathBuf, WorkspaceError> {
        let path = self.register(name)?;
        tokio::fs::write(&path, content).await?;
        debug!(path = %path.display(), len = content.len(), "wrote file to workspace");
        Ok(path)
    }

    /// Write the submitted source where the language expects it.
    ///
    /// Returns `None` for inline languages, which take no file.
    pub async fn materialize(
        &mut self,
        language: &Language,
        code: &str,
        class: Option<&str>,
    ) -> Result<Option<PathBuf>, WorkspaceError> {
        let Some(name) = language.source_name(&self.stem(), class) else {
            return Ok(None);
        };
        self.write_file(&name, code.as_bytes()).await.map(Some)
    }

    /// Write stdin content, unless it is blank
    pub async fn materialize_stdin(&mut self, input: &str) -> Result<Option<PathBuf>, WorkspaceError> {
        if input.trim().is_empty() {
            return Ok(None);
        }
        let name = format!("input_{}.txt", self.token);
        self.write_file(&name, input.as_bytes()).await.map(Some)
    }

    /// Delete every artifact and the workspace directory.
    ///
    /// Failures are logged and never returned, so they cannot replace the
    /// request's real result. Calling this more than once is a no-op.
    #[instrument(skip(self), fields(token = %self.token))]
    pub async fn cleanup(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        for path in &self.artifacts {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "removed artifact"),
                // Compile steps that fail never produce their output
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove artifact"),
            }
        }

        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => debug!("workspace removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %self.dir.display(), error = %e, "failed to remove workspace"),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        warn!(
            token = %self.token,
            "Workspace dropped without explicit cleanup, removing it synchronously"
        );
        for path in &self.artifacts {
            let _ = std::fs::remove_file(path);
        }
        if let Err(e) = std::fs::remove_dir_all(&self.dir)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(dir = %self.dir.display(), error = %e, "best-effort cleanup failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::{FileExtension, RunConfig, SourceLayout};

    fn language(extension: &str, source: SourceLayout) -> Language {
        Language {
            name: "Test".to_owned(),
            extension: FileExtension::new(extension).unwrap(),
            source,
            privileged: false,
            compact_diagnostics: false,
            hint: None,
            limits: None,
            compile: None,
            run: RunConfig {
                command: vec!["true".to_owned()],
                env: HashMap::new(),
            },
        }
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn java_class_name_variants() {
        assert_eq!(java_class_name("public class Main {}"), Some("Main"));
        assert_eq!(java_class_name("class Hello { }"), Some("Hello"));
        assert_eq!(java_class_name("public final class Solver {}"), Some("Solver"));
        assert_eq!(java_class_name("abstract class Shape {}"), Some("Shape"));
        assert_eq!(
            java_class_name("import java.util.*;\n\npublic   class\n  App_2 {}"),
            Some("App_2")
        );
    }

    #[test]
    fn java_class_name_missing() {
        assert_eq!(java_class_name("System.out.println(1);"), None);
        assert_eq!(java_class_name("interface Runnable {}"), None);
        assert_eq!(java_class_name(""), None);
    }

    #[test]
    fn java_class_name_first_declaration_wins() {
        let code = "class Helper {}\npublic class Main {}";
        assert_eq!(java_class_name(code), Some("Helper"));
    }

    #[test]
    fn tokens_are_unique() {
        let a = next_token();
        let b = next_token();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn scratch_prepare_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("a/b/temp");
        let first = Scratch::prepare(&root).await.unwrap();
        let second = Scratch::prepare(&root).await.unwrap();
        assert!(first.root().is_absolute());
        assert_eq!(first.root(), second.root());
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn workspace_materialize_generic_and_cleanup() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = Scratch::prepare(tmp.path()).await.unwrap();
        let mut ws = Workspace::create(&scratch).await.unwrap();

        let lang = language("py", SourceLayout::Generic);
        let source = ws
            .materialize(&lang, "print('hi')", None)
            .await
            .unwrap()
            .unwrap();

        let name = source.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, format!("temp_{}.py", ws.token()));
        assert_eq!(std::fs::read_to_string(&source).unwrap(), "print('hi')");
        assert!(source.starts_with(ws.dir()));

        ws.cleanup().await;
        assert!(!ws.is_active());
        assert!(!source.exists());
        assert_eq!(entries(scratch.root()), 0);
    }

    #[tokio::test]
    async fn workspace_materialize_java_class() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = Scratch::prepare(tmp.path()).await.unwrap();
        let mut ws = Workspace::create(&scratch).await.unwrap();

        let lang = language("java", SourceLayout::JavaClass);
        let source = ws
            .materialize(&lang, "public class Main {}", Some("Main"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(source, ws.dir().join("Main.java"));

        ws.cleanup().await;
        assert_eq!(entries(scratch.root()), 0);
    }

    #[tokio::test]
    async fn workspace_inline_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = Scratch::prepare(tmp.path()).await.unwrap();
        let mut ws = Workspace::create(&scratch).await.unwrap();

        let lang = language("sh", SourceLayout::Inline);
        assert!(ws.materialize(&lang, "echo hi", None).await.unwrap().is_none());
        assert!(ws.artifacts().is_empty());
        assert_eq!(entries(ws.dir()), 0);

        ws.cleanup().await;
    }

    #[tokio::test]
    async fn workspace_stdin_only_when_not_blank() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = Scratch::prepare(tmp.path()).await.unwrap();
        let mut ws = Workspace::create(&scratch).await.unwrap();

        assert!(ws.materialize_stdin("  \n\t").await.unwrap().is_none());
        let path = ws.materialize_stdin("5\n7\n").await.unwrap().unwrap();
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            format!("input_{}.txt", ws.token())
        );
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "5\n7\n");

        ws.cleanup().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn workspace_cleanup_tolerates_missing_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = Scratch::prepare(tmp.path()).await.unwrap();
        let mut ws = Workspace::create(&scratch).await.unwrap();

        // Registered but never produced, like a binary after a failed compile
        ws.register("temp_binary").unwrap();
        // Produced by a tool but never registered, like a nested class file
        std::fs::write(ws.dir().join("Main$Inner.class"), b"\xca\xfe").unwrap();

        ws.cleanup().await;
        ws.cleanup().await;
        assert_eq!(entries(scratch.root()), 0);
    }

    #[tokio::test]
    async fn workspace_drop_without_cleanup_removes_files() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = Scratch::prepare(tmp.path()).await.unwrap();
        {
            let mut ws = Workspace::create(&scratch).await.unwrap();
            ws.write_file("leftover.txt", b"x").await.unwrap();
        }
        assert_eq!(entries(scratch.root()), 0);
    }

    #[tokio::test]
    async fn concurrent_workspaces_are_distinct() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = Scratch::prepare(tmp.path()).await.unwrap();
        let (a, b) = tokio::join!(Workspace::create(&scratch), Workspace::create(&scratch));
        let (mut a, mut b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.token(), b.token());
        assert_ne!(a.dir(), b.dir());
        a.cleanup().await;
        b.cleanup().await;
    }

    #[test]
    fn file_path_validation() {
        let ws = Workspace {
            token: "t".to_owned(),
            dir: PathBuf::from("/tmp/scratch/t"),
            artifacts: Vec::new(),
            active: false,
        };

        assert!(ws.file_path("Main.java").is_ok());
        assert!(ws.file_path("../escape").is_err());
        assert!(ws.file_path("sub/file").is_err());
        assert!(ws.file_path("/absolute").is_err());
        assert!(ws.file_path("").is_err());
    }
}
