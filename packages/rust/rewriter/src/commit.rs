//! In-place rewrite of a document on disk.
//!
//! The pass writes into a staging file next to the target. Only a pass that
//! completed and injected something is renamed over the original; anything
//! else removes the staging file and leaves the original untouched.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use docweave_shared::{DocumentTarget, DocweaveError, Result};
use docweave_xml::StreamSink;

use crate::driver::Rewriter;
use crate::injection::{Anchor, Injection, TargetKind};

/// Result of rewriting one document.
#[derive(Debug, Clone, Serialize)]
pub struct RewriteOutcome {
    pub path: PathBuf,
    pub kind: TargetKind,
    /// `None` when no anchor was reached and the file was left alone.
    pub anchor: Option<Anchor>,
    pub bytes_written: u64,
    pub sha256: String,
}

impl RewriteOutcome {
    pub fn injected(&self) -> bool {
        self.anchor.is_some()
    }
}

/// `Write` adapter that hashes everything passing through.
pub struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    /// The inner writer and the hex digest of what was written.
    pub fn finalize(self) -> (W, String) {
        (self.inner, format!("{:x}", self.hasher.finalize()))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Staging file for `target`: hidden, unique, in the same directory.
pub fn staging_path(target: &Path, temp_suffix: &str) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.{}{temp_suffix}", Uuid::now_v7()))
}

/// Rewrite `target` in place.
#[instrument(skip_all, fields(target = %target.path.display(), kind = ?kind))]
pub fn rewrite_file(
    target: &DocumentTarget,
    kind: TargetKind,
    injection: &Injection,
    temp_suffix: &str,
) -> Result<RewriteOutcome> {
    let path = &target.path;
    let input = File::open(path).map_err(|e| DocweaveError::io(path, e))?;
    let temp = staging_path(path, temp_suffix);

    let staged = stage(&temp, input, target, kind, injection);
    let (anchor, bytes_written, sha256) = match staged {
        Ok(staged) => staged,
        Err(e) => {
            discard(&temp);
            return Err(e);
        }
    };

    if anchor.is_some() {
        commit(&temp, path)?;
        info!(?anchor, bytes = bytes_written, "document rewritten");
    } else {
        discard(&temp);
        info!("no injection point, document left unchanged");
    }

    Ok(RewriteOutcome {
        path: path.clone(),
        kind,
        anchor,
        bytes_written,
        sha256,
    })
}

fn stage(
    temp: &Path,
    input: File,
    target: &DocumentTarget,
    kind: TargetKind,
    injection: &Injection,
) -> Result<(Option<Anchor>, u64, String)> {
    let file = File::create(temp).map_err(|e| DocweaveError::io(temp, e))?;
    let mut sink = StreamSink::new(HashingWriter::new(BufWriter::new(file)), temp);

    let rewriter = Rewriter::new(kind, target.scope.clone(), injection)?;
    let anchor = rewriter.run(BufReader::new(input), &mut sink)?;

    let bytes = sink.written();
    let (writer, sha256) = sink.finish()?.finalize();
    writer
        .into_inner()
        .map_err(|e| DocweaveError::io(temp, e.into_error()))?
        .sync_all()
        .map_err(|e| DocweaveError::io(temp, e))?;
    debug!(staging = %temp.display(), bytes, "staged output");
    Ok((anchor, bytes, sha256))
}

/// Swap the staged file over `target`; on failure the staging file is removed.
fn commit(temp: &Path, target: &Path) -> Result<()> {
    fs::rename(temp, target).map_err(|e| {
        discard(temp);
        DocweaveError::commit(target, e.to_string())
    })
}

fn discard(temp: &Path) {
    if let Err(e) = fs::remove_file(temp) {
        if e.kind() != io::ErrorKind::NotFound {
            debug!(staging = %temp.display(), error = %e, "could not remove staging file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("docweave-commit-test-{}", Uuid::now_v7()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with('.'))
            .collect()
    }

    fn markup() -> Injection {
        Injection::Markup("<keyword>k</keyword>".into())
    }

    #[test]
    fn rewrites_in_place() {
        let tmp = temp_dir();
        let path = tmp.join("a.dita");
        fs::write(&path, "<topic id=\"a\"><title>A</title><body/></topic>").unwrap();

        let target = DocumentTarget::parse(&format!("{}#a", path.display()));
        let outcome = rewrite_file(&target, TargetKind::Topic, &markup(), ".tmp").unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "<topic id=\"a\"><title>A</title><prolog><metadata><keyword>k</keyword></metadata></prolog><body/></topic>"
        );
        assert!(outcome.injected());
        assert_eq!(outcome.bytes_written, written.len() as u64);
        let mut hasher = Sha256::new();
        hasher.update(written.as_bytes());
        assert_eq!(outcome.sha256, format!("{:x}", hasher.finalize()));
        assert!(leftovers(&tmp).is_empty());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn malformed_target_left_untouched() {
        let tmp = temp_dir();
        let path = tmp.join("bad.dita");
        let original = "<topic><title>T</title><body></topic>";
        fs::write(&path, original).unwrap();

        let target = DocumentTarget::parse(&path.display().to_string());
        assert!(rewrite_file(&target, TargetKind::Topic, &markup(), ".tmp").is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
        assert!(leftovers(&tmp).is_empty());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn unreached_scope_leaves_file_alone() {
        let tmp = temp_dir();
        let path = tmp.join("a.dita");
        let original = "<topic id=\"a\"><body>x > y</body></topic>";
        fs::write(&path, original).unwrap();

        let target = DocumentTarget::parse(&format!("{}#zzz", path.display()));
        let outcome = rewrite_file(&target, TargetKind::Topic, &markup(), ".tmp").unwrap();
        assert!(!outcome.injected());
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
        assert!(leftovers(&tmp).is_empty());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn failed_swap_is_commit_error_and_cleans_up() {
        let tmp = temp_dir();
        let target = tmp.join("a.dita");
        fs::create_dir_all(target.join("occupied")).unwrap();
        let staged = staging_path(&target, ".tmp");
        fs::write(&staged, "<topic/>").unwrap();

        let err = commit(&staged, &target).unwrap_err();
        assert!(matches!(err, DocweaveError::Commit { ref path, .. } if path == &target));
        assert!(!staged.exists());
        assert!(leftovers(&tmp).is_empty());
        assert!(target.join("occupied").is_dir());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_target_is_io_error() {
        let tmp = temp_dir();
        let target = DocumentTarget::parse(&tmp.join("nope.dita").display().to_string());
        let err = rewrite_file(&target, TargetKind::Topic, &markup(), ".tmp").unwrap_err();
        assert!(matches!(err, DocweaveError::Io { .. }));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn staging_path_is_hidden_sibling() {
        let staged = staging_path(Path::new("dir/a.dita"), ".tmp");
        assert_eq!(staged.parent(), Some(Path::new("dir")));
        let name = staged.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".a.dita."));
        assert!(name.ends_with(".tmp"));
    }
}
