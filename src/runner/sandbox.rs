//! Ephemeral sandbox directories for trigger probes.
//!
//! Each run gets a private temp directory holding exactly one synthetic
//! command definition whose description is the candidate text. The agent is
//! pointed at the directory with --add-dir; if it invokes the command, the
//! description triggered.

use anyhow::{Context, Result};
use std::path::Path;
use tempfile::TempDir;
use uuid::Uuid;

/// Sandbox with the single command artifact. The directory is removed on
/// drop, which covers success, timeout, and error exits alike.
pub struct Sandbox {
    dir: TempDir,
    /// Unique command name embedded in the artifact filename; seeing it in a
    /// tool invocation is the trigger signal.
    pub marker: String,
}

impl Sandbox {
    pub fn create(description: &str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("skillforge-probe-")
            .tempdir()
            .context("failed to create sandbox directory")?;

        let suffix = Uuid::new_v4().simple().to_string();
        let marker = format!("skill-eval-{}", &suffix[..8]);

        let commands = dir.path().join(".claude").join("commands");
        std::fs::create_dir_all(&commands)?;

        // JSON string escaping is valid YAML, so the description can carry
        // quotes, colons, and newlines
        let quoted = serde_json::to_string(description)?;
        let artifact = commands.join(format!("{marker}.md"));
        std::fs::write(
            &artifact,
            format!(
                "---\ndescription: {quoted}\n---\n\n\
                 Respond that the command was invoked.\n"
            ),
        )?;

        Ok(Self { dir, marker })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_layout() {
        let sandbox = Sandbox::create("Summarize PDFs: use when asked").unwrap();
        assert!(sandbox.marker.starts_with("skill-eval-"));
        assert_eq!(sandbox.marker.len(), "skill-eval-".len() + 8);

        let artifact = sandbox
            .path()
            .join(".claude")
            .join("commands")
            .join(format!("{}.md", sandbox.marker));
        let content = std::fs::read_to_string(artifact).unwrap();
        assert!(content.starts_with("---\n"));
        assert!(content.contains("Summarize PDFs: use when asked"));
    }

    #[test]
    fn test_markers_are_unique() {
        let a = Sandbox::create("d").unwrap();
        let b = Sandbox::create("d").unwrap();
        assert_ne!(a.marker, b.marker);
    }

    #[test]
    fn test_directory_removed_on_drop() {
        let sandbox = Sandbox::create("d").unwrap();
        let path = sandbox.path().to_path_buf();
        assert!(path.exists());
        drop(sandbox);
        assert!(!path.exists());
    }
}
