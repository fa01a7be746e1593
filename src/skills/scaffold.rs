//! Scaffolding for new skill directories.

use crate::config::Constraints;
use crate::skills::parser::validate_name;
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

const PLACEHOLDER_DESCRIPTION: &str =
    "Describe what this skill does and when to load it. Use when the request mentions ...";

/// Create `<parent>/<name>/SKILL.md` from the template. Returns the path of
/// the new SKILL.md.
pub fn create_skill(
    parent: &Path,
    name: &str,
    description: Option<&str>,
    constraints: &Constraints,
) -> Result<PathBuf> {
    validate_name(name, constraints)?;

    let dir = parent.join(name);
    if dir.exists() {
        return Err(anyhow!("skill directory {} already exists", dir.display()));
    }
    std::fs::create_dir_all(&dir)?;

    let description = description.unwrap_or(PLACEHOLDER_DESCRIPTION);
    let content = format!(
        "---\nname: {name}\ndescription: {description}\n---\n\n# {name}\n\n\
         Step-by-step instructions for the agent go here.\n"
    );
    let path = dir.join("SKILL.md");
    std::fs::write(&path, content)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::Skill;

    #[test]
    fn test_create_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let constraints = Constraints::default();
        let path = create_skill(dir.path(), "pdf-tools", Some("Work with PDFs"), &constraints)
            .unwrap();
        assert!(path.ends_with("pdf-tools/SKILL.md"));

        let skill = Skill::load(&path).unwrap();
        assert_eq!(skill.name, "pdf-tools");
        assert_eq!(skill.description, "Work with PDFs");
    }

    #[test]
    fn test_rejects_bad_name_and_existing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let constraints = Constraints::default();
        assert!(create_skill(dir.path(), "Bad Name", None, &constraints).is_err());

        create_skill(dir.path(), "dup", None, &constraints).unwrap();
        assert!(create_skill(dir.path(), "dup", None, &constraints).is_err());
    }
}
