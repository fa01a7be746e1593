//! SKILL.md loading: frontmatter metadata, body, and in-place rewrites.

use crate::config::Constraints;
use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Parsed SKILL.md frontmatter
#[derive(Debug, Clone, Deserialize)]
pub struct SkillFrontmatter {
    #[serde(default)]
    pub name: Option<String>,
    pub description: String,
}

/// A skill loaded from disk
#[derive(Debug, Clone)]
pub struct Skill {
    /// Path of the SKILL.md file itself
    pub path: PathBuf,
    pub name: String,
    pub description: String,
    pub body: String,
}

static NAME_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^name:[ \t]*(.+?)[ \t]*$").expect("valid regex"));
static DESCRIPTION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^description:[ \t]*(.+?)[ \t]*$").expect("valid regex"));

/// Split a SKILL.md into (frontmatter yaml, body).
fn split_frontmatter(content: &str) -> Result<(&str, &str)> {
    if !content.starts_with("---") {
        return Err(anyhow!("skill file must start with YAML frontmatter (---)"));
    }
    let rest = &content[3..];
    let end = rest
        .find("\n---")
        .ok_or_else(|| anyhow!("missing closing --- for frontmatter"))?;
    let yaml = &rest[..end];
    // skip "\n---" plus the rest of that marker line
    let after = &rest[end + 4..];
    let body = after.strip_prefix('\n').unwrap_or(after);
    Ok((yaml, body))
}

/// Parse frontmatter, tolerating slightly malformed YAML.
///
/// The YAML parser is authoritative; if it rejects the block (authors paste
/// unquoted colons and brackets into descriptions all the time), a
/// line-oriented fallback recovers `name:` and `description:`.
pub fn parse_frontmatter(content: &str) -> Result<SkillFrontmatter> {
    let (yaml, _) = split_frontmatter(content)?;

    match serde_yaml::from_str::<SkillFrontmatter>(yaml) {
        Ok(fm) if !fm.description.trim().is_empty() => Ok(fm),
        Ok(_) => Err(anyhow!("frontmatter has an empty description")),
        Err(yaml_err) => {
            let name = NAME_LINE
                .captures(yaml)
                .map(|c| unquote(&c[1]).to_string());
            let description = DESCRIPTION_LINE
                .captures(yaml)
                .map(|c| unquote(&c[1]).to_string());
            match description {
                Some(description) if !description.trim().is_empty() => {
                    Ok(SkillFrontmatter { name, description })
                }
                _ => Err(anyhow!("invalid frontmatter: {}", yaml_err)),
            }
        }
    }
}

/// Strip one layer of wrapping quotes from a scalar value.
fn unquote(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        if (bytes[0] == b'"' && bytes[s.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[s.len() - 1] == b'\'')
        {
            return &s[1..s.len() - 1];
        }
    }
    s
}

impl Skill {
    /// Load a skill from a directory (implies SKILL.md inside it) or from a
    /// direct file path. The name falls back to the containing directory.
    pub fn load(path: &Path) -> Result<Self> {
        let file = if path.is_dir() {
            path.join("SKILL.md")
        } else {
            path.to_path_buf()
        };
        let content = std::fs::read_to_string(&file)
            .with_context(|| format!("failed to read skill file {}", file.display()))?;
        let frontmatter = parse_frontmatter(&content)
            .with_context(|| format!("failed to parse {}", file.display()))?;
        let (_, body) = split_frontmatter(&content)?;

        let name = frontmatter.name.unwrap_or_else(|| {
            file.parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "skill".to_string())
        });

        Ok(Skill {
            path: file,
            name,
            description: frontmatter.description,
            body: body.trim().to_string(),
        })
    }

    /// Replace the current description with `new_description` in the source
    /// file via exact-substring replacement. Returns false when the current
    /// description is no longer present in the file (the caller warns; the
    /// in-memory description advances either way).
    pub fn replace_description(&mut self, new_description: &str) -> Result<bool> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let rewritten = if content.contains(&self.description) {
            Some(content.replacen(&self.description, new_description, 1))
        } else {
            None
        };
        let found = rewritten.is_some();
        if let Some(updated) = rewritten {
            std::fs::write(&self.path, updated)
                .with_context(|| format!("failed to write {}", self.path.display()))?;
        }
        self.description = new_description.to_string();
        Ok(found)
    }
}

/// Check a name against the frontmatter naming rules.
pub fn validate_name(name: &str, constraints: &Constraints) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow!("skill name is empty"));
    }
    if name.len() > constraints.max_name_len {
        return Err(anyhow!(
            "skill name exceeds {} chars",
            constraints.max_name_len
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(anyhow!(
            "skill name must be lowercase letters, numbers, hyphens only"
        ));
    }
    Ok(())
}

/// Static validation; returns a list of problems (empty means valid).
pub fn validate_skill(skill: &Skill, constraints: &Constraints) -> Vec<String> {
    let mut problems = Vec::new();
    if let Err(e) = validate_name(&skill.name, constraints) {
        problems.push(e.to_string());
    }
    if skill.description.trim().is_empty() {
        problems.push("description is empty".to_string());
    }
    if skill.description.len() > constraints.max_description_len {
        problems.push(format!(
            "description exceeds {} chars ({})",
            constraints.max_description_len,
            skill.description.len()
        ));
    }
    if skill.body.is_empty() {
        problems.push("skill body is empty".to_string());
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frontmatter() {
        let content = r#"---
name: pdf-summarizer
description: Summarize PDF documents on request
---

Read the PDF and produce a summary.
"#;
        let fm = parse_frontmatter(content).unwrap();
        assert_eq!(fm.name.as_deref(), Some("pdf-summarizer"));
        assert_eq!(fm.description, "Summarize PDF documents on request");
    }

    #[test]
    fn test_parse_frontmatter_fallback_on_bad_yaml() {
        // the unclosed flow sequence makes the whole block invalid YAML;
        // the line fallback still recovers both fields
        let content = "---\nname: broken-skill\ndescription: \"recovers from bad yaml\"\ntags: [unclosed\n---\nbody\n";
        let fm = parse_frontmatter(content).unwrap();
        assert_eq!(fm.name.as_deref(), Some("broken-skill"));
        assert_eq!(fm.description, "recovers from bad yaml");
    }

    #[test]
    fn test_parse_frontmatter_rejects_empty_description() {
        let content = "---\nname: a-skill\ndescription: \"\"\n---\nbody\n";
        assert!(parse_frontmatter(content).is_err());
    }

    #[test]
    fn test_missing_frontmatter() {
        assert!(parse_frontmatter("no frontmatter here").is_err());
        assert!(parse_frontmatter("---\nname: x\ndescription: y").is_err());
    }

    #[test]
    fn test_load_from_dir_and_name_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let skill_dir = dir.path().join("my-skill");
        std::fs::create_dir(&skill_dir).unwrap();
        std::fs::write(
            skill_dir.join("SKILL.md"),
            "---\ndescription: Do the thing\n---\n\nInstructions.\n",
        )
        .unwrap();

        let skill = Skill::load(&skill_dir).unwrap();
        assert_eq!(skill.name, "my-skill");
        assert_eq!(skill.description, "Do the thing");
        assert_eq!(skill.body, "Instructions.");
    }

    #[test]
    fn test_replace_description_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("SKILL.md");
        std::fs::write(&file, "---\nname: x-skill\ndescription: old text\n---\nbody\n").unwrap();

        let mut skill = Skill::load(&file).unwrap();
        let found = skill.replace_description("new text").unwrap();
        assert!(found);
        assert_eq!(skill.description, "new text");
        let content = std::fs::read_to_string(&file).unwrap();
        assert!(content.contains("description: new text"));
    }

    #[test]
    fn test_replace_description_missing_substring_is_nonfatal() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("SKILL.md");
        std::fs::write(&file, "---\nname: x-skill\ndescription: old text\n---\nbody\n").unwrap();

        let mut skill = Skill::load(&file).unwrap();
        // simulate a concurrent edit that removed the description
        std::fs::write(&file, "---\nname: x-skill\ndescription: edited\n---\nbody\n").unwrap();

        let found = skill.replace_description("new text").unwrap();
        assert!(!found);
        // memory advances, file untouched
        assert_eq!(skill.description, "new text");
        let content = std::fs::read_to_string(&file).unwrap();
        assert!(content.contains("description: edited"));
    }

    #[test]
    fn test_validate_skill() {
        let constraints = Constraints::default();
        let skill = Skill {
            path: PathBuf::from("SKILL.md"),
            name: "Bad_Name".to_string(),
            description: "x".repeat(2000),
            body: String::new(),
        };
        let problems = validate_skill(&skill, &constraints);
        assert_eq!(problems.len(), 3);

        let ok = Skill {
            path: PathBuf::from("SKILL.md"),
            name: "good-name".to_string(),
            description: "A fine description".to_string(),
            body: "Instructions.".to_string(),
        };
        assert!(validate_skill(&ok, &constraints).is_empty());
    }
}
