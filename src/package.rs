//! Zip packaging of validated skill directories.

use crate::config::Constraints;
use crate::skills::{validate_skill, Skill};
use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Package a skill directory into `<name>.zip` next to it (or at `output`).
/// The skill is validated first; hidden files and directories are skipped so
/// editor droppings and tool state never ship.
pub fn package_skill(
    skill_dir: &Path,
    output: Option<&Path>,
    constraints: &Constraints,
) -> Result<PathBuf> {
    if !skill_dir.is_dir() {
        return Err(anyhow!("{} is not a skill directory", skill_dir.display()));
    }
    let skill = Skill::load(skill_dir)?;
    let problems = validate_skill(&skill, constraints);
    if !problems.is_empty() {
        return Err(anyhow!(
            "skill failed validation:\n  - {}",
            problems.join("\n  - ")
        ));
    }

    let dir_name = skill_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("cannot determine skill directory name"))?;
    let out = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| skill_dir.with_extension("zip"));

    let file = File::create(&out)
        .with_context(|| format!("failed to create archive {}", out.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let walker = WalkDir::new(skill_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e.path()));
    for entry in walker {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(skill_dir)
            .context("walked entry escaped the skill directory")?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let name = Path::new(&dir_name).join(rel).to_string_lossy().into_owned();
        if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
        } else {
            zip.start_file(name, options)?;
            zip.write_all(&std::fs::read(entry.path())?)?;
        }
    }
    zip.finish()?;
    Ok(out)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}
