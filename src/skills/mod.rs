//! Skills: SKILL.md files with YAML frontmatter that describe when an
//! agent capability should be loaded.

pub mod parser;
pub mod scaffold;

pub use parser::{parse_frontmatter, validate_skill, Skill, SkillFrontmatter};
pub use scaffold::create_skill;
