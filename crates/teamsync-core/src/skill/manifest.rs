//! Skill manifest parsing and publish metadata.
//!
//! A skill directory must contain `SKILL.md`. Its YAML-style front-matter
//! (`---` fenced `key: value` lines) supplies name, description and version.
//! An optional `plugin.json` takes precedence when present.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TeamError, TeamResult};

/// Manifest file every skill directory must contain.
pub const SKILL_MANIFEST: &str = "SKILL.md";
/// Optional richer metadata file.
pub const PLUGIN_JSON: &str = "plugin.json";
/// Version assumed when a manifest does not declare one.
pub const DEFAULT_VERSION: &str = "1.0.0";
/// Front-matter is only searched for in the first lines of SKILL.md.
const FRONT_MATTER_MAX_LINES: usize = 50;

/// Accepted values for [`SkillMetadata::category`].
pub const VALID_CATEGORIES: &[&str] = &["productivity", "creative", "design", "tools", "other"];

/// Metadata extracted from a skill directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestInfo {
    pub name: String,
    pub description: String,
    pub version: String,
    pub author: String,
    pub category: String,
    /// "plugin" when read from plugin.json, otherwise "skill"
    pub source_type: String,
}

/// Parse `key: value` pairs from a front-matter block.
///
/// Quotes around values are stripped. Lines without a colon are ignored.
pub fn parse_front_matter(content: &str) -> HashMap<String, String> {
    let mut result = HashMap::new();
    let mut inside = false;

    for line in content.lines().take(FRONT_MATTER_MAX_LINES) {
        if line.trim() == "---" {
            if inside {
                break;
            }
            inside = true;
            continue;
        }
        if !inside {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            result.insert(key.trim().to_string(), value.to_string());
        }
    }

    result
}

#[derive(Debug, Default, Deserialize)]
struct PluginJson {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    category: String,
}

/// Read manifest metadata from `dir`, applying the fallbacks.
///
/// # Errors
///
/// Returns `TeamError::SkillManifestMissing` when SKILL.md is absent.
pub fn read_manifest(dir: &Path) -> TeamResult<ManifestInfo> {
    let skill_md = dir.join(SKILL_MANIFEST);
    if !skill_md.is_file() {
        return Err(TeamError::SkillManifestMissing(dir.display().to_string()));
    }

    let plugin = std::fs::read(dir.join(PLUGIN_JSON))
        .ok()
        .and_then(|data| serde_json::from_slice::<PluginJson>(&data).ok());

    let mut info = match plugin {
        Some(p) => ManifestInfo {
            name: p.name,
            description: p.description,
            version: p.version,
            author: p.author,
            category: p.category,
            source_type: "plugin".to_string(),
        },
        None => {
            let content = std::fs::read_to_string(&skill_md)?;
            let mut fm = parse_front_matter(&content);
            ManifestInfo {
                name: fm.remove("name").unwrap_or_default(),
                description: fm.remove("description").unwrap_or_default(),
                version: fm.remove("version").unwrap_or_default(),
                author: fm.remove("author").unwrap_or_default(),
                category: fm.remove("category").unwrap_or_default(),
                source_type: "skill".to_string(),
            }
        }
    };

    if info.name.is_empty() {
        info.name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    if info.version.is_empty() {
        info.version = DEFAULT_VERSION.to_string();
    }

    Ok(info)
}

/// User-supplied metadata when publishing a skill
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillMetadata {
    pub plugin_id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub category: String,
    pub author: String,
}

impl SkillMetadata {
    /// All fields are required and the category must be known.
    pub fn validate(&self) -> TeamResult<()> {
        let required = [
            ("plugin_id", &self.plugin_id),
            ("name", &self.name),
            ("description", &self.description),
            ("version", &self.version),
            ("category", &self.category),
            ("author", &self.author),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(TeamError::InvalidMetadata(format!("{} is required", field)));
            }
        }
        if !VALID_CATEGORIES.contains(&self.category.as_str()) {
            return Err(TeamError::InvalidMetadata(format!(
                "invalid category: {}",
                self.category
            )));
        }
        validate_plugin_id(&self.plugin_id)
    }
}

/// Plugin ids become directory names, so they must be a single safe segment.
pub fn validate_plugin_id(plugin_id: &str) -> TeamResult<()> {
    let ok = !plugin_id.is_empty()
        && plugin_id != "."
        && plugin_id != ".."
        && plugin_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(TeamError::validation(format!("invalid plugin id: {:?}", plugin_id)))
    }
}

/// Derive a plugin id from a display name ("My Skill" -> "my-skill").
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_front_matter() {
        let content = "---\nname: \"Formatter\"\ndescription: formats code\nversion: '2.1.0'\n---\n# Body\nname: ignored\n";
        let fm = parse_front_matter(content);
        assert_eq!(fm["name"], "Formatter");
        assert_eq!(fm["description"], "formats code");
        assert_eq!(fm["version"], "2.1.0");
        assert_eq!(fm.len(), 3);
    }

    #[test]
    fn test_front_matter_absent() {
        assert!(parse_front_matter("# Just markdown\nkey: value").is_empty());
    }

    #[test]
    fn test_read_manifest_fallbacks() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("lint-helper");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join(SKILL_MANIFEST), "# no front matter").unwrap();

        let info = read_manifest(&dir).unwrap();
        assert_eq!(info.name, "lint-helper");
        assert_eq!(info.version, DEFAULT_VERSION);
        assert_eq!(info.source_type, "skill");
    }

    #[test]
    fn test_plugin_json_wins() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(SKILL_MANIFEST), "---\nname: md\n---").unwrap();
        std::fs::write(
            temp.path().join(PLUGIN_JSON),
            r#"{"name":"json","version":"3.0.0","category":"tools"}"#,
        )
        .unwrap();

        let info = read_manifest(temp.path()).unwrap();
        assert_eq!(info.name, "json");
        assert_eq!(info.version, "3.0.0");
        assert_eq!(info.category, "tools");
        assert_eq!(info.source_type, "plugin");
    }

    #[test]
    fn test_missing_manifest() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            read_manifest(temp.path()),
            Err(TeamError::SkillManifestMissing(_))
        ));
    }

    #[test]
    fn test_metadata_validation() {
        let mut meta = SkillMetadata {
            plugin_id: "fmt".into(),
            name: "Formatter".into(),
            description: "Formats".into(),
            version: "1.0.0".into(),
            category: "tools".into(),
            author: "Ada".into(),
        };
        assert!(meta.validate().is_ok());

        meta.category = "games".into();
        assert!(matches!(meta.validate(), Err(TeamError::InvalidMetadata(_))));

        meta.category = "tools".into();
        meta.author.clear();
        assert!(matches!(meta.validate(), Err(TeamError::InvalidMetadata(_))));
    }

    #[test]
    fn test_plugin_id_rules() {
        assert!(validate_plugin_id("my-skill_1.0").is_ok());
        assert!(validate_plugin_id("..").is_err());
        assert!(validate_plugin_id("a/b").is_err());
        assert!(validate_plugin_id("").is_err());
        assert_eq!(slugify("My Great  Skill!"), "my-great-skill");
    }
}
