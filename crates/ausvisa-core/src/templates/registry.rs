use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::QueryTemplate;
use super::defaults::DefaultQuery;
use super::parser::parse_sections;

/// Where the registry's templates came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    File(PathBuf),
    Defaults,
}

impl std::fmt::Display for TemplateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Defaults => f.write_str("built-in defaults"),
        }
    }
}

/// Load-once table of query type to template
///
/// Never empty: every constructor either yields at least one template or
/// falls back to the built-in set.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: HashMap<String, QueryTemplate>,
    source: TemplateSource,
}

impl TemplateRegistry {
    /// Registry holding only the built-in templates
    pub fn defaults() -> Self {
        let templates = DefaultQuery::ALL
            .into_iter()
            .map(|q| (q.as_str().to_string(), QueryTemplate::from(q)))
            .collect();
        Self {
            templates,
            source: TemplateSource::Defaults,
        }
    }

    /// Load templates from `path`, degrading to the defaults
    ///
    /// Invalid templates are dropped and reported with a single warning. A
    /// missing or unreadable file, or one with no valid sections, yields
    /// [`TemplateRegistry::defaults`].
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            debug!("No template file configured, using built-in templates");
            return Self::defaults();
        };

        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Template file unreadable, using built-in templates");
                return Self::defaults();
            }
        };

        let (templates, rejected) = collect(&source);
        if !rejected.is_empty() {
            warn!(
                path = %path.display(),
                rejected = %rejected.join("; "),
                "Dropped invalid query templates"
            );
        }

        if templates.is_empty() {
            warn!(path = %path.display(), "No valid templates found, using built-in templates");
            return Self::defaults();
        }

        info!(path = %path.display(), count = templates.len(), "Loaded query templates");
        Self {
            templates,
            source: TemplateSource::File(path.to_path_buf()),
        }
    }

    /// Load templates from `path`, failing on the first problem
    pub fn load_strict(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)?;
        let mut registry = Self::from_source(&source)?;
        registry.source = TemplateSource::File(path.to_path_buf());
        Ok(registry)
    }

    /// Parse templates from in-memory text, failing on the first problem
    pub fn from_source(source: &str) -> Result<Self> {
        let mut templates = HashMap::new();
        for section in parse_sections(source) {
            let Some(body) = section.body else {
                continue;
            };
            let template = QueryTemplate::new(section.name, body);
            template.validate()?;
            templates.insert(template.name.clone(), template);
        }

        if templates.is_empty() {
            return Err(Error::TemplateError(
                "template source contains no query sections".to_string(),
            ));
        }

        Ok(Self {
            templates,
            source: TemplateSource::Defaults,
        })
    }

    pub fn get(&self, name: &str) -> Option<&QueryTemplate> {
        self.templates.get(name)
    }

    /// Template for a built-in tag, if the loaded source defines it
    pub fn get_default(&self, query: DefaultQuery) -> Option<&QueryTemplate> {
        self.get(query.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Registered query types, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn source(&self) -> &TemplateSource {
        &self.source
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Valid templates plus a description of each rejected one
fn collect(source: &str) -> (HashMap<String, QueryTemplate>, Vec<String>) {
    let mut templates = HashMap::new();
    let mut rejected = Vec::new();

    for section in parse_sections(source) {
        let Some(body) = section.body else {
            continue;
        };
        let template = QueryTemplate::new(section.name, body);
        let unsupported = template.unsupported_parameters();
        if unsupported.is_empty() {
            templates.insert(template.name.clone(), template);
        } else {
            rejected.push(format!("{} (${})", template.name, unsupported.join(", $")));
        }
    }

    (templates, rejected)
}
