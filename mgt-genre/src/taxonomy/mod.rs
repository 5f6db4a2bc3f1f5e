//! Canonical genre taxonomy
//!
//! A forest of canonical genres: each genre has zero or one parent and a
//! set of aliases. The taxonomy is loaded and validated once at startup;
//! any structural problem is a `GenreError::Taxonomy`.
//!
//! Validation rules:
//! - genre names are unique (after alias-key normalization)
//! - an alias maps to exactly one genre and never to another genre's name
//! - every parent names an existing genre
//! - parent links are acyclic
//! - no genre is more than `MAX_DEPTH` parent steps from its root

use crate::config::TaxonomyConfig;
use crate::error::{GenreError, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Built-in taxonomy document
const DEFAULT_TAXONOMY: &str = include_str!("default_taxonomy.toml");

/// Maximum parent steps from any genre to its root
pub const MAX_DEPTH: usize = 4;

/// Separator characters treated as equivalent to a space
const SEPARATORS: [char; 5] = ['-', '&', '/', '_', ','];

/// One `[[genre]]` entry in a taxonomy document
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenreDefinition {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl GenreDefinition {
    pub fn new(name: &str, parent: Option<&str>, aliases: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            parent: parent.map(str::to_string),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaxonomyDocument {
    #[serde(default, rename = "genre")]
    genres: Vec<GenreDefinition>,
}

/// A validated canonical genre
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalGenre {
    pub name: String,
    pub parent: Option<String>,
    pub aliases: Vec<String>,
}

/// Normalize a genre string into its alias-matching key
///
/// Lowercases, treats `-`, `&`, `/`, `_`, `,` and the word "and" as
/// separators, strips other punctuation and collapses whitespace.
pub fn alias_key(raw: &str) -> String {
    let spaced: String = raw
        .chars()
        .filter_map(|c| {
            if SEPARATORS.contains(&c) || c.is_whitespace() {
                Some(' ')
            } else if c.is_alphanumeric() {
                Some(c)
            } else {
                None
            }
        })
        .collect::<String>()
        .to_lowercase();

    spaced
        .split_whitespace()
        .filter(|word| *word != "and")
        .collect::<Vec<_>>()
        .join(" ")
}

/// Validated genre forest with alias index
#[derive(Debug, Clone)]
pub struct Taxonomy {
    /// Canonical name → genre
    genres: BTreeMap<String, CanonicalGenre>,
    /// Alias key (including each genre's own name) → canonical name
    alias_index: BTreeMap<String, String>,
}

impl Taxonomy {
    /// Built-in taxonomy
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(DEFAULT_TAXONOMY)
    }

    /// Taxonomy selected by configuration
    pub fn load(config: &TaxonomyConfig) -> Result<Self> {
        let taxonomy = match &config.path {
            Some(path) => Self::from_path(path)?,
            None => Self::builtin()?,
        };
        info!(
            genres = taxonomy.len(),
            aliases = taxonomy.alias_index.len(),
            custom = config.path.is_some(),
            "Taxonomy loaded"
        );
        Ok(taxonomy)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GenreError::Taxonomy(format!("Failed to read taxonomy {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| GenreError::Taxonomy(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let document: TaxonomyDocument = toml::from_str(content)
            .map_err(|e| GenreError::Taxonomy(format!("Invalid taxonomy document: {}", e)))?;
        Self::from_definitions(document.genres)
    }

    /// Build and validate a taxonomy from definitions
    pub fn from_definitions(definitions: Vec<GenreDefinition>) -> Result<Self> {
        if definitions.is_empty() {
            return Err(GenreError::Taxonomy("Taxonomy defines no genres".to_string()));
        }

        let mut genres = BTreeMap::new();
        let mut alias_index: BTreeMap<String, String> = BTreeMap::new();

        // Names first, so alias collisions with any genre name are caught
        for def in &definitions {
            let name = def.name.trim();
            let key = alias_key(name);
            if key.is_empty() {
                return Err(GenreError::Taxonomy(format!(
                    "Genre name '{}' is empty after normalization",
                    def.name
                )));
            }
            if let Some(existing) = alias_index.insert(key, name.to_string()) {
                return Err(GenreError::Taxonomy(format!(
                    "Duplicate genre '{}' (collides with '{}')",
                    name, existing
                )));
            }
        }

        for def in definitions {
            let name = def.name.trim().to_string();
            for alias in &def.aliases {
                let key = alias_key(alias);
                if key.is_empty() {
                    return Err(GenreError::Taxonomy(format!(
                        "Alias '{}' of '{}' is empty after normalization",
                        alias, name
                    )));
                }
                match alias_index.get(&key) {
                    Some(owner) if *owner == name => {}
                    Some(owner) => {
                        return Err(GenreError::Taxonomy(format!(
                            "Alias '{}' of '{}' is already used by '{}'",
                            alias, name, owner
                        )));
                    }
                    None => {
                        alias_index.insert(key, name.clone());
                    }
                }
            }

            let parent = def
                .parent
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty());
            genres.insert(
                name.clone(),
                CanonicalGenre {
                    name,
                    parent,
                    aliases: def.aliases,
                },
            );
        }

        let taxonomy = Self {
            genres,
            alias_index,
        };
        taxonomy.validate_structure()?;
        debug!(genres = taxonomy.len(), "Taxonomy validated");
        Ok(taxonomy)
    }

    /// Unknown parents, cycles and depth
    fn validate_structure(&self) -> Result<()> {
        for genre in self.genres.values() {
            let mut visited = HashSet::new();
            visited.insert(genre.name.as_str());
            let mut current = genre;
            let mut depth = 0;

            while let Some(parent_name) = &current.parent {
                let parent = self.genres.get(parent_name).ok_or_else(|| {
                    GenreError::Taxonomy(format!(
                        "Genre '{}' has unknown parent '{}'",
                        current.name, parent_name
                    ))
                })?;
                if !visited.insert(parent.name.as_str()) {
                    return Err(GenreError::Taxonomy(format!(
                        "Parent cycle involving '{}'",
                        genre.name
                    )));
                }
                depth += 1;
                if depth > MAX_DEPTH {
                    return Err(GenreError::Taxonomy(format!(
                        "Genre '{}' is more than {} levels below its root",
                        genre.name, MAX_DEPTH
                    )));
                }
                current = parent;
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.genres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genres.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&CanonicalGenre> {
        self.genres.get(name)
    }

    /// Genres in name order
    pub fn genres(&self) -> impl Iterator<Item = &CanonicalGenre> {
        self.genres.values()
    }

    /// Exact lookup of an already-normalized alias key
    pub fn lookup_key(&self, key: &str) -> Option<&str> {
        self.alias_index.get(key).map(String::as_str)
    }

    /// (alias key, canonical name) pairs in key order
    pub fn alias_keys(&self) -> impl Iterator<Item = (&str, &str)> {
        self.alias_index
            .iter()
            .map(|(key, name)| (key.as_str(), name.as_str()))
    }

    /// Ancestor chain, nearest parent first
    pub fn ancestors(&self, name: &str) -> Vec<&CanonicalGenre> {
        let mut chain = Vec::new();
        let mut current = self.genres.get(name);
        while let Some(parent) = current
            .and_then(|g| g.parent.as_deref())
            .and_then(|p| self.genres.get(p))
        {
            chain.push(parent);
            current = Some(parent);
        }
        chain
    }

    /// Root of the tree containing `name`
    pub fn root_of<'a>(&'a self, name: &'a str) -> &'a str {
        self.ancestors(name)
            .last()
            .map(|g| g.name.as_str())
            .unwrap_or(name)
    }

    /// True when both genres sit in the same tree
    pub fn are_related(&self, a: &str, b: &str) -> bool {
        self.root_of(a) == self.root_of(b)
    }
}
