use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::engine::lexicon::{LexiconConfig, CATEGORY_CROP, CATEGORY_RISK, CATEGORY_TOPIC};
use crate::engine::validate::HeaderValidator;

/// Project configuration. Every field has a built-in default covering the
/// Bourgogne-Franche-Comté grandes-cultures campaign, so the tool runs without
/// a config file; `config.json` overrides per region/culture.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub fetch: FetchConfig,
    pub lexicon: LexiconConfig,
    pub validator: HeaderValidator,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub base_url: String,
    /// region name → culture type → campaign index path on the DRAAF site.
    pub regions: IndexMap<String, IndexMap<String, String>>,
    pub concurrency: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let mut regions = IndexMap::new();
        let mut cultures = IndexMap::new();
        cultures.insert(
            "grandes_cultures".to_string(),
            "/Bulletins-de-sante-du-vegetal-Grandes-cultures".to_string(),
        );
        regions.insert("bourgogne_franche_comte".to_string(), cultures);
        Self {
            base_url: "https://draaf.bourgogne-franche-comte.agriculture.gouv.fr".to_string(),
            regions,
            concurrency: 4,
            max_retries: 3,
            timeout_secs: 15,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            db_path: PathBuf::from("data/bsv.sqlite"),
            fetch: FetchConfig::default(),
            lexicon: default_lexicon(),
            validator: HeaderValidator::default(),
        }
    }
}

/// Header vocabulary observed in the 2022-2024 BFC grandes-cultures bulletins.
fn default_lexicon() -> LexiconConfig {
    let mut map = IndexMap::new();
    map.insert(
        CATEGORY_CROP.to_string(),
        ["Colza", "Tournesol", "Soja", "Betterave", "Orge", "Blé", "Maïs", "Pois"]
            .map(String::from)
            .to_vec(),
    );
    map.insert(
        CATEGORY_TOPIC.to_string(),
        [
            "Stades", "Pièges", "Limaces", "Altise", "Pucerons", "Charançon", "Méligèthes",
            "Sclérotinia", "Phoma", "Adventices", "Oiseaux",
        ]
        .map(String::from)
        .to_vec(),
    );
    map.insert(
        CATEGORY_RISK.to_string(),
        ["Analyse du risque", "Niveau de risque"].map(String::from).to_vec(),
    );
    LexiconConfig(map)
}

impl Config {
    /// Load from an explicit path, or from `config.json` when present,
    /// falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from("config.json");
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn structured_dir(&self) -> PathBuf {
        self.data_dir.join("structured")
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_cover_the_bfc_campaign() {
        let cfg = Config::default();
        assert!(cfg.fetch.regions.contains_key("bourgogne_franche_comte"));
        assert_eq!(cfg.validator.max_prose_words, 15);
        assert!(cfg.lexicon.0[CATEGORY_CROP].contains(&"Colza".to_string()));
        assert_eq!(cfg.lexicon.0.len(), 3);
    }

    #[test]
    fn partial_config_file_overrides_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"validator": {{"max_prose_words": 20}}, "lexicon": {{"CROP": ["Vigne"]}}}}"#
        )
        .unwrap();
        let cfg = Config::load(Some(f.path())).unwrap();
        assert_eq!(cfg.validator.max_prose_words, 20);
        assert_eq!(cfg.lexicon.0["CROP"], vec!["Vigne".to_string()]);
        // Untouched sections keep their defaults.
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(Config::load(Some(Path::new("/nonexistent/config.json"))).is_err());
    }
}
