use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use directories::{BaseDirs, ProjectDirs};
use matchscan_classifier::{DEFAULT_CONFIDENCE_FLOOR, DEFAULT_LABELS};
use serde::Deserialize;

use crate::cli::{CliArgs, CliSources};
use crate::pipeline::ScanConfig;
use crate::stage::refine::RefineSettings;

pub const PROJECT_CONFIG_FILE: &str = "matchscan.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    backend: Option<String>,
    video_dir: Option<String>,
    output_dir: Option<String>,
    detections: Option<String>,
    step_size: Option<u64>,
    min_match_duration: Option<u64>,
    noise_policy: Option<String>,
    bbox_policy: Option<String>,
    labels: Option<Vec<String>>,
    confidence_floor: Option<f32>,
    save_frames: Option<bool>,
    refine: Option<RefineFileConfig>,
    json: Option<JsonFileConfig>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
struct RefineFileConfig {
    strategy: Option<String>,
    votes: Option<u32>,
    max_probes: Option<u32>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
struct JsonFileConfig {
    enable: Option<bool>,
    dir: Option<String>,
    pretty: Option<bool>,
}

#[derive(Debug)]
pub struct EffectiveSettings {
    pub backend: Option<String>,
    pub video_name: Option<String>,
    pub video_dir: PathBuf,
    pub output_dir: PathBuf,
    pub detections: Option<PathBuf>,
    pub labels: Vec<String>,
    pub confidence_floor: f32,
    pub scan: ScanConfig,
    pub save_frames: bool,
    pub display: bool,
    pub json: Option<JsonSettings>,
    pub config_path: Option<PathBuf>,
}

impl EffectiveSettings {
    pub fn video_path(&self) -> Option<PathBuf> {
        self.video_name
            .as_ref()
            .map(|name| self.video_dir.join(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonSettings {
    pub dir: PathBuf,
    pub pretty: bool,
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    InvalidValue {
        path: Option<PathBuf>,
        field: &'static str,
        value: String,
    },
    NotFound {
        path: PathBuf,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config file {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config file {}: {}", path.display(), source)
            }
            ConfigError::InvalidValue { path, field, value } => {
                if let Some(path) = path {
                    write!(
                        f,
                        "invalid value '{}' for '{}' in {}",
                        value,
                        field,
                        path.display()
                    )
                } else {
                    write!(f, "invalid value '{}' for '{}'", value, field)
                }
            }
            ConfigError::NotFound { path } => {
                write!(f, "config file {} does not exist", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::InvalidValue { .. } => None,
            ConfigError::NotFound { .. } => None,
        }
    }
}

pub fn resolve_settings(
    cli: &CliArgs,
    sources: &CliSources,
) -> Result<EffectiveSettings, ConfigError> {
    let (file, config_path) = load_config(cli.config.as_deref())?;
    merge(cli, sources, file, config_path)
}

fn load_config(path_override: Option<&Path>) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    if let Some(path) = path_override {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        return read_config(path).map(|config| (config, Some(path.to_path_buf())));
    }

    let candidates = [project_config_path(), default_config_path()];
    for path in candidates.into_iter().flatten() {
        if path.exists() {
            let config = read_config(&path)?;
            return Ok((config, Some(path)));
        }
    }
    Ok((FileConfig::default(), None))
}

fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn merge(
    cli: &CliArgs,
    sources: &CliSources,
    file: FileConfig,
    config_path: Option<PathBuf>,
) -> Result<EffectiveSettings, ConfigError> {
    let config_dir = config_path
        .as_ref()
        .and_then(|path| path.parent().map(Path::to_path_buf));

    let FileConfig {
        backend: file_backend,
        video_dir: file_video_dir,
        output_dir: file_output_dir,
        detections: file_detections,
        step_size: file_step_size,
        min_match_duration: file_min_match_duration,
        noise_policy: file_noise_policy,
        bbox_policy: file_bbox_policy,
        labels: file_labels,
        confidence_floor: file_confidence_floor,
        save_frames: file_save_frames,
        refine: file_refine,
        json: file_json,
    } = file;
    let file_refine = file_refine.unwrap_or_default();

    let backend = normalize_string(cli.backend.clone()).or_else(|| normalize_string(file_backend));

    let mut step_size = cli.step_size;
    if !sources.step_size_from_cli {
        if let Some(value) = file_step_size {
            if value == 0 {
                return Err(invalid(&config_path, "step_size", value));
            }
            step_size = value;
        }
    }

    let mut min_match_duration = cli.min_match_duration;
    if !sources.min_match_duration_from_cli {
        if let Some(value) = file_min_match_duration {
            min_match_duration = value;
        }
    }

    let mut noise_policy = cli.noise_policy;
    if !sources.noise_policy_from_cli {
        if let Some(value) = normalize_string(file_noise_policy) {
            noise_policy = parse_field(&value, "noise_policy", &config_path)?;
        }
    }

    let mut bbox_policy = cli.bbox_policy;
    if !sources.bbox_policy_from_cli {
        if let Some(value) = normalize_string(file_bbox_policy) {
            bbox_policy = parse_field(&value, "bbox_policy", &config_path)?;
        }
    }

    let mut strategy = cli.refine_strategy;
    if !sources.refine_strategy_from_cli {
        if let Some(value) = normalize_string(file_refine.strategy) {
            strategy = parse_field(&value, "refine.strategy", &config_path)?;
        }
    }

    let mut votes = cli.votes;
    if !sources.votes_from_cli {
        if let Some(value) = file_refine.votes {
            if value == 0 {
                return Err(invalid(&config_path, "refine.votes", value));
            }
            votes = value;
        }
    }

    let max_probes = match (cli.max_probes, file_refine.max_probes) {
        (Some(value), _) => Some(value),
        (None, Some(0)) => return Err(invalid(&config_path, "refine.max_probes", 0)),
        (None, file_value) => file_value,
    };

    let video_dir = if sources.video_dir_from_cli {
        expand_pathbuf(cli.video_dir.clone())
    } else {
        normalize_string(file_video_dir)
            .and_then(|dir| resolve_path_from_config(dir, config_dir.as_deref()))
            .unwrap_or_else(|| cli.video_dir.clone())
    };

    let output_dir = if sources.output_dir_from_cli {
        expand_pathbuf(cli.output_dir.clone())
    } else {
        normalize_string(file_output_dir)
            .and_then(|dir| resolve_path_from_config(dir, config_dir.as_deref()))
            .unwrap_or_else(|| cli.output_dir.clone())
    };

    let detections = match cli.detections.clone() {
        Some(path) => Some(expand_pathbuf(path)),
        None => normalize_string(file_detections)
            .and_then(|path| resolve_path_from_config(path, config_dir.as_deref())),
    };

    let labels = if !cli.labels.is_empty() {
        cli.labels.clone()
    } else if let Some(labels) = file_labels.filter(|labels| !labels.is_empty()) {
        labels
    } else {
        DEFAULT_LABELS.iter().map(|name| name.to_string()).collect()
    };

    let confidence_floor = match file_confidence_floor {
        Some(value) if !(0.0..=1.0).contains(&value) => {
            return Err(invalid(&config_path, "confidence_floor", value));
        }
        Some(value) => value,
        None => DEFAULT_CONFIDENCE_FLOOR,
    };

    let json_section = file_json.unwrap_or_default();
    let json_enabled = cli.json || json_section.enable.unwrap_or(false);
    let json = json_enabled.then(|| JsonSettings {
        dir: normalize_string(json_section.dir.clone())
            .and_then(|dir| resolve_path_from_config(dir, config_dir.as_deref()))
            .unwrap_or_else(|| output_dir.clone()),
        pretty: json_section.pretty.unwrap_or(true),
    });

    Ok(EffectiveSettings {
        backend,
        video_name: normalize_string(cli.video_name.clone()),
        video_dir,
        output_dir,
        detections,
        labels,
        confidence_floor,
        scan: ScanConfig {
            step_size,
            min_match_duration,
            noise_policy,
            box_policy: bbox_policy,
            refine: RefineSettings {
                strategy,
                votes,
                max_probes,
            },
        },
        save_frames: cli.save_flag || file_save_frames.unwrap_or(false),
        display: !cli.hide_flag,
        json,
        config_path,
    })
}

fn invalid(path: &Option<PathBuf>, field: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        path: path.clone(),
        field,
        value: value.to_string(),
    }
}

fn parse_field<T: FromStr>(
    value: &str,
    field: &'static str,
    path: &Option<PathBuf>,
) -> Result<T, ConfigError> {
    T::from_str(value).map_err(|_| invalid(path, field, value))
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("rs", "matchscan", "matchscan")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn project_config_path() -> Option<PathBuf> {
    env::current_dir()
        .ok()
        .map(|dir| dir.join(PROJECT_CONFIG_FILE))
}

fn normalize_string(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn expand_pathbuf(path: PathBuf) -> PathBuf {
    match path.to_str() {
        Some(s) => expand_home_path(s),
        None => path,
    }
}

fn resolve_path_from_config(value: String, base: Option<&Path>) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = expand_home_path(trimmed);
    match base {
        Some(base) if !expanded.is_absolute() => Some(base.join(expanded)),
        _ => Some(expanded),
    }
}

fn expand_home_path(value: &str) -> PathBuf {
    if value == "~" {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().to_path_buf();
        }
    } else if let Some(stripped) = value.strip_prefix("~/") {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().join(stripped);
        }
    }
    PathBuf::from(value)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::cli::parse_cli_from;
    use crate::stage::bbox::BoxPolicy;
    use crate::stage::noise::NoisePolicy;
    use crate::stage::refine::RefineStrategy;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matchscan.toml");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    fn resolve(args: &[&str]) -> Result<EffectiveSettings, ConfigError> {
        let (cli, sources) = parse_cli_from(args.iter().copied()).unwrap();
        resolve_settings(&cli, &sources)
    }

    #[test]
    fn file_values_replace_defaults() {
        let (dir, path) = write_config(
            r#"
step_size = 30
noise_policy = "merge"
bbox_policy = "highest-confidence"
video_dir = "clips"
labels = ["battlefield", "yoshis"]

[refine]
strategy = "linear"
votes = 5

[json]
enable = true
"#,
        );
        let config = path.to_string_lossy().into_owned();
        let settings = resolve(&["matchscan", "game.mp4", "--config", &config]).unwrap();
        assert_eq!(settings.scan.step_size, 30);
        assert_eq!(settings.scan.noise_policy, NoisePolicy::Merge);
        assert_eq!(settings.scan.box_policy, BoxPolicy::HighestConfidence);
        assert_eq!(settings.scan.refine.strategy, RefineStrategy::Linear);
        assert_eq!(settings.scan.refine.votes, 5);
        assert_eq!(settings.video_dir, dir.path().join("clips"));
        assert_eq!(settings.video_path(), Some(dir.path().join("clips/game.mp4")));
        assert_eq!(settings.labels, vec!["battlefield", "yoshis"]);
        let json = settings.json.unwrap();
        assert_eq!(json.dir, PathBuf::from("output"));
        assert!(json.pretty);
    }

    #[test]
    fn explicit_cli_values_win_over_file() {
        let (_dir, path) = write_config("step_size = 30\nnoise_policy = \"merge\"\n");
        let config = path.to_string_lossy().into_owned();
        let settings = resolve(&[
            "matchscan",
            "game.mp4",
            "--config",
            &config,
            "--step_size",
            "90",
            "--noise-policy",
            "drop",
        ])
        .unwrap();
        assert_eq!(settings.scan.step_size, 90);
        assert_eq!(settings.scan.noise_policy, NoisePolicy::Drop);
    }

    #[test]
    fn invalid_file_values_are_reported() {
        let (_dir, path) = write_config("noise_policy = \"blur\"\n");
        let config = path.to_string_lossy().into_owned();
        match resolve(&["matchscan", "game.mp4", "--config", &config]) {
            Err(ConfigError::InvalidValue { field, value, .. }) => {
                assert_eq!(field, "noise_policy");
                assert_eq!(value, "blur");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let (_dir, path) = write_config("[refine]\nvotes = 0\n");
        let config = path.to_string_lossy().into_owned();
        assert!(matches!(
            resolve(&["matchscan", "game.mp4", "--config", &config]),
            Err(ConfigError::InvalidValue { field: "refine.votes", .. })
        ));
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let result = resolve(&["matchscan", "game.mp4", "--config", "/nonexistent/matchscan.toml"]);
        assert!(matches!(result, Err(ConfigError::NotFound { .. })));
    }

    #[test]
    fn unknown_keys_fail_to_parse() {
        let (_dir, path) = write_config("stepsize = 30\n");
        let config = path.to_string_lossy().into_owned();
        assert!(matches!(
            resolve(&["matchscan", "game.mp4", "--config", &config]),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn hide_flag_disables_display() {
        let (_dir, path) = write_config("");
        let config = path.to_string_lossy().into_owned();
        let settings = resolve(&["matchscan", "game.mp4", "--config", &config, "-H"]).unwrap();
        assert!(!settings.display);
        assert!(!settings.save_frames);
        assert!(settings.json.is_none());
        assert_eq!(settings.labels.len(), DEFAULT_LABELS.len());
    }
}
