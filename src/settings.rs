use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::render::RenderPolicy;
use crate::window::WindowPolicy;
use crate::zoom::ZoomPolicy;

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "folio";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// Every tunable of the viewer engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    pub version: u32,

    /// Zoom a freshly opened document starts at
    pub default_zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub zoom_step: f64,
    pub fit_padding: f64,
    pub fit_tolerance: f64,

    /// Above this zoom the small window radius applies
    pub window_zoom_threshold: f64,
    pub large_window_radius: usize,
    pub small_window_radius: usize,
    pub min_window_size_delta: usize,
    pub min_window_overlap: f64,
    pub window_debounce_ms: u64,

    pub max_render_attempts: u32,
    pub retry_backoff_ms: u64,
    pub render_timeout_ms: u64,
    pub eviction_margin: usize,
    pub render_workers: usize,
    /// Capacity of the document-level cache shared by workers (0 disables it)
    pub shared_cache_pages: usize,

    /// Vertical gap between pages, in pixels
    pub page_gap: f64,
    /// Space left above an annotation scrolled into view
    pub scroll_margin: f64,
    pub min_draft_extent: f64,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        let window = WindowPolicy::default();
        let render = RenderPolicy::default();
        let zoom = ZoomPolicy::default();
        Self {
            version: CURRENT_VERSION,
            default_zoom: 1.0,
            min_zoom: zoom.min_zoom,
            max_zoom: zoom.max_zoom,
            zoom_step: zoom.step_rate,
            fit_padding: zoom.fit_padding,
            fit_tolerance: zoom.fit_tolerance,
            window_zoom_threshold: window.zoom_threshold,
            large_window_radius: window.large_radius,
            small_window_radius: window.small_radius,
            min_window_size_delta: window.min_size_delta,
            min_window_overlap: window.min_overlap_ratio,
            window_debounce_ms: window.debounce.as_millis() as u64,
            max_render_attempts: render.max_attempts,
            retry_backoff_ms: render.backoff_base.as_millis() as u64,
            render_timeout_ms: render.timeout.as_millis() as u64,
            eviction_margin: render.eviction_margin,
            render_workers: 2,
            shared_cache_pages: 32,
            page_gap: 8.0,
            scroll_margin: 16.0,
            min_draft_extent: crate::draft::MIN_DRAFT_EXTENT,
        }
    }
}

impl ViewerSettings {
    #[must_use]
    pub fn window_policy(&self) -> WindowPolicy {
        WindowPolicy {
            zoom_threshold: self.window_zoom_threshold,
            large_radius: self.large_window_radius,
            small_radius: self.small_window_radius,
            min_size_delta: self.min_window_size_delta,
            min_overlap_ratio: self.min_window_overlap,
            debounce: Duration::from_millis(self.window_debounce_ms),
        }
    }

    #[must_use]
    pub fn render_policy(&self) -> RenderPolicy {
        RenderPolicy {
            max_attempts: self.max_render_attempts.max(1),
            backoff_base: Duration::from_millis(self.retry_backoff_ms),
            timeout: Duration::from_millis(self.render_timeout_ms),
            eviction_margin: self.eviction_margin,
        }
    }

    #[must_use]
    pub fn zoom_policy(&self) -> ZoomPolicy {
        ZoomPolicy {
            min_zoom: self.min_zoom,
            max_zoom: self.max_zoom.max(self.min_zoom),
            step_rate: self.zoom_step,
            fit_padding: self.fit_padding,
            fit_tolerance: self.fit_tolerance,
        }
    }

    /// Load settings from `path`, migrating older versions in place
    pub fn load_from_path(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings: Self =
            serde_yaml::from_str(&content).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Loaded settings from {path:?}");

        if settings.version < CURRENT_VERSION {
            migrate_settings(&mut settings);
            settings.save_to_path(path)?;
        }
        Ok(settings)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|source| SettingsError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let mut content = String::from(SETTINGS_HEADER);
        content.push_str(&serde_yaml::to_string(self)?);
        fs::write(path, content).map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Saved settings to {path:?}");
        Ok(())
    }

    /// Settings from `path` (or the default location), falling back to
    /// defaults on any error. A missing file is created with defaults.
    #[must_use]
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) => path,
                None => {
                    warn!("Could not determine config directory, using default settings");
                    return Self::default();
                }
            },
        };

        if !path.exists() {
            info!("Settings file not found, creating with defaults at {path:?}");
            let settings = Self::default();
            if let Err(e) = settings.save_to_path(&path) {
                error!("{e}");
            }
            return settings;
        }

        match Self::load_from_path(&path) {
            Ok(settings) => settings,
            Err(e) => {
                error!("{e}");
                Self::default()
            }
        }
    }
}

#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

fn migrate_settings(settings: &mut ViewerSettings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );
    // Version 0 files predate the shared cache; keep it off for them.
    if settings.version < 1 {
        settings.shared_cache_pages = 0;
    }
    settings.version = CURRENT_VERSION;
}

const SETTINGS_HEADER: &str = r"# ============================================================================
# folio viewer settings
# ============================================================================
# Durations are in milliseconds, sizes in pixels at zoom 1.0.
# Delete a line to fall back to its default.
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_policies() {
        let settings = ViewerSettings::default();

        assert_eq!(settings.window_policy(), WindowPolicy::default());
        assert_eq!(settings.render_policy(), RenderPolicy::default());
        assert_eq!(settings.zoom_policy(), ZoomPolicy::default());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let settings = ViewerSettings {
            large_window_radius: 7,
            render_workers: 4,
            ..ViewerSettings::default()
        };

        settings.save_to_path(&path).unwrap();
        let loaded = ViewerSettings::load_from_path(&path).unwrap();

        assert_eq!(loaded, settings);
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# ==="));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "version: 1\npage_gap: 12.0\n").unwrap();

        let loaded = ViewerSettings::load_from_path(&path).unwrap();

        assert!((loaded.page_gap - 12.0).abs() < f64::EPSILON);
        assert_eq!(loaded.large_window_radius, 5);
    }

    #[test]
    fn old_version_is_migrated_and_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "version: 0\nshared_cache_pages: 64\n").unwrap();

        let loaded = ViewerSettings::load_from_path(&path).unwrap();

        assert_eq!(loaded.version, CURRENT_VERSION);
        assert_eq!(loaded.shared_cache_pages, 0);
        let reloaded = ViewerSettings::load_from_path(&path).unwrap();
        assert_eq!(reloaded.version, CURRENT_VERSION);
    }

    #[test]
    fn broken_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "page_gap: [not, a, number]\n").unwrap();

        assert!(matches!(
            ViewerSettings::load_from_path(&path),
            Err(SettingsError::Parse { .. })
        ));
        assert_eq!(
            ViewerSettings::load_or_default(Some(&path)),
            ViewerSettings::default()
        );
    }

    #[test]
    fn first_run_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio").join("config.yaml");

        let settings = ViewerSettings::load_or_default(Some(&path));

        assert_eq!(settings, ViewerSettings::default());
        assert!(path.exists());
    }
}
