//! Configuration module for statebus-rs
//!
//! This module holds the tunables of the coordination layer:
//! - Capture loop settings (window, target rate, image buffer size)
//! - Scan gate thresholds (ageing, merging, full-scan safety nets)
//! - Control channel and store retry bounds
//! - The property declaration list compiled into the segment layout
//!
//! # Config Location
//!
//! The default config file lives in the platform config directory under
//! `statebus-rs/config.toml`:
//!
//! - **Linux**: `~/.config/statebus-rs/`
//! - **macOS**: `~/Library/Application Support/statebus-rs/`
//! - **Windows**: `%APPDATA%\statebus-rs\`
//!
//! Files ending in `.json` are parsed as JSON, everything else as TOML.
//!
//! # Example
//!
//! ```ignore
//! use statebus_rs::config::BusConfig;
//!
//! let config = BusConfig::load_or_default(BusConfig::default_path());
//! let schema = SchemaCompiler::compile(&config.schema)?;
//! ```

use crate::error::{Result, StateBusError};
use crate::schema::{default_schema, PropertyDecl};
use crate::segment::{FrameLimits, MAX_DIRTY_RECTS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "statebus-rs";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Default capture rate in frames per second
pub const DEFAULT_TARGET_FPS: u32 = 60;

/// Default consumer poll interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 30;

/// Default bound on versioned read retries
pub const DEFAULT_MAX_READ_RETRIES: u32 = 8;

/// Default bound on control channel lock attempts
pub const DEFAULT_LOCK_SPIN_LIMIT: u32 = 1000;

/// Default age in milliseconds after which a queued message is evicted
pub const DEFAULT_MESSAGE_TTL_MS: u32 = 2000;

/// Default number of foreign polls a unicast message survives unclaimed
pub const DEFAULT_MAX_UNCLAIMED_POLLS: u32 = 64;

// ==================== Top-level Config ====================

/// Full configuration of one coordination segment and its workers
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BusConfig {
    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub scan_gate: ScanGateConfig,

    #[serde(default)]
    pub channel: ChannelConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub demo: DemoConfig,

    /// Ordered property declarations; empty means the built-in schema
    #[serde(default)]
    pub schema: Vec<PropertyDecl>,
}

impl BusConfig {
    /// Default config file path in the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StateBusError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let config: Self = if is_json {
            serde_json::from_str(&content).map_err(|e| {
                StateBusError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        } else {
            toml::from_str(&content).map_err(|e| {
                StateBusError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        };

        config.validate()?;
        Ok(config)
    }

    /// Load a config file, returning defaults if any error occurs
    pub fn load_or_default(path: Option<impl AsRef<Path>>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("No config file at {:?}, using defaults", path);
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Save the config to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StateBusError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| StateBusError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            StateBusError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.capture.target_fps == 0 {
            return Err(StateBusError::Config(
                "capture.target_fps must be positive".to_string(),
            ));
        }
        if self.capture.max_width == 0 || self.capture.max_height == 0 {
            return Err(StateBusError::Config(
                "capture.max_width and capture.max_height must be positive".to_string(),
            ));
        }
        if self.scan_gate.grid_cell_size == 0 {
            return Err(StateBusError::Config(
                "scan_gate.grid_cell_size must be positive".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.scan_gate.fallback_area_percent) {
            return Err(StateBusError::Config(
                "scan_gate.fallback_area_percent must be within 0..=100".to_string(),
            ));
        }
        if self.channel.lock_spin_limit == 0 {
            return Err(StateBusError::Config(
                "channel.lock_spin_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The declarations to compile, falling back to the built-in schema
    pub fn schema_decls(&self) -> Vec<PropertyDecl> {
        if self.schema.is_empty() {
            default_schema()
        } else {
            self.schema.clone()
        }
    }
}

// ==================== Capture Config ====================

/// Capture loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Native handle of the game window
    pub window_handle: u32,

    /// Frames per second the producer paces itself to
    pub target_fps: u32,

    /// Image buffer width in pixels
    pub max_width: u32,

    /// Image buffer height in pixels
    pub max_height: u32,

    /// Dirty rectangles published per frame (capped at the sync block capacity)
    pub max_dirty_rects: usize,
}

impl CaptureConfig {
    pub fn frame_limits(&self) -> FrameLimits {
        FrameLimits {
            max_width: self.max_width,
            max_height: self.max_height,
        }
    }

    /// Effective per-frame rectangle cap
    pub fn dirty_rect_cap(&self) -> usize {
        self.max_dirty_rects.min(MAX_DIRTY_RECTS)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            window_handle: 0,
            target_fps: DEFAULT_TARGET_FPS,
            max_width: 1920,
            max_height: 1080,
            max_dirty_rects: MAX_DIRTY_RECTS,
        }
    }
}

// ==================== Scan Gate Config ====================

/// Dirty-rectangle gating thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanGateConfig {
    /// Frames a dirty rectangle stays tracked after it arrives
    pub max_age_frames: u32,

    /// Pixels each rectangle is expanded by before the overlap test
    pub merge_padding: i32,

    /// Longest allowed gap between full scans, in milliseconds
    pub full_scan_interval_ms: u64,

    /// Dirty-area share of the screen that forces a full scan
    pub fallback_area_percent: f32,

    /// Side length of an occupancy grid cell in pixels
    pub grid_cell_size: u32,
}

impl ScanGateConfig {
    pub fn full_scan_interval(&self) -> Duration {
        Duration::from_millis(self.full_scan_interval_ms)
    }
}

impl Default for ScanGateConfig {
    fn default() -> Self {
        Self {
            max_age_frames: 3,
            merge_padding: 8,
            full_scan_interval_ms: 5000,
            fallback_area_percent: 40.0,
            grid_cell_size: 32,
        }
    }
}

// ==================== Channel Config ====================

/// Control channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Ring-buffer property backing the channel
    pub property: String,

    /// Compare-and-swap attempts before giving up on the lock
    pub lock_spin_limit: u32,

    /// Queued messages older than this are evicted (0 keeps them forever)
    pub message_ttl_ms: u32,

    /// A unicast message skipped by this many polls of other workers is
    /// evicted (0 disables the bound)
    pub max_unclaimed_polls: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            property: "controlChannel".to_string(),
            lock_spin_limit: DEFAULT_LOCK_SPIN_LIMIT,
            message_ttl_ms: DEFAULT_MESSAGE_TTL_MS,
            max_unclaimed_polls: DEFAULT_MAX_UNCLAIMED_POLLS,
        }
    }
}

// ==================== Store Config ====================

/// State store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Retries of a versioned read before returning an inconsistent snapshot
    pub max_read_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_read_retries: DEFAULT_MAX_READ_RETRIES,
        }
    }
}

// ==================== Worker Config ====================

/// Consumer worker loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Longest a worker blocks waiting for a frame per tick
    pub poll_interval_ms: u64,
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

// ==================== Demo Config ====================

/// Settings of the bundled demo binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// How long the demo runs before shutting down
    pub duration_ms: u64,

    /// Synthetic frame size
    pub width: u32,
    pub height: u32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            duration_ms: 2000,
            width: 640,
            height: 360,
        }
    }
}
