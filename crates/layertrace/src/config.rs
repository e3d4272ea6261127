//! Configuration types for trace sessions.
//!
//! All types implement [`serde::Deserialize`] and every section falls back to
//! its defaults, so a configuration file only needs to name what it changes.
//!
//! # Overview
//!
//! - [`TraceConfig`] - Top-level configuration of a trace session.
//! - [`GraphConfig`] - Which submodules the module graph keeps, drops or flattens.
//! - [`LayoutConfig`] - Coefficients of the layout engine and its scale heuristic.
//! - [`ClassifierConfig`] - Extra classification rules.
//! - [`StyleConfig`] - Palette overrides.
//!
//! # Example
//!
//! ```
//! # use layertrace::config::TraceConfig;
//! let config = TraceConfig::from_toml_str(
//!     r#"
//!     ignore_layers = ["flatten"]
//!
//!     [layout]
//!     gap = 12.0
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.ignore_layers(), ["flatten"]);
//! assert_eq!(config.layout().gap, 12.0);
//! assert!(config.squeeze_shapes());
//! ```

use std::{collections::HashMap, fs, path::Path};

use log::{debug, info};
use serde::Deserialize;

use layertrace_core::{
    block::BlockKind,
    color::{Color, Palette},
};

use crate::error::ConfigError;

/// Top-level configuration of a trace session.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Where sample input images go; `{i}` is replaced by the block id.
    image_path: String,

    /// Case-insensitive type-name substrings of layers that are skipped.
    ignore_layers: Vec<String>,

    /// Drop size-1 axes from shapes before comparing and laying them out.
    squeeze_shapes: bool,

    /// Log block creation at `info` instead of `debug`.
    verbose: bool,

    graph: GraphConfig,
    layout: LayoutConfig,
    classifier: ClassifierConfig,
    style: StyleConfig,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            image_path: "./input_{i}.png".to_string(),
            ignore_layers: vec!["batchnorm".to_string(), "flatten".to_string()],
            squeeze_shapes: true,
            verbose: false,
            graph: GraphConfig::default(),
            layout: LayoutConfig::default(),
            classifier: ClassifierConfig::default(),
            style: StyleConfig::default(),
        }
    }
}

impl TraceConfig {
    /// Parses a configuration from TOML source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown values,
    /// [`ConfigError::Style`] for colors that cannot be parsed and
    /// [`ConfigError::Layout`] for unusable layout coefficients.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: TraceConfig =
            toml::from_str(source).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.style.palette().map_err(ConfigError::Style)?;
        config.layout.validate().map_err(ConfigError::Layout)?;
        Ok(config)
    }

    /// Loads a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File doesn't exist
    /// - File cannot be read
    /// - TOML parsing fails
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = path.display().to_string(); "Loading trace configuration");

        if !path.exists() {
            return Err(ConfigError::MissingFile(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!(config:?; "Configuration loaded");
        Ok(config)
    }

    /// Returns the sample image path template.
    pub fn image_path(&self) -> &str {
        &self.image_path
    }

    /// Sets the sample image path template.
    pub fn with_image_path(mut self, image_path: impl Into<String>) -> Self {
        self.image_path = image_path.into();
        self
    }

    /// Returns the type-name substrings of skipped layers.
    pub fn ignore_layers(&self) -> &[String] {
        &self.ignore_layers
    }

    /// Sets the type-name substrings of skipped layers.
    pub fn with_ignore_layers(mut self, ignore_layers: Vec<String>) -> Self {
        self.ignore_layers = ignore_layers;
        self
    }

    /// Returns whether size-1 axes are dropped from shapes.
    pub fn squeeze_shapes(&self) -> bool {
        self.squeeze_shapes
    }

    /// Sets whether size-1 axes are dropped from shapes.
    pub fn with_squeeze_shapes(mut self, squeeze_shapes: bool) -> Self {
        self.squeeze_shapes = squeeze_shapes;
        self
    }

    /// Returns whether block creation is logged at `info`.
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Sets whether block creation is logged at `info`.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Returns the module graph configuration.
    pub fn graph(&self) -> &GraphConfig {
        &self.graph
    }

    /// Sets the module graph configuration.
    pub fn with_graph(mut self, graph: GraphConfig) -> Self {
        self.graph = graph;
        self
    }

    /// Returns the layout configuration.
    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    /// Sets the layout configuration.
    pub fn with_layout(mut self, layout: LayoutConfig) -> Self {
        self.layout = layout;
        self
    }

    /// Returns the classifier configuration.
    pub fn classifier(&self) -> &ClassifierConfig {
        &self.classifier
    }

    /// Returns the style configuration.
    pub fn style(&self) -> &StyleConfig {
        &self.style
    }
}

/// Rules for building the module graph.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Case-insensitive type-name substrings whose whole subtree is dropped.
    banned: Vec<String>,

    /// Exact type names whose whole subtree is dropped.
    exclude: Vec<String>,

    /// Case-insensitive type-name substrings of containers whose children
    /// are spliced into their parent.
    transparent: Vec<String>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            banned: vec!["loss".to_string(), "vocab".to_string()],
            exclude: Vec::new(),
            transparent: vec!["sequential".to_string()],
        }
    }
}

impl GraphConfig {
    /// Creates a graph configuration.
    ///
    /// # Arguments
    ///
    /// * `banned` - Type-name substrings that drop a subtree.
    /// * `exclude` - Exact type names that drop a subtree.
    /// * `transparent` - Type-name substrings of containers to flatten.
    pub fn new(banned: Vec<String>, exclude: Vec<String>, transparent: Vec<String>) -> Self {
        Self {
            banned,
            exclude,
            transparent,
        }
    }

    /// Returns the type-name substrings that drop a subtree.
    pub fn banned(&self) -> &[String] {
        &self.banned
    }

    /// Returns the exact type names that drop a subtree.
    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    /// Returns the type-name substrings of flattened containers.
    pub fn transparent(&self) -> &[String] {
        &self.transparent
    }
}

/// Coefficients of the layout engine.
///
/// Raw sizes are in shape units (one unit per tensor element along an axis);
/// positions and extents are in layout units.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Raw size of axes not driven by the output shape.
    pub default_extent: f32,
    /// Conversion factor from raw size to layout units.
    pub unit: f32,
    /// Smallest rendered extent along any axis.
    pub min_extent: f32,
    /// Spacing inserted along the sequence axis by a gap.
    pub gap: f32,
    /// Perpendicular offset of input blocks.
    pub input_offset: f32,
    /// Weight of sequence-axis ratios; applied as `-width_factor / 4`.
    pub width_factor: f32,
    /// Weight of height and depth ratios.
    pub height_depth_factor: f32,
    /// Scale forced onto non-sequence axes when a ratio exceeds `ratio_threshold`.
    pub shrink_factor: f32,
    pub ratio_threshold: f32,
    /// Strength of the sequence-axis damping when signs disagree.
    pub damping: f32,
    /// Inclusive bounds of the accumulated scale factor.
    pub clip: [f32; 2],
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            default_extent: 16.0,
            unit: 0.125,
            min_extent: 2.0,
            gap: 8.0,
            input_offset: 8.0,
            width_factor: 0.8,
            height_depth_factor: 0.8,
            shrink_factor: 0.8,
            ratio_threshold: 4.0,
            damping: 2.0,
            clip: [-1.0, 1.0],
        }
    }
}

impl LayoutConfig {
    /// Checks that the scale factor bounds form a finite, non-empty range.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        let [low, high] = self.clip;
        if !low.is_finite() || !high.is_finite() {
            return Err(format!("clip bounds must be finite, got [{low}, {high}]"));
        }
        if low > high {
            return Err(format!("clip lower bound {low} exceeds upper bound {high}"));
        }
        Ok(())
    }
}

/// A user-supplied classification rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RuleConfig {
    pub pattern: String,
    pub kind: BlockKind,
}

/// Extra rules evaluated before the built-in classification table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    rules: Vec<RuleConfig>,
}

impl ClassifierConfig {
    /// Creates a classifier configuration from `rules`.
    pub fn new(rules: Vec<RuleConfig>) -> Self {
        Self { rules }
    }

    /// Returns the configured rules in evaluation order.
    pub fn rules(&self) -> &[RuleConfig] {
        &self.rules
    }
}

/// Palette overrides, as CSS color strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StyleConfig {
    /// Fill colors keyed by block kind name, e.g. `conv` or `image_input`.
    #[serde(default)]
    colors: HashMap<String, String>,

    #[serde(default)]
    edge: Option<String>,
}

impl StyleConfig {
    /// Returns the default [`Palette`] with the configured overrides applied.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured color string cannot be parsed.
    pub fn palette(&self) -> Result<Palette, String> {
        let mut palette = Palette::default();

        for (name, color) in &self.colors {
            let kind: BlockKind = name.parse()?;
            let color = Color::new(color)
                .map_err(|err| format!("Invalid {name} color in config: {err}"))?;
            palette.set_fill(kind, color);
        }

        if let Some(edge) = &self.edge {
            let color =
                Color::new(edge).map_err(|err| format!("Invalid edge color in config: {err}"))?;
            palette.set_edge(color);
        }

        Ok(palette)
    }
}
