//! Error types for layertrace operations.
//!
//! - [`TraceError`] is returned by a trace session. All of its variants are
//!   fatal for that session.
//! - [`SceneError`] is returned by the scene mutation API.
//! - [`ConfigError`] is returned while loading a [`TraceConfig`](crate::config::TraceConfig).
//!
//! [`ClassificationError`] and [`ShapeComparisonError`] are the two
//! component-level errors. The first aborts a session; the second is always
//! recovered inside the recorder.

use std::{error::Error as StdError, io, path::PathBuf};

use thiserror::Error;

use layertrace_core::identifier::{BlockId, LayerId};

/// A layer type that none of the classifier rules recognizes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no block kind matches layer type `{type_name}`")]
pub struct ClassificationError {
    pub type_name: String,
}

/// Two shapes of different rank were compared element by element.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot compare shapes {left:?} and {right:?} of different rank")]
pub struct ShapeComparisonError {
    pub left: Vec<usize>,
    pub right: Vec<usize>,
}

/// Which side of a layer invocation a tensor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorRole {
    Input,
    Output,
}

/// The main error type of a trace session.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("Classification error: {0}")]
    Classification(#[from] ClassificationError),

    #[error("Internal consistency error: pending buffer holds {pending} events")]
    InternalConsistency { pending: usize },

    #[error("Layer {0} was never registered with this session")]
    UnknownLayer(LayerId),

    #[error("Layer {layer} reported no {role:?} tensor")]
    MissingTensor { layer: LayerId, role: TensorRole },

    #[error("Artifact error: {0}")]
    Artifact(Box<dyn StdError + Send + Sync>),

    #[error("Session aborted by an earlier error")]
    Aborted,
}

/// Errors of the scene mutation API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    #[error("Block {0} does not exist")]
    UnknownBlock(BlockId),

    #[error("Input block {0} cannot be a connection destination")]
    InputDestination(BlockId),

    #[error("No connection from block {from} to block {to}")]
    MissingConnection { from: BlockId, to: BlockId },
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Missing configuration file: {0}")]
    MissingFile(PathBuf),

    #[error("Failed to parse TOML configuration: {0}")]
    Parse(String),

    #[error("Invalid style: {0}")]
    Style(String),

    #[error("Invalid layout: {0}")]
    Layout(String),
}
