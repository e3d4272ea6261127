//! Trace recording.
//!
//! A [`TraceSession`] receives one callback per executed layer and forwards it
//! to the [`BlockSequence`]. For every event it decides:
//!
//! - whether the layer's input is new data, which introduces an input block,
//! - whether the layer changes the shape of its data, which inserts a gap,
//! - and which kind of block the layer becomes.
//!
//! The first fatal error poisons the session. Everything assembled up to that
//! point stays available.

use std::collections::HashMap;

use log::{info, trace};

use layertrace_core::{
    block::BlockKind,
    color::Palette,
    geometry::Axis,
    identifier::{LayerId, StorageToken},
};

use crate::{
    classify::Classifier,
    config::TraceConfig,
    error::{ShapeComparisonError, TensorRole, TraceError},
    graph::ModuleTree,
    host::{ArtifactSink, TensorView},
    layout::LayoutEngine,
    scene::Scene,
    sequence::{BlockSequence, LayerEvent},
};

/// Recorder state of one trace run.
#[derive(Debug)]
pub struct TraceSession<S> {
    /// Type names of the layers this session was registered for.
    registry: HashMap<LayerId, String>,
    classifier: Classifier,
    /// Lowercased.
    ignore_layers: Vec<String>,
    squeeze_shapes: bool,

    sequence: BlockSequence,
    sink: S,

    last_output: Option<StorageToken>,
    poisoned: bool,
}

impl<S: ArtifactSink> TraceSession<S> {
    /// Creates a session for the traced layers of `tree`.
    pub fn new(tree: &ModuleTree, config: &TraceConfig, palette: Palette, sink: S) -> Self {
        let registry = tree
            .traced()
            .map(|node| (node.id(), node.type_name().to_string()))
            .collect();
        let layout = LayoutEngine::new(config.layout().clone(), config.image_path());

        Self {
            registry,
            classifier: Classifier::from_config(config.classifier()),
            ignore_layers: config
                .ignore_layers()
                .iter()
                .map(|pattern| pattern.to_lowercase())
                .collect(),
            squeeze_shapes: config.squeeze_shapes(),
            sequence: BlockSequence::new(layout, palette).with_verbose(config.verbose()),
            sink,
            last_output: None,
            poisoned: false,
        }
    }

    /// Records one execution of `layer`.
    ///
    /// Only the first element of `inputs` and of `outputs` is used, so layers
    /// returning tuples pass all of them.
    ///
    /// # Errors
    ///
    /// Every error is fatal: the session rejects all further events with
    /// [`TraceError::Aborted`].
    pub fn observe<T: TensorView>(
        &mut self,
        layer: LayerId,
        inputs: &[T],
        outputs: &[T],
    ) -> Result<(), TraceError> {
        if self.poisoned {
            return Err(TraceError::Aborted);
        }

        let result = self.record(layer, inputs, outputs);
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    /// Realizes any buffered events.
    ///
    /// Call once the host evaluation is over; a trailing fuseable layer is
    /// otherwise never turned into a block.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::Aborted`] if the session is poisoned.
    pub fn finish(&mut self) -> Result<(), TraceError> {
        if self.poisoned {
            return Err(TraceError::Aborted);
        }

        self.sequence.flush()?;
        info!(blocks = self.sequence.len(); "Trace finished");
        Ok(())
    }

    /// Returns true once an event failed.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Returns the blocks and connections assembled so far.
    pub fn sequence(&self) -> &BlockSequence {
        &self.sequence
    }

    /// Mutable access for the scene mutation API.
    pub fn sequence_mut(&mut self) -> &mut BlockSequence {
        &mut self.sequence
    }

    /// Consumes the session, keeping only the assembled sequence.
    pub fn into_sequence(self) -> BlockSequence {
        self.sequence
    }

    /// Materializes the current scene.
    pub fn scene(&self) -> Scene<'_> {
        self.sequence.scene()
    }

    /// Returns the artifact sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn record<T: TensorView>(
        &mut self,
        layer: LayerId,
        inputs: &[T],
        outputs: &[T],
    ) -> Result<(), TraceError> {
        let type_name = self
            .registry
            .get(&layer)
            .ok_or(TraceError::UnknownLayer(layer))?;
        let input = inputs.first().ok_or(TraceError::MissingTensor {
            layer,
            role: TensorRole::Input,
        })?;
        let output = outputs.first().ok_or(TraceError::MissingTensor {
            layer,
            role: TensorRole::Output,
        })?;

        trace!(
            layer:%,
            type_name = type_name.as_str(),
            input:? = input.shape(),
            output:? = output.shape();
            "Layer event"
        );

        let lowered = type_name.to_lowercase();
        if self
            .ignore_layers
            .iter()
            .any(|pattern| lowered.contains(pattern.as_str()))
        {
            trace!(layer:%; "Ignored layer");
            self.last_output = Some(output.storage());
            return Ok(());
        }

        let classification = self.classifier.classify(type_name)?;
        let input_shape = self.normalize(input.shape());
        let output_shape = self.normalize(output.shape());

        let aliasing = self.last_output == Some(input.storage())
            || classification.kind == BlockKind::Activation;
        let same_depth = compare_shapes(&input_shape, &output_shape).unwrap_or_else(|err| {
            trace!(layer:%, err:%; "Shapes differ in rank");
            false
        });

        if !same_depth && classification.kind != BlockKind::Pool {
            self.sequence.add_gap(Axis::SEQUENCE);
        }
        if !aliasing && !self.sequence.is_known(layer) {
            self.sequence.append_input(layer, input, &mut self.sink)?;
        }
        self.sequence
            .append(LayerEvent::new(layer, classification, output_shape))?;

        self.last_output = Some(output.storage());
        Ok(())
    }

    fn normalize(&self, shape: &[usize]) -> Vec<usize> {
        if self.squeeze_shapes {
            squeeze(shape)
        } else {
            shape.to_vec()
        }
    }
}

/// Drops size-1 axes.
fn squeeze(shape: &[usize]) -> Vec<usize> {
    shape.iter().copied().filter(|extent| *extent != 1).collect()
}

/// Compares two shapes element by element.
///
/// # Errors
///
/// Returns [`ShapeComparisonError`] if the shapes differ in rank.
fn compare_shapes(left: &[usize], right: &[usize]) -> Result<bool, ShapeComparisonError> {
    if left.len() != right.len() {
        return Err(ShapeComparisonError {
            left: left.to_vec(),
            right: right.to_vec(),
        });
    }
    Ok(left.iter().zip(right).all(|(l, r)| l == r))
}
