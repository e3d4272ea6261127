//! Block layout.
//!
//! The [`LayoutEngine`] turns a classified layer and its output shape into a
//! sized, positioned [`Block`]. It is stateful: it remembers where the last
//! block ended, whether a gap is pending, the raw size of the last real block
//! and the accumulated scale factor.
//!
//! # Sizing
//!
//! Every axis starts at `default_extent`. The trailing `dim` axes are then
//! overridden by the trailing entries of the output shape, so a `(16, 32, 32)`
//! output with dimensionality 2 becomes `(default, 32, 32)`.
//!
//! # Placement
//!
//! Real blocks are chained along [`Axis::SEQUENCE`]: each starts where the
//! previous one ended, shifted by any pending gap. Input blocks are offset on
//! the height axis and do not move the chain forward.

mod scale;

use std::path::Path;

use log::{trace, warn};

use layertrace_core::{
    block::{Block, BlockKind, Dimensionality},
    geometry::{Axis, Vec3},
    identifier::BlockId,
};

use crate::{
    config::LayoutConfig,
    error::TraceError,
    host::{ArtifactSink, ImageSample, TensorView},
};

pub use scale::ScaleState;

/// Stateful block factory.
#[derive(Debug, Clone)]
pub struct LayoutEngine {
    config: LayoutConfig,
    image_path: String,
    /// The last real block, which the next one is placed after.
    anchor: Option<BlockId>,
    /// East face of the anchor.
    cursor: Vec3,
    /// Gap accumulated since the last real block.
    pending_offset: Vec3,
    /// Raw size of the last real block.
    last_size: Option<Vec3>,
    scale: ScaleState,
}

impl LayoutEngine {
    /// Creates a layout engine.
    ///
    /// # Arguments
    ///
    /// * `config` - Layout coefficients.
    /// * `image_path` - Path template for sample images; `{i}` is replaced by the block id.
    pub fn new(config: LayoutConfig, image_path: impl Into<String>) -> Self {
        Self {
            config,
            image_path: image_path.into(),
            anchor: None,
            cursor: Vec3::zero(),
            pending_offset: Vec3::zero(),
            last_size: None,
            scale: ScaleState::default(),
        }
    }

    /// Returns the layout configuration.
    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Where the next real block starts, before any pending gap.
    pub fn cursor(&self) -> Vec3 {
        self.cursor
    }

    /// Gap waiting to be applied to the next real block.
    pub fn pending_offset(&self) -> Vec3 {
        self.pending_offset
    }

    /// The accumulated scale factor, once a second real block was created.
    pub fn scale_factor(&self) -> Option<Vec3> {
        self.scale.current()
    }

    /// Resolves the dimensionality a block of `kind` is drawn with.
    ///
    /// `classified` comes from the layer's type name; without it the rank of
    /// `output_shape` decides. Vector kinds are always 1-dimensional and flat
    /// kinds lose one dimension.
    pub fn resolve_dim(
        kind: BlockKind,
        classified: Option<Dimensionality>,
        output_shape: &[usize],
    ) -> Dimensionality {
        let base = classified.unwrap_or_else(|| Dimensionality::from_rank(output_shape.len()));

        if kind.is_vector() {
            Dimensionality::ONE
        } else if kind.is_flat() {
            base.reduced()
        } else {
            base
        }
    }

    /// Creates a real block.
    ///
    /// # Arguments
    ///
    /// * `id` - Sequence id of the new block.
    /// * `kind` - Kind of the (first) layer the block represents.
    /// * `fused` - Whether an activation was fused into the block.
    /// * `classified` - Dimensionality fixed by the layer type, if any.
    /// * `output_shape` - Output shape of the last layer the block represents.
    pub fn create(
        &mut self,
        id: BlockId,
        kind: BlockKind,
        fused: bool,
        classified: Option<Dimensionality>,
        output_shape: &[usize],
    ) -> Block {
        let dim = Self::resolve_dim(kind, classified, output_shape);
        let size = self.shape_size(dim, output_shape);

        if let Some(last_size) = self.last_size {
            let active = Self::active_size(size, dim);
            self.scale.update(active, last_size, &self.config);
            trace!(block_id:% = id, scale:? = self.scale.current(); "Scale factor updated");
        }

        let scale = self.scale.current().unwrap_or_default();
        let extent = self.extent(size, scale);
        let offset = self.pending_offset;
        let position = self.cursor + offset;

        let mut block = Block::new(id, kind, dim)
            .with_size(size)
            .with_scale(scale)
            .with_extent(extent)
            .with_placement(position, offset, self.anchor);
        if fused {
            block = block.with_fused_activation();
        }

        self.cursor = position.with(
            Axis::SEQUENCE,
            position.get(Axis::SEQUENCE) + extent.get(Axis::SEQUENCE),
        );
        self.pending_offset = Vec3::zero();
        self.anchor = Some(id);
        self.last_size = Some(size);

        block
    }

    /// Creates an input block for `tensor`.
    ///
    /// Tensors of rank 4 or more become image inputs sized by their trailing
    /// three axes; the first image of the batch is handed to `sink`. Lower
    /// ranks become vector inputs whose depth is the trailing axis.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::Artifact`] if the sink fails.
    pub fn create_input(
        &mut self,
        id: BlockId,
        tensor: &impl TensorView,
        sink: &mut dyn ArtifactSink,
    ) -> Result<Block, TraceError> {
        let shape = tensor.shape();
        let offset = self
            .pending_offset
            .with(Axis::Width, 0.0)
            .with(Axis::Height, self.pending_offset.y() + self.config.input_offset);
        let position = self.cursor + offset;

        let block = if shape.len() > 3 {
            let size = self.shape_size(Dimensionality::THREE, shape);
            let path = self.image_path.replace("{i}", &id.to_string());

            let block = Block::new(id, BlockKind::ImageInput, Dimensionality::THREE)
                .with_size(size)
                .with_extent(self.extent(size, Vec3::zero()))
                .with_placement(position, offset, self.anchor);

            match ImageSample::first_of(tensor) {
                Some(sample) => {
                    sink.persist(Path::new(&path), sample)
                        .map_err(TraceError::Artifact)?;
                }
                None => {
                    warn!(block_id:% = id, shape:?; "Input tensor holds no complete image sample");
                }
            }

            let file_name = Path::new(&path)
                .file_name()
                .map_or_else(|| path.clone(), |name| name.to_string_lossy().into_owned());
            block.with_artifact(file_name)
        } else {
            let size = self.shape_size(Dimensionality::ONE, shape);

            Block::new(id, BlockKind::VectorInput, Dimensionality::ONE)
                .with_size(size)
                .with_extent(self.extent(size, Vec3::zero()))
                .with_placement(position, offset, self.anchor)
        };

        Ok(block)
    }

    /// Moves the chain back to `previous` if `removed` is the current anchor.
    ///
    /// Without a previous real block the chain restarts at the origin.
    pub fn reanchor(&mut self, removed: BlockId, previous: Option<&Block>) {
        if self.anchor != Some(removed) {
            return;
        }

        match previous {
            Some(block) => {
                let position = block.position();
                self.anchor = Some(block.id());
                self.cursor = position.with(
                    Axis::SEQUENCE,
                    position.get(Axis::SEQUENCE) + block.extent().get(Axis::SEQUENCE),
                );
            }
            None => {
                self.anchor = None;
                self.cursor = Vec3::zero();
            }
        }
        trace!(removed:%, anchor:? = self.anchor; "Layout re-anchored");
    }

    /// Adds a gap along `axis` before the next real block.
    pub fn add_gap(&mut self, axis: Axis) {
        let current = self.pending_offset.get(axis);
        self.pending_offset = self.pending_offset.with(axis, current + self.config.gap);
    }

    /// Raw size: `default_extent` everywhere, trailing `dim` axes from the shape.
    fn shape_size(&self, dim: Dimensionality, shape: &[usize]) -> Vec3 {
        let mut size = Vec3::splat(self.config.default_extent);

        for (axis, extent) in Axis::ALL
            .iter()
            .rev()
            .zip(shape.iter().rev())
            .take(dim.get())
        {
            size = size.with(*axis, *extent as f32);
        }

        size
    }

    /// Zeroes the axes that are not driven by the shape.
    fn active_size(size: Vec3, dim: Dimensionality) -> Vec3 {
        Axis::ALL
            .iter()
            .take(3 - dim.get())
            .fold(size, |active, axis| active.with(*axis, 0.0))
    }

    fn extent(&self, size: Vec3, scale: Vec3) -> Vec3 {
        size.scale(self.config.unit)
            .component_mul(scale.map(|s| 1.0 + s))
            .max(Vec3::splat(self.config.min_extent))
    }
}
