//! The scene vocabulary: blocks, connections and their kinds.
//!
//! A [`Block`] is one visual unit of the diagram. It stands either for a
//! distinct layer of the traced model or for an input marker. Blocks are
//! linked by [`Connection`]s that carry a [`Direction`]: forward edges follow
//! the data flow, backward edges close a loop back onto a layer that already
//! executed.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    geometry::Vec3,
    identifier::BlockId,
};

/// The visual kind of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Conv,
    Norm,
    Pool,
    Linear,
    Recurrent,
    Embedding,
    Dropout,
    Activation,
    ImageInput,
    VectorInput,
}

impl BlockKind {
    /// All kinds, in palette order.
    pub const ALL: [BlockKind; 10] = [
        BlockKind::Conv,
        BlockKind::Norm,
        BlockKind::Pool,
        BlockKind::Linear,
        BlockKind::Recurrent,
        BlockKind::Embedding,
        BlockKind::Dropout,
        BlockKind::Activation,
        BlockKind::ImageInput,
        BlockKind::VectorInput,
    ];

    /// Returns true for the two input marker kinds.
    pub fn is_input(self) -> bool {
        matches!(self, BlockKind::ImageInput | BlockKind::VectorInput)
    }

    /// Returns true for kinds that may absorb a following activation.
    pub fn is_fuseable(self) -> bool {
        matches!(self, BlockKind::Conv | BlockKind::Linear)
    }

    /// Kinds that are always drawn with a single shape-driven axis.
    pub fn is_vector(self) -> bool {
        matches!(
            self,
            BlockKind::Linear | BlockKind::Recurrent | BlockKind::Embedding | BlockKind::VectorInput
        )
    }

    /// Kinds drawn as thin slabs, one dimension below their output.
    pub fn is_flat(self) -> bool {
        matches!(
            self,
            BlockKind::Norm | BlockKind::Pool | BlockKind::Activation | BlockKind::Dropout
        )
    }

    /// Short label used in block names and captions.
    pub fn label(self) -> &'static str {
        match self {
            BlockKind::Conv => "Conv",
            BlockKind::Norm => "Norm",
            BlockKind::Pool => "Pool",
            BlockKind::Linear => "Linear",
            BlockKind::Recurrent => "LSTM",
            BlockKind::Embedding => "Embedding",
            BlockKind::Dropout => "Dropout",
            BlockKind::Activation => "Act",
            BlockKind::ImageInput => "ImgInput",
            BlockKind::VectorInput => "VecInput",
        }
    }
}

impl FromStr for BlockKind {
    type Err = String;

    /// Parses the snake_case name used in configuration files.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "conv" => Ok(BlockKind::Conv),
            "norm" => Ok(BlockKind::Norm),
            "pool" => Ok(BlockKind::Pool),
            "linear" => Ok(BlockKind::Linear),
            "recurrent" => Ok(BlockKind::Recurrent),
            "embedding" => Ok(BlockKind::Embedding),
            "dropout" => Ok(BlockKind::Dropout),
            "activation" => Ok(BlockKind::Activation),
            "image_input" => Ok(BlockKind::ImageInput),
            "vector_input" => Ok(BlockKind::VectorInput),
            _ => Err(format!("unknown block kind `{name}`")),
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a dimensionality falls outside `1..=3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("dimensionality must be 1, 2 or 3, got {0}")]
pub struct DimensionalityError(pub usize);

/// Number of trailing axes of a block that are driven by the output shape.
///
/// Always one of 1, 2 or 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct Dimensionality(u8);

impl Dimensionality {
    pub const ONE: Self = Self(1);
    pub const TWO: Self = Self(2);
    pub const THREE: Self = Self(3);

    /// Creates a dimensionality, rejecting values outside `1..=3`.
    pub fn new(value: usize) -> Result<Self, DimensionalityError> {
        match value {
            1..=3 => Ok(Self(value as u8)),
            _ => Err(DimensionalityError(value)),
        }
    }

    /// Creates a dimensionality, clamping `value` into `1..=3`.
    pub fn clamped(value: usize) -> Self {
        Self(value.clamp(1, 3) as u8)
    }

    /// Infers the dimensionality of an output shape of the given rank.
    ///
    /// Ranks below 3 map to 1; higher ranks drop their leading channel axis.
    ///
    /// # Examples
    ///
    /// ```
    /// # use layertrace_core::block::Dimensionality;
    /// assert_eq!(Dimensionality::from_rank(1), Dimensionality::ONE);
    /// assert_eq!(Dimensionality::from_rank(3), Dimensionality::TWO);
    /// assert_eq!(Dimensionality::from_rank(6), Dimensionality::THREE);
    /// ```
    pub fn from_rank(rank: usize) -> Self {
        if rank < 3 {
            Self::ONE
        } else {
            Self::clamped(rank - 1)
        }
    }

    /// One dimension less, never below 1.
    pub fn reduced(self) -> Self {
        Self::clamped(self.get().saturating_sub(1))
    }

    /// Returns the number of dimensions, 1 to 3.
    pub fn get(self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<usize> for Dimensionality {
    type Error = DimensionalityError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Dimensionality> for usize {
    fn from(dim: Dimensionality) -> Self {
        dim.get()
    }
}

/// One visual unit of the diagram.
///
/// Blocks are created by the layout engine and owned by the assembler. The
/// geometry is fixed at creation; the only later mutation is the
/// [`looped`](Block::looped) flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    id: BlockId,
    kind: BlockKind,
    fused_activation: bool,
    dim: Dimensionality,
    size: Vec3,
    scale: Vec3,
    extent: Vec3,
    position: Vec3,
    offset: Vec3,
    anchor: Option<BlockId>,
    caption: String,
    looped: bool,
    artifact: Option<String>,
}

impl Block {
    /// Creates a block with zero geometry and the default caption.
    pub fn new(id: BlockId, kind: BlockKind, dim: Dimensionality) -> Self {
        let caption = if kind.is_input() {
            String::new()
        } else {
            format!("{}{}", kind.label(), id)
        };

        Self {
            id,
            kind,
            fused_activation: false,
            dim,
            size: Vec3::zero(),
            scale: Vec3::zero(),
            extent: Vec3::zero(),
            position: Vec3::zero(),
            offset: Vec3::zero(),
            anchor: None,
            caption,
            looped: false,
            artifact: None,
        }
    }

    /// Marks this block as a transform fused with its activation.
    pub fn with_fused_activation(mut self) -> Self {
        self.fused_activation = true;
        self
    }

    /// Sets the raw, shape-derived size.
    pub fn with_size(mut self, size: Vec3) -> Self {
        self.size = size;
        self
    }

    /// Sets the accumulated scale factor this block was created with.
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Sets the rendered extent in layout units.
    pub fn with_extent(mut self, extent: Vec3) -> Self {
        self.extent = extent;
        self
    }

    /// Sets the absolute position, the shift relative to the anchor and the anchor itself.
    pub fn with_placement(mut self, position: Vec3, offset: Vec3, anchor: Option<BlockId>) -> Self {
        self.position = position;
        self.offset = offset;
        self.anchor = anchor;
        self
    }

    /// Sets the caption drawn under the block.
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }

    /// Records the file name of the sample image persisted for this block.
    pub fn with_artifact(mut self, file_name: impl Into<String>) -> Self {
        self.artifact = Some(file_name.into());
        self
    }

    /// Returns the block id.
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Returns the block kind.
    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    /// Returns true if this block is drawn with an activation band.
    pub fn is_fused(&self) -> bool {
        self.fused_activation
    }

    /// Returns true for image and vector input blocks.
    pub fn is_input(&self) -> bool {
        self.kind.is_input()
    }

    /// Returns the number of shape-driven axes.
    pub fn dim(&self) -> Dimensionality {
        self.dim
    }

    /// Raw size, one component per axis, before scaling.
    pub fn size(&self) -> Vec3 {
        self.size
    }

    /// Returns the scale factor applied to the block.
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Rendered size in layout units.
    pub fn extent(&self) -> Vec3 {
        self.extent
    }

    /// Absolute position of the block's west face centre.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Shift relative to the east face of [`anchor`](Block::anchor).
    pub fn offset(&self) -> Vec3 {
        self.offset
    }

    /// The block this one is placed after, if any.
    pub fn anchor(&self) -> Option<BlockId> {
        self.anchor
    }

    /// Returns the caption.
    pub fn caption(&self) -> &str {
        &self.caption
    }

    /// Returns true if a backward connection points at this block.
    pub fn looped(&self) -> bool {
        self.looped
    }

    /// Marks the block as the target of a backward connection.
    pub fn mark_looped(&mut self) {
        self.looped = true;
    }

    /// Returns the file name of the sample image, for image inputs.
    pub fn artifact(&self) -> Option<&str> {
        self.artifact.as_deref()
    }

    /// Stable name usable as an anchor by renderers, e.g. `ConvAct_3`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use layertrace_core::block::{Block, BlockKind, Dimensionality};
    /// # use layertrace_core::identifier::BlockId;
    /// let block = Block::new(BlockId::new(3), BlockKind::Conv, Dimensionality::THREE);
    /// assert_eq!(block.name(), "Conv_3");
    /// assert_eq!(block.with_fused_activation().name(), "ConvAct_3");
    /// ```
    pub fn name(&self) -> String {
        let suffix = if self.fused_activation { "Act" } else { "" };
        format!("{}{}_{}", self.kind.label(), suffix, self.id)
    }
}

/// Orientation of a connection relative to creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    /// Classifies an edge by the sequence ids of its endpoints.
    ///
    /// An edge pointing to an earlier block is backward. An edge from a block
    /// to itself closes a loop and is backward as well.
    pub fn between(source: BlockId, destination: BlockId) -> Self {
        if destination <= source {
            Direction::Backward
        } else {
            Direction::Forward
        }
    }
}

/// A directed edge between two blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Connection {
    source: BlockId,
    destination: BlockId,
    direction: Direction,
}

impl Connection {
    /// Creates a connection, deriving its direction from the endpoint ids.
    pub fn new(source: BlockId, destination: BlockId) -> Self {
        Self {
            source,
            destination,
            direction: Direction::between(source, destination),
        }
    }

    /// Returns the block the connection starts at.
    pub fn source(&self) -> BlockId {
        self.source
    }

    /// Returns the block the connection points at.
    pub fn destination(&self) -> BlockId {
        self.destination
    }

    /// Returns the direction derived from creation order.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns true if the destination was created first.
    pub fn is_backward(&self) -> bool {
        self.direction == Direction::Backward
    }

    /// The ordered endpoint pair connections are deduplicated by.
    pub fn key(&self) -> (BlockId, BlockId) {
        (self.source, self.destination)
    }
}
