//! Block sequence assembly.
//!
//! The [`BlockSequence`] consumes classified layer events in execution order
//! and turns them into blocks and connections.
//!
//! # Fusion
//!
//! Events of a fuseable kind (convolution, linear) are held back until the
//! next event arrives. If that event is an activation, both become a single
//! block drawn with an activation band. Any other pair is realized as two
//! separate blocks, in order. The pending buffer never holds more than two
//! events.
//!
//! # Revisits
//!
//! A layer that already has a block does not get a second one. The first
//! revisit of a block draws a backward connection from the current last block
//! to it and marks it as looped; later revisits only move the cursor.
//!
//! # Connections
//!
//! Edges are recorded as they are discovered and resolved to block ids only
//! when a [`Scene`] is materialized. An input block is connected to the layer
//! that consumed it before that layer has a block, so the destination of such
//! an edge is recorded as a layer id.

use std::collections::HashMap;

use indexmap::IndexMap;
use log::{Level, debug, log, trace, warn};

use layertrace_core::{
    block::{Block, BlockKind, Connection, Dimensionality},
    color::Palette,
    geometry::Axis,
    identifier::{BlockId, LayerId},
};

use crate::{
    classify::Classification,
    error::{SceneError, TraceError},
    host::{ArtifactSink, TensorView},
    layout::LayoutEngine,
    scene::Scene,
};

/// One classified layer invocation, as seen by the assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerEvent {
    layer: LayerId,
    kind: BlockKind,
    dim: Option<Dimensionality>,
    output_shape: Vec<usize>,
}

impl LayerEvent {
    /// Creates an event for one invocation of `layer`.
    pub fn new(layer: LayerId, classification: Classification, output_shape: Vec<usize>) -> Self {
        Self {
            layer,
            kind: classification.kind,
            dim: classification.dim,
            output_shape,
        }
    }

    /// Returns the layer that was invoked.
    pub fn layer(&self) -> LayerId {
        self.layer
    }

    /// Returns the classified block kind.
    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    /// Returns the normalized output shape.
    pub fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }
}

/// Observable state of the assembler between two calls.
///
/// Flushing happens inside a single call and is never observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    Idle,
    Buffering { pending: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Block(BlockId),
    Layer(LayerId),
}

impl Endpoint {
    fn resolve(self, seen: &HashMap<LayerId, BlockId>) -> Option<BlockId> {
        match self {
            Endpoint::Block(id) => Some(id),
            Endpoint::Layer(layer) => seen.get(&layer).copied(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Edge {
    source: Endpoint,
    destination: Endpoint,
}

impl Edge {
    fn between(source: BlockId, destination: BlockId) -> Self {
        Self {
            source: Endpoint::Block(source),
            destination: Endpoint::Block(destination),
        }
    }

    fn resolve(self, seen: &HashMap<LayerId, BlockId>) -> Option<(BlockId, BlockId)> {
        Some((self.source.resolve(seen)?, self.destination.resolve(seen)?))
    }

    fn touches(self, block: BlockId, seen: &HashMap<LayerId, BlockId>) -> bool {
        self.source.resolve(seen) == Some(block) || self.destination.resolve(seen) == Some(block)
    }
}

/// Assembles blocks and connections from layer events.
#[derive(Debug, Clone)]
pub struct BlockSequence {
    layout: LayoutEngine,
    palette: Palette,
    verbose: bool,

    pending: Vec<LayerEvent>,
    blocks: IndexMap<BlockId, Block>,
    seen: HashMap<LayerId, BlockId>,
    last_block: Option<BlockId>,
    next_id: BlockId,

    gap_pending: bool,
    /// Gap requested while events were pending; belongs to the next event.
    deferred_gap: Option<Axis>,

    edges: Vec<Edge>,
}

impl BlockSequence {
    /// Creates an empty sequence that sizes blocks with `layout`.
    pub fn new(layout: LayoutEngine, palette: Palette) -> Self {
        Self {
            layout,
            palette,
            verbose: false,
            pending: Vec::with_capacity(2),
            blocks: IndexMap::new(),
            seen: HashMap::new(),
            last_block: None,
            next_id: BlockId::new(0),
            gap_pending: false,
            deferred_gap: None,
            edges: Vec::new(),
        }
    }

    /// Logs block creation at `info` instead of `debug`.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Returns whether events are waiting in the buffer.
    pub fn state(&self) -> AssemblerState {
        if self.pending.is_empty() {
            AssemblerState::Idle
        } else {
            AssemblerState::Buffering {
                pending: self.pending.len(),
            }
        }
    }

    /// Returns true if `layer` has a block or is waiting in the buffer.
    pub fn is_known(&self, layer: LayerId) -> bool {
        self.seen.contains_key(&layer) || self.pending.iter().any(|event| event.layer == layer)
    }

    /// Appends one layer event.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::InternalConsistency`] if the pending buffer ever
    /// grows beyond two events.
    pub fn append(&mut self, event: LayerEvent) -> Result<(), TraceError> {
        trace!(layer:% = event.layer, kind:% = event.kind, shape:? = event.output_shape; "Appending event");

        if self.pending.iter().any(|pending| pending.layer == event.layer) {
            self.flush()?;
        }

        if let Some(existing) = self.seen.get(&event.layer).copied() {
            self.flush()?;
            self.apply_deferred_gap();
            self.revisit(event.layer, existing);
            return Ok(());
        }

        if event.kind.is_fuseable() && !self.pending.is_empty() {
            self.flush()?;
        }
        self.apply_deferred_gap();

        let fuseable = event.kind.is_fuseable();
        self.pending.push(event);
        if self.pending.len() > 2 {
            return Err(TraceError::InternalConsistency {
                pending: self.pending.len(),
            });
        }

        if !fuseable {
            self.flush()?;
        }
        Ok(())
    }

    /// Creates an input block for `tensor`, consumed by `layer`.
    ///
    /// Does nothing if `layer` is already known: only the first invocation
    /// of a layer can introduce new data.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::Artifact`] if the sample image cannot be persisted.
    pub fn append_input(
        &mut self,
        layer: LayerId,
        tensor: &impl TensorView,
        sink: &mut dyn ArtifactSink,
    ) -> Result<(), TraceError> {
        if self.is_known(layer) {
            return Ok(());
        }

        let id = self.next_id;
        let block = self.layout.create_input(id, tensor, sink)?;
        self.next_id = id.next();

        self.log_created(&block);
        self.blocks.insert(id, block);
        self.edges.push(Edge {
            source: Endpoint::Block(id),
            destination: Endpoint::Layer(layer),
        });
        Ok(())
    }

    /// Requests a gap along `axis` before the next block.
    ///
    /// Repeated requests before the next block is created are ignored.
    pub fn add_gap(&mut self, axis: Axis) {
        if self.gap_pending {
            return;
        }
        self.gap_pending = true;

        if self.pending.is_empty() {
            debug!(axis:?; "Gap added");
            self.layout.add_gap(axis);
        } else {
            self.deferred_gap = Some(axis);
        }
    }

    /// Realizes all pending events.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::InternalConsistency`] if more than two events are pending.
    pub fn flush(&mut self) -> Result<(), TraceError> {
        let pending = std::mem::take(&mut self.pending);

        match pending.as_slice() {
            [] => {}
            [event] => self.realize(event, None),
            [first, second] if first.kind.is_fuseable() && second.kind == BlockKind::Activation => {
                debug!(layer:% = first.layer, activation:% = second.layer; "Fusing activation");
                self.realize(first, Some(second));
            }
            [first, second] => {
                self.realize(first, None);
                self.realize(second, None);
            }
            _ => {
                return Err(TraceError::InternalConsistency {
                    pending: pending.len(),
                });
            }
        }

        Ok(())
    }

    /// Returns the block with the given id, if any.
    pub fn get_block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(&id)
    }

    /// Returns the block created for `layer`, if any.
    pub fn block_of(&self, layer: LayerId) -> Option<&Block> {
        self.seen.get(&layer).and_then(|id| self.blocks.get(id))
    }

    /// Iterates over all blocks in creation order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    /// Returns the number of blocks, input blocks included.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns true if no block was created yet.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns the block the next connection starts from.
    pub fn last_block(&self) -> Option<BlockId> {
        self.last_block
    }

    /// Returns the palette blocks are drawn with.
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Returns the layout engine.
    pub fn layout(&self) -> &LayoutEngine {
        &self.layout
    }

    /// Removes a block and every connection it takes part in.
    ///
    /// A later event for the block's layer creates a new block. If the
    /// removed block was the last real block, the next one is placed after
    /// the real block before it.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::UnknownBlock`] if no block has this id.
    pub fn remove_block(&mut self, id: BlockId) -> Result<Block, SceneError> {
        let block = self
            .blocks
            .shift_remove(&id)
            .ok_or(SceneError::UnknownBlock(id))?;

        self.edges.retain(|edge| !edge.touches(id, &self.seen));
        self.seen.retain(|_, block_id| *block_id != id);
        if self.last_block == Some(id) {
            self.last_block = None;
        }
        let previous = self.blocks.values().rev().find(|block| !block.is_input());
        self.layout.reanchor(id, previous);

        debug!(block_id:% = id; "Block removed");
        Ok(block)
    }

    /// Adds a connection between two existing blocks.
    ///
    /// Connecting an already connected pair has no effect.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::UnknownBlock`] if either block does not exist and
    /// [`SceneError::InputDestination`] if `to` is an input block.
    pub fn connect(&mut self, from: BlockId, to: BlockId) -> Result<Connection, SceneError> {
        self.check_exists(from)?;
        let destination = self.blocks.get(&to).ok_or(SceneError::UnknownBlock(to))?;
        if destination.is_input() {
            return Err(SceneError::InputDestination(to));
        }

        self.edges.push(Edge::between(from, to));
        Ok(Connection::new(from, to))
    }

    /// Removes the connection from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::MissingConnection`] if there is no such connection.
    pub fn disconnect(&mut self, from: BlockId, to: BlockId) -> Result<Connection, SceneError> {
        let before = self.edges.len();
        self.edges
            .retain(|edge| edge.resolve(&self.seen) != Some((from, to)));

        if self.edges.len() == before {
            return Err(SceneError::MissingConnection { from, to });
        }
        Ok(Connection::new(from, to))
    }

    /// Resolves all recorded edges into connections.
    ///
    /// Edges whose endpoints never materialized are dropped. Duplicate
    /// endpoint pairs collapse to their first occurrence.
    pub fn connections(&self) -> Vec<Connection> {
        let mut resolved: IndexMap<(BlockId, BlockId), Connection> = IndexMap::new();

        for edge in &self.edges {
            let Some((source, destination)) = edge.resolve(&self.seen) else {
                warn!(edge:?; "Dropping connection to a layer without block");
                continue;
            };
            if !self.blocks.contains_key(&source) || !self.blocks.contains_key(&destination) {
                warn!(source:%, destination:%; "Dropping connection to a removed block");
                continue;
            }

            resolved
                .entry((source, destination))
                .or_insert_with(|| Connection::new(source, destination));
        }

        resolved.into_values().collect()
    }

    /// Materializes the scene.
    ///
    /// Pending events are not part of it; call [`flush`](Self::flush) first
    /// to include them.
    pub fn scene(&self) -> Scene<'_> {
        let connections = self.connections();
        debug!(blocks = self.blocks.len(), connections = connections.len(); "Scene materialized");
        Scene::new(&self.palette, self.blocks.values().collect(), connections)
    }

    fn check_exists(&self, id: BlockId) -> Result<(), SceneError> {
        if self.blocks.contains_key(&id) {
            Ok(())
        } else {
            Err(SceneError::UnknownBlock(id))
        }
    }

    fn apply_deferred_gap(&mut self) {
        if let Some(axis) = self.deferred_gap.take() {
            debug!(axis:?; "Gap added");
            self.layout.add_gap(axis);
            self.gap_pending = true;
        }
    }

    fn revisit(&mut self, layer: LayerId, existing: BlockId) {
        let existing_looped = self.blocks.get(&existing).is_some_and(Block::looped);
        let last_looped = self
            .last_block
            .and_then(|last| self.blocks.get(&last))
            .is_some_and(Block::looped);

        match self.last_block {
            Some(last) if !existing_looped && !last_looped => {
                debug!(layer:%, from:% = last, to:% = existing; "Loop closed");
                self.edges.push(Edge::between(last, existing));
                if let Some(block) = self.blocks.get_mut(&existing) {
                    block.mark_looped();
                }
            }
            _ => trace!(layer:%, block_id:% = existing; "Revisit"),
        }

        self.last_block = Some(existing);
    }

    fn realize(&mut self, event: &LayerEvent, activation: Option<&LayerEvent>) {
        let id = self.next_id;
        let shape = activation.map_or(event.output_shape(), LayerEvent::output_shape);
        let block = self
            .layout
            .create(id, event.kind, activation.is_some(), event.dim, shape);
        self.next_id = id.next();

        self.log_created(&block);
        if let Some(last) = self.last_block {
            self.edges.push(Edge::between(last, id));
        }

        self.blocks.insert(id, block);
        self.seen.insert(event.layer, id);
        if let Some(activation) = activation {
            self.seen.insert(activation.layer, id);
        }
        self.last_block = Some(id);
        self.gap_pending = false;
    }

    fn log_created(&self, block: &Block) {
        let level = if self.verbose {
            Level::Info
        } else {
            Level::Debug
        };
        log!(
            level,
            block:% = block.name(),
            dim = block.dim().get(),
            size:? = block.size().to_array();
            "Block created"
        );
    }
}
