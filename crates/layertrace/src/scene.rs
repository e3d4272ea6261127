//! The assembled diagram, as handed to renderers.
//!
//! A [`Scene`] is an immutable snapshot of a [`BlockSequence`]: its blocks in
//! creation order and its resolved connections. Renderers walk it through
//! [`Scene::iter`], which yields:
//!
//! ```text
//! Begin(palette)  Block*  Connection*  End
//! ```
//!
//! The iteration is lazy and can be restarted any number of times.
//!
//! [`BlockSequence`]: crate::sequence::BlockSequence

use std::{collections::HashMap, iter};

use petgraph::graph::{DiGraph, NodeIndex};

use layertrace_core::{
    block::{Block, Connection, Direction},
    color::Palette,
    identifier::BlockId,
};

/// One element of a scene walk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SceneItem<'a> {
    /// Opens the scene; carries the colors renderers define up front.
    Begin(&'a Palette),
    Block(&'a Block),
    Connection(&'a Connection),
    End,
}

/// Blocks and resolved connections of one trace.
#[derive(Debug, Clone)]
pub struct Scene<'a> {
    palette: &'a Palette,
    blocks: Vec<&'a Block>,
    connections: Vec<Connection>,
}

impl<'a> Scene<'a> {
    pub(crate) fn new(
        palette: &'a Palette,
        blocks: Vec<&'a Block>,
        connections: Vec<Connection>,
    ) -> Self {
        Self {
            palette,
            blocks,
            connections,
        }
    }

    /// Returns the palette blocks are drawn with.
    pub fn palette(&self) -> &'a Palette {
        self.palette
    }

    /// Blocks in creation order.
    pub fn blocks(&self) -> impl Iterator<Item = &'a Block> + '_ {
        self.blocks.iter().copied()
    }

    /// Returns the resolved connections in discovery order.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Returns the block with the given id, if any.
    pub fn block(&self, id: BlockId) -> Option<&'a Block> {
        self.blocks.iter().copied().find(|block| block.id() == id)
    }

    /// Walks the scene from its begin marker to its end marker.
    pub fn iter(&self) -> impl Iterator<Item = SceneItem<'_>> {
        iter::once(SceneItem::Begin(self.palette))
            .chain(self.blocks.iter().copied().map(SceneItem::Block))
            .chain(self.connections.iter().map(SceneItem::Connection))
            .chain(iter::once(SceneItem::End))
    }

    /// Builds a directed graph with one node per block and one edge per
    /// connection, weighted by its direction.
    ///
    /// Nodes are added in creation order, so node `i` is the `i`-th block.
    pub fn to_graph(&self) -> DiGraph<BlockId, Direction> {
        let mut graph = DiGraph::with_capacity(self.blocks.len(), self.connections.len());
        let indices: HashMap<BlockId, NodeIndex> = self
            .blocks
            .iter()
            .map(|block| (block.id(), graph.add_node(block.id())))
            .collect();

        for connection in &self.connections {
            let (Some(&source), Some(&destination)) = (
                indices.get(&connection.source()),
                indices.get(&connection.destination()),
            ) else {
                continue;
            };
            graph.add_edge(source, destination, connection.direction());
        }

        graph
    }
}

impl<'s, 'a> IntoIterator for &'s Scene<'a> {
    type Item = SceneItem<'s>;
    type IntoIter = Box<dyn Iterator<Item = SceneItem<'s>> + 's>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use layertrace_core::{
        block::{BlockKind, Dimensionality},
        identifier::LayerId,
    };

    use super::*;
    use crate::{
        classify::Classification,
        config::LayoutConfig,
        layout::LayoutEngine,
        sequence::{BlockSequence, LayerEvent},
    };

    fn assembled() -> BlockSequence {
        let mut seq = BlockSequence::new(
            LayoutEngine::new(LayoutConfig::default(), "input_{i}.png"),
            Palette::default(),
        );
        for layer in [1, 2, 3, 2] {
            let classification = Classification {
                kind: BlockKind::Recurrent,
                dim: Some(Dimensionality::ONE),
            };
            seq.append(LayerEvent::new(LayerId::new(layer), classification, vec![32]))
                .unwrap();
        }
        seq
    }

    #[test]
    fn test_iteration_is_framed() {
        let seq = assembled();
        let scene = seq.scene();
        let items: Vec<_> = scene.iter().collect();

        assert_eq!(items.len(), 1 + 3 + 3 + 1);
        assert!(matches!(items[0], SceneItem::Begin(_)));
        assert!(matches!(items[1], SceneItem::Block(block) if block.id() == BlockId::new(0)));
        assert!(matches!(items[4], SceneItem::Connection(_)));
        assert_eq!(items[7], SceneItem::End);
    }

    #[test]
    fn test_iteration_restarts() {
        let seq = assembled();
        let scene = seq.scene();

        let first: Vec<_> = scene.iter().collect();
        let second: Vec<_> = (&scene).into_iter().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_block_lookup() {
        let seq = assembled();
        let scene = seq.scene();

        assert_eq!(scene.block(BlockId::new(2)).map(Block::kind), Some(BlockKind::Recurrent));
        assert!(scene.block(BlockId::new(3)).is_none());
        assert_eq!(scene.blocks().count(), 3);
    }

    #[test]
    fn test_to_graph() {
        let seq = assembled();
        let graph = seq.scene().to_graph();

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 3);

        let backward: Vec<_> = graph
            .edge_indices()
            .filter(|edge| graph[*edge] == Direction::Backward)
            .filter_map(|edge| graph.edge_endpoints(edge))
            .map(|(source, destination)| (graph[source], graph[destination]))
            .collect();
        assert_eq!(backward, vec![(BlockId::new(2), BlockId::new(1))]);
    }
}
