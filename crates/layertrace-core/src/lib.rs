//! Layertrace Core Types and Definitions
//!
//! This crate provides the foundational types shared by the layertrace
//! compiler and by renderers that consume its output. It includes:
//!
//! - **Identifiers**: Opaque handles for layers, blocks and tensor storage ([`identifier`] module)
//! - **Geometry**: Three-axis vectors used for sizes, positions and scale factors ([`geometry`] module)
//! - **Colors**: Color handling with CSS color support and the block [`color::Palette`]
//! - **Block**: The scene vocabulary: blocks, connections and their kinds ([`block`] module)

pub mod block;
pub mod color;
pub mod geometry;
pub mod identifier;
