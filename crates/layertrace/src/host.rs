//! Collaborator traits implemented by the host evaluation framework.
//!
//! Layertrace never executes a model itself. The host exposes:
//!
//! - its module tree through [`ModelNode`],
//! - a hook registry through [`HookHost`],
//! - tensors through [`TensorView`],
//! - and, optionally, a place to persist sample input images through
//!   [`ArtifactSink`].

use std::{error::Error, path::Path};

use layertrace_core::identifier::{LayerId, StorageToken};

/// One submodule of the host model.
pub trait ModelNode {
    /// Stable handle of this submodule. Must be unique within the model.
    fn layer_id(&self) -> LayerId;

    /// Fully qualified type name, e.g. `torch.nn.modules.conv.Conv2d`.
    fn type_name(&self) -> &str;

    /// Direct children in declaration order.
    fn children(&self) -> impl Iterator<Item = &Self>;
}

/// Registry of per-layer observers.
///
/// Once a layer is registered, the host is expected to call
/// [`TraceSession::observe`](crate::TraceSession::observe) after every
/// execution of that layer, in execution order.
pub trait HookHost {
    /// Token returned by [`register`](HookHost::register) to undo it.
    type Handle;

    fn register(&mut self, layer: LayerId) -> Self::Handle;

    fn unregister(&mut self, handle: Self::Handle);
}

/// Read-only view of a tensor produced or consumed by a layer.
pub trait TensorView {
    /// Shape as an ordered sequence of positive extents.
    fn shape(&self) -> &[usize];

    /// Token identifying the buffer behind this tensor.
    fn storage(&self) -> StorageToken;

    /// Raw row-major contents. Only read to persist sample input images.
    fn data(&self) -> &[f32];
}

/// A single `channels x height x width` image taken from an input tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageSample<'a> {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub data: &'a [f32],
}

impl<'a> ImageSample<'a> {
    /// Takes the first image out of a tensor of rank 4 or more.
    ///
    /// Returns `None` for lower ranks, for shapes whose sample size overflows
    /// `usize`, or when the tensor holds less data than its shape promises.
    pub fn first_of(tensor: &'a impl TensorView) -> Option<Self> {
        let shape = tensor.shape();
        if shape.len() < 4 {
            return None;
        }

        let &[channels, height, width] = &shape[shape.len() - 3..] else {
            return None;
        };
        let len = channels.checked_mul(height)?.checked_mul(width)?;
        let data = tensor.data().get(..len)?;

        Some(Self {
            channels,
            height,
            width,
            data,
        })
    }
}

/// Destination for sample input images.
pub trait ArtifactSink {
    /// Persists `sample` at `path`.
    fn persist(
        &mut self,
        path: &Path,
        sample: ImageSample<'_>,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// An [`ArtifactSink`] that discards every sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoArtifacts;

impl ArtifactSink for NoArtifacts {
    fn persist(
        &mut self,
        _path: &Path,
        _sample: ImageSample<'_>,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}
