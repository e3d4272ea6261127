//! Fake host framework shared by the integration tests.

#![allow(dead_code)]

use std::{
    error::Error,
    path::{Path, PathBuf},
};

use layertrace::{
    TraceError, TraceSession,
    host::{ArtifactSink, HookHost, ImageSample, ModelNode, TensorView},
    identifier::{LayerId, StorageToken},
};

pub struct Module {
    id: u32,
    type_name: &'static str,
    children: Vec<Module>,
}

impl Module {
    pub fn new(id: u32, type_name: &'static str, children: Vec<Module>) -> Self {
        Self {
            id,
            type_name,
            children,
        }
    }

    pub fn leaf(id: u32, type_name: &'static str) -> Self {
        Self::new(id, type_name, Vec::new())
    }
}

impl ModelNode for Module {
    fn layer_id(&self) -> LayerId {
        LayerId::new(self.id)
    }

    fn type_name(&self) -> &str {
        self.type_name
    }

    fn children(&self) -> impl Iterator<Item = &Self> {
        self.children.iter()
    }
}

#[derive(Debug, Clone)]
pub struct Tensor {
    shape: Vec<usize>,
    token: u64,
    data: Vec<f32>,
}

impl Tensor {
    pub fn new(shape: &[usize], token: u64) -> Self {
        let len = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            token,
            data: vec![0.25; len],
        }
    }
}

impl TensorView for Tensor {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn storage(&self) -> StorageToken {
        StorageToken::new(self.token)
    }

    fn data(&self) -> &[f32] {
        &self.data
    }
}

/// Hook registry that remembers which observers are active.
#[derive(Debug, Default)]
pub struct FakeHost {
    next_handle: u32,
    pub active: Vec<(u32, LayerId)>,
}

impl HookHost for FakeHost {
    type Handle = u32;

    fn register(&mut self, layer: LayerId) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.active.push((handle, layer));
        handle
    }

    fn unregister(&mut self, handle: u32) {
        self.active.retain(|(active, _)| *active != handle);
    }
}

impl FakeHost {
    pub fn is_observed(&self, layer: LayerId) -> bool {
        self.active.iter().any(|(_, observed)| *observed == layer)
    }
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub saved: Vec<(PathBuf, [usize; 3])>,
}

impl ArtifactSink for RecordingSink {
    fn persist(
        &mut self,
        path: &Path,
        sample: ImageSample<'_>,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.saved
            .push((path.to_path_buf(), [sample.channels, sample.height, sample.width]));
        Ok(())
    }
}

/// Net
/// ├── Sequential
/// │   ├── Conv2d      (1)
/// │   ├── ReLU        (2)
/// │   └── MaxPool2d   (3)
/// ├── Flatten         (4)
/// ├── Linear          (5)
/// ├── ReLU            (6)
/// └── CrossEntropyLoss
pub fn cnn() -> Module {
    Module::new(
        0,
        "nets.Cnn",
        vec![
            Module::new(
                10,
                "torch.nn.modules.container.Sequential",
                vec![
                    Module::leaf(1, "torch.nn.modules.conv.Conv2d"),
                    Module::leaf(2, "torch.nn.modules.activation.ReLU"),
                    Module::leaf(3, "torch.nn.modules.pooling.MaxPool2d"),
                ],
            ),
            Module::leaf(4, "torch.nn.modules.flatten.Flatten"),
            Module::leaf(5, "torch.nn.modules.linear.Linear"),
            Module::leaf(6, "torch.nn.modules.activation.ReLU"),
            Module::leaf(11, "torch.nn.modules.loss.CrossEntropyLoss"),
        ],
    )
}

/// One forward pass through [`cnn`] as `(layer, input, output)` events.
pub fn cnn_trace() -> Vec<(u32, Tensor, Tensor)> {
    vec![
        (1, Tensor::new(&[1, 3, 32, 32], 100), Tensor::new(&[1, 16, 32, 32], 101)),
        (2, Tensor::new(&[1, 16, 32, 32], 101), Tensor::new(&[1, 16, 32, 32], 102)),
        (3, Tensor::new(&[1, 16, 32, 32], 102), Tensor::new(&[1, 16, 16, 16], 103)),
        (4, Tensor::new(&[1, 16, 16, 16], 103), Tensor::new(&[1, 4096], 104)),
        (5, Tensor::new(&[1, 4096], 104), Tensor::new(&[1, 10], 105)),
        (6, Tensor::new(&[1, 10], 105), Tensor::new(&[1, 10], 106)),
    ]
}

/// Feeds `events` into `session`, stopping at the first error.
pub fn replay<S: ArtifactSink>(
    session: &mut TraceSession<S>,
    events: &[(u32, Tensor, Tensor)],
) -> Result<(), TraceError> {
    for (layer, input, output) in events {
        session.observe(
            LayerId::new(*layer),
            std::slice::from_ref(input),
            std::slice::from_ref(output),
        )?;
    }
    Ok(())
}

/// A flat model of recurrent cells with the given ids.
pub fn recurrent(ids: &[u32]) -> Module {
    Module::new(
        0,
        "nets.Recurrent",
        ids.iter()
            .map(|id| Module::leaf(*id, "torch.nn.modules.rnn.LSTM"))
            .collect(),
    )
}

/// Events for visiting `layers` in order, each consuming the previous output.
pub fn chain(layers: &[u32], shape: &[usize]) -> Vec<(u32, Tensor, Tensor)> {
    layers
        .iter()
        .enumerate()
        .map(|(i, layer)| {
            let token = i as u64;
            (*layer, Tensor::new(shape, token), Tensor::new(shape, token + 1))
        })
        .collect()
}
