//! Layertrace - Turns an execution trace of a layered model into a diagram scene.
//!
//! The host framework runs the model; layertrace only watches. Observers are
//! registered on the model's leaf layers, every layer execution is reported
//! back to a [`TraceSession`], and the session assembles blocks and
//! connections that a renderer walks as a [`Scene`](scene::Scene).
//!
//! # Pipeline
//!
//! 1. [`Tracer::module_tree`] flattens the model's submodule tree.
//! 2. [`Tracer::attach`] registers one observer per traced layer.
//! 3. The host calls [`TraceSession::observe`] after each layer executes.
//! 4. [`TraceSession::finish`] realizes buffered events, then
//!    [`TraceSession::scene`] materializes the result.

pub mod classify;
pub mod config;
pub mod graph;
pub mod host;
pub mod layout;
pub mod scene;
pub mod sequence;

mod error;
mod trace;

pub use layertrace_core::{block, color, geometry, identifier};

pub use error::{
    ClassificationError, ConfigError, SceneError, ShapeComparisonError, TensorRole, TraceError,
};
pub use trace::TraceSession;

use log::{info, warn};

use layertrace_core::color::Palette;

use config::TraceConfig;
use graph::ModuleTree;
use host::{ArtifactSink, HookHost, ModelNode};

/// Builder for trace sessions.
///
/// # Examples
///
/// ```rust,no_run
/// # use layertrace::{Tracer, config::TraceConfig, host::{HookHost, ModelNode, NoArtifacts}};
/// # fn run(model: &impl ModelNode, host: &mut impl HookHost) {
/// let tracer = Tracer::new(TraceConfig::default());
///
/// let tree = tracer.module_tree(model).expect("model is excluded");
/// let registration = tracer.attach(host, &tree);
/// let mut session = tracer.session(&tree, NoArtifacts);
///
/// // ... run the model, forwarding every callback to `session.observe` ...
///
/// registration.detach(host);
/// session.finish().expect("trace failed");
/// for item in &session.scene() {
///     println!("{item:?}");
/// }
/// # }
/// ```
#[derive(Debug, Default)]
pub struct Tracer {
    config: TraceConfig,
}

impl Tracer {
    /// Creates a tracer with the given configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Graph, classification, layout and style settings
    pub fn new(config: TraceConfig) -> Self {
        Self { config }
    }

    /// Returns the trace configuration.
    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Builds the flattened module tree of `root`.
    ///
    /// Returns `None` if the root itself is excluded.
    pub fn module_tree<M: ModelNode>(&self, root: &M) -> Option<ModuleTree> {
        info!(root = root.type_name(); "Building module tree");
        ModuleTree::build(root, self.config.graph())
    }

    /// Registers an observer for every traced layer of `tree`, breadth-first.
    pub fn attach<H: HookHost>(&self, host: &mut H, tree: &ModuleTree) -> Registration<H::Handle> {
        let handles: Vec<_> = tree.traced().map(|node| host.register(node.id())).collect();
        info!(observers = handles.len(); "Observers attached");
        Registration { handles }
    }

    /// Starts a trace session for the layers of `tree`.
    ///
    /// An invalid palette in the style configuration falls back to the
    /// default palette.
    pub fn session<S: ArtifactSink>(&self, tree: &ModuleTree, sink: S) -> TraceSession<S> {
        let palette = self.config.style().palette().unwrap_or_else(|err| {
            warn!(err = err.as_str(); "Invalid style, using default palette");
            Palette::default()
        });
        TraceSession::new(tree, &self.config, palette, sink)
    }
}

/// Observer handles returned by [`Tracer::attach`].
#[derive(Debug)]
#[must_use = "dropping a registration leaves the observers attached"]
pub struct Registration<H> {
    handles: Vec<H>,
}

impl<H> Registration<H> {
    /// Returns the number of attached observers.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns true if no observer was attached.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Unregisters every observer.
    ///
    /// Safe to call mid-trace; the session keeps what it assembled so far.
    pub fn detach<Host: HookHost<Handle = H>>(self, host: &mut Host) {
        let count = self.handles.len();
        for handle in self.handles {
            host.unregister(handle);
        }
        info!(observers = count; "Observers detached");
    }
}
