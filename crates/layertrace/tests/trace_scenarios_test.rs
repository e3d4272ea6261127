//! End-to-end traces through a fake host.

mod common;

use layertrace::{
    SceneError, TraceError, Tracer,
    block::{BlockKind, Connection, Direction},
    config::TraceConfig,
    host::NoArtifacts,
    identifier::{BlockId, LayerId},
    scene::SceneItem,
    sequence::BlockSequence,
};

use common::{RecordingSink, Tensor, chain, cnn, cnn_trace, recurrent, replay};

fn tracer() -> Tracer {
    Tracer::new(TraceConfig::default().with_image_path("out/input_{i}.png"))
}

fn kinds(sequence: &BlockSequence) -> Vec<(BlockKind, bool)> {
    sequence
        .blocks()
        .map(|block| (block.kind(), block.is_fused()))
        .collect()
}

fn edges(connections: &[Connection]) -> Vec<(u32, u32, Direction)> {
    connections
        .iter()
        .map(|c| (c.source().get(), c.destination().get(), c.direction()))
        .collect()
}

#[test]
fn test_conv_activation_pool() {
    let tracer = tracer();
    let tree = tracer.module_tree(&cnn()).unwrap();
    let mut session = tracer.session(&tree, RecordingSink::default());

    replay(&mut session, &cnn_trace()[..3]).unwrap();
    session.finish().unwrap();

    assert_eq!(
        kinds(session.sequence()),
        vec![
            (BlockKind::ImageInput, false),
            (BlockKind::Conv, true),
            (BlockKind::Pool, false),
        ]
    );

    let scene = session.scene();
    assert_eq!(
        edges(scene.connections()),
        vec![(0, 1, Direction::Forward), (1, 2, Direction::Forward)]
    );

    // One sample image, named after the input block
    assert_eq!(session.sink().saved.len(), 1);
    assert_eq!(session.sink().saved[0].0.to_str(), Some("out/input_0.png"));
    assert_eq!(session.sink().saved[0].1, [3, 32, 32]);
    assert_eq!(
        session.sequence().get_block(BlockId::new(0)).unwrap().artifact(),
        Some("input_0.png")
    );
}

#[test]
fn test_full_forward_pass() {
    let tracer = tracer();
    let tree = tracer.module_tree(&cnn()).unwrap();
    let mut session = tracer.session(&tree, NoArtifacts);

    replay(&mut session, &cnn_trace()).unwrap();
    session.finish().unwrap();

    // Flatten is ignored and the linear layer reuses its output, so no second input
    assert_eq!(
        kinds(session.sequence()),
        vec![
            (BlockKind::ImageInput, false),
            (BlockKind::Conv, true),
            (BlockKind::Pool, false),
            (BlockKind::Linear, true),
        ]
    );
    assert_eq!(
        edges(session.scene().connections()),
        vec![
            (0, 1, Direction::Forward),
            (1, 2, Direction::Forward),
            (2, 3, Direction::Forward),
        ]
    );

    let names: Vec<_> = session.sequence().blocks().map(|b| b.name()).collect();
    assert_eq!(names, ["ImgInput_0", "ConvAct_1", "Pool_2", "LinearAct_3"]);

    let ignored = session.sequence().block_of(LayerId::new(4));
    assert!(ignored.is_none());
}

#[test]
fn test_fused_layers_share_a_block() {
    let tracer = tracer();
    let tree = tracer.module_tree(&cnn()).unwrap();
    let mut session = tracer.session(&tree, NoArtifacts);

    replay(&mut session, &cnn_trace()).unwrap();
    session.finish().unwrap();

    let sequence = session.sequence();
    let conv = sequence.block_of(LayerId::new(1)).unwrap();
    let relu = sequence.block_of(LayerId::new(2)).unwrap();
    assert_eq!(conv.id(), relu.id());
}

#[test]
fn test_revisit_draws_backward_edge_from_previous_block() {
    let tracer = tracer();
    let tree = tracer.module_tree(&recurrent(&[1, 2, 3, 4, 5, 6])).unwrap();
    let mut session = tracer.session(&tree, NoArtifacts);

    // Layer 3 runs at positions 3 and 7
    replay(&mut session, &chain(&[1, 2, 3, 4, 5, 6, 3], &[1, 20])).unwrap();
    session.finish().unwrap();

    let sequence = session.sequence();
    let looped = sequence.block_of(LayerId::new(3)).unwrap();
    let previous = sequence.block_of(LayerId::new(6)).unwrap();

    // Input plus one block per distinct layer
    assert_eq!(sequence.len(), 1 + 6);
    assert!(looped.looped());

    let backward: Vec<_> = session
        .scene()
        .connections()
        .iter()
        .filter(|c| c.is_backward())
        .map(Connection::key)
        .collect();
    assert_eq!(backward, vec![(previous.id(), looped.id())]);
}

#[test]
fn test_three_visits_yield_one_backward_edge() {
    let tracer = tracer();
    let tree = tracer.module_tree(&recurrent(&[1, 2, 3, 4])).unwrap();
    let mut session = tracer.session(&tree, NoArtifacts);

    replay(&mut session, &chain(&[1, 2, 3, 2, 4, 2], &[1, 20])).unwrap();
    session.finish().unwrap();

    let scene = session.scene();
    let backward = scene.connections().iter().filter(|c| c.is_backward()).count();
    assert_eq!(backward, 1);
}

#[test]
fn test_same_shape_inserts_no_gap() {
    let tracer = tracer();
    let model = common::Module::new(
        0,
        "nets.Head",
        vec![common::Module::leaf(1, "torch.nn.modules.dropout.Dropout")],
    );
    let tree = tracer.module_tree(&model).unwrap();
    let mut session = tracer.session(&tree, NoArtifacts);

    session
        .observe(
            LayerId::new(1),
            &[Tensor::new(&[1, 64], 1)],
            &[Tensor::new(&[1, 64], 2)],
        )
        .unwrap();

    let block = session.sequence().block_of(LayerId::new(1)).unwrap();
    assert!(block.offset().is_zero());
}

#[test]
fn test_rank_change_inserts_gap() {
    let tracer = tracer();
    let model = common::Module::new(
        0,
        "nets.Encoder",
        vec![common::Module::leaf(1, "torch.nn.modules.sparse.Embedding")],
    );
    let tree = tracer.module_tree(&model).unwrap();
    let mut session = tracer.session(&tree, NoArtifacts);

    session
        .observe(
            LayerId::new(1),
            &[Tensor::new(&[1, 12], 1)],
            &[Tensor::new(&[1, 12, 32], 2)],
        )
        .unwrap();

    let block = session.sequence().block_of(LayerId::new(1)).unwrap();
    assert_eq!(block.offset().x(), tracer.config().layout().gap);
}

#[test]
fn test_activation_never_introduces_input() {
    let tracer = tracer();
    let model = common::Module::new(
        0,
        "nets.Head",
        vec![
            common::Module::leaf(1, "torch.nn.modules.linear.Linear"),
            common::Module::leaf(2, "torch.nn.modules.activation.ReLU"),
        ],
    );
    let tree = tracer.module_tree(&model).unwrap();
    let mut session = tracer.session(&tree, NoArtifacts);

    session
        .observe(
            LayerId::new(1),
            &[Tensor::new(&[1, 64], 1)],
            &[Tensor::new(&[1, 32], 2)],
        )
        .unwrap();
    // The activation reads storage nobody produced
    session
        .observe(
            LayerId::new(2),
            &[Tensor::new(&[1, 32], 99)],
            &[Tensor::new(&[1, 32], 3)],
        )
        .unwrap();
    session.finish().unwrap();

    assert_eq!(
        kinds(session.sequence()),
        vec![(BlockKind::VectorInput, false), (BlockKind::Linear, true)]
    );
}

#[test]
fn test_pool_shape_change_inserts_no_gap() {
    let tracer = tracer();
    let model = common::Module::new(
        0,
        "nets.Downsample",
        vec![common::Module::leaf(1, "torch.nn.modules.pooling.MaxPool2d")],
    );
    let tree = tracer.module_tree(&model).unwrap();
    let mut session = tracer.session(&tree, NoArtifacts);

    session
        .observe(
            LayerId::new(1),
            &[Tensor::new(&[1, 4, 8, 8], 1)],
            &[Tensor::new(&[1, 4, 4, 4], 2)],
        )
        .unwrap();

    let pool = session.sequence().block_of(LayerId::new(1)).unwrap();
    assert_eq!(pool.kind(), BlockKind::Pool);
    assert!(pool.offset().is_zero());
}

#[test]
fn test_only_first_output_is_traced() {
    let tracer = tracer();
    let tree = tracer.module_tree(&recurrent(&[1, 2])).unwrap();
    let mut session = tracer.session(&tree, NoArtifacts);

    // An LSTM returns its output together with the hidden state
    session
        .observe(
            LayerId::new(1),
            &[Tensor::new(&[1, 8, 20], 1)],
            &[Tensor::new(&[1, 8, 20], 2), Tensor::new(&[9], 50)],
        )
        .unwrap();
    session
        .observe(
            LayerId::new(2),
            &[Tensor::new(&[1, 8, 20], 2)],
            &[Tensor::new(&[1, 8, 20], 3)],
        )
        .unwrap();
    session.finish().unwrap();

    assert_eq!(
        kinds(session.sequence()),
        vec![
            (BlockKind::VectorInput, false),
            (BlockKind::Recurrent, false),
            (BlockKind::Recurrent, false),
        ]
    );
    let first = session.sequence().block_of(LayerId::new(1)).unwrap();
    assert!(first.offset().is_zero());
}

#[test]
fn test_replay_is_deterministic() {
    let tracer = tracer();
    let tree = tracer.module_tree(&cnn()).unwrap();

    let run = || {
        let mut session = tracer.session(&tree, NoArtifacts);
        replay(&mut session, &cnn_trace()).unwrap();
        session.finish().unwrap();
        session.into_sequence()
    };
    let first = run();
    let second = run();

    assert!(first.blocks().eq(second.blocks()));
    assert_eq!(first.connections(), second.connections());
    assert_eq!(first.palette(), second.palette());
}

#[test]
fn test_remove_block_keeps_unrelated_connections() {
    let tracer = tracer();
    let tree = tracer.module_tree(&cnn()).unwrap();
    let mut session = tracer.session(&tree, NoArtifacts);

    replay(&mut session, &cnn_trace()).unwrap();
    session.finish().unwrap();

    let removed = session.sequence_mut().remove_block(BlockId::new(3)).unwrap();
    assert_eq!(removed.kind(), BlockKind::Linear);

    assert_eq!(
        edges(session.scene().connections()),
        vec![(0, 1, Direction::Forward), (1, 2, Direction::Forward)]
    );
    assert!(session.sequence().get_block(BlockId::new(3)).is_none());
}

#[test]
fn test_connect_rejects_input_destination() {
    let tracer = tracer();
    let tree = tracer.module_tree(&cnn()).unwrap();
    let mut session = tracer.session(&tree, NoArtifacts);

    replay(&mut session, &cnn_trace()).unwrap();
    session.finish().unwrap();

    let sequence = session.sequence_mut();
    assert_eq!(
        sequence.connect(BlockId::new(3), BlockId::new(0)),
        Err(SceneError::InputDestination(BlockId::new(0)))
    );

    sequence.connect(BlockId::new(3), BlockId::new(1)).unwrap();
    let scene = sequence.scene();
    let last = scene.connections().last().unwrap();
    assert_eq!(last.key(), (BlockId::new(3), BlockId::new(1)));
    assert_eq!(last.direction(), Direction::Backward);
}

#[test]
fn test_unknown_type_poisons_session() {
    let tracer = tracer();
    let model = common::Module::new(
        0,
        "nets.Custom",
        vec![
            common::Module::leaf(1, "torch.nn.modules.linear.Linear"),
            common::Module::leaf(2, "nets.Mystery"),
            common::Module::leaf(3, "torch.nn.modules.dropout.Dropout"),
        ],
    );
    let tree = tracer.module_tree(&model).unwrap();
    let mut session = tracer.session(&tree, NoArtifacts);
    let events = chain(&[1, 2, 3], &[1, 8]);

    let err = replay(&mut session, &events).unwrap_err();
    match err {
        TraceError::Classification(err) => assert_eq!(err.type_name, "nets.Mystery"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(session.is_poisoned());

    let (layer, input, output) = &events[2];
    let err = session
        .observe(
            LayerId::new(*layer),
            std::slice::from_ref(input),
            std::slice::from_ref(output),
        )
        .unwrap_err();
    assert!(matches!(err, TraceError::Aborted));
    assert!(matches!(session.finish(), Err(TraceError::Aborted)));

    // The input block assembled before the failure is still there
    assert_eq!(kinds(session.sequence())[0], (BlockKind::VectorInput, false));
}

#[test]
fn test_unregistered_layer_is_rejected() {
    let tracer = tracer();
    let tree = tracer.module_tree(&cnn()).unwrap();
    let mut session = tracer.session(&tree, NoArtifacts);

    // The loss is banned, so it was never registered
    let err = session
        .observe(
            LayerId::new(11),
            &[Tensor::new(&[1, 10], 1)],
            &[Tensor::new(&[1], 2)],
        )
        .unwrap_err();
    assert!(matches!(err, TraceError::UnknownLayer(layer) if layer == LayerId::new(11)));
}

#[test]
fn test_missing_output_is_rejected() {
    let tracer = tracer();
    let tree = tracer.module_tree(&cnn()).unwrap();
    let mut session = tracer.session(&tree, NoArtifacts);

    let err = session
        .observe(LayerId::new(5), &[Tensor::new(&[1, 4096], 1)], &[])
        .unwrap_err();
    assert!(matches!(err, TraceError::MissingTensor { .. }));
}

#[test]
fn test_scene_walk_is_framed() {
    let tracer = tracer();
    let tree = tracer.module_tree(&cnn()).unwrap();
    let mut session = tracer.session(&tree, NoArtifacts);

    replay(&mut session, &cnn_trace()).unwrap();
    session.finish().unwrap();

    let scene = session.scene();
    let items: Vec<_> = (&scene).into_iter().collect();
    assert!(matches!(items.first(), Some(SceneItem::Begin(_))));
    assert!(matches!(items.last(), Some(SceneItem::End)));

    let blocks = items
        .iter()
        .filter(|item| matches!(item, SceneItem::Block(_)))
        .count();
    assert_eq!(blocks, 4);

    let graph = scene.to_graph();
    assert_eq!(graph.node_count(), 4);
    assert_eq!(graph.edge_count(), 3);
}
