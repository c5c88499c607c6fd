use fragvm::{
    software::{SoftwareBackend, ThreadStorage, execute_fragment},
    *,
};
use pretty_assertions::assert_eq;
use std::{
    collections::HashMap,
    sync::{Arc, Barrier},
    thread,
};

fn build(stage: Stage, ops: &[(&str, Vec<Arg<'_>>)]) -> Program {
    let mut program = Program::new(stage);
    for (op, args) in ops {
        program.push(op, args.iter().cloned()).unwrap();
    }
    program.seal().unwrap();
    program
}

fn shade(program: &mut Program, ctx: FragmentContext) -> (bool, FragmentContext) {
    let mut ctx = ctx;
    let valid = program.with_registers(|p, regs| execute_fragment(p, &mut ctx, regs));
    (valid, ctx)
}

/// writing each lane of the color separately yields opaque red
#[test]
fn opaque_red() {
    let mut program = build(
        Stage::Fragment,
        &[
            ("=", vec!["fragRGBA.x".into(), 1.0.into()]),
            ("=", vec!["fragRGBA.y".into(), 0.0.into()]),
            ("=", vec!["fragRGBA.z".into(), 0.0.into()]),
            ("=", vec!["fragRGBA.q".into(), 1.0.into()]),
        ],
    );

    for (x, y) in [(0.0, 0.0), (13.0, 7.0), (-4.0, 1000.0)] {
        let (valid, ctx) = shade(&mut program, FragmentContext::new(x, y));
        assert!(valid);
        assert_eq!(ctx.output, FragmentOutput::Rgb);
        assert_eq!(ctx.rgba8(), [255, 0, 0, 255]);
    }
}

/// `discard` ends the invocation and leaves the color untouched
#[test]
fn discard_on_negative_x() {
    let mut program = build(
        Stage::Fragment,
        &[
            ("if", vec!["fragX".into(), "<".into(), 0.0.into()]),
            ("discard", vec![]),
            ("end", vec![]),
            ("=", vec!["fragColor".into(), [0.0, 1.0, 0.0, 1.0].into()]),
        ],
    );

    let (valid, ctx) = shade(&mut program, FragmentContext::new(-1.0, 0.0));
    assert!(!valid);
    assert_eq!(ctx.color, FragmentContext::new(-1.0, 0.0).color);

    let (valid, ctx) = shade(&mut program, FragmentContext::new(5.0, 0.0));
    assert!(valid);
    assert_eq!(ctx.color, Vec4::new(0.0, 1.0, 0.0, 1.0));
}

/// a program without branches gives the same output as the same instructions
/// wrapped in always-true conditionals
#[test]
fn fast_path_matches_branching_path() {
    let body: Vec<(&str, Vec<Arg>)> = vec![
        ("=", vec!["c".into(), "txCoordi".into()]),
        ("*=", vec!["c.xy".into(), 0.125.into()]),
        ("=", vec!["k".into(), 0.5.into()]),
        ("sin", vec!["c.x".into(), "c.x".into()]),
        ("pow", vec!["c.y".into(), "c.y".into(), "k".into()]),
        ("+=", vec!["c.z".into(), "fragY".into()]),
        ("=", vec!["fragColor".into(), "c".into()]),
    ];

    let mut fast = build(Stage::Fragment, &body);
    assert!(!fast.has_branches());

    let mut wrapped: Vec<(&str, Vec<Arg>)> = vec![];
    for op in &body {
        wrapped.push(("if", vec!["fragX".into(), ">=".into(), (-1.0).into()]));
        wrapped.push(op.clone());
        wrapped.push(("end", vec![]));
    }
    let mut slow = build(Stage::Fragment, &wrapped);
    assert!(slow.has_branches());

    for i in 0..64 {
        let ctx = FragmentContext::new((i % 8) as f32, (i / 8) as f32);
        let (a_valid, a) = shade(&mut fast, ctx);
        let (b_valid, b) = shade(&mut slow, ctx);
        assert_eq!(a_valid, b_valid);
        assert_eq!(a.color.to_array().map(f32::to_bits), b.color.to_array().map(f32::to_bits));
    }
}

/// exactly one branch of every nested block runs, control resumes after `end`
#[test]
fn nested_blocks_pick_one_branch() {
    const DEPTH: usize = 4;
    let then_marker = |k: usize| (1u32 << (2 * k)) as f32;
    let else_marker = |k: usize| (1u32 << (2 * k + 1)) as f32;
    let resume_marker = |k: usize| (1u32 << (2 * DEPTH + k)) as f32;

    // level k nests inside the `then` arm of level k - 1
    let mut ops: Vec<(&str, Vec<Arg>)> = vec![("=", vec!["m".into(), 0.0.into()])];
    for k in 0..DEPTH {
        ops.push(("if", vec!["fragX".into(), ">".into(), (k as f32 + 1.0).into()]));
        ops.push(("+=", vec!["m".into(), then_marker(k).into()]));
    }
    for k in (0..DEPTH).rev() {
        ops.push(("else", vec![]));
        ops.push(("+=", vec!["m".into(), else_marker(k).into()]));
        ops.push(("end", vec![]));
        ops.push(("+=", vec!["m".into(), resume_marker(k).into()]));
    }
    ops.push(("=", vec!["fragColor.x".into(), "m".into()]));
    let mut program = build(Stage::Fragment, &ops);

    for x in [0.5, 1.5, 2.5, 3.5, 100.0] {
        let taken = (0..DEPTH).take_while(|&k| x > k as f32 + 1.0).count();
        let mut expected = 0.0;
        for k in 0..taken {
            expected += then_marker(k);
        }
        if taken < DEPTH {
            expected += else_marker(taken);
        }
        for k in 0..(taken + 1).min(DEPTH) {
            expected += resume_marker(k);
        }

        let (valid, ctx) = shade(&mut program, FragmentContext::new(x, 0.0));
        assert!(valid);
        assert_eq!(ctx.color.x, expected, "x = {x}");
    }
}

/// full writes round-trip and partial writes never touch other lanes
#[test]
fn lane_writes() {
    let mut program = build(
        Stage::Fragment,
        &[
            ("=", vec!["v".into(), [0.1, 0.2, 0.3, 0.4].into()]),
            ("=", vec!["w".into(), "v".into()]),
            ("=", vec!["p".into(), [9.0, 9.0, 7.0, 8.0].into()]),
            ("=", vec!["p.xy".into(), "v".into()]),
            ("=", vec!["fragColor".into(), "p".into()]),
        ],
    );

    let (_, ctx) = shade(&mut program, FragmentContext::new(0.0, 0.0));
    assert_eq!(program.value("w"), Some(Value::Vec(Vec4::new(0.1, 0.2, 0.3, 0.4))));
    assert_eq!(ctx.color, Vec4::new(0.1, 0.2, 7.0, 8.0));

    let (_, again) = shade(&mut program, FragmentContext::new(0.0, 0.0));
    assert_eq!(again.color, ctx.color);
}

/// a single lane written to the whole color lands in x and leaves alpha opaque
#[test]
fn single_lane_to_color() {
    let mut program = build(
        Stage::Fragment,
        &[
            ("=", vec!["v".into(), [0.1, 0.2, 0.3, 0.4].into()]),
            ("=", vec!["fragColor".into(), 0.0.into()]),
            ("=", vec!["fragColor".into(), "v.z".into()]),
        ],
    );

    let (valid, ctx) = shade(&mut program, FragmentContext::new(0.0, 0.0));
    assert!(valid);
    assert_eq!(ctx.color, Vec4::new(0.3, 0.0, 0.0, 1.0));
}

/// the two-weight and three-weight interpolation scenarios
#[test]
fn interpolated_attribute() {
    let vai = Arc::new(Interpolator::new(vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0], 2, AttribMode::PrimitiveVertex).unwrap());
    let mut program = build(
        Stage::Fragment,
        &[
            ("=", vec!["fragColor".into(), 0.0.into()]),
            ("=", vec!["fragColor.xy".into(), Arg::interp(vai)]),
        ],
    );

    let ctx = FragmentContext::new(0.0, 0.0).with_barycentric([0.5, 0.25, 0.25]);
    let (valid, ctx) = shade(&mut program, ctx);
    assert!(valid);
    assert_eq!(ctx.color, Vec4::new(0.25, 0.25, 0.0, 0.0));

    // out of range primitive: no contribution, the fragment still runs
    let ctx = FragmentContext::new(0.0, 0.0).with_primitive(PrimitiveType::Triangles, 5, [0, 1, 2]);
    let (valid, ctx) = shade(&mut program, ctx);
    assert!(valid);
    assert_eq!(ctx.color, Vec4::ZERO);
}

/// vertex programs read attributes and transform positions with a matrix
#[test]
fn vertex_transform() {
    let offsets = Arc::new(VertexAttrib::new(vec![0.0, 0.0, 1.0, 1.0], 2, AttribMode::VertexIndex).unwrap());
    let matrix: Arc<dyn Transform> = Arc::new(Matrix4::translation(10.0, 0.0, 0.0));
    let mut program = build(
        Stage::Vertex,
        &[
            ("=", vec!["vertexOut".into(), "vertex".into()]),
            ("+=", vec!["vertexOut.xy".into(), Arg::attrib(offsets)]),
            ("*=", vec!["vertexOut".into(), Arg::matrix(matrix)]),
        ],
    );

    let mut ctx = VertexContext::new(Vec4::new(1.0, 2.0, 0.0, 1.0)).with_index(0, 1, 1);
    let valid = program.with_registers(|p, regs| software::execute_vertex(p, &mut ctx, regs));
    assert!(valid);
    assert_eq!(ctx.out_vertex, Vec4::new(12.0, 3.0, 0.0, 1.0));
}

/// goto targets held in uniforms are checked when uniforms are pushed
#[test]
fn uniform_goto() {
    let mut program = build(
        Stage::Fragment,
        &[
            ("=", vec!["fragColor".into(), 0.0.into()]),
            ("goto", vec![".entry".into()]),
            ("=", vec!["fragColor.x".into(), 1.0.into()]),
            ("=", vec!["fragColor.y".into(), 1.0.into()]),
        ],
    );

    let mut uniforms = HashMap::new();
    uniforms.insert("entry".to_string(), Value::Int(4));
    program.update_uniforms(&uniforms).unwrap();
    assert_eq!(shade(&mut program, FragmentContext::new(0.0, 0.0)).1.color, Vec4::new(0.0, 1.0, 0.0, 0.0));

    uniforms.insert("entry".to_string(), Value::Int(3));
    program.update_uniforms(&uniforms).unwrap();
    assert_eq!(shade(&mut program, FragmentContext::new(0.0, 0.0)).1.color, Vec4::new(1.0, 1.0, 0.0, 0.0));

    uniforms.insert("entry".to_string(), Value::Int(9));
    assert!(program.update_uniforms(&uniforms).is_err());
    assert!(!shade(&mut program, FragmentContext::new(0.0, 0.0)).0);
}

/// the same program on several threads, each with its own snapshot, gives the
/// results of a sequential run
#[test]
fn threads_do_not_share_variables() {
    let program = build(
        Stage::Fragment,
        &[
            ("=", vec!["acc".into(), 0.0.into()]),
            ("+=", vec!["acc".into(), "fragX".into()]),
            ("*=", vec!["acc".into(), "fragY".into()]),
            ("=", vec!["fragColor.x".into(), "acc".into()]),
        ],
    );

    let threads = 4;
    let storage = ThreadStorage::new(threads);
    let checked_out = Barrier::new(threads);
    let fragments = |t: usize| (0..200).map(move |i| FragmentContext::new(i as f32, t as f32 + 1.0));

    let expected: Vec<Vec<f32>> = (0..threads)
        .map(|t| {
            let mut regs = program.registers().clone();
            fragments(t)
                .map(|mut f| {
                    execute_fragment(&program, &mut f, &mut regs);
                    f.color.x
                })
                .collect()
        })
        .collect();

    let results: Vec<Vec<f32>> = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let (program, storage, checked_out) = (&program, &storage, &checked_out);
                s.spawn(move || {
                    storage.init(program, t, false);
                    // every thread holds its own snapshot from here on
                    checked_out.wait();
                    let out = fragments(t)
                        .map(|mut f| {
                            storage.run_fragment(program, &mut f, t);
                            f.color.x
                        })
                        .collect::<Vec<_>>();
                    storage.init(program, t, true);
                    out
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results, expected);
    assert_eq!(storage.pool().idle(), threads);
}

/// batches through the backend report how many fragments stayed valid
#[test]
fn backend_counts_valid_fragments() {
    let mut backend = SoftwareBackend::with_config(software::DispatchConfig { threads: 3, span: 16 });
    let id = backend
        .create_program(build(
            Stage::Fragment,
            &[
                ("if", vec!["fragOdd".into(), "==".into(), true.into()]),
                ("discard", vec![]),
                ("end", vec![]),
                ("=", vec!["fragColor".into(), 1.0.into()]),
            ],
        ))
        .unwrap();

    let mut frags: Vec<_> = (0..100).map(|i| FragmentContext::new(0.0, i as f32)).collect();
    assert_eq!(backend.draw_fragments(id, &mut frags), 50);
    assert!(frags.iter().all(|f| f.is_valid() != f.odd));
}
