//! Fixed-vector checks for each link pattern: a weighted edge-sum kernel
//! against hand-computed outputs, from both ends and under both inline and
//! parallel execution.

use llrt::{DenseLink, EdgeCtx, End, LinkId, Local2dLink, Network, OpOptions, SameLink};

fn edge_sum(cx: &mut EdgeCtx<'_, f32, f32, f32, f32>) {
    *cx.near += *cx.edge * *cx.far;
}

struct Fixture {
    net: Network,
    link: LinkId,
    out: llrt::CmpId,
}

/// Two components joined by `kind`; inputs at one end, weights on the
/// near end being processed.
fn fixture(
    workers: usize,
    kind: impl Into<llrt::LinkKind>,
    in_dims: &[usize],
    out_dims: &[usize],
    inputs: &[f32],
    weights: &[f32],
    near: End,
) -> Fixture {
    let mut net = Network::new(workers);
    let a = net.add_component::<f32>("in", in_dims);
    let b = net.add_component::<f32>("out", out_dims);
    let (c0, c1) = match near {
        End::One => (a, b),
        End::Zero => (b, a),
    };
    let link = net.connect::<f32, f32>(c0, c1, kind, false).expect("connect");
    let input_cmp = a;
    net.write_nodes(input_cmp, inputs).expect("write inputs");
    net.write_edges(link, near, weights).expect("write weights");
    Fixture { net, link, out: b }
}

fn run(fixture: &Fixture, near: End, opts: &OpOptions<fn(&mut EdgeCtx<'_, f32, f32, f32, f32>)>) -> Vec<f32> {
    let mut k: fn(&mut EdgeCtx<'_, f32, f32, f32, f32>) = edge_sum;
    fixture
        .net
        .process_link(fixture.link, near, &mut k, opts)
        .expect("process");
    fixture.net.read_nodes::<f32>(fixture.out).expect("read out")
}

#[test]
fn dense_forward() {
    let f = fixture(
        8,
        DenseLink::new(),
        &[3],
        &[2],
        &[7.0, 8.0, 9.0],
        &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        End::One,
    );
    assert_eq!(run(&f, End::One, &OpOptions::inline()), vec![50.0, 122.0]);
}

#[test]
fn dense_transpose() {
    let f = fixture(
        8,
        DenseLink::new(),
        &[2],
        &[3],
        &[7.0, 8.0],
        &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        End::Zero,
    );
    assert_eq!(run(&f, End::Zero, &OpOptions::inline()), vec![23.0, 53.0, 83.0]);
}

#[test]
fn dense_parallel_matches_inline() {
    let inputs: Vec<f32> = (0..40).map(|i| (i % 7) as f32 - 3.0).collect();
    let weights: Vec<f32> = (0..40 * 30).map(|i| ((i * 13) % 11) as f32 - 5.0).collect();
    let inline = {
        let f = fixture(0, DenseLink::new(), &[40], &[30], &inputs, &weights, End::One);
        run(&f, End::One, &OpOptions::inline())
    };
    let parallel = {
        let f = fixture(4, DenseLink::new(), &[40], &[30], &inputs, &weights, End::One);
        run(&f, End::One, &OpOptions::parallel())
    };
    // Chunks split between whole near nodes, so each output is accumulated
    // in the same order and the results match bitwise.
    assert_eq!(inline, parallel);
}

#[test]
fn same_link_is_elementwise() {
    let f = fixture(
        8,
        SameLink::new(),
        &[2, 3],
        &[2, 3],
        &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        &[10.0, 20.0, 30.0, 40.0, 50.0, 60.0],
        End::One,
    );
    assert_eq!(
        run(&f, End::One, &OpOptions::inline()),
        vec![10.0, 40.0, 90.0, 160.0, 250.0, 360.0]
    );
}

const GRID3: [f32; 9] = [1.0, 3.0, 5.0, 0.0, 2.0, 7.0, 6.0, 7.0, 1.0];

const LOCAL3_WEIGHTS: [f32; 81] = [
    8.0, 6.0, 0.0, 5.0, 9.0, 7.0, 1.0, 1.0, 9.0, 3.0, 8.0, 9.0, 3.0, 9.0, 3.0, 3.0, 10.0, 0.0,
    2.0, 1.0, 9.0, 8.0, 10.0, 6.0, 0.0, 1.0, 3.0, 1.0, 6.0, 5.0, 6.0, 1.0, 0.0, 7.0, 6.0, 5.0,
    5.0, 0.0, 1.0, 6.0, 8.0, 2.0, 5.0, 3.0, 9.0, 4.0, 8.0, 3.0, 7.0, 3.0, 10.0, 4.0, 9.0, 3.0,
    10.0, 1.0, 7.0, 8.0, 4.0, 3.0, 8.0, 3.0, 6.0, 10.0, 2.0, 8.0, 6.0, 4.0, 7.0, 10.0, 10.0, 3.0,
    2.0, 2.0, 9.0, 1.0, 6.0, 6.0, 4.0, 9.0, 2.0,
];

// The same weights positioned for an end-0 iteration, zero-padded where the
// filter leaves the grid.
const LOCAL3_WEIGHTS_SWAPPED: [f32; 81] = [
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 8.0, 3.0, 9.0, 9.0, 3.0, 3.0, 10.0, 0.0,
    0.0, 6.0, 6.0, 5.0, 1.0, 7.0, 0.0, 6.0, 0.0, 0.0, 1.0, 8.0, 9.0, 10.0, 0.0, 6.0, 1.0, 0.0,
    0.0, 0.0, 6.0, 1.0, 8.0, 5.0, 2.0, 3.0, 0.0, 0.0, 1.0, 8.0, 7.0, 4.0, 8.0, 3.0, 3.0, 0.0,
    0.0, 8.0, 7.0, 3.0, 3.0, 4.0, 10.0, 9.0, 0.0, 0.0, 2.0, 6.0, 8.0, 4.0, 10.0, 7.0, 10.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
];

const LOCAL3_EXPECTED: [f32; 9] = [53.0, 107.0, 66.0, 92.0, 112.0, 119.0, 82.0, 100.0, 117.0];

fn radius_link(radius: usize, stride: usize, atrous: usize) -> Local2dLink {
    let start = -((radius * atrous) as i64);
    let side = radius * 2 + 1;
    Local2dLink::with_params(start, start, side, side, stride, stride, atrous, atrous)
}

#[test]
fn local2d_same_padding() {
    let f = fixture(
        8,
        radius_link(1, 1, 1),
        &[3, 3],
        &[3, 3],
        &GRID3,
        &LOCAL3_WEIGHTS,
        End::One,
    );
    assert_eq!(run(&f, End::One, &OpOptions::inline()), LOCAL3_EXPECTED);
}

#[test]
fn local2d_swapped_axon_reproduces_output() {
    // Processing from end 0 with the zero-padded weight layout must give
    // the same result as the end-1 iteration above.
    let f = fixture(
        8,
        radius_link(1, 1, 1),
        &[3, 3],
        &[3, 3],
        &GRID3,
        &LOCAL3_WEIGHTS_SWAPPED,
        End::Zero,
    );
    assert_eq!(run(&f, End::Zero, &OpOptions::inline()), LOCAL3_EXPECTED);
}

#[test]
fn local2d_strided() {
    let f = fixture(
        8,
        radius_link(1, 2, 1),
        &[4, 4],
        &[2, 2],
        &[5.0, 2.0, 6.0, 5.0, 10.0, 5.0, 6.0, 9.0, 0.0, 9.0, 0.0, 8.0, 10.0, 4.0, 6.0, 0.0],
        &[
            5.0, 0.0, 7.0, 1.0, 4.0, 9.0, 6.0, 5.0, 1.0, 4.0, 4.0, 8.0, 10.0, 1.0, 6.0, 5.0, 6.0,
            4.0, 0.0, 7.0, 9.0, 3.0, 4.0, 6.0, 3.0, 9.0, 7.0, 2.0, 8.0, 5.0, 6.0, 1.0, 5.0, 6.0,
            7.0, 4.0,
        ],
        End::One,
    );
    assert_eq!(run(&f, End::One, &OpOptions::inline()), vec![67.0, 169.0, 208.0, 217.0]);
}

#[test]
fn local2d_parallel_matches_inline() {
    let inputs: Vec<f32> = (0..12 * 10).map(|i| ((i * 7) % 13) as f32 - 6.0).collect();
    let weights: Vec<f32> = (0..12 * 10 * 9).map(|i| ((i * 5) % 9) as f32 - 4.0).collect();
    let inline = {
        let f = fixture(0, radius_link(1, 1, 1), &[12, 10], &[12, 10], &inputs, &weights, End::One);
        run(&f, End::One, &OpOptions::inline())
    };
    let parallel = {
        let f = fixture(4, radius_link(1, 1, 1), &[12, 10], &[12, 10], &inputs, &weights, End::One);
        run(&f, End::One, &OpOptions::parallel())
    };
    assert_eq!(inline, parallel);
}

#[test]
fn bad_dimensions_are_rejected() {
    let mut net = Network::new(0);
    let a = net.add_component::<f32>("a", &[4]);
    let b = net.add_component::<f32>("b", &[5]);
    let err = net
        .connect::<f32, f32>(a, b, SameLink::new(), false)
        .unwrap_err();
    assert!(matches!(err, llrt::Error::Topology(_)));

    // Edge kernels alias near and far data over one array on a loop link.
    let err = net
        .connect::<f32, f32>(a, a, DenseLink::new(), false)
        .unwrap_err();
    assert!(matches!(err, llrt::Error::Topology(_)));

    // Local2d with Same padding requires the strided size downstream.
    let c = net.add_component::<f32>("c", &[10, 10]);
    let d = net.add_component::<f32>("d", &[6, 6]);
    assert!(net
        .connect::<f32, f32>(c, d, llrt::Local2dLink::square(3, 2, 1, llrt::Padding::Same), false)
        .is_err());
}
