use criterion::{criterion_group, criterion_main, Criterion};
use llrt::{DenseLink, EdgeCtx, End, LinkId, Network, NodeCtx, OpOptions};

const SIZE: usize = 300;

fn make_net(workers: usize) -> (Network, LinkId) {
    let mut net = Network::new(workers);
    let a = net.add_component::<f32>("a", &[SIZE]);
    let b = net.add_component::<f32>("b", &[SIZE]);
    let link = net.connect::<(), f32>(a, b, DenseLink::new(), false).unwrap();
    net.write_nodes(a, &vec![1.0f32; SIZE]).unwrap();
    net.write_edges(link, End::One, &vec![0.5f32; SIZE * SIZE]).unwrap();
    (net, link)
}

fn edge_sum(cx: &mut EdgeCtx<'_, f32, f32, f32, ()>) {
    *cx.near += *cx.edge * *cx.far;
}

fn bench_edge_sum(c: &mut Criterion) {
    let mut group = c.benchmark_group("dense_edge_sum");

    let (inline_net, inline_link) = make_net(0);
    group.bench_function("inline", |b| {
        b.iter(|| {
            let mut k: fn(&mut EdgeCtx<'_, f32, f32, f32, ()>) = edge_sum;
            inline_net
                .process_link(inline_link, End::One, &mut k, &OpOptions::inline())
                .unwrap();
        })
    });

    let (par_net, par_link) = make_net(4);
    group.bench_function("parallel_4", |b| {
        b.iter(|| {
            let mut k: fn(&mut EdgeCtx<'_, f32, f32, f32, ()>) = edge_sum;
            par_net
                .process_link(par_link, End::One, &mut k, &OpOptions::parallel())
                .unwrap();
        })
    });

    group.finish();
}

fn bench_node_update(c: &mut Criterion) {
    let mut net = Network::new(4);
    let cmp = net.add_component::<f32>("nodes", &[200_000]);
    c.bench_function("node_update_parallel", |b| {
        b.iter(|| {
            net.process_cmp(
                cmp,
                &mut |cx: &mut NodeCtx<'_, f32>| *cx.node = cx.node.mul_add(0.99, 0.01),
                &OpOptions::parallel(),
            )
            .unwrap();
        })
    });
}

criterion_group!(throughput, bench_edge_sum, bench_node_update);
criterion_main!(throughput);
