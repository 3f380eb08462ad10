//! An adjacency-list link populated with the exact edge set of a local-2d
//! link must behave identically to it, in both directions, and keep
//! behaving identically after defragmentation.

use llrt::{AdjListLink, CmpId, EdgeCtx, End, LinkId, Local2dLink, Network, NodeCtx, OpOptions, Padding};
use rand::Rng;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Default)]
struct ResNode {
    local2d: f32,
    adjlist: f32,
}

struct Rig {
    net: Network,
    c1: CmpId,
    c2: CmpId,
    l2d_a: LinkId,
    l2d_b: LinkId,
    adj: LinkId,
}

fn build() -> Rig {
    let mut net = Network::new(7);
    let c1 = net.add_component::<ResNode>("c1", &[100, 100]);
    let c2 = net
        .connect_new_deduced::<f32, f32, ResNode>(
            c1,
            Local2dLink::square(3, 2, 2, Padding::Same),
            "c2",
            false,
        )
        .expect("local2d 3/2/2");
    let l2d_a = net.component(c1).unwrap().links(End::Zero)[0];
    let l2d_b = net
        .connect::<f32, f32>(c1, c2, Local2dLink::square(3, 2, 1, Padding::Same), false)
        .expect("local2d 3/2/1");
    let adj = net
        .connect::<f32, f32>(c1, c2, AdjListLink::new(), false)
        .expect("adj list");
    Rig {
        net,
        c1,
        c2,
        l2d_a,
        l2d_b,
        adj,
    }
}

/// Reshape the adjacency link's edge set to match `l2d`, copy its weights,
/// then drive both links from each end and compare per-node results.
fn check_equivalence(rig: &Rig, l2d: LinkId) {
    let net = &rig.net;

    // Edges currently in the adjacency link, unmarked.
    let mut current: BTreeMap<(usize, usize), bool> = BTreeMap::new();
    net.for_each_edge::<ResNode, f32, ResNode, f32, _>(rig.adj, End::Zero, |cx| {
        current.insert((cx.near_index, cx.far_index), false);
    })
    .expect("walk adj edges");
    let count_adj = current.len();

    // Fresh random weights on the local-2d link; remember them per node
    // pair and work out the insert/remove sets for the adjacency link.
    let mut to_insert = Vec::new();
    let mut weights: BTreeMap<(usize, usize), (f32, f32)> = BTreeMap::new();
    let mut count_edges = 0usize;
    let mut weight_sum = 0.0f32;
    net.for_each_edge::<ResNode, f32, ResNode, f32, _>(l2d, End::Zero, |cx| {
        count_edges += 1;
        *cx.edge = cx.rng.gen_range(-1.0..1.0);
        *cx.far_edge = cx.rng.gen_range(-1.0..1.0);
        weight_sum += *cx.edge * 2.0 + *cx.far_edge;
        let key = (cx.near_index, cx.far_index);
        match current.get_mut(&key) {
            Some(seen) => *seen = true,
            None => to_insert.push(key),
        }
        weights.insert(key, (*cx.edge, *cx.far_edge));
    })
    .expect("assign l2d weights");

    let to_remove: Vec<(usize, usize)> = current
        .iter()
        .filter(|(_, &seen)| !seen)
        .map(|(&k, _)| k)
        .collect();
    net.edit_adj_list(rig.adj, |adj| {
        adj.insert_edges(&to_insert);
        adj.remove_edges(&to_remove);
    })
    .expect("edit adj list");
    assert_eq!(
        count_edges,
        count_adj - to_remove.len() + to_insert.len(),
        "edge sets diverge"
    );

    // Copy the weights across and re-count.
    let mut recount = 0usize;
    let mut weight_sum_adj = 0.0f32;
    net.for_each_edge::<ResNode, f32, ResNode, f32, _>(rig.adj, End::Zero, |cx| {
        let (e, fe) = weights[&(cx.near_index, cx.far_index)];
        *cx.edge = e;
        *cx.far_edge = fe;
        weight_sum_adj += e * 2.0 + fe;
        recount += 1;
    })
    .expect("copy weights");
    assert_eq!(recount, count_edges);
    assert!((weight_sum - weight_sum_adj).abs() < 1e-3);

    // Randomize the far side, drive both links toward c2, compare.
    rig.randomize(rig.c1);
    rig.clear(rig.c2);
    rig.drive(rig.adj, End::One, false);
    rig.drive(l2d, End::One, true);
    rig.compare(rig.c2);

    // And the other direction.
    rig.randomize(rig.c2);
    rig.clear(rig.c1);
    rig.drive(rig.adj, End::Zero, false);
    rig.drive(l2d, End::Zero, true);
    rig.compare(rig.c1);
}

impl Rig {
    fn randomize(&self, cmp: CmpId) {
        self.net
            .process_cmp(
                cmp,
                &mut |cx: &mut NodeCtx<'_, ResNode>| {
                    cx.node.local2d = cx.rng.gen_range(-1.0..1.0);
                    cx.node.adjlist = cx.rng.gen_range(-1.0..1.0);
                },
                &OpOptions::parallel().kernel_name("Randomize"),
            )
            .expect("randomize");
    }

    fn clear(&self, cmp: CmpId) {
        self.net
            .process_cmp(
                cmp,
                &mut |cx: &mut NodeCtx<'_, ResNode>| {
                    cx.node.local2d = 0.0;
                    cx.node.adjlist = 0.0;
                },
                &OpOptions::parallel().kernel_name("Clear"),
            )
            .expect("clear");
    }

    /// Accumulate both edge weights against the far node's state into one
    /// of the two result fields.
    fn drive(&self, link: LinkId, end: End, into_local2d: bool) {
        let mut kernel = move |cx: &mut EdgeCtx<'_, ResNode, f32, ResNode, f32>| {
            let value = cx.far.adjlist * *cx.far_edge + cx.far.local2d * *cx.edge;
            if into_local2d {
                cx.near.local2d += value;
            } else {
                cx.near.adjlist += value;
            }
        };
        self.net
            .process_link(link, end, &mut kernel, &OpOptions::parallel().kernel_name("Drive"))
            .expect("drive link");
    }

    fn compare(&self, cmp: CmpId) {
        self.net
            .for_each_node::<ResNode, _>(cmp, |cx| {
                assert!(
                    (cx.node.adjlist - cx.node.local2d).abs() < 1e-3,
                    "node {}: adjlist {} vs local2d {}",
                    cx.index,
                    cx.node.adjlist,
                    cx.node.local2d
                );
            })
            .expect("compare");
    }
}

#[test]
fn adjacency_list_mirrors_local2d_links() {
    let rig = build();
    check_equivalence(&rig, rig.l2d_a);
    check_equivalence(&rig, rig.l2d_b);
    rig.net
        .edit_adj_list(rig.adj, |adj| adj.defragment_edges())
        .expect("defragment");
    check_equivalence(&rig, rig.l2d_a);
    rig.net
        .edit_adj_list(rig.adj, |adj| adj.defragment_edges())
        .expect("defragment");
    check_equivalence(&rig, rig.l2d_b);
}
