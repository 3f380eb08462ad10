//! llrt demo driver: an integrate-and-fire feedback network.
//!
//! Two dense-linked populations feed each other; every step the neurons
//! decay, take external input, sum weighted activations from their
//! dendrites, and fire stochastically. Run it to eyeball throughput, or
//! with `--trace` to dump a chrome://tracing timeline of the chunk
//! schedule.

use clap::{Parser, Subcommand};
use llrt::{DenseLink, EdgeCtx, NetConfig, Network, NodeCtx, OpOptions, Result};
use rand::Rng;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "llrt")]
#[command(about = "llrt: parallel kernel execution over component networks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the integrate-and-fire demo network
    Run {
        /// Worker threads (0 runs inline on this thread)
        #[arg(short, long, default_value_t = 7)]
        workers: usize,

        /// Time steps to simulate
        #[arg(short, long, default_value_t = 500)]
        steps: usize,

        /// Neurons per population
        #[arg(long, default_value_t = 500)]
        size: usize,

        /// RNG seed
        #[arg(long, default_value_t = 157)]
        seed: u64,

        /// Disable adaptive chunk sizing for reproducible schedules
        #[arg(long)]
        deterministic: bool,

        /// Write a chrome://tracing dump of the chunk schedule here
        #[arg(long)]
        trace: Option<PathBuf>,
    },

    /// Print the demo network's topology and exit
    Topology {
        #[arg(long, default_value_t = 500)]
        size: usize,
    },
}

#[derive(Clone, Copy, Default)]
struct Neuron {
    /// Potential for the current and next step.
    v: [f32; 2],
    /// Activation for the current and next step.
    x: [f32; 2],
}

#[derive(Clone, Copy, Default)]
struct Dendrite {
    w: f32,
}

const DECAY: f32 = 0.99;
const GAIN: f32 = 0.01;

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

struct Demo {
    net: Network,
    input: llrt::CmpId,
}

fn build(workers: usize, size: usize, seed: u64, deterministic: bool, profile: bool) -> Result<Demo> {
    let cfg = NetConfig {
        workers,
        deterministic,
        profile,
        seed: Some(seed),
        ..NetConfig::default()
    };
    let mut net = Network::with_config(cfg);

    let a = net.add_component::<Neuron>("layer_a", &[size]);
    let b = net.add_component::<Neuron>("layer_b", &[size]);
    // Axon ends carry no data; dendrites hold the weights.
    net.connect::<(), Dendrite>(a, b, DenseLink::new(), false)?;
    net.connect::<(), Dendrite>(b, a, DenseLink::new(), false)?;

    Ok(Demo { net, input: a })
}

fn init_weights(demo: &Demo) -> Result<u64> {
    demo.net.process_net_links(
        &mut |cx: &mut EdgeCtx<'_, Neuron, Dendrite, Neuron, ()>| {
            cx.edge.w = cx.rng.gen_range(-1.0..1.0);
        },
        &OpOptions::parallel().dendrites().kernel_name("InitWeights"),
    )
}

fn advance(demo: &Demo, step: usize, inputs: &[f32]) -> Result<u64> {
    let p0 = step % 2;
    let p1 = 1 - p0;

    // Decay (or reset after a spike).
    demo.net.process_net_cmps(
        &mut move |cx: &mut NodeCtx<'_, Neuron>| {
            let n = &mut *cx.node;
            n.v[p1] = if n.x[p0] == 0.0 { DECAY * n.v[p0] } else { 0.0 };
        },
        &OpOptions::parallel_non_blocking().kernel_name("SelfPotential"),
    )?;

    // External input into layer a.
    let inputs = inputs.to_vec();
    demo.net.process_cmp(
        demo.input,
        &mut move |cx: &mut NodeCtx<'_, Neuron>| {
            cx.node.v[p1] += inputs[cx.index];
        },
        &OpOptions::parallel_non_blocking().kernel_name("Input"),
    )?;

    // Weighted sum of the far end's previous activations.
    demo.net.process_net_links(
        &mut move |cx: &mut EdgeCtx<'_, Neuron, Dendrite, Neuron, ()>| {
            cx.near.v[p1] += cx.edge.w * cx.far.x[p0];
        },
        &OpOptions::parallel_non_blocking()
            .dendrites()
            .kernel_name("EdgeSum"),
    )?;

    // Fire.
    demo.net.process_net_cmps(
        &mut move |cx: &mut NodeCtx<'_, Neuron>| {
            let p = sigmoid(GAIN * cx.node.v[p1]);
            cx.node.x[p1] = if cx.rng.gen_range(0.0..1.0f32) < p { 1.0 } else { 0.0 };
        },
        &OpOptions::parallel_non_blocking().kernel_name("Activate"),
    )
}

fn run(
    workers: usize,
    steps: usize,
    size: usize,
    seed: u64,
    deterministic: bool,
    trace: Option<PathBuf>,
) -> Result<()> {
    let demo = build(workers, size, seed, deterministic, trace.is_some())?;
    print!("{}", demo.net.display());

    init_weights(&demo)?;

    let mut inputs = vec![0.0f32; size];
    let mut input_rng = llrt::KernelRng::seeded(136);
    let mut input_batch = 0;
    for step in 0..steps {
        // The previous input batch must be done before the buffer is
        // rewritten; later batches keep running meanwhile.
        demo.net.finish_batch(input_batch);
        for v in inputs.iter_mut() {
            *v = input_rng.gen_range(-1.0..1.0);
        }
        input_batch = advance(&demo, step, &inputs)?;
    }

    let report = demo.net.perf_report();
    println!("{report}");
    if let (Some(path), Some(json)) = (trace, report.trace_json.as_ref()) {
        fs::write(&path, json)
            .map_err(|e| llrt::Error::Io(format!("writing {}: {e}", path.display())))?;
        println!(
            "Logged performance data to {}. View it via chrome://tracing.",
            path.display()
        );
    }

    // Summarize so a run has something falsifiable to print.
    let mut total = 0.0f32;
    demo.net
        .for_each_node::<Neuron, _>(demo.input, |cx| total += cx.node.x[steps % 2])?;
    println!("layer_a activation total: {total}");
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run {
            workers,
            steps,
            size,
            seed,
            deterministic,
            trace,
        } => run(workers, steps, size, seed, deterministic, trace),
        Commands::Topology { size } => build(0, size, 157, false, false).map(|demo| {
            print!("{}", demo.net.display());
        }),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
