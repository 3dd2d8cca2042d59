use clap::Parser;
use flowsim_rs::emu::{EmuConfig, EmuWorld};
use flowsim_rs::profile::{build_profile, ProfileSpec};
use flowsim_rs::sim::{SimTime, Simulator};
use flowsim_rs::viz::FlowEventLogger;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "flow-sim",
    about = "Execute a traffic profile's client/server programs in virtual time"
)]
struct Args {
    /// Path to the profile spec JSON
    #[arg(long)]
    profile: PathBuf,

    /// Flow instances per template pair
    #[arg(long, default_value_t = 1)]
    flows: u64,

    /// Run until this time (ms); defaults to running until completion
    #[arg(long)]
    until_ms: Option<u64>,

    /// One-way byte delivery latency (us)
    #[arg(long, default_value_t = 50)]
    latency_us: u64,

    /// Transport queue capacity for pipelined sends (bytes)
    #[arg(long, default_value_t = 65536)]
    tx_buf_bytes: u64,

    /// Kill flows still running after this long (ms)
    #[arg(long, default_value_t = 60_000)]
    max_flow_ms: u64,

    /// Seed for delay/address sampling
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Output trace JSON event file; omitted = no trace
    #[arg(long)]
    viz_json: Option<PathBuf>,

    /// Print the aggregate counter block
    #[arg(long)]
    stats: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let args = Args::parse();

    let raw = match fs::read_to_string(&args.profile) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("error: read {}: {e}", args.profile.display());
            return ExitCode::from(2);
        }
    };
    let spec: ProfileSpec = match serde_json::from_str(&raw) {
        Ok(spec) => spec,
        Err(e) => {
            eprintln!("error: parse {}: {e}", args.profile.display());
            return ExitCode::from(2);
        }
    };
    let profile = match build_profile(&spec) {
        Ok(profile) => profile,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    let latency = SimTime::from_micros(args.latency_us);
    let cfg = EmuConfig {
        flows_per_template: args.flows,
        latency,
        connect_latency: latency,
        tx_buf_bytes: args.tx_buf_bytes,
        max_flow_lifetime: SimTime::from_millis(args.max_flow_ms),
        seed: args.seed,
    };

    let mut sim = Simulator::default();
    let mut world = EmuWorld::new(cfg);
    if args.viz_json.is_some() {
        world.viz = Some(FlowEventLogger::default());
        world.emit_viz_meta(profile.templates().len());
    }
    world.spawn_flows(&profile, &mut sim);

    match args.until_ms {
        Some(ms) => {
            sim.run_until(SimTime::from_millis(ms), &mut world);
        }
        None => {
            sim.run(&mut world);
        }
    }

    if let Some(path) = args.viz_json {
        if let Some(v) = world.viz.take() {
            let json = serde_json::to_string_pretty(&v.events).expect("serialize trace events");
            fs::write(&path, json).expect("write trace json");
            eprintln!("wrote trace events to {}", path.display());
        }
    }

    for flow in world.flows_by_id() {
        match flow.end_reason() {
            Some(reason) => println!(
                "flow_done id={} template={} client={} server={}:{} reason={} dur_ns={} c_tx={} s_tx={}",
                flow.id,
                flow.template_idx,
                flow.client_ip,
                flow.server_ip,
                flow.port,
                reason,
                flow.duration().map_or(0, |d| d.0),
                flow.tx_bytes(flowsim_rs::prog::Side::Client),
                flow.tx_bytes(flowsim_rs::prog::Side::Server),
            ),
            None => println!(
                "flow_running id={} template={} client={} server={}:{} c_tx={} s_tx={}",
                flow.id,
                flow.template_idx,
                flow.client_ip,
                flow.server_ip,
                flow.port,
                flow.tx_bytes(flowsim_rs::prog::Side::Client),
                flow.tx_bytes(flowsim_rs::prog::Side::Server),
            ),
        }
    }

    let stats = &world.stats;
    if args.stats {
        println!(
            "done @ {:?}\n  flows: started={}, finished={}, reset={}, stalled={}\n  bytes: client_tx={}, server_tx={}",
            sim.now(),
            stats.flows_started,
            stats.flows_finished,
            stats.flows_reset,
            stats.flows_stalled,
            stats.client_tx_bytes,
            stats.server_tx_bytes
        );
    }
    ExitCode::SUCCESS
}
