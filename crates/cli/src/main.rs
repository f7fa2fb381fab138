//! `rusty-automation-tool` CLI entry-point — the controller binary (§6
//! "CLI (controller)").
//!
//! Two sub-commands: `run` drives a deployed workflow's instance(s) to
//! completion against a profile, `validate` loads a profile and checks its
//! DAG section for cycles without running anything.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use controller::{deploy, Engine, EngineConfig, HttpInvoker, Invoker, Profile, RemoteDispatcher, StageDispatcher};
use store::{MemoryStore, RedisStore, Store};
use tracing::{error, info};
use worker::TransportMode;

#[derive(Parser)]
#[command(
    name = "rusty-automation-tool",
    about = "Serverless workflow runtime controller",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a deployed workflow against its profile.
    Run(RunArgs),
    /// Load and sanity-check a deployment profile.
    Validate {
        /// Path to the profile YAML file.
        profile: PathBuf,
    },
    /// Render a deployment manifest for every stage in a profile.
    Deploy(DeployArgs),
}

#[derive(clap::Args)]
struct DeployArgs {
    #[arg(long)]
    profile: PathBuf,

    /// Manifest template with `__token__` placeholders (§6 "Deployment
    /// manifest template").
    #[arg(long)]
    template: PathBuf,

    #[arg(long, default_value_t = false)]
    ditto_placement: bool,

    /// Place every stage on `127.0.0.1` instead of computing placement
    /// (useful when rendering manifests for a single-machine dev run).
    #[arg(long, default_value_t = false)]
    local_placement: bool,

    /// Directory the rendered manifests are written into, one
    /// `<stage>.yaml` file per stage; defaults to printing to stdout.
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

#[derive(Copy, Clone, ValueEnum)]
enum TransModeArg {
    Auto,
    #[value(name = "allRedis")]
    AllRedis,
    #[value(name = "allTCP")]
    AllTcp,
}

impl From<TransModeArg> for TransportMode {
    fn from(arg: TransModeArg) -> Self {
        match arg {
            TransModeArg::Auto => TransportMode::Auto,
            TransModeArg::AllRedis => TransportMode::AllRedis,
            TransModeArg::AllTcp => TransportMode::AllTcp,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum LaunchArg {
    Tradition,
    Coldstart,
    Prewarm,
}

#[derive(clap::Args)]
struct RunArgs {
    #[arg(long, value_enum, default_value = "auto")]
    transmode: TransModeArg,

    #[arg(long)]
    profile: PathBuf,

    #[arg(long, default_value_t = 1)]
    repeat: u32,

    #[arg(long, default_value_t = 1)]
    para: u32,

    #[arg(long, default_value_t = false)]
    ditto_placement: bool,

    #[arg(long, value_enum, default_value = "tradition")]
    launch: LaunchArg,

    #[arg(long)]
    redis_preload_folder: Option<PathBuf>,

    #[arg(long, default_value_t = 100)]
    failure_tolerance: u32,

    #[arg(long, default_value_t = false)]
    getoutputs: bool,

    #[arg(long, default_value_t = 30.0)]
    remote_call_timeout: f64,

    #[arg(long, default_value_t = 5.0)]
    redis_wait_time: f64,

    #[arg(long, default_value_t = 0.0)]
    post_ratio: f64,

    #[arg(long, default_value_t = false)]
    knative: bool,

    #[arg(long)]
    redis_yaml: Option<PathBuf>,

    #[arg(long)]
    redis_ip: Option<String>,

    #[arg(long, default_value_t = 6379)]
    redis_port: u16,

    #[arg(long)]
    redis_password: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Validate { profile } => validate(&profile),
        Command::Deploy(args) => deploy(&args),
    }
}

async fn run(args: RunArgs) {
    info!(
        profile = %args.profile.display(),
        knative = args.knative,
        repeat = args.repeat,
        para = args.para,
        "starting controller run"
    );

    let profile = Profile::load(&args.profile).unwrap_or_else(|err| {
        error!(%err, "failed to load profile");
        std::process::exit(1);
    });

    // Node placement only drives manifest rendering at deploy time; the
    // controller addresses every stage through its external ingress
    // regardless of which node it landed on, but an infeasible Ditto
    // placement is still a fatal configuration error here.
    deploy::compute_placement(&profile, args.ditto_placement, false).unwrap_or_else(|err| {
        error!(%err, "placement is infeasible");
        std::process::exit(1);
    });

    let schedule = deploy::ingress_schedule(&profile).unwrap_or_else(|err| {
        error!(%err, "failed to build ingress schedule");
        std::process::exit(1);
    });

    if args.redis_wait_time > 0.0 {
        info!(seconds = args.redis_wait_time, "waiting for workers to come up");
        tokio::time::sleep(Duration::from_secs_f64(args.redis_wait_time)).await;
    }

    let store: Arc<dyn Store> = match &args.redis_ip {
        Some(ip) => {
            info!(ip, port = args.redis_port, "connecting to redis store");
            Arc::new(
                RedisStore::connect_with_password(ip, args.redis_port, args.redis_password.as_deref())
                    .await
                    .unwrap_or_else(|err| {
                        error!(%err, "failed to connect to redis");
                        std::process::exit(1);
                    }),
            )
        }
        None => Arc::new(MemoryStore::new()),
    };

    if let Some(folder) = &args.redis_preload_folder {
        preload_folder(&store, folder).await;
    }
    if let Some(yaml_path) = &args.redis_yaml {
        preload_yaml(&store, yaml_path).await;
    }

    let timers: Vec<(f64, String)> = match args.launch {
        LaunchArg::Prewarm => deploy::prewarm_schedule(&profile, 0.0).into_iter().collect(),
        LaunchArg::Tradition | LaunchArg::Coldstart => Vec::new(),
    };

    let remote_call_timeout = Duration::from_secs_f64(args.remote_call_timeout);
    let trans_mode: TransportMode = args.transmode.into();
    let concurrency = args.para.max(1) as usize;
    let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency));
    let mut handles = Vec::new();

    for run_idx in 0..args.repeat.max(1) {
        let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closes");
        let namespace = format!("{}-run{run_idx}", profile.app_name);
        let dependencies = profile.dag.clone();
        let schedule = schedule.clone();
        let params: HashMap<String, serde_json::Value> = profile.default_params.clone();
        let store = store.clone();
        let timers = timers.clone();
        let failure_tolerance = args.failure_tolerance;
        let getoutputs = args.getoutputs;
        let post_ratio = args.post_ratio;

        handles.push(tokio::spawn(async move {
            let _permit = permit;
            let invoker: Arc<dyn Invoker> = Arc::new(HttpInvoker::new(remote_call_timeout));
            let dispatcher: Arc<dyn StageDispatcher> = Arc::new(RemoteDispatcher::new(
                namespace.clone(),
                schedule.clone(),
                trans_mode,
                params,
                remote_call_timeout.as_secs_f64(),
                post_ratio,
                invoker,
            ));
            let config = EngineConfig {
                failure_tolerance,
                get_outputs: getoutputs,
                outputs_dir: getoutputs.then(|| PathBuf::from(format!("./outputs/{namespace}"))),
                ..EngineConfig::default()
            };
            let engine = Engine::new(namespace, dependencies, schedule, dispatcher, store, config, timers);
            engine.run().await
        }));
    }

    for handle in handles {
        if let Err(err) = handle.await {
            error!(%err, "workflow instance task panicked");
            std::process::exit(1);
        }
    }

    info!("all instances completed");
}

/// Seed the store from every `*.json` file in `folder`, keyed by file stem
/// (§6 `--redis_preload_folder`) — used to warm a cluster run with fixture
/// data before dispatch begins.
async fn preload_folder(store: &Arc<dyn Store>, folder: &std::path::Path) {
    let entries = match std::fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(err) => {
            error!(%err, folder = %folder.display(), "failed to read preload folder");
            std::process::exit(1);
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
        let text = std::fs::read_to_string(&path).unwrap_or_else(|err| {
            error!(%err, path = %path.display(), "failed to read preload file");
            std::process::exit(1);
        });
        let value: serde_json::Value = serde_json::from_str(&text).unwrap_or_else(|err| {
            error!(%err, path = %path.display(), "preload file is not valid JSON");
            std::process::exit(1);
        });
        if let Err(err) = store.put(stem, value).await {
            error!(%err, key = stem, "failed to preload key");
            std::process::exit(1);
        }
        info!(key = stem, "preloaded key from folder");
    }
}

/// Seed the store from a single YAML document mapping key to value (§6
/// `--redis_yaml`), an alternative to `--redis_preload_folder` for a small
/// number of fixtures.
async fn preload_yaml(store: &Arc<dyn Store>, path: &std::path::Path) {
    let text = std::fs::read_to_string(path).unwrap_or_else(|err| {
        error!(%err, path = %path.display(), "failed to read redis_yaml");
        std::process::exit(1);
    });
    let entries: HashMap<String, serde_json::Value> = serde_yaml::from_str(&text).unwrap_or_else(|err| {
        error!(%err, path = %path.display(), "redis_yaml is not a valid key/value map");
        std::process::exit(1);
    });
    for (key, value) in entries {
        if let Err(err) = store.put(&key, value).await {
            error!(%err, key, "failed to preload key");
            std::process::exit(1);
        }
        info!(key, "preloaded key from yaml");
    }
}

/// Render one manifest per stage from a profile + template (§6 "Deployment
/// manifest template"), either to `--out_dir` or stdout.
fn deploy(args: &DeployArgs) {
    let profile = Profile::load(&args.profile).unwrap_or_else(|err| {
        error!(%err, "failed to load profile");
        std::process::exit(1);
    });
    let template = std::fs::read_to_string(&args.template).unwrap_or_else(|err| {
        error!(%err, path = %args.template.display(), "failed to read manifest template");
        std::process::exit(1);
    });
    let placement = deploy::compute_placement(&profile, args.ditto_placement, args.local_placement)
        .unwrap_or_else(|err| {
            error!(%err, "placement is infeasible");
            std::process::exit(1);
        });
    let cwd = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| ".".to_string());

    for stage in profile.stages() {
        let rendered = deploy::render_manifest(&profile, &template, stage, &placement, &cwd).unwrap_or_else(|err| {
            error!(%err, stage, "failed to render manifest");
            std::process::exit(1);
        });
        match &args.out_dir {
            Some(dir) => {
                if let Err(err) = std::fs::create_dir_all(dir) {
                    error!(%err, dir = %dir.display(), "failed to create out_dir");
                    std::process::exit(1);
                }
                let path = dir.join(format!("{stage}.yaml"));
                if let Err(err) = std::fs::write(&path, &rendered) {
                    error!(%err, path = %path.display(), "failed to write manifest");
                    std::process::exit(1);
                }
                info!(stage, path = %path.display(), "wrote manifest");
            }
            None => {
                println!("---\n# stage: {stage}\n{rendered}");
            }
        }
    }
}

fn validate(path: &PathBuf) {
    let profile = Profile::load(path).unwrap_or_else(|err| {
        eprintln!("invalid profile: {err}");
        std::process::exit(1);
    });

    let edges: Vec<(String, String)> = profile
        .dag
        .iter()
        .flat_map(|(dst, deps)| deps.iter().map(move |src| (src.clone(), dst.clone())))
        .collect();
    let nodes: Vec<String> = profile.stages().into_iter().map(String::from).collect();

    match dag::topo::topological_sort(&nodes, &edges) {
        Ok(order) => {
            println!("profile is valid. execution order: {order:?}");
        }
        Err(err) => {
            eprintln!("DAG validation failed: {err:?}");
            std::process::exit(1);
        }
    }
}
