//! etcd3-model Demo Controller
//!
//! Runs a producer and a pool of consumers against one store. Consumers
//! race for each queued instance's lock without waiting, advance it one
//! step, and either re-submit it, resolve it to READY, or remove it.

use std::error::Error as StdError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use etcd3_model::{connect, AttrSpec, Config, Model, State, WatchQueue};
use serde_json::Value;
use tracing_subscriber::{fmt, EnvFilter};

type DemoResult<T> = std::result::Result<T, Box<dyn StdError + Send + Sync>>;

const MODEL_PREFIX: &str = "/demo/etcd3model/Widget";
const LOCK_TTL: Duration = Duration::from_secs(5);
const QUEUE_POLL: Duration = Duration::from_millis(100);
const WAIT_POLL: Duration = Duration::from_millis(50);
const WAIT_LIMIT: Duration = Duration::from_secs(30);

/// etcd3-model demo controller
#[derive(Parser, Debug)]
#[command(name = "etcd3-model-controller")]
#[command(about = "Reconcile demo widgets through watch queues and instance locks")]
#[command(version)]
struct Args {
    /// Store host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Store port
    #[arg(long, default_value_t = etcd3_model::config::DEFAULT_PORT)]
    port: u16,

    /// Use the in-memory store simulator
    #[arg(long)]
    mock: bool,

    /// Number of consumer threads
    #[arg(short, long, default_value = "3")]
    workers: usize,

    /// Number of widgets to reconcile
    #[arg(short, long, default_value = "5")]
    items: usize,

    /// Steps each widget needs before it is READY
    #[arg(short, long, default_value = "3")]
    steps: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,etcd3_model=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("etcd3-model controller v{}", etcd3_model::VERSION);

    let config = Config::builder()
        .host(&args.host)
        .port(args.port)
        .mock(args.mock)
        .build();

    let store = match connect(&config) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open store at {}: {}", config.endpoint(), e);
            std::process::exit(1);
        }
    };

    let model = match Model::builder(MODEL_PREFIX, store)
        .attr(AttrSpec::object_id("widget_id"))
        .attr(AttrSpec::new("progress").default_value(0))
        .build()
    {
        Ok(model) => model,
        Err(e) => {
            tracing::error!("Invalid model: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&model, &args) {
        tracing::error!("Controller error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Controller stopped");
}

fn run(model: &Model, args: &Args) -> DemoResult<()> {
    let shutdown = Arc::new(AtomicBool::new(false));

    // Queues must exist before the first put to see it
    let mut workers = Vec::with_capacity(args.workers);
    for worker in 0..args.workers {
        let queue = model.watch()?;
        let shutdown = Arc::clone(&shutdown);
        let steps = args.steps;
        let handle = thread::Builder::new()
            .name(format!("consumer-{}", worker))
            .spawn(move || consume(worker, queue, steps, shutdown))?;
        workers.push(handle);
    }

    for _ in 0..args.items {
        let mut widget = model.new_instance();
        widget.set_state(State::Updating);
        widget.put()?;
        tracing::info!("Submitted widget {}", widget.id());
    }

    wait_for(model, "all widgets READY", |widgets| {
        widgets.iter().all(|w| w.state() == State::Ready)
    })?;

    for mut widget in model.get_all()? {
        widget.delete(Some("demo finished"))?;
    }

    wait_for(model, "all widgets removed", |widgets| widgets.is_empty())?;

    shutdown.store(true, Ordering::Relaxed);
    for handle in workers {
        match handle.join() {
            Ok(result) => result?,
            Err(_) => return Err("consumer thread panicked".into()),
        }
    }
    Ok(())
}

/// Poll the stored widgets until `done` holds
fn wait_for<F>(model: &Model, what: &str, done: F) -> DemoResult<()>
where
    F: Fn(&[etcd3_model::Instance]) -> bool,
{
    let started = Instant::now();
    loop {
        let widgets = model.get_all()?;
        if done(&widgets) {
            tracing::info!("Reached: {} ({:?})", what, started.elapsed());
            return Ok(());
        }
        if started.elapsed() > WAIT_LIMIT {
            return Err(format!("timed out waiting for {}", what).into());
        }
        thread::sleep(WAIT_POLL);
    }
}

fn consume(worker: usize, queue: WatchQueue, steps: u64, shutdown: Arc<AtomicBool>) -> DemoResult<()> {
    while !shutdown.load(Ordering::Relaxed) {
        let observed = match queue.get_timeout(QUEUE_POLL)? {
            Some(observed) => observed,
            None => continue,
        };

        let lock = observed.lock(LOCK_TTL, Duration::ZERO)?;
        if !lock.is_acquired() {
            tracing::debug!("Worker {} skipped busy widget {}", worker, observed.id());
            continue;
        }

        // The queued copy may be stale; work on the stored one
        let mut current = match queue.model().get(&observed.id())? {
            Some(current) => current,
            None => continue,
        };

        match current.state() {
            State::Ready => {}
            State::Deleting => {
                current.remove()?;
                tracing::info!("Worker {} removed widget {}", worker, current.id());
            }
            State::Updating => {
                let progress = current.get("progress").and_then(Value::as_u64).unwrap_or(0) + 1;
                current.set("progress", progress)?;
                if progress >= steps {
                    current.set_ready()?;
                    tracing::info!("Worker {} resolved widget {}", worker, current.id());
                } else {
                    current.post_message(format!("worker {} finished step {}", worker, progress))?;
                }
            }
        }
    }
    Ok(())
}
