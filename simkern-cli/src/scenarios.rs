//! Demonstration scenarios runnable from the command line

use clap::ValueEnum;
use simkern_core::platform::{ClusterSpec, Host, Link, NetZone, RoutingKind};
use simkern_core::{Activity, ActivityError, ActorCode, ActorLaunch, Engine, Exec, SimulationReport};

/// Name of the host running the master/monitor actor in star platforms.
const MASTER_HOST: &str = "master";

/// Mailbox the workers report to in the host failure scenario.
const RESULTS_MAILBOX: &str = "results";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// A master distributes compute tasks to workers over mailboxes
    MasterWorker,
    /// Two actors bounce a message back and forth
    PingPong,
    /// Two actors wait for each other forever
    Deadlock,
    /// A worker host goes down in the middle of its computation
    HostFailure,
    /// One parallel task spanning every node of a cluster
    ParallelTask,
}

/// Size knobs shared by every scenario.
#[derive(Debug, Clone, Copy)]
pub struct ScenarioParams {
    pub workers: usize,
    pub tasks: usize,
    pub task_flops: f64,
    pub message_bytes: f64,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            workers: 4,
            tasks: 20,
            task_flops: 5e8,
            message_bytes: 1e6,
        }
    }
}

/// What a master sends to a worker.
#[derive(Debug, Clone, Copy)]
enum Task {
    Compute(f64),
    Finalize,
}

impl Scenario {
    /// Configuration items the scenario cannot run without, applied before the user's.
    pub fn required_config(self) -> &'static [&'static str] {
        match self {
            Scenario::ParallelTask => &["host/model:ptask_L07"],
            _ => &[],
        }
    }

    pub fn platform(self, params: &ScenarioParams) -> NetZone {
        match self {
            Scenario::MasterWorker | Scenario::HostFailure => star(params.workers.max(1)),
            Scenario::PingPong | Scenario::Deadlock => pair(),
            Scenario::ParallelTask => {
                let spec = ClusterSpec {
                    link_bandwidth: 1.25e8,
                    link_latency: 5e-5,
                    backbone: Some((1.25e9, 5e-4)),
                };
                NetZone::cluster("cluster", "node-", params.workers.max(1), 1e9, spec)
            }
        }
    }

    /// Creates the scenario's actors on an engine whose platform is loaded.
    ///
    /// # Errors
    ///
    /// - `SimkernError::Engine` - An actor cannot be created
    pub fn deploy(self, engine: &Engine, params: &ScenarioParams) -> simkern_core::Result<()> {
        match self {
            Scenario::MasterWorker => deploy_master_worker(engine, params),
            Scenario::PingPong => deploy_ping_pong(engine, params),
            Scenario::Deadlock => deploy_deadlock(engine),
            Scenario::HostFailure => deploy_host_failure(engine, params),
            Scenario::ParallelTask => deploy_parallel_task(engine, params),
        }
    }
}

/// Loads the scenario on `engine` and runs it, stopping at `until` if given.
///
/// # Errors
///
/// - `SimkernError::Engine` - Platform, deployment or run failure
pub fn simulate(
    engine: &Engine,
    scenario: Scenario,
    params: &ScenarioParams,
    until: Option<f64>,
) -> simkern_core::Result<SimulationReport> {
    engine.load_platform(scenario.platform(params))?;
    scenario.deploy(engine, params)?;
    let report = match until {
        Some(date) => engine.run_until(date)?,
        None => engine.run()?,
    };
    Ok(report)
}

/// A master host linked to every worker host through a private link.
fn star(workers: usize) -> NetZone {
    let mut zone = NetZone::new("star", RoutingKind::Full);
    zone.add_host(Host::new(MASTER_HOST, 1e9));
    for index in 0..workers {
        let host = worker_name(index);
        let link = format!("link-{index}");
        let speed = if index % 2 == 0 { 1e9 } else { 2e9 };
        zone.add_host(Host::new(host.clone(), speed))
            .add_link(Link::new(link.clone(), 1.25e8, 5e-5))
            .add_route(MASTER_HOST, &host, &[&link], true);
    }
    zone
}

fn pair() -> NetZone {
    let mut zone = NetZone::new("pair", RoutingKind::Full);
    zone.add_host(Host::new("alice", 1e9))
        .add_host(Host::new("bob", 1e9))
        .add_link(Link::new("wire", 1.25e8, 1e-4))
        .add_route("alice", "bob", &["wire"], true);
    zone
}

fn worker_name(index: usize) -> String {
    format!("worker-{index}")
}

fn deploy_master_worker(engine: &Engine, params: &ScenarioParams) -> simkern_core::Result<()> {
    let ScenarioParams {
        workers,
        tasks,
        task_flops,
        message_bytes,
    } = *params;
    let workers = workers.max(1);

    engine.register_function(
        "master",
        ActorCode::new(move |ctx, _args| async move {
            for task in 0..tasks {
                ctx.mailbox(worker_name(task % workers))
                    .put(Task::Compute(task_flops), message_bytes)
                    .await?;
            }
            for worker in 0..workers {
                ctx.mailbox(worker_name(worker)).put(Task::Finalize, 0.0).await?;
            }
            tracing::info!("Master dispatched {} tasks at {}", tasks, ctx.now());
            Ok(())
        }),
    );
    engine.register_function(
        "worker",
        ActorCode::new(|ctx, _args| async move {
            let mailbox = ctx.mailbox(ctx.host());
            let mut done = 0;
            while let Task::Compute(flops) = mailbox.get::<Task>().await? {
                ctx.execute(flops).await?;
                done += 1;
            }
            tracing::info!("{} completed {} tasks at {}", ctx.name(), done, ctx.now());
            Ok(())
        }),
    );

    let mut deployment = vec![ActorLaunch::new("master", MASTER_HOST, "master")];
    deployment.extend((0..workers).map(|index| {
        let host = worker_name(index);
        ActorLaunch::new(host.clone(), host, "worker")
    }));
    engine.load_deployment(&deployment)?;
    Ok(())
}

fn deploy_ping_pong(engine: &Engine, params: &ScenarioParams) -> simkern_core::Result<()> {
    let rounds = params.tasks;
    let bytes = params.message_bytes;

    engine.create_actor(
        "ping",
        "alice",
        ActorCode::from_fn(move |ctx| async move {
            for round in 0..rounds {
                let start = ctx.now();
                ctx.mailbox("pong").put(round, bytes).await?;
                let echoed: usize = ctx.mailbox("ping").get().await?;
                tracing::info!("Round {} round-trip: {:.6}s", echoed, ctx.now() - start);
            }
            Ok(())
        }),
    )?;
    engine.create_actor(
        "pong",
        "bob",
        ActorCode::from_fn(move |ctx| async move {
            for _ in 0..rounds {
                let round: usize = ctx.mailbox("pong").get().await?;
                ctx.mailbox("ping").put(round, bytes).await?;
            }
            Ok(())
        }),
    )?;
    Ok(())
}

fn deploy_deadlock(engine: &Engine) -> simkern_core::Result<()> {
    for (name, host, inbox, outbox) in [
        ("left", "alice", "left", "right"),
        ("right", "bob", "right", "left"),
    ] {
        engine.create_actor(
            name,
            host,
            ActorCode::from_fn(move |ctx| async move {
                let token: u32 = ctx.mailbox(inbox).get().await?;
                ctx.mailbox(outbox).put(token, 64.0).await?;
                Ok(())
            }),
        )?;
    }
    Ok(())
}

/// Workers compute then report; `worker-0` is turned off halfway through.
fn deploy_host_failure(engine: &Engine, params: &ScenarioParams) -> simkern_core::Result<()> {
    let workers = params.workers.max(1);
    let flops = params.task_flops * params.tasks.max(1) as f64;
    let bytes = params.message_bytes;
    // Slowest workers run at 1 Gflop/s
    let nominal = flops / 1e9;

    for index in 0..workers {
        let host = worker_name(index);
        engine.create_actor(
            &host,
            &host,
            ActorCode::from_fn(move |ctx| async move {
                ctx.execute(flops).await?;
                ctx.mailbox(RESULTS_MAILBOX)
                    .put(ctx.name().to_string(), bytes)
                    .await?;
                Ok(())
            }),
        )?;
    }

    engine.create_actor(
        "monitor",
        MASTER_HOST,
        ActorCode::from_fn(move |ctx| async move {
            let deadline = 2.0 * nominal + 1.0;
            let mut reported = 0;
            while reported < workers {
                let comm = ctx.mailbox(RESULTS_MAILBOX).get_async()?;
                match comm.wait_for(deadline - ctx.now()).await {
                    Ok(()) => {
                        let worker: String = comm.take_payload()?;
                        tracing::info!("{} reported at {}", worker, ctx.now());
                        reported += 1;
                    }
                    Err(ActivityError::Timeout { .. }) => {
                        comm.cancel()?;
                        tracing::warn!(
                            "{} of {} workers never reported",
                            workers - reported,
                            workers
                        );
                        break;
                    }
                    Err(error) => return Err(error.into()),
                }
            }
            Ok(())
        }),
    )?;

    let handle = engine.clone();
    let victim = worker_name(0);
    engine.add_timer(nominal / 2.0, move || {
        if let Err(error) = handle.turn_off_host(&victim) {
            tracing::warn!("Cannot turn off {}: {}", victim, error);
        }
    })?;
    Ok(())
}

fn deploy_parallel_task(engine: &Engine, params: &ScenarioParams) -> simkern_core::Result<()> {
    let nodes: Vec<String> = engine
        .all_hosts()
        .iter()
        .map(|host| host.name().to_string())
        .collect();
    let Some(first) = nodes.first().cloned() else {
        return Ok(());
    };
    let count = nodes.len();
    let flops = vec![params.task_flops; count];
    let bytes: Vec<f64> = (0..count * count)
        .map(|cell| if cell / count == cell % count { 0.0 } else { params.message_bytes })
        .collect();

    engine.create_actor(
        "driver",
        &first,
        ActorCode::from_fn(move |ctx| {
            let nodes = nodes.clone();
            let flops = flops.clone();
            let bytes = bytes.clone();
            async move {
                let hosts: Vec<&str> = nodes.iter().map(String::as_str).collect();
                let task = Exec::parallel(&hosts, flops, bytes);
                task.wait().await?;
                tracing::info!("Parallel task on {} hosts done at {}", hosts.len(), ctx.now());
                Ok(())
            }
        }),
    )?;
    Ok(())
}
