//! Runs the hosting and resolving flows against a simulated AR session, with
//! the camera walking in circles around the anchor.

use clap::Parser;
use ghosts::{
    anchor_store::{now_minutes, parse_entered_anchor_ids, AnchorPreferences},
    ar_session::{Anchor, TrackingState},
    args::{
        CommandTask::{Host, List, Resolve},
        GhostArgs, HostCommand, ResolveCommand,
    },
    cloud_anchor_manager::CloudAnchorManager,
    config::GhostConfig,
    dummy_session::{DummyAnchor, DummyArSession, DummyArSessionBuilder},
    geometry::Pose,
    gui::{anchor_selector, fold_until_stop},
    hosting::{HostingPhase, HostingSession},
    messages::UserMessage,
    orbit::OrbitCamera,
    resolving::{camera_facing_pose, resolve_all, PlaybackEvent, ResolvedAnchors},
    GhostError,
};

use log::{debug, error, info, warn};
use rand::prelude::*;
use std::{
    f32::consts::TAU,
    fmt::{self, Display},
    ops::ControlFlow,
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Mutex, PoisonError,
    },
    time::{Duration, Instant},
};

const FRAME_TIME: Duration = Duration::from_millis(33);

// Example:
// cargo run --bin ghosts -- --prefs anchors.ron host --name "Old gate"
// cargo run --bin ghosts -- --prefs anchors.ron resolve --pick

fn main() {
    env_logger::init();
    let args = GhostArgs::parse();

    if let Err(e) = run(args) {
        error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(args: GhostArgs) -> Result<(), GhostError> {
    let config = match &args.config {
        Some(path) => GhostConfig::load(path)?,
        None => GhostConfig::default(),
    };
    let mut prefs = AnchorPreferences::load(&args.prefs)?;

    match &args.command {
        Host(cmd) => host(cmd, &args, &config, &mut prefs),
        Resolve(cmd) => resolve(cmd, &args, &config, &prefs),
        List => {
            let anchors = prefs.retrieve_stored_anchors(now_minutes(), config.max_anchor_age_minutes)?;
            if anchors.is_empty() {
                println!("No anchors hosted in the last {} minutes", config.max_anchor_age_minutes);
            }
            for anchor in anchors {
                println!("{anchor}");
            }
            Ok(())
        }
    }
}

fn session_builder(args: &GhostArgs) -> DummyArSessionBuilder {
    let builder = DummyArSession::builder();
    match args.seed {
        Some(seed) => builder.seed(seed),
        None => builder,
    }
}

/// Everything the hosting render loop owns.
struct HostLoop {
    session: Arc<Mutex<DummyArSession>>,
    manager: Arc<CloudAnchorManager<DummyArSession>>,
    hosting: HostingSession<DummyArSession>,
    orbit: OrbitCamera,
    rng: StdRng,
    start: Instant,
    frame: u64,
    max_frames: u64,
}

fn host_step(mut s: HostLoop) -> ControlFlow<HostLoop, HostLoop> {
    s.session
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .update();
    s.manager.on_update();

    let camera = s.orbit.frame_at(s.start.elapsed(), &mut s.rng);
    if let Some(report) = s.hosting.on_frame(&camera, Instant::now()) {
        if report.sampled.is_some() {
            debug!(
                "Mapping quality {:.3} at {:.2}m",
                report.overall_quality, report.distance
            );
        }
    }

    s.frame += 1;
    match s.hosting.phase() {
        HostingPhase::Succeeded(_) | HostingPhase::Failed(_) => return ControlFlow::Break(s),
        _ if s.frame >= s.max_frames => {
            warn!("Gave up hosting after {} frames", s.frame);
            return ControlFlow::Break(s);
        }
        _ => {}
    }
    spin_sleep::sleep(FRAME_TIME);
    ControlFlow::Continue(s)
}

fn host(
    cmd: &HostCommand,
    args: &GhostArgs,
    config: &GhostConfig,
    prefs: &mut AnchorPreferences,
) -> Result<(), GhostError> {
    let session = Arc::new(Mutex::new(session_builder(args).build()));
    let manager = Arc::new(CloudAnchorManager::new(session.clone(), config.ttl_days));
    let (tx, rx) = mpsc::channel();
    let hosting = HostingSession::new(session.clone(), manager.clone(), config.clone(), tx);

    let orbit = OrbitCamera::default().with_jitter(0.02);
    if hosting
        .handle_tap(&[orbit.floor_hit()], TrackingState::Tracking)
        .is_none()
    {
        warn!("The floor tap did not place an anchor");
    }

    let state = HostLoop {
        session,
        manager,
        hosting,
        orbit,
        rng: seeded_rng(args.seed),
        start: Instant::now(),
        frame: 0,
        max_frames: cmd.frames,
    };
    let state = if cmd.headless {
        run_headless(state, host_step, rx)
    } else {
        fold_until_stop("Hosting Anchor", state, host_step, rx)?
    };
    state.hosting.shutdown();

    match state.hosting.cloud_anchor_id() {
        Some(id) => {
            prefs.add_hosted_anchor(&id, &cmd.name, now_minutes())?;
            prefs.save(&args.prefs)?;
            println!("Hosted {:?} as {id}", cmd.name);
        }
        None => println!("Nothing was hosted ({:?})", state.hosting.phase()),
    }
    Ok(())
}

/// What the resolve loop reports to the user.
enum ResolveStatus {
    Message(UserMessage),
    Playback(PlaybackEvent),
}

impl From<UserMessage> for ResolveStatus {
    fn from(value: UserMessage) -> Self {
        Self::Message(value)
    }
}

impl Display for ResolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(m) => write!(f, "{m}"),
            Self::Playback(PlaybackEvent::Start(id)) => write!(f, "Playing the ghost of {id}"),
            Self::Playback(PlaybackEvent::Stop(id)) => write!(f, "Stopped the ghost of {id}"),
        }
    }
}

/// Everything the resolving render loop owns.
struct ResolveLoop {
    session: Arc<Mutex<DummyArSession>>,
    manager: Arc<CloudAnchorManager<DummyArSession>>,
    anchors: Arc<Mutex<ResolvedAnchors<DummyAnchor>>>,
    orbit: OrbitCamera,
    rng: StdRng,
    start: Instant,
    frame: u64,
    max_frames: u64,
    status: Sender<ResolveStatus>,
}

fn resolve_step(mut s: ResolveLoop) -> ControlFlow<ResolveLoop, ResolveLoop> {
    s.session
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .update();
    s.manager.on_update();

    let camera = s.orbit.frame_at(s.start.elapsed(), &mut s.rng);
    {
        let mut anchors = s.anchors.lock().unwrap_or_else(PoisonError::into_inner);
        for event in anchors.update_playback(&camera.pose, &camera.view, &camera.projection) {
            let _ = s.status.send(ResolveStatus::Playback(event));
        }
        if let Some(playing) = anchors.closest_visible(&camera.pose, &camera.view, &camera.projection) {
            match camera_facing_pose(&playing.pose(), &camera.pose) {
                Ok(pose) => debug!("Ghost drawn at {:?}", pose.translation.vector),
                Err(e) => debug!("Ghost not turned towards the camera: {e}"),
            }
        }
    }

    s.frame += 1;
    if s.frame >= s.max_frames {
        return ControlFlow::Break(s);
    }
    spin_sleep::sleep(FRAME_TIME);
    ControlFlow::Continue(s)
}

fn resolve(
    cmd: &ResolveCommand,
    args: &GhostArgs,
    config: &GhostConfig,
    prefs: &AnchorPreferences,
) -> Result<(), GhostError> {
    let stored = prefs.retrieve_stored_anchors(now_minutes(), config.max_anchor_age_minutes)?;

    // The simulated cloud knows every stored anchor, spread around the orbit
    // centre.
    let mut builder = session_builder(args);
    for (i, item) in stored.iter().enumerate() {
        let angle = TAU * i as f32 / stored.len() as f32;
        builder = builder.cloud_anchor(
            &item.anchor_id,
            Pose::translation(0.5 * angle.cos(), 0.0, 0.5 * angle.sin()),
        );
    }

    let ids: Vec<String> = if cmd.pick {
        match anchor_selector(stored)? {
            Some(items) => items.into_iter().map(|i| i.anchor_id).collect(),
            None => return Ok(()),
        }
    } else if let Some(text) = &cmd.ids {
        parse_entered_anchor_ids(text)
    } else {
        stored.into_iter().map(|i| i.anchor_id).collect()
    };
    if ids.is_empty() {
        return Err(GhostError::NoAnchorIds);
    }

    let session = Arc::new(Mutex::new(builder.build()));
    let manager = Arc::new(CloudAnchorManager::new(session.clone(), config.ttl_days));
    let anchors = Arc::new(Mutex::new(ResolvedAnchors::new()));
    let (tx, rx) = mpsc::channel::<ResolveStatus>();
    resolve_all(manager.as_ref(), &anchors, ids, &tx);

    let state = ResolveLoop {
        session,
        manager,
        anchors,
        orbit: OrbitCamera::default(),
        rng: seeded_rng(args.seed),
        start: Instant::now(),
        frame: 0,
        max_frames: cmd.frames,
        status: tx,
    };
    let state = if cmd.headless {
        run_headless(state, resolve_step, rx)
    } else {
        fold_until_stop("Resolving Anchors", state, resolve_step, rx)?
    };
    state.manager.clear_listeners();

    let anchors = state.anchors.lock().unwrap_or_else(PoisonError::into_inner);
    for anchor in anchors.resolved() {
        println!(
            "Resolved {} at {:?}",
            anchor.cloud_anchor_id().unwrap_or_default(),
            anchor.pose().translation.vector
        );
    }
    for id in anchors.unresolved_ids() {
        println!("Could not resolve {id}");
    }
    Ok(())
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Same as the terminal ui loop, but logs the status messages instead.
fn run_headless<T, F, M>(init: T, f: F, status: Receiver<M>) -> T
where
    F: Fn(T) -> ControlFlow<T, T>,
    M: Display,
{
    let mut val = init;
    loop {
        let step = f(val);
        for message in status.try_iter() {
            info!("{message}");
        }
        val = match step {
            ControlFlow::Continue(v) => v,
            ControlFlow::Break(v) => break v,
        };
    }
}
