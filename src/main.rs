#![warn(unused_extern_crates)]
use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal;
use image::RgbaImage;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{Level, debug, error, info, span, trace, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use jewel_tryon::accessory::AccessoryKind;
use jewel_tryon::catalog::{Category, Material};
use jewel_tryon::config::Config;
use jewel_tryon::error::SnapshotError;
use jewel_tryon::placement::PlacementEngine;
use jewel_tryon::render::Canvas;
use jewel_tryon::session::TryOnSession;
use jewel_tryon::snapshot::{self, ShareTarget};
use jewel_tryon::tracking::{LandmarkFeed, LandmarkSource, Observation};
use jewel_tryon::video::{CaptureSession, FacingMode, OutputVideoStream};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct CmdArgs {
    /// Config file to read from. Built-in defaults are used if unset
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Target frame rate
    #[arg(long)]
    fps: Option<u32>,

    /// Address to receive landmark packets on, e.g. 127.0.0.1:39540
    #[arg(long)]
    listen: Option<String>,

    /// Start on the rear camera
    #[arg(long)]
    back: bool,

    #[command(flatten)]
    out: Out,

    /// Process single input frame, reading from input path
    #[arg(short, long, requires = "output", requires = "landmarks")]
    input: Option<PathBuf>,

    /// Landmark JSON for the single input frame
    #[arg(long, requires = "input")]
    landmarks: Option<PathBuf>,

    /// Accessory to wear in single frame mode, as KIND=PATH (repeatable)
    #[arg(short, long, value_parser = parse_wear)]
    wear: Vec<(AccessoryKind, PathBuf)>,
}

#[derive(Args, Debug)]
#[group(multiple = false)]
struct Out {
    /// Loopback device to write to. Displays in window if unset
    #[arg(group = "dest", short, long)]
    device: Option<String>,

    /// Process single input frame, writing to output path
    #[arg(group = "dest", short, long, requires = "input")]
    output: Option<PathBuf>,
}

fn parse_wear(s: &str) -> Result<(AccessoryKind, PathBuf), String> {
    let (kind, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KIND=PATH, got '{s}'"))?;
    let kind = AccessoryKind::from_type_name(&kind.to_lowercase())
        .ok_or_else(|| format!("unknown accessory '{kind}'"))?;
    Ok((kind, PathBuf::from(path)))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Action {
    Category(Category),
    Material(Material),
    Next,
    Prev,
    Snapshot,
    Share,
    ToggleCamera,
    Quit,
}

fn key_action(code: KeyCode) -> Option<Action> {
    let action = match code {
        KeyCode::Char(c @ '1'..='5') => {
            Action::Category(Category::ALL[c as usize - '1' as usize])
        }
        KeyCode::Char('g') => Action::Material(Material::Gold),
        KeyCode::Char('d') => Action::Material(Material::Diamond),
        KeyCode::Char('n') | KeyCode::Right => Action::Next,
        KeyCode::Char('p') | KeyCode::Left => Action::Prev,
        KeyCode::Char('s') => Action::Snapshot,
        KeyCode::Char('x') => Action::Share,
        KeyCode::Char('c') => Action::ToggleCamera,
        KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
        _ => return None,
    };
    Some(action)
}

/// Raw terminal mode for the lifetime of the guard.
struct RawMode;

impl RawMode {
    fn enable() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            error!("Failed to restore terminal: {e:?}");
        }
    }
}

fn poll_keys() -> Result<Vec<Action>> {
    let mut actions = Vec::new();
    while event::poll(Duration::ZERO)? {
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if let Some(action) = key_action(key.code) {
                actions.push(action);
            }
        }
    }
    Ok(actions)
}

fn main() -> Result<()> {
    let filter = EnvFilter::from_default_env();
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_env_filter(filter)
        .init();

    let args = CmdArgs::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(fps) = args.fps {
        config.capture.fps = fps;
    }
    if let Some(device) = &args.out.device {
        config.capture.device = Some(device.clone());
    }
    config.validate()?;

    let mut session = TryOnSession::new(
        PlacementEngine::new(config.placement.clone()),
        config.catalog.clone(),
    );

    if let Some(output) = args.out.output {
        // Process single image at file and exit
        let input = args.input.ok_or_else(|| anyhow!("--output requires --input"))?;
        let landmarks = args
            .landmarks
            .ok_or_else(|| anyhow!("--output requires --landmarks"))?;
        return process_image(input, output, landmarks, &args.wear, &config, &mut session);
    }

    let facing = if args.back {
        FacingMode::Back
    } else {
        FacingMode::Front
    };
    let listen = args.listen.unwrap_or_else(|| config.tracker.addr());
    run_live(facing, &listen, &config, &mut session)
}

fn process_image(
    src: PathBuf,
    dest: PathBuf,
    landmarks: PathBuf,
    wear: &[(AccessoryKind, PathBuf)],
    config: &Config,
    session: &mut TryOnSession,
) -> Result<()> {
    let img: RgbaImage = image::open(&src)
        .with_context(|| format!("Failed to open {}", src.display()))?
        .into();
    let observation = Observation::from_file(&landmarks, &config.detector)?;

    for (kind, path) in wear {
        pollster::block_on(session.assets_mut().change(*kind, path.clone()))?;
    }

    session.observe(&observation);
    let mut canvas = Canvas::new(img);
    let ops = session.render(&mut canvas);
    debug!("Drew {} accessories", ops.len());

    canvas.into_image().save(&dest)?;
    info!("Wrote {}", dest.display());
    Ok(())
}

fn run_live(
    facing: FacingMode,
    listen: &str,
    config: &Config,
    session: &mut TryOnSession,
) -> Result<()> {
    let mut camera = CaptureSession::open(facing, &config.capture)?;
    let mut feed = LandmarkFeed::new(
        listen,
        config.tracker.helper_command.clone(),
        config.detector.clone(),
    )?;
    let mut output_stream: Option<OutputVideoStream> = None;
    let share = ShareTarget::from(&config.snapshot);
    let mut last_snapshot: Option<PathBuf> = None;

    let raw = match RawMode::enable() {
        Ok(raw) => Some(raw),
        Err(e) => {
            warn!("Keyboard controls unavailable: {e}");
            None
        }
    };
    info!("Keys: 1-5 category, g/d material, n/p item, s snapshot, x share, c camera, q quit");

    'frames: loop {
        let span = span!(Level::INFO, "frame_loop_iter");
        let _guard = span.enter();

        let get_frame_span = span!(Level::DEBUG, "get_frame");
        let get_frame_guard = get_frame_span.enter();
        let frame = match camera.frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to pull frame from webcam: {e:?}");
                break;
            }
        };
        drop(get_frame_guard);

        let actions = if raw.is_some() { poll_keys()? } else { Vec::new() };
        for action in actions {
            match action {
                Action::Quit => break 'frames,
                Action::Category(category) => session.select_category(category),
                Action::Material(material) => session.select_material(material),
                Action::Next => session.next_item(),
                Action::Prev => session.prev_item(),
                Action::Snapshot => match session.snapshot(&frame) {
                    Ok(shot) => match snapshot::save(&config.snapshot.dir, &shot) {
                        Ok(path) => last_snapshot = Some(path),
                        Err(e) => error!("Failed to save snapshot: {e}"),
                    },
                    Err(e @ SnapshotError::NothingToCapture) => warn!("{e}"),
                    Err(e) => error!("Snapshot failed: {e}"),
                },
                Action::Share => match &last_snapshot {
                    Some(path) => match share.share(path) {
                        Ok(_) => {}
                        Err(e @ SnapshotError::ShareUnsupported(_)) => warn!("{e}"),
                        Err(e) => error!("{e}"),
                    },
                    None => warn!("Take a snapshot before sharing"),
                },
                Action::ToggleCamera => {
                    let next = match camera.facing() {
                        FacingMode::Front => FacingMode::Back,
                        FacingMode::Back => FacingMode::Front,
                    };
                    switch_camera(&mut camera, next, &mut feed, session);
                    // Frame belongs to the old camera
                    continue 'frames;
                }
            }
        }

        if let Some(next) = session.take_pending_facing() {
            if next != camera.facing() {
                switch_camera(&mut camera, next, &mut feed, session);
                // Frame belongs to the old camera
                continue;
            }
        }

        let detect_span = span!(Level::DEBUG, "detect");
        let detect_guard = detect_span.enter();
        if let Err(e) = feed.send_frame(&frame) {
            warn!("{e}");
        }
        match feed.poll() {
            Ok(Some(observation)) => {
                session.observe(&observation);
            }
            Ok(None) => trace!("No new landmarks"),
            Err(e) => warn!("Dropping landmark packet: {e}"),
        }
        drop(detect_guard);

        if output_stream.as_ref().map(|o| o.size()) != Some(frame.dimensions()) {
            drop(output_stream.take());
            output_stream = Some(OutputVideoStream::new(
                frame.width(),
                frame.height(),
                config.capture.device.as_deref(),
            )?);
        }

        let mut canvas = Canvas::new(frame);
        session.render(&mut canvas);

        let write_frame_span = span!(Level::DEBUG, "write_frame");
        let write_frame_guard = write_frame_span.enter();
        if let Some(out) = output_stream.as_mut() {
            match out.write_frame(canvas.image()) {
                Ok(_) => trace!("Rendered frame."),
                Err(e) => error!("Failed to render frame: {e:?}"),
            }
        }
        drop(write_frame_guard);
    }

    camera.stop();
    Ok(())
}

fn switch_camera(
    camera: &mut CaptureSession,
    facing: FacingMode,
    feed: &mut LandmarkFeed,
    session: &mut TryOnSession,
) {
    // The helper may still be working on old-camera frames
    if let Err(e) = feed.restart() {
        warn!("Failed to clear landmark feed: {e}");
    }

    match camera.switch(facing) {
        Ok(_) => {
            info!("Switched to {facing:?} camera");
            session.camera_switched();
        }
        Err(e) => error!("Failed to switch camera: {e}"),
    }
}
