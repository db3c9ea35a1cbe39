use camfeed::platform::SyntheticBackend;
use camfeed::preferences::{FilePreferenceStore, MemoryPreferenceStore, PreferenceStore};
use camfeed::{CamfeedConfig, DisplayInfo, FrameListener, Rotation, Session};
use crossbeam_channel::{unbounded, Receiver, Sender};
use image::RgbImage;
use serde::Serialize;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_DISPLAY: (u32, u32) = (1080, 1920);

#[derive(Debug, Serialize)]
struct PreviewEvent {
    width: u32,
    height: u32,
    timestamp_ms: u64,
}

struct ChannelListener {
    previews: Sender<PreviewEvent>,
    captures: Sender<RgbImage>,
}

impl FrameListener for ChannelListener {
    fn on_preview(&self, image: &RgbImage, timestamp_ms: u64) {
        let _ = self.previews.send(PreviewEvent {
            width: image.width(),
            height: image.height(),
            timestamp_ms,
        });
    }

    fn on_capture(&self, image: RgbImage) {
        let _ = self.captures.send(image);
    }
}

struct Options {
    json: bool,
    frames: u64,
    rotation: Rotation,
    camera: Option<usize>,
    positional: Vec<String>,
}

fn parse_options(args: &[String]) -> Result<Options, Box<dyn std::error::Error>> {
    let mut options = Options {
        json: false,
        frames: 30,
        rotation: Rotation::Deg0,
        camera: None,
        positional: Vec::new(),
    };

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--json" => options.json = true,
            "--frames" => {
                i += 1;
                options.frames = args.get(i).ok_or("--frames needs a value")?.parse()?;
            }
            "--rotation" => {
                i += 1;
                let degrees: u32 = args.get(i).ok_or("--rotation needs a value")?.parse()?;
                options.rotation =
                    Rotation::from_degrees(degrees).ok_or("rotation must be 0, 90, 180 or 270")?;
            }
            "--camera" => {
                i += 1;
                options.camera = Some(args.get(i).ok_or("--camera needs a value")?.parse()?);
            }
            other => options.positional.push(other.to_string()),
        }
        i += 1;
    }
    Ok(options)
}

fn open_session(
    options: &Options,
    display: DisplayInfo,
) -> Result<(Session, Receiver<PreviewEvent>, Receiver<RgbImage>), Box<dyn std::error::Error>> {
    let config = CamfeedConfig::load_or_default();
    let prefs: Box<dyn PreferenceStore> = match options.camera {
        Some(id) => Box::new(MemoryPreferenceStore::with_camera_id(id)),
        None => Box::new(FilePreferenceStore::new(&config.preferences.path)),
    };
    let (previews, preview_rx) = unbounded();
    let (captures, capture_rx) = unbounded();
    let listener = Arc::new(ChannelListener { previews, captures });
    let session = Session::new(
        Box::new(SyntheticBackend::phone()),
        listener,
        display,
        prefs,
        config,
    )?;
    Ok((session, preview_rx, capture_rx))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    camfeed::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: camfeed-cli <command> [args]");
        eprintln!("Commands: list-devices, sizes, preview, capture");
        std::process::exit(1);
    }

    let options = parse_options(&args)?;
    let command = &args[1];
    match command.as_str() {
        "list-devices" => cmd_list_devices(&options),
        "sizes" => cmd_sizes(&options),
        "preview" => cmd_preview(&options),
        "capture" => cmd_capture(&options),
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

fn cmd_list_devices(options: &Options) -> Result<(), Box<dyn std::error::Error>> {
    use camfeed::CameraBackend;

    let devices = SyntheticBackend::phone().list_devices();
    if options.json {
        println!("{}", serde_json::to_string(&devices)?);
    } else {
        for d in devices {
            println!("{}: {} ({:?})", d.id, d.name, d.facing);
        }
    }
    Ok(())
}

fn cmd_sizes(options: &Options) -> Result<(), Box<dyn std::error::Error>> {
    if options.positional.len() < 2 {
        eprintln!("Usage: camfeed-cli sizes <display_width> <display_height> [--rotation DEG]");
        std::process::exit(1);
    }
    let width: u32 = options.positional[0].parse()?;
    let height: u32 = options.positional[1].parse()?;
    let display = DisplayInfo::new(width, height, options.rotation);

    let (session, _, _) = open_session(options, display)?;
    session.open()?;
    let preview = session.preview_size().ok_or("no preview size")?;
    let capture = session.capture_size().ok_or("no capture size")?;
    let transform = session.transform().ok_or("no transform")?;
    session.close();

    if options.json {
        let report = serde_json::json!({
            "camera": session.camera_id(),
            "preview": preview,
            "capture": capture,
            "rotation": transform.rotation().degrees(),
            "flipped": transform.is_flipped(),
            "corrected": transform.output_size(),
        });
        println!("{}", report);
    } else {
        println!("camera:    {}", session.camera_id());
        println!("preview:   {}", preview);
        println!("capture:   {}", capture);
        println!(
            "corrected: {} (rotate {}{})",
            transform.output_size(),
            transform.rotation().degrees(),
            if transform.is_flipped() { ", flipped" } else { "" }
        );
    }
    Ok(())
}

fn cmd_preview(options: &Options) -> Result<(), Box<dyn std::error::Error>> {
    let display = DisplayInfo::new(DEFAULT_DISPLAY.0, DEFAULT_DISPLAY.1, options.rotation);
    let (session, previews, _) = open_session(options, display)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

    session.start()?;
    let mut received = 0;
    while received < options.frames && !interrupted.load(Ordering::SeqCst) {
        match previews.recv_timeout(Duration::from_secs(2)) {
            Ok(event) => {
                received += 1;
                if options.json {
                    println!("{}", serde_json::to_string(&event)?);
                } else {
                    println!(
                        "Frame {}: {}x{} @ {} ms",
                        received, event.width, event.height, event.timestamp_ms
                    );
                }
            }
            Err(_) => {
                eprintln!("Timeout waiting for preview");
                break;
            }
        }
    }
    session.stop();

    let stats = session.stats();
    if options.json {
        println!("{}", serde_json::to_string(&stats)?);
    } else {
        println!(
            "delivered {}, recycled {}, stale {}, decode failures {}",
            stats.previews_delivered,
            stats.suppressed_recycled,
            stats.stale_dropped,
            stats.decode_failures
        );
    }
    Ok(())
}

fn cmd_capture(options: &Options) -> Result<(), Box<dyn std::error::Error>> {
    let output = options.positional.first().ok_or("output path required")?;
    let display = DisplayInfo::new(DEFAULT_DISPLAY.0, DEFAULT_DISPLAY.1, options.rotation);
    let (session, previews, captures) = open_session(options, display)?;

    session.start()?;
    // Let the stream settle before capturing.
    let _ = previews.recv_timeout(Duration::from_secs(2));
    session.take_capture()?;
    let image = captures.recv_timeout(Duration::from_secs(10));
    session.stop();

    let image = image.map_err(|_| "capture timed out")?;
    image.save(output)?;
    println!("Saved {}x{} capture to {}", image.width(), image.height(), output);
    Ok(())
}
