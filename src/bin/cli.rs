use anyhow::{anyhow, bail, Context};
use exercise_recorder::library::{export_record, summarize};
use exercise_recorder::media::format::SupportedFormats;
use exercise_recorder::session::wait_for_phase;
use exercise_recorder::*;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const USAGE: &str = "Usage: exercise-cli [--config <path>] [--synthetic] [--json] <command> [args]

Commands:
  cameras                                         list video inputs
  formats                                         list encodable formats
  record <name> [--type T] [--seconds N] [--camera ID]
  list [--type T]
  export <id> <dir>
  delete <id> --yes
  clear --yes";

/// Flags that take a value
const VALUE_FLAGS: &[&str] = &["--config", "--type", "--seconds", "--camera"];

struct Args {
    positional: Vec<String>,
    values: HashMap<String, String>,
    switches: Vec<String>,
}

impl Args {
    fn parse(mut raw: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mut positional = Vec::new();
        let mut values = HashMap::new();
        let mut switches = Vec::new();
        while let Some(arg) = raw.next() {
            if VALUE_FLAGS.contains(&arg.as_str()) {
                let value = raw
                    .next()
                    .ok_or_else(|| anyhow!("{} requires a value", arg))?;
                values.insert(arg, value);
            } else if arg.starts_with("--") {
                switches.push(arg);
            } else {
                positional.push(arg);
            }
        }
        Ok(Self {
            positional,
            values,
            switches,
        })
    }

    fn flag(&self, name: &str) -> bool {
        self.switches.iter().any(|s| s == name)
    }

    fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    fn arg(&self, index: usize, what: &str) -> anyhow::Result<&str> {
        self.positional
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("missing {}\n\n{}", what, USAGE))
    }

    fn kind(&self) -> anyhow::Result<Option<ExerciseKind>> {
        Ok(self.value("--type").map(str::parse::<ExerciseKind>).transpose()?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse(env::args().skip(1))?;
    let command = match args.positional.first() {
        Some(command) => command.clone(),
        None => {
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    };

    let config_path = args
        .value("--config")
        .map(PathBuf::from)
        .unwrap_or_else(RecorderConfig::default_path);
    let config = RecorderConfig::load(&config_path)
        .with_context(|| format!("loading configuration from {:?}", config_path))?;
    let backend: Arc<dyn CaptureBackend> = if args.flag("--synthetic") {
        Arc::new(SyntheticBackend::new())
    } else {
        default_backend()
    };

    match command.as_str() {
        "cameras" => cmd_cameras(&args, backend),
        "formats" => cmd_formats(&args),
        "record" => cmd_record(&args, config, backend).await,
        "list" => cmd_list(&args, config, backend),
        "export" => cmd_export(&args, config, backend),
        "delete" => cmd_delete(&args, config, backend),
        "clear" => cmd_clear(&args, config, backend),
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(1);
        }
    }
}

fn cmd_cameras(args: &Args, backend: Arc<dyn CaptureBackend>) -> anyhow::Result<()> {
    let devices = backend.enumerate_video_inputs()?;
    if args.flag("--json") {
        println!("{}", serde_json::to_string(&devices)?);
    } else {
        for d in devices {
            println!("{}: {}", d.id, d.label);
        }
    }
    Ok(())
}

fn cmd_formats(args: &Args) -> anyhow::Result<()> {
    let formats = SupportedFormats::probe();
    if args.flag("--json") {
        println!("{}", serde_json::to_string(&formats)?);
    } else {
        println!("video: {}", formats.video.join(", "));
        println!("audio: {}", formats.audio.join(", "));
    }
    Ok(())
}

async fn cmd_record(
    args: &Args,
    config: RecorderConfig,
    backend: Arc<dyn CaptureBackend>,
) -> anyhow::Result<()> {
    let form = SessionForm::new(args.arg(1, "exercise name")?, args.kind()?);
    let seconds: u64 = args.value("--seconds").unwrap_or("5").parse()?;
    let tick = Duration::from_millis(config.recording.tick_ms);

    let (controller, events) = build_controller(config, backend)?;
    let mut phases = controller.subscribe();
    let shared: SharedController = Arc::new(tokio::sync::Mutex::new(controller));
    let driver = tokio::spawn(run_session_loop(shared.clone(), events, tick));

    let (interrupt_tx, mut interrupt_rx) = tokio::sync::mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(());
    })?;

    {
        let mut controller = shared.lock().await;
        let device = controller.select_camera(args.value("--camera"))?;
        controller.start_recording(form.clone())?;
        eprintln!(
            "Recording '{}' from {} for {}s (Ctrl-C to stop early)",
            form.label, device.label, seconds
        );
    }

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
        _ = interrupt_rx.recv() => eprintln!("Stopping early"),
    }

    shared.lock().await.stop_recording()?;
    let phase = wait_for_phase(
        &mut phases,
        &[SessionPhase::Reviewing, SessionPhase::Armed],
        Duration::from_secs(30),
    )
    .await?;

    let result = {
        let mut controller = shared.lock().await;
        let saved = if phase == SessionPhase::Reviewing {
            controller.save(form).map_err(anyhow::Error::from)
        } else {
            Err(match controller.take_last_error() {
                Some(e) => anyhow!("{}", e),
                None => anyhow!("recording failed"),
            })
        };
        controller.shutdown();
        saved
    };
    driver.abort();

    let record = result?;
    if args.flag("--json") {
        println!("{}", serde_json::to_string(&library::ExerciseSummary::from(&record))?);
    } else {
        println!(
            "Saved '{}' ({}), duration {}, {} bytes",
            record.name,
            record.id,
            record.duration_label,
            record.payload_bytes()
        );
    }
    Ok(())
}

fn cmd_list(args: &Args, config: RecorderConfig, backend: Arc<dyn CaptureBackend>) -> anyhow::Result<()> {
    let (controller, _events) = build_controller(config, backend)?;
    let kind = args.kind()?;
    let summaries = summarize(controller.store().list(), kind.as_ref());
    if args.flag("--json") {
        println!("{}", serde_json::to_string(&summaries)?);
    } else if summaries.is_empty() {
        println!("No exercises recorded yet");
    } else {
        for s in summaries {
            println!(
                "{}  {}  {}  {}{}",
                s.id,
                s.created_at.format("%Y-%m-%d %H:%M"),
                s.duration_label,
                s.name,
                s.kind.map(|k| format!(" [{}]", k)).unwrap_or_default()
            );
        }
    }
    Ok(())
}

fn cmd_export(args: &Args, config: RecorderConfig, backend: Arc<dyn CaptureBackend>) -> anyhow::Result<()> {
    let id: u64 = args.arg(1, "exercise id")?.parse()?;
    let dir = args.arg(2, "output directory")?;
    let (controller, _events) = build_controller(config, backend)?;
    let record = controller
        .store()
        .get(id)
        .ok_or_else(|| anyhow!("exercise {} not found", id))?;
    for path in export_record(record, dir)? {
        println!("{}", path.display());
    }
    Ok(())
}

fn cmd_delete(args: &Args, config: RecorderConfig, backend: Arc<dyn CaptureBackend>) -> anyhow::Result<()> {
    let id: u64 = args.arg(1, "exercise id")?.parse()?;
    let (mut controller, _events) = build_controller(config, backend)?;
    if !controller.delete_exercise(id, args.flag("--yes"))? {
        bail!("exercise {} not found", id);
    }
    println!("Deleted exercise {}", id);
    Ok(())
}

fn cmd_clear(args: &Args, config: RecorderConfig, backend: Arc<dyn CaptureBackend>) -> anyhow::Result<()> {
    let (mut controller, _events) = build_controller(config, backend)?;
    let count = controller.store().len();
    controller.clear_exercises(args.flag("--yes"))?;
    println!("Deleted {} exercises", count);
    Ok(())
}
