use std::env;

use anyhow::{anyhow, Context, Result};

use stagecraft_runtime::app::{
    load_scene_file, print_compiled_scripts, print_events, print_final_state,
    print_scene_summary, Session,
};
use stagecraft_runtime::RuntimeConfig;

const USAGE: &str =
    "Usage: stagecraft <scene.xml|scene.json> [--frames N] [--delta S] [--config file] [--dump-ops]";

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {}

fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;
    let mut config = match &options.config {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::default(),
    };
    if let Some(frames) = options.frames {
        config.frames = frames;
    }
    if let Some(delta) = options.delta {
        config.frame_delta = delta;
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_filter))
        .init();

    let scene = load_scene_file(&options.path)?;
    print_scene_summary(&scene);
    if options.dump_ops {
        print_compiled_scripts(&scene)?;
    }

    let frames = config.frames;
    let mut session = Session::new(config);
    session.load_scene(&scene)?;
    session.run_frames(frames);
    println!(
        "Simulated {} frame(s) ({:.2}s)",
        session.frame(),
        session.manager().elapsed()
    );

    print_events(&session.drain_events());
    print_final_state(session.manager());
    Ok(())
}

struct CliOptions {
    path: String,
    frames: Option<u32>,
    delta: Option<f32>,
    config: Option<String>,
    dump_ops: bool,
}

impl CliOptions {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let Some(path) = args.next() else {
            return Err(anyhow!(USAGE));
        };
        let mut options = Self {
            path,
            frames: None,
            delta: None,
            config: None,
            dump_ops: false,
        };
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--frames" => {
                    let value = args.next().ok_or_else(|| anyhow!("--frames needs a value"))?;
                    options.frames = Some(
                        value
                            .parse()
                            .with_context(|| format!("invalid frame count {value}"))?,
                    );
                }
                "--delta" => {
                    let value = args.next().ok_or_else(|| anyhow!("--delta needs a value"))?;
                    let delta: f32 = value
                        .parse()
                        .with_context(|| format!("invalid frame delta {value}"))?;
                    if !(delta.is_finite() && delta > 0.0) {
                        return Err(anyhow!("frame delta must be positive, got {value}"));
                    }
                    options.delta = Some(delta);
                }
                "--config" => {
                    options.config =
                        Some(args.next().ok_or_else(|| anyhow!("--config needs a path"))?);
                }
                "--dump-ops" => options.dump_ops = true,
                other => {
                    return Err(anyhow!("Unknown argument: {other}. {USAGE}"));
                }
            }
        }
        Ok(options)
    }
}
