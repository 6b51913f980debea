//! octavo CLI: headless playback and WAV export of a demo arrangement.
//!
//! Usage:
//!   oc-cli --seconds 8
//!   oc-cli --bpm 96 --metronome --wav output.wav

use clap::Parser;
use oc_audio::CpalHost;
use oc_ir::{MidiNote, TrackKind};
use oc_master::Project;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "oc-cli", about = "Play or render a short octavo arrangement")]
struct Args {
    /// Engine config file (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 120.0)]
    bpm: f64,

    /// How long to play or render
    #[arg(long, default_value_t = 8.0)]
    seconds: f64,

    /// Render to this WAV file instead of the sound card
    #[arg(long)]
    wav: Option<PathBuf>,

    #[arg(long)]
    metronome: bool,

    /// Loop the first two bars
    #[arg(long = "loop")]
    looped: bool,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let loaded = match &args.config {
        Some(path) => oc_master::load_config(path),
        None => oc_master::load_default_config(),
    };
    let config = loaded.unwrap_or_else(|e| {
        eprintln!("Failed to load config: {}", e);
        std::process::exit(1);
    });

    match &args.wav {
        Some(path) => {
            let mut project = Project::offline(config);
            build_demo(&mut project, &args);
            render_to_wav(&mut project, path, args.seconds);
        }
        None => {
            let mut project = Project::new(config, Box::new(CpalHost::new()));
            build_demo(&mut project, &args);
            play_audio(&mut project, args.seconds);
            project.close();
        }
    }
}

/// A bass line and a chord stab on separate tracks, summed through a bus.
fn build_demo(project: &mut Project, args: &Args) {
    project.set_name("demo");
    project.set_bpm(args.bpm);
    project.set_metronome(args.metronome);
    if args.looped {
        project.set_loop(0.0, 8.0, true);
    }

    let bus = project.add_track("synths", TrackKind::bus());
    let bass = project.add_track("bass", TrackKind::midi());
    let keys = project.add_track("keys", TrackKind::midi());
    project.set_output(bass, Some(bus));
    project.set_output(keys, Some(bus));
    project.set_volume(keys, 0.6);
    project.set_pan(keys, 0.3);

    let line = project.create_midi_clip("bass line", 8.0);
    for (i, pitch) in [36u8, 36, 43, 41, 36, 36, 39, 41].into_iter().enumerate() {
        project.add_note(line, MidiNote::new(pitch, 110, i as f64, 0.75));
    }
    let stab = project.create_midi_clip("stabs", 8.0);
    for start in [0.0, 2.5, 4.0, 6.5] {
        for pitch in [60u8, 63, 67] {
            project.add_note(stab, MidiNote::new(pitch, 80, start, 0.5));
        }
    }
    for bar in 0..4 {
        project.place_clip(bass, line, bar as f64 * 8.0);
        project.place_clip(keys, stab, bar as f64 * 8.0);
    }

    println!("Project:  {}", project.name());
    println!("Tempo:    {} BPM", project.bpm());
    println!("Tracks:   {}", project.tracks().len());
    println!("Clips:    {}", project.clips().len());
    println!();
}

fn play_audio(project: &mut Project, seconds: f64) {
    if !project.audio().is_available() {
        eprintln!("No audio output available; try --wav.");
        std::process::exit(1);
    }
    let interval = Duration::from_secs_f64(project.config().core.tick_interval());
    project.play();
    println!("Playing...");

    let started = Instant::now();
    while started.elapsed().as_secs_f64() < seconds {
        project.tick();
        print!(
            "\rBeat: {:7.2} | Level: {:>9}",
            project.position(),
            project.master_level().to_string()
        );
        let _ = std::io::stdout().flush();
        std::thread::sleep(interval);
    }

    project.stop();
    println!("\rDone.                              ");
}

fn render_to_wav(project: &mut Project, path: &Path, seconds: f64) {
    let rate = project.audio().sample_rate().unwrap_or_default();
    println!("Rendering {}s to {} at {} Hz...", seconds, path.display(), rate);

    project.play();
    let wav = project.export_wav(seconds).unwrap_or_else(|e| {
        eprintln!("Render failed: {}", e);
        std::process::exit(1);
    });
    println!("Rendered {} bytes", wav.len());

    std::fs::write(path, &wav).unwrap_or_else(|e| {
        eprintln!("Failed to write {}: {}", path.display(), e);
        std::process::exit(1);
    });

    println!("Done.");
}
