//! trackjam CLI: headless playback of a built-in demo song.
//!
//! Usage:
//!   cargo run --bin tj-cli
//!   cargo run --bin tj-cli -- --bpm 96 --seconds 20 --loop
//!   cargo run --bin tj-cli -- --jam --config sequencer.json
//!
//! Set `RUST_LOG=debug` to watch voices being scheduled.

use std::io::Write;
use std::time::{Duration, Instant};
use std::{env, process};

use tj_ir::{Event, ModuleParam, Note, ParamId, Pattern, Song, SongType};
use tj_master::{load_config, Controller, Edit, SequencerConfig, SystemRenderer};

struct Options {
    bpm: Option<f64>,
    seconds: f64,
    jam: bool,
    looping: bool,
    metronome: bool,
    config: Option<String>,
}

fn parse_args() -> Options {
    let args: Vec<String> = env::args().skip(1).collect();
    let value = |flag: &str| {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };
    let number = |flag: &str| {
        value(flag).map(|v| {
            v.parse::<f64>().unwrap_or_else(|_| {
                eprintln!("{} expects a number, got {}", flag, v);
                process::exit(1);
            })
        })
    };

    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("Usage: tj-cli [--bpm N] [--seconds N] [--jam] [--loop] [--metronome] [--config file.json]");
        process::exit(0);
    }

    Options {
        bpm: number("--bpm"),
        seconds: number("--seconds").unwrap_or(8.0),
        jam: args.iter().any(|a| a == "--jam"),
        looping: args.iter().any(|a| a == "--loop"),
        metronome: args.iter().any(|a| a == "--metronome"),
        config: value("--config"),
    }
}

/// Two 16-step patterns over four channels: drums, bass, lead and a
/// filter sweep.
fn demo_song() -> Song {
    let mut song = Song::with_channels("Demo", 4);
    for (i, name) in ["Drums", "Bass", "Lead", "Filter"].iter().enumerate() {
        song.instruments[i].name.clear();
        let _ = song.instruments[i].name.try_push_str(name);
    }

    let mut verse = Pattern::new(16, 4);
    let mut chorus = Pattern::new(16, 4);
    for step in (0..16).step_by(4) {
        verse.set_step(0, step, Event::note_on(Note::C, 2, 0));
        chorus.set_step(0, step, Event::note_on(Note::C, 2, 0));
        chorus.set_step(0, step + 2, Event::note_on(Note::FSharp, 2, 0));
    }
    for (step, note) in [(0, Note::A), (6, Note::A), (8, Note::F), (12, Note::G)] {
        verse.set_step(1, step, Event::note_on(note, 1, 1));
    }
    for (step, note) in [(0, Note::D), (8, Note::E)] {
        chorus.set_step(1, step, Event::note_on(note, 1, 1));
    }
    verse.set_step(2, 0, Event::note_on(Note::E, 4, 2));
    verse.set_step(2, 4, Event::note_on(Note::G, 4, 2));
    verse.set_step(2, 10, Event::note_off(2));
    chorus.set_step(2, 0, Event::note_on(Note::A, 4, 2));
    chorus.set_step(2, 8, Event::note_on(Note::B, 4, 2));
    for step in (0..16).step_by(2) {
        let value = f32::from(step) * 100.0 / 15.0;
        chorus.set_step(3, step, Event::automation(3, ModuleParam::new(ParamId(0), value, true)));
    }

    let verse = song.add_pattern(verse);
    let chorus = song.add_pattern(chorus);
    for index in [verse, verse, chorus, chorus] {
        song.add_order(index);
    }
    song
}

fn main() {
    env_logger::init();
    let options = parse_args();

    let mut config = match &options.config {
        Some(path) => load_config(path).unwrap_or_else(|e| {
            eprintln!("Failed to load {}: {}", path, e);
            process::exit(1);
        }),
        None => SequencerConfig::default(),
    };
    if options.metronome {
        config.metronome.enabled = true;
    }
    log::debug!("sequencer config: {:?}", config);

    let mut song = demo_song();
    if options.jam {
        song.song_type = SongType::Jam;
    }

    let mut ctrl = Controller::with_system_renderer(song, config);
    if let Some(bpm) = options.bpm {
        ctrl.apply_edit(Edit::SetTempo(bpm)).unwrap_or_else(|e| {
            eprintln!("{}", e);
            process::exit(1);
        });
    }
    ctrl.set_looping(options.looping);

    let song = ctrl.song();
    println!("Title:    {}", song.title);
    println!("Mode:     {:?}", song.song_type);
    println!("Channels: {}", song.channel_count());
    println!("Patterns: {}", song.patterns.len());
    println!("Orders:   {}", song.order.len());
    println!("Tempo:    {} BPM", song.meta.tempo);
    println!();

    play(&mut ctrl, &options);
}

fn play(ctrl: &mut Controller<SystemRenderer>, options: &Options) {
    if let Err(e) = ctrl.play() {
        eprintln!("Failed to start playback: {}", e);
        process::exit(1);
    }
    println!("Playing...");
    println!();

    let started = Instant::now();
    let run_for = Duration::from_secs_f64(options.seconds.max(0.0));
    let mut switched = false;

    while ctrl.is_playing() && started.elapsed() < run_for {
        ctrl.pump();
        ctrl.renderer_mut().process();

        // Halfway through a jam, move the bass to the chorus line.
        if options.jam && !switched && started.elapsed() >= run_for / 2 {
            switched = ctrl.set_jam_channel_position(1, 1);
            if switched {
                log::info!("bass switches to the chorus line at the next bar");
            }
        }

        print!("\r{} | Voices: {:2}", ctrl.position(), ctrl.renderer().sounding_count());
        let _ = std::io::stdout().flush();
        std::thread::sleep(Duration::from_millis(5));
    }

    ctrl.stop();
    ctrl.renderer_mut().stop();
    println!("\rDone.                                        ");
}
