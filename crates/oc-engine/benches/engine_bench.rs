//! Rendering and scheduling benchmarks.
//!
//! Run with: cargo bench --bench engine_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use oc_engine::{
    AudioGraphManager, CoreConfig, Frame, MetronomeConfig, OfflineHost, Session, Track, Transport,
    VoiceConfig, VoiceScheduler,
};
use oc_ir::{ClipInstance, ClipPool, MidiClip, MidiNote, TimeSignature, TrackKind};

fn manager() -> AudioGraphManager {
    let mut audio = AudioGraphManager::new(Box::new(OfflineHost::new(48_000)), CoreConfig::default());
    audio.init().expect("offline host");
    audio
}

/// A chord of `voices` sustained notes on one track.
fn chord(audio: &AudioGraphManager, voices: u8) -> (VoiceScheduler, Vec<Track>) {
    let mut scheduler = VoiceScheduler::new(VoiceConfig::default(), MetronomeConfig::default(), 0.1);
    let mut track = Track::new("pad", TrackKind::midi());
    track.attach(audio, audio.master_input());
    for i in 0..voices {
        scheduler.note_on(&mut track, 48 + i, 100, 0.0);
    }
    let mut tracks = vec![track];
    scheduler.process(audio, &mut tracks, &ClipPool::new(), 0.0);
    (scheduler, tracks)
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_block");
    for voices in [1u8, 8, 32] {
        let audio = manager();
        let (_scheduler, _tracks) = chord(&audio, voices);
        let mut block = vec![Frame::silence(); 512];
        group.bench_with_input(BenchmarkId::from_parameter(voices), &voices, |b, _| {
            b.iter(|| {
                audio.with_graph(|g| g.render(&mut block));
                black_box(block[0])
            })
        });
    }
    group.finish();
}

fn bench_schedule(c: &mut Criterion) {
    let audio = manager();
    let mut clips = ClipPool::new();
    let mut clip = MidiClip::new("arp", 16.0);
    for step in 0..64 {
        clip.add_note(MidiNote::new(60 + (step % 12) as u8, 100, step as f64 * 0.25, 0.25));
    }
    let clip = clips.insert(clip);

    c.bench_function("play_64_notes", |b| {
        b.iter(|| {
            let mut scheduler = VoiceScheduler::new(VoiceConfig::default(), MetronomeConfig::default(), 0.1);
            let mut track = Track::new("arp", TrackKind::midi());
            track.add_instance(ClipInstance::new(clip, 0.0));
            let mut tracks = vec![track];
            let mut transport = Transport::default();
            let mut session = Session {
                audio: &audio,
                scheduler: &mut scheduler,
                tracks: &mut tracks,
                clips: &clips,
                time_signature: TimeSignature::default(),
            };
            transport.play(&mut session, 0.0);
            black_box(transport.advance(&mut session, 0.0))
        })
    });
}

criterion_group!(benches, bench_render, bench_schedule);
criterion_main!(benches);
