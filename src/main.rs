//! Headless playback demo.
//!
//! Runs a synthetic demuxer, one decode worker per stream and a video
//! presenter against the sync engine, then reports the sync counters.
//! Set `RUST_LOG` to adjust verbosity.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use avsync::core::lock::{LockManager, RawMutexLockManager};
use avsync::core::time::{self, TimeBase};
use avsync::playback::BufferGate;
use avsync::{PlaybackCommand, PlaybackEngine, PopMode, Popped, SessionConfig, Stream, StreamKind, Verdict};

const MEDIA_SECONDS: f64 = 4.0;
const VIDEO_TIME_BASE: TimeBase = TimeBase::new(1, 90_000);
const AUDIO_TIME_BASE: TimeBase = TimeBase::new(1, 48_000);
const VIDEO_FRAME_TICKS: i64 = 3_600; // 25 fps
const AUDIO_FRAME_TICKS: i64 = 1_024;

/// Decoded picture waiting for presentation
struct VideoFrame {
    pts: f64,
    duration: f64,
    serial: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "avsync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SessionConfig {
        framedrop: true,
        ..SessionConfig::default()
    };
    let mut engine = PlaybackEngine::new(config);
    let video = engine.open_stream(StreamKind::Video, 0, VIDEO_TIME_BASE);
    let audio = engine.open_stream(StreamKind::Audio, 1, AUDIO_TIME_BASE);
    engine.process_command(PlaybackCommand::Play);

    let lock_manager = Arc::new(RawMutexLockManager);
    let codec_lock = Arc::new(lock_manager.create());

    let demuxer = {
        let streams = [Arc::clone(&video), Arc::clone(&audio)];
        let gate = Arc::clone(engine.buffer_gate());
        thread::spawn(move || demux(streams, gate))
    };

    let (frame_tx, frame_rx) = channel::bounded::<VideoFrame>(3);
    let video_decoder = {
        let video = Arc::clone(&video);
        let lock_manager = Arc::clone(&lock_manager);
        let codec_lock = Arc::clone(&codec_lock);
        thread::spawn(move || {
            decode_loop(&video, |packet_pts, duration, serial, n| {
                with_codec_lock(lock_manager.as_ref(), &*codec_lock, || {
                    // Every 40th frame is expensive to decode
                    let cost = if n % 40 == 39 { 300 } else { 5 };
                    thread::sleep(Duration::from_millis(cost));
                });
                frame_tx.send(VideoFrame { pts: packet_pts, duration, serial }).is_ok()
            })
        })
    };

    let audio_output = {
        let audio = Arc::clone(&audio);
        let lock_manager = Arc::clone(&lock_manager);
        let codec_lock = Arc::clone(&codec_lock);
        thread::spawn(move || {
            decode_loop(&audio, |packet_pts, duration, serial, _| {
                with_codec_lock(lock_manager.as_ref(), &*codec_lock, || {});
                // The device consumes one frame per frame duration
                thread::sleep(time::to_duration(duration));
                audio.set_clock(packet_pts + duration, serial);
                true
            })
        })
    };

    while engine.poll_ready().is_buffering() {
        thread::sleep(Duration::from_millis(5));
    }
    info!("presentation started");

    let controller = Arc::clone(engine.sync_controller());
    for frame in frame_rx.iter() {
        engine.pump_commands();
        controller.sync_slave_clocks();

        loop {
            match controller.compute_delay(frame.pts, frame.duration, frame_rx.len()) {
                Verdict::Wait(secs) => thread::sleep(time::to_duration(secs.min(frame.duration))),
                Verdict::Drop => break,
                Verdict::DisplayNow => {
                    video.set_clock(frame.pts, frame.serial);
                    break;
                }
            }
        }
    }

    demuxer.join().map_err(|_| anyhow::anyhow!("demuxer panicked"))?;
    video_decoder.join().map_err(|_| anyhow::anyhow!("video decoder panicked"))?;
    audio_output.join().map_err(|_| anyhow::anyhow!("audio output panicked"))?;

    let stats = controller.stats();
    info!(
        displayed = stats.displayed,
        waited = stats.waited,
        dropped = stats.dropped,
        fallbacks = stats.fallbacks,
        position = %time::format_time(engine.position().unwrap_or(0.0)),
        "playback finished"
    );

    engine.process_command(PlaybackCommand::Stop);
    lock_manager.destroy(Arc::try_unwrap(codec_lock).map_err(|_| anyhow::anyhow!("codec lock still shared"))?);
    Ok(())
}

fn with_codec_lock<M: LockManager>(manager: &M, lock: &M::Lock, f: impl FnOnce()) {
    manager.acquire(lock);
    f();
    manager.release(lock);
}

/// Interleave packets of both streams in pts order, backing off while the gate says so
fn demux(streams: [Arc<Stream>; 2], gate: Arc<BufferGate>) {
    let [video, audio] = streams;
    let video_end = VIDEO_TIME_BASE.seconds_to_ticks(MEDIA_SECONDS);
    let audio_end = AUDIO_TIME_BASE.seconds_to_ticks(MEDIA_SECONDS);
    let (mut video_pts, mut audio_pts) = (0i64, 0i64);

    while video_pts < video_end || audio_pts < audio_end {
        if gate.should_throttle([video.as_ref(), audio.as_ref()]) {
            thread::sleep(Duration::from_millis(10));
            continue;
        }

        let video_due = VIDEO_TIME_BASE.ticks_to_seconds(video_pts);
        let audio_due = AUDIO_TIME_BASE.ticks_to_seconds(audio_pts);
        let pushed = if video_pts < video_end && (audio_pts >= audio_end || video_due <= audio_due) {
            let packet = avsync::Packet::new(0, Some(video_pts), Some(video_pts), VIDEO_FRAME_TICKS, vec![0; 4096]);
            video_pts += VIDEO_FRAME_TICKS;
            video.queue().push(packet)
        } else {
            let packet = avsync::Packet::new(1, Some(audio_pts), Some(audio_pts), AUDIO_FRAME_TICKS, vec![0; 512]);
            audio_pts += AUDIO_FRAME_TICKS;
            audio.queue().push(packet)
        };
        if pushed.is_err() {
            return;
        }
    }

    // Let consumers drain before signalling end of stream
    for stream in [&video, &audio] {
        while stream.queue().nb_packets() > 0 && !stream.queue().is_aborted() {
            thread::sleep(Duration::from_millis(10));
        }
        stream.queue().close();
    }
    info!("demuxer reached end of input");
}

/// Pop packets of the current generation until the queue closes.
/// `handle` gets (pts seconds, duration seconds, serial, packet number) and returns false to stop.
fn decode_loop(stream: &Stream, mut handle: impl FnMut(f64, f64, u64, u64) -> bool) {
    let time_base = stream.time_base();
    let mut serial = stream.queue().serial();
    let mut decoded = 0u64;

    loop {
        match stream.queue().pop(PopMode::Blocking, Some(serial)) {
            Ok(Popped::Packet(packet)) => {
                let pts = packet.best_timestamp().map_or(0.0, |ts| time_base.ticks_to_seconds(ts));
                let duration = time_base.ticks_to_seconds(packet.duration);
                if !handle(pts, duration, packet.serial(), decoded) {
                    break;
                }
                decoded += 1;
            }
            Ok(Popped::Flushed(next)) => serial = next,
            Ok(Popped::Empty) => {}
            Err(err) => {
                tracing::debug!(kind = %stream.kind(), %err, decoded, "decoder stopping");
                break;
            }
        }
    }
}
