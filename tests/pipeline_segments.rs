use std::path::{Path, PathBuf};

use foveate::{
    AppendOutcome, Bitrate, Canvas, FlushOutcome, FoveateError, FoveateResult, Frame, GazeConfig,
    MemoryFrameSource, Pipeline, RawSegment, SegmentBuffer, SegmentConfig, SegmentEncoder,
    StopReason, StreamConfig, TierSources,
};

#[derive(Default)]
struct FakeEncoder {
    written: Vec<(PathBuf, usize, Bitrate)>,
    fail_next: bool,
}

impl SegmentEncoder for FakeEncoder {
    fn encode_segment(
        &mut self,
        raw: &RawSegment,
        bitrate: Bitrate,
        out_path: &Path,
    ) -> FoveateResult<()> {
        if std::mem::take(&mut self.fail_next) {
            return Err(FoveateError::encode("simulated ffmpeg failure"));
        }
        assert!(raw.path.exists());
        std::fs::write(out_path, b"segment")
            .map_err(|e| FoveateError::encode(e.to_string()))?;
        self.written.push((out_path.to_path_buf(), raw.frames, bitrate));
        Ok(())
    }
}

fn scratch(name: &str) -> PathBuf {
    let dir = PathBuf::from("target").join("pipeline_segments").join(name);
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn thirty_fps(name: &str) -> SegmentConfig {
    SegmentConfig {
        fps: 30,
        output_dir: scratch(name),
        ..SegmentConfig::default()
    }
}

#[test]
fn nine_hundred_frames_flush_exactly_once() {
    let mut buf = SegmentBuffer::new(thirty_fps("nine_hundred"), FakeEncoder::default()).unwrap();
    let frame = Frame::solid(2, 2, [5, 6, 7]);

    for _ in 0..899 {
        let outcome = buf.append(&frame, Bitrate::kbps(984)).unwrap();
        assert!(matches!(outcome, AppendOutcome::Buffered { .. }));
    }
    assert_eq!(buf.segment_index(), 0);
    assert!(buf.encoder().written.is_empty());

    let outcome = buf.append(&frame, Bitrate::kbps(984)).unwrap();
    assert!(matches!(
        outcome,
        AppendOutcome::Flushed(FlushOutcome::Written(_))
    ));
    assert_eq!(buf.segment_index(), 1);
    assert_eq!(buf.encoder().written.len(), 1);
    assert_eq!(buf.encoder().written[0].1, 900);
    assert!(buf.output_dir().join("segment_0000.mp4").exists());
}

#[test]
fn threshold_ignores_nominal_segment_duration() {
    let cfg = SegmentConfig {
        segment_duration_secs: 6,
        ..thirty_fps("nominal_duration")
    };
    let buf = SegmentBuffer::new(cfg, FakeEncoder::default()).unwrap();
    assert_eq!(buf.threshold(), 900);
}

fn stream_config(name: &str) -> StreamConfig {
    StreamConfig {
        gaze: GazeConfig {
            grid_step: 4,
            grid_margin: 0,
            max_speed: 3.0,
            obstacle_margin: 2,
            boundary_inset: 2,
            seed: Some(11),
            ..GazeConfig::default()
        },
        segment: SegmentConfig {
            fps: 5,
            flush_after_secs: 1,
            output_dir: scratch(name),
            ..SegmentConfig::default()
        },
        ..StreamConfig::default()
    }
}

fn tiers(n: usize) -> TierSources {
    TierSources::new(
        Box::new(MemoryFrameSource::repeat(Frame::solid(16, 12, [0, 0, 0]), n)),
        Box::new(MemoryFrameSource::repeat(Frame::solid(16, 12, [0, 0, 128]), n)),
        Box::new(MemoryFrameSource::repeat(Frame::solid(16, 12, [255, 255, 255]), n)),
    )
}

#[test]
fn encode_failure_is_isolated_to_one_segment() {
    let canvas = Canvas::new(16, 12).unwrap();
    let encoder = FakeEncoder {
        fail_next: true,
        ..FakeEncoder::default()
    };
    let mut pipeline = Pipeline::new(stream_config("isolated"), canvas, encoder).unwrap();
    let mut gaze = Vec::new();
    let report = pipeline.run(tiers(100), 17, &mut gaze, &mut ()).unwrap();

    assert_eq!(report.frames_processed, 17);
    assert_eq!(report.stop, StopReason::Completed);
    assert_eq!(report.segments_dropped, 1);
    assert_eq!(report.frames_dropped, 5);
    assert_eq!(report.segments_written, 2);
    assert_eq!(report.frames_discarded, 2);

    let written = &pipeline.segments().encoder().written;
    assert!(written[0].0.ends_with("segment_0000.mp4"));
    assert!(written[1].0.ends_with("segment_0001.mp4"));
    assert_eq!(written[0].2, report.bitrate.unwrap());
}

#[test]
fn flush_partial_on_drain_keeps_trailing_frames() {
    let canvas = Canvas::new(16, 12).unwrap();
    let mut cfg = stream_config("partial");
    cfg.segment.flush_partial_on_drain = true;
    let mut pipeline = Pipeline::new(cfg, canvas, FakeEncoder::default()).unwrap();
    let report = pipeline.run(tiers(7), 50, &mut Vec::new(), &mut ()).unwrap();

    assert_eq!(report.stop, StopReason::SourceExhausted);
    assert_eq!(report.frames_processed, 7);
    assert_eq!(report.segments_written, 2);
    assert_eq!(report.frames_discarded, 0);
    assert_eq!(pipeline.segments().encoder().written[1].1, 2);
}

#[test]
fn snapshot_captures_first_composited_frame() {
    let canvas = Canvas::new(16, 12).unwrap();
    let cfg = stream_config("snapshot");
    let png = cfg.segment.output_dir.join("first.png");
    let mut pipeline = Pipeline::new(cfg, canvas, FakeEncoder::default())
        .unwrap()
        .with_snapshot(&png);
    let mut gaze = Vec::new();
    pipeline.run(tiers(1), 1, &mut gaze, &mut ()).unwrap();

    let img = image::open(&png).unwrap().to_rgb8();
    assert_eq!(img.dimensions(), (16, 12));
    // radii dwarf a 16x12 frame, so the high tier covers everything
    assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255]);
    assert_eq!(gaze.len(), 1);
}
