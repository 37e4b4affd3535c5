//! End-to-end checks against real ffmpeg/ffprobe binaries.

use image::{Rgb, RgbImage};
use tempfile::TempDir;

use backdrop_media::{
    extract_frame, probe_video, AudioRemuxer, CascadeDetector, DetectorConfig, EncodeSettings,
    FrameReader, FrameWriter, RegionDetector, RemuxOutcome,
};

fn solid(width: u32, height: u32, shade: u8) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([shade, shade / 2, 255 - shade]))
}

#[tokio::test]
#[ignore = "requires ffmpeg and ffprobe on PATH"]
async fn test_encode_probe_decode_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("synthetic.mp4");

    let mut writer =
        FrameWriter::create(&path, 64, 48, 10.0, &EncodeSettings::default()).unwrap();
    for i in 0..10u8 {
        writer.write_frame(&solid(64, 48, i * 20)).await.unwrap();
    }
    assert_eq!(writer.frames_written(), 10);
    writer.finish().await.unwrap();

    let source = path.to_string_lossy().to_string();
    let info = probe_video(&source).await.unwrap();
    assert_eq!((info.width, info.height), (64, 48));
    assert!(!info.has_audio);
    assert_eq!(info.estimated_frames(), 10);

    let mut reader = FrameReader::open(&source, &info).unwrap();
    let mut count = 0;
    while let Some(frame) = reader.next_frame().await.unwrap() {
        assert_eq!(frame.dimensions(), (64, 48));
        count += 1;
    }
    assert_eq!(count, 10);

    let fifth = extract_frame(&source, &info, 4).await.unwrap();
    assert_eq!(fifth.dimensions(), (64, 48));
    assert!(extract_frame(&source, &info, 50).await.is_err());

    // No audio track: remux degrades to a move
    let final_path = dir.path().join("final.mp4");
    let outcome = AudioRemuxer::new()
        .remux(&source, &path, &final_path, info.has_audio, None)
        .await
        .unwrap();
    assert_eq!(outcome, RemuxOutcome::VideoOnly);
    assert!(final_path.exists());
}

#[tokio::test]
async fn test_missing_source_is_reported() {
    let err = probe_video("/definitely/not/here.mp4").await.unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
#[ignore = "requires OpenCV Haar cascade files in CASCADE_DIR"]
fn test_installed_cascades_load_and_run() {
    let detector = CascadeDetector::from_config(&DetectorConfig::from_env()).unwrap();
    let frame = solid(320, 240, 128);
    let detections = detector.detect(&frame).unwrap();
    // A flat frame holds no persons
    assert!(detections.is_empty());
}
