use chrono::{TimeZone, Utc};
use exercise_recorder::library::{
    download_file_name, export_record, filter_by_kind, sort_newest_first, summarize,
    PlaybackSource,
};
use exercise_recorder::media::format;
use exercise_recorder::{ExerciseKind, ExerciseRecord, MediaPayload, TrackKind};

fn record(id: u64, name: &str, kind: Option<ExerciseKind>, audio: bool) -> ExerciseRecord {
    ExerciseRecord {
        id,
        name: name.to_string(),
        kind,
        created_at: Utc.with_ymd_and_hms(2024, 3, (id % 28 + 1) as u32, 9, 30, 0).unwrap(),
        duration_label: "00:42".to_string(),
        video_payload: MediaPayload::new(format::MOTION_JPEG, vec![0xFFu8, 0xD8, 0xFF, 0xD9]),
        audio_payload: audio.then(|| MediaPayload::new(format::WAV, vec![1u8, 2, 3])),
    }
}

#[test]
fn newest_first_and_kind_filter() {
    let records = vec![
        record(3, "Plank", Some(ExerciseKind::Balance), true),
        record(10, "Sprint", Some(ExerciseKind::Cardio), true),
        record(7, "Squat", Some(ExerciseKind::Strength), true),
        record(12, "Yoga flow", None, true),
    ];

    let ordered: Vec<u64> = sort_newest_first(&records).iter().map(|r| r.id).collect();
    assert_eq!(ordered, vec![12, 10, 7, 3]);

    let cardio = filter_by_kind(&records, Some(&ExerciseKind::Cardio));
    assert_eq!(cardio.len(), 1);
    assert_eq!(cardio[0].name, "Sprint");
    assert_eq!(filter_by_kind(&records, None).len(), 4);

    let summaries = summarize(&records, Some(&ExerciseKind::Strength));
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].payload_bytes, 7);
}

#[test]
fn playback_recombines_both_tracks() {
    let source = PlaybackSource::from(&record(1, "Squat", None, true));
    assert!(source.video.starts_with("data:video/x-motion-jpeg;base64,"));
    assert_eq!(source.audio.as_deref(), Some("data:audio/wav;base64,AQID"));

    let video_only = PlaybackSource::from(&record(1, "Squat", None, false));
    assert!(video_only.audio.is_none());
}

#[test]
fn download_names_are_filesystem_safe() {
    let r = record(4, "Push ups / wide", None, true);
    assert_eq!(
        download_file_name(&r, TrackKind::Video),
        "Push_ups_-_wide_2024-03-05.mjpeg"
    );
    assert_eq!(
        download_file_name(&r, TrackKind::Audio),
        "Push_ups_-_wide_2024-03-05_audio.wav"
    );
}

#[test]
fn export_writes_each_payload() {
    let dir = tempfile::tempdir().unwrap();
    let r = record(2, "Dead bug", None, true);
    let paths = export_record(&r, dir.path().join("out")).unwrap();
    assert_eq!(paths.len(), 2);
    assert_eq!(std::fs::read(&paths[0]).unwrap(), vec![0xFF, 0xD8, 0xFF, 0xD9]);
    assert_eq!(std::fs::read(&paths[1]).unwrap(), vec![1, 2, 3]);
}
