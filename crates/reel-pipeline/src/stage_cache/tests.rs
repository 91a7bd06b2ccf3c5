use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reel_models::{IdentityResolver, TranscriptSegment};
use reel_store::StoreError;

use super::*;

fn setup() -> (StageCache, VideoSource, VideoKey) {
    let store = VideoStore::open_in_memory().unwrap();
    let (source, key) = IdentityResolver::new()
        .resolve_input("https://youtu.be/dQw4w9WgXcQ")
        .unwrap();
    (StageCache::new(store), source, key)
}

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Count the call, then hand back `value`.
fn producing<T>(calls: &AtomicUsize, value: PipelineResult<T>) -> impl Future<Output = PipelineResult<T>> {
    calls.fetch_add(1, Ordering::SeqCst);
    async move { value }
}

fn slow_producing<T>(
    calls: &AtomicUsize,
    value: PipelineResult<T>,
) -> impl Future<Output = PipelineResult<T>> {
    calls.fetch_add(1, Ordering::SeqCst);
    async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        value
    }
}

fn transcript() -> RawTranscript {
    RawTranscript {
        text: "Welcome back. Today we talk caching.".to_string(),
        segments: vec![
            TranscriptSegment::new(0.0, 4.5, "Welcome back."),
            TranscriptSegment::new(4.5, 9.0, "Today we talk caching."),
        ],
        language: Some("en".to_string()),
        model: Some("whisper-base".to_string()),
    }
}

fn candidates(ranges: &[(f64, f64, f64)]) -> Vec<HighlightCandidate> {
    ranges
        .iter()
        .map(|&(start, end, score)| HighlightCandidate::new(start, end, score))
        .collect()
}

#[tokio::test]
async fn test_download_hit_skips_producer() {
    let dir = tempfile::tempdir().unwrap();
    let media = write_file(dir.path(), "source.mp4", b"frames");
    let (cache, source, key) = setup();
    let calls = AtomicUsize::new(0);

    let first = cache
        .download(&key, &source, || producing(&calls, Ok(media.clone())))
        .await
        .unwrap();
    assert!(!first.cache_hit);
    assert_eq!(first.value.local_path.as_deref(), Some(media.as_path()));

    let second = cache
        .download(&key, &source, || {
            producing(&calls, Err(PipelineError::download_failed("must not run")))
        })
        .await
        .unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.value.local_path, first.value.local_path);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_video_row_without_path_reruns_download() {
    let dir = tempfile::tempdir().unwrap();
    let media = write_file(dir.path(), "source.mp4", b"frames");
    let (cache, source, key) = setup();
    cache.store().upsert_video(&key, &source).unwrap();
    let calls = AtomicUsize::new(0);

    let output = cache
        .download(&key, &source, || producing(&calls, Ok(media.clone())))
        .await
        .unwrap();

    assert!(!output.cache_hit);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.store().list_videos().unwrap().len(), 1);
}

#[tokio::test]
async fn test_deleted_media_file_reruns_download() {
    let dir = tempfile::tempdir().unwrap();
    let media = write_file(dir.path(), "source.mp4", b"frames");
    let (cache, source, key) = setup();
    let calls = AtomicUsize::new(0);

    cache
        .download(&key, &source, || producing(&calls, Ok(media.clone())))
        .await
        .unwrap();
    std::fs::remove_file(&media).unwrap();
    assert!(!cache.status(&key).unwrap().downloaded);

    let fresh = write_file(dir.path(), "again.mp4", b"frames");
    let output = cache
        .download(&key, &source, || producing(&calls, Ok(fresh.clone())))
        .await
        .unwrap();
    assert!(!output.cache_hit);
    assert_eq!(output.value.local_path, Some(fresh));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_empty_download_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let empty = write_file(dir.path(), "source.mp4", b"");
    let (cache, source, key) = setup();

    let result = cache
        .download(&key, &source, || async { Ok(empty.clone()) })
        .await;

    assert!(matches!(
        result,
        Err(PipelineError::StageProductionFailed { stage: reel_models::Stage::Download, .. })
    ));
    let video = cache.store().get_video(&key).unwrap().unwrap();
    assert!(video.local_path.is_none());
}

#[tokio::test]
async fn test_transcript_hit_skips_producer() {
    let (cache, source, key) = setup();
    cache.store().upsert_video(&key, &source).unwrap();
    let calls = AtomicUsize::new(0);

    let first = cache
        .transcribe(&key, || producing(&calls, Ok(transcript())))
        .await
        .unwrap();
    let second = cache
        .transcribe(&key, || {
            producing(&calls, Err(PipelineError::transcription_failed("must not run")))
        })
        .await
        .unwrap();

    assert!(second.cache_hit);
    assert_eq!(second.value.text, first.value.text);
    assert_eq!(second.value.segments, first.value.segments);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalid_transcript_is_not_stored() {
    let (cache, source, key) = setup();
    cache.store().upsert_video(&key, &source).unwrap();

    let mut raw = transcript();
    raw.text = "   ".to_string();
    let result = cache.transcribe(&key, || async { Ok(raw) }).await;

    assert!(matches!(result, Err(PipelineError::StageProductionFailed { .. })));
    assert!(cache.store().get_transcription(&key).unwrap().is_none());
}

#[tokio::test]
async fn test_silent_transcript_is_cached() {
    let (cache, source, key) = setup();
    cache.store().upsert_video(&key, &source).unwrap();

    let output = cache
        .transcribe(&key, || async { Ok(RawTranscript::default()) })
        .await
        .unwrap();
    assert!(output.value.segments.is_empty());
    assert!(cache.status(&key).unwrap().transcribed);
}

#[tokio::test]
async fn test_empty_highlights_are_not_cached() {
    let (cache, source, key) = setup();
    cache.store().upsert_video(&key, &source).unwrap();
    let calls = AtomicUsize::new(0);

    let result = cache
        .highlights(&key, || producing(&calls, Ok(Vec::new())))
        .await;
    assert!(matches!(
        result,
        Err(PipelineError::StageProductionFailed { stage: reel_models::Stage::Highlights, .. })
    ));
    assert_eq!(cache.status(&key).unwrap().highlights, 0);

    // Still a miss on the next call
    let output = cache
        .highlights(&key, || producing(&calls, Ok(candidates(&[(10.0, 25.0, 0.5)]))))
        .await
        .unwrap();
    assert!(!output.cache_hit);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_highlights_are_stored_in_start_order() {
    let (cache, source, key) = setup();
    cache.store().upsert_video(&key, &source).unwrap();

    let output = cache
        .highlights(&key, || async {
            Ok(candidates(&[(90.0, 110.0, 0.7), (10.0, 25.0, 0.9), (40.0, 58.0, 0.2)]))
        })
        .await
        .unwrap();

    let ranges: Vec<(f64, f64, u32)> = output.value.iter().map(|h| (h.start, h.end, h.rank)).collect();
    assert_eq!(ranges, vec![(10.0, 25.0, 1), (40.0, 58.0, 3), (90.0, 110.0, 2)]);
}

#[tokio::test]
async fn test_duplicate_highlights_are_rejected() {
    let (cache, source, key) = setup();
    cache.store().upsert_video(&key, &source).unwrap();

    let result = cache
        .highlights(&key, || async {
            Ok(candidates(&[(10.0, 25.0, 0.9), (10.0, 25.0, 0.8)]))
        })
        .await;

    assert!(matches!(result, Err(PipelineError::StageProductionFailed { .. })));
    assert!(cache.store().get_highlights(&key).unwrap().is_empty());
}

#[tokio::test]
async fn test_non_finite_score_is_rejected() {
    let (cache, source, key) = setup();
    cache.store().upsert_video(&key, &source).unwrap();

    let result = cache
        .highlights(&key, || async {
            Ok(candidates(&[(10.0, 25.0, f64::NAN), (40.0, 58.0, 0.4)]))
        })
        .await;

    assert!(matches!(
        result,
        Err(PipelineError::StageProductionFailed { stage: reel_models::Stage::Highlights, .. })
    ));
    assert!(cache.store().get_highlights(&key).unwrap().is_empty());
}

#[tokio::test]
async fn test_inconsistent_stored_highlights_are_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("reel.db");
    let cache = StageCache::new(VideoStore::open(&db).unwrap());
    let (source, key) = IdentityResolver::new()
        .resolve_input("https://youtu.be/dQw4w9WgXcQ")
        .unwrap();
    cache.store().upsert_video(&key, &source).unwrap();
    cache
        .highlights(&key, || async {
            Ok(candidates(&[(10.0, 25.0, 0.9), (40.0, 58.0, 0.4)]))
        })
        .await
        .unwrap();

    // Duplicate rank 1's range onto rank 2 behind the store's back
    let conn = rusqlite::Connection::open(&db).unwrap();
    conn.execute(
        "UPDATE highlights SET start_secs = 10.0, end_secs = 25.0 WHERE video_key = ?1 AND rank = 2",
        [key.as_str()],
    )
    .unwrap();
    drop(conn);
    assert_eq!(cache.status(&key).unwrap().highlights, 0);

    let calls = AtomicUsize::new(0);
    let output = cache
        .highlights(&key, || producing(&calls, Ok(candidates(&[(1.0, 2.0, 0.5)]))))
        .await
        .unwrap();

    assert!(!output.cache_hit);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let stored: Vec<(f64, f64)> = cache
        .store()
        .get_highlights(&key)
        .unwrap()
        .iter()
        .map(|h| (h.start, h.end))
        .collect();
    assert_eq!(stored, vec![(1.0, 2.0)]);
}

#[tokio::test]
async fn test_concurrent_calls_run_producer_once() {
    let (cache, source, key) = setup();
    cache.store().upsert_video(&key, &source).unwrap();
    let calls = AtomicUsize::new(0);

    let (a, b) = tokio::join!(
        cache.transcribe(&key, || slow_producing(&calls, Ok(transcript()))),
        cache.transcribe(&key, || slow_producing(&calls, Ok(transcript()))),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_ne!(a.cache_hit, b.cache_hit);
    assert_eq!(a.value.text, b.value.text);
}

#[tokio::test]
async fn test_concurrent_calls_on_clones_share_locks() {
    let (cache, source, key) = setup();
    cache.store().upsert_video(&key, &source).unwrap();
    let other = cache.clone();
    let calls = AtomicUsize::new(0);

    let (a, b) = tokio::join!(
        cache.highlights(&key, || slow_producing(&calls, Ok(candidates(&[(10.0, 25.0, 1.0)])))),
        other.highlights(&key, || slow_producing(&calls, Ok(candidates(&[(10.0, 25.0, 1.0)])))),
    );

    assert!(a.is_ok() && b.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

async fn cropped_fixture(dir: &Path) -> (StageCache, VideoKey) {
    let (cache, source, key) = setup();
    cache.store().upsert_video(&key, &source).unwrap();
    cache
        .highlights(&key, || async {
            Ok(candidates(&[(10.0, 25.0, 0.9), (40.0, 58.0, 0.5)]))
        })
        .await
        .unwrap();

    for rank in [1, 2] {
        let clip = write_file(dir, &format!("clip_{:02}.mp4", rank), b"clip");
        cache.crop(&key, rank, || async { Ok(clip) }).await.unwrap();
    }
    (cache, key)
}

#[tokio::test]
async fn test_missing_clip_reruns_crop_for_that_rank_only() {
    let dir = tempfile::tempdir().unwrap();
    let (cache, key) = cropped_fixture(dir.path()).await;
    std::fs::remove_file(dir.path().join("clip_02.mp4")).unwrap();
    assert_eq!(cache.status(&key).unwrap().cropped, 1);

    let calls = AtomicUsize::new(0);
    let rerendered = dir.path().join("clip_02_new.mp4");
    std::fs::write(&rerendered, b"clip").unwrap();

    let first = cache
        .crop(&key, 1, || producing(&calls, Err(PipelineError::cropping_failed("must not run"))))
        .await
        .unwrap();
    let second = cache
        .crop(&key, 2, || producing(&calls, Ok(rerendered.clone())))
        .await
        .unwrap();

    assert!(first.cache_hit);
    assert!(!second.cache_hit);
    assert_eq!(second.value.clip_path, Some(rerendered));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_recompute_keeps_prior_record() {
    let dir = tempfile::tempdir().unwrap();
    let (cache, key) = cropped_fixture(dir.path()).await;
    let old_clip = dir.path().join("clip_01.mp4");
    std::fs::remove_file(&old_clip).unwrap();

    let result = cache
        .crop(&key, 1, || async { Err(PipelineError::cropping_failed("ffmpeg exploded")) })
        .await;
    assert!(matches!(result, Err(PipelineError::CroppingFailed(_))));

    let highlight = cache.store().get_highlight(&key, 1).unwrap().unwrap();
    assert_eq!(highlight.clip_path, Some(old_clip));
    assert_eq!(cache.store().get_highlights(&key).unwrap().len(), 2);
}

#[tokio::test]
async fn test_crop_of_unknown_rank_fails() {
    let (cache, source, key) = setup();
    cache.store().upsert_video(&key, &source).unwrap();

    let result = cache
        .crop(&key, 7, || async { Ok(PathBuf::from("never.mp4")) })
        .await;
    assert!(matches!(
        result,
        Err(PipelineError::StoreUnavailable(StoreError::HighlightNotFound { rank: 7, .. }))
    ));
}

#[tokio::test]
async fn test_reset_clears_all_records() {
    let dir = tempfile::tempdir().unwrap();
    let media = write_file(dir.path(), "source.mp4", b"frames");
    let (cache, source, key) = setup();

    cache.download(&key, &source, || async { Ok(media) }).await.unwrap();
    cache.transcribe(&key, || async { Ok(transcript()) }).await.unwrap();
    cache
        .highlights(&key, || async { Ok(candidates(&[(10.0, 25.0, 0.9)])) })
        .await
        .unwrap();
    assert_eq!(cache.status(&key).unwrap().next_pending(), Some(reel_models::Stage::Crop));

    assert!(cache.reset(&key).unwrap());
    assert!(cache.store().get_video(&key).unwrap().is_none());
    assert!(cache.store().get_transcription(&key).unwrap().is_none());
    assert!(cache.store().get_highlights(&key).unwrap().is_empty());
    assert_eq!(cache.status(&key).unwrap(), StageStatus::default());
    assert!(!cache.reset(&key).unwrap());
}
