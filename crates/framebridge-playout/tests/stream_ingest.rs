//! Streamed ingestion against scripted byte streams

use std::sync::Arc;

use framebridge_playout::{
    CancelToken, FrameIngestor, IngestEnd, PlaybackQueue, StreamHeader, StreamSource, STREAM_HEADER_SIZE,
};

fn frame_message(width: u32, height: u32, timestamp: u64, payload: &[u8]) -> Vec<u8> {
    let header = StreamHeader::frame(width, height, timestamp, payload.len() as u32);
    let mut bytes = header.encode().to_vec();
    bytes.extend_from_slice(payload);
    bytes
}

fn ingestor(capacity: usize) -> (FrameIngestor, Arc<PlaybackQueue>) {
    let queue = Arc::new(PlaybackQueue::new(capacity));
    (FrameIngestor::queue_only(queue.clone()), queue)
}

#[tokio::test]
async fn three_frames_then_shutdown_stops_before_garbage() {
    let garbage = b"not a header, never read".to_vec();

    let mut bytes = Vec::new();
    for i in 1..=3u8 {
        bytes.extend(frame_message(2, 2, u64::from(i), &[i; 16]));
    }
    bytes.extend_from_slice(&StreamHeader::shutdown().encode());
    bytes.extend_from_slice(&garbage);

    let (ingestor, queue) = ingestor(8);
    let mut source = StreamSource::new(bytes.as_slice(), 2, 2);
    let end = source.ingest(&ingestor, &CancelToken::new()).await.expect("ingest");

    assert_eq!(end, IngestEnd::Shutdown);
    assert_eq!(source.stats().frames_accepted, 3);

    let timestamps: Vec<u64> = std::iter::from_fn(|| queue.try_pop()).map(|f| f.timestamp).collect();
    assert_eq!(timestamps, vec![1, 2, 3]);

    let rest = source.into_inner();
    assert_eq!(rest, garbage.as_slice(), "nothing past shutdown was consumed");
}

#[tokio::test]
async fn bad_length_frame_is_discarded_without_desync() {
    // Claims 2x2 but carries 12 bytes instead of 16
    let bad = frame_message(2, 2, 1, &[0xEE; 12]);
    let good = frame_message(2, 2, 2, &[0x11; 16]);

    // Split the stream at awkward points to exercise partial reads
    let mock = tokio_test::io::Builder::new()
        .read(&bad[..10])
        .read(&bad[10..])
        .read(&good[..STREAM_HEADER_SIZE + 3])
        .read(&good[STREAM_HEADER_SIZE + 3..])
        .read(&StreamHeader::shutdown().encode())
        .build();

    let (ingestor, queue) = ingestor(4);
    let mut source = StreamSource::new(mock, 2, 2);
    let end = source.ingest(&ingestor, &CancelToken::new()).await.expect("ingest");

    assert_eq!(end, IngestEnd::Shutdown);
    let stats = source.stats();
    assert_eq!(stats.frames_rejected, 1);
    assert_eq!(stats.bytes_discarded, 12);
    assert_eq!(stats.frames_accepted, 1);

    let frame = queue.try_pop().expect("valid frame accepted");
    assert_eq!(frame.timestamp, 2);
    assert_eq!(frame.data(), &[0x11; 16]);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn wrong_dimensions_with_matching_length_are_rejected() {
    // 4x1 has the same byte count as 2x2
    let mut bytes = frame_message(4, 1, 1, &[0; 16]);
    bytes.extend(frame_message(2, 2, 2, &[5; 16]));

    let (ingestor, queue) = ingestor(4);
    let mut source = StreamSource::new(bytes.as_slice(), 2, 2);
    let end = source.ingest(&ingestor, &CancelToken::new()).await.expect("ingest");

    assert_eq!(end, IngestEnd::EndOfStream);
    assert_eq!(source.stats().frames_rejected, 1);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.try_pop().map(|f| f.timestamp), Some(2));
}

#[tokio::test]
async fn overflowing_queue_keeps_newest() {
    let mut bytes = Vec::new();
    for i in 1..=6u8 {
        bytes.extend(frame_message(1, 1, u64::from(i), &[i; 4]));
    }

    let (ingestor, queue) = ingestor(4);
    let mut source = StreamSource::new(bytes.as_slice(), 1, 1);
    source.ingest(&ingestor, &CancelToken::new()).await.expect("ingest");

    assert_eq!(source.stats().frames_accepted, 6);
    assert_eq!(queue.evicted(), 2);
    let timestamps: Vec<u64> = std::iter::from_fn(|| queue.try_pop()).map(|f| f.timestamp).collect();
    assert_eq!(timestamps, vec![3, 4, 5, 6]);
}
