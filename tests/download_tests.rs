use pdl::{Downloader, OverallOutcome, SegmentOutcome};
use wiremock::matchers::{header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn body_of(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn mount_head(server: &MockServer, total: usize) {
    Mock::given(method("HEAD"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("content-length", total.to_string().as_str()),
        )
        .mount(server)
        .await;
}

async fn mount_range(server: &MockServer, body: &[u8], start: usize, end: usize) {
    Mock::given(method("GET"))
        .and(header("Range", format!("bytes={}-{}", start, end).as_str()))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(body[start..=end].to_vec()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn parallel_download_reassembles_the_file() {
    let server = MockServer::start().await;
    let body = body_of(10_000);

    mount_head(&server, body.len()).await;
    mount_range(&server, &body, 0, 3332).await;
    mount_range(&server, &body, 3333, 6665).await;
    mount_range(&server, &body, 6666, 9999).await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("data.bin");

    let downloader = Downloader::silent(None, 1, body.len() as u64);
    let report = downloader
        .download(&server.uri(), &destination, 3)
        .await
        .unwrap();

    assert_eq!(report.outcome, OverallOutcome::Success);
    assert_eq!(report.segments.len(), 3);
    assert!(report
        .segments
        .iter()
        .all(|s| s.outcome == SegmentOutcome::Completed));
    assert_eq!(report.total_size, body.len() as u64);
    assert_eq!(report.bytes_written(), body.len() as u64);

    let written = tokio::fs::read(&destination).await.unwrap();
    assert_eq!(written, body);
}

#[tokio::test]
async fn one_failed_range_fails_the_download_but_not_its_siblings() {
    let server = MockServer::start().await;
    let body = body_of(8_000);

    mount_head(&server, body.len()).await;
    mount_range(&server, &body, 0, 1999).await;
    mount_range(&server, &body, 2000, 3999).await;
    Mock::given(method("GET"))
        .and(header("Range", "bytes=4000-5999"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_range(&server, &body, 6000, 7999).await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("data.bin");

    let downloader = Downloader::silent(None, 1, body.len() as u64);
    let report = downloader
        .download(&server.uri(), &destination, 4)
        .await
        .unwrap();

    assert_eq!(report.outcome, OverallOutcome::Failure);
    assert_eq!(report.segments.len(), 4);
    assert_eq!(
        report.segments.iter().filter(|s| s.is_completed()).count(),
        3
    );

    let failed: Vec<_> = report.failed_ranges().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].range.start, 4000);
    assert_eq!(failed[0].range.end, 5999);

    // The succeeded regions hold correct bytes; the file keeps its
    // preallocated size.
    let written = tokio::fs::read(&destination).await.unwrap();
    assert_eq!(written.len(), body.len());
    assert_eq!(&written[0..2000], &body[0..2000]);
    assert_eq!(&written[2000..4000], &body[2000..4000]);
    assert_eq!(&written[6000..8000], &body[6000..8000]);
}

#[tokio::test]
async fn sequential_download_resumes_a_partial_file() {
    let server = MockServer::start().await;
    let body = body_of(5_000);
    let already = 1_200usize;

    mount_head(&server, body.len()).await;
    Mock::given(method("GET"))
        .and(header("Range", "bytes=1200-4999"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(body[already..].to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("data.bin");
    tokio::fs::write(&destination, &body[..already]).await.unwrap();

    let downloader = Downloader::silent(None, 1, body.len() as u64);
    let report = downloader
        .download(&server.uri(), &destination, 1)
        .await
        .unwrap();

    assert_eq!(report.outcome, OverallOutcome::Success);
    assert_eq!(report.segments.len(), 1);
    assert_eq!(
        report.segments[0].bytes_written,
        (body.len() - already) as u64
    );

    let written = tokio::fs::read(&destination).await.unwrap();
    assert_eq!(written, body);
}

#[tokio::test]
async fn already_complete_file_makes_no_range_requests() {
    let server = MockServer::start().await;
    let body = body_of(2_000);

    mount_head(&server, body.len()).await;
    // No GET mock mounted: any range request would 404 and fail the test
    // through the report.

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("data.bin");
    tokio::fs::write(&destination, &body).await.unwrap();

    let downloader = Downloader::silent(None, 1, body.len() as u64);
    let report = downloader
        .download(&server.uri(), &destination, 1)
        .await
        .unwrap();

    assert_eq!(report.outcome, OverallOutcome::Success);
    assert!(report.segments.is_empty());
    assert_eq!(tokio::fs::read(&destination).await.unwrap(), body);
}

#[tokio::test]
async fn connection_count_is_clamped_to_the_byte_count() {
    let server = MockServer::start().await;
    let body = vec![7u8, 8, 9];

    mount_head(&server, body.len()).await;
    mount_range(&server, &body, 0, 0).await;
    mount_range(&server, &body, 1, 1).await;
    mount_range(&server, &body, 2, 2).await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("tiny.bin");

    let downloader = Downloader::silent(None, 1, body.len() as u64);
    let report = downloader
        .download(&server.uri(), &destination, 10)
        .await
        .unwrap();

    assert_eq!(report.outcome, OverallOutcome::Success);
    assert_eq!(report.segments.len(), 3);
    assert_eq!(tokio::fs::read(&destination).await.unwrap(), body);
}

#[tokio::test]
async fn missing_head_support_falls_back_to_streaming() {
    let server = MockServer::start().await;
    let body = body_of(2_048);

    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("data.bin");

    let downloader = Downloader::silent(None, 1, 0);
    let report = downloader
        .download(&server.uri(), &destination, 4)
        .await
        .unwrap();

    assert_eq!(report.outcome, OverallOutcome::Success);
    assert_eq!(report.segments.len(), 1);
    assert_eq!(report.total_size, body.len() as u64);
    assert_eq!(tokio::fs::read(&destination).await.unwrap(), body);
}

#[tokio::test]
async fn zero_byte_object_creates_an_empty_file() {
    let server = MockServer::start().await;
    mount_head(&server, 0).await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("empty.bin");

    let downloader = Downloader::silent(None, 1, 0);
    let report = downloader
        .download(&server.uri(), &destination, 4)
        .await
        .unwrap();

    assert_eq!(report.outcome, OverallOutcome::Success);
    assert!(report.segments.is_empty());
    assert_eq!(tokio::fs::read(&destination).await.unwrap().len(), 0);
}

#[tokio::test]
async fn full_body_answer_to_a_mid_file_range_fails_that_segment() {
    let server = MockServer::start().await;
    let body = body_of(4_000);

    mount_head(&server, body.len()).await;
    mount_range(&server, &body, 0, 1999).await;
    // This server ignores the range header and replies 200 with everything.
    Mock::given(method("GET"))
        .and(header("Range", "bytes=2000-3999"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("data.bin");

    let downloader = Downloader::silent(None, 1, body.len() as u64);
    let report = downloader
        .download(&server.uri(), &destination, 2)
        .await
        .unwrap();

    assert_eq!(report.outcome, OverallOutcome::Failure);
    let failed: Vec<_> = report.failed_ranges().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].range.start, 2000);

    let written = tokio::fs::read(&destination).await.unwrap();
    assert_eq!(&written[0..2000], &body[0..2000]);
}

#[tokio::test]
async fn truncated_range_body_fails_the_segment() {
    let server = MockServer::start().await;
    let body = body_of(1_000);

    mount_head(&server, body.len()).await;
    Mock::given(method("GET"))
        .and(header("Range", "bytes=0-999"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(body[..400].to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("data.bin");

    let downloader = Downloader::silent(None, 1, body.len() as u64);
    let report = downloader
        .download(&server.uri(), &destination, 1)
        .await
        .unwrap();

    assert_eq!(report.outcome, OverallOutcome::Failure);
    assert_eq!(report.segments.len(), 1);
    assert_eq!(report.segments[0].bytes_written, 400);
    match &report.segments[0].outcome {
        SegmentOutcome::Failed { reason } => assert!(reason.contains("truncated")),
        other => panic!("expected a truncation failure, got {:?}", other),
    }

    // The bytes that did arrive are on disk.
    let written = tokio::fs::read(&destination).await.unwrap();
    assert_eq!(&written[..400], &body[..400]);
}
