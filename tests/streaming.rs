mod common;

use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    response::IntoResponse,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt, channel::mpsc};
use http_body_util::BodyExt;
use serde_json::json;
use tokio::sync::{mpsc as tokio_mpsc, oneshot};
use tower::ServiceExt;

use common::*;

const WAIT: Duration = Duration::from_secs(5);

/// Upstream that reports every received chunk as it arrives, then answers with the total.
fn recording_upstream(seen: tokio_mpsc::UnboundedSender<Bytes>) -> Router {
    Router::new().fallback(move |req: Request<Body>| {
        let seen = seen.clone();
        async move {
            let mut total = 0usize;
            let mut chunks = req.into_body().into_data_stream();
            while let Some(Ok(chunk)) = chunks.next().await {
                total += chunk.len();
                let _ = seen.send(chunk);
            }
            Json(json!({ "received": total }))
        }
    })
}

#[tokio::test]
async fn upload_reaches_upstream_before_the_client_finishes() {
    let (seen_tx, mut seen_rx) = tokio_mpsc::unbounded_channel();
    let app = app_with(
        Upstreams {
            objects: recording_upstream(seen_tx),
            ..Default::default()
        },
        FakeDirectory::default(),
    )
    .await;

    let (mut body_tx, body_rx) = mpsc::channel::<Result<Bytes, Infallible>>(1);
    let req = Request::post("/api/objects/upload")
        .header(header::AUTHORIZATION, bearer(&["user"]))
        .header(header::CONTENT_TYPE, "application/offset+octet-stream")
        .body(Body::from_stream(body_rx))
        .unwrap();
    let pending = tokio::spawn(app.router.oneshot(req));

    body_tx.send(Ok(Bytes::from_static(b"first-chunk"))).await.unwrap();
    let first = tokio::time::timeout(WAIT, seen_rx.recv())
        .await
        .expect("upstream never saw the first chunk")
        .unwrap();
    assert_eq!(&first[..], b"first-chunk");

    body_tx.send(Ok(Bytes::from_static(b"second"))).await.unwrap();
    drop(body_tx);

    let res = tokio::time::timeout(WAIT, pending).await.unwrap().unwrap().unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["received"], 17);
}

#[tokio::test]
async fn response_streams_before_upstream_finishes() {
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let release = Arc::new(Mutex::new(Some(release_rx)));

    let objects = Router::new().fallback(move || {
        let release = release.lock().unwrap().take();
        async move {
            let head = futures::stream::once(async { Ok::<_, Infallible>(Bytes::from_static(b"head")) });
            let tail = futures::stream::once(async move {
                if let Some(release) = release {
                    let _ = release.await;
                }
                Ok(Bytes::from_static(b"tail"))
            });
            Body::from_stream(head.chain(tail)).into_response()
        }
    });
    let app = app_with(
        Upstreams {
            objects,
            ..Default::default()
        },
        FakeDirectory::default(),
    )
    .await;

    let res = app
        .router
        .oneshot(
            Request::get("/api/objects/7")
                .header(header::AUTHORIZATION, bearer(&["user"]))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let mut body = res.into_body();
    let frame = tokio::time::timeout(WAIT, body.frame())
        .await
        .expect("first frame held back")
        .unwrap()
        .unwrap();
    assert_eq!(&frame.into_data().unwrap()[..], b"head");

    release_tx.send(()).unwrap();
    let rest = body.collect().await.unwrap().to_bytes();
    assert_eq!(&rest[..], b"tail");
}

#[tokio::test]
async fn declared_length_over_the_limit_is_413() {
    let live = spawn(echo_upstream()).await;
    let mut config = config(live, live, live);
    config.max_request_body_bytes = 16;
    let state = state_for(&config, Default::default());
    let router = eceo_bff::app::build_router(state, &config);

    let res = router
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/objects/upload")
                .header(header::AUTHORIZATION, bearer(&["user"]))
                .header(header::CONTENT_LENGTH, "32")
                .body(Body::from(vec![0u8; 32]))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn upstream_permits_are_released_after_the_body_is_consumed() {
    let app = app().await;
    let before = app.state.upstream.available_permits();

    let res = app
        .router
        .oneshot(
            Request::get("/api/areas").body(Body::empty()).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(app.state.upstream.available_permits(), before - 1);

    body_bytes(res).await;
    assert_eq!(app.state.upstream.available_permits(), before);
}

#[tokio::test]
async fn upstream_failure_mid_body_fails_the_client_stream() {
    let objects = Router::new().fallback(|| async {
        let head = futures::stream::once(async { Ok::<_, std::io::Error>(Bytes::from_static(b"head")) });
        let broken = futures::stream::once(async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Err(std::io::Error::other("disk gone"))
        });
        Body::from_stream(head.chain(broken)).into_response()
    });
    let app = app_with(
        Upstreams {
            objects,
            ..Default::default()
        },
        FakeDirectory::default(),
    )
    .await;
    let before = app.state.upstream.available_permits();

    let res = app
        .router
        .oneshot(
            Request::get("/api/objects/7")
                .header(header::AUTHORIZATION, bearer(&["user"]))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // A truncated body must not look like a complete one.
    let outcome = tokio::time::timeout(WAIT, res.into_body().collect())
        .await
        .expect("client stream never ended");
    assert!(outcome.is_err());
    assert_eq!(app.state.upstream.available_permits(), before);
}

/// Reports through the sender when dropped.
struct DropSignal(Option<oneshot::Sender<()>>);

impl Drop for DropSignal {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

#[tokio::test]
async fn client_disconnect_cancels_the_upstream_exchange() {
    let (dropped_tx, dropped_rx) = oneshot::channel::<()>();
    let dropped_tx = Arc::new(Mutex::new(Some(dropped_tx)));

    // Endless body; the signal lives inside the stream state.
    let objects = Router::new().fallback(move || {
        let signal = DropSignal(dropped_tx.lock().unwrap().take());
        async move {
            let ticks = futures::stream::unfold(signal, |signal| async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Some((Ok::<_, Infallible>(Bytes::from_static(b"tick")), signal))
            });
            Body::from_stream(ticks).into_response()
        }
    });
    let app = app_with(
        Upstreams {
            objects,
            ..Default::default()
        },
        FakeDirectory::default(),
    )
    .await;
    let before = app.state.upstream.available_permits();

    let res = app
        .router
        .oneshot(
            Request::get("/api/objects/7")
                .header(header::AUTHORIZATION, bearer(&["user"]))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let mut body = res.into_body();
    let frame = tokio::time::timeout(WAIT, body.frame())
        .await
        .expect("no frame from upstream")
        .unwrap()
        .unwrap();
    assert_eq!(&frame.into_data().unwrap()[..], b"tick");
    assert_eq!(app.state.upstream.available_permits(), before - 1);

    drop(body);

    assert_eq!(app.state.upstream.available_permits(), before);
    tokio::time::timeout(WAIT, dropped_rx)
        .await
        .expect("upstream kept streaming after the client left")
        .unwrap();
}

#[tokio::test]
async fn stalled_upstream_pushes_back_on_the_uploader() {
    const CHUNK: usize = 1024 * 1024;
    const ATTEMPTS: usize = 256;

    let (first_tx, first_rx) = oneshot::channel::<usize>();
    let first_tx = Arc::new(Mutex::new(Some(first_tx)));

    // Reads one chunk, then holds the body without reading further.
    let objects = Router::new().fallback(move |req: Request<Body>| {
        let first_tx = first_tx.lock().unwrap().take();
        async move {
            let mut chunks = req.into_body().into_data_stream();
            if let (Some(Ok(chunk)), Some(tx)) = (chunks.next().await, first_tx) {
                let _ = tx.send(chunk.len());
            }
            std::future::pending::<()>().await;
            StatusCode::OK
        }
    });
    let app = app_with(
        Upstreams {
            objects,
            ..Default::default()
        },
        FakeDirectory::default(),
    )
    .await;

    let (mut body_tx, body_rx) = mpsc::channel::<Result<Bytes, Infallible>>(1);
    let req = Request::patch("/api/objects/upload?patch=stall")
        .header(header::AUTHORIZATION, bearer(&["user"]))
        .body(Body::from_stream(body_rx))
        .unwrap();
    let _pending = tokio::spawn(app.router.oneshot(req));

    let chunk = Bytes::from(vec![7u8; CHUNK]);
    body_tx.send(Ok(chunk.clone())).await.unwrap();
    let first = tokio::time::timeout(WAIT, first_rx)
        .await
        .expect("upstream never saw the first chunk")
        .unwrap();
    assert!(first > 0);

    let mut accepted = 0;
    for _ in 0..ATTEMPTS {
        match tokio::time::timeout(Duration::from_millis(500), body_tx.send(Ok(chunk.clone()))).await {
            Ok(Ok(())) => accepted += 1,
            _ => break,
        }
    }

    // Only socket buffers and the one-slot pump sit between uploader and upstream.
    assert!(
        accepted < 64,
        "{} MiB accepted while the upstream was not reading",
        accepted
    );
}

// Slow: pushes 2 GiB through the proxy. Run with `cargo test -- --ignored`.
#[tokio::test]
#[ignore]
async fn two_gib_upload_is_streamed_end_to_end() {
    const CHUNK: usize = 1024 * 1024;
    const CHUNKS: usize = 2048;

    let (seen_tx, mut seen_rx) = tokio_mpsc::unbounded_channel();
    let app = app_with(
        Upstreams {
            objects: recording_upstream(seen_tx),
            ..Default::default()
        },
        FakeDirectory::default(),
    )
    .await;
    // Drain the per-chunk reports so they do not pile up in memory.
    tokio::spawn(async move { while seen_rx.recv().await.is_some() {} });

    let chunk = Bytes::from(vec![0u8; CHUNK]);
    let stream = futures::stream::iter((0..CHUNKS).map(move |_| Ok::<_, Infallible>(chunk.clone())));

    let res = app
        .router
        .oneshot(
            Request::patch("/api/objects/upload?patch=big")
                .header(header::AUTHORIZATION, bearer(&["user"]))
                .body(Body::from_stream(stream))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["received"], (CHUNK * CHUNKS) as u64);
}
