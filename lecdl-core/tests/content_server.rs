use lecdl_core::ContentServer;

#[tokio::test]
async fn identical_publishes_get_distinct_urls() {
    let server = ContentServer::start(0).await.unwrap();

    let (first, second) = tokio::join!(
        server.publish(b"same bytes", ".key"),
        server.publish(b"same bytes", ".key")
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_ne!(first, second);

    let one = reqwest::get(&first).await.unwrap().bytes().await.unwrap();
    let two = reqwest::get(&second).await.unwrap().bytes().await.unwrap();
    assert_eq!(one.as_ref(), b"same bytes");
    assert_eq!(two.as_ref(), b"same bytes");

    server.shutdown().await;
}

#[tokio::test]
async fn playlists_are_served_with_hls_content_type() {
    let server = ContentServer::start(0).await.unwrap();
    let url = server.publish(b"#EXTM3U\n", ".m3u8").await.unwrap();
    assert!(url.starts_with(&format!("http://localhost:{}/", server.port())));

    let response = reqwest::get(&url).await.unwrap();
    assert_eq!(
        response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .unwrap(),
        "application/vnd.apple.mpegurl"
    );

    server.shutdown().await;
}

#[tokio::test]
async fn unknown_names_miss_silently() {
    let server = ContentServer::start(0).await.unwrap();
    let url = format!("http://localhost:{}/no-such-file.key", server.port());
    let response = reqwest::get(&url).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    server.shutdown().await;
}

#[tokio::test]
async fn served_directory_is_removed_on_shutdown() {
    let server = ContentServer::start(0).await.unwrap();
    let dir = server.directory().to_path_buf();
    server.publish(b"key", ".key").await.unwrap();
    assert!(dir.exists());

    server.shutdown().await;
    assert!(!dir.exists());
}
