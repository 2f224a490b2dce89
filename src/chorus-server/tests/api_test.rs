mod common;

use chorus_core::config::RecommendCategory;
use chorus_core::models::MediaStreamDescriptor;
use common::{offline_config, provider, Scripted, TestHarness};
use serde_json::{json, Value};
use std::collections::HashMap;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn health_and_plugin_listing() {
    let server = MockServer::start().await;
    let harness = TestHarness::start(
        offline_config(&server.uri()),
        vec![provider("qq", Scripted::default()), provider("kuwo", Scripted::default())],
    )
    .await;

    let health = harness.get("/health").await;
    assert_eq!(health.status(), 200);
    assert_eq!(health.text().await.unwrap(), "ok");

    let plugins: Vec<String> = harness.get("/api/plugins").await.json().await.unwrap();
    assert_eq!(plugins, vec!["qq", "kuwo"]);
    let platforms: Vec<String> = harness.get("/api/platforms").await.json().await.unwrap();
    assert_eq!(platforms, plugins);
}

#[tokio::test]
async fn unknown_provider_is_a_client_error_everywhere() {
    let server = MockServer::start().await;
    let harness = TestHarness::start(offline_config(&server.uri()), Vec::new()).await;
    let track = json!({"title": "Song", "artist": "Singer"});

    let responses = vec![
        harness.get("/api/search?query=x&source=ghost").await,
        harness
            .post("/api/play", json!({"source": "ghost", "musicItem": track}))
            .await,
        harness
            .post("/api/lyric", json!({"source": "ghost", "musicItem": track}))
            .await,
        harness.get("/api/recommendPlaylists").await,
        harness
            .post(
                "/api/mix",
                json!({"source": "ghost", "id": "daily", "title": "Daily", "seeds": [track]}),
            )
            .await,
    ];
    for response in responses {
        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "capability_error");
    }
}

#[tokio::test]
async fn search_flattens_envelope_and_preserves_fields() {
    let server = MockServer::start().await;
    let t1 = json!({"id": 1, "title": "Test One", "artist": "A", "songmid": "0039MnYb0qxYhV", "qualities": {"320k": {"size": 1}}});
    let t2 = json!({"id": "b", "title": "Test Two", "artist": "B", "album": "LP", "duration": 215});
    let backend = Scripted {
        search: HashMap::from([("test".to_string(), json!({"isEnd": true, "data": [t1, t2]}))]),
        ..Scripted::default()
    };
    let harness = TestHarness::start(offline_config(&server.uri()), vec![provider("x", backend)]).await;

    let response = harness.get("/api/search?query=test&source=x&page=1").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!([t1, t2]));

    let bad_page = harness.get("/api/search?query=test&source=x&page=0").await;
    assert_eq!(bad_page.status(), 400);
    let bad_type = harness.get("/api/search?query=test&source=x&type=podcast").await;
    assert_eq!(bad_type.status(), 400);
}

#[tokio::test]
async fn search_failure_is_a_server_error_with_message() {
    let server = MockServer::start().await;
    let backend = Scripted {
        failing_queries: vec!["boom".into()],
        ..Scripted::default()
    };
    let harness = TestHarness::start(offline_config(&server.uri()), vec![provider("x", backend)]).await;

    let response = harness.get("/api/search?query=boom&source=x").await;
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "search exploded for boom");
    assert_eq!(body["code"], "upstream_error");
}

#[tokio::test]
async fn streams_needing_headers_are_proxied() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/audio.m4a"))
        .and(header("referer", "https://www.bilibili.com/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/mp4")
                .set_body_bytes(vec![7u8; 4096]),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let audio_url = format!("{}/audio.m4a", upstream.uri());
    let guarded = Scripted {
        media: Some(MediaStreamDescriptor::new(audio_url.clone()).with_header("Referer", "x")),
        ..Scripted::default()
    };
    let open = Scripted {
        media: Some(MediaStreamDescriptor::new("https://cdn.example/open.mp3")),
        ..Scripted::default()
    };
    let harness = TestHarness::start(
        offline_config(&upstream.uri()),
        vec![provider("guarded", guarded), provider("open", open)],
    )
    .await;
    let track = json!({"title": "Song", "artist": "Singer"});

    let body: Value = harness
        .post("/api/play", json!({"source": "guarded", "musicItem": track}))
        .await
        .json()
        .await
        .unwrap();
    let proxied = body["url"].as_str().unwrap().to_string();
    assert!(proxied.starts_with("/api/proxy?url="));
    assert!(!proxied.contains(&audio_url));

    let stream = harness.get(&proxied).await;
    assert_eq!(stream.status(), 200);
    assert_eq!(stream.headers()["content-type"], "audio/mp4");
    assert_eq!(stream.headers()["content-length"], "4096");
    assert_eq!(stream.bytes().await.unwrap().len(), 4096);

    let body: Value = harness
        .post("/api/play", json!({"source": "open", "musicItem": track}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"url": "https://cdn.example/open.mp3"}));
}

#[tokio::test]
async fn proxy_failures_hide_upstream_detail() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_string("signature expired for key abc"))
        .mount(&upstream)
        .await;
    let harness = TestHarness::start(offline_config(&upstream.uri()), Vec::new()).await;

    let target = urlencoding::encode(&format!("{}/x.mp3", upstream.uri())).into_owned();
    let response = harness.get(&format!("/api/proxy?url={target}")).await;
    assert_eq!(response.status(), 500);
    let text = response.text().await.unwrap();
    assert!(text.contains("Proxy failed"));
    assert!(!text.contains("signature"));

    assert_eq!(harness.get("/api/proxy").await.status(), 400);
}

#[tokio::test]
async fn proxy_refuses_loopback_upstreams_by_default() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("internal admin page"))
        .expect(0)
        .mount(&upstream)
        .await;
    let mut config = offline_config(&upstream.uri());
    config.proxy.allow_private_upstreams = false;
    let harness = TestHarness::start(config, Vec::new()).await;

    let target = urlencoding::encode(&format!("{}/admin", upstream.uri())).into_owned();
    let response = harness.get(&format!("/api/proxy?url={target}")).await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "bad_request");
}

#[tokio::test]
async fn non_numeric_page_is_a_json_bad_request() {
    let harness = TestHarness::start(
        offline_config("http://127.0.0.1:9"),
        vec![provider("qq", Scripted::default())],
    )
    .await;

    let response = harness.get("/api/search?query=x&source=qq&page=abc").await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "bad_request");
    assert!(body["error"].as_str().unwrap().contains("page"));
}

#[tokio::test]
async fn lyric_prefers_synced_external_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lrc/single"))
        .and(query_param("title", "Song"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[00:12.50]la la"))
        .mount(&server)
        .await;

    let native = Scripted {
        lyric: Some("plain unsynced text"),
        ..Scripted::default()
    };
    let harness = TestHarness::start(offline_config(&server.uri()), vec![provider("kuwo", native)]).await;

    let body: Value = harness
        .post(
            "/api/lyric",
            json!({"source": "kuwo", "musicItem": {"title": "Song", "artist": "Singer"}}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"lrc": "[00:12.50]la la"}));
}

#[tokio::test]
async fn lyric_without_any_source_is_null() {
    let server = MockServer::start().await;
    let harness = TestHarness::start(
        offline_config(&server.uri()),
        vec![provider("kuwo", Scripted::default())],
    )
    .await;

    let body: Value = harness
        .post(
            "/api/lyric",
            json!({"source": "kuwo", "musicItem": {"title": "Song", "artist": "Singer"}}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"lrc": null}));
}

#[tokio::test]
async fn cross_platform_import_drops_unmatched_tracks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/playlist"))
        .and(query_param("id", "2829883282"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><head><title>Late Night - Cloud Music</title></head></html>"),
        )
        .mount(&server)
        .await;

    let mut config = offline_config(&server.uri());
    config.import.host_pattern = r"127\.0\.0\.1".to_string();

    let source = Scripted {
        import: Some(json!([
            {"id": 1, "title": "Found One", "artist": "A"},
            {"id": 2, "name": "Missing", "artists": [{"name": "B"}]},
            {"id": 3, "title": "Found Two", "artist": "C"}
        ])),
        ..Scripted::default()
    };
    let target = Scripted {
        search: HashMap::from([
            ("Found One A".to_string(), json!({"data": [{"id": "q1", "title": "Found One", "artist": "A"}, {"id": "q9", "title": "Other", "artist": "Z"}]})),
            ("Found Two C".to_string(), json!([{"id": "q2", "title": "Found Two", "artist": "C"}])),
        ]),
        ..Scripted::default()
    };
    let harness = TestHarness::start(
        config,
        vec![provider("netease", source), provider("qq", target)],
    )
    .await;

    let playlist_url = format!("{}/playlist?id=2829883282", server.uri());
    let response = harness
        .client
        .get(harness.url("/api/import"))
        .query(&[("url", playlist_url.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["source"], "qq");
    assert_eq!(body["title"], "Late Night");
    let ids: Vec<&str> = body["list"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["q1", "q2"]);
}

#[tokio::test]
async fn generic_import_takes_first_non_empty_provider() {
    let server = MockServer::start().await;
    let declines = Scripted::default();
    let accepts = Scripted {
        import: Some(json!({"data": [{"title": "Imported", "artist": "A"}]})),
        ..Scripted::default()
    };
    let harness = TestHarness::start(
        offline_config(&server.uri()),
        vec![provider("first", declines), provider("second", accepts)],
    )
    .await;

    let body: Value = harness
        .get("/api/import?url=https%3A%2F%2Fy.example%2Flist%2F1")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["source"], "second");
    assert_eq!(body["list"][0]["title"], "Imported");

    let filtered = harness
        .get("/api/import?url=https%3A%2F%2Fy.example%2Flist%2F1&source=first")
        .await;
    assert_eq!(filtered.status(), 404);
    let body: Value = filtered.json().await.unwrap();
    assert_eq!(body["code"], "not_found");

    assert_eq!(harness.get("/api/import").await.status(), 400);
}

#[tokio::test]
async fn recommend_survives_failing_categories() {
    let server = MockServer::start().await;
    let mut config = offline_config(&server.uri());
    config.recommend.categories = ["rnb", "jp", "en", "cn", "kr"]
        .iter()
        .map(|id| RecommendCategory {
            id: id.to_string(),
            title: id.to_uppercase(),
            badge: id.to_string(),
            queries: vec![format!("{id} hits")],
        })
        .collect();

    let list = json!({"data": [{"id": 1, "title": "T", "artist": "A", "artwork": "https://img.example/1.jpg"}]});
    let qq = Scripted {
        search: ["rnb", "en", "kr"]
            .iter()
            .map(|id| (format!("{id} hits"), list.clone()))
            .collect(),
        failing_queries: vec!["jp hits".into(), "cn hits".into()],
        ..Scripted::default()
    };
    let harness = TestHarness::start(config, vec![provider("qq", qq)]).await;

    let response = harness.get("/api/recommendPlaylists?refresh=1").await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["source"], "qq");
    let playlists = body["playlists"].as_array().unwrap();
    let ids: Vec<&str> = playlists.iter().map(|p| p["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["rnb", "en", "kr"]);
    assert_eq!(playlists[0]["subtitle"], "1 tracks");
    assert_eq!(playlists[0]["cover"], "https://img.example/1.jpg");
}
