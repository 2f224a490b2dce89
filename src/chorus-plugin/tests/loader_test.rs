#![cfg(unix)]

mod common;

use chorus_core::provider::Capability;
use chorus_core::provider_contract::{run_provider_contract, ProviderContractExpectations};
use chorus_plugin::LoadError;
use common::{bash_entry, loader, write_cached, BROKEN_PLUGIN, DEMO_PLUGIN};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn cached_source_is_used_without_fetching() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DEMO_PLUGIN))
        .expect(0)
        .mount(&server)
        .await;

    let cache = tempfile::tempdir().unwrap();
    write_cached(cache.path(), "demo", DEMO_PLUGIN);

    let mut loader = loader(cache.path());
    let provider = loader
        .register(&bash_entry("demo", Some(format!("{}/demo.sh", server.uri()))))
        .await
        .expect("cached plugin loads");
    assert_eq!(provider.id(), "demo");
    assert_eq!(provider.name(), "Demo Music");
}

#[tokio::test]
async fn source_is_fetched_once_and_reused() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/demo.sh"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DEMO_PLUGIN))
        .expect(1)
        .mount(&server)
        .await;

    let cache = tempfile::tempdir().unwrap();
    let entry = bash_entry("demo", Some(format!("{}/demo.sh", server.uri())));

    let mut first = loader(cache.path());
    first.register(&entry).await.expect("fetched plugin loads");
    first.register(&entry).await.expect("second register is a no-op");
    assert_eq!(first.registry().len(), 1);
    assert!(cache.path().join("plugins").join("demo").exists());

    // A later process finds the cached copy.
    let mut second = loader(cache.path());
    second.register(&entry).await.expect("cached plugin loads");
}

#[tokio::test]
async fn failed_plugins_are_excluded_and_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.sh"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let cache = tempfile::tempdir().unwrap();
    write_cached(cache.path(), "demo", DEMO_PLUGIN);
    write_cached(cache.path(), "broken", BROKEN_PLUGIN);

    let missing = bash_entry("missing", Some(format!("{}/missing.sh", server.uri())));
    let entries = vec![
        bash_entry("broken", None),
        missing.clone(),
        bash_entry("demo", None),
    ];

    let mut loader = loader(cache.path());
    let registry = loader.load_all(&entries).await;
    assert_eq!(registry.ids(), vec!["demo".to_string()]);
    assert_eq!(loader.failures().count(), 2);

    let err = loader.register(&missing).await.unwrap_err();
    assert!(matches!(err, LoadError::PreviouslyFailed { .. }));
}

#[tokio::test]
async fn fetch_failure_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let cache = tempfile::tempdir().unwrap();
    let mut loader = loader(cache.path());
    let err = loader
        .register(&bash_entry("demo", Some(format!("{}/demo.sh", server.uri()))))
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::Fetch { .. }));
    assert!(!cache.path().join("plugins").join("demo").exists());
}

#[tokio::test]
async fn loaded_plugin_passes_provider_contract() {
    let cache = tempfile::tempdir().unwrap();
    write_cached(cache.path(), "demo", DEMO_PLUGIN);

    let mut loader = loader(cache.path());
    let provider = loader.register(&bash_entry("demo", None)).await.unwrap();
    for capability in Capability::ALL {
        assert!(provider.supports(capability));
    }

    let mut expectations = ProviderContractExpectations::new("demo", "demo");
    expectations.expected_first_title = Some("Demo Song".to_string());
    expectations.import_url = Some("https://demo.example/sheet/1".to_string());
    expectations.foreign_import_url = Some("https://elsewhere.example/list".to_string());

    run_provider_contract(&provider, &expectations)
        .await
        .expect("demo plugin satisfies the contract");

    let lyric = provider
        .get_lyric(&chorus_core::Track::new("Demo Song", "Demo Artist"))
        .await
        .unwrap()
        .expect("lyric");
    assert!(lyric.is_synced());
}

/// Reports what it could reach from inside its sandbox.
const NOSY_PLUGIN: &str = r#"#!/bin/bash
while IFS= read -r line; do
    id=$(printf '%s' "$line" | grep -o '"id":[0-9]*' | head -1 | cut -d: -f2)
    case "$line" in
    *'"Initialize"'*)
        echo '{"id":'$id',"result":{"status":"Initialized","id":"nosy","name":"Nosy","version":"1.0.0","protocol_version":1,"capabilities":["search"]}}'
        ;;
    *'"Search"'*)
        passwd=$(head -c 4 /etc/passwd 2>/dev/null || echo denied)
        [ -n "$passwd" ] || passwd=denied
        listing=$(ls / >/dev/null 2>&1 && echo listed || echo denied)
        note=$( (echo kept > note && cat note) 2>/dev/null || echo denied)
        echo '{"id":'$id',"result":{"status":"Tracks","result":[{"title":"'$passwd'","artist":"'$listing'","album":"'$note'"}]}}'
        ;;
    esac
done
"#;

#[tokio::test]
async fn confined_plugin_only_reaches_its_private_dir() {
    if !chorus_plugin::sandbox::is_supported() {
        eprintln!("landlock unavailable; skipping confinement check");
        return;
    }
    let cache = tempfile::tempdir().unwrap();
    write_cached(cache.path(), "nosy", NOSY_PLUGIN);

    let mut loader = loader(cache.path());
    let provider = loader.register(&bash_entry("nosy", None)).await.unwrap();
    let tracks = provider
        .search("anything", 1, chorus_core::SearchKind::Music)
        .await
        .unwrap();

    assert_eq!(tracks[0].title, "denied");
    assert_eq!(tracks[0].artist, "denied");
    assert_eq!(tracks[0].album.as_deref(), Some("kept"));
    assert!(cache.path().join("sandbox").join("nosy").join("note").exists());
}
