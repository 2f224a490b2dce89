#![allow(dead_code)]

use chorus_core::config::{PluginEntry, PluginsConfig};
use chorus_plugin::PluginLoader;
use std::path::Path;

/// A complete plugin written in bash. It answers every operation with fixed
/// data and only accepts sheet urls on `demo.example`.
pub const DEMO_PLUGIN: &str = r#"#!/bin/bash
while IFS= read -r line; do
    id=$(printf '%s' "$line" | grep -o '"id":[0-9]*' | head -1 | cut -d: -f2)
    case "$line" in
    *'"Initialize"'*)
        echo '{"id":'$id',"result":{"status":"Initialized","id":"demo","name":"Demo Music","version":"1.0.0","protocol_version":1,"capabilities":["search","getMediaSource","getLyric","importMusicSheet"]}}'
        ;;
    *'"Search"'*)
        echo '{"id":'$id',"result":{"status":"Tracks","result":{"data":[{"id":"1","title":"Demo Song","artist":"Demo Artist"},{"id":"2","title":"Other Song","artist":"Demo Artist"}]}}}'
        ;;
    *'"GetMediaSource"'*)
        echo '{"id":'$id',"result":{"status":"MediaSource","source":{"url":"https://media.demo.example/1.mp3"}}}'
        ;;
    *'"GetLyric"'*)
        echo '{"id":'$id',"result":{"status":"Lyric","lyric":{"lrc":"[00:01.00]hello"}}}'
        ;;
    *'"ImportMusicSheet"'*demo.example*)
        echo '{"id":'$id',"result":{"status":"Sheet","result":[{"id":"7","title":"Imported","artist":"Demo Artist"}]}}'
        ;;
    *'"ImportMusicSheet"'*)
        echo '{"id":'$id',"result":{"status":"Sheet","result":null}}'
        ;;
    *'"Shutdown"'*)
        echo '{"id":'$id',"result":{"status":"ShutdownAck"}}'
        exit 0
        ;;
    esac
done
"#;

/// Exits before the handshake.
pub const BROKEN_PLUGIN: &str = "#!/bin/bash\nexit 1\n";

pub fn loader(cache: &Path) -> PluginLoader {
    let config = PluginsConfig {
        allowed_env: vec!["PATH".to_string()],
        ..PluginsConfig::default()
    };
    PluginLoader::new(&config, cache, reqwest::Client::new())
}

pub fn bash_entry(id: &str, url: Option<String>) -> PluginEntry {
    PluginEntry {
        url,
        interpreter: Some("/bin/bash".to_string()),
        ..PluginEntry::new(id)
    }
}

/// Place `body` in the plugin source cache as if fetched earlier.
pub fn write_cached(cache: &Path, id: &str, body: &str) {
    let dir = cache.join("plugins");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(id), body).unwrap();
}
