//! Out-of-process provider plugins for Chorus.
//!
//! This crate provides:
//! - A JSON line protocol spoken over a plugin's stdin/stdout
//! - An exec-based host that spawns plugins in a private working directory
//!   with an explicit environment
//! - Host services (HTTP, HTML selectors, digests, AES, big integers, date,
//!   encoding) plugins may call back into, limited to the capabilities the
//!   operator allows
//! - Landlock confinement on Linux, so host services are the plugin's only
//!   route to the network and to files outside its private directory
//! - A loader that caches plugin sources write-once and wraps each running
//!   plugin as a [`chorus_core::Provider`]
//!
//! # Plugin Protocol
//!
//! ```text
//! while (line = read_stdin()):
//!     request = json_parse(line)
//!     if request.method.type == "Initialize":
//!         reply {"status": "Initialized", "id": "qq", "name": "QQ Music",
//!                "version": "1.0.0", "protocol_version": 1,
//!                "capabilities": ["search", "getMediaSource"],
//!                "host_capabilities": ["http"]}
//!     elif request.method.type == "Search":
//!         write_stdout({"host_call": 1, "call": {"type": "Http",
//!                       "params": {"url": "https://..."}}})
//!         reply = json_parse(read_stdin()).reply
//!         # {"kind": "Http", "status": 200, "headers": {...}, "body": "..."}
//!         page = reply.body
//!         reply {"status": "Tracks", "result": {"data": [...]}}
//! ```
//!
//! Every reply is written as `{"id": request.id, "result": ...}` on one line.

mod adapter;
mod host;
mod host_services;
mod loader;
pub mod protocol;
pub mod sandbox;

pub use adapter::ExecPluginProvider;
pub use host::{ExecPluginHost, PluginConfig, PluginHostError};
pub use host_services::{page_title, select_texts, HostServices};
pub use loader::{LoadError, PluginLoader};
pub use sandbox::{SandboxError, SandboxPolicy};
pub use protocol::{
    HostCall, HostReply, PluginError, PluginErrorKind, PluginInfo, PluginMethod, PluginRequest,
    PluginResponse, PluginResult, PROTOCOL_VERSION,
};
