//! OS-level confinement for plugin processes.
//!
//! On Linux the child restricts itself with Landlock between fork and exec:
//! the filesystem is reduced to read/execute on the configured system paths
//! and the plugin's own source, read/write on its private directory, and
//! TCP bind/connect is refused unless networking is allowed. Host services
//! are then the only way out. Other platforms run plugins unconfined.

use chorus_core::config::SandboxConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[cfg(target_os = "linux")]
    #[error("failed to build landlock ruleset: {0}")]
    Ruleset(#[from] landlock::RulesetError),
}

/// What one plugin process may touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxPolicy {
    /// Read and execute.
    pub read_paths: Vec<PathBuf>,
    /// Read and write, no execute.
    pub private_dir: PathBuf,
    pub allow_network: bool,
}

impl SandboxPolicy {
    pub fn new(config: &SandboxConfig, source: &Path, private_dir: PathBuf) -> Self {
        let mut read_paths = config.read_paths.clone();
        read_paths.push(source.to_path_buf());
        Self {
            read_paths,
            private_dir,
            allow_network: config.allow_network,
        }
    }
}

/// Whether the running kernel can enforce a [`SandboxPolicy`].
#[cfg(target_os = "linux")]
pub fn is_supported() -> bool {
    const LANDLOCK_CREATE_RULESET_VERSION: libc::c_uint = 1;
    // SAFETY: the version query takes no attribute pointer and creates no fd.
    let abi = unsafe {
        libc::syscall(
            libc::SYS_landlock_create_ruleset,
            std::ptr::null::<libc::c_void>(),
            0usize,
            LANDLOCK_CREATE_RULESET_VERSION,
        )
    };
    abi >= 1
}

#[cfg(not(target_os = "linux"))]
pub fn is_supported() -> bool {
    false
}

/// Arrange for `cmd`'s child to confine itself before exec. Returns false,
/// leaving `cmd` untouched, when the platform cannot enforce the policy.
#[cfg(target_os = "linux")]
pub(crate) fn confine(cmd: &mut Command, policy: &SandboxPolicy) -> Result<bool, SandboxError> {
    use landlock::{
        path_beneath_rules, Access, AccessFs, AccessNet, Ruleset, RulesetAttr, RulesetCreatedAttr,
        ABI,
    };
    use std::sync::Mutex;

    if !is_supported() {
        return Ok(false);
    }

    let abi = ABI::V4;
    let mut private = AccessFs::from_all(abi);
    private.remove(AccessFs::Execute);

    let mut ruleset = Ruleset::default().handle_access(AccessFs::from_all(abi))?;
    if !policy.allow_network {
        ruleset = ruleset.handle_access(AccessNet::from_all(abi))?;
    }
    let readable: Vec<&PathBuf> = policy.read_paths.iter().filter(|p| p.exists()).collect();
    let created = ruleset
        .create()?
        .add_rules(path_beneath_rules(readable, AccessFs::from_read(abi)))?
        .add_rules(path_beneath_rules([&policy.private_dir], private))?;

    // Built in the parent; the child only issues the restrict syscalls.
    let pending = Mutex::new(Some(created));
    // SAFETY: the closure performs no allocation beyond what restrict_self
    // needs and touches no lock other than its own uncontended mutex.
    unsafe {
        cmd.pre_exec(move || {
            let ruleset = pending.lock().ok().and_then(|mut slot| slot.take());
            if let Some(ruleset) = ruleset {
                ruleset
                    .restrict_self()
                    .map_err(|_| std::io::Error::from(std::io::ErrorKind::PermissionDenied))?;
            }
            Ok(())
        });
    }
    Ok(true)
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn confine(_cmd: &mut Command, _policy: &SandboxPolicy) -> Result<bool, SandboxError> {
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_adds_the_source_file_to_readable_paths() {
        let config = SandboxConfig {
            read_paths: vec![PathBuf::from("/usr")],
            ..SandboxConfig::default()
        };
        let policy = SandboxPolicy::new(
            &config,
            Path::new("/cache/plugins/qq"),
            PathBuf::from("/cache/sandbox/qq"),
        );
        assert_eq!(
            policy.read_paths,
            vec![PathBuf::from("/usr"), PathBuf::from("/cache/plugins/qq")]
        );
        assert_eq!(policy.private_dir, PathBuf::from("/cache/sandbox/qq"));
        assert!(!policy.allow_network);
    }
}
