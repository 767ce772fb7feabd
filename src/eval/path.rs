//! Command resolution against `$path`.

use crate::env::Env;
use nix::unistd::{getegid, geteuid, getgroups};
use std::os::unix::fs::MetadataExt;
use std::path::Path;

/// Resolves a command name. A name containing `/` is used as-is; other
/// names search each `$path` directory in order. Either way the result
/// must pass the accessibility check.
pub(crate) fn resolve_path(name: &str, env: &Env) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    if name.contains('/') {
        if rc_access(name) {
            return Some(name.to_string());
        }
        return None;
    }
    for dir in path_list(env) {
        let dir = if dir.is_empty() { "." } else { &dir };
        let full = Path::new(dir).join(name);
        if rc_access(&full.to_string_lossy()) {
            return Some(full.to_string_lossy().into_owned());
        }
    }
    None
}

pub(crate) fn path_list(env: &Env) -> Vec<String> {
    if let Some(vals) = env.get("path") {
        if !vals.is_empty() {
            return vals;
        }
    }
    match std::env::var("PATH") {
        Ok(p) if !p.is_empty() => p.split(':').map(str::to_string).collect(),
        _ => vec![String::new()],
    }
}

/// Whether the file is a regular file this process may execute, judged
/// by ownership class: owner, group (including supplementary groups),
/// or other. Root needs any execute bit.
pub(crate) fn rc_access(path: &str) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    let mode = meta.mode();
    let uid = geteuid().as_raw();
    if uid == 0 {
        return mode & 0o111 != 0;
    }
    if meta.uid() == uid {
        return mode & 0o100 != 0;
    }
    let gid = getegid().as_raw();
    if meta.gid() == gid || in_group(meta.gid()) {
        return mode & 0o010 != 0;
    }
    mode & 0o001 != 0
}

fn in_group(gid: u32) -> bool {
    getgroups()
        .map(|groups| groups.iter().any(|g| g.as_raw() == gid))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_finds_sh() {
        let env = Env::new();
        // every test environment carries a shell somewhere on PATH
        if std::env::var("PATH").is_ok() {
            assert!(resolve_path("sh", &env).is_some());
        }
    }

    #[test]
    fn resolve_slash_name_skips_search() {
        let env = Env::new();
        assert_eq!(
            resolve_path("/no/such/binary", &env),
            None,
        );
    }

    #[test]
    fn env_path_overrides_os_path() {
        let env = Env::new();
        env.set("path", vec!["/definitely/not/a/dir".into()]);
        assert_eq!(resolve_path("sh", &env), None);
    }

    #[test]
    fn access_rejects_directories() {
        assert!(!rc_access("/"));
    }
}
