//! Cgroup classification: maps a process to its container id and/or
//! systemd service from the Linux cgroup path.

/// Parsed cgroup information for a process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CgroupInfo {
    /// Docker/Podman short container id (first 12 chars of the full id).
    pub container_id: String,
    /// systemd service name (e.g. `nginx.service`).
    pub service_name: String,
}

/// Reads and parses `/proc/<pid>/cgroup`.
#[cfg(target_os = "linux")]
pub fn read_cgroup(pid: u32) -> CgroupInfo {
    match std::fs::read_to_string(format!("/proc/{pid}/cgroup")) {
        Ok(content) => parse_cgroup(&content),
        Err(_) => CgroupInfo::default(),
    }
}

/// Parses cgroup file content.
///
/// Lines look like `hierarchy-id:controllers:path`, e.g.
/// `0::/system.slice/docker-abc….scope`. The first recognized container id
/// and service name win.
pub fn parse_cgroup(content: &str) -> CgroupInfo {
    let mut info = CgroupInfo::default();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(3, ':');
        let (Some(_), Some(_), Some(path)) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };

        if info.container_id.is_empty() {
            if let Some(id) = extract_docker_id(path) {
                info.container_id = id;
            }
        }
        if info.container_id.is_empty() {
            if let Some(id) = extract_podman_id(path) {
                info.container_id = id;
            }
        }
        if info.service_name.is_empty() {
            if let Some(svc) = extract_systemd_service(path) {
                info.service_name = svc;
            }
        }
    }

    info
}

/// Recognizes `/docker/<id>[/...]` and `docker-<id>.scope` segments.
fn extract_docker_id(path: &str) -> Option<String> {
    if let Some(idx) = path.find("/docker/") {
        let id = &path[idx + "/docker/".len()..];
        let id = id.split('/').next().unwrap_or("");
        if !id.is_empty() {
            return Some(short_id(id));
        }
    }

    for seg in path.split('/') {
        if let Some(id) = seg
            .strip_prefix("docker-")
            .and_then(|s| s.strip_suffix(".scope"))
        {
            if !id.is_empty() {
                return Some(short_id(id));
            }
        }
    }

    None
}

/// Recognizes `libpod-<id>[.scope]` segments.
fn extract_podman_id(path: &str) -> Option<String> {
    for seg in path.split('/') {
        if let Some(id) = seg.strip_prefix("libpod-") {
            let id = id.split('.').next().unwrap_or("");
            if !id.is_empty() {
                return Some(short_id(id));
            }
        }
    }
    None
}

/// Last `*.service` segment, excluding `docker-*` container entries.
fn extract_systemd_service(path: &str) -> Option<String> {
    for seg in path.split('/') {
        if seg.ends_with(".service") && !seg.starts_with("docker-") {
            return Some(seg.to_string());
        }
    }
    None
}

/// Standard 12-char short form of a container id.
fn short_id(id: &str) -> String {
    if id.len() > 12 {
        id[..12].to_string()
    } else {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_ID: &str = "4e8e7c7a2b1c9d0e8f7a6b5c4d3e2f1a0b9c8d7e6f5a4b3c2d1e0f9a8b7c6d5e";

    #[test]
    fn docker_plain_path() {
        let content = format!("0::/docker/{FULL_ID}");
        let info = parse_cgroup(&content);
        assert_eq!(info.container_id, "4e8e7c7a2b1c");
        assert_eq!(info.service_name, "");
    }

    #[test]
    fn docker_path_with_subdirs() {
        let content = format!("12:memory:/docker/{FULL_ID}/init");
        assert_eq!(parse_cgroup(&content).container_id, "4e8e7c7a2b1c");
    }

    #[test]
    fn docker_systemd_scope() {
        let content = format!("0::/system.slice/docker-{FULL_ID}.scope");
        assert_eq!(parse_cgroup(&content).container_id, "4e8e7c7a2b1c");
    }

    #[test]
    fn podman_scope() {
        let content = format!("0::/machine.slice/libpod-{FULL_ID}.scope");
        assert_eq!(parse_cgroup(&content).container_id, "4e8e7c7a2b1c");
    }

    #[test]
    fn podman_without_suffix() {
        let content = format!("0::/libpod_parent/libpod-{FULL_ID}");
        assert_eq!(parse_cgroup(&content).container_id, "4e8e7c7a2b1c");
    }

    #[test]
    fn systemd_service() {
        let info = parse_cgroup("0::/system.slice/nginx.service");
        assert_eq!(info.service_name, "nginx.service");
        assert_eq!(info.container_id, "");
    }

    #[test]
    fn docker_service_is_not_a_service_name() {
        let info = parse_cgroup("0::/system.slice/docker-foo.service");
        assert_eq!(info.service_name, "");
    }

    #[test]
    fn docker_service_does_not_hide_real_service() {
        let content = "1:name=systemd:/system.slice/docker-x.service\n0::/system.slice/postgresql.service";
        let info = parse_cgroup(content);
        assert_eq!(info.service_name, "postgresql.service");
    }

    #[test]
    fn empty_and_malformed_lines() {
        let info = parse_cgroup("\nnot-a-cgroup-line\n0:cpu\n");
        assert_eq!(info, CgroupInfo::default());
    }

    #[test]
    fn short_ids_pass_through() {
        let info = parse_cgroup("0::/docker/abc123");
        assert_eq!(info.container_id, "abc123");
    }
}
