/// Scratch `EmptyDir` mount path shared by the injected sidecar/init-container.
pub const SCRATCH_DIR: &str = "/tmp/stash";
/// Mount path used for a `Local` backend's volume source.
pub const LOCAL_BACKEND_DIR: &str = "/safe-data";
/// Mount path for the downward-API volume exposing pod labels to the backup container.
pub const PODINFO_DIR: &str = "/etc/stash/podinfo";
