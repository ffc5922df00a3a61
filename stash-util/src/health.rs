use crate::consts::{LOCAL_BACKEND_DIR, SCRATCH_DIR};
use std::fs::{read_to_string, remove_file, write};
use std::path::Path;

/// The text to test the volume is working fine, just for testing purposes :)
const TEST_TEXT: &str = "If I become a cat, I won't have to work anymore :)";
/// The test file name
const TEST_FILENAME: &str = "working_mans_dream";

/// Check if the volume under the path is working fine
fn check_volume(path: &Path) -> bool {
    let filename = format!("{TEST_FILENAME}_{}", uuid::Uuid::new_v4());
    let path = path.join(filename);
    if write(&path, TEST_TEXT).is_err() {
        return false;
    }
    let content = read_to_string(&path);
    if remove_file(&path).is_err() {
        return false;
    }
    match content {
        Ok(content) => {
            if content != TEST_TEXT {
                return false;
            }
        }
        Err(_) => return false,
    }
    true
}

/// Check if the scratch volume mounted into the backup container is working fine
#[inline]
#[must_use]
pub fn check_scratch_volume() -> bool {
    check_volume(Path::new(SCRATCH_DIR))
}

/// Check if a mounted `Local` backend volume is working fine
#[inline]
#[must_use]
pub fn check_local_backend_volume() -> bool {
    let backend_volume = Path::new(LOCAL_BACKEND_DIR);
    if !backend_volume.exists() {
        // A Local-backend repository is optional; absence is not a failure.
        return true;
    }
    check_volume(backend_volume)
}

#[cfg(test)]
mod test {
    use crate::health::check_volume;
    use std::path::Path;

    #[test]
    fn check_volume_return_ok() {
        assert!(check_volume(Path::new(".")));
    }
}
