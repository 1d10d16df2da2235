use std::{fs::File, io, path::Path};

use nix::errno::Errno;
use nix::fcntl::{OFlag, open};
use nix::libc::mode_t;
use nix::sys::stat::{Mode, stat};

/// Open `path` for appending, creating it with `mode` if nothing is there yet.
///
/// Returns the file and whether this call created it.
pub fn open_append(path: &Path, mode: u32) -> io::Result<(File, bool)> {
    // only used for logging, a racing creator just flips the answer
    let existed = match stat(path) {
        Ok(_) => true,
        Err(Errno::ENOENT) => false,
        Err(e) => return Err(e.into()),
    };

    let fd = open(
        path,
        OFlag::O_WRONLY | OFlag::O_APPEND | OFlag::O_CREAT | OFlag::O_CLOEXEC,
        Mode::from_bits_truncate(mode as mode_t),
    )?;

    Ok((File::from(fd), !existed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, io::Write, os::unix::fs::PermissionsExt};

    #[test]
    fn creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");

        let (_file, created) = open_append(&path, 0o644).unwrap();
        assert!(created);
        assert!(path.exists());

        // umask can only clear bits
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode & !0o644, 0);
    }

    #[test]
    fn appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, "A").unwrap();

        let (mut file, created) = open_append(&path, 0o644).unwrap();
        assert!(!created);
        file.write_all(b"B").unwrap();
        drop(file);

        assert_eq!(fs::read_to_string(&path).unwrap(), "AB");
    }

    #[test]
    fn missing_parent_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no/such/dir/out.txt");

        let err = open_append(&path, 0o644).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
