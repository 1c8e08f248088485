//! Lexical path helpers

use std::io;
use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` components without touching the filesystem
///
/// `..` at the root stays at the root.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                out.push(component.as_os_str())
            }
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
        }
    }
    out
}

/// Make `path` absolute against the current directory and normalize it
pub(crate) fn absolutize(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(normalize(path))
    } else {
        Ok(normalize(&std::env::current_dir()?.join(path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(normalize(Path::new("/a/b/")), PathBuf::from("/a/b"));
    }

    #[test]
    fn test_absolutize_relative() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(absolutize(Path::new("x/../y")).unwrap(), cwd.join("y"));
        assert_eq!(absolutize(Path::new("/abs")).unwrap(), PathBuf::from("/abs"));
    }
}
