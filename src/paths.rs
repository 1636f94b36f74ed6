//! Path alias resolution and lexical normalisation.
//!
//! Paths of the form `@name/rest` are mapped through the configured alias
//! table; everything is then made absolute and `.`/`..` components are
//! collapsed without touching the filesystem.

use crate::{Result, ThumbCacheError};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Expands a leading `@alias` segment using `aliases`.
pub fn resolve_alias(raw: &Path, aliases: &BTreeMap<String, PathBuf>) -> Result<PathBuf> {
    let Some(s) = raw.to_str().and_then(|s| s.strip_prefix('@')) else {
        return Ok(raw.to_path_buf());
    };

    let (name, rest) = match s.split_once(|c: char| c == '/' || c == '\\') {
        Some((name, rest)) => (name, Some(rest)),
        None => (s, None),
    };
    let base = aliases
        .get(name)
        .ok_or_else(|| ThumbCacheError::InvalidParameter(format!("Unknown path alias: @{}", name)))?;

    Ok(match rest {
        Some(rest) if !rest.is_empty() => base.join(rest),
        _ => base.clone(),
    })
}

/// Makes `path` absolute and collapses `.` and `..` lexically.
///
/// Symlinks are left alone; `..` at the root stays at the root.
pub fn normalize(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    Ok(out)
}

/// Alias resolution followed by normalisation.
pub fn resolve(raw: &Path, aliases: &BTreeMap<String, PathBuf>) -> Result<PathBuf> {
    normalize(&resolve_alias(raw, aliases)?)
}

/// Resolves an untrusted source path, keeping it inside an allowed directory.
///
/// `@alias/...` paths must stay within that alias' directory. Other paths are
/// taken relative to `source_root` and must stay within it; without a
/// `source_root` only alias paths are accepted. The check is lexical, so a
/// symlink inside an allowed directory is still followed.
pub fn resolve_within(
    raw: &Path,
    aliases: &BTreeMap<String, PathBuf>,
    source_root: Option<&Path>,
) -> Result<PathBuf> {
    let is_alias = raw.to_str().is_some_and(|s| s.starts_with('@'));

    let (base, resolved) = if is_alias {
        let expanded = resolve_alias(raw, aliases)?;
        let name = raw.iter().next().map(|c| c.to_string_lossy().into_owned()).unwrap_or_default();
        let dir = aliases
            .get(name.trim_start_matches('@'))
            .ok_or_else(|| ThumbCacheError::InvalidParameter(format!("Unknown path alias: {}", name)))?;
        (normalize(dir)?, normalize(&expanded)?)
    } else {
        let root = source_root.ok_or_else(|| {
            ThumbCacheError::Forbidden(format!("{} is not an allowed source path", raw.display()))
        })?;
        let root = normalize(root)?;
        let resolved = normalize(&root.join(raw))?;
        (root, resolved)
    };

    if !resolved.starts_with(&base) {
        return Err(ThumbCacheError::Forbidden(format!(
            "{} resolves outside {}",
            raw.display(),
            base.display()
        )));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aliases() -> BTreeMap<String, PathBuf> {
        let mut map = BTreeMap::new();
        map.insert("frontend".to_string(), PathBuf::from("/srv/frontend/web"));
        map
    }

    #[test]
    fn expands_known_alias() {
        let p = resolve_alias(Path::new("@frontend/upload/a.jpg"), &aliases()).unwrap();
        assert_eq!(p, PathBuf::from("/srv/frontend/web/upload/a.jpg"));

        let p = resolve_alias(Path::new("@frontend"), &aliases()).unwrap();
        assert_eq!(p, PathBuf::from("/srv/frontend/web"));
    }

    #[test]
    fn unknown_alias_is_invalid_parameter() {
        let err = resolve_alias(Path::new("@backend/a.jpg"), &aliases()).unwrap_err();
        assert!(matches!(err, ThumbCacheError::InvalidParameter(_)));
    }

    #[cfg(unix)]
    #[test]
    fn collapses_dot_segments() {
        let p = normalize(Path::new("/srv/./images/../photos//a.jpg")).unwrap();
        assert_eq!(p, PathBuf::from("/srv/photos/a.jpg"));

        let p = normalize(Path::new("/../a.jpg")).unwrap();
        assert_eq!(p, PathBuf::from("/a.jpg"));
    }

    #[cfg(unix)]
    #[test]
    fn contained_paths_resolve() {
        let root = Path::new("/srv/photos");
        let p = resolve_within(Path::new("2024/a.jpg"), &aliases(), Some(root)).unwrap();
        assert_eq!(p, PathBuf::from("/srv/photos/2024/a.jpg"));

        let p = resolve_within(Path::new("/srv/photos/b.jpg"), &aliases(), Some(root)).unwrap();
        assert_eq!(p, PathBuf::from("/srv/photos/b.jpg"));

        let p = resolve_within(Path::new("@frontend/img/../a.jpg"), &aliases(), None).unwrap();
        assert_eq!(p, PathBuf::from("/srv/frontend/web/a.jpg"));
    }

    #[cfg(unix)]
    #[test]
    fn escaping_paths_are_forbidden() {
        let root = Some(Path::new("/srv/photos"));
        for raw in ["/etc/passwd", "../secret.jpg", "2024/../../etc/passwd", "/srv/photos-old/a.jpg"] {
            let err = resolve_within(Path::new(raw), &aliases(), root).unwrap_err();
            assert!(matches!(err, ThumbCacheError::Forbidden(_)), "{raw}");
        }

        let err = resolve_within(Path::new("@frontend/../../etc/passwd"), &aliases(), root).unwrap_err();
        assert!(matches!(err, ThumbCacheError::Forbidden(_)));

        let err = resolve_within(Path::new("/srv/photos/a.jpg"), &aliases(), None).unwrap_err();
        assert!(matches!(err, ThumbCacheError::Forbidden(_)));
    }

    #[test]
    fn relative_paths_become_absolute() {
        let p = normalize(Path::new("images/a.jpg")).unwrap();
        assert!(p.is_absolute());
        assert!(p.ends_with("images/a.jpg"));
    }
}
