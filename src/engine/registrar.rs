//! Registration of side-loaded fonts and datasource plugins.
//!
//! Both scans stop at the first asset the engine rejects; the remaining
//! entries are not registered.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::errors::{AssetKind, RegistrationError};
use crate::render::backend::{AssetRejected, MapBackend};

/// Extensions (lowercase) of the font files handed to the font engine.
pub const FONT_EXTENSIONS: [&str; 7] = ["ttf", "otf", "woff", "ttc", "pfa", "pfb", "dfont"];

/// Whether `path` has one of the [`FONT_EXTENSIONS`], ignoring case.
pub fn is_font_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| FONT_EXTENSIONS.iter().any(|f| e.eq_ignore_ascii_case(f)))
        .unwrap_or(false)
}

fn rejected(kind: AssetKind, path: PathBuf, reason: AssetRejected) -> RegistrationError {
    let message = reason
        .message
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("error while registering {kind}"));
    RegistrationError::Rejected { kind, path, message }
}

fn io_error(path: &Path, source: io::Error) -> RegistrationError {
    RegistrationError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn walk_error(root: &Path, err: walkdir::Error) -> RegistrationError {
    let path = err.path().unwrap_or(root).to_path_buf();
    let message = err.to_string();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, message));
    RegistrationError::Io { path, source }
}

/// Hands every entry of `dir` (not recursing) to the datasource plugin cache.
///
/// Entries are visited in file name order. Returns how many were handed over.
pub fn register_datasources(backend: &dyn MapBackend, dir: &Path) -> Result<usize, RegistrationError> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| io_error(dir, e))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| io_error(dir, e))?;
    entries.sort();

    for path in &entries {
        backend
            .register_datasource(path)
            .map_err(|r| rejected(AssetKind::Datasource, path.clone(), r))?;
        log::debug!("[mapnik] datasource {} registered", path.display());
    }

    Ok(entries.len())
}

/// Walks `dir` recursively and registers every font file found.
///
/// Files without a font extension are skipped. Returns the number of fonts registered.
pub fn register_fonts(backend: &dyn MapBackend, dir: &Path) -> Result<usize, RegistrationError> {
    let mut count = 0;

    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| walk_error(dir, e))?;
        if !entry.file_type().is_file() || !is_font_file(entry.path()) {
            continue;
        }

        backend
            .register_font(entry.path())
            .map_err(|r| rejected(AssetKind::Font, entry.path().to_path_buf(), r))?;
        log::debug!("[mapnik] font {} registered", entry.file_name().to_string_lossy());
        count += 1;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::render::backend::{NativeMap, Severity};
    use crate::render::backends::null::NullBackend;

    /// Records every call and rejects paths whose file name is listed.
    #[derive(Default)]
    struct RecordingBackend {
        fonts: Mutex<Vec<PathBuf>>,
        datasources: Mutex<Vec<PathBuf>>,
        reject: Vec<(&'static str, Option<&'static str>)>,
    }

    impl RecordingBackend {
        fn rejecting(name: &'static str, message: Option<&'static str>) -> Self {
            Self {
                reject: vec![(name, message)],
                ..Default::default()
            }
        }

        fn check(&self, path: &Path) -> Result<(), AssetRejected> {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            match self.reject.iter().find(|(n, _)| *n == name) {
                Some((_, Some(msg))) => Err(AssetRejected::new(*msg)),
                Some((_, None)) => Err(AssetRejected::silent()),
                None => Ok(()),
            }
        }

        fn fonts(&self) -> Vec<String> {
            self.fonts
                .lock()
                .unwrap()
                .iter()
                .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
                .collect()
        }
    }

    impl MapBackend for RecordingBackend {
        fn name(&self) -> &str {
            "RecordingBackend"
        }

        fn version(&self) -> String {
            "test".into()
        }

        fn set_log_severity(&self, _severity: Severity) {}

        fn register_font(&self, path: &Path) -> Result<(), AssetRejected> {
            self.fonts.lock().unwrap().push(path.to_path_buf());
            self.check(path)
        }

        fn register_datasource(&self, path: &Path) -> Result<(), AssetRejected> {
            self.datasources.lock().unwrap().push(path.to_path_buf());
            self.check(path)
        }

        fn create_map(&self, width: u32, height: u32) -> Box<dyn NativeMap + Send> {
            NullBackend::new().create_map(width, height)
        }
    }

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"data").unwrap();
    }

    #[test]
    fn font_extensions_ignore_case() {
        assert!(is_font_file(Path::new("a/DejaVuSans.ttf")));
        assert!(is_font_file(Path::new("a/Font.OTF")));
        assert!(is_font_file(Path::new("Font.Dfont")));
        assert!(!is_font_file(Path::new("fonts.conf")));
        assert!(!is_font_file(Path::new("ttf")));
        assert!(!is_font_file(Path::new("archive.ttf.zip")));
    }

    #[test]
    fn registers_each_font_once_and_recurses() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.ttf"));
        touch(&dir.path().join("nested/b.otf"));
        touch(&dir.path().join("nested/deeper/c.WOFF"));
        touch(&dir.path().join("d.pfb"));

        let backend = RecordingBackend::default();
        let count = register_fonts(&backend, dir.path()).unwrap();

        assert_eq!(count, 4);
        let mut fonts = backend.fonts();
        fonts.sort();
        assert_eq!(fonts, vec!["a.ttf", "b.otf", "c.WOFF", "d.pfb"]);
    }

    #[test]
    fn non_font_files_are_never_handed_over() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.ttf"));
        touch(&dir.path().join("b.txt"));
        touch(&dir.path().join("c.ttc"));
        touch(&dir.path().join("fonts.conf"));

        let backend = RecordingBackend::default();
        assert_eq!(register_fonts(&backend, dir.path()).unwrap(), 2);
        assert_eq!(backend.fonts(), vec!["a.ttf", "c.ttc"]);
    }

    #[test]
    fn font_scan_stops_at_first_rejection() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.ttf", "b.ttf", "c.ttf"] {
            touch(&dir.path().join(name));
        }

        let backend = RecordingBackend::rejecting("b.ttf", Some("could not load font"));
        let err = register_fonts(&backend, dir.path()).unwrap_err();

        match &err {
            RegistrationError::Rejected { kind, path, message } => {
                assert_eq!(*kind, AssetKind::Font);
                assert_eq!(path, &dir.path().join("b.ttf"));
                assert_eq!(message, "could not load font");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(backend.fonts(), vec!["a.ttf", "b.ttf"]);
    }

    #[test]
    fn silent_rejection_uses_generic_message() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.ttf"));

        let backend = RecordingBackend::rejecting("a.ttf", None);
        let err = register_fonts(&backend, dir.path()).unwrap_err();
        assert!(err.to_string().ends_with("error while registering fonts"), "{err}");
    }

    #[test]
    fn missing_font_dir_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let err = register_fonts(&RecordingBackend::default(), &missing).unwrap_err();
        match err {
            RegistrationError::Io { path, source } => {
                assert_eq!(path, missing);
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn broken_symlink_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.ttf"));
        std::os::unix::fs::symlink(dir.path().join("gone.ttf"), dir.path().join("link.ttf")).unwrap();

        let err = register_fonts(&RecordingBackend::default(), dir.path()).unwrap_err();
        assert!(matches!(err, RegistrationError::Io { .. }));
    }

    #[test]
    fn datasources_are_listed_without_recursing() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("shape.input"));
        touch(&dir.path().join("gdal.input"));
        touch(&dir.path().join("sub/postgis.input"));

        let backend = RecordingBackend::default();
        assert_eq!(register_datasources(&backend, dir.path()).unwrap(), 3);

        let seen = backend.datasources.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![dir.path().join("gdal.input"), dir.path().join("shape.input"), dir.path().join("sub")]
        );
    }

    #[test]
    fn datasource_scan_stops_at_first_rejection() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.input", "b.input", "c.input"] {
            touch(&dir.path().join(name));
        }

        let backend = RecordingBackend::rejecting("a.input", None);
        let err = register_datasources(&backend, dir.path()).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!(
                "registering datasources: {}: error while registering datasources",
                dir.path().join("a.input").display()
            )
        );
        assert_eq!(backend.datasources.lock().unwrap().len(), 1);
    }

    #[test]
    fn missing_plugin_dir_is_an_io_error() {
        let err = register_datasources(&RecordingBackend::default(), Path::new("/no/such/plugins")).unwrap_err();
        assert!(matches!(err, RegistrationError::Io { .. }));
    }
}
