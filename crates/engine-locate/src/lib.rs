//! # engine-locate
//!
//! Find the external conversion engines used by `edgequake-doc2img`:
//!
//! * **LibreOffice** (`soffice`): office document → PDF
//! * **poppler** (`pdftoppm`): PDF → one image per page
//!
//! Both are opaque executables. Packagers put them in very different places
//! (a macOS app bundle, `Program Files`, `/usr/lib/libreoffice/program`, a
//! Homebrew prefix), and only some of those are on `PATH`. This crate hides
//! that behind a single call.
//!
//! ## Resolution order
//!
//! On a call to [`locate`] (first match wins):
//!
//! 1. The engine's environment override (`DOC2IMG_SOFFICE_PATH`,
//!    `DOC2IMG_PDFTOPPM_PATH`), if it points to an existing file.
//! 2. Each known binary name searched through `PATH`.
//! 3. Well-known install locations for the current OS.
//!
//! Successful lookups are cached for the life of the process.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use engine_locate::{locate, resolve, Engine};
//!
//! // Plain lookup
//! let soffice = locate(Engine::Soffice).expect("LibreOffice not installed");
//!
//! // Explicit configuration wins over discovery
//! let pdftoppm = resolve(Engine::Pdftoppm, Some("/opt/poppler/bin/pdftoppm".as_ref()))
//!     .expect("pdftoppm not found");
//! ```
//!
//! ## Known locations
//!
//! | OS      | LibreOffice                                              | poppler                      |
//! |---------|----------------------------------------------------------|------------------------------|
//! | macOS   | `/Applications/LibreOffice.app/Contents/MacOS/soffice`   | `/opt/homebrew/bin`, `/usr/local/bin` |
//! | Linux   | `/usr/lib/libreoffice/program`, `/opt/libreoffice*/program`, snap | `/usr/bin`, `/usr/local/bin` |
//! | Windows | `C:\Program Files\LibreOffice\program\soffice.exe`       | `C:\Program Files\poppler\Library\bin` |

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

// ── Engines ──────────────────────────────────────────────────────────────────

/// An external conversion engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    /// LibreOffice in headless mode (office → PDF).
    Soffice,
    /// poppler's `pdftoppm` (PDF → images).
    Pdftoppm,
}

impl Engine {
    /// Environment variable that overrides discovery for this engine.
    pub fn env_var(self) -> &'static str {
        match self {
            Engine::Soffice => "DOC2IMG_SOFFICE_PATH",
            Engine::Pdftoppm => "DOC2IMG_PDFTOPPM_PATH",
        }
    }

    /// Executable names tried on `PATH`, in order.
    pub fn binary_names(self) -> &'static [&'static str] {
        if cfg!(windows) {
            match self {
                Engine::Soffice => &["soffice.exe", "soffice.com"],
                Engine::Pdftoppm => &["pdftoppm.exe"],
            }
        } else {
            match self {
                Engine::Soffice => &["soffice", "libreoffice"],
                Engine::Pdftoppm => &["pdftoppm"],
            }
        }
    }

    /// Package the user should install when the engine is missing.
    pub fn install_hint(self) -> &'static str {
        match self {
            Engine::Soffice => {
                "Install LibreOffice (apt install libreoffice-core / brew install --cask libreoffice) \
                 or set DOC2IMG_SOFFICE_PATH."
            }
            Engine::Pdftoppm => {
                "Install poppler (apt install poppler-utils / brew install poppler) \
                 or set DOC2IMG_PDFTOPPM_PATH."
            }
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Soffice => f.write_str("soffice"),
            Engine::Pdftoppm => f.write_str("pdftoppm"),
        }
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by engine-locate operations.
#[derive(Error, Debug)]
pub enum LocateError {
    /// No candidate location held an executable for this engine.
    #[error("{engine} not found (searched PATH and {searched} known locations). {hint}")]
    NotFound {
        engine: Engine,
        searched: usize,
        hint: &'static str,
    },

    /// An explicitly configured path does not exist or is not executable.
    #[error("Configured {engine} path '{path}' is not an executable file")]
    NotExecutable { engine: Engine, path: PathBuf },
}

// ── Process-wide cache ───────────────────────────────────────────────────────

static SOFFICE: OnceLock<PathBuf> = OnceLock::new();
static PDFTOPPM: OnceLock<PathBuf> = OnceLock::new();

fn cache_for(engine: Engine) -> &'static OnceLock<PathBuf> {
    match engine {
        Engine::Soffice => &SOFFICE,
        Engine::Pdftoppm => &PDFTOPPM,
    }
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Locate `engine`, consulting the process cache first.
///
/// Only successful lookups are cached: installing the tool while the process
/// runs is picked up by the next call.
pub fn locate(engine: Engine) -> Result<PathBuf, LocateError> {
    let cache = cache_for(engine);
    if let Some(path) = cache.get() {
        return Ok(path.clone());
    }

    let path = locate_uncached(engine)?;
    // Racing callers resolve the same path; losing the set is harmless.
    let _ = cache.set(path.clone());
    Ok(path)
}

/// Resolve `engine`, preferring an explicitly configured path.
///
/// An explicit path that is not executable is an error rather than a
/// silent fall-back: the operator asked for that binary specifically.
pub fn resolve(engine: Engine, explicit: Option<&Path>) -> Result<PathBuf, LocateError> {
    match explicit {
        Some(path) if is_executable(path) => Ok(path.to_path_buf()),
        Some(path) => Err(LocateError::NotExecutable {
            engine,
            path: path.to_path_buf(),
        }),
        None => locate(engine),
    }
}

/// Returns `true` when [`locate`] would succeed.
pub fn is_available(engine: Engine) -> bool {
    locate(engine).is_ok()
}

/// Locate `engine` without touching the process cache.
pub fn locate_uncached(engine: Engine) -> Result<PathBuf, LocateError> {
    // 1. Environment override.
    if let Some(env_path) = std::env::var_os(engine.env_var()) {
        let p = PathBuf::from(env_path);
        if is_executable(&p) {
            return Ok(p);
        }
        // Fall through: the variable is set but stale.
    }

    // 2. PATH search.
    if let Some(path_var) = std::env::var_os("PATH") {
        if let Some(found) = search_path(engine.binary_names(), &path_var) {
            return Ok(found);
        }
    }

    // 3. Well-known install locations.
    let candidates = known_locations(engine);
    if let Some(found) = candidates.iter().find(|p| is_executable(p)) {
        return Ok(found.clone());
    }

    Err(LocateError::NotFound {
        engine,
        searched: candidates.len(),
        hint: engine.install_hint(),
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────────

/// Search each directory of a `PATH`-style value for any of `names`.
fn search_path(names: &[&str], path_var: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .find(|candidate| is_executable(candidate))
}

/// Install locations worth probing on the current OS.
fn known_locations(engine: Engine) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = Vec::new();
    let home = dirs::home_dir();

    match (std::env::consts::OS, engine) {
        ("macos", Engine::Soffice) => {
            out.push("/Applications/LibreOffice.app/Contents/MacOS/soffice".into());
            if let Some(ref h) = home {
                out.push(h.join("Applications/LibreOffice.app/Contents/MacOS/soffice"));
            }
        }
        ("macos", Engine::Pdftoppm) => {
            out.push("/opt/homebrew/bin/pdftoppm".into());
            out.push("/usr/local/bin/pdftoppm".into());
            out.push("/opt/local/bin/pdftoppm".into());
        }
        ("linux", Engine::Soffice) => {
            out.push("/usr/lib/libreoffice/program/soffice".into());
            out.push("/usr/lib64/libreoffice/program/soffice".into());
            out.push("/snap/bin/libreoffice".into());
            out.extend(opt_libreoffice_dirs());
        }
        ("linux", Engine::Pdftoppm) => {
            out.push("/usr/bin/pdftoppm".into());
            out.push("/usr/local/bin/pdftoppm".into());
        }
        ("windows", Engine::Soffice) => {
            out.push(r"C:\Program Files\LibreOffice\program\soffice.exe".into());
            out.push(r"C:\Program Files (x86)\LibreOffice\program\soffice.exe".into());
        }
        ("windows", Engine::Pdftoppm) => {
            out.push(r"C:\Program Files\poppler\Library\bin\pdftoppm.exe".into());
            if let Some(local) = dirs::data_local_dir() {
                out.push(local.join(r"poppler\Library\bin\pdftoppm.exe"));
            }
        }
        _ => {}
    }

    // User-local installs on any Unix.
    if cfg!(unix) {
        if let Some(ref h) = home {
            for name in engine.binary_names() {
                out.push(h.join(".local/bin").join(name));
            }
        }
    }

    out
}

/// `/opt/libreoffice7.6/program/soffice` and friends (vendor tarball installs).
fn opt_libreoffice_dirs() -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir("/opt") else {
        return Vec::new();
    };
    let mut found: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with("libreoffice"))
        .map(|e| e.path().join("program/soffice"))
        .collect();
    // Newest version first.
    found.sort();
    found.reverse();
    found
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
