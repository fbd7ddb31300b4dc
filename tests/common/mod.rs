//! Shared fixtures: stand-in `soffice` / `pdftoppm` shell scripts.
//!
//! The scripts are written once per test binary (behind a `OnceLock`) so no
//! test ever executes a file another thread still has open for writing
//! (`ETXTBSY`).
//!
//! Fake documents are plain text the scripts understand:
//!
//! * office input: a line `pages=N`
//! * PDF input: `%PDF-1.7` then `pages=N`, optionally `gap=K` (page K is
//!   not rendered)
//!
//! Each script also touches `<upload_dir>/<tool>-invoked`, so a test can
//! prove a tool was (or was not) launched.

#![allow(dead_code)]

use edgequake_doc2img::{ServiceConfig, ServiceConfigBuilder};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tempfile::TempDir;

pub const FIXTURE_WIDTH: u32 = 40;
pub const FIXTURE_HEIGHT: u32 = 30;

pub struct FakeTools {
    _dir: TempDir,
    /// Writes `<stem>.pdf` carrying the input's page count.
    pub soffice: PathBuf,
    /// Never exits on its own.
    pub soffice_hang: PathBuf,
    /// Exits 0 without writing anything.
    pub soffice_silent: PathBuf,
    /// Copies the fixture PNG once per page.
    pub pdftoppm: PathBuf,
    /// Waits on a background child that never exits.
    pub pdftoppm_hang: PathBuf,
}

const SOFFICE: &str = r#"#!/bin/sh
outdir=""
input=""
while [ $# -gt 0 ]; do
  case "$1" in
    --outdir) outdir="$2"; shift 2 ;;
    *) input="$1"; shift ;;
  esac
done
touch "$outdir/../soffice-invoked"
pages=$(sed -n 's/^pages=//p' "$input")
if [ -z "$pages" ]; then
  echo "Error: source file could not be loaded" >&2
  exit 1
fi
name=$(basename "$input")
stem="${name%.*}"
printf '%%PDF-1.7\npages=%s\n' "$pages" > "$outdir/$stem.pdf"
"#;

const SOFFICE_HANG: &str = "#!/bin/sh\nexec sleep 30\n";

const SOFFICE_SILENT: &str = "#!/bin/sh\nexit 0\n";

const PDFTOPPM_HANG: &str = "#!/bin/sh\nsleep 30 &\nwait\n";

const PDFTOPPM: &str = r#"#!/bin/sh
prev=""
last=""
for a in "$@"; do prev="$last"; last="$a"; done
pdf="$prev"
prefix="$last"
dir=$(dirname "$prefix")
touch "$dir/../pdftoppm-invoked"
pages=$(sed -n 's/^pages=//p' "$pdf")
if [ -z "$pages" ]; then
  echo "Syntax Error: Couldn't find trailer dictionary in '$pdf'" >&2
  exit 1
fi
gap=$(sed -n 's/^gap=//p' "$pdf")
w=${#pages}
fmt="%s-%0${w}d.png"
i=1
while [ "$i" -le "$pages" ]; do
  if [ "$i" != "$gap" ]; then
    cp "__FIXTURE__" "$(printf "$fmt" "$prefix" "$i")"
  fi
  i=$((i+1))
done
"#;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn tools() -> &'static FakeTools {
    static TOOLS: OnceLock<FakeTools> = OnceLock::new();
    TOOLS.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();

        let fixture = dir.path().join("fixture.png");
        image::RgbImage::from_pixel(FIXTURE_WIDTH, FIXTURE_HEIGHT, image::Rgb([200, 30, 30]))
            .save(&fixture)
            .unwrap();

        let pdftoppm_body = PDFTOPPM.replace("__FIXTURE__", &fixture.to_string_lossy());
        FakeTools {
            soffice: write_script(dir.path(), "soffice", SOFFICE),
            soffice_hang: write_script(dir.path(), "soffice-hang", SOFFICE_HANG),
            soffice_silent: write_script(dir.path(), "soffice-silent", SOFFICE_SILENT),
            pdftoppm: write_script(dir.path(), "pdftoppm", &pdftoppm_body),
            pdftoppm_hang: write_script(dir.path(), "pdftoppm-hang", PDFTOPPM_HANG),
            _dir: dir,
        }
    })
}

/// Builder wired to the fake tools with short timeouts.
pub fn config(upload_dir: &Path) -> ServiceConfigBuilder {
    let t = tools();
    ServiceConfig::builder()
        .upload_dir(upload_dir)
        .soffice_path(&t.soffice)
        .pdftoppm_path(&t.pdftoppm)
        .office_timeout(Duration::from_secs(10))
        .raster_timeout(Duration::from_secs(10))
}

pub fn fake_pdf(pages: usize) -> Vec<u8> {
    format!("%PDF-1.7\npages={pages}\n").into_bytes()
}

pub fn fake_pdf_with_gap(pages: usize, gap: usize) -> Vec<u8> {
    format!("%PDF-1.7\npages={pages}\ngap={gap}\n").into_bytes()
}

pub fn fake_office(pages: usize) -> Vec<u8> {
    format!("pages={pages}\n").into_bytes()
}

/// Job workspaces still present under `upload_dir`.
pub fn job_dirs(upload_dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(upload_dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("job-"))
            .map(|e| e.path())
            .collect(),
        Err(_) => Vec::new(),
    }
}

pub fn invoked(upload_dir: &Path, tool: &str) -> bool {
    upload_dir.join(format!("{tool}-invoked")).exists()
}
