//! Office → PDF via headless LibreOffice.
//!
//! ## Isolation
//!
//! LibreOffice keeps a user profile (registry, lock file) and refuses to
//! start a second instance on a profile already in use, so two concurrent
//! jobs sharing `~/.config/libreoffice` would block or fail each other.
//! Every run therefore points `-env:UserInstallation` at a profile directory
//! inside the job's own workspace, which is deleted with the workspace.
//!
//! ## Output contract
//!
//! `soffice --convert-to pdf --outdir <dir> <input>` writes
//! `<dir>/<input stem>.pdf`. LibreOffice exits 0 on several failure modes
//! (unknown filter, password-protected input) without writing anything, so
//! the exit status alone is not trusted: the artifact must exist and be
//! non-empty.

use crate::error::Doc2ImgError;
use crate::job::StageKind;
use crate::pipeline::process::{run_tool, scrub_path, tail_snippet, ToolFailure, ToolInvocation};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Name of the per-job LibreOffice profile directory.
pub const PROFILE_DIR: &str = ".lo-profile";

/// Characters of stderr kept in error messages.
const STDERR_SNIPPET: usize = 600;

/// `file://` URL for a local directory, as `-env:UserInstallation` expects.
pub fn profile_url(dir: &Path) -> String {
    let s = dir.to_string_lossy().replace('\\', "/");
    if s.starts_with('/') {
        format!("file://{s}")
    } else {
        // Windows drive path: file:///C:/...
        format!("file:///{s}")
    }
}

/// Build the argument vector for one conversion.
pub fn office_invocation(
    soffice: &Path,
    input: &Path,
    out_dir: &Path,
    timeout: Duration,
) -> ToolInvocation {
    let mut user_installation = OsString::from("-env:UserInstallation=");
    user_installation.push(profile_url(&out_dir.join(PROFILE_DIR)));

    ToolInvocation::new(soffice, timeout)
        .arg("--headless")
        .arg("--invisible")
        .arg("--norestore")
        .arg("--nolockcheck")
        .arg("--nodefault")
        .arg("--nofirststartwizard")
        .arg(user_installation)
        .arg("--convert-to")
        .arg("pdf")
        .arg("--outdir")
        .arg(out_dir.as_os_str())
        .arg(input.as_os_str())
        .cwd(out_dir)
}

/// Convert `input` to a PDF inside `out_dir`, returning the PDF path.
///
/// `expected` is where LibreOffice will write (`<out_dir>/<stem>.pdf`).
pub async fn convert_to_pdf(
    soffice: &Path,
    input: &Path,
    expected: &Path,
    out_dir: &Path,
    timeout: Duration,
) -> Result<PathBuf, Doc2ImgError> {
    let inv = office_invocation(soffice, input, out_dir, timeout);
    let tool = inv.tool_name();

    let output = run_tool(&inv).await.map_err(|f| match f {
        ToolFailure::TimedOut { .. } => Doc2ImgError::ConversionTimeout {
            stage: StageKind::OfficeToPdf,
            tool: tool.clone(),
            timeout,
        },
        ToolFailure::Spawn(e) => Doc2ImgError::ToolUnavailable {
            stage: StageKind::OfficeToPdf,
            reason: format!("could not launch {tool}: {e}"),
        },
        ToolFailure::Wait(e) => Doc2ImgError::Internal(format!("waiting on {tool}: {e}")),
    })?;

    debug!("{tool} stdout: {}", output.stdout);

    if !output.success() {
        return Err(Doc2ImgError::ConversionFailed {
            stage: StageKind::OfficeToPdf,
            tool,
            exit_code: output.status.code(),
            detail: "converter exited abnormally".to_string(),
            stderr: tail_snippet(&scrub_path(&output.stderr, out_dir), STDERR_SNIPPET),
        });
    }

    let size = tokio::fs::metadata(expected)
        .await
        .map(|m| m.len())
        .unwrap_or(0);
    if size == 0 {
        return Err(Doc2ImgError::ConversionFailed {
            stage: StageKind::OfficeToPdf,
            tool,
            exit_code: output.status.code(),
            detail: "converter produced no PDF (unsupported, encrypted or damaged document?)"
                .to_string(),
            stderr: tail_snippet(&scrub_path(&output.stderr, out_dir), STDERR_SNIPPET),
        });
    }

    info!(
        "Office conversion produced {} bytes of PDF in {}ms",
        size,
        output.elapsed.as_millis()
    );
    Ok(expected.to_path_buf())
}
