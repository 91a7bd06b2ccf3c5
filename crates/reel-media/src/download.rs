//! Video download using yt-dlp.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{last_stderr_line, MediaError, MediaResult};

/// File stem of downloaded sources inside their work directory.
const SOURCE_STEM: &str = "source";

/// Download a video into `output_dir` and return the final file path.
///
/// Streams are merged into an mp4 container.
pub async fn download_video(url: &str, output_dir: &Path) -> MediaResult<PathBuf> {
    which::which("yt-dlp").map_err(|_| MediaError::YtDlpNotFound)?;
    tokio::fs::create_dir_all(output_dir).await?;

    let template = output_dir.join(format!("{}.%(ext)s", SOURCE_STEM));
    let args = ytdlp_args(url, &template);
    info!(url = %url, dir = %output_dir.display(), "Downloading video");
    debug!("Running yt-dlp {}", args.join(" "));

    let output = Command::new("yt-dlp")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        debug!("yt-dlp stderr: {}", String::from_utf8_lossy(&output.stderr));
        return Err(MediaError::download_failed(format!(
            "yt-dlp failed: {}",
            last_stderr_line(&output.stderr)
        )));
    }

    let path = printed_path(&output.stdout)
        .unwrap_or_else(|| output_dir.join(format!("{}.mp4", SOURCE_STEM)));

    let size = match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.len() > 0 => meta.len(),
        Ok(_) => return Err(MediaError::download_failed("downloaded file is empty")),
        Err(_) => return Err(MediaError::FileNotFound(path)),
    };

    info!(
        output = %path.display(),
        size_mb = size as f64 / (1024.0 * 1024.0),
        "Downloaded video successfully"
    );
    Ok(path)
}

fn ytdlp_args(url: &str, template: &Path) -> Vec<String> {
    [
        "--no-playlist",
        "--no-progress",
        "-f",
        "bv*[ext=mp4]+ba[ext=m4a]/bv*+ba/b",
        "--merge-output-format",
        "mp4",
        "--print",
        "after_move:filepath",
        "-o",
    ]
    .into_iter()
    .map(String::from)
    .chain([template.to_string_lossy().to_string(), url.to_string()])
    .collect()
}

/// The last line yt-dlp printed for `--print after_move:filepath`.
fn printed_path(stdout: &[u8]) -> Option<PathBuf> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ytdlp_args_end_with_template_and_url() {
        let args = ytdlp_args("https://youtu.be/dQw4w9WgXcQ", Path::new("/work/yt_x/source.%(ext)s"));
        let n = args.len();
        assert_eq!(args[n - 3], "-o");
        assert_eq!(args[n - 2], "/work/yt_x/source.%(ext)s");
        assert_eq!(args[n - 1], "https://youtu.be/dQw4w9WgXcQ");
        assert!(args.contains(&"--merge-output-format".to_string()));
    }

    #[test]
    fn test_printed_path_takes_last_line() {
        let stdout = b"[info] something\n/work/yt_x/source.mp4\n\n";
        assert_eq!(printed_path(stdout), Some(PathBuf::from("/work/yt_x/source.mp4")));
        assert_eq!(printed_path(b""), None);
    }
}
