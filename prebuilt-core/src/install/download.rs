use crate::{
    Result, error,
    http::{HttpClient, until_cancelled},
};
use percent_encoding::percent_decode_str;
use snafu::ResultExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// File name used when the URL path does not end in one.
const FALLBACK_FILE_NAME: &str = "download";

/// Stream the body of `url` into a file in `dest_dir` named after the last segment of the URL
/// path, so that the archive format can be detected from it.
///
/// Any non-2xx response is an error carrying the status and body.  If `cancel` fires mid-transfer
/// the partial file is left behind in `dest_dir` and [`error::Error::Cancelled`] is returned.
pub(crate) async fn download(
    client: &HttpClient,
    url: &str,
    dest_dir: &Path,
    cancel: &CancellationToken,
) -> Result<PathBuf> {
    let mut response = until_cancelled(cancel, client.get(url)).await?;

    let status = response.status();
    if !status.is_success() {
        let body = until_cancelled(cancel, async {
            response
                .text()
                .await
                .with_context(|_| error::HttpRequestSnafu { url })
        })
        .await?;

        return error::ProviderHttpSnafu {
            url,
            status: status.as_u16(),
            body,
        }
        .fail();
    }

    let path = dest_dir.join(file_name(url));
    let mut file = tokio::fs::File::create(&path)
        .await
        .with_context(|_| error::IoSnafu { path: &path })?;

    let mut written = 0u64;
    while let Some(chunk) = until_cancelled(cancel, async {
        response
            .chunk()
            .await
            .with_context(|_| error::HttpRequestSnafu { url })
    })
    .await?
    {
        file.write_all(&chunk)
            .await
            .with_context(|_| error::IoSnafu { path: &path })?;
        written += chunk.len() as u64;
    }

    file.flush()
        .await
        .with_context(|_| error::IoSnafu { path: &path })?;

    tracing::debug!(url, path = %path.display(), bytes = written, "Downloaded asset");
    Ok(path)
}

fn file_name(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|url| {
            let segment = url.path_segments()?.next_back()?;
            let decoded = percent_decode_str(segment).decode_utf8_lossy().into_owned();
            Path::new(&decoded)
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_string)
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}
