//! Organization list loading, with a one-time download when the local copy is absent.

use std::path::Path;
use std::time::Duration;

use coenroll_shared::{CoenrollError, OrganizationSet, Result};
use reqwest::Client;
use tracing::{info, instrument};

/// User-Agent string for the list download.
const USER_AGENT: &str = concat!("coenroll/", env!("CARGO_PKG_VERSION"));

/// Default timeout in seconds for the list download.
const DOWNLOAD_TIMEOUT_SECS: u64 = 30;

/// Read the organization list at `path`.
///
/// If the file does not exist it is first downloaded from `source_url` and
/// saved to `path`. Any failure along the way is fatal for validation, as is
/// a list with no organizations in it. An empty download is never saved, so
/// the next run downloads again.
#[instrument(skip_all, fields(path = %path.display()))]
pub async fn load_organizations(path: &Path, source_url: Option<&str>) -> Result<OrganizationSet> {
    let organizations = if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|e| CoenrollError::io(path, e))?;
        non_empty(OrganizationSet::from_lines(&content), &path.display().to_string())?
    } else {
        let url = source_url.ok_or_else(|| {
            CoenrollError::config(format!(
                "organization list {} not found and no download source configured",
                path.display()
            ))
        })?;
        download_organizations(url, path).await?
    };

    info!(count = organizations.len(), "loaded organization list");
    Ok(organizations)
}

fn non_empty(organizations: OrganizationSet, origin: &str) -> Result<OrganizationSet> {
    if organizations.is_empty() {
        return Err(CoenrollError::config(format!(
            "organization list {origin} is empty"
        )));
    }
    Ok(organizations)
}

/// Fetch the published list and persist it at `path`.
///
/// The body is parsed before anything touches the disk, then written to a
/// temp file next to `path` and renamed into place.
async fn download_organizations(url: &str, path: &Path) -> Result<OrganizationSet> {
    info!(%url, "downloading organization list");

    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .build()
        .map_err(|e| CoenrollError::Network(format!("failed to build HTTP client: {e}")))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| CoenrollError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(CoenrollError::Network(format!("{url}: HTTP {status}")));
    }

    let body = response
        .text()
        .await
        .map_err(|e| CoenrollError::Network(format!("{url}: failed to read body: {e}")))?;

    let organizations = non_empty(OrganizationSet::from_lines(&body), url)?;

    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        std::fs::create_dir_all(parent).map_err(|e| CoenrollError::io(parent, e))?;
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "organizations".to_string());
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, &body).map_err(|e| CoenrollError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| CoenrollError::io(path, e))?;

    info!(path = %path.display(), "saved organization list");
    Ok(organizations)
}
