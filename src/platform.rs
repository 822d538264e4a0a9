// src/platform.rs
//! Job URL normalization and best-effort platform / job-id derivation.

use crate::error::ValidationError;
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

pub const UNKNOWN_PLATFORM: &str = "unknown";
pub const UNKNOWN_JOB_ID: &str = "TBD";

/// Query parameters that only carry tracking state and never identify a job.
const TRACKING_PARAMS: &[&str] = &["trk", "trackingId", "refId", "ref", "lipi", "eBP", "src"];

struct PlatformPattern {
    name: &'static str,
    host_suffix: &'static str,
    job_id: &'static str,
}

const PLATFORMS: &[PlatformPattern] = &[
    PlatformPattern {
        name: "linkedin",
        host_suffix: "linkedin.com",
        job_id: r"(?:/view/|[?&](?:currentJobId|jobId)=)(\d+)",
    },
    PlatformPattern {
        name: "indeed",
        host_suffix: "indeed.com",
        job_id: r"[?&](?:jk|vjk)=([0-9a-fA-F]+)",
    },
    PlatformPattern {
        name: "greenhouse",
        host_suffix: "greenhouse.io",
        job_id: r"/jobs/(\d+)",
    },
];

fn compiled() -> &'static [(usize, Regex)] {
    static COMPILED: OnceLock<Vec<(usize, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        PLATFORMS
            .iter()
            .enumerate()
            .filter_map(|(i, p)| Regex::new(p.job_id).ok().map(|re| (i, re)))
            .collect()
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLocation {
    pub normalized_url: String,
    pub platform: String,
    pub platform_job_id: String,
}

fn parse_lenient(raw: &str) -> Result<Url, url::ParseError> {
    match Url::parse(raw) {
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(&format!("https://{raw}")),
        parsed => parsed,
    }
}

/// Normalize the URL used as the job upsert key: lowercase scheme and host,
/// drop `www.`, the fragment, tracking/`utm_*` parameters and a trailing slash.
/// A URL without a scheme is read as `https`.
pub fn normalize_job_url(raw: &str) -> Result<String, ValidationError> {
    let mut url =
        parse_lenient(raw.trim()).map_err(|e| ValidationError::InvalidUrl(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::InvalidUrl(format!(
            "{raw}: unsupported scheme {}",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .ok_or_else(|| ValidationError::InvalidUrl(format!("{raw}: missing host")))?
        .to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    url.set_host(Some(&host))
        .map_err(|e| ValidationError::InvalidUrl(format!("{raw}: {e}")))?;
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !k.starts_with("utm_") && !TRACKING_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let mut normalized = url.to_string();
    if normalized.ends_with('/') && url.query().is_none() {
        normalized.pop();
    }
    Ok(normalized)
}

fn unlocated(normalized_url: String) -> JobLocation {
    JobLocation {
        normalized_url,
        platform: UNKNOWN_PLATFORM.to_string(),
        platform_job_id: UNKNOWN_JOB_ID.to_string(),
    }
}

/// Derive the platform and platform job id. Derivation never fails the request:
/// unrecognized hosts map to `unknown`, unextractable ids to `TBD`, and a URL
/// that cannot be normalized is keyed by its trimmed text.
pub fn locate_job(raw: &str) -> JobLocation {
    let normalized_url = match normalize_job_url(raw) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!("Keeping job URL as submitted: {}", e);
            return unlocated(raw.trim().to_string());
        }
    };
    let host = Url::parse(&normalized_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();

    let matched = compiled().iter().find(|(i, _)| {
        let suffix = PLATFORMS[*i].host_suffix;
        host == suffix || host.ends_with(&format!(".{suffix}"))
    });

    let Some((index, pattern)) = matched else {
        return unlocated(normalized_url);
    };

    let platform_job_id = match pattern.captures(&normalized_url).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().to_string(),
        None => {
            tracing::warn!("Could not extract job id from {} URL: {}", PLATFORMS[*index].name, raw);
            UNKNOWN_JOB_ID.to_string()
        }
    };

    JobLocation {
        normalized_url,
        platform: PLATFORMS[*index].name.to_string(),
        platform_job_id,
    }
}
