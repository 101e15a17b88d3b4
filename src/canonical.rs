//! URL canonicalization, scope filtering and save-path mapping
//!
//! Every URL the crawler sees goes through [`canonicalize`] before it is
//! claimed or queued, so the canonical string is both the dedup key and the
//! unit of work. The rules:
//!
//! - only absolute `http`/`https` URLs with a host are accepted
//! - any explicit port is dropped
//! - query string and fragment are dropped
//! - repeated path separators collapse to one
//! - non-root paths lose their trailing slash
//!
//! Canonicalization is idempotent.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    sync::LazyLock,
};

use regex::Regex;
use url::Url;

use crate::error::MirrorError;

static IMAGE_EXTENSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(gif|jpe?g|tiff?|png|webp|bmp|ico)$").expect("image pattern is valid")
});

static FILE_EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.[A-Za-z0-9]{1,4}$").expect("extension pattern is valid"));

/// A normalized absolute URL, the crawl's dedup key and unit of work
///
/// Only [`canonicalize`] constructs values of this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalUrl(Url);

impl CanonicalUrl {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// Path component, always starting with `/`
    pub fn path(&self) -> &str {
        self.0.path()
    }

    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    pub fn host(&self) -> Option<&str> {
        self.0.host_str()
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for CanonicalUrl {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl FromStr for CanonicalUrl {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        canonicalize(s)
    }
}

/// Normalize `raw` into its canonical form
///
/// Fails with [`MirrorError::MalformedUrl`] when `raw` is not an absolute
/// `http`/`https` URL with a host (for example a relative href that was not
/// resolved against its page first).
pub fn canonicalize(raw: &str) -> Result<CanonicalUrl, MirrorError> {
    let raw = raw.trim();
    let mut url = Url::parse(raw).map_err(|e| MirrorError::malformed(raw, e))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(MirrorError::malformed(
            raw,
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(MirrorError::malformed(raw, "missing host"));
    }

    url.set_port(None)
        .map_err(|()| MirrorError::malformed(raw, "cannot strip port"))?;
    url.set_query(None);
    url.set_fragment(None);

    let path = clean_path(url.path());
    url.set_path(&path);

    Ok(CanonicalUrl(url))
}

fn clean_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Resolve a possibly-relative `reference` against `base`
///
/// The result is absolute but not yet canonical.
pub fn resolve(base: &Url, reference: &str) -> Result<String, MirrorError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(MirrorError::malformed(reference, "empty reference"));
    }

    base.join(reference)
        .map(String::from)
        .map_err(|e| MirrorError::malformed(reference, e))
}

/// Whether `s` already is an absolute URL with a scheme
pub fn is_absolute(s: &str) -> bool {
    Url::parse(s.trim()).is_ok()
}

/// Which discovered references the crawl follows
///
/// The same policy applies to every tag type (`a`, `img`, `link`, `script`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopePolicy {
    /// Follow only references with the seed's scheme and host
    #[default]
    SameHost,
    /// Follow every reference, including other sites
    Unrestricted,
}

impl ScopePolicy {
    pub fn allows(self, seed: &CanonicalUrl, candidate: &CanonicalUrl) -> bool {
        match self {
            ScopePolicy::SameHost => {
                seed.scheme() == candidate.scheme() && seed.host() == candidate.host()
            }
            ScopePolicy::Unrestricted => true,
        }
    }
}

/// How a resource is fetched and whether it is scanned for references
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Binary image content, saved but never parsed
    Image,
    /// Everything else, parsed for references when it is HTML
    Document,
}

impl ResourceKind {
    pub fn classify(url: &CanonicalUrl) -> Self {
        if IMAGE_EXTENSION.is_match(url.path()) {
            ResourceKind::Image
        } else {
            ResourceKind::Document
        }
    }
}

/// Map a URL path to the file it is saved under inside `base_dir`
///
/// A final segment with a 1-4 character alphanumeric extension is treated as
/// a file; anything else is treated as a directory and gets `index.html`.
/// Pure: never touches the filesystem. Distinct URL paths may map to the same
/// file (`/a` and `/a/index.html`); the later write wins.
pub fn to_save_path(base_dir: &Path, url_path: &str) -> PathBuf {
    let segments: Vec<&str> = url_path
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect();

    let mut path = base_dir.to_path_buf();
    path.extend(&segments);

    let names_file = !url_path.ends_with('/')
        && segments
            .last()
            .is_some_and(|last| FILE_EXTENSION.is_match(last));
    if !names_file {
        path.push("index.html");
    }

    path
}
