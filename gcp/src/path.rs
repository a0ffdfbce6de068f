static REMOTE_PATH_RE: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
    // host is a name, an IPv4 address or a bracketed IPv6 literal; it never contains '/'
    regex::Regex::new(r"^(?P<host>\[[^\]]+\]|[^:/\[\]]+):(?P<path>.+)$")
        .expect("remote path regex must compile")
});

#[derive(Debug, PartialEq, Eq)]
pub struct RemotePath {
    host: String,
    path: std::path::PathBuf,
}

impl RemotePath {
    pub fn new(host: impl Into<String>, path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Path on the server, passed through unchanged.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PathType {
    Local(std::path::PathBuf),
    Remote(RemotePath),
}

#[must_use]
pub fn parse_path(path: &str) -> PathType {
    match REMOTE_PATH_RE.captures(path) {
        Some(captures) => PathType::Remote(RemotePath::new(&captures["host"], &captures["path"])),
        None => PathType::Local(path.into()),
    }
}

/// Direction of a copy, derived from which argument names a remote host.
#[derive(Debug, PartialEq, Eq)]
pub enum Transfer {
    /// local -> remote
    Push {
        local: std::path::PathBuf,
        remote: RemotePath,
    },
    /// remote -> local
    Pull {
        remote: RemotePath,
        local: std::path::PathBuf,
    },
}

pub fn parse_transfer(src: &str, dst: &str) -> anyhow::Result<Transfer> {
    match (parse_path(src), parse_path(dst)) {
        (PathType::Remote(remote), PathType::Local(local)) => Ok(Transfer::Pull { remote, local }),
        (PathType::Local(local), PathType::Remote(remote)) => Ok(Transfer::Push { local, remote }),
        (PathType::Local(_), PathType::Local(_)) => Err(anyhow::anyhow!(
            "none of the arguments name a remote host, expected HOST:PATH as source or destination"
        )),
        (PathType::Remote(_), PathType::Remote(_)) => Err(anyhow::anyhow!(
            "both arguments name a remote host, copying between two servers is not supported"
        )),
    }
}
