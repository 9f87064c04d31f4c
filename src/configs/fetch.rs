use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::sabr::{RequestKind, StreamingContext};

fn default_method() -> String {
    "GET".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// One UMP request issued by the fetch tool.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FetchConfig {
    pub url: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
    /// File holding the request body, e.g. a serialized SABR request.
    pub body_path: Option<PathBuf>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Streaming context seeding this request.
    #[serde(default)]
    pub context: StreamingContext,
    #[serde(default)]
    pub request_kind: RequestKind,
    /// Where the extracted segment goes. Stdout when unset.
    pub output: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            url: None,
            method: default_method(),
            body_path: None,
            headers: BTreeMap::new(),
            context: StreamingContext::default(),
            request_kind: RequestKind::default(),
            output: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RelayConfig {
    pub host: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    pub user_agent: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}
