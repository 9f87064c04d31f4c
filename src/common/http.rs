use std::time::Duration;

use reqwest::{Client, Error, Url};

use crate::common::types::AnyResult;
use crate::configs::HttpConfig;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36";

pub struct HttpClient;

impl HttpClient {
    pub fn default_user_agent() -> String {
        DEFAULT_USER_AGENT.to_string()
    }

    pub fn new(config: &HttpConfig) -> Result<Client, Error> {
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(Self::default_user_agent);

        Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
    }
}

/// Points `url` at a forwarding relay. The upstream host travels in the
/// `__host` query parameter and the request headers in `__headers`, as a
/// JSON list of name/value pairs the relay replays upstream.
pub fn relay_url(url: &str, relay_host: &str, headers: &[(String, String)]) -> AnyResult<Url> {
    let mut url = Url::parse(url)?;
    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => return Err(format!("{url} has no host to relay").into()),
    };

    url.query_pairs_mut()
        .append_pair("__host", &host)
        .append_pair("__headers", &serde_json::to_string(headers)?);

    url.set_scheme("https")
        .map_err(|_| format!("cannot relay {url} over https"))?;
    url.set_port(None)
        .map_err(|_| format!("cannot clear port of {url}"))?;
    url.set_host(Some(relay_host))?;

    Ok(url)
}
