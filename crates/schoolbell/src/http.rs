use std::sync::OnceLock;

use reqwest::Response;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{BellError, Result};

const USER_AGENT: &str = concat!("schoolbell/", env!("CARGO_PKG_VERSION"));

/// Select aws-lc-rs as the process-wide rustls backend, once.
pub fn install_rustls_provider() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let provider = rustls::crypto::aws_lc_rs::default_provider();
        if provider.install_default().is_err() {
            debug!("Keeping the rustls crypto provider installed by the host process");
        }
    });
}

/// Build the shared HTTP client used for every REST call.
pub fn build_client(config: &ClientConfig) -> Result<reqwest::Client> {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
    if !config.request_timeout.is_zero() {
        builder = builder.timeout(config.request_timeout);
    }
    Ok(builder.build()?)
}

/// Map non-2xx responses to [`BellError::Status`].
pub(crate) fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(BellError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        })
    }
}
