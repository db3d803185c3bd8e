//! reqwest-backed validator client

use reqwest::Url;
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::redirect::Policy;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::USER_AGENT;
use crate::http::client::{Method, RequestLimits, ValidatorClient, ValidatorResponse};
use crate::http::error::FetchError;

/// Validator client talking HTTP through reqwest
///
/// Redirects are followed by hand so that every hop is visible: the
/// automatic policy of reqwest would hide the chain. The timeout bounds the
/// whole call, every hop and the body included.
pub struct HttpValidatorClient {
    client: reqwest::Client,
    allow_cross_origin_redirect: bool,
}

impl HttpValidatorClient {
    pub fn new(allow_cross_origin_redirect: bool) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(Policy::none())
            .build()?;

        Ok(Self {
            client,
            allow_cross_origin_redirect,
        })
    }

    fn to_reqwest_method(method: Method) -> reqwest::Method {
        match method {
            Method::Head => reqwest::Method::HEAD,
            Method::Get => reqwest::Method::GET,
        }
    }

    /// Resolve the redirect target of a response, if it is a redirect
    fn redirect_target(current: &Url, response: &reqwest::Response) -> Option<Result<Url, FetchError>> {
        if !response.status().is_redirection() {
            return None;
        }
        let location = response.headers().get(LOCATION)?.to_str().ok()?;
        Some(
            current
                .join(location)
                .map_err(|_| FetchError::InvalidUrl(location.to_string())),
        )
    }

    /// Read the body chunk by chunk, giving up as soon as it outgrows `limit`
    async fn read_body(
        mut response: reqwest::Response,
        limit: Option<usize>,
    ) -> Result<Vec<u8>, FetchError> {
        let Some(limit) = limit else {
            return Ok(response.bytes().await?.to_vec());
        };

        if let Some(declared) = response.content_length() {
            if declared > limit as u64 {
                return Err(FetchError::BodyTooLarge {
                    length: usize::try_from(declared).unwrap_or(usize::MAX),
                    limit,
                });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            if body.len() > limit {
                return Err(FetchError::BodyTooLarge {
                    length: body.len(),
                    limit,
                });
            }
        }
        Ok(body)
    }

    async fn follow(
        &self,
        method: Method,
        url: &str,
        headers: &HeaderMap,
        limits: &RequestLimits,
    ) -> Result<ValidatorResponse, FetchError> {
        let mut current = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        let origin_host = current.host_str().map(str::to_string);
        let mut redirects: Vec<String> = Vec::new();

        loop {
            debug!("{} {}", method.as_str(), current);

            let response = self
                .client
                .request(Self::to_reqwest_method(method), current.clone())
                .headers(headers.clone())
                .send()
                .await?;

            if let Some(target) = Self::redirect_target(&current, &response) {
                let target = target?;

                if redirects.len() >= limits.max_redirects {
                    warn!("Redirect limit of {} reached at {}", limits.max_redirects, current);
                    return Err(FetchError::TooManyRedirects {
                        url: url.to_string(),
                        max: limits.max_redirects,
                    });
                }

                // The first hop fixes the identity of the resource; later hops may move freely
                if redirects.is_empty()
                    && !self.allow_cross_origin_redirect
                    && target.host_str() != origin_host.as_deref()
                {
                    return Err(FetchError::CrossOriginRedirect {
                        from: current.to_string(),
                        to: target.to_string(),
                    });
                }

                debug!("Redirect {} -> {}", current, target);
                redirects.push(current.to_string());
                current = target;
                continue;
            }

            let status = response.status().as_u16();
            let response_headers = response.headers().clone();
            let body = match method {
                Method::Head => Vec::new(),
                Method::Get => Self::read_body(response, limits.max_body_size).await?,
            };

            return Ok(ValidatorResponse {
                status,
                headers: response_headers,
                body,
                final_url: current.to_string(),
                redirects,
            });
        }
    }
}

#[async_trait::async_trait]
impl ValidatorClient for HttpValidatorClient {
    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &HeaderMap,
        limits: &RequestLimits,
    ) -> Result<ValidatorResponse, FetchError> {
        timeout(limits.timeout, self.follow(method, url, headers, limits))
            .await
            .map_err(|_| {
                warn!("{} {} timed out after {:?}", method.as_str(), url, limits.timeout);
                FetchError::Unreachable(format!("{} timed out after {:?}", url, limits.timeout))
            })?
    }
}
