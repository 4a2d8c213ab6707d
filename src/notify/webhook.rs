use hyper::header::{self, HeaderValue};
use hyper::{Method, Uri};
use hyper_util::rt::TokioIo;

use super::{Error, Notification, Notifier, Result};

/// Posts notifications as JSON to a plain `http://` endpoint.
///
/// Every notification opens a fresh connection; violations are rare enough
/// that pooling is not worth the extra state.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    addr: String,
    host: HeaderValue,
    path: Uri,
}

impl WebhookNotifier {
    /// Creates a notifier for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `url` is not an absolute `http://` URL.
    pub fn new(url: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidUrl {
            url: url.to_owned(),
            reason: reason.to_owned(),
        };

        let uri = url
            .parse::<Uri>()
            .map_err(|err| invalid(&err.to_string()))?;
        if uri.scheme_str() != Some("http") {
            return Err(invalid("only http:// is supported"));
        }
        let authority = uri.authority().ok_or_else(|| invalid("missing host"))?;
        let addr = format!("{}:{}", authority.host(), authority.port_u16().unwrap_or(80));
        let host = HeaderValue::from_str(authority.as_str())
            .map_err(|err| invalid(&err.to_string()))?;
        let path = uri
            .path_and_query()
            .map(|p| p.as_str())
            .filter(|p| !p.is_empty())
            .unwrap_or("/")
            .parse::<Uri>()
            .map_err(|err| invalid(&err.to_string()))?;

        Ok(Self { addr, host, path })
    }
}

impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let body = serde_json::to_string(notification).map_err(Error::Serialize)?;
        let stream = tokio::net::TcpStream::connect(&self.addr)
            .await
            .map_err(|source| Error::Connect {
                addr: self.addr.clone(),
                source,
            })?;
        let mut sender = crate::transport::http1_handshake(TokioIo::new(stream), self.addr.clone())
            .await
            .map_err(|source| Error::Handshake {
                addr: self.addr.clone(),
                source,
            })?;

        let mut request = hyper::Request::new(body);
        *request.method_mut() = Method::POST;
        *request.uri_mut() = self.path.clone();
        let headers = request.headers_mut();
        headers.insert(header::HOST, self.host.clone());
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        let response = sender.send_request(request).await.map_err(Error::Request)?;
        if !response.status().is_success() {
            return Err(Error::Status {
                status: response.status(),
            });
        }
        log::debug!(
            "Delivered notification for container `{}` to {}",
            notification.container_id,
            self.addr
        );

        Ok(())
    }
}
