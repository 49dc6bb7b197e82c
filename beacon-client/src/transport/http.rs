use std::fs;

use beacon_common::Dsn;
use beacon_config::TransportConfig;
use reqwest::blocking::Client;

use crate::transport::{
    ExternalError, TransportError, Upstream, UpstreamRequest, UpstreamResponse,
};

/// An [`Upstream`] performing blocking HTTP requests.
///
/// The underlying client keeps a connection pool, so a single instance should be shared by all
/// worker threads.
#[derive(Debug)]
pub struct HttpUpstream {
    client: Client,
}

impl HttpUpstream {
    /// Creates an HTTP client with the timeouts, proxy and TLS settings of `config`.
    pub fn new(dsn: &Dsn, config: &TransportConfig) -> Result<Self, TransportError> {
        let mut builder = Client::builder()
            .connect_timeout(config.open_timeout())
            .timeout(config.timeout())
            .danger_accept_invalid_certs(!config.ssl_verification);

        if let Some(ref path) = config.ssl_ca_file {
            let pem = fs::read(path).map_err(TransportError::other)?;
            let certificate =
                reqwest::Certificate::from_pem(&pem).map_err(TransportError::other)?;
            builder = builder.add_root_certificate(certificate);
        }

        if let Some(proxy_url) = config.proxy_url() {
            let mut proxy =
                reqwest::Proxy::all(proxy_url.as_str()).map_err(TransportError::other)?;
            if !proxy_url.username().is_empty() {
                let password = proxy_url.password().unwrap_or_default();
                proxy = proxy.basic_auth(proxy_url.username(), password);
            }
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(TransportError::other)?;
        beacon_log::info!("http transport will connect to {}", dsn.host());

        Ok(Self { client })
    }
}

impl Upstream for HttpUpstream {
    fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.body(request.body).send().map_err(classify_error)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                let value = value.to_str().ok()?;
                Some((name.as_str().to_owned(), value.to_owned()))
            })
            .collect();
        let body = response.text().map_err(classify_error)?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Classifies connectivity failures as external errors.
///
/// All other errors are not classified and propagate as [`TransportError::Other`].
fn classify_error(error: reqwest::Error) -> TransportError {
    if error.is_connect() || error.is_timeout() || error.is_request() || error.is_body() {
        ExternalError::Network(Box::new(error)).into()
    } else {
        TransportError::other(error)
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use beacon_common::DataCategory;
    use beacon_config::Options;
    use beacon_protocol::{ErrorEvent, Event};
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::transport::Transport;

    /// Sends an error event to the mock server.
    ///
    /// The blocking client must be created, used and dropped outside of the async runtime.
    async fn send_to(server: &MockServer) -> (Result<(), TransportError>, Transport) {
        let dsn: Dsn = format!("http://public:secret@{}/42", server.address())
            .parse()
            .unwrap();

        tokio::task::spawn_blocking(move || {
            let transport = Transport::http(dsn, &Options::default()).unwrap();
            let event: Event = ErrorEvent::from_message("hello").into();
            (transport.send_event(&event), transport)
        })
        .await
        .unwrap()
    }

    /// Drops a transport on a blocking thread.
    async fn drop_transport(transport: Transport) {
        tokio::task::spawn_blocking(move || drop(transport))
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_post_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/42/envelope/"))
            .and(header("content-type", "application/x-sentry-envelope"))
            .and(header_exists("x-sentry-auth"))
            .and(header_exists("user-agent"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let (result, transport) = send_to(&server).await;
        drop_transport(transport).await;
        assert!(result.is_ok());

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body).into_owned();
        assert!(body.contains(r#"{"type":"event","content_type":"application/json"}"#));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_server_error_with_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(500)
                    .insert_header("x-sentry-error", "something went wrong")
                    .set_body_string("internal error"),
            )
            .mount(&server)
            .await;

        let (result, transport) = send_to(&server).await;
        drop_transport(transport).await;

        let error = result.unwrap_err();
        let message = error.to_string();
        assert!(message.contains("500"));
        assert!(message.contains("something went wrong"));

        match error {
            TransportError::External(ExternalError::Response { status, body, .. }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "internal error");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_too_many_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "60"))
            .mount(&server)
            .await;

        let (result, transport) = send_to(&server).await;
        assert!(result.is_ok());
        assert!(transport.rate_limiter().is_limited(DataCategory::Error));
        assert!(transport.rate_limiter().is_limited(DataCategory::Transaction));
        drop_transport(transport).await;
    }

    #[test]
    fn test_connection_refused_is_external() {
        // Bind and release a port so that nothing is listening on it.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let dsn: Dsn = format!("http://public@127.0.0.1:{port}/42").parse().unwrap();
        let transport = Transport::http(dsn, &Options::default()).unwrap();

        let event: Event = ErrorEvent::from_message("hello").into();
        let error = transport.send_event(&event).unwrap_err();

        assert!(matches!(
            error,
            TransportError::External(ExternalError::Network(_))
        ));
    }

    #[test]
    fn test_invalid_ca_file() {
        let dsn: Dsn = "http://public@127.0.0.1/42".parse().unwrap();
        let mut options = Options::default();
        options.transport.ssl_ca_file = Some("/nonexistent/beacon/ca.pem".into());

        let error = Transport::http(dsn, &options).unwrap_err();
        assert!(!error.is_external());
    }
}
