use crate::error::FetchError;
use crate::index::{Document, Source};
use reqwest::{redirect, Client};
use std::future::Future;
use std::time::Duration;

/// Supplies the raw text of a document.
pub trait DocumentSource: Send + Sync + 'static {
    fn fetch(&self, document: &Document) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// Reads inline text, local files and http(s) URLs.
#[derive(Clone)]
pub struct DefaultSource {
    client: Client,
}

impl DefaultSource {
    pub fn new(request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("wordindex/", env!("CARGO_PKG_VERSION")))
            .redirect(redirect::Policy::limited(5))
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn fetch_url(&self, url: &str) -> Result<String, FetchError> {
        let http = |source: reqwest::Error| FetchError::Http { url: url.to_string(), source };
        let resp = self.client.get(url).send().await.map_err(http)?;
        if !resp.status().is_success() {
            return Err(FetchError::Status { url: url.to_string(), status: resp.status().as_u16() });
        }
        let bytes = resp.bytes().await.map_err(http)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl DocumentSource for DefaultSource {
    fn fetch(&self, document: &Document) -> impl Future<Output = Result<String, FetchError>> + Send {
        let source = document.source.clone();
        async move {
            match source {
                Source::Text(text) => Ok(text),
                Source::Path(path) => match tokio::fs::read(&path).await {
                    Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
                    Err(source) => Err(FetchError::Io { path, source }),
                },
                Source::Url(url) => self.fetch_url(&url).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_inline_and_file_sources() {
        let source = DefaultSource::new(Duration::from_secs(1)).unwrap();
        let inline = Document::text(1, "inline", "hello world");
        assert_eq!(source.fetch(&inline).await.unwrap(), "hello world");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, b"from \xfffile").unwrap();
        let file = Document::new(2, "file", Source::Path(path));
        assert_eq!(source.fetch(&file).await.unwrap(), "from \u{FFFD}file");
    }

    #[tokio::test]
    async fn missing_file_is_a_fetch_error() {
        let source = DefaultSource::new(Duration::from_secs(1)).unwrap();
        let doc = Document::new(1, "gone", Source::Path("/definitely/not/here.txt".into()));
        assert!(matches!(source.fetch(&doc).await, Err(FetchError::Io { .. })));
    }

    async fn serve(app: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn url_body_is_decoded_lossily() {
        use axum::routing::get;
        let app = axum::Router::new()
            .route("/doc", get(|| async { b"hello \xffworld".to_vec() }))
            .route("/moved", get(|| async { axum::response::Redirect::temporary("/doc") }));
        let base = serve(app).await;
        let source = DefaultSource::new(Duration::from_secs(5)).unwrap();

        let doc = Document::new(1, "web", Source::Url(format!("{base}/doc")));
        assert_eq!(source.fetch(&doc).await.unwrap(), "hello \u{FFFD}world");
        let moved = Document::new(2, "moved", Source::Url(format!("{base}/moved")));
        assert_eq!(source.fetch(&moved).await.unwrap(), "hello \u{FFFD}world");
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let base = serve(axum::Router::new()).await;
        let source = DefaultSource::new(Duration::from_secs(5)).unwrap();
        let doc = Document::new(1, "gone", Source::Url(format!("{base}/nothing")));
        match source.fetch(&doc).await {
            Err(FetchError::Status { status, url }) => {
                assert_eq!(status, 404);
                assert!(url.ends_with("/nothing"));
            }
            other => panic!("expected a status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let source = DefaultSource::new(Duration::from_secs(5)).unwrap();
        let doc = Document::new(1, "down", Source::Url(format!("http://{addr}/doc")));
        assert!(matches!(source.fetch(&doc).await, Err(FetchError::Http { .. })));
    }
}
