//! Sidebar quote, from the quote API with a local fallback.

use std::sync::Arc;
use std::time::Duration;

use folio_core::Quote;
use folio_net::{Fetch, Request};
use rand::seq::SliceRandom;
use serde::Deserialize;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace};
use url::Url;

/// Entry of the `[{"q": .., "a": ..}]` payload.
#[derive(Debug, Deserialize)]
struct ApiQuote {
    q: String,
    a: String,
}

/// Quote text and author line as shown on the page.
pub fn render(quote: &Quote) -> (String, String) {
    (format!("\"{}\"", quote.text), format!("— {}", quote.author))
}

/// Quote source plus the quote on display.
pub struct QuoteBoard {
    api: Url,
    fallback: Vec<Quote>,
    fetcher: Arc<dyn Fetch>,
    current: Option<Quote>,
}

impl QuoteBoard {
    pub fn new(api: Url, fallback: Vec<Quote>, fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            api,
            fallback,
            fetcher,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&Quote> {
        self.current.as_ref()
    }

    /// Fetch a fresh quote.
    ///
    /// A failed request or unreadable payload shows a random fallback quote.
    /// An empty payload leaves the current quote in place.
    pub async fn refresh(&mut self) -> Option<&Quote> {
        match self.fetch_quote().await {
            Ok(Some(quote)) => self.current = Some(quote),
            Ok(None) => debug!("Quote API returned no quotes"),
            Err(e) => {
                debug!(error = %e, "Quote API failed, using fallback");
                if let Some(quote) = self.fallback.choose(&mut rand::thread_rng()) {
                    self.current = Some(quote.clone());
                }
            }
        }
        self.current.as_ref()
    }

    async fn fetch_quote(&self) -> Result<Option<Quote>, folio_net::NetError> {
        let response = self.fetcher.fetch(Request::get(self.api.clone())).await?;
        let quotes: Vec<ApiQuote> = response.json()?;
        Ok(quotes.into_iter().next().map(|q| Quote::new(q.q, q.a)))
    }
}

/// Refresh `board` every `period` until every receiver is gone.
///
/// The first refresh happens on load, so the driver waits a full period.
pub async fn run_quote_rotation(
    board: Arc<Mutex<QuoteBoard>>,
    period: Duration,
    frames: watch::Sender<Option<Quote>>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let quote = board.lock().await.refresh().await.cloned();
        trace!(author = ?quote.as_ref().map(|q| &q.author), "Quote refreshed");
        if frames.send(quote).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_net::{LoaderConfig, ResourceLoader};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn board(api: &str, fallback: Vec<Quote>) -> QuoteBoard {
        let loader = ResourceLoader::new(LoaderConfig::default()).unwrap();
        QuoteBoard::new(Url::parse(api).unwrap(), fallback, Arc::new(loader))
    }

    #[test]
    fn test_render() {
        let quote = Quote::new("Talk is cheap.", "Linus Torvalds");
        assert_eq!(
            render(&quote),
            ("\"Talk is cheap.\"".to_string(), "— Linus Torvalds".to_string())
        );
    }

    #[tokio::test]
    async fn test_refresh_from_api() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/random"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{ "q": "Stay hungry.", "a": "Steve Jobs" }])),
            )
            .mount(&server)
            .await;

        let mut board = board(&format!("{}/api/random", server.uri()), Vec::new());
        let quote = board.refresh().await.unwrap();
        assert_eq!(quote, &Quote::new("Stay hungry.", "Steve Jobs"));
    }

    #[tokio::test]
    async fn test_unreachable_api_uses_fallback() {
        let fallback = vec![Quote::new("Make it work.", "Kent Beck")];
        let mut board = board("http://127.0.0.1:9/api/random", fallback.clone());

        assert_eq!(board.refresh().await, Some(&fallback[0]));
    }

    #[tokio::test]
    async fn test_empty_payload_keeps_current() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let mut board = board(&server.uri(), Vec::new());
        assert!(board.refresh().await.is_none());
    }

    #[tokio::test]
    async fn test_rotation_stops_without_receivers() {
        let fallback = vec![Quote::new("Make it work.", "Kent Beck")];
        let board = Arc::new(Mutex::new(board("http://127.0.0.1:9/api/random", fallback.clone())));
        let (tx, mut rx) = watch::channel(None);
        let task = tokio::spawn(run_quote_rotation(board, Duration::from_millis(20), tx));

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_ref(), Some(&fallback[0]));

        drop(rx);
        task.await.unwrap();
    }
}
