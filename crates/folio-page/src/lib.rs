//! # Folio Page Controller
//!
//! Everything the portfolio page does after load, held in one
//! [`PageController`] that owns the state each behaviour mutates.

use std::sync::Arc;

use folio_core::{Quote, SiteConfig, SiteResult};
use folio_net::Fetch;
use folio_sw::{RegistrationOptions, ServiceWorkerContainer};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

pub mod avatar;
pub mod contact;
pub mod experience;
pub mod filter;
pub mod navigation;
pub mod quotes;
pub mod testimonials;
pub mod theme;

pub use avatar::{run_avatar_rotation, AvatarFrame, AvatarRotator};
pub use contact::{sanitize_input, ContactField, ContactForm, FieldKind, FormStatus, SubmitButton};
pub use filter::{PortfolioFilter, PortfolioItem};
pub use navigation::{NavLink, Navigation, Sidebar};
pub use quotes::{run_quote_rotation, QuoteBoard};
pub use testimonials::{run_testimonial_shuffle, ShuffleFrame, Testimonial, Testimonials};
pub use theme::{JsonFileStore, KeyValueStore, MemoryStore, Theme, ThemeController};

/// Content the page is marked up with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PageLayout {
    pub testimonials: Vec<Testimonial>,
    pub portfolio: Vec<PortfolioItem>,
    pub filter_buttons: Vec<String>,
    pub nav_links: Vec<NavLink>,
    pub pages: Vec<String>,
    /// Texts carrying a years-of-experience counter.
    pub experience_texts: Vec<String>,
}

/// Open the key-value store the config points at.
pub fn open_store(config: &SiteConfig) -> SiteResult<Arc<dyn KeyValueStore>> {
    Ok(match config.page.storage_path {
        Some(ref path) => Arc::new(JsonFileStore::open(path)?),
        None => Arc::new(MemoryStore::new()),
    })
}

/// Handles to the page's periodic drivers.
///
/// Dropping this stops every driver.
pub struct PageTimers {
    pub avatar: watch::Receiver<AvatarFrame>,
    pub testimonials: watch::Receiver<ShuffleFrame>,
    pub quote: watch::Receiver<Option<Quote>>,
    tasks: Vec<JoinHandle<()>>,
}

impl PageTimers {
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }
}

impl Drop for PageTimers {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

pub struct PageController {
    site: SiteConfig,
    pub theme: ThemeController,
    reduce_motion: bool,
    pub avatar: AvatarRotator,
    pub testimonials: Arc<Mutex<Testimonials>>,
    pub quotes: Arc<Mutex<QuoteBoard>>,
    pub filter: PortfolioFilter,
    pub contact: ContactForm,
    pub navigation: Navigation,
    pub sidebar: Sidebar,
    experience_texts: Vec<String>,
    fetcher: Arc<dyn Fetch>,
    timers: Option<PageTimers>,
}

impl PageController {
    pub fn new(
        site: SiteConfig,
        layout: PageLayout,
        store: Arc<dyn KeyValueStore>,
        fetcher: Arc<dyn Fetch>,
    ) -> SiteResult<Self> {
        site.validate()?;
        let page = &site.page;

        let default_theme = page.default_theme.parse().unwrap_or_default();
        let action = page.form_action.as_deref().map(Url::parse).transpose()?;

        Ok(Self {
            theme: ThemeController::load(store, default_theme),
            reduce_motion: false,
            avatar: AvatarRotator::new(page.avatar_images.clone()),
            testimonials: Arc::new(Mutex::new(Testimonials::new(layout.testimonials))),
            quotes: Arc::new(Mutex::new(QuoteBoard::new(
                Url::parse(&page.quote_api)?,
                page.fallback_quotes.clone(),
                Arc::clone(&fetcher),
            ))),
            filter: PortfolioFilter::new(layout.portfolio, layout.filter_buttons),
            contact: ContactForm::standard(action, page.form_status_duration()),
            navigation: Navigation::new(layout.nav_links, layout.pages),
            sidebar: Sidebar::default(),
            experience_texts: layout.experience_texts,
            fetcher,
            timers: None,
            site,
        })
    }

    pub fn config(&self) -> &SiteConfig {
        &self.site
    }

    /// Apply the user's reduced-motion preference.
    pub fn set_reduced_motion(&mut self, reduce: bool) {
        self.reduce_motion = reduce;
    }

    pub fn reduces_motion(&self) -> bool {
        self.reduce_motion
    }

    /// Experience counters brought up to the current year.
    pub fn experience_texts(&self) -> Vec<String> {
        let years = experience::years_of_experience(
            self.site.page.experience_start_year,
            experience::current_year(),
        );
        self.experience_texts
            .iter()
            .map(|text| experience::update_experience_text(text, years))
            .collect()
    }

    pub async fn submit_contact(&mut self) -> FormStatus {
        self.contact.submit(self.fetcher.as_ref()).await
    }

    /// Load-time work: first quote, experience counters, periodic drivers,
    /// worker registration.
    pub async fn on_load(&mut self, container: Arc<ServiceWorkerContainer>) -> JoinHandle<()> {
        self.experience_texts = self.experience_texts();
        let quote = self.quotes.lock().await.refresh().await.cloned();
        self.timers = Some(self.start_timers(quote));
        info!(theme = %self.theme.current(), "Page loaded");
        self.register_worker(container)
    }

    /// Drivers started by [`on_load`](Self::on_load), if it ran.
    pub fn timers(&self) -> Option<&PageTimers> {
        self.timers.as_ref()
    }

    /// Spawn the avatar, testimonial and quote drivers on the configured periods.
    pub fn start_timers(&self, quote: Option<Quote>) -> PageTimers {
        let page = &self.site.page;

        let first = self.avatar.current().unwrap_or_default().to_string();
        let (avatar_tx, avatar) = watch::channel(AvatarFrame::Show(first));
        let (shuffle_tx, testimonials) = watch::channel(ShuffleFrame::Shown(Vec::new()));
        let (quote_tx, quote) = watch::channel(quote);

        let tasks = vec![
            tokio::spawn(run_avatar_rotation(
                self.avatar.clone(),
                page.avatar_interval(),
                page.avatar_fade(),
                avatar_tx,
            )),
            tokio::spawn(run_testimonial_shuffle(
                Arc::clone(&self.testimonials),
                page.testimonial_interval(),
                page.testimonial_fade(),
                shuffle_tx,
            )),
            tokio::spawn(run_quote_rotation(
                Arc::clone(&self.quotes),
                page.quote_interval(),
                quote_tx,
            )),
        ];
        debug!(
            avatar_secs = page.avatar_interval().as_secs(),
            quote_secs = page.quote_interval().as_secs(),
            "Page timers started"
        );

        PageTimers {
            avatar,
            testimonials,
            quote,
            tasks,
        }
    }

    /// Register the offline cache worker in the background.
    ///
    /// Failures are only logged.
    pub fn register_worker(&self, container: Arc<ServiceWorkerContainer>) -> JoinHandle<()> {
        let script = self.site.script_url();
        let options = RegistrationOptions {
            scope: None,
            generation: self.site.worker.generation.clone(),
            precache: self.site.worker.precache.clone(),
        };

        tokio::spawn(async move {
            let script = match script {
                Ok(script) => script,
                Err(e) => {
                    debug!(error = %e, "Worker script URL invalid");
                    return;
                }
            };
            match container.register(script.as_str(), options).await {
                Ok(report) => debug!(
                    scope = %report.scope,
                    cached = report.install.cached.len(),
                    "Service worker registered"
                ),
                Err(e) => debug!(error = %e, "Service worker registration failed"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use folio_net::{LoaderConfig, NetError, Request, ResourceLoader, Response};
    use futures::future::BoxFuture;
    use http::{HeaderMap, StatusCode};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn layout() -> PageLayout {
        PageLayout {
            nav_links: vec![NavLink::new("About"), NavLink::new("Resume")],
            pages: vec!["about".to_string(), "resume".to_string()],
            experience_texts: vec!["8+ years of experience".to_string()],
            ..Default::default()
        }
    }

    fn controller(site: SiteConfig) -> PageController {
        let loader = ResourceLoader::new(LoaderConfig::default()).unwrap();
        PageController::new(site, layout(), Arc::new(MemoryStore::new()), Arc::new(loader)).unwrap()
    }

    #[test]
    fn test_new_applies_defaults() {
        let mut page = controller(SiteConfig::default());
        assert_eq!(page.theme.current(), Theme::Dark);
        assert_eq!(page.avatar.current(), Some("./assets/images/my-avatar.webp"));
        assert!(!page.reduces_motion());
        page.set_reduced_motion(true);
        assert!(page.reduces_motion());
        assert_eq!(page.navigation.active_pages(), vec!["about"]);
    }

    #[test]
    fn test_experience_texts() {
        let page = controller(SiteConfig::default());
        let years = experience::current_year() - 2015;
        assert_eq!(
            page.experience_texts(),
            vec![format!("{years}+ years of experience")]
        );
    }

    #[tokio::test]
    async fn test_on_load_registers_worker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let mut site = SiteConfig::default();
        site.origin = server.uri();
        site.worker.generation = "v7".to_string();
        site.worker.precache = vec!["/".to_string(), "/index.html".to_string()];
        site.page.quote_api = format!("{}/api/random", server.uri());

        let loader: Arc<dyn Fetch> = Arc::new(ResourceLoader::new(LoaderConfig::default()).unwrap());
        let (container, _events) = ServiceWorkerContainer::new(Arc::clone(&loader));
        let container = Arc::new(container);

        let mut page =
            PageController::new(site, layout(), Arc::new(MemoryStore::new()), loader).unwrap();
        page.on_load(Arc::clone(&container)).await.await.unwrap();

        // "ok" is not a quote payload, so a fallback is shown.
        assert!(page.quotes.lock().await.current().is_some());
        assert!(page.timers().unwrap().is_running());
        assert_eq!(container.caches.keys().await, vec!["v7".to_string()]);
        assert_eq!(container.caches.entry_keys("v7").await.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_registration_is_silent() {
        let mut site = SiteConfig::default();
        site.origin = "http://127.0.0.1:9".to_string();
        site.worker.precache = vec!["/".to_string()];

        let page = controller(site);
        let loader = Arc::new(ResourceLoader::new(LoaderConfig::default()).unwrap());
        let (container, _events) = ServiceWorkerContainer::new(loader);

        page.register_worker(Arc::new(container)).await.unwrap();
    }

    /// Quote API stand-in counting requests.
    #[derive(Default)]
    struct CountingQuotes {
        calls: AtomicUsize,
    }

    impl Fetch for CountingQuotes {
        fn fetch(&self, request: Request) -> BoxFuture<'_, Result<Response, NetError>> {
            if request.url.path() != "/api/random" {
                return Box::pin(async { Err(NetError::RequestFailed("offline".to_string())) });
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Box::pin(async move {
                let body = serde_json::json!([{ "q": format!("quote {n}"), "a": "Anon" }]);
                Ok(Response::new(request.url, StatusCode::OK, HeaderMap::new(), body.to_string()))
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_quote_refreshes_every_interval() {
        let fetcher = Arc::new(CountingQuotes::default());
        let mut site = SiteConfig::default();
        site.origin = "http://127.0.0.1:9".to_string();
        site.page.quote_api = "http://127.0.0.1:9/api/random".to_string();
        let mut page = PageController::new(
            site,
            layout(),
            Arc::new(MemoryStore::new()),
            Arc::clone(&fetcher) as Arc<dyn Fetch>,
        )
        .unwrap();

        let (container, _events) = ServiceWorkerContainer::new(Arc::clone(&fetcher) as Arc<dyn Fetch>);
        page.on_load(Arc::new(container)).await.await.unwrap();
        let mut quote = page.timers().unwrap().quote.clone();
        assert_eq!(quote.borrow_and_update().as_ref().unwrap().text, "quote 1");
        let after_load = fetcher.calls.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(119)).await;
        assert!(!quote.has_changed().unwrap());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), after_load);

        tokio::time::sleep(Duration::from_secs(1)).await;
        quote.changed().await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), after_load + 1);
        assert_eq!(
            quote.borrow_and_update().as_ref().unwrap().text,
            format!("quote {}", after_load + 1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_timers_stops_drivers() {
        let page = controller(SiteConfig::default());
        let timers = page.start_timers(None);
        let mut quote = timers.quote.clone();
        drop(timers);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(quote.changed().await.is_err());
    }
}
