//! Testimonials: periodic reshuffle and the detail modal.

use std::sync::Arc;
use std::time::Duration;

use folio_core::{SiteError, SiteResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::debug;

/// One testimonial card, as marked up on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Testimonial {
    pub avatar_src: String,
    pub avatar_alt: String,
    pub title: String,
    pub text: String,
    /// Machine-readable date (`datetime` attribute).
    #[serde(default)]
    pub date: Option<String>,
    /// Human-readable date.
    #[serde(default)]
    pub date_text: Option<String>,
}

/// Contents and visibility of the testimonial modal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestimonialModal {
    pub open: bool,
    pub img_src: String,
    pub img_alt: String,
    pub title: String,
    pub text: String,
    pub date: Option<String>,
    pub date_text: Option<String>,
}

impl TestimonialModal {
    /// Overlay follows the modal.
    pub fn overlay_active(&self) -> bool {
        self.open
    }
}

/// Testimonial list in display order.
#[derive(Debug, Clone, Default)]
pub struct Testimonials {
    items: Vec<Testimonial>,
    modal: TestimonialModal,
}

impl Testimonials {
    pub fn new(items: Vec<Testimonial>) -> Self {
        Self {
            items,
            modal: TestimonialModal::default(),
        }
    }

    pub fn items(&self) -> &[Testimonial] {
        &self.items
    }

    pub fn modal(&self) -> &TestimonialModal {
        &self.modal
    }

    /// Fisher-Yates shuffle of the display order. Lists of one or none are left alone.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if self.items.len() <= 1 {
            return false;
        }
        for i in (1..self.items.len()).rev() {
            let j = rng.gen_range(0..=i);
            self.items.swap(i, j);
        }
        true
    }

    /// Fill the modal from the card at `index` and toggle it.
    ///
    /// The date is only replaced when the card carries both date attributes.
    pub fn open(&mut self, index: usize) -> SiteResult<&TestimonialModal> {
        let item = self
            .items
            .get(index)
            .ok_or_else(|| SiteError::NotFound(format!("testimonial {index}")))?;

        self.modal.img_src = item.avatar_src.clone();
        self.modal.img_alt = item.avatar_alt.clone();
        self.modal.title = item.title.clone();
        self.modal.text = item.text.clone();
        if let (Some(date), Some(date_text)) = (&item.date, &item.date_text) {
            self.modal.date = Some(date.clone());
            self.modal.date_text = Some(date_text.clone());
        }

        self.toggle_modal();
        Ok(&self.modal)
    }

    /// Close button and overlay both toggle.
    pub fn toggle_modal(&mut self) {
        self.modal.open = !self.modal.open;
    }
}

/// Visibility of the testimonial list while it is reordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShuffleFrame {
    FadeOut,
    /// Faded back in with these titles, in order.
    Shown(Vec<String>),
}

/// Reshuffle `testimonials` every `period` until every receiver is gone.
pub async fn run_testimonial_shuffle(
    testimonials: Arc<Mutex<Testimonials>>,
    period: Duration,
    fade: Duration,
    frames: watch::Sender<ShuffleFrame>,
) {
    let mut rng = StdRng::from_entropy();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;

        if !testimonials.lock().await.shuffle(&mut rng) {
            continue;
        }
        if frames.send(ShuffleFrame::FadeOut).is_err() {
            return;
        }
        sleep(fade).await;

        let order = testimonials
            .lock()
            .await
            .items()
            .iter()
            .map(|t| t.title.clone())
            .collect::<Vec<_>>();
        debug!(items = order.len(), "Testimonials reordered");
        if frames.send(ShuffleFrame::Shown(order)).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn testimonial(title: &str) -> Testimonial {
        Testimonial {
            avatar_src: format!("./assets/images/{title}.webp"),
            avatar_alt: title.to_string(),
            title: title.to_string(),
            text: format!("{title} says hi"),
            date: None,
            date_text: None,
        }
    }

    fn titles(t: &Testimonials) -> Vec<String> {
        t.items().iter().map(|i| i.title.clone()).collect()
    }

    #[test]
    fn test_shuffle_keeps_every_item() {
        let mut list = Testimonials::new(["a", "b", "c", "d", "e"].map(testimonial).to_vec());
        let mut rng = StdRng::seed_from_u64(7);

        assert!(list.shuffle(&mut rng));
        let mut after = titles(&list);
        after.sort();
        assert_eq!(after, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_shuffle_single_item_is_noop() {
        let mut list = Testimonials::new(vec![testimonial("solo")]);
        assert!(!list.shuffle(&mut StdRng::seed_from_u64(1)));
        assert!(!Testimonials::default().shuffle(&mut StdRng::seed_from_u64(1)));
    }

    #[test]
    fn test_open_populates_modal() {
        let mut dated = testimonial("ann");
        dated.date = Some("2023-06-01".to_string());
        dated.date_text = Some("1 June, 2023".to_string());
        let mut list = Testimonials::new(vec![dated, testimonial("bob")]);

        let modal = list.open(0).unwrap();
        assert!(modal.open);
        assert!(modal.overlay_active());
        assert_eq!(modal.title, "ann");
        assert_eq!(modal.date.as_deref(), Some("2023-06-01"));

        list.toggle_modal();
        assert!(!list.modal().open);

        // No date attributes: previous date stays.
        let modal = list.open(1).unwrap();
        assert_eq!(modal.title, "bob");
        assert_eq!(modal.date_text.as_deref(), Some("1 June, 2023"));
    }

    #[test]
    fn test_open_out_of_range() {
        let mut list = Testimonials::new(vec![testimonial("a")]);
        assert!(matches!(list.open(3), Err(SiteError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shuffle_driver_fades() {
        let list = Arc::new(Mutex::new(Testimonials::new(
            ["a", "b", "c"].map(testimonial).to_vec(),
        )));
        let (tx, mut rx) = watch::channel(ShuffleFrame::Shown(Vec::new()));
        let task = tokio::spawn(run_testimonial_shuffle(
            list,
            Duration::from_secs(30),
            Duration::from_millis(500),
            tx,
        ));

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ShuffleFrame::FadeOut);
        rx.changed().await.unwrap();
        match &*rx.borrow_and_update() {
            ShuffleFrame::Shown(order) => assert_eq!(order.len(), 3),
            other => panic!("unexpected frame {other:?}"),
        }

        drop(rx);
        task.await.unwrap();
    }
}
