//! Sidebar avatar rotation.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::trace;

/// What the avatar element shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvatarFrame {
    /// Faded out, about to swap.
    FadeOut,
    /// Visible with this image.
    Show(String),
}

/// Image list and the index currently shown.
#[derive(Debug, Clone)]
pub struct AvatarRotator {
    images: Vec<String>,
    index: usize,
}

impl AvatarRotator {
    pub fn new(images: Vec<String>) -> Self {
        Self { images, index: 0 }
    }

    pub fn current(&self) -> Option<&str> {
        self.images.get(self.index).map(String::as_str)
    }

    /// Rotation only runs with more than one image.
    pub fn is_rotating(&self) -> bool {
        self.images.len() > 1
    }

    /// Advance to the next image, returning it.
    pub fn rotate(&mut self) -> Option<&str> {
        if !self.is_rotating() {
            return None;
        }
        self.index = (self.index + 1) % self.images.len();
        self.current()
    }
}

/// Drive the rotation until every receiver is gone.
///
/// Each period the avatar fades out, then after `fade` shows the next image.
pub async fn run_avatar_rotation(
    mut rotator: AvatarRotator,
    period: Duration,
    fade: Duration,
    frames: watch::Sender<AvatarFrame>,
) {
    if !rotator.is_rotating() {
        return;
    }

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(next) = rotator.rotate().map(str::to_string) else {
            return;
        };

        if frames.send(AvatarFrame::FadeOut).is_err() {
            return;
        }
        sleep(fade).await;
        trace!(src = %next, "Avatar swapped");
        if frames.send(AvatarFrame::Show(next)).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images() -> Vec<String> {
        vec!["a.webp".to_string(), "b.webp".to_string()]
    }

    #[test]
    fn test_rotate_wraps() {
        let mut rotator = AvatarRotator::new(images());
        assert_eq!(rotator.current(), Some("a.webp"));
        assert_eq!(rotator.rotate(), Some("b.webp"));
        assert_eq!(rotator.rotate(), Some("a.webp"));
    }

    #[test]
    fn test_single_image_does_not_rotate() {
        let mut rotator = AvatarRotator::new(vec!["only.webp".to_string()]);
        assert!(!rotator.is_rotating());
        assert_eq!(rotator.rotate(), None);
        assert_eq!(rotator.current(), Some("only.webp"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_fades_then_swaps() {
        let (tx, mut rx) = watch::channel(AvatarFrame::Show("a.webp".to_string()));
        let task = tokio::spawn(run_avatar_rotation(
            AvatarRotator::new(images()),
            Duration::from_secs(10),
            Duration::from_secs(2),
            tx,
        ));

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), AvatarFrame::FadeOut);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), AvatarFrame::Show("b.webp".to_string()));

        drop(rx);
        task.await.unwrap();
    }
}
