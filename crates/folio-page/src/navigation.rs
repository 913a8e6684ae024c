//! Page-section switching and the mobile sidebar.

use folio_core::{SiteError, SiteResult};
use serde::{Deserialize, Serialize};

/// A navbar link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavLink {
    pub label: String,
    /// Explicit `data-page-target`, preferred over the label.
    #[serde(default)]
    pub target: Option<String>,
}

impl NavLink {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Page this link shows.
    pub fn target_page(&self) -> String {
        match self.target {
            Some(ref target) if !target.is_empty() => target.clone(),
            _ => self.label.to_lowercase(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Navigation {
    links: Vec<NavLink>,
    pages: Vec<String>,
    active_link: Option<usize>,
    active_pages: Vec<bool>,
    scroll_to_top: bool,
}

impl Navigation {
    /// The first link and page start active.
    pub fn new(links: Vec<NavLink>, pages: Vec<String>) -> Self {
        let mut active_pages = vec![false; pages.len()];
        if let Some(first) = active_pages.first_mut() {
            *first = true;
        }
        Self {
            active_link: (!links.is_empty()).then_some(0),
            links,
            pages,
            active_pages,
            scroll_to_top: false,
        }
    }

    /// Activate the pages named by link `index` and the link itself.
    pub fn click(&mut self, index: usize) -> SiteResult<Vec<&str>> {
        let target = self
            .links
            .get(index)
            .map(NavLink::target_page)
            .ok_or_else(|| SiteError::NotFound(format!("nav link {index}")))?;

        for (page, active) in self.pages.iter().zip(self.active_pages.iter_mut()) {
            *active = *page == target;
        }
        self.active_link = Some(index);
        self.scroll_to_top = true;

        Ok(self.active_pages())
    }

    pub fn active_pages(&self) -> Vec<&str> {
        self.pages
            .iter()
            .zip(&self.active_pages)
            .filter(|(_, active)| **active)
            .map(|(page, _)| page.as_str())
            .collect()
    }

    pub fn active_link(&self) -> Option<&NavLink> {
        self.active_link.and_then(|i| self.links.get(i))
    }

    /// Whether a scroll to the top is pending; reading clears it.
    pub fn take_scroll_to_top(&mut self) -> bool {
        std::mem::take(&mut self.scroll_to_top)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sidebar {
    active: bool,
}

impl Sidebar {
    pub fn toggle(&mut self) -> bool {
        self.active = !self.active;
        self.active
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn navigation() -> Navigation {
        Navigation::new(
            vec![
                NavLink::new("About"),
                NavLink::new("Resume"),
                NavLink::new("My Work").with_target("portfolio"),
            ],
            ["about", "resume", "portfolio"].map(String::from).to_vec(),
        )
    }

    #[test]
    fn test_initial_page() {
        let nav = navigation();
        assert_eq!(nav.active_pages(), vec!["about"]);
        assert_eq!(nav.active_link().unwrap().label, "About");
    }

    #[test]
    fn test_click_uses_lowercase_label() {
        let mut nav = navigation();
        assert_eq!(nav.click(1).unwrap(), vec!["resume"]);
        assert_eq!(nav.active_link().unwrap().label, "Resume");
        assert!(nav.take_scroll_to_top());
        assert!(!nav.take_scroll_to_top());
    }

    #[test]
    fn test_click_prefers_explicit_target() {
        let mut nav = navigation();
        assert_eq!(nav.click(2).unwrap(), vec!["portfolio"]);
    }

    #[test]
    fn test_unmatched_target_deactivates_all_pages() {
        let mut nav = Navigation::new(vec![NavLink::new("Blog")], vec!["about".to_string()]);
        assert!(nav.click(0).unwrap().is_empty());
        assert!(nav.click(5).is_err());
    }

    #[test]
    fn test_sidebar_toggle() {
        let mut sidebar = Sidebar::default();
        assert!(sidebar.toggle());
        assert!(!sidebar.toggle());
        assert!(!sidebar.is_active());
    }
}
