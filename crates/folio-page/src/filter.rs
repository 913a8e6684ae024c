//! Portfolio category filter: select dropdown on small screens, buttons on large.

use folio_core::{SiteError, SiteResult};
use serde::{Deserialize, Serialize};

/// Category that shows everything.
pub const ALL: &str = "all";

/// One filterable portfolio entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioItem {
    pub title: String,
    pub category: String,
}

impl PortfolioItem {
    pub fn new(title: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            category: category.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PortfolioFilter {
    items: Vec<PortfolioItem>,
    active: Vec<bool>,
    buttons: Vec<String>,
    last_clicked: usize,
    select_open: bool,
    select_label: String,
}

impl PortfolioFilter {
    /// Every item starts visible; the first button counts as last clicked.
    pub fn new(items: Vec<PortfolioItem>, buttons: Vec<String>) -> Self {
        let select_label = buttons.first().cloned().unwrap_or_default();
        Self {
            active: vec![true; items.len()],
            items,
            buttons,
            last_clicked: 0,
            select_open: false,
            select_label,
        }
    }

    pub fn select_open(&self) -> bool {
        self.select_open
    }

    pub fn select_label(&self) -> &str {
        &self.select_label
    }

    pub fn active_button(&self) -> Option<&str> {
        self.buttons.get(self.last_clicked).map(String::as_str)
    }

    pub fn toggle_select(&mut self) {
        self.select_open = !self.select_open;
    }

    /// Pick an entry from the dropdown.
    pub fn select_item(&mut self, label: &str) {
        self.select_label = label.to_string();
        self.toggle_select();
        self.apply(&label.to_lowercase());
    }

    /// Click a filter button.
    pub fn click_button(&mut self, index: usize) -> SiteResult<()> {
        let label = self
            .buttons
            .get(index)
            .cloned()
            .ok_or_else(|| SiteError::NotFound(format!("filter button {index}")))?;

        self.select_label = label.clone();
        self.apply(&label.to_lowercase());
        self.last_clicked = index;
        Ok(())
    }

    /// Show items whose category equals `value`, or everything for `all`.
    pub fn apply(&mut self, value: &str) {
        for (item, active) in self.items.iter().zip(self.active.iter_mut()) {
            *active = value == ALL || item.category == value;
        }
    }

    pub fn visible(&self) -> Vec<&PortfolioItem> {
        self.items
            .iter()
            .zip(&self.active)
            .filter(|(_, active)| **active)
            .map(|(item, _)| item)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> PortfolioFilter {
        PortfolioFilter::new(
            vec![
                PortfolioItem::new("Finance", "web development"),
                PortfolioItem::new("Orizon", "applications"),
                PortfolioItem::new("Fundo", "web design"),
            ],
            ["All", "Web design", "Applications", "Web development"]
                .map(String::from)
                .to_vec(),
        )
    }

    fn titles(filter: &PortfolioFilter) -> Vec<&str> {
        filter.visible().iter().map(|i| i.title.as_str()).collect()
    }

    #[test]
    fn test_all_visible_initially() {
        let filter = filter();
        assert_eq!(filter.visible().len(), 3);
        assert_eq!(filter.active_button(), Some("All"));
    }

    #[test]
    fn test_button_filters_by_lowercase_category() {
        let mut filter = filter();
        filter.click_button(2).unwrap();

        assert_eq!(titles(&filter), vec!["Orizon"]);
        assert_eq!(filter.active_button(), Some("Applications"));
        assert_eq!(filter.select_label(), "Applications");

        filter.click_button(0).unwrap();
        assert_eq!(filter.visible().len(), 3);
    }

    #[test]
    fn test_select_item_closes_dropdown() {
        let mut filter = filter();
        filter.toggle_select();
        assert!(filter.select_open());

        filter.select_item("Web design");
        assert!(!filter.select_open());
        assert_eq!(titles(&filter), vec!["Fundo"]);
    }

    #[test]
    fn test_unknown_category_hides_everything() {
        let mut filter = filter();
        filter.apply("games");
        assert!(filter.visible().is_empty());
        assert!(filter.click_button(9).is_err());
    }
}
