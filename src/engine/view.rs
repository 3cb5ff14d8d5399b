//! What the render target should show for a page.

use super::config::NavConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub enabled: bool,
}

/// Clickable navigation beneath the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavControls {
    /// Absent when backward navigation is not allowed at all
    pub previous: Option<Button>,
    pub next: Button,
    pub page_number: Option<String>,
}

impl NavControls {
    pub fn for_page(cfg: &NavConfig, page: usize, navigation_enabled: bool) -> Self {
        let previous = cfg.allow_backward.then(|| Button {
            label: cfg.button_label_previous.clone(),
            enabled: navigation_enabled && page > 0,
        });
        Self {
            previous,
            next: Button {
                label: cfg.button_label_next.clone(),
                enabled: navigation_enabled,
            },
            page_number: page_number_label(cfg, page),
        }
    }

    pub fn previous_enabled(&self) -> bool {
        self.previous.as_ref().is_some_and(|b| b.enabled)
    }
}

/// One full overwrite of the render target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub page_index: usize,
    pub content: String,
    /// Present only when clickable navigation is configured
    pub controls: Option<NavControls>,
    pub page_number: Option<String>,
}

impl Frame {
    pub fn build(cfg: &NavConfig, page: usize, navigation_enabled: bool) -> Self {
        let content = cfg
            .pages
            .get(page)
            .map(|p| p.content().to_string())
            .unwrap_or_default();
        Self {
            page_index: page,
            content,
            controls: cfg
                .show_clickable_nav
                .then(|| NavControls::for_page(cfg, page, navigation_enabled)),
            page_number: page_number_label(cfg, page),
        }
    }
}

/// "Page 2/5"; hidden for single-page trials
pub fn page_number_label(cfg: &NavConfig, page: usize) -> Option<String> {
    if cfg.show_page_number && cfg.page_count() > 1 {
        Some(format!("{} {}/{}", cfg.page_label, page + 1, cfg.page_count()))
    } else {
        None
    }
}
