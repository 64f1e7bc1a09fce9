//! List-page walking with fixed or auto-detected termination.

use std::sync::Arc;

use shopdir_core::PaginationConfig;

use crate::error::SiteError;
use crate::parse::Parser;
use crate::site::SiteClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkMode {
    /// Pages `start..=end_page`.
    Fixed { end_page: u32 },
    /// Until `max_empty_pages` empty pages in a row, or the same links
    /// `max_repeated_pages` times in a row.
    AutoDetect {
        max_empty_pages: u32,
        max_repeated_pages: u32,
    },
}

impl From<&PaginationConfig> for WalkMode {
    fn from(config: &PaginationConfig) -> Self {
        match *config {
            PaginationConfig::Fixed { end_page, .. } => WalkMode::Fixed { end_page },
            PaginationConfig::Auto {
                max_empty_pages,
                max_repeated_pages,
                ..
            } => WalkMode::AutoDetect {
                max_empty_pages,
                max_repeated_pages,
            },
        }
    }
}

#[derive(Debug)]
pub enum WalkEnd {
    ReachedEndPage,
    EmptyPageStreak,
    RepeatedPages,
    Error { page: u32, error: SiteError },
}

#[derive(Debug)]
pub enum WalkStep {
    Page {
        index: u32,
        links: Vec<String>,
        /// Consecutive empty pages up to and including this one.
        empty_streak: u32,
    },
    Done(WalkEnd),
}

/// Lazy, finite walk over list pages. Yields each page's detail links, then
/// exactly one [`WalkStep::Done`], then `None` forever.
pub struct PageWalker {
    site: Arc<SiteClient>,
    parser: Arc<dyn Parser>,
    list_url: String,
    mode: WalkMode,
    next_page: u32,
    empty_streak: u32,
    previous_links: Vec<String>,
    repeat_count: u32,
    finished: bool,
}

impl PageWalker {
    /// `initial_empty_streak` carries empty pages seen before `start_page`
    /// in an earlier run.
    #[must_use]
    pub fn new(
        site: Arc<SiteClient>,
        parser: Arc<dyn Parser>,
        list_url: &str,
        mode: WalkMode,
        start_page: u32,
        initial_empty_streak: u32,
    ) -> Self {
        Self {
            site,
            parser,
            list_url: list_url.to_string(),
            mode,
            next_page: start_page.max(1),
            empty_streak: initial_empty_streak,
            previous_links: Vec::new(),
            repeat_count: 0,
            finished: false,
        }
    }

    pub async fn next(&mut self) -> Option<WalkStep> {
        if self.finished {
            return None;
        }
        if let Some(end) = self.termination() {
            self.finished = true;
            return Some(WalkStep::Done(end));
        }

        let index = self.next_page;
        let response = match self.site.list_page(&self.list_url, index).await {
            Ok(response) => response,
            Err(error) => {
                self.finished = true;
                return Some(WalkStep::Done(WalkEnd::Error { page: index, error }));
            }
        };
        let links = self.parser.extract_detail_links(&response.body);

        if links.is_empty() {
            self.empty_streak += 1;
            self.repeat_count = 0;
        } else {
            self.empty_streak = 0;
            if links == self.previous_links {
                self.repeat_count += 1;
            } else {
                self.repeat_count = 1;
            }
        }
        self.previous_links.clone_from(&links);
        self.next_page = index.saturating_add(1);

        tracing::debug!(
            page = index,
            links = links.len(),
            empty_streak = self.empty_streak,
            "list page walked"
        );
        Some(WalkStep::Page {
            index,
            links,
            empty_streak: self.empty_streak,
        })
    }

    fn termination(&self) -> Option<WalkEnd> {
        match self.mode {
            WalkMode::Fixed { end_page } => {
                (self.next_page > end_page).then_some(WalkEnd::ReachedEndPage)
            }
            WalkMode::AutoDetect {
                max_empty_pages,
                max_repeated_pages,
            } => {
                if self.empty_streak >= max_empty_pages {
                    Some(WalkEnd::EmptyPageStreak)
                } else if self.repeat_count >= max_repeated_pages {
                    Some(WalkEnd::RepeatedPages)
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "walker_test.rs"]
mod tests;
