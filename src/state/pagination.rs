use serde::Serialize;

use crate::error::FeedError;
use crate::models::{Headline, Selection};

/// Headlines fetched per page in the expanded view
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// A page fetch issued by the cursor, tagged with the view it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Identifies one opening of the headlines view
    pub epoch: u64,
    pub page: u32,
}

/// What a page response did to the cursor
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    /// Items were appended; carries how many
    Appended(usize),
    /// Empty page: nothing left to load
    Exhausted,
    /// Request failed: loading stops for this view
    Failed(FeedError),
    /// Response belongs to a closed or reopened view
    Discarded,
}

/// Read-only copy of the cursor for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadlinesView {
    pub ticker: String,
    pub page: u32,
    pub page_size: usize,
    pub has_more: bool,
    pub is_loading: bool,
    pub items: Vec<Headline>,
}

/// Incremental headline loader for one opened ticker view.
///
/// `has_more` is a heuristic: it stays true only while the last page came
/// back full, so a final page that happens to be exactly full costs one
/// extra, empty request.
#[derive(Debug, Clone)]
pub struct PaginationCursor {
    epoch: u64,
    selection: Selection,
    page: u32,
    page_size: usize,
    has_more: bool,
    is_loading: bool,
    items: Vec<Headline>,
}

impl PaginationCursor {
    /// Open the view with the first page already in hand
    pub fn open(epoch: u64, selection: Selection, initial: Vec<Headline>, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        Self {
            epoch,
            selection,
            page: 1,
            page_size,
            has_more: initial.len() == page_size,
            is_loading: false,
            items: initial,
        }
    }

    /// Claim the next page. Returns `None` while a load is in flight or
    /// when there is nothing more to load.
    pub fn begin_load(&mut self) -> Option<PageRequest> {
        if self.is_loading || !self.has_more {
            return None;
        }

        self.is_loading = true;
        Some(PageRequest {
            epoch: self.epoch,
            page: self.page + 1,
        })
    }

    /// Apply the response to a request from `begin_load`
    pub fn complete(
        &mut self,
        request: PageRequest,
        result: Result<Vec<Headline>, FeedError>,
    ) -> PageOutcome {
        if request.epoch != self.epoch || !self.is_loading || request.page != self.page + 1 {
            return PageOutcome::Discarded;
        }

        self.is_loading = false;

        match result {
            Ok(headlines) if headlines.is_empty() => {
                self.has_more = false;
                PageOutcome::Exhausted
            }
            Ok(headlines) => {
                let count = headlines.len();
                self.items.extend(headlines);
                self.page = request.page;
                self.has_more = count == self.page_size;
                PageOutcome::Appended(count)
            }
            Err(e) => {
                self.has_more = false;
                PageOutcome::Failed(e)
            }
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Market and ticker the view was opened for
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn items(&self) -> &[Headline] {
        &self.items
    }

    pub fn view(&self) -> HeadlinesView {
        HeadlinesView {
            ticker: self.selection.ticker.clone(),
            page: self.page,
            page_size: self.page_size,
            has_more: self.has_more,
            is_loading: self.is_loading,
            items: self.items.clone(),
        }
    }
}
