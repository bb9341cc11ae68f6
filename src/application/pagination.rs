//! Page-number pagination shared by every post listing.
//!
//! The paginator never fails on user input: a missing or non-numeric `page`
//! resolves to the first page, and a number outside `1..=num_pages` resolves
//! to the last one. An empty collection still has one (empty) page.

use std::num::NonZeroU32;

use serde::Serialize;

use crate::config::PaginationSettings;

/// Offset/limit window handed to repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: u32,
    pub offset: u64,
}

impl PageRequest {
    pub fn new(limit: u32, offset: u64) -> Self {
        Self { limit, offset }
    }
}

/// A resolved page position within a collection of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: u32,
    pub num_pages: u32,
    pub total_count: u64,
    pub per_page: NonZeroU32,
}

impl PageWindow {
    pub fn request(&self) -> PageRequest {
        let offset = u64::from(self.number - 1) * u64::from(self.per_page.get());
        PageRequest::new(self.per_page.get(), offset)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    per_page: NonZeroU32,
}

impl Paginator {
    pub fn new(settings: PaginationSettings) -> Self {
        Self {
            per_page: settings.count_on_page,
        }
    }

    pub fn per_page(&self) -> NonZeroU32 {
        self.per_page
    }

    pub fn num_pages(&self, total_count: u64) -> u32 {
        let per_page = u64::from(self.per_page.get());
        let pages = total_count.div_ceil(per_page).max(1);
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    /// Resolve the raw `page` query value against a collection of `total_count` items.
    pub fn window(&self, total_count: u64, raw_page: Option<&str>) -> PageWindow {
        let num_pages = self.num_pages(total_count);
        let number = match raw_page.map(str::trim).map(str::parse::<i64>) {
            None | Some(Err(_)) => 1,
            Some(Ok(requested)) if requested < 1 => num_pages,
            Some(Ok(requested)) => u32::try_from(requested)
                .map(|requested| requested.min(num_pages))
                .unwrap_or(num_pages),
        };

        PageWindow {
            number,
            num_pages,
            total_count,
            per_page: self.per_page,
        }
    }
}

/// One page of a listing plus the navigation facts templates need.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub num_pages: u32,
    pub total_count: u64,
    pub per_page: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, window: PageWindow) -> Self {
        Self {
            items,
            number: window.number,
            num_pages: window.num_pages,
            total_count: window.total_count,
            per_page: window.per_page.get(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_other_pages(&self) -> bool {
        self.has_next() || self.has_previous()
    }

    pub fn next_page_number(&self) -> Option<u32> {
        self.has_next().then(|| self.number + 1)
    }

    pub fn previous_page_number(&self) -> Option<u32> {
        self.has_previous().then(|| self.number - 1)
    }

    /// 1-based index of the first item on this page, or 0 when the collection is empty.
    pub fn start_index(&self) -> u64 {
        if self.total_count == 0 {
            0
        } else {
            u64::from(self.number - 1) * u64::from(self.per_page) + 1
        }
    }

    pub fn end_index(&self) -> u64 {
        if self.total_count == 0 {
            0
        } else {
            self.start_index() + self.items.len() as u64 - 1
        }
    }

    pub fn page_numbers(&self) -> std::ops::RangeInclusive<u32> {
        1..=self.num_pages
    }
}
