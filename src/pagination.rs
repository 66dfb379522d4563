// 📄 Pagination - fixed-size pages over an exact row count
//
// Lists fetch one page at a time with an inclusive row range and
// `count=exact`; the pager only does the arithmetic.

pub const PAGE_SIZE: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pager {
    pub page: u64,
    pub total: u64,
}

/// What the caller has to do after a row was deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterDelete {
    /// The current page is still in range
    Reload,
    /// The current page fell off the end
    StepBack(u64),
}

impl Pager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_count(&self) -> u64 {
        self.total.div_ceil(PAGE_SIZE)
    }

    /// Inclusive row range of the current page
    pub fn range(&self) -> (u64, u64) {
        let from = self.page * PAGE_SIZE;
        (from, from + PAGE_SIZE - 1)
    }

    /// 1-based first/last row shown; (0, 0) when empty
    pub fn row_span(&self) -> (u64, u64) {
        if self.total == 0 {
            return (0, 0);
        }
        let start = self.page * PAGE_SIZE + 1;
        let end = ((self.page + 1) * PAGE_SIZE).min(self.total);
        (start, end)
    }

    pub fn summary(&self) -> String {
        let (start, end) = self.row_span();
        let shown_page = if self.total == 0 { 0 } else { self.page + 1 };
        format!(
            "Rows {}–{} of {} • Page {}",
            start, end, self.total, shown_page
        )
    }

    pub fn has_next(&self) -> bool {
        (self.page + 1) * PAGE_SIZE < self.total
    }

    pub fn has_prev(&self) -> bool {
        self.page > 0
    }

    /// Returns true when the page actually moved
    pub fn next(&mut self) -> bool {
        if self.has_next() {
            self.page += 1;
            true
        } else {
            false
        }
    }

    pub fn prev(&mut self) -> bool {
        if self.has_prev() {
            self.page -= 1;
            true
        } else {
            false
        }
    }

    /// Any filter change starts over at the first page
    pub fn reset(&mut self) {
        self.page = 0;
    }

    /// Record a successful delete and decide whether to step back a page.
    pub fn after_delete(&mut self) -> AfterDelete {
        self.total = self.total.saturating_sub(1);
        let max_page = self.total.div_ceil(PAGE_SIZE).saturating_sub(1);
        if self.page > max_page {
            self.page = max_page;
            AfterDelete::StepBack(max_page)
        } else {
            AfterDelete::Reload
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pager(page: u64, total: u64) -> Pager {
        Pager { page, total }
    }

    #[test]
    fn test_page_count_is_ceiling() {
        assert_eq!(pager(0, 0).page_count(), 0);
        assert_eq!(pager(0, 1).page_count(), 1);
        assert_eq!(pager(0, 10).page_count(), 1);
        assert_eq!(pager(0, 11).page_count(), 2);
        assert_eq!(pager(0, 23).page_count(), 3);
    }

    #[test]
    fn test_range_is_inclusive() {
        assert_eq!(pager(0, 23).range(), (0, 9));
        assert_eq!(pager(2, 23).range(), (20, 29));
    }

    #[test]
    fn test_summary() {
        assert_eq!(pager(0, 0).summary(), "Rows 0–0 of 0 • Page 0");
        assert_eq!(pager(0, 23).summary(), "Rows 1–10 of 23 • Page 1");
        assert_eq!(pager(2, 23).summary(), "Rows 21–23 of 23 • Page 3");
    }

    #[test]
    fn test_next_prev_are_clamped() {
        let mut p = pager(0, 20);
        assert!(!p.prev());
        assert!(p.next());
        assert_eq!(p.page, 1);
        assert!(!p.next());
        assert_eq!(p.page, 1);
        assert!(p.prev());
        assert_eq!(p.page, 0);
    }

    #[test]
    fn test_delete_last_row_on_last_page_steps_back() {
        let mut p = pager(2, 21);
        assert_eq!(p.after_delete(), AfterDelete::StepBack(1));
        assert_eq!(p.page, 1);
        assert_eq!(p.total, 20);
    }

    #[test]
    fn test_delete_inside_page_reloads() {
        let mut p = pager(1, 25);
        assert_eq!(p.after_delete(), AfterDelete::Reload);
        assert_eq!(p.page, 1);

        let mut only = pager(0, 1);
        assert_eq!(only.after_delete(), AfterDelete::Reload);
        assert_eq!(only.total, 0);
    }
}
