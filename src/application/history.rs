use serde::Serialize;

use crate::domain::{AccountId, AccountOperation, Cents};

/// One page of an account's operations, newest first, with the balance at
/// the time the page was read.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub account_id: AccountId,
    pub balance: Cents,
    /// 0-based page index.
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub operations: Vec<AccountOperation>,
}

impl HistoryPage {
    pub fn is_last(&self) -> bool {
        self.page.saturating_add(1) >= self.total_pages
    }
}

/// ceil(total / page_size); an empty log has zero pages.
pub fn total_pages(total: i64, page_size: u32) -> u32 {
    if total <= 0 || page_size == 0 {
        return 0;
    }
    let size = i64::from(page_size);
    let pages = (total + size - 1) / size;
    u32::try_from(pages).unwrap_or(u32::MAX)
}
