//! Cursor pagination for large result sets.

/// Page request: a size limit plus an opaque cursor from the previous page.
#[derive(Debug, Clone, Default)]
pub struct PageOptions {
    pub limit: usize,
    pub cursor: Option<u64>,
}

impl PageOptions {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            cursor: None,
        }
    }

    pub fn after(mut self, cursor: u64) -> Self {
        self.cursor = Some(cursor);
        self
    }
}

/// One page of results plus the cursor for the next page, when more remain.
#[derive(Debug, Clone)]
pub struct PagedResults<T> {
    pub documents: Vec<T>,
    pub total: u64,
    pub next_cursor: Option<u64>,
}

impl<T> PagedResults<T> {
    pub fn empty() -> Self {
        Self {
            documents: Vec::new(),
            total: 0,
            next_cursor: None,
        }
    }

    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }
}
