pub mod activity_log;
pub mod pagination;
pub mod view;

pub use activity_log::{ActivityLog, ACTIVITY_LOG_CAPACITY};
pub use pagination::{HeadlinesView, PageOutcome, PageRequest, PaginationCursor, DEFAULT_PAGE_SIZE};
pub use view::ViewState;
