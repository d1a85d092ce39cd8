pub mod footer;
pub mod header;
pub mod utils;

pub use footer::draw_footer;
pub use header::{draw_header, extract_host};
pub use utils::{bot_color, bot_label, country_cell, format_timestamp, pager_label, truncate};
