mod clicks;
mod create_link;
mod links;

pub use clicks::ClicksView;
pub use create_link::CreateLinkView;
pub use links::LinksView;
