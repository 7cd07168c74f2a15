mod browse;
mod page;
mod root;

pub use browse::BrowseCommand;
pub use page::PageCommand;
pub use root::Cli;
