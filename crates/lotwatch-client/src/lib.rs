pub mod fetcher;
pub mod parser;
pub mod schema;

#[cfg(feature = "browser")]
pub mod browser_fetcher;

#[cfg(feature = "browser")]
pub use browser_fetcher::BrowserFetcher;
pub use fetcher::ReqwestFetcher;
pub use parser::SelectorParser;
pub use schema::{ResolvedSchema, SchemaResolver, SelectorSchema};
