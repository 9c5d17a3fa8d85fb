pub mod gumtree;
pub mod http;
pub mod normalize;
pub mod spareroom;
pub mod traits;
pub mod types;

pub use gumtree::GumtreeScraper;
pub use http::PoliteClient;
pub use spareroom::SpareRoomScraper;
pub use traits::SourceAdapter;
pub use types::SearchParams;

use crate::config::{SearchOptions, Settings, SourceSettings};
use crate::models::Source;
use anyhow::{Context, Result};

/// Build the adapter for one configured source.
pub fn build_adapter(source: &SourceSettings, search: &SearchOptions) -> Result<Box<dyn SourceAdapter>> {
    let params = search.params.clone();
    let adapter: Box<dyn SourceAdapter> = match source.source {
        Source::SpareRoom => Box::new(SpareRoomScraper::new(source.clone(), params, search.delay)?),
        Source::Gumtree => Box::new(GumtreeScraper::new(source.clone(), params, search.delay)?),
    };
    Ok(adapter)
}

/// Build an adapter for every enabled source, in settings order.
/// Fails on the first source that cannot be set up.
pub fn build_adapters(settings: &Settings) -> Result<Vec<Box<dyn SourceAdapter>>> {
    settings
        .sources
        .iter()
        .map(|source| {
            build_adapter(source, &settings.search)
                .with_context(|| format!("Failed to set up {}", source.source))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileConfig;

    fn settings(gumtree_cookie: &str) -> Settings {
        let toml = format!(
            r#"
            [preferences]
            areas = ["Angel"]
            target_rent = 750
            min_available = "2015-01-01"

            [spareroom]
            enabled = true

            [gumtree]
            enabled = true

            [gumtree.cookies]
            session = "{gumtree_cookie}"
            "#
        );
        FileConfig::from_toml(&toml).unwrap().validate().unwrap()
    }

    #[test]
    fn test_build_adapters_in_order() {
        let adapters = build_adapters(&settings("abc")).unwrap();
        let sources: Vec<Source> = adapters.iter().map(|a| a.source()).collect();
        assert_eq!(sources, vec![Source::SpareRoom, Source::Gumtree]);
    }

    #[test]
    fn test_bad_cookie_on_later_source_fails_whole_setup() {
        let err = build_adapters(&settings("bad\\nvalue")).err().unwrap();
        assert!(err.to_string().contains("gumtree"), "{err}");
    }
}
