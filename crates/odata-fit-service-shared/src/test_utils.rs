//! Test utilities for handler testing.
//!
//! Every helper seeds a fresh temporary fixture tree, so tests that mutate
//! entities never see each other's writes. Keep the returned [`TempDir`]
//! alive for as long as the state is used.

use std::path::Path;

use odata_fit_lib::{ContentFormat, DispatchCredentials, FixtureStore, HttpDispatcher, ProtocolVersion};
use tempfile::TempDir;
use url::Url;

use crate::state::AppState;

/// Base URL used when a test never dispatches batch requests.
pub const TEST_BASE_URL: &str = "http://localhost:8080/";

/// Known fixtures seeded by [`seed_fixtures`].
pub mod fixture_entities {
    /// Numeric-keyed entity set.
    pub const PRODUCTS: &str = "Products";

    /// String-keyed entity set.
    pub const CUSTOMERS: &str = "Customers";

    /// Product with a JSON and an XML fixture.
    pub const WIDGET_KEY: &str = "-10";

    /// Product with only a JSON fixture.
    pub const GADGET_KEY: &str = "-9";

    /// Customer key literal.
    pub const ALFKI: &str = "'ALFKI'";

    pub const WIDGET_JSON: &str = r#"{"Id":-10,"Name":"Widget","Description":"old"}"#;

    pub const WIDGET_XML: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?><entry xmlns=\"http://www.w3.org/2005/Atom\"><id>Products(-10)</id><title>Widget</title></entry>";
}

/// Write the standard fixtures under `root` for both protocol versions.
///
/// # Panics
///
/// Panics when the fixture tree cannot be written.
pub fn seed_fixtures(root: &Path) -> FixtureStore {
    use fixture_entities::*;

    let store = FixtureStore::new(root);
    for version in ProtocolVersion::ALL {
        store.create_entity_set(version, PRODUCTS).unwrap();
        store.create_entity_set(version, CUSTOMERS).unwrap();
        store
            .write(version, PRODUCTS, WIDGET_KEY, ContentFormat::Json, WIDGET_JSON.as_bytes())
            .unwrap();
        store
            .write(version, PRODUCTS, WIDGET_KEY, ContentFormat::Xml, WIDGET_XML.as_bytes())
            .unwrap();
        store
            .write(
                version,
                PRODUCTS,
                GADGET_KEY,
                ContentFormat::Json,
                br#"{"Id":-9,"Name":"Gadget"}"#,
            )
            .unwrap();
        store
            .write(
                version,
                CUSTOMERS,
                "ALFKI",
                ContentFormat::Json,
                br#"{"ID":"ALFKI","CompanyName":"Alfreds Futterkiste"}"#,
            )
            .unwrap();
    }
    store
}

/// Build state over `store` whose batches are dispatched to `base_url`.
///
/// # Panics
///
/// Panics on an invalid URL or when the HTTP client cannot be built.
pub fn state_with_base_url(store: FixtureStore, base_url: &str) -> AppState {
    let base_url = Url::parse(base_url).unwrap();
    let dispatcher = HttpDispatcher::new(DispatchCredentials::default()).unwrap();
    AppState::from_components(store, base_url, dispatcher).unwrap()
}

/// State over a freshly seeded fixture tree.
pub fn seeded_state() -> (TempDir, AppState) {
    let dir = TempDir::new().unwrap();
    let store = seed_fixtures(dir.path());
    let state = state_with_base_url(store, TEST_BASE_URL);
    (dir, state)
}

/// State over an existing but empty fixture root.
pub fn empty_state() -> (TempDir, AppState) {
    let dir = TempDir::new().unwrap();
    let state = state_with_base_url(FixtureStore::new(dir.path()), TEST_BASE_URL);
    (dir, state)
}
