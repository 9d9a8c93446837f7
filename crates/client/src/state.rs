//! Application state shared across views.

use std::sync::Arc;

use crate::api::{ApiClient, PlacesClient};
use crate::cart::CartStore;
use crate::config::ClientConfig;
use crate::events::EventBus;
use crate::favorites::FavoritesStore;
use crate::mode::ModeStore;
use crate::selection::SelectionStore;
use crate::storage::{JsonFileStore, MemoryStore, SharedStorage, StorageError};

/// Application state shared across all views.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// stores, the API clients, and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ClientConfig,
    api: ApiClient,
    places: PlacesClient,
    storage: SharedStorage,
    events: EventBus,
    cart: CartStore,
    selection: SelectionStore<ApiClient>,
    favorites: FavoritesStore<ApiClient>,
    mode: ModeStore,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Storage is file-backed when `config.storage_path` is set, in-memory
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error when the storage file exists but cannot be read.
    pub fn new(config: ClientConfig) -> Result<Self, StorageError> {
        let storage: SharedStorage = match &config.storage_path {
            Some(path) => Arc::new(JsonFileStore::open(path)?),
            None => Arc::new(MemoryStore::new()),
        };
        Self::with_storage(config, storage)
    }

    /// Create a new application state over an explicit storage backend.
    ///
    /// # Errors
    ///
    /// Returns an error when the storage backend fails during setup.
    pub fn with_storage(config: ClientConfig, storage: SharedStorage) -> Result<Self, StorageError> {
        let api = ApiClient::new(&config.api);
        let places = PlacesClient::new(&config.places);
        let events = EventBus::new();

        let cart = CartStore::new(events.clone());
        let selection = SelectionStore::new(Arc::clone(&storage), api.clone(), events.clone());
        let favorites = FavoritesStore::new(Arc::clone(&storage), api.clone(), events.clone());
        let mode = ModeStore::new(Arc::clone(&storage), events.clone());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                api,
                places,
                storage,
                events,
                cart,
                selection,
                favorites,
                mode,
            }),
        })
    }

    /// Get a reference to the client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Get a reference to the marketplace API client.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    /// Get a reference to the places-search client.
    #[must_use]
    pub fn places(&self) -> &PlacesClient {
        &self.inner.places
    }

    /// Get a reference to the durable key-value storage.
    #[must_use]
    pub fn storage(&self) -> &SharedStorage {
        &self.inner.storage
    }

    /// Get a reference to the store event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Get a reference to the cart store.
    #[must_use]
    pub fn cart(&self) -> &CartStore {
        &self.inner.cart
    }

    /// Get a reference to the market selection store.
    #[must_use]
    pub fn selection(&self) -> &SelectionStore<ApiClient> {
        &self.inner.selection
    }

    /// Get a reference to the favorites store.
    #[must_use]
    pub fn favorites(&self) -> &FavoritesStore<ApiClient> {
        &self.inner.favorites
    }

    /// Get a reference to the app mode store.
    #[must_use]
    pub fn mode(&self) -> &ModeStore {
        &self.inner.mode
    }
}
