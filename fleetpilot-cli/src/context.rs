//! Wiring of the long-lived services shared by the CLI commands and the
//! terminal UI

use std::sync::Arc;

use anyhow::Result;

use crate::api::{
    DataApi, FetchCandidates, FileMakerClient, KeepAlive, RecordFetcher, SharedRecordLoader,
};
use crate::auth::SessionStore;
use crate::config::Config;
use crate::config::repository::{self, KeyValueStore, MemoryKvStore, SqliteKvStore};
use crate::events::EventBus;
use crate::table::{TableController, TableKeys, storage_key};

pub struct AppContext {
    pub config: Config,
    pub events: EventBus,
    pub store: Arc<dyn KeyValueStore>,
    pub session: Arc<SessionStore>,
    pub client: Arc<FileMakerClient>,
    pub fetcher: Arc<RecordFetcher>,
    pub loader: Arc<SharedRecordLoader>,
    pub keep_alive: Arc<KeepAlive>,
}

impl AppContext {
    pub async fn init(config: Config) -> Result<Self> {
        let store = open_store(&config).await;
        let events = EventBus::new();
        let session = Arc::new(SessionStore::load(Arc::clone(&store), events.clone()).await?);
        let client = Arc::new(FileMakerClient::new(&config.api, Arc::clone(&session))?);

        let api: Arc<dyn DataApi> = client.clone();
        let candidates = FetchCandidates {
            layouts: config.api.layout_candidates(),
            scripts: config.api.script_candidates(),
            find_limit: config.api.find_limit,
        };
        log::debug!(
            "Record candidates: {} layouts, {} scripts",
            candidates.layouts.len(),
            candidates.scripts.len()
        );
        let fetcher = Arc::new(RecordFetcher::new(Arc::clone(&api), candidates));
        let loader = Arc::new(SharedRecordLoader::new(Arc::clone(&fetcher)));
        let keep_alive = Arc::new(KeepAlive::new(
            api,
            Arc::clone(&fetcher),
            Arc::clone(&session),
            config.keep_alive.clone(),
        ));

        Ok(Self {
            config,
            events,
            store,
            session,
            client,
            fetcher,
            loader,
            keep_alive,
        })
    }

    /// Storage keys of the table for the current user
    pub fn table_keys(&self) -> TableKeys {
        let table = &self.config.table;
        TableKeys {
            layout: table.layout.clone(),
            state_key: storage_key(
                &table.storage_prefix,
                self.session.user().as_deref(),
                &table.layout,
            ),
            selection_key: table.selection_key.clone(),
        }
    }

    /// A controller with the stored state already loaded
    pub async fn table_controller(&self) -> TableController {
        let mut controller =
            TableController::new(self.table_keys(), Arc::clone(&self.store), self.events.clone());
        controller.load_saved().await;
        controller
    }
}

/// SQLite store, or an in-memory one when the database cannot be opened
async fn open_store(config: &Config) -> Arc<dyn KeyValueStore> {
    let path = config.database_path();
    match repository::connect(&path).await {
        Ok(pool) => Arc::new(SqliteKvStore::new(pool)),
        Err(e) => {
            log::warn!(
                "Falling back to in-memory storage, settings will not persist: {:#}",
                e
            );
            Arc::new(MemoryKvStore::new())
        }
    }
}
