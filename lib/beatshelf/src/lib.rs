pub mod bridge;
pub mod compare;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod keys;
pub mod operator;
pub mod progress;
pub mod reconcile;
pub mod runner;
pub mod scheduler;
pub mod store;

pub use engine::{SyncEngine, SyncEngineBuilder};
pub use operator::{
    RemoteFavorite, RemoteOperator, SearchHit, SearchOutcome, StarConfirmation,
};
pub use scheduler::{JobSpec, QueuePolicy};
pub use store::{FlagStore, MemoryStore};
