mod list;

pub mod codec;
pub mod config;
pub mod error;
pub mod keys;
pub mod options;
pub mod pagination;
pub mod status;
pub mod store;
pub mod strategy;
pub mod watch;

#[cfg(any(test, feature = "fixture"))]
pub mod testing;

pub use codec::{Codec, CodecError};
pub use config::{
    ConfigError, Decorator, LoadConfigError, RegistryConfig, RestOptions, SaveLoadConfig,
    StorageConfig, traced_storage,
};
pub use error::ApiError;
pub use options::{
    DeleteOptions, DeleteStatus, ListOptions, MutateFn, Preconditions, UpdateOptions,
    UpdatedObjectInfo, WatchOptions,
};
pub use status::StatusStore;
pub use store::Store;
pub use strategy::{SelectionPredicate, SimpleNameGenerator, Strategy};
pub use watch::WatchStream;

pub use clusterop_kv_storage as kv;
pub use clusterop_model as model;
