pub mod action;
pub mod engine;
pub mod executor;
pub mod file;
pub mod folder;
pub mod policy;
pub mod report;
pub mod transfer;
pub mod zip;

pub use action::{ActionDispatcher, ActionState, ActionTask, SyncAction};
pub use engine::{SyncConfig, SyncEngine, SyncSummary};
pub use executor::{SyncExecutor, DEFAULT_MAX_WORKERS};
pub use file::{File, FileVersion, VersionAction, ONE_DAY_IN_MS};
pub use folder::{FileStream, Folder, FolderSpec, FolderType, LocalFolder, RemoteFolder};
pub use policy::{make_file_sync_actions, SyncPolicy, SyncType};
pub use report::{ReportCounts, ReportState, SyncReport};
pub use transfer::ActionRunner;
pub use zip::{zip_files, zip_folders, FilePair, PairStream};
