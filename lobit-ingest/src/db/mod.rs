//! Database access for lobit-ingest
//!
//! Schema creation lives in `lobit_common::db`; this module holds the
//! release-level operations used by the pipeline and the HTTP handlers.

pub mod releases;
pub mod retry;

pub use releases::{
    delete_release_bundle, find_release_by_dir, find_release_by_file, format_index_date,
    insert_release_bundle, link_index_record, list_index_records, list_player_files,
    load_release, load_release_details, load_release_page, update_release_data, IndexEntry,
    InsertedRelease, NewRelease, ReleaseDetails, INDEX_DATE_FORMAT,
};
pub use retry::retry_on_lock;
