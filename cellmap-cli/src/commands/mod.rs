pub mod index_status;
pub mod rebuild_index;
pub mod stops;
