pub mod fetcher;
pub mod importer;
pub mod media_library;
pub mod sideloader;
