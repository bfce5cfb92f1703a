mod import;
mod store;

pub(crate) use import::read_import_candidates;
pub(crate) use store::HostStore;
