pub mod error;
pub mod fs_store;
pub mod pairing;
pub mod store;

pub use error::StoreError;
pub use fs_store::FsSessionStore;
pub use pairing::normalize_pairing;
pub use store::SessionStore;
