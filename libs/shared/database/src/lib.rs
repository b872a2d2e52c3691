pub mod memory;
pub mod store;
pub mod supabase;

pub use memory::InMemoryStore;
pub use store::{DocumentStore, Filter, Query, SortDirection, StoreError};
pub use supabase::SupabaseClient;
