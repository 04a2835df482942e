pub mod directory;
pub mod group_resolver;
pub mod identity_cache;
pub mod ldap_directory;
pub mod ldap_filter;
pub mod memory_directory;
pub mod record;

pub use directory::*;
pub use group_resolver::*;
pub use identity_cache::*;
pub use ldap_directory::*;
pub use ldap_filter::*;
pub use memory_directory::*;
pub use record::*;
